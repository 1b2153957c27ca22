//! Dynamic host values for the NDI sender binding.
//!
//! A scripting host hands the binding loosely typed objects: sender
//! configurations and per-frame descriptors. This crate models those values
//! so the engine can validate them field by field before anything touches
//! the native SDK.

mod convert;
mod value;

pub use value::{HostType, HostValue};

/// Property map of a host object.
pub type HostObject = std::collections::BTreeMap<String, HostValue>;
