//! NDI sender engine.
//!
//! This crate turns host-side sender configurations and frame descriptors
//! into native SDK calls. Native work runs on a bounded worker pool and is
//! reported back through [`Operation`] futures; the native sender behind a
//! [`Sender`] is destroyed exactly once, explicitly or when the last
//! reference is dropped.

mod config;
mod error;
mod handle;
mod lease;
pub mod marshal;
mod metrics;
mod scheduler;
mod sender;

pub use config::{SchedulerConfig, SenderConfig, SenderOptions};
pub use error::{ErrorKind, SendError};
pub use handle::{HandleState, SenderHandle};
pub use lease::{BufferLease, LeaseLedger};
pub use marshal::{AudioFrameDescriptor, VideoFrameDescriptor};
pub use metrics::{MetricsCollector, SendMetrics};
pub use scheduler::{Operation, Scheduler};
pub use sender::{create_sender, Sender, TallyReport};

/// Result type for sender operations.
pub type SendResult<T> = Result<T, SendError>;
