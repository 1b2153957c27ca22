//! The host value model.

use std::fmt;

use bytes::Bytes;

use crate::HostObject;

static UNDEFINED: HostValue = HostValue::Undefined;

/// Type tag of a host value, as reported by the host's `typeof`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostType {
    Undefined,
    Null,
    Boolean,
    Number,
    BigInt,
    String,
    Buffer,
    Array,
    Object,
}

impl HostType {
    /// Name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::BigInt => "bigint",
            Self::String => "string",
            Self::Buffer => "buffer",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value owned by the scripting host.
///
/// Buffers are held as [`Bytes`], so cloning a `HostValue::Buffer` takes a
/// strong reference to the caller's memory instead of copying it.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum HostValue {
    /// Absent property or explicit `undefined`.
    #[default]
    Undefined,

    /// Explicit `null`.
    Null,

    /// Boolean.
    Bool(bool),

    /// Double-precision number.
    Number(f64),

    /// 64-bit signed big integer.
    BigInt(i64),

    /// UTF-8 string.
    String(String),

    /// Contiguous byte region owned by the host.
    Buffer(Bytes),

    /// Array of values.
    Array(Vec<HostValue>),

    /// Plain object.
    Object(HostObject),
}

impl HostValue {
    /// Build an object from key/value pairs.
    pub fn object<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<HostValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Create a big integer value.
    pub fn bigint(value: i64) -> Self {
        Self::BigInt(value)
    }

    /// Get the type tag of this value.
    pub fn host_type(&self) -> HostType {
        match self {
            Self::Undefined => HostType::Undefined,
            Self::Null => HostType::Null,
            Self::Bool(_) => HostType::Boolean,
            Self::Number(_) => HostType::Number,
            Self::BigInt(_) => HostType::BigInt,
            Self::String(_) => HostType::String,
            Self::Buffer(_) => HostType::Buffer,
            Self::Array(_) => HostType::Array,
            Self::Object(_) => HostType::Object,
        }
    }

    /// Check if this value is `undefined`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Get the property map if this is a plain object.
    pub fn as_object(&self) -> Option<&HostObject> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Read a named property. Missing properties and non-objects read as
    /// `undefined`, the way the host's property lookup behaves.
    pub fn get(&self, key: &str) -> &HostValue {
        self.as_object()
            .and_then(|map| map.get(key))
            .unwrap_or(&UNDEFINED)
    }

    /// Set a named property. Has no effect on non-objects.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<HostValue>) {
        if let Self::Object(map) = self {
            map.insert(key.into(), value.into());
        }
    }

    /// Builder form of [`HostValue::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<HostValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Builder that removes a property.
    pub fn without(mut self, key: &str) -> Self {
        if let Self::Object(map) = &mut self {
            map.remove(key);
        }
        self
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<f32> for HostValue {
    fn from(value: f32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<i32> for HostValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<u32> for HostValue {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Bytes> for HostValue {
    fn from(value: Bytes) -> Self {
        Self::Buffer(value)
    }
}

impl From<Vec<u8>> for HostValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Buffer(Bytes::from(value))
    }
}

impl From<Vec<HostValue>> for HostValue {
    fn from(value: Vec<HostValue>) -> Self {
        Self::Array(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_property_reads_undefined() {
        let obj = HostValue::object([("name", "Studio A")]);
        assert_eq!(obj.get("name"), &HostValue::String("Studio A".into()));
        assert!(obj.get("clockVideo").is_undefined());
        assert!(HostValue::Null.get("anything").is_undefined());
    }

    #[test]
    fn test_buffer_clone_shares_memory() {
        let data = Bytes::from(vec![1u8, 2, 3, 4]);
        let value = HostValue::from(data.clone());
        let cloned = value.clone();

        match (&value, &cloned) {
            (HostValue::Buffer(a), HostValue::Buffer(b)) => {
                assert_eq!(a.as_ptr(), data.as_ptr());
                assert_eq!(b.as_ptr(), data.as_ptr());
            }
            _ => panic!("expected buffers"),
        }
    }

    #[test]
    fn test_builder_set_and_remove() {
        let obj = HostValue::object([("xres", 1920)])
            .with("yres", 1080)
            .without("xres");
        assert!(obj.get("xres").is_undefined());
        assert_eq!(obj.get("yres").host_type(), HostType::Number);
    }
}
