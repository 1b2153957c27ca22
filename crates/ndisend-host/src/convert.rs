//! Conversion from JSON documents.

use crate::HostValue;

impl From<serde_json::Value> for HostValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            // Every JSON number is a host number; precision past 2^53 is lost
            // exactly as it is in the host itself.
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(HostValue::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, HostValue::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::HostType;

    #[test]
    fn test_json_sender_config() {
        let value = HostValue::from(json!({
            "name": "Camera 1",
            "clockVideo": false,
            "groups": null,
            "tags": [1, 2]
        }));

        assert_eq!(value.host_type(), HostType::Object);
        assert_eq!(value.get("name"), &HostValue::String("Camera 1".into()));
        assert_eq!(value.get("clockVideo"), &HostValue::Bool(false));
        assert_eq!(value.get("groups"), &HostValue::Null);
        assert_eq!(value.get("tags").host_type(), HostType::Array);
        assert!(value.get("clockAudio").is_undefined());
    }

    #[test]
    fn test_json_numbers_are_doubles() {
        let value = HostValue::from(json!({ "xres": 1920, "pictureAspectRatio": 1.7778 }));
        assert_eq!(value.get("xres"), &HostValue::Number(1920.0));
        assert_eq!(value.get("pictureAspectRatio"), &HostValue::Number(1.7778));
    }
}
