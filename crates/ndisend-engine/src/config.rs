//! Engine configuration.

use serde::{Deserialize, Serialize};

use ndisend_sdk::{SendCreateDesc, DEFAULT_CLOCKING};

use crate::error::SendError;
use crate::SendResult;

/// Creation parameters for a sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderConfig {
    /// Name advertised for discovery. Must be non-empty.
    pub name: String,

    /// Discovery groups (None for the SDK default group).
    #[serde(default)]
    pub groups: Option<String>,

    /// Clock video sends to the frame rate (None for the SDK default, on).
    #[serde(default)]
    pub clock_video: Option<bool>,

    /// Clock audio sends to the sample rate (None for the SDK default, on).
    #[serde(default)]
    pub clock_audio: Option<bool>,
}

impl SenderConfig {
    /// Create a configuration with SDK defaults for everything but the name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: None,
            clock_video: None,
            clock_audio: None,
        }
    }

    /// Set video clocking.
    pub fn with_clock_video(mut self, clock: bool) -> Self {
        self.clock_video = Some(clock);
        self
    }

    /// Set audio clocking.
    pub fn with_clock_audio(mut self, clock: bool) -> Self {
        self.clock_audio = Some(clock);
        self
    }

    /// Set discovery groups.
    pub fn with_groups(mut self, groups: impl Into<String>) -> Self {
        self.groups = Some(groups.into());
        self
    }

    /// Check the configuration before any native work is queued.
    pub fn validate(&self) -> SendResult<()> {
        if self.name.is_empty() {
            return Err(SendError::InvalidFieldType {
                field: "name",
                expected: "a non-empty string",
            });
        }
        if self.name.contains('\0') {
            return Err(SendError::InvalidFieldType {
                field: "name",
                expected: "a string without NUL characters",
            });
        }
        if self.groups.as_deref().is_some_and(|g| g.contains('\0')) {
            return Err(SendError::InvalidFieldType {
                field: "groups",
                expected: "a string without NUL characters",
            });
        }
        Ok(())
    }

    /// Effective video clocking.
    pub fn resolved_clock_video(&self) -> bool {
        self.clock_video.unwrap_or(DEFAULT_CLOCKING)
    }

    /// Effective audio clocking.
    pub fn resolved_clock_audio(&self) -> bool {
        self.clock_audio.unwrap_or(DEFAULT_CLOCKING)
    }

    /// Build the SDK create descriptor.
    pub fn to_create_desc(&self) -> SendCreateDesc {
        SendCreateDesc {
            ndi_name: self.name.clone(),
            groups: self.groups.clone(),
            clock_video: self.resolved_clock_video(),
            clock_audio: self.resolved_clock_audio(),
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum native calls executing at once.
    pub max_workers: usize,

    /// Name given to worker threads.
    pub thread_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            thread_name: "ndisend-worker".to_string(),
        }
    }
}

/// Per-sender behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SenderOptions {
    /// Run native sends for one sender one at a time.
    pub serialize_sends: bool,

    /// Timeout for connection and tally polls (0 polls without waiting).
    pub query_timeout_ms: u32,
}

impl Default for SenderOptions {
    fn default() -> Self {
        Self {
            serialize_sends: true,
            query_timeout_ms: 0,
        }
    }
}
