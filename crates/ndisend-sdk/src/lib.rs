//! NDI send SDK contract.
//!
//! The vendor SDK is an external collaborator with a fixed C-style API:
//! create, destroy, send video, send audio, connection count, tally and
//! source name. [`SendSdk`] captures that contract so the engine can drive
//! either the real runtime (feature `ndi`) or the in-process
//! [`LoopbackSdk`].

mod error;
mod frame;
mod loopback;
#[cfg(feature = "ndi")]
mod ndi;

pub use error::SdkError;
pub use frame::{
    AudioFourCc, AudioFrame, FrameFormat, SendCreateDesc, Tally, VideoFourCc, VideoFrame,
    DEFAULT_CLOCKING, TIMECODE_SYNTHESIZE,
};
pub use loopback::{CallCounts, LoopbackSdk, SentFrame};
#[cfg(feature = "ndi")]
pub use ndi::NdiSdk;

/// Result type for SDK operations.
pub type SdkResult<T> = Result<T, SdkError>;

/// Channel capacity for the loopback frame monitor.
pub const MONITOR_CHANNEL_CAPACITY: usize = 64;

/// Opaque native sender instance.
///
/// Only the backend that produced a handle can interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(usize);

impl NativeHandle {
    /// Wrap a raw instance value.
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// Get the raw instance value.
    pub fn as_raw(self) -> usize {
        self.0
    }
}

/// The native send API.
///
/// Every call except `create` takes a handle that must still be live; the
/// engine guarantees that no call is made after `destroy` and that
/// `destroy` runs at most once per handle.
pub trait SendSdk: Send + Sync {
    /// Create a sender. Fails when the factory returns no instance.
    fn create(&self, desc: &SendCreateDesc) -> SdkResult<NativeHandle>;

    /// Destroy a sender.
    fn destroy(&self, handle: NativeHandle);

    /// Send one video frame. Blocks while the SDK clocks video, if enabled.
    fn send_video(&self, handle: NativeHandle, frame: &VideoFrame<'_>) -> SdkResult<()>;

    /// Send one audio frame. Blocks while the SDK clocks audio, if enabled.
    fn send_audio(&self, handle: NativeHandle, frame: &AudioFrame<'_>) -> SdkResult<()>;

    /// Number of current receivers.
    fn connection_count(&self, handle: NativeHandle, timeout_ms: u32) -> i32;

    /// Poll tally state. Returns whether it changed since the last poll.
    fn tally(&self, handle: NativeHandle, timeout_ms: u32) -> (bool, Tally);

    /// Canonical discovery name of the sender.
    fn source_name(&self, handle: NativeHandle) -> SdkResult<String>;

    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;
}
