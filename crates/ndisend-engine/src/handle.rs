//! Native sender handle lifecycle.
//!
//! A [`SenderHandle`] owns one native sender. It is destroyed at most once,
//! by whichever comes first of an explicit destroy and finalization (the
//! last strong reference going away). Every native call runs under an
//! in-flight guard; destruction first marks the handle `Destroyed` so new
//! calls fail fast, then waits for outstanding calls before releasing the
//! native instance.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use ndisend_sdk::{AudioFrame, NativeHandle, SdkError, SendCreateDesc, SendSdk, Tally, VideoFrame};

use crate::error::SendError;
use crate::SendResult;

/// Lifecycle state of a sender handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandleState {
    /// No native sender requested yet.
    #[default]
    Uninitialized,

    /// Native creation queued or running.
    Creating,

    /// Native sender live.
    Active,

    /// Destroyed explicitly or finalized. Terminal.
    Destroyed,
}

impl HandleState {
    /// Check whether moving to `next` is a legal transition.
    pub fn can_transition_to(self, next: HandleState) -> bool {
        matches!(
            (self, next),
            (Self::Uninitialized, Self::Creating)
                | (Self::Creating, Self::Active)
                | (Self::Active, Self::Destroyed)
        )
    }

    /// Returns true if the handle accepts native calls.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns a simple string representation of the state.
    pub fn name(self) -> &'static str {
        match self {
            Self::Uninitialized => "Uninitialized",
            Self::Creating => "Creating",
            Self::Active => "Active",
            Self::Destroyed => "Destroyed",
        }
    }
}

struct Slot {
    state: HandleState,
    in_flight: usize,
    released: bool,
}

/// One native sender and the guard around it.
pub struct SenderHandle {
    sdk: Arc<dyn SendSdk>,
    native: NativeHandle,
    slot: Mutex<Slot>,
    drained: Condvar,
    send_lock: Option<Mutex<()>>,
}

impl SenderHandle {
    /// Create the native sender. Blocks in the SDK; run it on a worker.
    #[instrument(name = "sender_create", skip(sdk, desc), fields(name = %desc.ndi_name))]
    pub fn create(
        sdk: Arc<dyn SendSdk>,
        desc: &SendCreateDesc,
        serialize_sends: bool,
    ) -> SendResult<Arc<Self>> {
        let mut state = HandleState::Uninitialized;
        transition(&mut state, HandleState::Creating);

        let native = sdk.create(desc).map_err(|e| match e {
            SdkError::CreateFailed(reason) => SendError::CreateFailed(reason),
            other => SendError::CreateFailed(other.to_string()),
        })?;
        transition(&mut state, HandleState::Active);

        info!(
            backend = sdk.name(),
            handle = native.as_raw(),
            clock_video = desc.clock_video,
            clock_audio = desc.clock_audio,
            "Sender created"
        );

        Ok(Arc::new(Self {
            sdk,
            native,
            slot: Mutex::new(Slot {
                state,
                in_flight: 0,
                released: false,
            }),
            drained: Condvar::new(),
            send_lock: serialize_sends.then(|| Mutex::new(())),
        }))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> HandleState {
        self.slot.lock().state
    }

    /// Returns true while native calls are accepted.
    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Native calls currently executing.
    pub fn in_flight(&self) -> usize {
        self.slot.lock().in_flight
    }

    /// Whether the native destructor has run.
    pub fn is_released(&self) -> bool {
        self.slot.lock().released
    }

    /// Mark the handle destroyed. Returns true for the first caller only;
    /// that caller must follow up with [`SenderHandle::release_native`].
    pub fn retire(&self) -> bool {
        let mut slot = self.slot.lock();
        if !slot.state.is_active() {
            return false;
        }
        transition(&mut slot.state, HandleState::Destroyed);
        true
    }

    /// Wait for outstanding native calls, then run the native destructor.
    /// Only the first call after [`SenderHandle::retire`] has any effect.
    pub fn release_native(&self) {
        let mut slot = self.slot.lock();
        if slot.state.is_active() {
            warn!("release_native called on an active handle");
            return;
        }
        while slot.in_flight > 0 {
            debug!(in_flight = slot.in_flight, "Waiting for native calls to drain");
            self.drained.wait(&mut slot);
        }
        if slot.released {
            return;
        }
        slot.released = true;
        drop(slot);

        self.sdk.destroy(self.native);
        info!(handle = self.native.as_raw(), "Native sender destroyed");
    }

    /// Retire and release in one step. Returns true if this call destroyed
    /// the native sender.
    pub fn destroy(&self) -> bool {
        if !self.retire() {
            return false;
        }
        self.release_native();
        true
    }

    fn acquire(&self) -> SendResult<CallGuard<'_>> {
        let mut slot = self.slot.lock();
        if !slot.state.is_active() {
            return Err(SendError::HandleDestroyed);
        }
        slot.in_flight += 1;
        Ok(CallGuard { handle: self })
    }

    fn serial(&self) -> Option<MutexGuard<'_, ()>> {
        self.send_lock.as_ref().map(|lock| lock.lock())
    }

    /// Send a video frame against the live handle.
    pub fn send_video(&self, frame: &VideoFrame<'_>) -> SendResult<()> {
        let _guard = self.acquire()?;
        let _serial = self.serial();
        self.sdk.send_video(self.native, frame)?;
        Ok(())
    }

    /// Send an audio frame against the live handle.
    pub fn send_audio(&self, frame: &AudioFrame<'_>) -> SendResult<()> {
        let _guard = self.acquire()?;
        let _serial = self.serial();
        self.sdk.send_audio(self.native, frame)?;
        Ok(())
    }

    /// Number of connected receivers.
    pub fn connection_count(&self, timeout_ms: u32) -> SendResult<i32> {
        let _guard = self.acquire()?;
        Ok(self.sdk.connection_count(self.native, timeout_ms).max(0))
    }

    /// Poll tally state.
    pub fn tally(&self, timeout_ms: u32) -> SendResult<(bool, Tally)> {
        let _guard = self.acquire()?;
        Ok(self.sdk.tally(self.native, timeout_ms))
    }

    /// Canonical discovery name.
    pub fn source_name(&self) -> SendResult<String> {
        let _guard = self.acquire()?;
        Ok(self.sdk.source_name(self.native)?)
    }
}

impl Drop for SenderHandle {
    fn drop(&mut self) {
        // No guards can exist here: each one borrows a strong reference.
        if self.retire() {
            info!(handle = self.native.as_raw(), "Finalizing unreachable sender");
        }
        // Also covers a destroy whose release never got a worker.
        self.release_native();
    }
}

/// Marks one native call in flight.
struct CallGuard<'a> {
    handle: &'a SenderHandle,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.handle.slot.lock();
        slot.in_flight -= 1;
        if slot.in_flight == 0 {
            self.handle.drained.notify_all();
        }
    }
}

fn transition(state: &mut HandleState, next: HandleState) {
    debug_assert!(
        state.can_transition_to(next),
        "illegal transition {} -> {}",
        state.name(),
        next.name()
    );
    debug!(previous = state.name(), current = next.name(), "Handle state transition");
    *state = next;
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use bytes::Bytes;
    use ndisend_sdk::{LoopbackSdk, VideoFourCc};

    use super::*;
    use crate::marshal::VideoFrameDescriptor;

    fn handle(sdk: &Arc<LoopbackSdk>, name: &str) -> Arc<SenderHandle> {
        let sdk: Arc<dyn SendSdk> = sdk.clone();
        SenderHandle::create(sdk, &SendCreateDesc::new(name), true).unwrap()
    }

    #[test]
    fn test_state_transitions() {
        assert!(HandleState::Uninitialized.can_transition_to(HandleState::Creating));
        assert!(HandleState::Creating.can_transition_to(HandleState::Active));
        assert!(HandleState::Active.can_transition_to(HandleState::Destroyed));
        assert!(!HandleState::Destroyed.can_transition_to(HandleState::Active));
        assert!(!HandleState::Destroyed.can_transition_to(HandleState::Destroyed));
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let sdk = Arc::new(LoopbackSdk::new());
        let h = handle(&sdk, "Cam");

        assert!(h.destroy());
        assert!(!h.destroy());
        drop(h);

        assert_eq!(sdk.calls("Cam").unwrap().destroys, 1);
    }

    #[test]
    fn test_finalize_destroys_once() {
        let sdk = Arc::new(LoopbackSdk::new());
        drop(handle(&sdk, "Cam"));

        assert_eq!(sdk.calls("Cam").unwrap().destroys, 1);
        assert_eq!(sdk.live_senders(), 0);
    }

    #[test]
    fn test_calls_after_destroy_fail_fast() {
        let sdk = Arc::new(LoopbackSdk::new());
        let h = handle(&sdk, "Cam");
        h.destroy();

        assert!(matches!(h.connection_count(0), Err(SendError::HandleDestroyed)));
        assert!(matches!(h.tally(0), Err(SendError::HandleDestroyed)));
        assert!(matches!(h.source_name(), Err(SendError::HandleDestroyed)));
        assert_eq!(sdk.calls("Cam").unwrap().after_destroy, 0);
    }

    #[test]
    fn test_destroy_waits_for_in_flight_send() {
        let sdk = Arc::new(LoopbackSdk::new());
        sdk.set_send_delay(Duration::from_millis(100));
        let h = handle(&sdk, "Cam");

        let sender = Arc::clone(&h);
        let worker = thread::spawn(move || {
            let frame = VideoFrameDescriptor::new(
                4,
                4,
                VideoFourCc::Bgra,
                Bytes::from(vec![0u8; 64]),
            );
            sender.send_video(&frame.to_native(&frame.data))
        });

        // Let the send get past its guard.
        while h.in_flight() == 0 {
            thread::yield_now();
        }
        assert!(h.destroy());
        assert_eq!(h.in_flight(), 0);
        assert!(h.is_released());

        worker.join().unwrap().unwrap();
        let calls = sdk.calls("Cam").unwrap();
        assert_eq!(calls.video_sends, 1);
        assert_eq!(calls.destroys, 1);
        assert_eq!(calls.after_destroy, 0);
    }
}
