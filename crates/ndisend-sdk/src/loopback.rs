//! In-process SDK backend.
//!
//! Behaves like the vendor runtime from the caller's point of view but keeps
//! everything in memory: senders are table entries, frames go to an
//! optional monitor channel, and receivers/tally are driven by the owner.
//! Every call is counted per handle so misuse (double destroy, calls on a
//! destroyed handle) is observable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::error::SdkError;
use crate::frame::{AudioFourCc, AudioFrame, SendCreateDesc, Tally, VideoFourCc, VideoFrame};
use crate::{NativeHandle, SdkResult, SendSdk, MONITOR_CHANNEL_CAPACITY};

/// Machine name used to build canonical source names.
const DEFAULT_MACHINE_NAME: &str = "LOOPBACK";

/// Per-handle call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub destroys: u32,
    pub video_sends: u64,
    pub audio_sends: u64,
    pub queries: u64,

    /// Calls of any kind made after the handle was destroyed.
    pub after_destroy: u64,
}

/// A frame observed by the loopback monitor.
#[derive(Debug, Clone, PartialEq)]
pub enum SentFrame {
    Video {
        sender: String,
        xres: i32,
        yres: i32,
        fourcc: VideoFourCc,
        timecode: i64,
        len: usize,
    },
    Audio {
        sender: String,
        sample_rate: i32,
        no_channels: i32,
        no_samples: i32,
        fourcc: AudioFourCc,
        timecode: i64,
        len: usize,
    },
}

struct LoopbackSender {
    desc: SendCreateDesc,
    source_name: String,
    connections: i32,
    tally: Tally,
    tally_changed: bool,
    live: bool,
    calls: CallCounts,
}

/// In-memory implementation of [`SendSdk`].
pub struct LoopbackSdk {
    machine_name: String,
    next_id: AtomicUsize,
    senders: Mutex<HashMap<NativeHandle, LoopbackSender>>,
    fail_create: AtomicBool,
    reject_sends: AtomicBool,
    send_delay: RwLock<Duration>,
    monitor: Mutex<Option<Sender<SentFrame>>>,
}

impl LoopbackSdk {
    /// Create a loopback backend.
    pub fn new() -> Self {
        Self::with_machine_name(DEFAULT_MACHINE_NAME)
    }

    /// Create a loopback backend that reports the given machine name.
    pub fn with_machine_name(machine_name: impl Into<String>) -> Self {
        Self {
            machine_name: machine_name.into(),
            next_id: AtomicUsize::new(1),
            senders: Mutex::new(HashMap::new()),
            fail_create: AtomicBool::new(false),
            reject_sends: AtomicBool::new(false),
            send_delay: RwLock::new(Duration::ZERO),
            monitor: Mutex::new(None),
        }
    }

    /// Make every following `create` return no instance.
    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Make every following send fail after reaching the backend.
    pub fn set_reject_sends(&self, reject: bool) {
        self.reject_sends.store(reject, Ordering::SeqCst);
    }

    /// Block each send for the given duration, like a clocked sender.
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.write() = delay;
    }

    /// Tap sent frames. Frames are dropped when the channel is full.
    pub fn monitor(&self) -> Receiver<SentFrame> {
        let (tx, rx) = crossbeam_channel::bounded(MONITOR_CHANNEL_CAPACITY);
        *self.monitor.lock() = Some(tx);
        rx
    }

    /// Set the receiver count of the live sender with the given name.
    pub fn set_connections(&self, ndi_name: &str, connections: i32) -> bool {
        self.with_live(ndi_name, |s| s.connections = connections.max(0))
    }

    /// Change the routing state of the live sender with the given name.
    ///
    /// The next tally poll reports `changed` only if the state differs.
    pub fn set_tally(&self, ndi_name: &str, tally: Tally) -> bool {
        self.with_live(ndi_name, |s| {
            if s.tally != tally {
                s.tally = tally;
                s.tally_changed = true;
            }
        })
    }

    /// Call counters of the most recent sender created with the given name.
    pub fn calls(&self, ndi_name: &str) -> Option<CallCounts> {
        let senders = self.senders.lock();
        senders
            .iter()
            .filter(|(_, s)| s.desc.ndi_name == ndi_name)
            .max_by_key(|(h, _)| h.as_raw())
            .map(|(_, s)| s.calls)
    }

    /// Descriptor the most recent sender with the given name was created with.
    pub fn create_desc(&self, ndi_name: &str) -> Option<SendCreateDesc> {
        let senders = self.senders.lock();
        senders
            .iter()
            .filter(|(_, s)| s.desc.ndi_name == ndi_name)
            .max_by_key(|(h, _)| h.as_raw())
            .map(|(_, s)| s.desc.clone())
    }

    /// Number of senders not yet destroyed.
    pub fn live_senders(&self) -> usize {
        self.senders.lock().values().filter(|s| s.live).count()
    }

    fn with_live(&self, ndi_name: &str, f: impl FnOnce(&mut LoopbackSender)) -> bool {
        let mut senders = self.senders.lock();
        match senders
            .values_mut()
            .find(|s| s.live && s.desc.ndi_name == ndi_name)
        {
            Some(sender) => {
                f(sender);
                true
            }
            None => false,
        }
    }

    /// Run `f` against a handle, counting the call. Returns None for
    /// destroyed or unknown handles.
    fn touch<T>(
        &self,
        handle: NativeHandle,
        count: impl FnOnce(&mut CallCounts),
        f: impl FnOnce(&mut LoopbackSender) -> T,
    ) -> Option<T> {
        let mut senders = self.senders.lock();
        let sender = senders.get_mut(&handle)?;
        if !sender.live {
            sender.calls.after_destroy += 1;
            warn!(handle = handle.as_raw(), "Call on destroyed loopback sender");
            return None;
        }
        count(&mut sender.calls);
        Some(f(sender))
    }

    fn emit(&self, frame: SentFrame) {
        if let Some(tx) = self.monitor.lock().as_ref() {
            if tx.try_send(frame).is_err() {
                trace!("Monitor channel full, frame dropped");
            }
        }
    }

    fn check_accepting(&self, handle: NativeHandle) -> SdkResult<()> {
        if self.reject_sends.load(Ordering::SeqCst) {
            return Err(SdkError::SendRejected(format!(
                "loopback sends disabled for handle {:#x}",
                handle.as_raw()
            )));
        }
        Ok(())
    }

    fn pace(&self) {
        let delay = *self.send_delay.read();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

impl Default for LoopbackSdk {
    fn default() -> Self {
        Self::new()
    }
}

impl SendSdk for LoopbackSdk {
    fn create(&self, desc: &SendCreateDesc) -> SdkResult<NativeHandle> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(SdkError::CreateFailed("loopback create disabled".into()));
        }

        let mut senders = self.senders.lock();
        if senders
            .values()
            .any(|s| s.live && s.desc.ndi_name == desc.ndi_name)
        {
            return Err(SdkError::CreateFailed(format!(
                "sender name already in use: {}",
                desc.ndi_name
            )));
        }

        let handle = NativeHandle::from_raw(self.next_id.fetch_add(1, Ordering::SeqCst));
        senders.insert(
            handle,
            LoopbackSender {
                desc: desc.clone(),
                source_name: format!("{} ({})", self.machine_name, desc.ndi_name),
                connections: 0,
                tally: Tally::default(),
                tally_changed: false,
                live: true,
                calls: CallCounts::default(),
            },
        );

        debug!(handle = handle.as_raw(), name = %desc.ndi_name, "Loopback sender created");
        Ok(handle)
    }

    fn destroy(&self, handle: NativeHandle) {
        let mut senders = self.senders.lock();
        match senders.get_mut(&handle) {
            Some(sender) => {
                sender.calls.destroys += 1;
                if !sender.live {
                    warn!(handle = handle.as_raw(), "Loopback sender destroyed twice");
                }
                sender.live = false;
                debug!(handle = handle.as_raw(), "Loopback sender destroyed");
            }
            None => warn!(handle = handle.as_raw(), "Destroy of unknown loopback sender"),
        }
    }

    fn send_video(&self, handle: NativeHandle, frame: &VideoFrame<'_>) -> SdkResult<()> {
        let sender = self
            .touch(handle, |c| c.video_sends += 1, |s| s.desc.ndi_name.clone())
            .ok_or(SdkError::UnknownHandle(handle.as_raw()))?;

        self.check_accepting(handle)?;
        self.pace();
        self.emit(SentFrame::Video {
            sender,
            xres: frame.xres,
            yres: frame.yres,
            fourcc: frame.fourcc,
            timecode: frame.timecode,
            len: frame.data.len(),
        });
        Ok(())
    }

    fn send_audio(&self, handle: NativeHandle, frame: &AudioFrame<'_>) -> SdkResult<()> {
        let sender = self
            .touch(handle, |c| c.audio_sends += 1, |s| s.desc.ndi_name.clone())
            .ok_or(SdkError::UnknownHandle(handle.as_raw()))?;

        self.check_accepting(handle)?;
        self.pace();
        self.emit(SentFrame::Audio {
            sender,
            sample_rate: frame.sample_rate,
            no_channels: frame.no_channels,
            no_samples: frame.no_samples,
            fourcc: frame.fourcc,
            timecode: frame.timecode,
            len: frame.data.len(),
        });
        Ok(())
    }

    fn connection_count(&self, handle: NativeHandle, _timeout_ms: u32) -> i32 {
        self.touch(handle, |c| c.queries += 1, |s| s.connections)
            .unwrap_or(0)
    }

    fn tally(&self, handle: NativeHandle, _timeout_ms: u32) -> (bool, Tally) {
        self.touch(
            handle,
            |c| c.queries += 1,
            |s| {
                let changed = std::mem::take(&mut s.tally_changed);
                (changed, s.tally)
            },
        )
        .unwrap_or_default()
    }

    fn source_name(&self, handle: NativeHandle) -> SdkResult<String> {
        self.touch(handle, |c| c.queries += 1, |s| s.source_name.clone())
            .ok_or(SdkError::UnknownHandle(handle.as_raw()))
    }

    fn name(&self) -> &'static str {
        "loopback"
    }
}
