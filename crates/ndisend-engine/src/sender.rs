//! The sender wrapper object handed to callers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace, warn};

use ndisend_host::HostValue;
use ndisend_sdk::SendSdk;

use crate::config::{SenderConfig, SenderOptions};
use crate::error::SendError;
use crate::handle::{HandleState, SenderHandle};
use crate::lease::LeaseLedger;
use crate::marshal::{self, AudioFrameDescriptor, VideoFrameDescriptor};
use crate::metrics::{MetricsCollector, SendMetrics};
use crate::scheduler::{Operation, Scheduler};
use crate::SendResult;

/// Downstream routing state as reported to callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TallyReport {
    /// Whether the state changed since the previous poll.
    pub changed: bool,

    /// Sender is on program output downstream.
    pub on_program: bool,

    /// Sender is on preview output downstream.
    pub on_preview: bool,
}

/// A live NDI sender.
///
/// Dropping the last reference finalizes the native sender unless
/// [`Sender::destroy`] already did. Share it across tasks with `Arc<Sender>`.
pub struct Sender {
    config: SenderConfig,
    handle: Arc<SenderHandle>,
    scheduler: Scheduler,
    ledger: Arc<LeaseLedger>,
    metrics: Arc<MetricsCollector>,
    options: SenderOptions,
}

impl Sender {
    /// Create a sender with default options.
    pub fn create(
        scheduler: &Scheduler,
        sdk: Arc<dyn SendSdk>,
        config: SenderConfig,
    ) -> Operation<Sender> {
        Self::create_with_options(scheduler, sdk, config, SenderOptions::default())
    }

    /// Create a sender. The native factory runs on a worker.
    #[instrument(name = "create_sender", skip_all, fields(name = %config.name))]
    pub fn create_with_options(
        scheduler: &Scheduler,
        sdk: Arc<dyn SendSdk>,
        config: SenderConfig,
        options: SenderOptions,
    ) -> Operation<Sender> {
        if let Err(e) = config.validate() {
            warn!("Rejected sender config: {}", e);
            return Operation::rejected(e);
        }

        let desc = config.to_create_desc();
        let owner = scheduler.clone();
        debug!(?options, "Queueing sender creation");

        scheduler.submit(
            "create",
            move || SenderHandle::create(sdk, &desc, options.serialize_sends),
            move |created| {
                let handle = created?;
                Ok(Sender {
                    config,
                    handle,
                    scheduler: owner,
                    ledger: Arc::new(LeaseLedger::new()),
                    metrics: Arc::new(MetricsCollector::new()),
                    options,
                })
            },
        )
    }

    /// Destroy the native sender. Idempotent: later calls resolve at once.
    pub fn destroy(&self) -> Operation<()> {
        if !self.handle.retire() {
            debug!(name = %self.config.name, "Sender already destroyed");
            return Operation::resolved(());
        }

        info!(name = %self.config.name, "Destroying sender");
        let handle = Arc::clone(&self.handle);
        self.scheduler
            .submit("destroy", move || handle.release_native(), |()| Ok(()))
    }

    /// Send a video frame given as a host object.
    pub fn video(&self, frame: &HostValue) -> Operation<()> {
        match marshal::video_frame(frame) {
            Ok(frame) => self.submit_video(frame),
            Err(e) => self.reject("video", e),
        }
    }

    /// Send an audio frame given as a host object.
    pub fn audio(&self, frame: &HostValue) -> Operation<()> {
        match marshal::audio_frame(frame) {
            Ok(frame) => self.submit_audio(frame),
            Err(e) => self.reject("audio", e),
        }
    }

    /// Send a typed video frame.
    pub fn send_video(&self, frame: VideoFrameDescriptor) -> Operation<()> {
        match frame.validate() {
            Ok(()) => self.submit_video(frame),
            Err(e) => self.reject("video", e),
        }
    }

    /// Send a typed audio frame.
    pub fn send_audio(&self, frame: AudioFrameDescriptor) -> Operation<()> {
        match frame.validate() {
            Ok(()) => self.submit_audio(frame),
            Err(e) => self.reject("audio", e),
        }
    }

    fn submit_video(&self, mut frame: VideoFrameDescriptor) -> Operation<()> {
        if !self.handle.is_active() {
            return self.reject("video", SendError::HandleDestroyed);
        }

        let lease = self.ledger.lease(std::mem::take(&mut frame.data));
        let len = lease.len();
        let handle = Arc::downgrade(&self.handle);
        let metrics = Arc::clone(&self.metrics);
        trace!(xres = frame.xres, yres = frame.yres, fourcc = %frame.fourcc, len, "Queueing video frame");

        self.scheduler.submit(
            "send_video",
            move || {
                let sent = match handle.upgrade() {
                    Some(handle) => handle.send_video(&frame.to_native(lease.bytes())),
                    None => Err(SendError::HandleDestroyed),
                };
                (sent, lease)
            },
            move |(sent, lease)| {
                lease.release();
                finish_send(&metrics, "video", sent, |m| m.record_video(len))
            },
        )
    }

    fn submit_audio(&self, mut frame: AudioFrameDescriptor) -> Operation<()> {
        if !self.handle.is_active() {
            return self.reject("audio", SendError::HandleDestroyed);
        }

        let lease = self.ledger.lease(std::mem::take(&mut frame.data));
        let len = lease.len();
        let handle = Arc::downgrade(&self.handle);
        let metrics = Arc::clone(&self.metrics);
        trace!(
            sample_rate = frame.sample_rate,
            no_channels = frame.no_channels,
            no_samples = frame.no_samples,
            len,
            "Queueing audio frame"
        );

        self.scheduler.submit(
            "send_audio",
            move || {
                let sent = match handle.upgrade() {
                    Some(handle) => handle.send_audio(&frame.to_native(lease.bytes())),
                    None => Err(SendError::HandleDestroyed),
                };
                (sent, lease)
            },
            move |(sent, lease)| {
                lease.release();
                finish_send(&metrics, "audio", sent, |m| m.record_audio(len))
            },
        )
    }

    fn reject(&self, kind: &'static str, error: SendError) -> Operation<()> {
        self.metrics.record_rejected();
        warn!(name = %self.config.name, kind, "Rejected send: {}", error);
        Operation::rejected(error)
    }

    /// Number of receivers currently connected.
    pub fn connections(&self) -> SendResult<i32> {
        self.handle.connection_count(self.options.query_timeout_ms)
    }

    /// Poll the downstream routing state.
    pub fn tally(&self) -> SendResult<TallyReport> {
        let (changed, tally) = self.handle.tally(self.options.query_timeout_ms)?;
        Ok(TallyReport {
            changed,
            on_program: tally.on_program,
            on_preview: tally.on_preview,
        })
    }

    /// Canonical discovery name, as receivers see it.
    pub fn source_name(&self) -> SendResult<String> {
        self.handle.source_name()
    }

    /// Name the sender was created with.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Discovery groups the sender was created with.
    pub fn groups(&self) -> Option<&str> {
        self.config.groups.as_deref()
    }

    /// Effective video clocking.
    pub fn clock_video(&self) -> bool {
        self.config.resolved_clock_video()
    }

    /// Effective audio clocking.
    pub fn clock_audio(&self) -> bool {
        self.config.resolved_clock_audio()
    }

    /// Per-sender options.
    pub fn options(&self) -> SenderOptions {
        self.options
    }

    /// Lifecycle state of the native sender.
    pub fn state(&self) -> HandleState {
        self.handle.state()
    }

    /// Snapshot of send statistics.
    pub fn metrics(&self) -> SendMetrics {
        self.metrics.snapshot()
    }

    /// Buffers held by pending sends.
    pub fn outstanding_buffers(&self) -> u64 {
        self.ledger.outstanding()
    }

    /// Buffers leased to sends so far.
    pub fn leased_buffers(&self) -> u64 {
        self.ledger.issued()
    }

    /// Buffers released by completed or abandoned sends.
    pub fn released_buffers(&self) -> u64 {
        self.ledger.released()
    }
}

impl std::fmt::Debug for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("name", &self.config.name)
            .field("state", &self.handle.state())
            .finish()
    }
}

impl Drop for Sender {
    fn drop(&mut self) {
        debug!(
            name = %self.config.name,
            state = self.handle.state().name(),
            "Sender dropped"
        );
    }
}

fn finish_send(
    metrics: &MetricsCollector,
    kind: &'static str,
    sent: SendResult<()>,
    record: impl FnOnce(&MetricsCollector),
) -> SendResult<()> {
    match sent {
        Ok(()) => {
            record(metrics);
            Ok(())
        }
        Err(e) => {
            metrics.record_failure();
            warn!(kind, "Send failed: {}", e);
            Err(e)
        }
    }
}

/// Create a sender from a host configuration object.
///
/// Configuration errors come back as a rejected operation.
pub fn create_sender(
    scheduler: &Scheduler,
    sdk: Arc<dyn SendSdk>,
    config: &HostValue,
) -> Operation<Sender> {
    match marshal::sender_config(config) {
        Ok(config) => Sender::create(scheduler, sdk, config),
        Err(e) => {
            warn!("Rejected sender config: {}", e);
            Operation::rejected(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use ndisend_sdk::{LoopbackSdk, Tally, VideoFourCc};

    use super::*;
    use crate::config::SchedulerConfig;

    fn setup() -> (Scheduler, Arc<LoopbackSdk>) {
        (
            Scheduler::new(SchedulerConfig::default()).unwrap(),
            Arc::new(LoopbackSdk::new()),
        )
    }

    #[tokio::test]
    async fn test_create_reports_properties() {
        let (scheduler, sdk) = setup();
        let config = HostValue::object([
            ("name", HostValue::from("Studio A")),
            ("clockAudio", HostValue::from(false)),
        ]);

        let sender = create_sender(&scheduler, sdk.clone(), &config)
            .await
            .unwrap();

        assert_eq!(sender.name(), "Studio A");
        assert!(sender.clock_video());
        assert!(!sender.clock_audio());
        assert_eq!(sender.state(), HandleState::Active);
        assert_eq!(sender.source_name().unwrap(), "LOOPBACK (Studio A)");
        assert!(!sdk.create_desc("Studio A").unwrap().clock_audio);
    }

    #[tokio::test]
    async fn test_non_object_config_is_invalid_args() {
        let (scheduler, sdk) = setup();
        let err = create_sender(&scheduler, sdk, &HostValue::from("Studio A"))
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::InvalidArgs(_)));
        assert_eq!(scheduler.submitted(), 0);
    }

    #[tokio::test]
    async fn test_tally_report() {
        let (scheduler, sdk) = setup();
        let sender = Sender::create(&scheduler, sdk.clone(), SenderConfig::new("Cam"))
            .await
            .unwrap();

        sdk.set_tally(
            "Cam",
            Tally {
                on_program: true,
                on_preview: false,
            },
        );
        let report = sender.tally().unwrap();
        assert_eq!(
            report,
            TallyReport {
                changed: true,
                on_program: true,
                on_preview: false,
            }
        );

        let json = serde_json::to_value(report).unwrap();
        assert_eq!(json["onProgram"], true);
        assert_eq!(json["changed"], true);
    }

    #[tokio::test]
    async fn test_metrics_track_sends() {
        let (scheduler, sdk) = setup();
        let sender = Sender::create(&scheduler, sdk, SenderConfig::new("Cam"))
            .await
            .unwrap();

        let frame = VideoFrameDescriptor::new(8, 2, VideoFourCc::Bgrx, Bytes::from(vec![0u8; 64]));
        sender.send_video(frame).await.unwrap();

        let short = VideoFrameDescriptor::new(8, 2, VideoFourCc::Bgrx, Bytes::from(vec![0u8; 8]));
        let err = sender.send_video(short).await.unwrap_err();
        assert!(matches!(err, SendError::BufferTooSmall { .. }));

        let metrics = sender.metrics();
        assert_eq!(metrics.video_frames, 1);
        assert_eq!(metrics.bytes_sent, 64);
        assert_eq!(metrics.rejected_sends, 1);
        assert_eq!(sender.leased_buffers(), 1);
    }

    #[tokio::test]
    async fn test_sdk_rejection_counts_as_failure() {
        let (scheduler, sdk) = setup();
        let sender = Sender::create(&scheduler, sdk.clone(), SenderConfig::new("Cam"))
            .await
            .unwrap();
        sdk.set_reject_sends(true);

        let frame = VideoFrameDescriptor::new(8, 2, VideoFourCc::Bgrx, Bytes::from(vec![0u8; 64]));
        let err = sender.send_video(frame).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Sdk);

        let metrics = sender.metrics();
        assert_eq!(metrics.failed_sends, 1);
        assert_eq!(metrics.video_frames, 0);
        assert_eq!(sender.released_buffers(), 1);
        assert_eq!(sender.state(), HandleState::Active);
    }

    #[tokio::test]
    async fn test_queries_after_destroy() {
        let (scheduler, sdk) = setup();
        let sender = Sender::create(&scheduler, sdk, SenderConfig::new("Cam"))
            .await
            .unwrap();
        sender.destroy().await.unwrap();

        assert_eq!(sender.state(), HandleState::Destroyed);
        assert!(matches!(sender.connections(), Err(SendError::HandleDestroyed)));
        assert!(matches!(sender.tally(), Err(SendError::HandleDestroyed)));
        assert!(matches!(sender.source_name(), Err(SendError::HandleDestroyed)));
    }
}
