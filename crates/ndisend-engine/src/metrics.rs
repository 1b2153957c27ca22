//! Per-sender send statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Snapshot of a sender's statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMetrics {
    /// Video frames accepted by the SDK.
    pub video_frames: u64,

    /// Audio frames accepted by the SDK.
    pub audio_frames: u64,

    /// Frame payload bytes handed to the SDK.
    pub bytes_sent: u64,

    /// Sends that reached a worker and then failed.
    pub failed_sends: u64,

    /// Sends rejected before any native work was queued.
    pub rejected_sends: u64,

    /// Average video frames per second since creation.
    pub video_fps: f32,

    /// Seconds since the sender was created.
    pub uptime_seconds: u64,
}

/// Collects send statistics for one sender.
pub struct MetricsCollector {
    start_time: Instant,
    video_frames: AtomicU64,
    audio_frames: AtomicU64,
    bytes_sent: AtomicU64,
    failed_sends: AtomicU64,
    rejected_sends: AtomicU64,
}

impl MetricsCollector {
    /// Create a new collector, starting the uptime clock.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            video_frames: AtomicU64::new(0),
            audio_frames: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            failed_sends: AtomicU64::new(0),
            rejected_sends: AtomicU64::new(0),
        }
    }

    /// Record a video frame sent.
    pub fn record_video(&self, bytes: usize) {
        self.video_frames.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record an audio frame sent.
    pub fn record_audio(&self, bytes: usize) {
        self.audio_frames.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record a send that failed on a worker.
    pub fn record_failure(&self) {
        self.failed_sends.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a send rejected during validation.
    pub fn record_rejected(&self) {
        self.rejected_sends.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> SendMetrics {
        let elapsed = self.start_time.elapsed();
        let video_frames = self.video_frames.load(Ordering::Relaxed);

        let video_fps = if elapsed.as_secs_f32() > 0.0 {
            video_frames as f32 / elapsed.as_secs_f32()
        } else {
            0.0
        };

        SendMetrics {
            video_frames,
            audio_frames: self.audio_frames.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            failed_sends: self.failed_sends.load(Ordering::Relaxed),
            rejected_sends: self.rejected_sends.load(Ordering::Relaxed),
            video_fps,
            uptime_seconds: elapsed.as_secs(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = MetricsCollector::new();
        metrics.record_video(7680 * 1080);
        metrics.record_audio(4800 * 2 * 4);
        metrics.record_failure();
        metrics.record_rejected();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.video_frames, 1);
        assert_eq!(snapshot.audio_frames, 1);
        assert_eq!(snapshot.bytes_sent, 7680 * 1080 + 4800 * 2 * 4);
        assert_eq!(snapshot.failed_sends, 1);
        assert_eq!(snapshot.rejected_sends, 1);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let json = serde_json::to_value(MetricsCollector::new().snapshot()).unwrap();
        assert_eq!(json["videoFrames"], 0);
        assert!(json.get("bytesSent").is_some());
    }
}
