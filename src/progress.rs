//! Progress-callback trait for per-segment generation events.
//!
//! Inject an [`Arc<dyn SegmentProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to observe a
//! run as it happens: the CLI drives a progress bar from it, a server could
//! forward events to a metrics sink.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2quiz::{PipelineConfig, SegmentProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct RetryCounter {
//!     retries: AtomicUsize,
//! }
//!
//! impl SegmentProgressCallback for RetryCounter {
//!     fn on_attempt_failed(&self, segment: usize, attempt: u32, reason: &str) {
//!         self.retries.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("segment {segment}: attempt {attempt} failed: {reason}");
//!     }
//! }
//!
//! let counter = Arc::new(RetryCounter { retries: AtomicUsize::new(0) });
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn SegmentProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes each segment.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// With `concurrency > 1` segments run concurrently, so every method except
/// `on_run_start` / `on_run_complete` may be called from several tasks at
/// once. Guard shared state with `Mutex` or atomics.
pub trait SegmentProgressCallback: Send + Sync {
    /// Called once after planning, before the first backend call.
    fn on_run_start(&self, total_segments: usize) {
        let _ = total_segments;
    }

    /// Called before the first attempt of a segment.
    ///
    /// `segment` is 0-based.
    fn on_segment_start(&self, segment: usize, total_segments: usize) {
        let _ = (segment, total_segments);
    }

    /// Called after each failed attempt (backend failure or unusable output).
    ///
    /// `attempt` is 1-based.
    fn on_attempt_failed(&self, segment: usize, attempt: u32, reason: &str) {
        let _ = (segment, attempt, reason);
    }

    /// Called when a segment yields a validated candidate.
    fn on_segment_complete(&self, segment: usize, total_segments: usize, attempts: u32) {
        let _ = (segment, total_segments, attempts);
    }

    /// Called when a segment exhausts its attempts.
    fn on_segment_error(&self, segment: usize, total_segments: usize, error: &str) {
        let _ = (segment, total_segments, error);
    }

    /// Called once after every segment has been attempted.
    fn on_run_complete(&self, total_segments: usize, success_count: usize) {
        let _ = (total_segments, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl SegmentProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn SegmentProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        failures: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        succeeded: AtomicUsize,
    }

    impl SegmentProgressCallback for TrackingCallback {
        fn on_segment_start(&self, _segment: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_attempt_failed(&self, _segment: usize, _attempt: u32, _reason: &str) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }

        fn on_segment_complete(&self, _segment: usize, _total: usize, _attempts: u32) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_segment_error(&self, _segment: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_run_complete(&self, _total: usize, success_count: usize) {
            self.succeeded.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(3);
        cb.on_segment_start(0, 3);
        cb.on_attempt_failed(0, 1, "timeout");
        cb.on_segment_complete(0, 3, 2);
        cb.on_segment_error(1, 3, "exhausted");
        cb.on_run_complete(3, 2);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_segment_start(0, 2);
        tracker.on_attempt_failed(0, 1, "invalid JSON");
        tracker.on_segment_complete(0, 2, 2);
        tracker.on_segment_start(1, 2);
        tracker.on_segment_error(1, 2, "exhausted");
        tracker.on_run_complete(2, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.failures.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.succeeded.load(Ordering::SeqCst), 1);
    }
}
