//! Host-driven frame loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;

use super::bridge::{BridgeInstance, FrameStatus};
use crate::audio::AudioHost;
use crate::config::WindowConfig;
use crate::error::Result;
use crate::gl::GraphicsContext;
use crate::web::FrameCallback;

/// Shared stop flag for a running [`FrameLoop`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the loop to stop before its next frame.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether [`cancel`](Self::cancel) was called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why the frame loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The cancel token fired
    Cancelled,
    /// The configured frame limit was reached
    FrameLimit,
    /// The frame function returned false (only with `stop_on_false_frame`)
    GuestStopped,
    /// The guest called `proc_exit`
    Exited(i32),
}

/// Most recent frame times kept for percentiles.
pub const FRAME_STATS_WINDOW: usize = 4096;

/// Frame time statistics, in microseconds.
///
/// Count, min, max and mean cover every frame; percentiles cover the last
/// [`FRAME_STATS_WINDOW`] frames.
#[derive(Debug, Clone, Default)]
pub struct FrameStats {
    count: u64,
    total_us: u64,
    min_us: Option<u64>,
    max_us: u64,
    recent: VecDeque<u64>,
}

impl FrameStats {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one frame time in microseconds.
    pub fn record(&mut self, us: u64) {
        self.count += 1;
        self.total_us = self.total_us.saturating_add(us);
        self.min_us = Some(self.min_us.map_or(us, |m| m.min(us)));
        self.max_us = self.max_us.max(us);
        if self.recent.len() == FRAME_STATS_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(us);
    }

    /// Frames recorded.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean frame time.
    pub fn mean_us(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total_us as f64 / self.count as f64
    }

    /// Median frame time.
    pub fn p50_us(&self) -> u64 {
        self.percentile(50)
    }

    /// 99th percentile frame time.
    pub fn p99_us(&self) -> u64 {
        self.percentile(99)
    }

    /// Get a percentile value over the recent window.
    pub fn percentile(&self, p: usize) -> u64 {
        if self.recent.is_empty() {
            return 0;
        }
        let mut sorted: Vec<u64> = self.recent.iter().copied().collect();
        sorted.sort_unstable();
        let idx = (p * sorted.len() / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Fastest frame.
    pub fn min_us(&self) -> u64 {
        self.min_us.unwrap_or(0)
    }

    /// Slowest frame.
    pub fn max_us(&self) -> u64 {
        self.max_us
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        format!(
            "frames={} min={}us mean={:.1}us p50={}us p99={}us max={}us",
            self.count(),
            self.min_us(),
            self.mean_us(),
            self.p50_us(),
            self.p99_us(),
            self.max_us()
        )
    }
}

/// Calls the guest's frame function on a fixed interval.
#[derive(Debug, Clone)]
pub struct FrameLoop {
    interval: Duration,
    max_frames: Option<u64>,
    cancel: CancelToken,
}

impl FrameLoop {
    /// A loop ticking every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_frames: None,
            cancel: CancelToken::new(),
        }
    }

    /// A loop at the configured refresh rate.
    pub fn from_config(config: &WindowConfig) -> Self {
        Self::new(config.frame_interval())
    }

    /// Stop after `frames` frames.
    pub fn with_max_frames(mut self, frames: u64) -> Self {
        self.max_frames = Some(frames);
        self
    }

    /// Use an existing cancel token.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// The loop's cancel token.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Tick interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Drive `instance` starting with `callback` until something stops it.
    ///
    /// A registration made by the guest during a frame replaces `callback`
    /// from the next tick on. A trap inside a frame ends the loop with an
    /// error.
    pub async fn run<G, A>(
        &self,
        instance: &mut BridgeInstance<G, A>,
        callback: FrameCallback,
    ) -> Result<(LoopExit, FrameStats)>
    where
        G: GraphicsContext + 'static,
        A: AudioHost + 'static,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut stats = FrameStats::new();
        let mut callback = callback;
        let mut frames: u64 = 0;

        tracing::info!(
            interval_us = self.interval.as_micros() as u64,
            max_frames = ?self.max_frames,
            "frame loop started"
        );

        let exit = loop {
            if self.max_frames.is_some_and(|max| frames >= max) {
                break LoopExit::FrameLimit;
            }

            ticker.tick().await;
            if self.cancel.is_cancelled() {
                break LoopExit::Cancelled;
            }

            let start = Instant::now();
            let status = instance.call_frame(callback)?;
            stats.record(start.elapsed().as_micros() as u64);
            frames += 1;

            match status {
                FrameStatus::Continue => {}
                FrameStatus::Stop => break LoopExit::GuestStopped,
                FrameStatus::Exited(code) => break LoopExit::Exited(code),
            }

            if let Some(latest) = instance.host().web.frame_callback() {
                callback = latest;
            }
        };

        tracing::info!(?exit, "{}", stats.summary());
        Ok((exit, stats))
    }
}
