//! Audio session state and the queue pacing algorithm.

use byteorder::{ByteOrder, LittleEndian};

use super::device::{AudioHost, AudioOutput, PlaybackUnit};
use crate::config::AudioConfig;
use crate::error::Result;
use crate::memory::{GuestPtr, MemoryView};

/// Bytes per stereo 16-bit frame.
const FRAME_BYTES: usize = 4;

/// Why a queued buffer was not scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// `MTY_AudioCreate` has not been called
    NoSession,
    /// Zero frames
    Empty,
    /// Session sample rate is zero
    InvalidRate,
    /// Schedule already runs more than the maximum lead ahead
    Backpressure,
    /// Sample range falls outside guest memory
    OutOfBounds,
    /// The host could not open or write to the output
    DeviceUnavailable,
}

/// Result of one `MTY_AudioQueue` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueueOutcome {
    /// Buffer placed on the timeline
    Scheduled {
        /// Device time of the first frame
        start: f64,
        /// Seconds of audio
        duration: f64,
    },
    /// Buffer discarded
    Dropped(DropReason),
}

struct Session<O> {
    sample_rate: u32,
    playing: bool,
    output: Option<O>,
    next_time: f64,
}

/// Owns the audio session and paces queued buffers onto the device clock.
pub struct AudioScheduler<H: AudioHost> {
    host: H,
    config: AudioConfig,
    session: Option<Session<H::Output>>,
}

impl<H: AudioHost> AudioScheduler<H> {
    /// Create a scheduler with no session.
    pub fn new(host: H, config: AudioConfig) -> Self {
        Self {
            host,
            config,
            session: None,
        }
    }

    /// The device host.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The open output, once the first buffer has been queued.
    pub fn output(&self) -> Option<&H::Output> {
        self.session.as_ref().and_then(|s| s.output.as_ref())
    }

    /// Whether a session exists.
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Start a session. The device opens lazily on the first queue.
    pub fn create(&mut self, sample_rate: u32) {
        if self.session.is_some() {
            tracing::debug!("replacing existing audio session");
        }
        tracing::debug!(sample_rate, "audio session created");
        self.session = Some(Session {
            sample_rate,
            playing: false,
            output: None,
            next_time: 0.0,
        });
    }

    /// End the session, closing the device.
    pub fn destroy(&mut self) {
        if self.session.take().is_some() {
            tracing::debug!("audio session destroyed");
        }
    }

    /// Set the playing flag.
    pub fn play(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.playing = true;
        }
    }

    /// Clear the playing flag.
    pub fn stop(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.playing = false;
        }
    }

    /// The playing flag; false without a session.
    pub fn is_playing(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.playing)
    }

    /// Device time at which the next buffer will start.
    pub fn next_time(&self) -> Option<f64> {
        self.session
            .as_ref()
            .filter(|s| s.output.is_some())
            .map(|s| s.next_time)
    }

    /// Frames scheduled ahead of the device clock.
    pub fn queued_frames(&self) -> u32 {
        let Some(session) = self.session.as_ref() else {
            return 0;
        };
        let Some(output) = session.output.as_ref() else {
            return 0;
        };
        let ahead = (session.next_time - output.current_time()).max(0.0);
        (ahead * f64::from(session.sample_rate)).round() as u32
    }

    /// Schedule `frames` interleaved stereo `i16` frames from `pcm`.
    pub fn queue(&mut self, pcm: &[u8], frames: usize) -> QueueOutcome {
        let outcome = self.try_queue(pcm, frames);
        match outcome {
            QueueOutcome::Scheduled { start, duration } => {
                tracing::trace!(frames, start, duration, "audio scheduled");
            }
            QueueOutcome::Dropped(DropReason::Backpressure) => {
                tracing::trace!(frames, "audio dropped: schedule too far ahead");
            }
            QueueOutcome::Dropped(reason) => {
                tracing::warn!(frames, ?reason, "audio buffer dropped");
            }
        }
        outcome
    }

    fn try_queue(&mut self, pcm: &[u8], frames: usize) -> QueueOutcome {
        let Some(session) = self.session.as_mut() else {
            return QueueOutcome::Dropped(DropReason::NoSession);
        };
        if frames == 0 {
            return QueueOutcome::Dropped(DropReason::Empty);
        }
        if session.sample_rate == 0 {
            return QueueOutcome::Dropped(DropReason::InvalidRate);
        }
        let Some(pcm) = frames
            .checked_mul(FRAME_BYTES)
            .and_then(|len| pcm.get(..len))
        else {
            return QueueOutcome::Dropped(DropReason::OutOfBounds);
        };

        if session.output.is_none() {
            match self.host.open_output(session.sample_rate) {
                Ok(output) => {
                    session.next_time = output.current_time();
                    session.output = Some(output);
                }
                Err(e) => {
                    tracing::warn!("failed to open audio output: {}", e);
                    return QueueOutcome::Dropped(DropReason::DeviceUnavailable);
                }
            }
        }
        let Some(output) = session.output.as_mut() else {
            return QueueOutcome::Dropped(DropReason::DeviceUnavailable);
        };

        let now = output.current_time();
        if session.next_time - now > self.config.max_lead() {
            return QueueOutcome::Dropped(DropReason::Backpressure);
        }
        if session.next_time < now {
            tracing::debug!(behind = now - session.next_time, "audio underrun");
            session.next_time = now + self.config.underrun_cushion();
        }

        let (left, right) = pcm
            .chunks_exact(FRAME_BYTES)
            .map(|frame| {
                (
                    f32::from(LittleEndian::read_i16(&frame[0..2])) / 32768.0,
                    f32::from(LittleEndian::read_i16(&frame[2..4])) / 32768.0,
                )
            })
            .unzip();
        let unit = PlaybackUnit {
            start: session.next_time,
            sample_rate: session.sample_rate,
            left,
            right,
        };
        let start = unit.start;
        let duration = unit.duration();

        if let Err(e) = output.schedule(unit) {
            tracing::warn!("audio output rejected buffer: {}", e);
            return QueueOutcome::Dropped(DropReason::DeviceUnavailable);
        }
        session.next_time += duration;
        QueueOutcome::Scheduled { start, duration }
    }

    // Guest-facing entry points

    /// `MTY_AudioCreate(audio_out, sample_rate)`: writes 1 to `*audio_out`.
    pub fn mty_create(
        &mut self,
        mem: &mut MemoryView<'_>,
        audio_out: GuestPtr,
        sample_rate: u32,
    ) -> Result<i32> {
        self.create(sample_rate);
        if audio_out != 0 {
            mem.write_u32(audio_out, 1)?;
        }
        Ok(1)
    }

    /// `MTY_AudioDestroy(audio_inout)`: writes 0 to `*audio_inout`.
    pub fn mty_destroy(&mut self, mem: &mut MemoryView<'_>, audio_inout: GuestPtr) -> Result<()> {
        self.destroy();
        if audio_inout != 0 {
            mem.write_u32(audio_inout, 0)?;
        }
        Ok(())
    }

    /// `MTY_AudioQueue(ctx, frames, count)`
    pub fn mty_queue(&mut self, mem: &MemoryView<'_>, frames: GuestPtr, count: i32) -> QueueOutcome {
        let count = count.max(0) as usize;
        match mem.slice(frames, count.saturating_mul(FRAME_BYTES)) {
            Ok(pcm) => self.queue(pcm, count),
            Err(e) => {
                tracing::warn!("audio queue: {}", e);
                QueueOutcome::Dropped(DropReason::OutOfBounds)
            }
        }
    }
}
