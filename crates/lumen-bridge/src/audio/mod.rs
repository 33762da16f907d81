//! Paced audio output.
//!
//! Guests push stereo 16-bit PCM with `MTY_AudioQueue` whenever they have it,
//! with no timing of their own. The [`AudioScheduler`] turns that push stream
//! into gapless playback by keeping an anchor time on the device clock: each
//! buffer is scheduled exactly where the previous one ends.
//!
//! ## Pacing Rules
//!
//! | Condition | Action |
//! |-----------|--------|
//! | first queue | open the device, anchor = device time |
//! | anchor more than `max_lead` ahead | drop the buffer (backpressure) |
//! | anchor behind the device | anchor = now + `underrun_cushion` |
//! | otherwise | schedule at anchor, anchor += duration |
//!
//! Both thresholds come from [`AudioConfig`](crate::config::AudioConfig)
//! (200 ms and 70 ms by default).

mod device;
mod scheduler;

pub use device::{
    AudioHost, AudioOutput, NullAudio, NullOutput, PlaybackUnit, RawFileAudio, RawFileOutput,
};
pub use scheduler::{AudioScheduler, DropReason, QueueOutcome};

#[cfg(test)]
mod tests;
