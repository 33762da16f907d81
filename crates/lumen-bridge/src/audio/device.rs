//! Audio output devices.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::{BridgeError, Result};

/// A deinterleaved stereo buffer placed on the device timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackUnit {
    /// Device time (seconds) at which the first frame plays
    pub start: f64,
    /// Frames per second
    pub sample_rate: u32,
    /// Left channel, normalized to [-1, 1)
    pub left: Vec<f32>,
    /// Right channel, normalized to [-1, 1)
    pub right: Vec<f32>,
}

impl PlaybackUnit {
    /// Number of stereo frames.
    pub fn frames(&self) -> usize {
        self.left.len()
    }

    /// Playback length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }
}

/// An open output with its own clock.
pub trait AudioOutput {
    /// Current device time in seconds. Monotonic.
    fn current_time(&self) -> f64;

    /// Queue `unit` for playback at `unit.start`.
    fn schedule(&mut self, unit: PlaybackUnit) -> Result<()>;
}

/// Opens outputs on demand.
pub trait AudioHost {
    /// The output type this host produces.
    type Output: AudioOutput;

    /// Open an output running at `sample_rate`.
    fn open_output(&mut self, sample_rate: u32) -> Result<Self::Output>;
}

/// Discards audio, counting what would have played.
#[derive(Debug, Clone, Default)]
pub struct NullAudio {
    units: Arc<AtomicU64>,
    frames: Arc<AtomicU64>,
}

impl NullAudio {
    /// Create a sink with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Units scheduled on any output opened by this host.
    pub fn units(&self) -> u64 {
        self.units.load(Ordering::Relaxed)
    }

    /// Frames scheduled on any output opened by this host.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl AudioHost for NullAudio {
    type Output = NullOutput;

    fn open_output(&mut self, sample_rate: u32) -> Result<NullOutput> {
        tracing::debug!(sample_rate, "opened null audio output");
        Ok(NullOutput {
            epoch: Instant::now(),
            units: self.units.clone(),
            frames: self.frames.clone(),
        })
    }
}

/// Output of [`NullAudio`]; its clock is wall time since open.
#[derive(Debug)]
pub struct NullOutput {
    epoch: Instant,
    units: Arc<AtomicU64>,
    frames: Arc<AtomicU64>,
}

impl AudioOutput for NullOutput {
    fn current_time(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn schedule(&mut self, unit: PlaybackUnit) -> Result<()> {
        self.units.fetch_add(1, Ordering::Relaxed);
        self.frames.fetch_add(unit.frames() as u64, Ordering::Relaxed);
        Ok(())
    }
}

/// Renders the timeline into a raw sample file.
///
/// The file holds interleaved little-endian `f32` stereo frames
/// (`L0 R0 L1 R1 ...`) at the session's sample rate. Gaps between
/// scheduled units are written as silence, and frames that overlap
/// audio already written are skipped.
#[derive(Debug, Clone)]
pub struct RawFileAudio {
    path: PathBuf,
}

impl RawFileAudio {
    /// Write to `path`, truncating it when the output opens.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AudioHost for RawFileAudio {
    type Output = RawFileOutput;

    fn open_output(&mut self, sample_rate: u32) -> Result<RawFileOutput> {
        let file = File::create(&self.path).map_err(|e| {
            BridgeError::Audio(format!("failed to create {}: {}", self.path.display(), e))
        })?;
        tracing::debug!(path = %self.path.display(), sample_rate, "opened raw audio output");
        Ok(RawFileOutput {
            writer: BufWriter::new(file),
            epoch: Instant::now(),
            sample_rate,
            written: 0,
        })
    }
}

/// Output of [`RawFileAudio`].
#[derive(Debug)]
pub struct RawFileOutput {
    writer: BufWriter<File>,
    epoch: Instant,
    sample_rate: u32,
    written: u64,
}

impl RawFileOutput {
    /// Frames written so far, silence included.
    pub fn frames_written(&self) -> u64 {
        self.written
    }

    fn write_frame(&mut self, left: f32, right: f32) -> std::io::Result<()> {
        self.writer.write_f32::<LittleEndian>(left)?;
        self.writer.write_f32::<LittleEndian>(right)?;
        self.written += 1;
        Ok(())
    }
}

impl AudioOutput for RawFileOutput {
    fn current_time(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn schedule(&mut self, unit: PlaybackUnit) -> Result<()> {
        let start = (unit.start.max(0.0) * f64::from(self.sample_rate)).round() as u64;

        while self.written < start {
            self.write_frame(0.0, 0.0)?;
        }

        let skip = (self.written - start) as usize;
        for (l, r) in unit.left.iter().zip(&unit.right).skip(skip) {
            self.write_frame(*l, *r)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
