//! Scheduler tests on a hand-driven clock.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::*;
use crate::config::AudioConfig;
use crate::error::{BridgeError, Result};
use crate::memory::MemoryView;

const RATE: u32 = 48_000;
const EPS: f64 = 1e-9;

#[derive(Clone, Default)]
struct ManualHost {
    clock: Rc<Cell<f64>>,
    units: Rc<RefCell<Vec<PlaybackUnit>>>,
    opened: Rc<Cell<u32>>,
    broken: bool,
}

struct ManualOutput {
    clock: Rc<Cell<f64>>,
    units: Rc<RefCell<Vec<PlaybackUnit>>>,
}

impl AudioHost for ManualHost {
    type Output = ManualOutput;

    fn open_output(&mut self, _sample_rate: u32) -> Result<ManualOutput> {
        if self.broken {
            return Err(BridgeError::Audio("no device".to_string()));
        }
        self.opened.set(self.opened.get() + 1);
        Ok(ManualOutput {
            clock: self.clock.clone(),
            units: self.units.clone(),
        })
    }
}

impl AudioOutput for ManualOutput {
    fn current_time(&self) -> f64 {
        self.clock.get()
    }

    fn schedule(&mut self, unit: PlaybackUnit) -> Result<()> {
        self.units.borrow_mut().push(unit);
        Ok(())
    }
}

fn scheduler() -> (AudioScheduler<ManualHost>, ManualHost) {
    let host = ManualHost::default();
    (AudioScheduler::new(host.clone(), AudioConfig::default()), host)
}

/// `frames` stereo frames of silence.
fn pcm(frames: usize) -> Vec<u8> {
    vec![0u8; frames * 4]
}

fn start_of(outcome: QueueOutcome) -> f64 {
    match outcome {
        QueueOutcome::Scheduled { start, .. } => start,
        other => panic!("expected a scheduled buffer, got {:?}", other),
    }
}

#[test]
fn test_queue_without_session_is_dropped() {
    let (mut audio, host) = scheduler();
    assert_eq!(
        audio.queue(&pcm(10), 10),
        QueueOutcome::Dropped(DropReason::NoSession)
    );
    assert_eq!(host.opened.get(), 0);
    assert_eq!(audio.queued_frames(), 0);
}

#[test]
fn test_device_opens_lazily() {
    let (mut audio, host) = scheduler();
    audio.create(RATE);
    assert!(audio.output().is_none());
    assert_eq!(audio.next_time(), None);

    host.clock.set(3.0);
    let start = start_of(audio.queue(&pcm(480), 480));
    assert!((start - 3.0).abs() < EPS);
    assert_eq!(host.opened.get(), 1);

    audio.queue(&pcm(480), 480);
    assert_eq!(host.opened.get(), 1);
}

#[test]
fn test_consecutive_buffers_are_gapless() {
    let (mut audio, host) = scheduler();
    audio.create(RATE);

    // 10 ms each
    let mut expected = 0.0;
    for _ in 0..5 {
        let start = start_of(audio.queue(&pcm(480), 480));
        assert!((start - expected).abs() < EPS);
        expected += 0.010;
    }

    let units = host.units.borrow();
    for pair in units.windows(2) {
        let end = pair[0].start + pair[0].duration();
        assert!((pair[1].start - end).abs() < EPS);
    }
    assert!((audio.next_time().unwrap() - 0.050).abs() < EPS);
}

#[test]
fn test_underrun_resets_with_cushion() {
    let (mut audio, host) = scheduler();
    audio.create(RATE);
    audio.queue(&pcm(480), 480);

    // Device ran past the schedule
    host.clock.set(1.0);
    let start = start_of(audio.queue(&pcm(480), 480));
    assert!((start - 1.070).abs() < EPS);
    assert!((audio.next_time().unwrap() - 1.080).abs() < EPS);
}

#[test]
fn test_backpressure_is_a_no_op() {
    let (mut audio, host) = scheduler();
    // 64 frames at 1024 Hz = 62.5 ms, exact in binary
    audio.create(1024);

    for _ in 0..4 {
        start_of(audio.queue(&pcm(64), 64));
    }
    let anchor = audio.next_time().unwrap();
    assert_eq!(anchor, 0.25);

    assert_eq!(
        audio.queue(&pcm(64), 64),
        QueueOutcome::Dropped(DropReason::Backpressure)
    );
    assert_eq!(audio.next_time(), Some(anchor));
    assert_eq!(host.units.borrow().len(), 4);

    // Once the device catches up the queue accepts again, still gapless
    host.clock.set(0.1);
    let start = start_of(audio.queue(&pcm(64), 64));
    assert_eq!(start, anchor);
}

#[test]
fn test_lead_exactly_at_limit_is_accepted() {
    let (mut audio, _host) = scheduler();
    audio.create(1000);

    // 200 frames at 1 kHz = exactly 200 ms
    audio.queue(&pcm(200), 200);
    assert!(matches!(
        audio.queue(&pcm(1), 1),
        QueueOutcome::Scheduled { .. }
    ));
}

#[test]
fn test_samples_are_deinterleaved_and_normalized() {
    let (mut audio, host) = scheduler();
    audio.create(RATE);

    let mut data = Vec::new();
    for (l, r) in [(i16::MIN, 16384i16), (0, -16384), (32767, 1)] {
        data.extend_from_slice(&l.to_le_bytes());
        data.extend_from_slice(&r.to_le_bytes());
    }
    audio.queue(&data, 3);

    let units = host.units.borrow();
    let unit = &units[0];
    assert_eq!(unit.frames(), 3);
    assert_eq!(unit.left, vec![-1.0, 0.0, 32767.0 / 32768.0]);
    assert_eq!(unit.right, vec![0.5, -0.5, 1.0 / 32768.0]);
}

#[test]
fn test_queued_frames_tracks_lead() {
    let (mut audio, host) = scheduler();
    audio.create(RATE);
    assert_eq!(audio.queued_frames(), 0);

    audio.queue(&pcm(960), 960);
    assert_eq!(audio.queued_frames(), 960);

    host.clock.set(0.005);
    assert_eq!(audio.queued_frames(), 720);

    host.clock.set(1.0);
    assert_eq!(audio.queued_frames(), 0);
}

#[test]
fn test_degenerate_buffers_are_dropped() {
    let (mut audio, host) = scheduler();
    audio.create(RATE);
    assert_eq!(audio.queue(&[], 0), QueueOutcome::Dropped(DropReason::Empty));
    assert_eq!(
        audio.queue(&pcm(2), 3),
        QueueOutcome::Dropped(DropReason::OutOfBounds)
    );

    audio.create(0);
    assert_eq!(
        audio.queue(&pcm(4), 4),
        QueueOutcome::Dropped(DropReason::InvalidRate)
    );
    assert!(host.units.borrow().is_empty());
}

#[test]
fn test_device_failure_is_dropped() {
    let host = ManualHost {
        broken: true,
        ..Default::default()
    };
    let mut audio = AudioScheduler::new(host, AudioConfig::default());
    audio.create(RATE);
    assert_eq!(
        audio.queue(&pcm(4), 4),
        QueueOutcome::Dropped(DropReason::DeviceUnavailable)
    );
    assert!(audio.output().is_none());
}

#[test]
fn test_lifecycle_flags() {
    let (mut audio, _host) = scheduler();
    assert!(!audio.is_playing());
    audio.play();
    assert!(!audio.is_playing());

    audio.create(RATE);
    assert!(!audio.is_playing());
    audio.play();
    assert!(audio.is_playing());
    audio.stop();
    assert!(!audio.is_playing());

    audio.play();
    audio.destroy();
    assert!(!audio.is_playing());
    assert!(!audio.has_session());
}

#[test]
fn test_guest_entry_points() {
    let (mut audio, host) = scheduler();
    let mut buf = vec![0u8; 256];
    let mut mem = MemoryView::new(&mut buf);

    assert_eq!(audio.mty_create(&mut mem, 8, RATE).unwrap(), 1);
    assert_eq!(mem.read_u32(8).unwrap(), 1);

    assert!(matches!(
        audio.mty_queue(&mem, 64, 16),
        QueueOutcome::Scheduled { .. }
    ));
    assert_eq!(
        audio.mty_queue(&mem, 250, 16),
        QueueOutcome::Dropped(DropReason::OutOfBounds)
    );
    assert_eq!(host.units.borrow().len(), 1);

    audio.mty_destroy(&mut mem, 8).unwrap();
    assert_eq!(mem.read_u32(8).unwrap(), 0);
    assert!(!audio.has_session());
}

#[test]
fn test_raw_file_output_pads_gaps() {
    let path = std::env::temp_dir().join(format!("lumen-audio-{}.f32", std::process::id()));
    let mut host = RawFileAudio::new(&path);
    let mut output = host.open_output(4).unwrap();

    let unit = |start: f64, frames: usize| PlaybackUnit {
        start,
        sample_rate: 4,
        left: vec![0.25; frames],
        right: vec![-0.25; frames],
    };
    output.schedule(unit(0.0, 2)).unwrap();
    // One frame of silence, then two frames
    output.schedule(unit(0.75, 2)).unwrap();
    // Overlaps the last written frame; only one new frame lands
    output.schedule(unit(1.0, 2)).unwrap();
    assert_eq!(output.frames_written(), 6);
    drop(output);

    let bytes = std::fs::read(&path).unwrap();
    std::fs::remove_file(&path).ok();
    let samples: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    assert_eq!(
        samples,
        vec![0.25, -0.25, 0.25, -0.25, 0.0, 0.0, 0.25, -0.25, 0.25, -0.25, 0.25, -0.25]
    );
}

#[test]
fn test_null_audio_counts_units() {
    let audio_host = NullAudio::new();
    let mut audio = AudioScheduler::new(audio_host.clone(), AudioConfig::default());
    audio.create(RATE);
    audio.queue(&pcm(480), 480);
    audio.queue(&pcm(240), 240);
    assert_eq!(audio_host.units(), 2);
    assert_eq!(audio_host.frames(), 720);
}
