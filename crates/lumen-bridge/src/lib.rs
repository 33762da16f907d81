//! # Lumen Bridge
//!
//! Host bridge for WebAssembly guests written against a C windowing, GL ES
//! and audio API. The guest imports plain integer functions; the bridge
//! turns them into calls on typed host interfaces.
//!
//! ## Components
//!
//! | Module | Imports | Host interface |
//! |--------|---------|----------------|
//! | [`memory`] | (all) | [`MemoryView`] over guest linear memory |
//! | [`handles`] | `gl*` object calls | [`HandleTable`] integer ↔ object |
//! | [`gl`] | `gl*` | [`GraphicsContext`] ([`HeadlessGl`]) |
//! | [`audio`] | `MTY_Audio*` | [`AudioHost`] ([`NullAudio`], [`RawFileAudio`]) |
//! | [`syscall`] | `wasi_snapshot_preview1` | [`Console`] |
//! | [`web`] | `web_*` | [`WindowHost`] ([`HeadlessWindow`]) |
//! | `runtime` | linker wiring, frame loop | wasmtime |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lumen_bridge::{Bridge, BridgeConfig, FrameLoop, HeadlessGl, HostState, NullAudio, StartOutcome};
//!
//! let config = BridgeConfig::headless();
//! let bridge = Bridge::new(config.clone())?;
//! let module = bridge.load_module("game.wasm")?;
//! let host = HostState::new(&config, HeadlessGl::new(640, 480), NullAudio::new());
//! let mut instance = bridge.instantiate(&module, host)?;
//!
//! if let StartOutcome::RunLoop(callback) = instance.start()? {
//!     let frames = FrameLoop::from_config(&config.window).with_max_frames(600);
//!     let (exit, stats) = frames.run(&mut instance, callback).await?;
//!     println!("{:?}: {}", exit, stats.summary());
//! }
//! ```
//!
//! ## Features
//!
//! - `runtime` (default) - wasmtime embedding and the tokio frame loop.
//!   Without it the shims are usable against any memory buffer.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod audio;
pub mod config;
pub mod console;
pub mod error;
pub mod gl;
pub mod handles;
pub mod memory;
pub mod syscall;
pub mod web;

#[cfg(feature = "runtime")]
pub mod runtime;

pub use audio::{
    AudioHost, AudioOutput, AudioScheduler, DropReason, NullAudio, PlaybackUnit, QueueOutcome,
    RawFileAudio,
};
pub use config::{AudioConfig, BridgeConfig, RuntimeConfig, WindowConfig};
pub use console::{Console, ConsoleStream, MemoryConsole, StdConsole};
pub use error::{BridgeError, Result};
pub use gl::{GlShim, GraphicsContext, HeadlessGl};
pub use handles::{Handle, HandleTable};
pub use memory::{GuestPtr, MemoryView};
pub use syscall::{ProcExit, SyscallShim};
pub use web::{FrameCallback, HeadlessWindow, InputEvent, RunLoopHandoff, WebShim, WindowHost};

#[cfg(feature = "runtime")]
pub use runtime::{
    Bridge, BridgeInstance, BridgeModule, CancelToken, FrameLoop, FrameStats, FrameStatus,
    HostState, ImportInfo, LoopExit, StartOutcome,
};
