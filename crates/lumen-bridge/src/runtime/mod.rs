//! wasmtime embedding.
//!
//! [`Bridge`] owns the engine and compiles modules; every
//! [`BridgeInstance`] gets its own [`HostState`] with the graphics, audio,
//! window and WASI shims its imports call into.
//!
//! ```text
//! Bridge::instantiate ──► BridgeInstance::start
//!                              │
//!            ┌─────────────────┼──────────────────┐
//!            ▼                 ▼                  ▼
//!        Completed         Exited(code)     RunLoop(callback)
//!                                                 │
//!                                                 ▼
//!                                  FrameLoop::run (tokio interval)
//! ```

mod bridge;
mod frame_loop;
pub mod host_functions;

pub use bridge::{
    Bridge, BridgeInstance, BridgeModule, FrameStatus, HostState, ImportInfo, StartOutcome,
};
pub use frame_loop::{CancelToken, FrameLoop, FrameStats, LoopExit, FRAME_STATS_WINDOW};
