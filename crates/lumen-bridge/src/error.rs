//! Error types for the bridge crate.

use thiserror::Error;

/// Bridge error type
#[derive(Error, Debug)]
pub enum BridgeError {
    /// wasmtime engine, module or instance failure
    #[error("WASM runtime error: {0}")]
    Wasm(String),

    /// Guest memory access outside the current linear memory
    #[error("memory access out of bounds: offset {offset:#x} len {len} (memory size {size})")]
    MemoryOutOfBounds {
        /// Byte offset of the access
        offset: u64,
        /// Length of the access in bytes
        len: u64,
        /// Size of the linear memory at the time of the access
        size: u64,
    },

    /// The guest does not export something the bridge needs
    #[error("guest export missing: {0}")]
    MissingExport(String),

    /// A call into the guest (callback, allocator, frame function) failed
    #[error("guest call failed: {0}")]
    GuestCall(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio output error
    #[error("audio error: {0}")]
    Audio(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
