//! Emulator errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("memory access out of bounds: address {addr:#x} (capacity {capacity:#x})")]
    MemoryFault { addr: u64, capacity: u64 },

    #[error("failed to load memory image from {path}: {source}")]
    ImageLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
