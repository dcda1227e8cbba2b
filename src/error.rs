// CLASSIFICATION: COMMUNITY
// Filename: error.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Error taxonomy for the CrashCat consumer.
//!
//! Every variant is recovered locally by [`crate::CrashCat`] into "no report
//! this call"; nothing here is allowed to escalate into a host fault.

use crashcat_wire::{MemAperture, WireError};
use thiserror::Error;

/// Errors surfaced by CrashCat operations.
#[derive(Debug, Error)]
pub enum CrashCatError {
    /// The wayfinder signature is absent; the producer has not set up
    /// crash reporting yet. Expected steady state, not logged as an error.
    #[error("crashcat wayfinder not initialized")]
    NotInitialized,
    /// Discovery state is unusable for this engine instance.
    #[error("crashcat protocol misconfigured: {0}")]
    ProtocolMisconfigured(String),
    /// Queue bytes failed header or payload validation.
    #[error("invalid crashcat data: {0}")]
    InvalidData(#[from] WireError),
    /// Host allocation failed; safe to retry later.
    #[error("allocation of {bytes} bytes failed")]
    ResourceExhaustion {
        /// Size of the failed allocation.
        bytes: usize,
    },
    /// The aperture is not valid for the requested buffer operation.
    #[error("aperture {0} not valid for this operation")]
    InvalidAperture(MemAperture),
    /// A zero-sized buffer was requested.
    #[error("zero-sized crash buffer")]
    ZeroSize,
    /// A buffer with the same aperture and offset is already registered.
    #[error("crash buffer {aperture}:{offset:#x} already registered")]
    AlreadyRegistered {
        /// Aperture of the existing registration.
        aperture: MemAperture,
        /// Offset of the existing registration.
        offset: u64,
    },
    /// A system-memory buffer was mapped without being registered first.
    #[error("crash buffer {aperture}:{offset:#x} not registered")]
    NotRegistered {
        /// Requested aperture.
        aperture: MemAperture,
        /// Requested offset.
        offset: u64,
    },
    /// The requested range falls outside the buffer.
    #[error("range {offset:#x}+{size:#x} outside buffer of {len:#x} bytes")]
    OutOfRange {
        /// Start of the requested range.
        offset: u64,
        /// Length of the requested range.
        size: u64,
        /// Length of the buffer.
        len: u64,
    },
    /// The engine refused to map a registered buffer.
    #[error("engine failed to map crash buffer {aperture}:{offset:#x}")]
    MapFailed {
        /// Requested aperture.
        aperture: MemAperture,
        /// Requested offset.
        offset: u64,
    },
    /// Configuration could not be loaded or failed validation.
    #[error("crashcat config error: {0}")]
    Config(String),
}

/// Result alias used throughout the crate.
pub type CrashCatResult<T> = Result<T, CrashCatError>;

/// Allocate a zeroed buffer of `len` bytes, reporting allocation failure
/// instead of aborting.
pub(crate) fn try_alloc_zeroed(len: usize) -> CrashCatResult<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| CrashCatError::ResourceExhaustion { bytes: len })?;
    buf.resize(len, 0);
    Ok(buf)
}
