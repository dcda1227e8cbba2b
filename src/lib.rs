// CLASSIFICATION: COMMUNITY
// Filename: lib.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Host-side CrashCat consumer.
//!
//! A crashed core publishes a two-level wayfinder in its scratch registers
//! that locates a circular crash queue. [`CrashCat`] probes the wayfinder,
//! drains complete reports from the queue and renders them through the
//! engine's logging sink. Wire layouts live in the `crashcat-wire` crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Crash buffer registration and mapping.
pub mod buffer;
/// Static platform configuration.
pub mod config;
/// Per-engine consumer context.
pub mod crashcat;
/// Single-packet decoding.
pub mod decoder;
/// Host collaborator interface.
pub mod engine;
/// Error taxonomy.
pub mod error;
/// Implementer-specific report reading.
pub mod interpret;
/// Circular queue consumer.
pub mod queue;
/// Report assembly and rendering.
pub mod report;
/// In-memory engine and queue producer.
pub mod sim;
/// Wayfinder discovery.
pub mod wayfinder;

/// Command line front end.
#[cfg(feature = "cli")]
pub mod cli;

pub use crashcat_wire as wire;

pub use buffer::{BufferDescriptor, BufferDescriptorCache, MappedBuffer};
pub use config::EngineConfig;
pub use crashcat::{CrashCat, WayfinderState};
pub use decoder::PacketDecoder;
pub use engine::{CrashCatEngine, MemoryWindow, LOG_TARGET};
pub use error::{CrashCatError, CrashCatResult};
pub use interpret::{Implementer, TaskId};
pub use queue::{bytes_to_read, free_bytes, CrashQueue};
pub use report::CrashReport;
pub use sim::{QueueProducer, SimEngine, Snapshot};
pub use wayfinder::Wayfinder;
