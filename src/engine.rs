// CLASSIFICATION: COMMUNITY
// Filename: engine.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Collaborator interface supplied by the host for the crashing core.
//!
//! The consumer never touches hardware directly. Register access, mapping of
//! system-memory crash buffers, copy-in of on-chip memory and the logging
//! sink all go through [`CrashCatEngine`].

use core::fmt;

use crashcat_wire::ScratchGroupId;

use crate::buffer::BufferDescriptor;

/// Log target used for everything the consumer emits.
pub const LOG_TARGET: &str = "crashcat";

/// Read access to a directly mapped crash buffer.
pub trait MemoryWindow: Send {
    /// Length of the window in bytes.
    fn len(&self) -> usize;

    /// Whether the window is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `out.len()` bytes starting at `offset`. Callers keep the range
    /// inside `len()`.
    fn read(&self, offset: usize, out: &mut [u8]);
}

/// Register, memory and logging primitives of one crashing core.
pub trait CrashCatEngine: Send + Sync {
    /// Whether CrashCat is enabled for this engine. Disabled engines are
    /// never probed.
    fn configured(&self) -> bool {
        true
    }

    /// Read a 32-bit register of the crashing core.
    fn pri_read(&self, offset: u32) -> u32;

    /// Write a 32-bit register of the crashing core.
    fn pri_write(&self, offset: u32, value: u32);

    /// Offset of the fixed L0 wayfinder register.
    fn wfl0_offset(&self) -> u32;

    /// Register offsets of a scratch group, in order. Empty when the
    /// platform does not provide the group.
    fn scratch_offsets(&self, group: ScratchGroupId) -> &[u32];

    /// Map a registered system-memory buffer.
    fn map_buffer_descriptor(&self, desc: &BufferDescriptor) -> Option<Box<dyn MemoryWindow>>;

    /// Release a mapping made by [`Self::map_buffer_descriptor`].
    fn unmap_buffer_descriptor(&self, desc: &BufferDescriptor);

    /// Copy `staging.len()` bytes at `offset` within the on-chip buffer
    /// described by `desc` into `staging`.
    fn sync_buffer_descriptor(&self, desc: &BufferDescriptor, offset: u32, staging: &mut [u8]);

    /// Logging sink. `report_start` begins a fresh multi-line report block.
    fn printf(&self, report_start: bool, args: fmt::Arguments<'_>) {
        if report_start {
            log::error!(target: LOG_TARGET, "{args}");
        } else {
            log::error!(target: LOG_TARGET, "    {args}");
        }
    }
}
