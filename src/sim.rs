// CLASSIFICATION: COMMUNITY
// Filename: sim.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! In-memory CrashCat engine.
//!
//! [`SimEngine`] stands in for a crashing core: a register file, a set of
//! memory regions per aperture and a captured logging sink. [`QueueProducer`]
//! plays the firmware side of the queue. Both back the integration tests and
//! the `scan` command of the CLI, which replays a captured [`Snapshot`].

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crashcat_wire::{MemAperture, QueueLocation, ScratchGroupId, WayfinderL0};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::buffer::BufferDescriptor;
use crate::config::EngineConfig;
use crate::engine::{CrashCatEngine, MemoryWindow, LOG_TARGET};
use crate::error::{CrashCatError, CrashCatResult};
use crate::queue::free_bytes;

type SharedBytes = Arc<Mutex<Vec<u8>>>;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct MemoryRegion {
    aperture: MemAperture,
    base: u64,
    bytes: SharedBytes,
}

impl MemoryRegion {
    fn contains(&self, aperture: MemAperture, addr: u64, len: usize) -> bool {
        let size = lock(&self.bytes).len() as u64;
        self.aperture == aperture
            && addr >= self.base
            && (addr - self.base)
                .checked_add(len as u64)
                .is_some_and(|end| end <= size)
    }
}

struct SimWindow {
    bytes: SharedBytes,
    start: usize,
    len: usize,
}

impl MemoryWindow for SimWindow {
    fn len(&self) -> usize {
        self.len
    }

    fn read(&self, offset: usize, out: &mut [u8]) {
        let bytes = lock(&self.bytes);
        let start = self.start + offset;
        out.copy_from_slice(&bytes[start..start + out.len()]);
    }
}

/// Simulated crashing core.
pub struct SimEngine {
    config: EngineConfig,
    registers: Mutex<BTreeMap<u32, u32>>,
    writes: Mutex<Vec<(u32, u32)>>,
    reads: AtomicUsize,
    memory: Mutex<Vec<MemoryRegion>>,
    windows: AtomicUsize,
    map_requests: AtomicUsize,
    lines: Mutex<Vec<String>>,
}

impl SimEngine {
    /// Create an engine with empty registers and no memory.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registers: Mutex::new(BTreeMap::new()),
            writes: Mutex::new(Vec::new()),
            reads: AtomicUsize::new(0),
            memory: Mutex::new(Vec::new()),
            windows: AtomicUsize::new(0),
            map_requests: AtomicUsize::new(0),
            lines: Mutex::new(Vec::new()),
        }
    }

    /// Build an engine from a captured snapshot.
    pub fn from_snapshot(config: EngineConfig, snapshot: &Snapshot) -> CrashCatResult<Self> {
        let engine = Self::new(config);
        for reg in &snapshot.registers {
            engine.set_register(reg.offset, reg.value);
        }
        for image in &snapshot.memory {
            let bytes = hex::decode(image.data.trim())
                .map_err(|e| CrashCatError::Config(format!("memory image {}: {e}", image.base)))?;
            engine.add_memory(image.aperture, image.base, bytes);
        }
        Ok(engine)
    }

    /// Platform config the engine was built with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Set a register as the hardware or producer would. Not recorded as a
    /// consumer write.
    pub fn set_register(&self, offset: u32, value: u32) {
        lock(&self.registers).insert(offset, value);
    }

    /// Current register value; unset registers read as zero.
    #[must_use]
    pub fn register(&self, offset: u32) -> u32 {
        lock(&self.registers).get(&offset).copied().unwrap_or(0)
    }

    /// Register writes made through [`CrashCatEngine::pri_write`], in order.
    #[must_use]
    pub fn register_writes(&self) -> Vec<(u32, u32)> {
        lock(&self.writes).clone()
    }

    /// Number of register reads made through [`CrashCatEngine::pri_read`].
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Acquire)
    }

    /// Number of direct mappings requested, successful or not.
    #[must_use]
    pub fn map_requests(&self) -> usize {
        self.map_requests.load(Ordering::Acquire)
    }

    /// Forget recorded register writes.
    pub fn clear_register_writes(&self) {
        lock(&self.writes).clear();
    }

    /// Add a memory region of `aperture` starting at `base`.
    pub fn add_memory(&self, aperture: MemAperture, base: u64, bytes: Vec<u8>) {
        lock(&self.memory).push(MemoryRegion {
            aperture,
            base,
            bytes: Arc::new(Mutex::new(bytes)),
        });
    }

    /// Write into simulated memory. Returns `false` when no region covers
    /// the range.
    pub fn write_memory(&self, aperture: MemAperture, addr: u64, data: &[u8]) -> bool {
        let memory = lock(&self.memory);
        let Some(region) = memory
            .iter()
            .find(|region| region.contains(aperture, addr, data.len()))
        else {
            return false;
        };
        let start = (addr - region.base) as usize;
        lock(&region.bytes)[start..start + data.len()].copy_from_slice(data);
        true
    }

    /// Read from simulated memory, `None` when no region covers the range.
    #[must_use]
    pub fn read_memory(&self, aperture: MemAperture, addr: u64, len: usize) -> Option<Vec<u8>> {
        let memory = lock(&self.memory);
        let region = memory
            .iter()
            .find(|region| region.contains(aperture, addr, len))?;
        let start = (addr - region.base) as usize;
        let out = lock(&region.bytes)[start..start + len].to_vec();
        Some(out)
    }

    /// Number of direct mappings currently open.
    #[must_use]
    pub fn live_windows(&self) -> usize {
        self.windows.load(Ordering::Acquire)
    }

    /// Lines emitted through the logging sink. Continuation lines are
    /// indented by four spaces.
    #[must_use]
    pub fn log_lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }

    /// Play the firmware side of discovery: allocate queue memory if needed,
    /// write the L1 wayfinder into `group` and publish L0.
    pub fn publish_wayfinder(
        &self,
        group: ScratchGroupId,
        location: QueueLocation,
    ) -> CrashCatResult<()> {
        let offsets = self.config.scratch_offsets(group).to_vec();
        if offsets.len() < 2 {
            return Err(CrashCatError::Config(format!(
                "scratch group {group:?} cannot hold the L1 wayfinder"
            )));
        }
        let raw = location.encode()?;
        if self
            .read_memory(location.aperture, location.offset, location.size as usize)
            .is_none()
        {
            self.add_memory(
                location.aperture,
                location.offset,
                vec![0; location.size as usize],
            );
        }
        self.set_register(offsets[0], raw as u32);
        self.set_register(offsets[1], (raw >> 32) as u32);
        if offsets.len() >= 4 {
            self.set_register(offsets[2], 0);
            self.set_register(offsets[3], 0);
        }
        self.set_register(self.config.wfl0_offset, WayfinderL0::new_v1(group).raw());
        Ok(())
    }

    fn region_for(&self, aperture: MemAperture, addr: u64, len: usize) -> Option<(SharedBytes, usize)> {
        let memory = lock(&self.memory);
        memory
            .iter()
            .find(|region| region.contains(aperture, addr, len))
            .map(|region| (Arc::clone(&region.bytes), (addr - region.base) as usize))
    }
}

impl CrashCatEngine for SimEngine {
    fn configured(&self) -> bool {
        self.config.enabled
    }

    fn pri_read(&self, offset: u32) -> u32 {
        self.reads.fetch_add(1, Ordering::AcqRel);
        self.register(offset)
    }

    fn pri_write(&self, offset: u32, value: u32) {
        lock(&self.writes).push((offset, value));
        self.set_register(offset, value);
    }

    fn wfl0_offset(&self) -> u32 {
        self.config.wfl0_offset
    }

    fn scratch_offsets(&self, group: ScratchGroupId) -> &[u32] {
        self.config.scratch_offsets(group)
    }

    fn map_buffer_descriptor(&self, desc: &BufferDescriptor) -> Option<Box<dyn MemoryWindow>> {
        self.map_requests.fetch_add(1, Ordering::AcqRel);
        let (bytes, start) =
            self.region_for(desc.aperture(), desc.offset(), desc.size() as usize)?;
        self.windows.fetch_add(1, Ordering::AcqRel);
        Some(Box::new(SimWindow {
            bytes,
            start,
            len: desc.size() as usize,
        }))
    }

    fn unmap_buffer_descriptor(&self, _desc: &BufferDescriptor) {
        self.windows.fetch_sub(1, Ordering::AcqRel);
    }

    fn sync_buffer_descriptor(&self, desc: &BufferDescriptor, offset: u32, staging: &mut [u8]) {
        let addr = desc.offset().checked_add(u64::from(offset));
        match addr.and_then(|addr| self.region_for(desc.aperture(), addr, staging.len())) {
            Some((bytes, start)) => {
                staging.copy_from_slice(&lock(&bytes)[start..start + staging.len()]);
            }
            None => {
                warn!(
                    target: LOG_TARGET,
                    "no simulated {} memory at {:#x}+{offset:#x}",
                    desc.aperture(),
                    desc.offset()
                );
                staging.fill(0);
            }
        }
    }

    fn printf(&self, report_start: bool, args: fmt::Arguments<'_>) {
        let line = if report_start {
            args.to_string()
        } else {
            format!("    {args}")
        };
        log::error!(target: LOG_TARGET, "{line}");
        lock(&self.lines).push(line);
    }
}

/// Firmware-side writer for a simulated crash queue.
pub struct QueueProducer<'a> {
    engine: &'a SimEngine,
    location: QueueLocation,
    put_reg: u32,
    get_reg: u32,
    requires_release: bool,
}

impl<'a> QueueProducer<'a> {
    /// Producer for the queue published in `group`. Two-register groups
    /// share their registers with L1 and must be released by the consumer
    /// before the producer may publish `put`.
    pub fn for_group(
        engine: &'a SimEngine,
        group: ScratchGroupId,
        location: QueueLocation,
    ) -> CrashCatResult<Self> {
        let offsets = engine.config.scratch_offsets(group);
        let (put_reg, get_reg, requires_release) = match offsets.len() {
            4 => (offsets[2], offsets[3], false),
            2 | 3 => (offsets[0], offsets[1], true),
            _ => {
                return Err(CrashCatError::Config(format!(
                    "scratch group {group:?} has no put/get registers"
                )))
            }
        };
        Ok(Self {
            engine,
            location,
            put_reg,
            get_reg,
            requires_release,
        })
    }

    /// Offset of the put register.
    #[must_use]
    pub fn put_register(&self) -> u32 {
        self.put_reg
    }

    /// Offset of the get register.
    #[must_use]
    pub fn get_register(&self) -> u32 {
        self.get_reg
    }

    /// Append `bytes` at `put` with wraparound, then publish the new `put`.
    /// Returns `false` without writing when the queue lacks room (one byte
    /// always stays free) or the consumer has not released the registers.
    pub fn push(&self, bytes: &[u8]) -> bool {
        if self.requires_release {
            let l0 = WayfinderL0::from_raw(self.engine.register(self.engine.config.wfl0_offset));
            if l0.v1_location() != ScratchGroupId::None {
                return false;
            }
        }
        let size = self.location.size;
        let put = self.engine.register(self.put_reg);
        let get = self.engine.register(self.get_reg);
        if put >= size || get >= size || bytes.len() as u64 >= u64::from(free_bytes(put, get, size)) {
            return false;
        }
        let first = bytes.len().min((size - put) as usize);
        let base = self.location.offset;
        let aperture = self.location.aperture;
        let Some(head) = base.checked_add(u64::from(put)) else {
            return false;
        };
        if !self.engine.write_memory(aperture, head, &bytes[..first]) {
            return false;
        }
        if first < bytes.len() && !self.engine.write_memory(aperture, base, &bytes[first..]) {
            return false;
        }
        let new_put = ((u64::from(put) + bytes.len() as u64) % u64::from(size)) as u32;
        self.engine.set_register(self.put_reg, new_put);
        true
    }
}

/// One register value in a [`Snapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterValue {
    /// Register offset.
    pub offset: u32,
    /// Value.
    pub value: u32,
}

/// One memory region in a [`Snapshot`], contents hex-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryImage {
    /// Aperture of the region.
    pub aperture: MemAperture,
    /// Offset of the region within the aperture.
    pub base: u64,
    /// Hex-encoded contents.
    pub data: String,
}

/// Captured register and memory state of a crashed core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    /// Register values.
    pub registers: Vec<RegisterValue>,
    /// Memory regions.
    pub memory: Vec<MemoryImage>,
}

impl Snapshot {
    /// Load a JSON snapshot.
    pub fn from_path(path: &Path) -> CrashCatResult<Self> {
        let data = fs::read_to_string(path)
            .map_err(|e| CrashCatError::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&data).map_err(|e| CrashCatError::Config(e.to_string()))
    }
}
