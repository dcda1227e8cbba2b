// CLASSIFICATION: COMMUNITY
// Filename: buffer.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Crash buffer descriptors and their mapping lifecycle.
//!
//! System-memory buffers (`SYSGPA`/`FBGPA`) are registered by the host around
//! the crash-handling window and mapped directly by the engine. On-chip
//! buffers (`DMEM`/`EMEM`) get a fresh host staging copy on every map and are
//! filled by [`MappedBuffer::sync`].
//!
//! A [`MappedBuffer`] owns its mapping and holds a shared reference to its
//! descriptor, so a descriptor can never be torn down underneath a live
//! mapping: unregistering only drops the registry's reference.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crashcat_wire::MemAperture;
use log::{debug, trace, warn};

use crate::engine::{CrashCatEngine, MemoryWindow, LOG_TARGET};
use crate::error::{try_alloc_zeroed, CrashCatError, CrashCatResult};

/// Description of one crash buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor {
    aperture: MemAperture,
    offset: u64,
    size: u32,
    private_handle: u64,
    registered: bool,
}

impl BufferDescriptor {
    /// Aperture the buffer lives in.
    #[must_use]
    pub fn aperture(&self) -> MemAperture {
        self.aperture
    }

    /// Offset of the buffer within its aperture.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Engine-private handle supplied at registration; zero for on-chip
    /// buffers.
    #[must_use]
    pub fn private_handle(&self) -> u64 {
        self.private_handle
    }

    /// Whether the host registered this buffer explicitly.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    fn contains(&self, offset: u64, size: u32) -> bool {
        offset >= self.offset
            && offset
                .checked_add(u64::from(size))
                .zip(self.end())
                .is_some_and(|(end, limit)| end <= limit)
    }

    fn end(&self) -> Option<u64> {
        self.offset.checked_add(u64::from(self.size))
    }
}

enum Backing {
    Window(Box<dyn MemoryWindow>),
    Staging(Vec<u8>),
}

/// Live mapping of a crash buffer range.
///
/// Dropping the handle (or passing it to
/// [`BufferDescriptorCache::unmap_buffer`]) releases the mapping exactly once.
pub struct MappedBuffer<E: CrashCatEngine> {
    engine: Arc<E>,
    desc: Arc<BufferDescriptor>,
    backing: Backing,
    base: usize,
    len: usize,
    live: Arc<AtomicUsize>,
}

impl<E: CrashCatEngine> MappedBuffer<E> {
    /// Aperture of the mapped buffer.
    #[must_use]
    pub fn aperture(&self) -> MemAperture {
        self.desc.aperture
    }

    /// Length of the mapped range in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the mapped range is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Descriptor backing this mapping.
    #[must_use]
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.desc
    }

    fn check_range(&self, offset: usize, size: usize) -> CrashCatResult<()> {
        match offset.checked_add(size) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(CrashCatError::OutOfRange {
                offset: offset as u64,
                size: size as u64,
                len: self.len as u64,
            }),
        }
    }

    /// Make `[offset, offset + size)` of the mapping coherent with the
    /// producer's writes. On-chip buffers are copied in through the engine;
    /// direct mappings need nothing.
    pub fn sync(&mut self, offset: usize, size: usize) -> CrashCatResult<()> {
        self.check_range(offset, size)?;
        if let Backing::Staging(staging) = &mut self.backing {
            let source = self.base + offset;
            let source = u32::try_from(source).map_err(|_| CrashCatError::OutOfRange {
                offset: source as u64,
                size: size as u64,
                len: self.len as u64,
            })?;
            trace!(
                target: LOG_TARGET,
                "sync {} +{source:#x} len {size:#x}",
                self.desc.aperture
            );
            self.engine
                .sync_buffer_descriptor(&self.desc, source, &mut staging[offset..offset + size]);
        }
        Ok(())
    }

    /// Copy `out.len()` bytes starting at `offset` out of the mapping.
    pub fn read(&self, offset: usize, out: &mut [u8]) -> CrashCatResult<()> {
        self.check_range(offset, out.len())?;
        match &self.backing {
            Backing::Window(window) => window.read(self.base + offset, out),
            Backing::Staging(staging) => out.copy_from_slice(&staging[offset..offset + out.len()]),
        }
        Ok(())
    }
}

impl<E: CrashCatEngine> fmt::Debug for MappedBuffer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedBuffer")
            .field("desc", &self.desc)
            .field("base", &self.base)
            .field("len", &self.len)
            .finish()
    }
}

impl<E: CrashCatEngine> Drop for MappedBuffer<E> {
    fn drop(&mut self) {
        if let Backing::Window(_) = self.backing {
            self.engine.unmap_buffer_descriptor(&self.desc);
        }
        self.live.fetch_sub(1, Ordering::AcqRel);
        debug!(
            target: LOG_TARGET,
            "unmapped crash buffer {}:{:#x}",
            self.desc.aperture,
            self.desc.offset + self.base as u64
        );
    }
}

/// Per-engine table of registered crash buffers.
pub struct BufferDescriptorCache<E: CrashCatEngine> {
    engine: Arc<E>,
    registered: Mutex<BTreeMap<(MemAperture, u64), Arc<BufferDescriptor>>>,
    live: Arc<AtomicUsize>,
}

impl<E: CrashCatEngine> BufferDescriptorCache<E> {
    /// Create an empty cache for `engine`.
    #[must_use]
    pub fn new(engine: Arc<E>) -> Self {
        Self {
            engine,
            registered: Mutex::new(BTreeMap::new()),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Register a host-owned system-memory buffer so it can be mapped later.
    pub fn register_buffer(
        &self,
        aperture: MemAperture,
        offset: u64,
        size: u32,
        private_handle: u64,
    ) -> CrashCatResult<()> {
        if !aperture.is_system() {
            return Err(CrashCatError::InvalidAperture(aperture));
        }
        if size == 0 {
            return Err(CrashCatError::ZeroSize);
        }
        if offset.checked_add(u64::from(size)).is_none() {
            return Err(CrashCatError::OutOfRange {
                offset,
                size: u64::from(size),
                len: u64::MAX,
            });
        }
        let mut registered = self
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if registered.contains_key(&(aperture, offset)) {
            return Err(CrashCatError::AlreadyRegistered { aperture, offset });
        }
        registered.insert(
            (aperture, offset),
            Arc::new(BufferDescriptor {
                aperture,
                offset,
                size,
                private_handle,
                registered: true,
            }),
        );
        debug!(target: LOG_TARGET, "registered crash buffer {aperture}:{offset:#x} size {size:#x}");
        Ok(())
    }

    /// Drop a registration. Unknown buffers are ignored. A mapping that is
    /// still alive keeps its descriptor until it is unmapped.
    pub fn unregister_buffer(&self, aperture: MemAperture, offset: u64, size: u32) {
        let mut registered = self
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let matches = registered
            .get(&(aperture, offset))
            .is_some_and(|desc| desc.size == size);
        if !matches {
            debug!(target: LOG_TARGET, "unregister of unknown crash buffer {aperture}:{offset:#x}");
            return;
        }
        if let Some(desc) = registered.remove(&(aperture, offset)) {
            if Arc::strong_count(&desc) > 1 {
                warn!(
                    target: LOG_TARGET,
                    "crash buffer {aperture}:{offset:#x} unregistered while still mapped"
                );
            }
        }
    }

    /// Map `[offset, offset + size)` of `aperture`.
    ///
    /// System-memory ranges must lie inside a registered buffer. On-chip
    /// ranges get a new zeroed staging buffer on every call; callers fill it
    /// with [`MappedBuffer::sync`] before reading.
    pub fn map_buffer(
        &self,
        aperture: MemAperture,
        offset: u64,
        size: u32,
    ) -> CrashCatResult<MappedBuffer<E>> {
        if size == 0 {
            return Err(CrashCatError::ZeroSize);
        }
        let len = size as usize;
        let (desc, backing, base) = if aperture.is_system() {
            let desc = self.find_registered(aperture, offset, size)?;
            let window = self
                .engine
                .map_buffer_descriptor(&desc)
                .ok_or(CrashCatError::MapFailed { aperture, offset })?;
            let base = (offset - desc.offset) as usize;
            if window.len() < base + len {
                self.engine.unmap_buffer_descriptor(&desc);
                return Err(CrashCatError::OutOfRange {
                    offset,
                    size: u64::from(size),
                    len: window.len() as u64,
                });
            }
            (desc, Backing::Window(window), base)
        } else {
            let staging = try_alloc_zeroed(len)?;
            let desc = Arc::new(BufferDescriptor {
                aperture,
                offset,
                size,
                private_handle: 0,
                registered: false,
            });
            (desc, Backing::Staging(staging), 0)
        };
        self.live.fetch_add(1, Ordering::AcqRel);
        debug!(target: LOG_TARGET, "mapped crash buffer {aperture}:{offset:#x} size {size:#x}");
        Ok(MappedBuffer {
            engine: Arc::clone(&self.engine),
            desc,
            backing,
            base,
            len,
            live: Arc::clone(&self.live),
        })
    }

    /// Release a mapping. Equivalent to dropping the handle.
    pub fn unmap_buffer(&self, mapping: MappedBuffer<E>) {
        drop(mapping);
    }

    /// Make a sub-range of a mapping coherent before reading it.
    pub fn sync_buffer(
        &self,
        mapping: &mut MappedBuffer<E>,
        offset: usize,
        size: usize,
    ) -> CrashCatResult<()> {
        mapping.sync(offset, size)
    }

    /// Number of registered buffers.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of live mappings handed out by this cache.
    #[must_use]
    pub fn mapped_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    fn find_registered(
        &self,
        aperture: MemAperture,
        offset: u64,
        size: u32,
    ) -> CrashCatResult<Arc<BufferDescriptor>> {
        let registered = self
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        registered
            .range(..=(aperture, offset))
            .next_back()
            .map(|(_, desc)| desc)
            .filter(|desc| desc.aperture == aperture && desc.contains(offset, size))
            .cloned()
            .ok_or(CrashCatError::NotRegistered { aperture, offset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::sim::SimEngine;

    fn cache() -> (Arc<SimEngine>, BufferDescriptorCache<SimEngine>) {
        let engine = Arc::new(SimEngine::new(EngineConfig::default()));
        (Arc::clone(&engine), BufferDescriptorCache::new(engine))
    }

    #[test]
    fn register_rejects_bad_requests() {
        let (_, cache) = cache();
        assert!(matches!(
            cache.register_buffer(MemAperture::Dmem, 0, 64, 0),
            Err(CrashCatError::InvalidAperture(MemAperture::Dmem))
        ));
        assert!(matches!(
            cache.register_buffer(MemAperture::SysGpa, 0, 0, 0),
            Err(CrashCatError::ZeroSize)
        ));
        cache.register_buffer(MemAperture::SysGpa, 0x1000, 64, 7).unwrap();
        assert!(matches!(
            cache.register_buffer(MemAperture::SysGpa, 0x1000, 128, 8),
            Err(CrashCatError::AlreadyRegistered { .. })
        ));
        assert_eq!(cache.registered_count(), 1);
    }

    #[test]
    fn ranges_at_the_top_of_the_address_space_are_rejected() {
        let (_, cache) = cache();
        let top = u64::MAX - 0x3F;
        assert!(matches!(
            cache.register_buffer(MemAperture::SysGpa, top, 0x100, 0),
            Err(CrashCatError::OutOfRange { .. })
        ));
        assert_eq!(cache.registered_count(), 0);
        assert!(matches!(
            cache.map_buffer(MemAperture::SysGpa, top, 0x10),
            Err(CrashCatError::NotRegistered { .. })
        ));

        cache.register_buffer(MemAperture::SysGpa, top, 0x3F, 0).unwrap();
        assert!(matches!(
            cache.map_buffer(MemAperture::SysGpa, top + 0x20, 0x40),
            Err(CrashCatError::NotRegistered { .. })
        ));
        // The last byte fits but the simulator has no memory there.
        assert!(matches!(
            cache.map_buffer(MemAperture::SysGpa, top, 0x3F),
            Err(CrashCatError::MapFailed { .. })
        ));
    }

    #[test]
    fn system_map_requires_registration() {
        let (engine, cache) = cache();
        engine.add_memory(MemAperture::SysGpa, 0x1000, vec![0xAB; 256]);
        assert!(matches!(
            cache.map_buffer(MemAperture::SysGpa, 0x1000, 64),
            Err(CrashCatError::NotRegistered { .. })
        ));
        cache.register_buffer(MemAperture::SysGpa, 0x1000, 256, 0).unwrap();
        let mapping = cache.map_buffer(MemAperture::SysGpa, 0x1040, 64).unwrap();
        let mut out = [0u8; 4];
        mapping.read(60, &mut out).unwrap();
        assert_eq!(out, [0xAB; 4]);
        assert!(mapping.read(61, &mut out).is_err());
        assert_eq!(cache.mapped_count(), 1);
        cache.unmap_buffer(mapping);
        assert_eq!(cache.mapped_count(), 0);
        assert_eq!(engine.live_windows(), 0);
    }

    #[test]
    fn onchip_maps_are_not_deduplicated() {
        let (engine, cache) = cache();
        engine.add_memory(MemAperture::Dmem, 0, (0u8..64).collect());
        let mut first = cache.map_buffer(MemAperture::Dmem, 0, 64).unwrap();
        let second = cache.map_buffer(MemAperture::Dmem, 0, 64).unwrap();
        first.sync(8, 8).unwrap();
        let mut out = [0u8; 8];
        first.read(8, &mut out).unwrap();
        assert_eq!(out, [8, 9, 10, 11, 12, 13, 14, 15]);
        // The second copy was never synced and stays zeroed.
        second.read(8, &mut out).unwrap();
        assert_eq!(out, [0; 8]);
        assert_eq!(cache.mapped_count(), 2);
        assert_eq!(cache.registered_count(), 0);
    }

    #[test]
    fn unregister_while_mapped_keeps_mapping_usable() {
        let (engine, cache) = cache();
        engine.add_memory(MemAperture::FbGpa, 0, vec![0x5A; 64]);
        cache.register_buffer(MemAperture::FbGpa, 0, 64, 0).unwrap();
        let mapping = cache.map_buffer(MemAperture::FbGpa, 0, 64).unwrap();
        cache.unregister_buffer(MemAperture::FbGpa, 0, 64);
        assert_eq!(cache.registered_count(), 0);
        let mut out = [0u8; 2];
        mapping.read(0, &mut out).unwrap();
        assert_eq!(out, [0x5A, 0x5A]);
        assert!(mapping.descriptor().is_registered());
        drop(mapping);
        assert_eq!(engine.live_windows(), 0);
    }

    #[test]
    fn unregister_ignores_unknown_buffers() {
        let (_, cache) = cache();
        cache.register_buffer(MemAperture::SysGpa, 0, 64, 0).unwrap();
        cache.unregister_buffer(MemAperture::SysGpa, 0, 32);
        cache.unregister_buffer(MemAperture::SysGpa, 0x40, 64);
        assert_eq!(cache.registered_count(), 1);
    }
}
