// CLASSIFICATION: COMMUNITY
// Filename: wayfinder.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Crash queue discovery through the wayfinder registers.
//!
//! The L0 register is probed until the producer signs it. The L1 value is
//! read from the scratch group L0 names exactly once, and the resulting
//! queue is memoized. A scratch group that cannot hold the queue latches a
//! permanent failure so the consumer does not flood the log.

use std::sync::Arc;

use crashcat_wire::{QueueLocation, ScratchGroupId, WayfinderL0, WayfinderVersion};
use log::{debug, error, info};

use crate::buffer::BufferDescriptorCache;
use crate::engine::{CrashCatEngine, LOG_TARGET};
use crate::error::{CrashCatError, CrashCatResult};
use crate::queue::CrashQueue;

/// Located wayfinder, one variant per protocol version.
pub enum Wayfinder<E: CrashCatEngine> {
    /// Version 1 discovery.
    V1(WayfinderV1<E>),
}

impl<E: CrashCatEngine> Wayfinder<E> {
    /// Probe the L0 register of `engine`.
    pub fn locate(engine: &E) -> CrashCatResult<Self> {
        let offset = engine.wfl0_offset();
        let l0 = WayfinderL0::from_raw(engine.pri_read(offset));
        if !l0.is_initialized() {
            return Err(CrashCatError::NotInitialized);
        }
        match WayfinderVersion::try_from(l0.version()) {
            Ok(WayfinderVersion::V1) => {
                info!(
                    target: LOG_TARGET,
                    "crashcat wayfinder v1 at {offset:#x}, L1 in scratch group {:?}",
                    l0.v1_location()
                );
                Ok(Self::V1(WayfinderV1::new(l0)))
            }
            Err(_) => Err(CrashCatError::ProtocolMisconfigured(format!(
                "unsupported wayfinder version {}",
                l0.version()
            ))),
        }
    }

    /// Protocol version of this wayfinder.
    #[must_use]
    pub fn version(&self) -> WayfinderVersion {
        match self {
            Self::V1(_) => WayfinderVersion::V1,
        }
    }

    /// Whether discovery has failed permanently.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        match self {
            Self::V1(v1) => v1.failed,
        }
    }

    /// The crash queue if an earlier call created it. Never touches the
    /// engine.
    pub fn queue_mut(&mut self) -> Option<&mut CrashQueue<E>> {
        match self {
            Self::V1(v1) => v1.queue.as_mut(),
        }
    }

    /// The crash queue, created on first success and reused afterwards.
    pub fn report_queue(
        &mut self,
        engine: &Arc<E>,
        cache: &BufferDescriptorCache<E>,
    ) -> Option<&mut CrashQueue<E>> {
        match self {
            Self::V1(v1) => v1.report_queue(engine, cache),
        }
    }
}

/// Version 1 discovery state.
pub struct WayfinderV1<E: CrashCatEngine> {
    l0: WayfinderL0,
    l1: Option<u64>,
    released: bool,
    failed: bool,
    queue: Option<CrashQueue<E>>,
}

impl<E: CrashCatEngine> WayfinderV1<E> {
    fn new(l0: WayfinderL0) -> Self {
        Self {
            l0,
            l1: None,
            released: false,
            failed: false,
            queue: None,
        }
    }

    /// Raw L0 value observed at probe time.
    #[must_use]
    pub fn l0(&self) -> WayfinderL0 {
        self.l0
    }

    /// Cached raw L1 value, once read.
    #[must_use]
    pub fn l1(&self) -> Option<u64> {
        self.l1
    }

    fn fail(&mut self, reason: &str) {
        error!(target: LOG_TARGET, "crashcat disabled for this engine: {reason}");
        self.failed = true;
    }

    fn report_queue(
        &mut self,
        engine: &Arc<E>,
        cache: &BufferDescriptorCache<E>,
    ) -> Option<&mut CrashQueue<E>> {
        if self.queue.is_none() && !self.failed {
            self.queue = self.create_queue(engine, cache);
        }
        self.queue.as_mut()
    }

    fn create_queue(
        &mut self,
        engine: &Arc<E>,
        cache: &BufferDescriptorCache<E>,
    ) -> Option<CrashQueue<E>> {
        let group = self.l0.v1_location();
        if group == ScratchGroupId::None {
            self.fail("wayfinder names no scratch group");
            return None;
        }
        let offsets = engine.scratch_offsets(group).to_vec();
        if offsets.len() < 2 {
            self.fail(&format!(
                "scratch group {group:?} has {} registers, need at least 2",
                offsets.len()
            ));
            return None;
        }

        let raw = match self.l1 {
            Some(raw) => raw,
            None => {
                let low = u64::from(engine.pri_read(offsets[0]));
                let high = u64::from(engine.pri_read(offsets[1]));
                let raw = low | (high << 32);
                debug!(target: LOG_TARGET, "crashcat L1 wayfinder {raw:#018x}");
                self.l1 = Some(raw);
                raw
            }
        };
        let location = match QueueLocation::decode(raw) {
            Ok(location) => location,
            Err(err) => {
                self.fail(&format!("L1 wayfinder {raw:#018x}: {err}"));
                return None;
            }
        };

        let (put_reg, get_reg) = if offsets.len() >= 4 {
            (offsets[2], offsets[3])
        } else {
            (offsets[0], offsets[1])
        };

        let queue = match CrashQueue::new(Arc::clone(engine), cache, location, put_reg, get_reg)
        {
            Ok(queue) => queue,
            Err(err) => {
                debug!(
                    target: LOG_TARGET,
                    "crash queue {}:{:#x} not mappable yet: {err}",
                    location.aperture,
                    location.offset
                );
                return None;
            }
        };

        if offsets.len() < 4 && !self.released {
            engine.pri_write(put_reg, 0);
            engine.pri_write(get_reg, 0);
            let released = self.l0.with_v1_location(ScratchGroupId::None);
            engine.pri_write(engine.wfl0_offset(), released.raw());
            self.released = true;
            debug!(target: LOG_TARGET, "released scratch group {group:?} for put/get");
        }
        info!(
            target: LOG_TARGET,
            "crash queue {} offset {:#x} size {:#x}, put {put_reg:#x} get {get_reg:#x}",
            location.aperture,
            location.offset,
            location.size
        );
        Some(queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::sim::SimEngine;
    use crashcat_wire::MemAperture;

    fn location() -> QueueLocation {
        QueueLocation {
            aperture: MemAperture::Emem,
            size: 128,
            offset: 0x800,
        }
    }

    fn setup(group: ScratchGroupId) -> (Arc<SimEngine>, BufferDescriptorCache<SimEngine>) {
        let engine = Arc::new(SimEngine::new(EngineConfig::default()));
        engine.publish_wayfinder(group, location()).unwrap();
        let cache = BufferDescriptorCache::new(Arc::clone(&engine));
        (engine, cache)
    }

    #[test]
    fn unsigned_l0_is_not_initialized() {
        let engine = SimEngine::new(EngineConfig::default());
        assert!(matches!(
            Wayfinder::locate(&engine),
            Err(CrashCatError::NotInitialized)
        ));
    }

    #[test]
    fn unknown_version_is_misconfigured() {
        let engine = SimEngine::new(EngineConfig::default());
        engine.set_register(0x100, 0x0012_DEAD);
        assert!(matches!(
            Wayfinder::locate(&engine),
            Err(CrashCatError::ProtocolMisconfigured(_))
        ));
    }

    #[test]
    fn four_register_group_uses_upper_pair() {
        let (engine, cache) = setup(ScratchGroupId::B);
        let mut wayfinder = Wayfinder::locate(engine.as_ref()).unwrap();
        let queue = wayfinder.report_queue(&engine, &cache).unwrap();
        assert_eq!(queue.location(), location());
        assert_eq!((queue.put_register(), queue.get_register()), (0x128, 0x12C));
        assert!(engine.register_writes().is_empty());
    }

    #[test]
    fn l1_is_read_once() {
        let (engine, cache) = setup(ScratchGroupId::B);
        let mut wayfinder = Wayfinder::locate(engine.as_ref()).unwrap();
        assert!(wayfinder.report_queue(&engine, &cache).is_some());
        engine.set_register(0x120, 0xFFFF_FFFF);
        assert!(wayfinder.report_queue(&engine, &cache).is_some());
        let Wayfinder::V1(v1) = &wayfinder;
        assert_eq!(v1.l1(), Some(location().encode().unwrap()));
    }

    #[test]
    fn empty_group_latches_failure() {
        let (engine, cache) = setup(ScratchGroupId::B);
        engine.set_register(0x100, WayfinderL0::new_v1(ScratchGroupId::D).raw());
        let mut wayfinder = Wayfinder::locate(engine.as_ref()).unwrap();
        assert!(wayfinder.report_queue(&engine, &cache).is_none());
        assert!(wayfinder.is_failed());
        engine.set_register(0x100, WayfinderL0::new_v1(ScratchGroupId::B).raw());
        assert!(wayfinder.report_queue(&engine, &cache).is_none());
    }

    #[test]
    fn unregistered_system_queue_is_retried() {
        let engine = Arc::new(SimEngine::new(EngineConfig::default()));
        let sys = QueueLocation {
            aperture: MemAperture::SysGpa,
            size: 1024,
            offset: 0x10_0000,
        };
        engine.publish_wayfinder(ScratchGroupId::B, sys).unwrap();
        let cache = BufferDescriptorCache::new(Arc::clone(&engine));
        let mut wayfinder = Wayfinder::locate(engine.as_ref()).unwrap();
        assert!(wayfinder.report_queue(&engine, &cache).is_none());
        assert!(!wayfinder.is_failed());
        cache.register_buffer(MemAperture::SysGpa, 0x10_0000, 1024, 1).unwrap();
        assert!(wayfinder.report_queue(&engine, &cache).is_some());
        assert_eq!(engine.live_windows(), 1);
    }
}
