// CLASSIFICATION: COMMUNITY
// Filename: crashcat.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Per-engine CrashCat context.
//!
//! [`CrashCat`] ties the engine, its buffer cache and the memoized discovery
//! state together. Callers serialize access to one context; the producer is
//! fully external.

use std::sync::Arc;

use crashcat_wire::MemAperture;
use log::{error, trace};

use crate::buffer::{BufferDescriptorCache, MappedBuffer};
use crate::engine::{CrashCatEngine, LOG_TARGET};
use crate::error::{CrashCatError, CrashCatResult};
use crate::queue::CrashQueue;
use crate::report::CrashReport;
use crate::wayfinder::Wayfinder;

/// Discovery progress of one engine.
pub enum WayfinderState<E: CrashCatEngine> {
    /// Not probed yet, or the producer has not signed L0.
    Unprobed,
    /// Wayfinder located; the queue may or may not exist yet.
    Ready(Wayfinder<E>),
    /// Discovery failed permanently or the engine is not configured.
    Disabled,
}

/// CrashCat consumer for one engine.
pub struct CrashCat<E: CrashCatEngine> {
    engine: Arc<E>,
    cache: BufferDescriptorCache<E>,
    state: WayfinderState<E>,
    dump_raw: bool,
}

impl<E: CrashCatEngine> CrashCat<E> {
    /// Consumer for `engine`. Nothing is probed until the first report is
    /// requested.
    #[must_use]
    pub fn new(engine: Arc<E>) -> Self {
        let cache = BufferDescriptorCache::new(Arc::clone(&engine));
        Self {
            engine,
            cache,
            state: WayfinderState::Unprobed,
            dump_raw: true,
        }
    }

    /// The engine this context consumes from.
    #[must_use]
    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Buffer cache shared by the queue and host registrations.
    #[must_use]
    pub fn buffers(&self) -> &BufferDescriptorCache<E> {
        &self.cache
    }

    /// Discovery state.
    #[must_use]
    pub fn state(&self) -> &WayfinderState<E> {
        &self.state
    }

    /// Whether discovery is permanently off for this engine.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        matches!(self.state, WayfinderState::Disabled)
    }

    /// Enable or disable the debug hex dump of undecodable queue bytes.
    pub fn set_raw_dump(&mut self, enabled: bool) {
        self.dump_raw = enabled;
    }

    /// Bytes waiting in the queue, zero when the queue is not available.
    pub fn pending_bytes(&mut self) -> u32 {
        self.queue().map_or(0, |queue| queue.pending_bytes())
    }

    /// Decode the next crash report, logging it through the engine sink.
    pub fn next_crash_report(&mut self) -> Option<CrashReport> {
        let engine = Arc::clone(&self.engine);
        let queue = self.queue()?;
        let report = queue.consume_next(CrashReport::decode)?;
        report.log(engine.as_ref());
        Some(report)
    }

    /// Decode reports until the queue is empty. Undecodable regions are
    /// skipped; a read that makes no progress stops the drain.
    pub fn drain_crash_reports(&mut self) -> Vec<CrashReport> {
        let mut reports = Vec::new();
        loop {
            let pending = self.pending_bytes();
            if pending == 0 {
                break;
            }
            match self.next_crash_report() {
                Some(report) => reports.push(report),
                None if self.pending_bytes() == pending => break,
                None => {}
            }
        }
        reports
    }

    /// Register a host-owned system-memory buffer.
    pub fn register_buffer(
        &self,
        aperture: MemAperture,
        offset: u64,
        size: u32,
        private_handle: u64,
    ) -> CrashCatResult<()> {
        self.cache
            .register_buffer(aperture, offset, size, private_handle)
    }

    /// Drop a buffer registration.
    pub fn unregister_buffer(&self, aperture: MemAperture, offset: u64, size: u32) {
        self.cache.unregister_buffer(aperture, offset, size);
    }

    /// Map a crash buffer range.
    pub fn map_buffer(
        &self,
        aperture: MemAperture,
        offset: u64,
        size: u32,
    ) -> CrashCatResult<MappedBuffer<E>> {
        self.cache.map_buffer(aperture, offset, size)
    }

    /// Release a mapping.
    pub fn unmap_buffer(&self, mapping: MappedBuffer<E>) {
        self.cache.unmap_buffer(mapping);
    }

    /// Make a sub-range of a mapping coherent before reading it.
    pub fn sync_buffer(
        &self,
        mapping: &mut MappedBuffer<E>,
        offset: usize,
        size: usize,
    ) -> CrashCatResult<()> {
        self.cache.sync_buffer(mapping, offset, size)
    }

    /// Forget discovery state and release the queue mapping. The next
    /// request probes from scratch.
    pub fn unload(&mut self) {
        self.state = WayfinderState::Unprobed;
    }

    fn probe(&mut self) {
        if !matches!(self.state, WayfinderState::Unprobed) {
            return;
        }
        if !self.engine.configured() {
            self.state = WayfinderState::Disabled;
            return;
        }
        match Wayfinder::locate(self.engine.as_ref()) {
            Ok(wayfinder) => self.state = WayfinderState::Ready(wayfinder),
            Err(CrashCatError::NotInitialized) => {
                trace!(target: LOG_TARGET, "crashcat wayfinder not signed yet");
            }
            Err(err) => {
                error!(target: LOG_TARGET, "crashcat disabled: {err}");
                self.state = WayfinderState::Disabled;
            }
        }
    }

    fn queue(&mut self) -> Option<&mut CrashQueue<E>> {
        self.probe();
        let failed = {
            let WayfinderState::Ready(wayfinder) = &mut self.state else {
                return None;
            };
            if wayfinder.report_queue(&self.engine, &self.cache).is_none() {
                Some(wayfinder.is_failed())
            } else {
                None
            }
        };
        if let Some(failed) = failed {
            if failed {
                self.state = WayfinderState::Disabled;
            }
            return None;
        }
        let WayfinderState::Ready(wayfinder) = &mut self.state else {
            return None;
        };
        let queue = wayfinder.queue_mut()?;
        queue.set_raw_dump(self.dump_raw);
        Some(queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::sim::SimEngine;
    use crashcat_wire::{QueueLocation, ScratchGroupId};

    fn location() -> QueueLocation {
        QueueLocation {
            aperture: MemAperture::Dmem,
            size: 128,
            offset: 0x1000,
        }
    }

    #[test]
    fn unsigned_wayfinder_is_retried() {
        let engine = Arc::new(SimEngine::new(EngineConfig::default()));
        let mut crashcat = CrashCat::new(Arc::clone(&engine));
        assert!(crashcat.next_crash_report().is_none());
        assert!(matches!(crashcat.state(), WayfinderState::Unprobed));

        engine
            .publish_wayfinder(ScratchGroupId::B, location())
            .unwrap();
        assert!(crashcat.next_crash_report().is_none());
        assert!(matches!(crashcat.state(), WayfinderState::Ready(_)));
        assert!(engine.register_writes().is_empty());
    }

    #[test]
    fn unconfigured_engine_never_reads_registers() {
        let config = EngineConfig {
            enabled: false,
            ..EngineConfig::default()
        };
        let engine = Arc::new(SimEngine::new(config));
        engine
            .publish_wayfinder(ScratchGroupId::B, location())
            .unwrap();
        let mut crashcat = CrashCat::new(Arc::clone(&engine));
        assert!(crashcat.drain_crash_reports().is_empty());
        assert!(crashcat.is_disabled());
        assert_eq!(engine.read_count(), 0);
    }

    #[test]
    fn short_scratch_group_disables_after_one_error() {
        let mut config = EngineConfig::default();
        config.scratch_groups.insert(ScratchGroupId::C, vec![0x130]);
        let engine = Arc::new(SimEngine::new(config));
        engine.set_register(
            0x100,
            crashcat_wire::WayfinderL0::new_v1(ScratchGroupId::C).raw(),
        );
        let mut crashcat = CrashCat::new(Arc::clone(&engine));
        assert!(crashcat.next_crash_report().is_none());
        assert!(crashcat.is_disabled());
        let reads = engine.read_count();
        assert!(crashcat.next_crash_report().is_none());
        assert_eq!(engine.read_count(), reads);
    }

    #[test]
    fn unmappable_queue_is_tried_once_per_request() {
        let engine = Arc::new(SimEngine::new(EngineConfig::default()));
        let sys = QueueLocation {
            aperture: MemAperture::SysGpa,
            size: 1024,
            offset: 0x8000,
        };
        engine.publish_wayfinder(ScratchGroupId::B, sys).unwrap();
        let mut crashcat = CrashCat::new(Arc::clone(&engine));
        crashcat
            .register_buffer(MemAperture::SysGpa, 0x8000, 1024, 0)
            .unwrap();

        assert!(crashcat.next_crash_report().is_none());
        assert_eq!(engine.map_requests(), 1);
        assert!(crashcat.drain_crash_reports().is_empty());
        assert_eq!(engine.map_requests(), 2);
        assert!(matches!(crashcat.state(), WayfinderState::Ready(_)));

        engine.add_memory(MemAperture::SysGpa, 0x8000, vec![0; 1024]);
        assert_eq!(crashcat.pending_bytes(), 0);
        assert_eq!(engine.map_requests(), 3);
        assert_eq!(engine.live_windows(), 1);
        assert!(crashcat.next_crash_report().is_none());
        assert_eq!(engine.map_requests(), 3);
    }

    #[test]
    fn unload_drops_the_queue_mapping() {
        let engine = Arc::new(SimEngine::new(EngineConfig::default()));
        let sys = QueueLocation {
            aperture: MemAperture::SysGpa,
            size: 1024,
            offset: 0x4000,
        };
        engine.publish_wayfinder(ScratchGroupId::B, sys).unwrap();
        let mut crashcat = CrashCat::new(Arc::clone(&engine));
        crashcat
            .register_buffer(MemAperture::SysGpa, 0x4000, 1024, 0)
            .unwrap();
        assert_eq!(crashcat.pending_bytes(), 0);
        assert_eq!(engine.live_windows(), 1);
        crashcat.unload();
        assert_eq!(engine.live_windows(), 0);
        assert!(matches!(crashcat.state(), WayfinderState::Unprobed));
    }
}
