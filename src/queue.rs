// CLASSIFICATION: COMMUNITY
// Filename: queue.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Consumer side of the CrashCat circular queue.
//!
//! `put` and `get` are byte offsets into the queue, `put == get` means empty
//! and the producer always leaves at least one byte free. Each call to
//! [`CrashQueue::consume_next`] reads everything between `get` and `put` into
//! one linear buffer, hands it to a decoder and advances `get` by what the
//! decoder consumed, or past the whole region when decoding fails.

use std::sync::Arc;

use crashcat_wire::QueueLocation;
use log::{debug, log_enabled, trace, warn, Level};

use crate::buffer::{BufferDescriptorCache, MappedBuffer};
use crate::engine::{CrashCatEngine, LOG_TARGET};
use crate::error::{try_alloc_zeroed, CrashCatResult};

/// Bytes the producer may still write.
#[must_use]
pub fn free_bytes(put: u32, get: u32, size: u32) -> u32 {
    if put >= get {
        size - (put - get)
    } else {
        get - put
    }
}

/// Bytes waiting for the consumer.
#[must_use]
pub fn bytes_to_read(put: u32, get: u32, size: u32) -> u32 {
    if put >= get {
        put - get
    } else {
        size - (get - put)
    }
}

/// Mapped crash queue with its control registers.
pub struct CrashQueue<E: CrashCatEngine> {
    engine: Arc<E>,
    location: QueueLocation,
    put_reg: u32,
    get_reg: u32,
    mapping: MappedBuffer<E>,
    dump_raw: bool,
    reported_bad_pointers: bool,
}

impl<E: CrashCatEngine> CrashQueue<E> {
    /// Map the queue described by `location`.
    pub fn new(
        engine: Arc<E>,
        cache: &BufferDescriptorCache<E>,
        location: QueueLocation,
        put_reg: u32,
        get_reg: u32,
    ) -> CrashCatResult<Self> {
        let mapping = cache.map_buffer(location.aperture, location.offset, location.size)?;
        Ok(Self {
            engine,
            location,
            put_reg,
            get_reg,
            mapping,
            dump_raw: true,
            reported_bad_pointers: false,
        })
    }

    /// Where the queue lives.
    #[must_use]
    pub fn location(&self) -> QueueLocation {
        self.location
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

    /// Enable or disable the debug hex dump of undecodable bytes.
    pub fn set_raw_dump(&mut self, enabled: bool) {
        self.dump_raw = enabled;
    }

    /// Bytes currently readable, zero when the registers are out of range.
    #[must_use]
    pub fn pending_bytes(&self) -> u32 {
        let (put, get) = self.pointers();
        if put >= self.location.size || get >= self.location.size {
            return 0;
        }
        bytes_to_read(put, get, self.location.size)
    }

    fn pointers(&self) -> (u32, u32) {
        (
            self.engine.pri_read(self.put_reg),
            self.engine.pri_read(self.get_reg),
        )
    }

    /// Decode the next entry from the queue.
    ///
    /// `decode` receives every readable byte, linearized across the wrap
    /// point, and returns the value with the number of bytes it used.
    /// Returns `None` when the queue is empty, the registers are corrupt,
    /// the host cannot allocate a read buffer, or decoding fails. Corrupt
    /// registers are warned about once until they read back in range. Writing
    /// `get` back is the only register write, and happens only when bytes
    /// were read.
    pub fn consume_next<T, F>(&mut self, decode: F) -> Option<T>
    where
        F: FnOnce(&[u8]) -> CrashCatResult<(T, usize)>,
    {
        let size = self.location.size;
        let (put, get) = self.pointers();
        if put >= size || get >= size {
            if self.reported_bad_pointers {
                trace!(
                    target: LOG_TARGET,
                    "crash queue pointers still out of range: put {put:#x} get {get:#x}"
                );
            } else {
                warn!(
                    target: LOG_TARGET,
                    "crash queue pointers out of range: put {put:#x} get {get:#x} size {size:#x}"
                );
                self.reported_bad_pointers = true;
            }
            return None;
        }
        self.reported_bad_pointers = false;
        if put == get {
            trace!(target: LOG_TARGET, "crash queue empty at {get:#x}");
            return None;
        }

        let bytes = match self.read_linear(put, get) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(target: LOG_TARGET, "crash queue read failed: {err}");
                return None;
            }
        };
        let available = bytes.len();

        let (result, advance) = match decode(&bytes) {
            Ok((value, used)) if used > 0 && used <= available => (Some(value), used),
            Ok((_, used)) => {
                warn!(
                    target: LOG_TARGET,
                    "decoder consumed {used} of {available} bytes; skipping region"
                );
                self.dump(&bytes);
                (None, available)
            }
            Err(err) => {
                warn!(
                    target: LOG_TARGET,
                    "skipping {available} undecodable crash queue bytes: {err}"
                );
                self.dump(&bytes);
                (None, available)
            }
        };

        let new_get = ((u64::from(get) + advance as u64) % u64::from(size)) as u32;
        debug!(target: LOG_TARGET, "crash queue get {get:#x} -> {new_get:#x}");
        self.engine.pri_write(self.get_reg, new_get);
        result
    }

    fn read_linear(&mut self, put: u32, get: u32) -> CrashCatResult<Vec<u8>> {
        let size = self.location.size;
        let total = bytes_to_read(put, get, size) as usize;
        let mut out = try_alloc_zeroed(total)?;

        let head = get as usize;
        if put > get || put == 0 {
            self.read_piece(head, &mut out)?;
        } else {
            let tail_len = (size - get) as usize;
            let (tail, wrapped) = out.split_at_mut(tail_len);
            self.read_piece(head, tail)?;
            self.read_piece(0, wrapped)?;
        }
        Ok(out)
    }

    fn read_piece(&mut self, offset: usize, out: &mut [u8]) -> CrashCatResult<()> {
        self.mapping.sync(offset, out.len())?;
        self.mapping.read(offset, out)
    }

    fn dump(&self, bytes: &[u8]) {
        if self.dump_raw && log_enabled!(target: LOG_TARGET, Level::Debug) {
            debug!(target: LOG_TARGET, "raw crash queue bytes: {}", hex::encode(bytes));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::CrashCatError;
    use crate::sim::SimEngine;
    use crashcat_wire::MemAperture;

    const PUT: u32 = 0x128;
    const GET: u32 = 0x12C;

    fn queue(fill: impl Fn(usize) -> u8) -> (Arc<SimEngine>, CrashQueue<SimEngine>) {
        let engine = Arc::new(SimEngine::new(EngineConfig::default()));
        engine.add_memory(MemAperture::Dmem, 0x400, (0..64).map(fill).collect());
        let cache = BufferDescriptorCache::new(Arc::clone(&engine));
        let location = QueueLocation {
            aperture: MemAperture::Dmem,
            size: 64,
            offset: 0x400,
        };
        let queue = CrashQueue::new(Arc::clone(&engine), &cache, location, PUT, GET).unwrap();
        (engine, queue)
    }

    fn take_all(bytes: &[u8]) -> CrashCatResult<(Vec<u8>, usize)> {
        Ok((bytes.to_vec(), bytes.len()))
    }

    #[test]
    fn helpers_partition_the_queue() {
        for size in [1u32, 2, 7, 64] {
            for put in 0..size {
                for get in 0..size {
                    let readable = bytes_to_read(put, get, size);
                    if put == get {
                        assert_eq!(readable, 0);
                    } else {
                        assert_eq!(free_bytes(put, get, size) + readable, size);
                    }
                }
            }
        }
    }

    #[test]
    fn contiguous_read_advances_get() {
        let (engine, mut queue) = queue(|i| i as u8);
        engine.set_register(PUT, 20);
        engine.set_register(GET, 4);
        assert_eq!(queue.pending_bytes(), 16);
        let bytes = queue.consume_next(take_all).unwrap();
        assert_eq!(bytes, (4u8..20).collect::<Vec<_>>());
        assert_eq!(engine.register(GET), 20);
    }

    #[test]
    fn just_wrapped_reads_to_end() {
        let (engine, mut queue) = queue(|i| i as u8);
        engine.set_register(PUT, 0);
        engine.set_register(GET, 56);
        let bytes = queue.consume_next(take_all).unwrap();
        assert_eq!(bytes, (56u8..64).collect::<Vec<_>>());
        assert_eq!(engine.register(GET), 0);
    }

    #[test]
    fn partial_consumption_leaves_the_rest() {
        let (engine, mut queue) = queue(|i| i as u8);
        engine.set_register(PUT, 30);
        engine.set_register(GET, 10);
        let first = queue.consume_next(|b| Ok((b[0], 8))).unwrap();
        assert_eq!(first, 10);
        assert_eq!(engine.register(GET), 18);
        assert_eq!(queue.pending_bytes(), 12);
    }

    #[test]
    fn out_of_range_pointers_are_rejected_without_writes() {
        let (engine, mut queue) = queue(|_| 0);
        engine.set_register(PUT, 64);
        engine.set_register(GET, 0);
        assert!(queue.consume_next(take_all).is_none());
        assert_eq!(queue.pending_bytes(), 0);
        assert!(engine.register_writes().is_empty());
    }

    #[test]
    fn out_of_range_pointers_warn_once_until_repaired() {
        let (engine, mut queue) = queue(|i| i as u8);
        engine.set_register(PUT, 200);
        engine.set_register(GET, 0);
        assert!(queue.consume_next(take_all).is_none());
        assert!(queue.reported_bad_pointers);
        for _ in 0..100 {
            assert!(queue.consume_next(take_all).is_none());
        }
        assert!(queue.reported_bad_pointers);
        assert!(engine.register_writes().is_empty());

        engine.set_register(PUT, 8);
        assert_eq!(queue.consume_next(take_all).unwrap(), (0u8..8).collect::<Vec<_>>());
        assert!(!queue.reported_bad_pointers);

        engine.set_register(GET, 64);
        assert!(queue.consume_next(take_all).is_none());
        assert!(queue.reported_bad_pointers);
    }

    #[test]
    fn failed_or_empty_decode_skips_the_region() {
        let (engine, mut queue) = queue(|_| 0);
        engine.set_register(PUT, 40);
        engine.set_register(GET, 8);
        let none: Option<()> = queue.consume_next(|_| Err(CrashCatError::ZeroSize));
        assert!(none.is_none());
        assert_eq!(engine.register(GET), 40);

        engine.set_register(PUT, 48);
        let none = queue.consume_next(|_| Ok(((), 0)));
        assert!(none.is_none());
        assert_eq!(engine.register(GET), 48);
    }
}
