// Author: Lukas Bower
// Purpose: Encode and decode the two-level CrashCat wayfinder registers.

//! Wayfinder register layouts.
//!
//! The L0 wayfinder lives in a fixed 32-bit register and points at a scratch
//! group holding the 64-bit L1 wayfinder, which in turn describes where the
//! crash queue lives.

use crate::bits;
use crate::types::{MemAperture, MemUnitSize, ScratchGroupId, WireError, SIGNATURE};

/// Highest wayfinder protocol version understood by this crate.
pub const MAX_WAYFINDER_VERSION: u8 = 1;

const L0_SIGNATURE: (u32, u32) = (15, 0);
const L0_VERSION: (u32, u32) = (19, 16);
const L0_V1_WFL1_LOCATION: (u32, u32) = (22, 20);

const L1_V1_QUEUE_APERTURE: (u32, u32) = (2, 0);
const L1_V1_QUEUE_UNIT_SIZE: (u32, u32) = (4, 3);
const L1_V1_QUEUE_SIZE: (u32, u32) = (9, 6);
const L1_V1_QUEUE_OFFSET_1KB: (u32, u32) = (63, 10);

const QUEUE_OFFSET_SHIFT: u32 = 10;
const MAX_QUEUE_UNITS: u64 = 16;

/// Wayfinder protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WayfinderVersion {
    /// Version 1: L0 names a scratch group, the group holds L1 and the
    /// put/get pointers.
    V1,
}

impl TryFrom<u8> for WayfinderVersion {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::V1),
            other => Err(WireError::UnsupportedVersion(other)),
        }
    }
}

/// Level-0 wayfinder register value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WayfinderL0(u32);

impl WayfinderL0 {
    /// Wrap a raw register value.
    #[must_use]
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Build a version 1 wayfinder pointing at `location`.
    #[must_use]
    pub fn new_v1(location: ScratchGroupId) -> Self {
        let mut raw = bits::set(0, L0_SIGNATURE.0, L0_SIGNATURE.1, u64::from(SIGNATURE));
        raw = bits::set(raw, L0_VERSION.0, L0_VERSION.1, 1);
        raw = bits::set(
            raw,
            L0_V1_WFL1_LOCATION.0,
            L0_V1_WFL1_LOCATION.1,
            u64::from(location.raw()),
        );
        Self(raw as u32)
    }

    /// Raw register value.
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Signature field.
    #[must_use]
    pub fn signature(self) -> u16 {
        bits::get(u64::from(self.0), L0_SIGNATURE.0, L0_SIGNATURE.1) as u16
    }

    /// Whether the producer has initialized the wayfinder.
    #[must_use]
    pub fn is_initialized(self) -> bool {
        self.signature() == SIGNATURE
    }

    /// Raw 4-bit version field.
    #[must_use]
    pub fn version(self) -> u8 {
        bits::get(u64::from(self.0), L0_VERSION.0, L0_VERSION.1) as u8
    }

    /// Scratch group holding the L1 wayfinder (version 1 layout).
    #[must_use]
    pub fn v1_location(self) -> ScratchGroupId {
        ScratchGroupId::from_bits(
            bits::get(u64::from(self.0), L0_V1_WFL1_LOCATION.0, L0_V1_WFL1_LOCATION.1) as u8,
        )
    }

    /// Copy of this value with only the version 1 location field replaced.
    #[must_use]
    pub fn with_v1_location(self, location: ScratchGroupId) -> Self {
        let raw = bits::set(
            u64::from(self.0),
            L0_V1_WFL1_LOCATION.0,
            L0_V1_WFL1_LOCATION.1,
            u64::from(location.raw()),
        );
        Self(raw as u32)
    }
}

/// Where the crash queue lives, as described by the L1 wayfinder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QueueLocation {
    /// Aperture the queue is accessed through.
    pub aperture: MemAperture,
    /// Queue size in bytes.
    pub size: u32,
    /// Byte offset of the queue within the aperture.
    pub offset: u64,
}

impl QueueLocation {
    /// Decode a raw L1 value.
    pub fn decode(raw: u64) -> Result<Self, WireError> {
        WayfinderL1V1::from_raw(raw).map(WayfinderL1V1::location)
    }

    /// Encode into a raw L1 value.
    pub fn encode(&self) -> Result<u64, WireError> {
        WayfinderL1V1::from_location(*self).map(WayfinderL1V1::raw)
    }
}

/// Level-1 wayfinder, version 1 layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WayfinderL1V1 {
    aperture: MemAperture,
    unit: MemUnitSize,
    size_units_minus_1: u8,
    offset_1kb: u64,
}

impl WayfinderL1V1 {
    /// Decode a raw 64-bit value assembled from two scratch registers.
    pub fn from_raw(raw: u64) -> Result<Self, WireError> {
        let aperture =
            MemAperture::try_from(bits::get(raw, L1_V1_QUEUE_APERTURE.0, L1_V1_QUEUE_APERTURE.1) as u8)?;
        Ok(Self {
            aperture,
            unit: MemUnitSize::from_bits(
                bits::get(raw, L1_V1_QUEUE_UNIT_SIZE.0, L1_V1_QUEUE_UNIT_SIZE.1) as u8,
            ),
            size_units_minus_1: bits::get(raw, L1_V1_QUEUE_SIZE.0, L1_V1_QUEUE_SIZE.1) as u8,
            offset_1kb: bits::get(raw, L1_V1_QUEUE_OFFSET_1KB.0, L1_V1_QUEUE_OFFSET_1KB.1),
        })
    }

    /// Build the layout describing `location`, using the smallest unit that
    /// can express the size in at most 16 units.
    pub fn from_location(location: QueueLocation) -> Result<Self, WireError> {
        if location.offset % (1 << QUEUE_OFFSET_SHIFT) != 0 {
            return Err(WireError::Unrepresentable);
        }
        let offset_1kb = location.offset >> QUEUE_OFFSET_SHIFT;
        if !bits::fits(L1_V1_QUEUE_OFFSET_1KB.0, L1_V1_QUEUE_OFFSET_1KB.1, offset_1kb) {
            return Err(WireError::Unrepresentable);
        }
        let (unit, units) = MemUnitSize::smallest_for(u64::from(location.size), MAX_QUEUE_UNITS)
            .ok_or(WireError::Unrepresentable)?;
        Ok(Self {
            aperture: location.aperture,
            unit,
            size_units_minus_1: (units - 1) as u8,
            offset_1kb,
        })
    }

    /// Raw 64-bit value.
    #[must_use]
    pub fn raw(self) -> u64 {
        let mut raw = bits::set(
            0,
            L1_V1_QUEUE_APERTURE.0,
            L1_V1_QUEUE_APERTURE.1,
            u64::from(self.aperture.raw()),
        );
        raw = bits::set(
            raw,
            L1_V1_QUEUE_UNIT_SIZE.0,
            L1_V1_QUEUE_UNIT_SIZE.1,
            self.unit as u64,
        );
        raw = bits::set(
            raw,
            L1_V1_QUEUE_SIZE.0,
            L1_V1_QUEUE_SIZE.1,
            u64::from(self.size_units_minus_1),
        );
        bits::set(
            raw,
            L1_V1_QUEUE_OFFSET_1KB.0,
            L1_V1_QUEUE_OFFSET_1KB.1,
            self.offset_1kb,
        )
    }

    /// Decoded queue placement.
    #[must_use]
    pub fn location(self) -> QueueLocation {
        let units = u32::from(self.size_units_minus_1) + 1;
        QueueLocation {
            aperture: self.aperture,
            size: units << self.unit.shift(),
            offset: self.offset_1kb << QUEUE_OFFSET_SHIFT,
        }
    }
}
