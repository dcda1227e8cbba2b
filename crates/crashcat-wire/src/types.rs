// Author: Lukas Bower
// Purpose: Define CrashCat constants, shared enums and wire errors.
#![allow(clippy::module_name_repetitions)]

//! Constants and small enums shared by every CrashCat layout.

use core::fmt;

/// Signature stamped into initialized wayfinders and valid packet headers.
pub const SIGNATURE: u16 = 0xDEAD;

/// Errors produced while encoding or decoding CrashCat layouts.
#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    /// The 16-bit signature field did not hold [`SIGNATURE`].
    #[error("bad signature {0:#06x}")]
    BadSignature(u16),
    /// The version field is zero or newer than this decoder understands.
    #[error("unsupported version {0}")]
    UnsupportedVersion(u8),
    /// The header declared an empty payload.
    #[error("zero-sized payload")]
    ZeroPayload,
    /// The input ended before the declared structure did.
    #[error("truncated: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes required by the declared layout.
        needed: usize,
        /// Bytes actually supplied.
        available: usize,
    },
    /// The packet type is not known for this format version.
    #[error("unknown packet type {0:#04x}")]
    UnknownPacketType(u8),
    /// A fixed-size packet declared the wrong payload size.
    #[error("payload size mismatch: expected {expected} bytes, got {actual}")]
    PayloadSize {
        /// Size mandated by the packet type.
        expected: usize,
        /// Size declared in the header.
        actual: usize,
    },
    /// The 3-bit aperture field holds an unassigned value.
    #[error("invalid memory aperture {0}")]
    InvalidAperture(u8),
    /// A value cannot be represented in the target layout.
    #[error("value not representable in wire layout")]
    Unrepresentable,
    /// A report stream did not begin with a Report packet.
    #[error("expected a report packet, found {0:?}")]
    UnexpectedPacket(crate::PacketType),
}

/// Memory space through which a crash buffer is accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MemAperture {
    /// System memory, guest physical address.
    SysGpa = 0,
    /// Frame-buffer memory, guest physical address.
    FbGpa = 1,
    /// On-chip data memory of the crashing core.
    Dmem = 2,
    /// On-chip external memory window of the crashing core.
    Emem = 3,
}

impl MemAperture {
    /// Whether the aperture is system memory the host maps directly.
    #[must_use]
    pub fn is_system(self) -> bool {
        matches!(self, Self::SysGpa | Self::FbGpa)
    }

    /// Raw 3-bit encoding.
    #[must_use]
    pub fn raw(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MemAperture {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::SysGpa,
            1 => Self::FbGpa,
            2 => Self::Dmem,
            3 => Self::Emem,
            other => return Err(WireError::InvalidAperture(other)),
        })
    }
}

impl fmt::Display for MemAperture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SysGpa => "SYSGPA",
            Self::FbGpa => "FBGPA",
            Self::Dmem => "DMEM",
            Self::Emem => "EMEM",
        };
        f.write_str(name)
    }
}

/// Unit in which queue and payload sizes are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MemUnitSize {
    /// 8 bytes.
    Bytes8 = 0,
    /// 1 KiB.
    Kib1 = 1,
    /// 4 KiB.
    Kib4 = 2,
    /// 64 KiB.
    Kib64 = 3,
}

impl MemUnitSize {
    /// All units from smallest to largest.
    pub const ALL: [Self; 4] = [Self::Bytes8, Self::Kib1, Self::Kib4, Self::Kib64];

    /// Decode the 2-bit field. Every value is assigned.
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => Self::Bytes8,
            1 => Self::Kib1,
            2 => Self::Kib4,
            _ => Self::Kib64,
        }
    }

    /// Log2 of the unit in bytes.
    #[must_use]
    pub fn shift(self) -> u32 {
        match self {
            Self::Bytes8 => 3,
            Self::Kib1 => 10,
            Self::Kib4 => 12,
            Self::Kib64 => 16,
        }
    }

    /// Unit size in bytes.
    #[must_use]
    pub fn bytes(self) -> u64 {
        1u64 << self.shift()
    }

    /// Pick the smallest unit able to express `size` as at most `max_units`
    /// whole units.
    #[must_use]
    pub fn smallest_for(size: u64, max_units: u64) -> Option<(Self, u64)> {
        if size == 0 {
            return None;
        }
        Self::ALL.into_iter().find_map(|unit| {
            let units = size >> unit.shift();
            (size % unit.bytes() == 0 && units <= max_units).then_some((unit, units))
        })
    }
}

/// Named group of scratch registers that can carry the L1 wayfinder and the
/// put/get pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ScratchGroupId {
    /// No group; the registers have been released.
    None = 0,
    /// Group A.
    A = 1,
    /// Group B.
    B = 2,
    /// Group C.
    C = 3,
    /// Group D.
    D = 4,
    /// Group E.
    E = 5,
    /// Group F.
    F = 6,
    /// Implementation-defined group.
    ImplDef = 7,
}

impl ScratchGroupId {
    /// Decode the 3-bit location field. Every value is assigned.
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x7 {
            0 => Self::None,
            1 => Self::A,
            2 => Self::B,
            3 => Self::C,
            4 => Self::D,
            5 => Self::E,
            6 => Self::F,
            _ => Self::ImplDef,
        }
    }

    /// Raw 3-bit encoding.
    #[must_use]
    pub fn raw(self) -> u8 {
        self as u8
    }
}

/// RISC-V privilege mode recorded alongside a context or register dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RiscvMode {
    /// Not recorded.
    Unspecified,
    /// Machine mode.
    M,
    /// Supervisor mode.
    S,
    /// User mode.
    U,
    /// Value not assigned by the format.
    Reserved(u8),
}

impl RiscvMode {
    /// Decode the 3-bit mode field.
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x7 {
            0 => Self::Unspecified,
            1 => Self::M,
            2 => Self::S,
            3 => Self::U,
            other => Self::Reserved(other),
        }
    }

    /// Raw 3-bit encoding.
    #[must_use]
    pub fn raw(self) -> u8 {
        match self {
            Self::Unspecified => 0,
            Self::M => 1,
            Self::S => 2,
            Self::U => 3,
            Self::Reserved(other) => other & 0x7,
        }
    }

    /// CSR name prefix for this mode (`m`, `s`, `u`), `x` when unknown.
    #[must_use]
    pub fn csr_prefix(self) -> char {
        match self {
            Self::M => 'm',
            Self::S => 's',
            Self::U => 'u',
            _ => 'x',
        }
    }
}

impl fmt::Display for RiscvMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unspecified => f.write_str("unspecified"),
            Self::M => f.write_str("M-mode"),
            Self::S => f.write_str("S-mode"),
            Self::U => f.write_str("U-mode"),
            Self::Reserved(other) => write!(f, "reserved({other})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_selection_prefers_smallest_unit() {
        assert_eq!(MemUnitSize::smallest_for(64, 16), Some((MemUnitSize::Bytes8, 8)));
        assert_eq!(MemUnitSize::smallest_for(4096, 16), Some((MemUnitSize::Kib1, 4)));
        assert_eq!(MemUnitSize::smallest_for(64 * 1024, 16), Some((MemUnitSize::Kib4, 16)));
        assert_eq!(MemUnitSize::smallest_for(12, 16), None);
        assert_eq!(MemUnitSize::smallest_for(0, 16), None);
    }

    #[test]
    fn aperture_rejects_unassigned_values() {
        assert_eq!(MemAperture::try_from(3), Ok(MemAperture::Emem));
        assert_eq!(MemAperture::try_from(5), Err(WireError::InvalidAperture(5)));
        assert!(MemAperture::FbGpa.is_system());
        assert!(!MemAperture::Dmem.is_system());
    }

    #[test]
    fn riscv_mode_keeps_reserved_values() {
        assert_eq!(RiscvMode::from_bits(6), RiscvMode::Reserved(6));
        assert_eq!(RiscvMode::Reserved(6).raw(), 6);
        assert_eq!(RiscvMode::S.csr_prefix(), 's');
    }
}
