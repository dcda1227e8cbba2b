// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Report v1 packet layout and its packed identity/cause subfields.
// Author: Lukas Bower

//! Report v1 payload.
//!
//! Seven little-endian 64-bit words follow the packet header. The first word
//! is the implementer signature naming the firmware stack that produced the
//! report; the layout of the remaining words is the same for every
//! implementer, only the meaning of their implementer-defined bits differs.

use alloc::vec::Vec;
use core::fmt;

use crate::bits;
use crate::types::{RiscvMode, WireError};

/// Size of the Report v1 payload in bytes.
pub const REPORT_V1_PAYLOAD_SIZE: usize = 56;

/// Implementer signature of LIBOS 2.x reports (`"LIBOS2.0"`).
pub const IMPLEMENTER_SIGNATURE_LIBOS2: u64 = 0x4C49_424F_5332_2E30;

/// Implementer signature of LIBOS 3.x reports (`"LIBOS3.1"`).
pub const IMPLEMENTER_SIGNATURE_LIBOS3: u64 = 0x4C49_424F_5333_2E31;

const ID_PARTITION: (u32, u32) = (7, 0);
const ID_UCODE_ID: (u32, u32) = (15, 8);
const ID_RISCV_MODE: (u32, u32) = (18, 16);
const ID_IMPL_DEF: (u32, u32) = (63, 19);

const DATA_VERSION: (u32, u32) = (31, 0);
const DATA_TIMESTAMP: (u32, u32) = (63, 32);

const CAUSE_TYPE: (u32, u32) = (3, 0);
const CAUSE_CONTAINMENT: (u32, u32) = (7, 4);
const CAUSE_IMPL_DEF: (u32, u32) = (63, 8);

/// Identity of an execution context (reporter or crash source).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TaskContext(u64);

impl TaskContext {
    /// Wrap a raw identity word.
    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Pack an identity word. `impl_def` holds the implementer-defined bits
    /// already shifted down to bit 0.
    #[must_use]
    pub fn new(partition: u8, ucode_id: u8, mode: RiscvMode, impl_def: u64) -> Self {
        let mut raw = bits::set(0, ID_PARTITION.0, ID_PARTITION.1, u64::from(partition));
        raw = bits::set(raw, ID_UCODE_ID.0, ID_UCODE_ID.1, u64::from(ucode_id));
        raw = bits::set(raw, ID_RISCV_MODE.0, ID_RISCV_MODE.1, u64::from(mode.raw()));
        Self(bits::set(raw, ID_IMPL_DEF.0, ID_IMPL_DEF.1, impl_def))
    }

    /// Raw identity word.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }

    /// NV-RISCV partition index.
    #[must_use]
    pub fn partition(self) -> u8 {
        bits::get(self.0, ID_PARTITION.0, ID_PARTITION.1) as u8
    }

    /// Microcode identifier.
    #[must_use]
    pub fn ucode_id(self) -> u8 {
        bits::get(self.0, ID_UCODE_ID.0, ID_UCODE_ID.1) as u8
    }

    /// Privilege mode the context was running in.
    #[must_use]
    pub fn riscv_mode(self) -> RiscvMode {
        RiscvMode::from_bits(bits::get(self.0, ID_RISCV_MODE.0, ID_RISCV_MODE.1) as u8)
    }

    /// Implementer-defined bits, shifted down to bit 0.
    #[must_use]
    pub fn impl_def(self) -> u64 {
        bits::get(self.0, ID_IMPL_DEF.0, ID_IMPL_DEF.1)
    }
}

/// Reporter version and timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReporterData(u64);

impl ReporterData {
    /// Wrap a raw data word.
    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Pack a data word.
    #[must_use]
    pub fn new(version: u32, timestamp: u32) -> Self {
        let raw = bits::set(0, DATA_VERSION.0, DATA_VERSION.1, u64::from(version));
        Self(bits::set(raw, DATA_TIMESTAMP.0, DATA_TIMESTAMP.1, u64::from(timestamp)))
    }

    /// Raw data word.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Implementer-defined reporter version.
    #[must_use]
    pub fn version(self) -> u32 {
        bits::get(self.0, DATA_VERSION.0, DATA_VERSION.1) as u32
    }

    /// Reporter timestamp (seconds, implementer-defined epoch).
    #[must_use]
    pub fn timestamp(self) -> u32 {
        bits::get(self.0, DATA_TIMESTAMP.0, DATA_TIMESTAMP.1) as u32
    }
}

/// What kind of event produced the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CauseType {
    /// Hardware exception or trap.
    Exception,
    /// Watchdog or other timeout.
    Timeout,
    /// Software panic.
    Panic,
    /// Value not assigned by the format.
    Reserved(u8),
}

impl CauseType {
    /// Decode the 4-bit field.
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0xF {
            0 => Self::Exception,
            1 => Self::Timeout,
            2 => Self::Panic,
            other => Self::Reserved(other),
        }
    }

    /// Raw 4-bit encoding.
    #[must_use]
    pub fn raw(self) -> u8 {
        match self {
            Self::Exception => 0,
            Self::Timeout => 1,
            Self::Panic => 2,
            Self::Reserved(other) => other & 0xF,
        }
    }
}

impl fmt::Display for CauseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exception => f.write_str("EXCEPTION"),
            Self::Timeout => f.write_str("TIMEOUT"),
            Self::Panic => f.write_str("PANIC"),
            Self::Reserved(other) => write!(f, "RESERVED({other})"),
        }
    }
}

/// How far the failure was contained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Containment {
    /// Not recorded.
    Unspecified,
    /// Contained to the RISC-V M-mode context.
    RiscvModeM,
    /// Contained to the hart.
    RiscvHart,
    /// Not contained.
    Uncontained,
    /// Value not assigned by the format.
    Reserved(u8),
}

impl Containment {
    /// Decode the 4-bit field.
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0xF {
            0 => Self::Unspecified,
            1 => Self::RiscvModeM,
            2 => Self::RiscvHart,
            3 => Self::Uncontained,
            other => Self::Reserved(other),
        }
    }

    /// Raw 4-bit encoding.
    #[must_use]
    pub fn raw(self) -> u8 {
        match self {
            Self::Unspecified => 0,
            Self::RiscvModeM => 1,
            Self::RiscvHart => 2,
            Self::Uncontained => 3,
            Self::Reserved(other) => other & 0xF,
        }
    }
}

impl fmt::Display for Containment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unspecified => f.write_str("unspecified"),
            Self::RiscvModeM => f.write_str("RISC-V M-mode"),
            Self::RiscvHart => f.write_str("RISC-V hart"),
            Self::Uncontained => f.write_str("uncontained"),
            Self::Reserved(other) => write!(f, "reserved({other})"),
        }
    }
}

/// Cause of the crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceCause(u64);

impl SourceCause {
    /// Wrap a raw cause word.
    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Pack a cause word. `impl_def` holds the implementer-defined bits
    /// already shifted down to bit 0.
    #[must_use]
    pub fn new(ty: CauseType, containment: Containment, impl_def: u64) -> Self {
        let mut raw = bits::set(0, CAUSE_TYPE.0, CAUSE_TYPE.1, u64::from(ty.raw()));
        raw = bits::set(
            raw,
            CAUSE_CONTAINMENT.0,
            CAUSE_CONTAINMENT.1,
            u64::from(containment.raw()),
        );
        Self(bits::set(raw, CAUSE_IMPL_DEF.0, CAUSE_IMPL_DEF.1, impl_def))
    }

    /// Raw cause word.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Kind of event.
    #[must_use]
    pub fn cause_type(self) -> CauseType {
        CauseType::from_bits(bits::get(self.0, CAUSE_TYPE.0, CAUSE_TYPE.1) as u8)
    }

    /// Containment level.
    #[must_use]
    pub fn containment(self) -> Containment {
        Containment::from_bits(bits::get(self.0, CAUSE_CONTAINMENT.0, CAUSE_CONTAINMENT.1) as u8)
    }

    /// Implementer-defined bits, shifted down to bit 0.
    #[must_use]
    pub fn impl_def(self) -> u64 {
        bits::get(self.0, CAUSE_IMPL_DEF.0, CAUSE_IMPL_DEF.1)
    }
}

/// Report v1 payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReportV1 {
    /// Firmware stack that produced the report.
    pub implementer_signature: u64,
    /// Context that wrote the report.
    pub reporter_id: TaskContext,
    /// Reporter version and timestamp.
    pub reporter_data: ReporterData,
    /// Context that crashed.
    pub source_id: TaskContext,
    /// Why it crashed.
    pub source_cause: SourceCause,
    /// Program counter of the crashing context.
    pub source_pc: u64,
    /// Cause-specific auxiliary data.
    pub source_data: u64,
}

impl ReportV1 {
    /// Decode the 56-byte payload.
    pub fn decode_payload(payload: &[u8]) -> Result<Self, WireError> {
        if payload.len() != REPORT_V1_PAYLOAD_SIZE {
            return Err(WireError::PayloadSize {
                expected: REPORT_V1_PAYLOAD_SIZE,
                actual: payload.len(),
            });
        }
        Ok(Self {
            implementer_signature: bits::read_u64(payload, 0),
            reporter_id: TaskContext::from_raw(bits::read_u64(payload, 1)),
            reporter_data: ReporterData::from_raw(bits::read_u64(payload, 2)),
            source_id: TaskContext::from_raw(bits::read_u64(payload, 3)),
            source_cause: SourceCause::from_raw(bits::read_u64(payload, 4)),
            source_pc: bits::read_u64(payload, 5),
            source_data: bits::read_u64(payload, 6),
        })
    }

    /// Encode the 56-byte payload.
    #[must_use]
    pub fn payload(&self) -> Vec<u8> {
        [
            self.implementer_signature,
            self.reporter_id.raw(),
            self.reporter_data.raw(),
            self.source_id.raw(),
            self.source_cause.raw(),
            self.source_pc,
            self.source_data,
        ]
        .iter()
        .flat_map(|word| word.to_le_bytes())
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_fields_pack() {
        let id = TaskContext::new(3, 0x21, RiscvMode::U, 0x5A << 5);
        assert_eq!(id.partition(), 3);
        assert_eq!(id.ucode_id(), 0x21);
        assert_eq!(id.riscv_mode(), RiscvMode::U);
        assert_eq!(id.impl_def(), 0x5A << 5);
        assert_eq!(id.raw(), 0x3 | (0x21 << 8) | (0x3 << 16) | (0x5A << 24));
    }

    #[test]
    fn cause_fields_pack() {
        let cause = SourceCause::new(CauseType::Panic, Containment::RiscvHart, 0x0B);
        assert_eq!(cause.raw(), 0x0B22);
        assert_eq!(cause.cause_type(), CauseType::Panic);
        assert_eq!(cause.containment(), Containment::RiscvHart);
        assert_eq!(SourceCause::from_raw(0x9).cause_type(), CauseType::Reserved(9));
    }

    #[test]
    fn payload_size_is_enforced() {
        assert_eq!(
            ReportV1::decode_payload(&[0u8; 48]),
            Err(WireError::PayloadSize {
                expected: 56,
                actual: 48
            })
        );
    }

    #[test]
    fn signatures_spell_their_names() {
        assert_eq!(&IMPLEMENTER_SIGNATURE_LIBOS2.to_be_bytes(), b"LIBOS2.0");
        assert_eq!(&IMPLEMENTER_SIGNATURE_LIBOS3.to_be_bytes(), b"LIBOS3.1");
    }
}
