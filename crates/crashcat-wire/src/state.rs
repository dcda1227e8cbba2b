// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Auxiliary CrashCat packets carrying RISC-V and IO register state.
// Author: Lukas Bower

//! Auxiliary state packets that follow a Report packet.

use alloc::vec::Vec;
use core::fmt;

use crate::bits;
use crate::types::{RiscvMode, WireError};

/// Payload size of a CSR state packet.
pub const CSR_STATE_V1_PAYLOAD_SIZE: usize = 7 * 8;

/// Payload size of a GPR state packet.
pub const GPR_STATE_V1_PAYLOAD_SIZE: usize = 31 * 8;

const META_RISCV_MODE: (u32, u32) = (2, 0);
const META_TRACE_TYPE: (u32, u32) = (3, 3);
const META_IO_APERTURE: (u32, u32) = (2, 0);

fn mode_from_meta(meta: u32) -> RiscvMode {
    RiscvMode::from_bits(bits::get(u64::from(meta), META_RISCV_MODE.0, META_RISCV_MODE.1) as u8)
}

fn words(payload: &[u8]) -> impl Iterator<Item = u64> + '_ {
    (0..payload.len() / 8).map(move |index| bits::read_u64(payload, index))
}

fn expect_size(payload: &[u8], expected: usize) -> Result<(), WireError> {
    if payload.len() == expected {
        Ok(())
    } else {
        Err(WireError::PayloadSize {
            expected,
            actual: payload.len(),
        })
    }
}

/// Control and status registers of the crashing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Riscv64CsrStateV1 {
    /// Mode the registers belong to; selects `m`/`s`/`u` CSR names.
    pub mode: RiscvMode,
    /// `xstatus`.
    pub xstatus: u64,
    /// `xie`.
    pub xie: u64,
    /// `xip`.
    pub xip: u64,
    /// `xepc`.
    pub xepc: u64,
    /// `xtval`.
    pub xtval: u64,
    /// `xcause`.
    pub xcause: u64,
    /// `xscratch`.
    pub xscratch: u64,
}

impl Riscv64CsrStateV1 {
    /// Decode a version 1 payload with its header metadata.
    pub fn decode_v1(meta: u32, payload: &[u8]) -> Result<Self, WireError> {
        expect_size(payload, CSR_STATE_V1_PAYLOAD_SIZE)?;
        Ok(Self {
            mode: mode_from_meta(meta),
            xstatus: bits::read_u64(payload, 0),
            xie: bits::read_u64(payload, 1),
            xip: bits::read_u64(payload, 2),
            xepc: bits::read_u64(payload, 3),
            xtval: bits::read_u64(payload, 4),
            xcause: bits::read_u64(payload, 5),
            xscratch: bits::read_u64(payload, 6),
        })
    }

    /// Header metadata for this packet.
    #[must_use]
    pub fn meta(&self) -> u32 {
        u32::from(self.mode.raw())
    }

    /// Encoded payload.
    #[must_use]
    pub fn payload(&self) -> Vec<u8> {
        [
            self.xstatus,
            self.xie,
            self.xip,
            self.xepc,
            self.xtval,
            self.xcause,
            self.xscratch,
        ]
        .iter()
        .flat_map(|word| word.to_le_bytes())
        .collect()
    }

    /// Register names, without the mode prefix, paired with values in wire order.
    #[must_use]
    pub fn named(&self) -> [(&'static str, u64); 7] {
        [
            ("status", self.xstatus),
            ("ie", self.xie),
            ("ip", self.xip),
            ("epc", self.xepc),
            ("tval", self.xtval),
            ("cause", self.xcause),
            ("scratch", self.xscratch),
        ]
    }
}

/// General purpose registers `x1..x31` of the crashing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Riscv64GprStateV1 {
    /// Mode the registers belong to.
    pub mode: RiscvMode,
    /// `x1` through `x31`; `x0` is hardwired to zero and not recorded.
    pub gpr: [u64; 31],
}

impl Riscv64GprStateV1 {
    /// ABI names of `x1..x31`.
    pub const ABI_NAMES: [&'static str; 31] = [
        "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4", "a5",
        "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4",
        "t5", "t6",
    ];

    /// Decode a version 1 payload with its header metadata.
    pub fn decode_v1(meta: u32, payload: &[u8]) -> Result<Self, WireError> {
        expect_size(payload, GPR_STATE_V1_PAYLOAD_SIZE)?;
        let mut gpr = [0u64; 31];
        for (slot, value) in gpr.iter_mut().zip(words(payload)) {
            *slot = value;
        }
        Ok(Self {
            mode: mode_from_meta(meta),
            gpr,
        })
    }

    /// Header metadata for this packet.
    #[must_use]
    pub fn meta(&self) -> u32 {
        u32::from(self.mode.raw())
    }

    /// Encoded payload.
    #[must_use]
    pub fn payload(&self) -> Vec<u8> {
        self.gpr.iter().flat_map(|word| word.to_le_bytes()).collect()
    }
}

/// Kind of address trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TraceType {
    /// Call stack return addresses.
    Stack,
    /// NV-RISCV hardware branch trace buffer.
    Nvrvtb,
}

impl fmt::Display for TraceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stack => f.write_str("stack"),
            Self::Nvrvtb => f.write_str("NVRVTB"),
        }
    }
}

/// Address trace of the crashing context.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Riscv64TraceV1 {
    /// Mode the trace was captured in.
    pub mode: RiscvMode,
    /// Trace flavour.
    pub trace_type: TraceType,
    /// Addresses, most recent first.
    pub entries: Vec<u64>,
}

impl Riscv64TraceV1 {
    /// Decode a version 1 payload with its header metadata.
    pub fn decode_v1(meta: u32, payload: &[u8]) -> Result<Self, WireError> {
        let trace_type =
            match bits::get(u64::from(meta), META_TRACE_TYPE.0, META_TRACE_TYPE.1) {
                0 => TraceType::Stack,
                _ => TraceType::Nvrvtb,
            };
        Ok(Self {
            mode: mode_from_meta(meta),
            trace_type,
            entries: words(payload).collect(),
        })
    }

    /// Header metadata for this packet.
    #[must_use]
    pub fn meta(&self) -> u32 {
        let mut meta = bits::set(
            0,
            META_RISCV_MODE.0,
            META_RISCV_MODE.1,
            u64::from(self.mode.raw()),
        );
        meta = bits::set(
            meta,
            META_TRACE_TYPE.0,
            META_TRACE_TYPE.1,
            u64::from(self.trace_type == TraceType::Nvrvtb),
        );
        meta as u32
    }

    /// Encoded payload.
    #[must_use]
    pub fn payload(&self) -> Vec<u8> {
        self.entries
            .iter()
            .flat_map(|word| word.to_le_bytes())
            .collect()
    }
}

/// IO aperture an IO32 dump was read through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IoAperture {
    /// Not recorded.
    None,
    /// Core-internal IO space.
    IntIo,
    /// Core-external IO space.
    ExtIo,
    /// Value not assigned by the format.
    Reserved(u8),
}

impl IoAperture {
    /// Decode the 3-bit field.
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x7 {
            0 => Self::None,
            1 => Self::IntIo,
            2 => Self::ExtIo,
            other => Self::Reserved(other),
        }
    }

    /// Raw 3-bit encoding.
    #[must_use]
    pub fn raw(self) -> u8 {
        match self {
            Self::None => 0,
            Self::IntIo => 1,
            Self::ExtIo => 2,
            Self::Reserved(other) => other & 0x7,
        }
    }
}

impl fmt::Display for IoAperture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::IntIo => f.write_str("INTIO"),
            Self::ExtIo => f.write_str("EXTIO"),
            Self::Reserved(other) => write!(f, "reserved({other})"),
        }
    }
}

/// One 32-bit register sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Io32Entry {
    /// Register offset within the aperture.
    pub offset: u32,
    /// Value read.
    pub value: u32,
}

/// Dump of 32-bit IO registers.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Io32StateV1 {
    /// Aperture the registers were read through.
    pub aperture: IoAperture,
    /// Offset/value pairs in wire order.
    pub entries: Vec<Io32Entry>,
}

impl Io32StateV1 {
    /// Decode a version 1 payload with its header metadata.
    pub fn decode_v1(meta: u32, payload: &[u8]) -> Result<Self, WireError> {
        let aperture = IoAperture::from_bits(
            bits::get(u64::from(meta), META_IO_APERTURE.0, META_IO_APERTURE.1) as u8,
        );
        let entries = payload
            .chunks_exact(8)
            .map(|pair| Io32Entry {
                offset: bits::read_u32(pair, 0),
                value: bits::read_u32(pair, 4),
            })
            .collect();
        Ok(Self { aperture, entries })
    }

    /// Header metadata for this packet.
    #[must_use]
    pub fn meta(&self) -> u32 {
        u32::from(self.aperture.raw())
    }

    /// Encoded payload.
    #[must_use]
    pub fn payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.entries.len() * 8);
        for entry in &self.entries {
            out.extend_from_slice(&entry.offset.to_le_bytes());
            out.extend_from_slice(&entry.value.to_le_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_meta_carries_mode_and_type() {
        let trace = Riscv64TraceV1 {
            mode: RiscvMode::S,
            trace_type: TraceType::Nvrvtb,
            entries: alloc::vec![0x1000, 0x2000],
        };
        assert_eq!(trace.meta(), 0b1010);
        let decoded = Riscv64TraceV1::decode_v1(trace.meta(), &trace.payload()).unwrap();
        assert_eq!(decoded, trace);
    }

    #[test]
    fn io32_pairs_are_offset_then_value() {
        let payload = [0x10, 0, 0, 0, 0xEF, 0xBE, 0xAD, 0xDE];
        let state = Io32StateV1::decode_v1(2, &payload).unwrap();
        assert_eq!(state.aperture, IoAperture::ExtIo);
        assert_eq!(
            state.entries,
            alloc::vec![Io32Entry {
                offset: 0x10,
                value: 0xDEAD_BEEF
            }]
        );
    }

    #[test]
    fn fixed_size_packets_reject_other_sizes() {
        assert!(matches!(
            Riscv64CsrStateV1::decode_v1(1, &[0u8; 64]),
            Err(WireError::PayloadSize { expected: 56, actual: 64 })
        ));
        assert!(matches!(
            Riscv64GprStateV1::decode_v1(1, &[0u8; 256]),
            Err(WireError::PayloadSize { expected: 248, actual: 256 })
        ));
    }
}
