// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Decode and encode the generic CrashCat packet header and dispatch packet payloads.
// Author: Lukas Bower

//! Generic packet header and packet-level dispatch.

use alloc::vec::Vec;

use crate::bits;
use crate::report::ReportV1;
use crate::state::{Io32StateV1, Riscv64CsrStateV1, Riscv64GprStateV1, Riscv64TraceV1};
use crate::types::{MemUnitSize, WireError, SIGNATURE};

/// Size of the generic packet header in bytes.
pub const PACKET_HEADER_SIZE: usize = 8;

/// Highest packet format version understood by this crate.
pub const MAX_FORMAT_VERSION: u8 = 1;

const HEADER_SIGNATURE: (u32, u32) = (15, 0);
const HEADER_FORMAT_VERSION: (u32, u32) = (19, 16);
const HEADER_PAYLOAD_UNIT_SIZE: (u32, u32) = (21, 20);
const HEADER_PAYLOAD_SIZE: (u32, u32) = (31, 22);
const HEADER_V1_TYPE: (u32, u32) = (39, 32);
const HEADER_V1_META: (u32, u32) = (63, 40);

const MAX_PAYLOAD_UNITS: u64 = 1 << 10;

/// Packet format versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    /// Format version 1: 8-bit type and 24-bit metadata in the upper header word.
    V1,
}

impl TryFrom<u8> for FormatVersion {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::V1),
            other => Err(WireError::UnsupportedVersion(other)),
        }
    }
}

/// Packet types defined by format version 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum PacketType {
    /// Start of a crash report.
    Report = 0x00,
    /// RISC-V control and status registers of the crashing context.
    Riscv64CsrState = 0x01,
    /// RISC-V general purpose registers of the crashing context.
    Riscv64GprState = 0x02,
    /// 32-bit IO register offset/value pairs.
    Io32State = 0x03,
    /// RISC-V address trace.
    Riscv64Trace = 0x04,
}

impl TryFrom<u8> for PacketType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x00 => Self::Report,
            0x01 => Self::Riscv64CsrState,
            0x02 => Self::Riscv64GprState,
            0x03 => Self::Io32State,
            0x04 => Self::Riscv64Trace,
            other => return Err(WireError::UnknownPacketType(other)),
        })
    }
}

/// Validated generic packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    raw: u64,
    version: FormatVersion,
    payload_size: usize,
}

impl PacketHeader {
    /// Validate a raw header word: signature, version in `1..=MAX_FORMAT_VERSION`
    /// and a nonzero payload size.
    pub fn from_raw(raw: u64) -> Result<Self, WireError> {
        let signature = bits::get(raw, HEADER_SIGNATURE.0, HEADER_SIGNATURE.1) as u16;
        if signature != SIGNATURE {
            return Err(WireError::BadSignature(signature));
        }
        let version = FormatVersion::try_from(
            bits::get(raw, HEADER_FORMAT_VERSION.0, HEADER_FORMAT_VERSION.1) as u8,
        )?;
        let unit = MemUnitSize::from_bits(
            bits::get(raw, HEADER_PAYLOAD_UNIT_SIZE.0, HEADER_PAYLOAD_UNIT_SIZE.1) as u8,
        );
        let units = bits::get(raw, HEADER_PAYLOAD_SIZE.0, HEADER_PAYLOAD_SIZE.1) + 1;
        let payload_size =
            usize::try_from(units << unit.shift()).map_err(|_| WireError::Unrepresentable)?;
        if payload_size == 0 {
            return Err(WireError::ZeroPayload);
        }
        Ok(Self {
            raw,
            version,
            payload_size,
        })
    }

    /// Read and validate the header at the start of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < PACKET_HEADER_SIZE {
            return Err(WireError::Truncated {
                needed: PACKET_HEADER_SIZE,
                available: bytes.len(),
            });
        }
        Self::from_raw(bits::read_u64(bytes, 0))
    }

    /// Raw header word.
    #[must_use]
    pub fn raw(&self) -> u64 {
        self.raw
    }

    /// Format version.
    #[must_use]
    pub fn version(&self) -> FormatVersion {
        self.version
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    /// Header plus payload size in bytes.
    #[must_use]
    pub fn packet_size(&self) -> usize {
        PACKET_HEADER_SIZE + self.payload_size
    }

    /// Format-specific view of the type-specific half of the header.
    #[must_use]
    pub fn v1(&self) -> PacketHeaderV1 {
        match self.version {
            FormatVersion::V1 => PacketHeaderV1 {
                ty: bits::get(self.raw, HEADER_V1_TYPE.0, HEADER_V1_TYPE.1) as u8,
                meta: bits::get(self.raw, HEADER_V1_META.0, HEADER_V1_META.1) as u32,
            },
        }
    }
}

/// Format version 1 type-specific header bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeaderV1 {
    ty: u8,
    meta: u32,
}

impl PacketHeaderV1 {
    /// Build a version 1 header for `ty` with 24 bits of metadata.
    #[must_use]
    pub fn new(ty: PacketType, meta: u32) -> Self {
        Self {
            ty: ty as u8,
            meta: meta & 0x00FF_FFFF,
        }
    }

    /// Raw 8-bit type field.
    #[must_use]
    pub fn raw_type(&self) -> u8 {
        self.ty
    }

    /// Decoded packet type.
    pub fn packet_type(&self) -> Result<PacketType, WireError> {
        PacketType::try_from(self.ty)
    }

    /// 24-bit type-specific metadata.
    #[must_use]
    pub fn meta(&self) -> u32 {
        self.meta
    }

    /// Encode a full header word for a payload of `payload_size` bytes.
    pub fn encode(&self, payload_size: usize) -> Result<u64, WireError> {
        let (unit, units) = MemUnitSize::smallest_for(payload_size as u64, MAX_PAYLOAD_UNITS)
            .ok_or(WireError::Unrepresentable)?;
        let mut raw = bits::set(0, HEADER_SIGNATURE.0, HEADER_SIGNATURE.1, u64::from(SIGNATURE));
        raw = bits::set(raw, HEADER_FORMAT_VERSION.0, HEADER_FORMAT_VERSION.1, 1);
        raw = bits::set(
            raw,
            HEADER_PAYLOAD_UNIT_SIZE.0,
            HEADER_PAYLOAD_UNIT_SIZE.1,
            unit as u64,
        );
        raw = bits::set(raw, HEADER_PAYLOAD_SIZE.0, HEADER_PAYLOAD_SIZE.1, units - 1);
        raw = bits::set(raw, HEADER_V1_TYPE.0, HEADER_V1_TYPE.1, u64::from(self.ty));
        Ok(bits::set(
            raw,
            HEADER_V1_META.0,
            HEADER_V1_META.1,
            u64::from(self.meta),
        ))
    }
}

/// A decoded CrashCat packet.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Packet {
    /// Report packet starting a crash report.
    Report(ReportV1),
    /// RISC-V CSR dump.
    Riscv64CsrState(Riscv64CsrStateV1),
    /// RISC-V GPR dump.
    Riscv64GprState(Riscv64GprStateV1),
    /// RISC-V address trace.
    Riscv64Trace(Riscv64TraceV1),
    /// IO32 register dump.
    Io32State(Io32StateV1),
}

impl Packet {
    /// Type of this packet.
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Report(_) => PacketType::Report,
            Self::Riscv64CsrState(_) => PacketType::Riscv64CsrState,
            Self::Riscv64GprState(_) => PacketType::Riscv64GprState,
            Self::Riscv64Trace(_) => PacketType::Riscv64Trace,
            Self::Io32State(_) => PacketType::Io32State,
        }
    }

    /// Encode the packet, header included, into its wire representation.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let (meta, payload) = match self {
            Self::Report(report) => (0, report.payload()),
            Self::Riscv64CsrState(state) => (state.meta(), state.payload()),
            Self::Riscv64GprState(state) => (state.meta(), state.payload()),
            Self::Riscv64Trace(trace) => (trace.meta(), trace.payload()),
            Self::Io32State(state) => (state.meta(), state.payload()),
        };
        let header = PacketHeaderV1::new(self.packet_type(), meta).encode(payload.len())?;
        let mut out = Vec::with_capacity(PACKET_HEADER_SIZE + payload.len());
        out.extend_from_slice(&header.to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }
}

/// Decode the packet at the start of `bytes`, returning it together with the
/// number of bytes it occupies (header plus payload).
pub fn decode_packet(bytes: &[u8]) -> Result<(Packet, usize), WireError> {
    let header = PacketHeader::decode(bytes)?;
    let size = header.packet_size();
    if bytes.len() < size {
        return Err(WireError::Truncated {
            needed: size,
            available: bytes.len(),
        });
    }
    let payload = &bytes[PACKET_HEADER_SIZE..size];
    let packet = match header.version() {
        FormatVersion::V1 => {
            let v1 = header.v1();
            match v1.packet_type()? {
                PacketType::Report => Packet::Report(ReportV1::decode_payload(payload)?),
                PacketType::Riscv64CsrState => {
                    Packet::Riscv64CsrState(Riscv64CsrStateV1::decode_v1(v1.meta(), payload)?)
                }
                PacketType::Riscv64GprState => {
                    Packet::Riscv64GprState(Riscv64GprStateV1::decode_v1(v1.meta(), payload)?)
                }
                PacketType::Riscv64Trace => {
                    Packet::Riscv64Trace(Riscv64TraceV1::decode_v1(v1.meta(), payload)?)
                }
                PacketType::Io32State => {
                    Packet::Io32State(Io32StateV1::decode_v1(v1.meta(), payload)?)
                }
            }
        }
    };
    Ok((packet, size))
}
