// Author: Lukas Bower
// Purpose: Provide CrashCat wire layouts and codec primitives for host and firmware-side tooling.
#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![no_std]

//! CrashCat wire layouts shared by the host consumer and by producer-side
//! tooling.
//!
//! Everything here is bit-exact: the two-level wayfinder registers that let a
//! consumer discover the crash queue, the generic 64-bit packet header, the
//! Report v1 packet and the auxiliary RISC-V / IO32 state packets that may
//! follow it. Decoding never allocates for fixed-size packets; variable-length
//! packets collect into `alloc` vectors.

extern crate alloc;

#[cfg(test)]
extern crate std;

mod bits;
mod packet;
mod report;
mod state;
mod types;
mod wayfinder;

pub use packet::{
    decode_packet, FormatVersion, Packet, PacketHeader, PacketHeaderV1, PacketType,
    MAX_FORMAT_VERSION, PACKET_HEADER_SIZE,
};
pub use report::{
    CauseType, Containment, ReportV1, ReporterData, SourceCause, TaskContext,
    IMPLEMENTER_SIGNATURE_LIBOS2, IMPLEMENTER_SIGNATURE_LIBOS3, REPORT_V1_PAYLOAD_SIZE,
};
pub use state::{
    Io32Entry, Io32StateV1, IoAperture, Riscv64CsrStateV1, Riscv64GprStateV1, Riscv64TraceV1,
    TraceType, CSR_STATE_V1_PAYLOAD_SIZE, GPR_STATE_V1_PAYLOAD_SIZE,
};
pub use types::*;
pub use wayfinder::{
    QueueLocation, WayfinderL0, WayfinderL1V1, WayfinderVersion, MAX_WAYFINDER_VERSION,
};
