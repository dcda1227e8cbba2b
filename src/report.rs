// CLASSIFICATION: COMMUNITY
// Filename: report.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Crash reports assembled from queue packets.
//!
//! A report starts with a Report packet. Auxiliary state packets that follow
//! it, up to the next Report or the end of the readable bytes, belong to the
//! same report.

use core::fmt::Write;

use crashcat_wire::{
    Io32StateV1, Packet, ReportV1, Riscv64CsrStateV1, Riscv64GprStateV1, Riscv64TraceV1,
    WireError,
};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::decoder::PacketDecoder;
use crate::engine::{CrashCatEngine, LOG_TARGET};
use crate::error::CrashCatResult;
use crate::interpret::{Implementer, TaskId};

const GPRS_PER_LINE: usize = 4;

/// One decoded crash report with its auxiliary state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashReport {
    /// Interpreter selected by the implementer signature.
    pub implementer: Implementer,
    /// Raw report fields.
    pub report: ReportV1,
    /// CSR snapshots.
    #[serde(default)]
    pub csr_states: Vec<Riscv64CsrStateV1>,
    /// General purpose register snapshots.
    #[serde(default)]
    pub gpr_states: Vec<Riscv64GprStateV1>,
    /// Stack and trace buffer captures.
    #[serde(default)]
    pub traces: Vec<Riscv64TraceV1>,
    /// IO register captures.
    #[serde(default)]
    pub io32_states: Vec<Io32StateV1>,
}

impl CrashReport {
    /// Report without auxiliary state.
    #[must_use]
    pub fn new(report: ReportV1) -> Self {
        Self {
            implementer: Implementer::from_signature(report.implementer_signature),
            report,
            csr_states: Vec::new(),
            gpr_states: Vec::new(),
            traces: Vec::new(),
            io32_states: Vec::new(),
        }
    }

    /// Decode one report from the start of `bytes`, returning it with the
    /// number of bytes it spans.
    ///
    /// A malformed packet after the Report ends the report; its bytes are
    /// left for the caller to skip.
    ///
    /// The producer must publish a Report and all of its auxiliary packets
    /// with one `put` update. Packets that arrive after `put` already moved
    /// past their Report start the next call, which fails with
    /// [`WireError::UnexpectedPacket`], and the queue skips them.
    pub fn decode(bytes: &[u8]) -> CrashCatResult<(Self, usize)> {
        let (first, mut used) = PacketDecoder::decode(bytes)?;
        let Packet::Report(report) = first else {
            return Err(WireError::UnexpectedPacket(first.packet_type()).into());
        };
        let mut out = Self::new(report);
        while used < bytes.len() {
            match PacketDecoder::decode(&bytes[used..]) {
                Ok((Packet::Report(_), _)) => break,
                Ok((packet, size)) => {
                    out.attach(packet);
                    used += size;
                }
                Err(err) => {
                    warn!(
                        target: LOG_TARGET,
                        "ending crash report at byte {used}: {err}"
                    );
                    break;
                }
            }
        }
        Ok((out, used))
    }

    /// Add an auxiliary packet. Report packets are ignored.
    pub fn attach(&mut self, packet: Packet) {
        match packet {
            Packet::Report(_) => {}
            Packet::Riscv64CsrState(csr) => self.csr_states.push(csr),
            Packet::Riscv64GprState(gpr) => self.gpr_states.push(gpr),
            Packet::Riscv64Trace(trace) => self.traces.push(trace),
            Packet::Io32State(io) => self.io32_states.push(io),
        }
    }

    /// Task that reported the crash, if the implementer records one.
    #[must_use]
    pub fn reporter_task(&self) -> Option<TaskId> {
        self.implementer.task_id(self.report.reporter_id)
    }

    /// Task that caused the crash, if the implementer records one.
    #[must_use]
    pub fn source_task(&self) -> Option<TaskId> {
        self.implementer.task_id(self.report.source_id)
    }

    /// Every packet of the report in wire order: the Report, then CSR, GPR,
    /// trace and IO captures.
    #[must_use]
    pub fn packets(&self) -> Vec<Packet> {
        let mut packets = vec![Packet::Report(self.report)];
        packets.extend(self.csr_states.iter().copied().map(Packet::Riscv64CsrState));
        packets.extend(self.gpr_states.iter().copied().map(Packet::Riscv64GprState));
        packets.extend(self.traces.iter().cloned().map(Packet::Riscv64Trace));
        packets.extend(self.io32_states.iter().cloned().map(Packet::Io32State));
        packets
    }

    /// Human-readable rendering, one field per line.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        let mut lines = self.implementer.describe(&self.report);
        for csr in &self.csr_states {
            let prefix = csr.mode.csr_prefix();
            for (name, value) in csr.named() {
                lines.push(format!("{prefix}{name} {value:#018x}"));
            }
        }
        for gpr in &self.gpr_states {
            let named: Vec<_> = Riscv64GprStateV1::ABI_NAMES.iter().zip(gpr.gpr).collect();
            for chunk in named.chunks(GPRS_PER_LINE) {
                let mut line = String::new();
                for (name, value) in chunk {
                    if !line.is_empty() {
                        line.push(' ');
                    }
                    let _ = write!(line, "{name} {value:#018x}");
                }
                lines.push(line);
            }
        }
        for trace in &self.traces {
            lines.push(format!(
                "{} trace ({}), {} entries",
                trace.trace_type,
                trace.mode,
                trace.entries.len()
            ));
            for (index, addr) in trace.entries.iter().enumerate() {
                lines.push(format!("#{index} {addr:#018x}"));
            }
        }
        for io in &self.io32_states {
            for entry in &io.entries {
                lines.push(format!(
                    "{} {:#010x} = {:#010x}",
                    io.aperture, entry.offset, entry.value
                ));
            }
        }
        lines
    }

    /// Emit the rendering through the engine's logging sink.
    pub fn log<E: CrashCatEngine + ?Sized>(&self, engine: &E) {
        for (index, line) in self.lines().iter().enumerate() {
            engine.printf(index == 0, format_args!("{line}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrashCatError;
    use crashcat_wire::{
        CauseType, Containment, Io32Entry, IoAperture, PacketHeaderV1, PacketType, ReporterData,
        RiscvMode, SourceCause, TaskContext, TraceType, IMPLEMENTER_SIGNATURE_LIBOS2,
    };

    fn sample() -> CrashReport {
        let mut report = CrashReport::new(ReportV1 {
            implementer_signature: IMPLEMENTER_SIGNATURE_LIBOS2,
            reporter_id: TaskContext::new(0, 1, RiscvMode::M, 0),
            reporter_data: ReporterData::new(4242, 9),
            source_id: TaskContext::new(0, 1, RiscvMode::U, 0x0700_0000 >> 19),
            source_cause: SourceCause::new(CauseType::Exception, Containment::RiscvHart, 0),
            source_pc: 0x1000,
            source_data: 0x2000,
        });
        report.attach(Packet::Riscv64CsrState(Riscv64CsrStateV1 {
            mode: RiscvMode::M,
            xstatus: 1,
            xie: 2,
            xip: 3,
            xepc: 0x1000,
            xtval: 0x2000,
            xcause: 5,
            xscratch: 0,
        }));
        report.attach(Packet::Riscv64Trace(Riscv64TraceV1 {
            mode: RiscvMode::M,
            trace_type: TraceType::Stack,
            entries: vec![0x1000, 0x1100],
        }));
        report.attach(Packet::Io32State(Io32StateV1 {
            aperture: IoAperture::ExtIo,
            entries: vec![Io32Entry {
                offset: 0x40,
                value: 0xCAFE,
            }],
        }));
        report
    }

    fn encode(report: &CrashReport) -> Vec<u8> {
        report
            .packets()
            .iter()
            .flat_map(|packet| packet.encode().unwrap())
            .collect()
    }

    #[test]
    fn groups_aux_packets_until_next_report() {
        let first = sample();
        let second = CrashReport::new(ReportV1::default());
        let mut bytes = encode(&first);
        let first_len = bytes.len();
        bytes.extend(encode(&second));

        let (decoded, used) = CrashReport::decode(&bytes).unwrap();
        assert_eq!(decoded, first);
        assert_eq!(used, first_len);
        let (decoded, used) = CrashReport::decode(&bytes[first_len..]).unwrap();
        assert_eq!(decoded, second);
        assert_eq!(used, bytes.len() - first_len);
    }

    #[test]
    fn stream_must_start_with_report() {
        let io = Packet::Io32State(Io32StateV1 {
            aperture: IoAperture::None,
            entries: vec![Io32Entry {
                offset: 0,
                value: 0,
            }],
        });
        let bytes = io.encode().unwrap();
        assert!(matches!(
            CrashReport::decode(&bytes),
            Err(CrashCatError::InvalidData(WireError::UnexpectedPacket(
                PacketType::Io32State
            )))
        ));
    }

    #[test]
    fn malformed_trailer_ends_report() {
        let report = CrashReport::new(ReportV1::default());
        let mut bytes = encode(&report);
        let report_len = bytes.len();
        let bogus = PacketHeaderV1::new(PacketType::Riscv64GprState, 0)
            .encode(8)
            .unwrap();
        bytes.extend_from_slice(&bogus.to_le_bytes());
        bytes.extend_from_slice(&[0; 8]);
        let (decoded, used) = CrashReport::decode(&bytes).unwrap();
        assert_eq!(decoded, report);
        assert_eq!(used, report_len);
    }

    #[test]
    fn lines_render_libos_fields() {
        let lines = sample().lines();
        assert!(lines[0].starts_with("LIBOS2 crash report: EXCEPTION"));
        assert!(lines.iter().any(|l| l == "reporter version changelist 4242 timestamp 9"));
        assert!(lines.iter().any(|l| l.ends_with("task 7")));
        assert!(lines.iter().any(|l| l == "xtval 0x0000000000002000"));
        assert!(lines.iter().any(|l| l == "mepc 0x0000000000001000"));
        assert!(lines.iter().any(|l| l == "#1 0x0000000000001100"));
        assert!(lines.iter().any(|l| l.contains("= 0x0000cafe")));
    }

    #[test]
    fn serializes_to_json() {
        let report = sample();
        let json = serde_json::to_string(&report).unwrap();
        let back: CrashReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
