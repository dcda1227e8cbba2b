// CLASSIFICATION: COMMUNITY
// Filename: libos2.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! LIBOS 2.x reading of Report packets.

use crashcat_wire::{CauseType, ReporterData, SourceCause, TaskContext};

use super::generic::Interpretation;
use super::TaskId;

const TASK_ID_SHIFT: u32 = 24;
const PANIC_REASON_SHIFT: u32 = 8;

/// LIBOS panic reason codes, indexed by code.
pub(super) const PANIC_REASONS: [&str; 13] = [
    "UNSPECIFIED",
    "UNRECOVERABLE_TASK_CRASH",
    "UNHANDLED_STATE",
    "INVALID_CONFIGURATION",
    "FATAL_HARDWARE_ERROR",
    "INSUFFICIENT_RESOURCES",
    "TIMEOUT",
    "ENV_CALL_FAILED",
    "SSP_STACK_CHECK_FAILED",
    "ASAN_MEMORY_ERROR",
    "TEST",
    "PROGRAMMING_ERROR",
    "DEBUG_ASSERTION_FAILED",
];

/// Panic reason byte of a `PANIC` cause, looked up in `table`.
pub(super) fn panic_reason(table: &[&'static str], cause: SourceCause) -> Option<&'static str> {
    if cause.cause_type() != CauseType::Panic {
        return None;
    }
    let code = ((cause.raw() >> PANIC_REASON_SHIFT) & 0xFF) as usize;
    Some(table.get(code).copied().unwrap_or("UNKNOWN"))
}

/// `xtval` for exceptions, plain data otherwise.
pub(super) fn source_data_label(cause: SourceCause) -> &'static str {
    if cause.cause_type() == CauseType::Exception {
        "xtval"
    } else {
        "data"
    }
}

pub(super) struct Libos2;

impl Interpretation for Libos2 {
    fn name(&self) -> &'static str {
        "LIBOS2"
    }

    fn task_id(&self, ctx: TaskContext) -> Option<TaskId> {
        Some(TaskId::from_raw((ctx.raw() >> TASK_ID_SHIFT) as u8))
    }

    fn panic_reason(&self, cause: SourceCause) -> Option<&'static str> {
        panic_reason(&PANIC_REASONS, cause)
    }

    fn reporter_version(&self, data: ReporterData) -> String {
        format!("changelist {}", data.version())
    }

    fn source_data_label(&self, cause: SourceCause) -> &'static str {
        source_data_label(cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crashcat_wire::Containment;

    #[test]
    fn out_of_table_reason_is_unknown() {
        let cause = SourceCause::new(CauseType::Panic, Containment::Unspecified, 0x40);
        assert_eq!(Libos2.panic_reason(cause), Some("UNKNOWN"));
        let timeout = SourceCause::new(CauseType::Timeout, Containment::Unspecified, 0x01);
        assert_eq!(Libos2.panic_reason(timeout), None);
    }
}
