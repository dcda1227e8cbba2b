// CLASSIFICATION: COMMUNITY
// Filename: libos3.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! LIBOS 3.x reading of Report packets. Task ids moved up a byte and the
//! reporter version is a packed `major.minor.patch`; panic reason codes are
//! unchanged from LIBOS 2.

use crashcat_wire::{ReporterData, SourceCause, TaskContext};

use super::generic::Interpretation;
use super::libos2;
use super::TaskId;

const TASK_ID_SHIFT: u32 = 32;

pub(super) struct Libos3;

impl Interpretation for Libos3 {
    fn name(&self) -> &'static str {
        "LIBOS3"
    }

    fn task_id(&self, ctx: TaskContext) -> Option<TaskId> {
        Some(TaskId::from_raw((ctx.raw() >> TASK_ID_SHIFT) as u8))
    }

    fn panic_reason(&self, cause: SourceCause) -> Option<&'static str> {
        libos2::panic_reason(&libos2::PANIC_REASONS, cause)
    }

    fn reporter_version(&self, data: ReporterData) -> String {
        let version = data.version();
        format!(
            "{}.{}.{}",
            version >> 24,
            (version >> 16) & 0xFF,
            version & 0xFFFF
        )
    }

    fn source_data_label(&self, cause: SourceCause) -> &'static str {
        libos2::source_data_label(cause)
    }
}
