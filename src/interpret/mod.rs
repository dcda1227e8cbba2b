// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Implementer-specific reading of Report packets.
//!
//! Every implementer shares the Report v1 byte layout. The 64-bit implementer
//! signature only selects how the implementation-defined bits of the
//! reporter/source ids and the cause are rendered. Unknown signatures fall
//! back to the generic reading, which uses base-format fields only.

mod generic;
mod libos2;
mod libos3;

use core::fmt;

use crashcat_wire::{
    ReportV1, ReporterData, SourceCause, TaskContext, IMPLEMENTER_SIGNATURE_LIBOS2,
    IMPLEMENTER_SIGNATURE_LIBOS3,
};
use serde::{Deserialize, Serialize};

pub use generic::Interpretation;

/// Task id value LIBOS uses for its kernel.
pub const KERNEL_TASK_ID: u8 = 0xFF;

/// Firmware stack that produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Implementer {
    /// Unrecognized signature, base-format fields only.
    Generic,
    /// LIBOS 2.x.
    Libos2,
    /// LIBOS 3.x.
    Libos3,
}

impl Implementer {
    /// Select the interpreter for an implementer signature.
    #[must_use]
    pub fn from_signature(signature: u64) -> Self {
        match signature {
            IMPLEMENTER_SIGNATURE_LIBOS2 => Self::Libos2,
            IMPLEMENTER_SIGNATURE_LIBOS3 => Self::Libos3,
            _ => Self::Generic,
        }
    }

    fn interpretation(self) -> &'static dyn Interpretation {
        match self {
            Self::Generic => &generic::Generic,
            Self::Libos2 => &libos2::Libos2,
            Self::Libos3 => &libos3::Libos3,
        }
    }

    /// Short display name.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.interpretation().name()
    }

    /// Task that reported or caused the crash, if the implementer records one.
    #[must_use]
    pub fn task_id(self, ctx: TaskContext) -> Option<TaskId> {
        self.interpretation().task_id(ctx)
    }

    /// Panic reason name for a `PANIC` cause.
    #[must_use]
    pub fn panic_reason(self, cause: SourceCause) -> Option<&'static str> {
        self.interpretation().panic_reason(cause)
    }

    /// Reporter version rendered the way the implementer numbers releases.
    #[must_use]
    pub fn reporter_version(self, data: ReporterData) -> String {
        self.interpretation().reporter_version(data)
    }

    /// Label for the `source_data` field under `cause`.
    #[must_use]
    pub fn source_data_label(self, cause: SourceCause) -> &'static str {
        self.interpretation().source_data_label(cause)
    }

    /// One line per Report field.
    #[must_use]
    pub fn describe(self, report: &ReportV1) -> Vec<String> {
        generic::describe(self.interpretation(), report)
    }
}

impl fmt::Display for Implementer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Task id decoded from an implementer-defined id field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskId {
    /// The kernel itself.
    Kernel,
    /// A user task.
    Task(u8),
}

impl TaskId {
    pub(crate) fn from_raw(raw: u8) -> Self {
        if raw == KERNEL_TASK_ID {
            Self::Kernel
        } else {
            Self::Task(raw)
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kernel => f.write_str("kernel"),
            Self::Task(id) => write!(f, "{id}"),
        }
    }
}
