// CLASSIFICATION: COMMUNITY
// Filename: generic.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Base-format reading shared by every implementer.

use core::fmt::Write;

use crashcat_wire::{ReportV1, ReporterData, SourceCause, TaskContext};

use super::TaskId;

/// Hooks an implementer overrides to read its implementation-defined bits.
/// The defaults are the generic reading.
pub trait Interpretation: Sync {
    /// Short display name.
    fn name(&self) -> &'static str;

    /// Task id carried in a reporter/source id.
    fn task_id(&self, _ctx: TaskContext) -> Option<TaskId> {
        None
    }

    /// Name of the panic reason in a `PANIC` cause.
    fn panic_reason(&self, _cause: SourceCause) -> Option<&'static str> {
        None
    }

    /// Reporter version as text.
    fn reporter_version(&self, data: ReporterData) -> String {
        format!("{:#010x}", data.version())
    }

    /// Label for `source_data`.
    fn source_data_label(&self, _cause: SourceCause) -> &'static str {
        "data"
    }
}

pub(super) struct Generic;

impl Interpretation for Generic {
    fn name(&self) -> &'static str {
        "generic"
    }
}

fn context_line(interp: &dyn Interpretation, label: &str, ctx: TaskContext) -> String {
    let mut line = format!(
        "{label}: partition {:#04x} ucode {} {}",
        ctx.partition(),
        ctx.ucode_id(),
        ctx.riscv_mode()
    );
    match interp.task_id(ctx) {
        Some(task) => {
            let _ = write!(line, " task {task}");
        }
        None if ctx.impl_def() != 0 => {
            let _ = write!(line, " impl-def {:#x}", ctx.impl_def());
        }
        None => {}
    }
    line
}

/// Render `report` one field per line. The first line is the summary.
pub(super) fn describe(interp: &dyn Interpretation, report: &ReportV1) -> Vec<String> {
    let cause = report.source_cause;
    let mut lines = Vec::with_capacity(8);
    lines.push(format!(
        "{} crash report: {} (containment: {})",
        interp.name(),
        cause.cause_type(),
        cause.containment()
    ));
    lines.push(context_line(interp, "reporter", report.reporter_id));
    lines.push(format!(
        "reporter version {} timestamp {}",
        interp.reporter_version(report.reporter_data),
        report.reporter_data.timestamp()
    ));
    lines.push(context_line(interp, "source", report.source_id));
    lines.push(format!("pc {:#018x}", report.source_pc));
    lines.push(format!(
        "{} {:#018x}",
        interp.source_data_label(cause),
        report.source_data
    ));
    match interp.panic_reason(cause) {
        Some(reason) => lines.push(format!("panic reason {reason}")),
        None if cause.impl_def() != 0 => {
            lines.push(format!("cause impl-def {:#x}", cause.impl_def()));
        }
        None => {}
    }
    lines
}
