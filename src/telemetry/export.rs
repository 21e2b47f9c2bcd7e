//! CSV telemetry dumps and plain-text mission reports.
//!
//! Both are pure formatting; writing the payload somewhere is the caller's job.

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::dataset::Sample;

use super::event_log::LogEntry;
use super::metrics;
use super::state::SessionState;

pub const CSV_HEADER: &str = "time,truth_x,truth_y,pred_x,pred_y,noisy_x,noisy_y";
pub const CSV_FILE_NAME: &str = "fluxpoint_telemetry.csv";
pub const REPORT_FILE_NAME: &str = "fluxpoint_mission_report.txt";

/// Header plus one row per sample, in slice order. Missing noisy channels are left blank.
pub fn export_csv(slice: &[Sample]) -> String {
    let mut out = String::with_capacity(64 * (slice.len() + 1));
    out.push_str(CSV_HEADER);
    for sample in slice {
        out.push('\n');
        let _ = write!(
            out,
            "{},{},{},{},{},{},{}",
            sample.time,
            sample.truth_x,
            sample.truth_y,
            sample.pred_x,
            sample.pred_y,
            optional(sample.noisy_x),
            optional(sample.noisy_y),
        );
    }
    out.push('\n');
    out
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub struct ReportContext<'a> {
    pub unit_name: &'a str,
    pub session: &'a SessionState,
    pub buffer: &'a [Sample],
    /// Newest first, as held by the event log.
    pub log: &'a [LogEntry],
    pub generated_at: DateTime<Utc>,
}

pub fn export_report(ctx: &ReportContext<'_>) -> String {
    let session = ctx.session;
    let mut out = String::new();

    let _ = writeln!(out, "FLUXPOINT MISSION REPORT");
    let _ = writeln!(
        out,
        "UNIT: {} ({})",
        ctx.unit_name, session.selected_trajectory_id
    );
    if let Some(id) = &session.session_id {
        let _ = writeln!(out, "SESSION: {id}");
    }
    let _ = writeln!(out, "GENERATED: {}", ctx.generated_at.to_rfc3339());
    let _ = writeln!(out, "STATUS: {}", session.phase.as_str());
    let _ = writeln!(out, "SAMPLES BUFFERED: {}", ctx.buffer.len());
    let _ = writeln!(out, "RMSE: {:.3}", metrics::rmse(ctx.buffer));
    let _ = writeln!(out, "NOISE VARIANCE: {:.1}", session.noise_intensity);
    let _ = writeln!(out);
    let _ = writeln!(out, "EVENT LOG");
    for entry in ctx.log.iter().rev() {
        let _ = writeln!(
            out,
            "[{}] {:<6} {}",
            entry.time.format("%H:%M:%S"),
            entry.severity.as_str(),
            entry.message
        );
    }

    out
}
