// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eggbot project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! CSV telemetry sink
//!
//! Mirrors controller snapshots into a CSV file under the logs directory.
//! Rows are flushed as they are written so a power cut loses at most one
//! interval; individual row failures are logged without stopping the sink.

use chrono::{DateTime, SecondsFormat, Utc};
use log::{error, info};
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::control::controller::ControllerState;
use crate::control::error::{ControlError, ControlResult};
use crate::utility::is_safe_filename;

/// Accepted CSV logging interval bounds in seconds.
const MIN_INTERVAL_SECONDS: f64 = 1.0;
const MAX_INTERVAL_SECONDS: f64 = 300.0;

/// Fixed column set, written as the header row.
pub const CSV_HEADER: [&str; 13] = [
    "time_since_start_seconds",
    "timestamp",
    "pit_temp_c",
    "meat_temp_1_c",
    "meat_temp_2_c",
    "ambient_temp_c",
    "setpoint_c",
    "meat_setpoint_c",
    "damper_percent",
    "pid_output",
    "pid_error",
    "control_mode",
    "safety_shutdown",
];

/// Status snapshot of the CSV sink.
#[derive(Debug, Clone, Serialize)]
pub struct CsvLoggingStatus {
    pub enabled: bool,
    pub file_path: Option<String>,
    pub interval_seconds: f64,
    pub duration_seconds: f64,
    pub start_time: Option<String>,
}

impl CsvLoggingStatus {
    /// Status reported while no sink is running.
    pub fn idle() -> Self {
        Self {
            enabled: false,
            file_path: None,
            interval_seconds: 0.0,
            duration_seconds: 0.0,
            start_time: None,
        }
    }
}

/// An open CSV telemetry file.
pub struct CsvLogger {
    writer: csv::Writer<File>,
    path: PathBuf,
    interval_seconds: f64,
    started: Instant,
    started_at: DateTime<Utc>,
    last_row: Option<Instant>,
}

impl CsvLogger {
    /// Validate the file name, create the file under `logs_dir`, and write
    /// the header row.
    pub fn create(logs_dir: &Path, filename: &str, interval_seconds: f64) -> ControlResult<Self> {
        if !is_safe_filename(filename) {
            return Err(ControlError::OutOfRange(format!(
                "CSV filename {filename:?} must match ^[A-Za-z0-9_\\-\\.]+$"
            )));
        }
        if !(MIN_INTERVAL_SECONDS..=MAX_INTERVAL_SECONDS).contains(&interval_seconds) {
            return Err(ControlError::OutOfRange(format!(
                "CSV interval {interval_seconds} s outside [{MIN_INTERVAL_SECONDS}, {MAX_INTERVAL_SECONDS}] s"
            )));
        }

        let mut filename = filename.to_string();
        if !filename.ends_with(".csv") {
            filename.push_str(".csv");
        }

        fs::create_dir_all(logs_dir).map_err(|e| {
            ControlError::StateConflict(format!("Failed to create logs directory: {e}"))
        })?;
        let path = logs_dir.join(filename);

        let file = File::create(&path).map_err(|e| {
            ControlError::StateConflict(format!("Failed to start CSV logging: {e}"))
        })?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(CSV_HEADER).map_err(|e| {
            ControlError::StateConflict(format!("Failed to write CSV header: {e}"))
        })?;
        writer.flush().map_err(|e| {
            ControlError::StateConflict(format!("Failed to flush CSV header: {e}"))
        })?;

        info!(
            "CSV logging started: {} (interval: {} s)",
            path.display(),
            interval_seconds
        );

        Ok(Self {
            writer,
            path,
            interval_seconds,
            started: Instant::now(),
            started_at: Utc::now(),
            last_row: None,
        })
    }

    /// Whether the logging interval has elapsed since the last row.
    pub fn should_log(&self) -> bool {
        match self.last_row {
            None => true,
            Some(last) => last.elapsed().as_secs_f64() >= self.interval_seconds,
        }
    }

    /// Append one snapshot row and flush. Row errors are logged; the sink
    /// keeps running.
    pub fn log_row(&mut self, state: &ControllerState) {
        self.last_row = Some(Instant::now());

        let optional = |value: Option<f64>| value.map(|v| format!("{v:.2}")).unwrap_or_default();
        let row = [
            format!("{:.1}", self.started.elapsed().as_secs_f64()),
            state.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            optional(state.pit_temp_c),
            optional(state.meat_temp_1_c),
            optional(state.meat_temp_2_c),
            optional(state.ambient_temp_c),
            format!("{:.2}", state.setpoint_c),
            optional(state.meat_setpoint_c),
            format!("{:.1}", state.damper_percent),
            format!("{:.1}", state.pid_output),
            format!("{:.2}", state.pid_error),
            state.control_mode.as_str().to_string(),
            state.safety_shutdown.to_string(),
        ];

        if let Err(err) = self
            .writer
            .write_record(&row)
            .and_then(|_| self.writer.flush().map_err(csv::Error::from))
        {
            error!("Error writing to CSV: {}", err);
        }
    }

    /// Status snapshot.
    pub fn status(&self) -> CsvLoggingStatus {
        CsvLoggingStatus {
            enabled: true,
            file_path: Some(self.path.display().to_string()),
            interval_seconds: self.interval_seconds,
            duration_seconds: self.started.elapsed().as_secs_f64(),
            start_time: Some(self.started_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    }

    /// Path of the file being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close, returning the file path.
    pub fn finish(mut self) -> PathBuf {
        if let Err(err) = self.writer.flush() {
            error!("Error flushing CSV on close: {}", err);
        }
        info!("CSV logging stopped: {}", self.path.display());
        self.path
    }
}
