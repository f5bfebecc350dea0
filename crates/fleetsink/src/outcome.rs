// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-destination outcome logging.
//!
//! Every terminal state of a matched message produces exactly one
//! timestamped line in the destination's log file. The log is append-only
//! and flushed per line so a crash loses at most the line being written.

use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug)]
enum LogSink {
    File(LineWriter<File>),
    Stderr(io::Stderr),
}

/// Append-only outcome log for one destination.
///
/// Write failures are reported via tracing and swallowed; outcome logging
/// never fails the message pipeline.
#[derive(Debug)]
pub struct OutcomeLog {
    sink: Mutex<LogSink>,
}

impl OutcomeLog {
    /// Open the log file in append mode, creating parent directories as
    /// needed.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            sink: Mutex::new(LogSink::File(LineWriter::new(file))),
        })
    }

    /// Stderr-backed log, used when no file is available.
    pub fn stderr() -> Self {
        Self {
            sink: Mutex::new(LogSink::Stderr(io::stderr())),
        }
    }

    /// Open `path`, falling back to stderr with a warning when the file
    /// cannot be opened.
    pub fn open_or_stderr(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::open(path) {
            Ok(log) => log,
            Err(e) => {
                tracing::warn!(
                    "Cannot open outcome log {}: {}; falling back to stderr",
                    path.display(),
                    e
                );
                Self::stderr()
            }
        }
    }

    /// Append one timestamped line.
    pub fn append(&self, message: &str) {
        let stamp = Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let mut sink = match self.sink.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let result = match &mut *sink {
            LogSink::File(w) => writeln!(w, "{} {}", stamp, message),
            LogSink::Stderr(h) => writeln!(h, "{} {}", stamp, message),
        };

        if let Err(e) = result {
            tracing::warn!("Outcome log write failed: {}", e);
        }
    }

    /// Flush buffered content to the underlying sink.
    pub fn flush(&self) {
        let mut sink = match self.sink.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let result = match &mut *sink {
            LogSink::File(w) => w.flush(),
            LogSink::Stderr(h) => h.flush(),
        };

        if let Err(e) = result {
            tracing::warn!("Outcome log flush failed: {}", e);
        }
    }
}
