//! Per-run session log: newline-delimited JSON staged locally, flushed to
//! the blob store at the end of a publishing run.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, error};

use crate::store::BlobStore;

pub struct SessionLog {
    path: PathBuf,
    file: std::fs::File,
    started: DateTime<Utc>,
}

impl SessionLog {
    /// Creates the local staging file under `dir`, named by start time.
    pub fn create(dir: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let started = Utc::now();
        let path =
            PathBuf::from(dir).join(format!("session_{}.jsonl", started.format("%Y%m%dT%H%M%S")));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to create session log at {}", path.display()))?;

        debug!(path = %path.display(), "session log opened");
        Ok(Self {
            path,
            file,
            started,
        })
    }

    /// Appends one log line. Write failures are logged, never propagated;
    /// a broken session log must not affect the run itself.
    pub fn record(&mut self, level: &str, message: &str, detail: serde_json::Value) {
        let line = json!({
            "timestamp": Utc::now(),
            "level": level,
            "message": message,
            "detail": detail,
        });
        if let Err(e) = writeln!(self.file, "{line}") {
            error!(error = %e, "failed to append to session log");
        }
    }

    /// Uploads the accumulated lines to the blob store under
    /// `simulation_logs/<timestamp>.jsonl`, then removes the local file.
    ///
    /// Removal happens whether or not the upload succeeds; an upload
    /// failure is logged and must not mask the run's results.
    pub async fn flush_to_blob(mut self, blob: &dyn BlobStore) -> Result<()> {
        if let Err(e) = self.file.flush() {
            error!(error = %e, "failed to flush session log file");
        }

        let key = format!(
            "simulation_logs/{}.jsonl",
            self.started.format("%Y%m%dT%H%M%S")
        );

        let upload = match std::fs::read(&self.path) {
            Ok(body) => blob.put_object(&key, body, "application/x-ndjson").await,
            Err(e) => Err(e.into()),
        };

        if let Err(e) = &upload {
            error!(key = %key, error = %e, "session log upload failed");
        } else {
            debug!(key = %key, "session log uploaded");
        }

        if let Err(e) = std::fs::remove_file(&self.path) {
            error!(path = %self.path.display(), error = %e, "failed to remove session log staging file");
        }

        Ok(())
    }
}
