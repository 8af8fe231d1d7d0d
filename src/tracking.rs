use crate::config::Config;
use crate::error::Result;

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

pub const URL_VAR: &str = "WORDVEC_TRACKING_URL";
pub const DB_VAR: &str = "WORDVEC_TRACKING_DB";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Running,
    Completed,
    Failed,
}

/// Everything kept about one command invocation.
#[derive(Debug, Serialize)]
pub struct RunRecord {
    pub experiment: String,
    pub config: Value,
    pub seed: Option<u64>,
    pub start_time: f64,
    pub stop_time: Option<f64>,
    pub metrics: BTreeMap<String, Vec<f64>>,
    pub status: Status,
    pub result: Value,
}

/// Records parameters and metrics of a run, and appends the record to the
/// tracking file once the run is over. Without a configured sink the record
/// is only kept in memory.
pub struct Run {
    record: RunRecord,
    sink: Option<PathBuf>,
}

impl Run {

    /// A run recorded where the tracking environment variables point, if both are set.
    pub fn start(experiment: &str, config: &Config) -> Run {
        let sink = sink_from(std::env::var(URL_VAR).ok(), std::env::var(DB_VAR).ok());
        let seed = config.seed().ok();
        Run::new(experiment, config.json().clone(), seed, sink)
    }

    pub fn disabled(experiment: &str) -> Run {
        Run::new(experiment, Value::Null, None, None)
    }

    fn new(experiment: &str, config: Value, seed: Option<u64>, sink: Option<PathBuf>) -> Run {
        if let Some(path) = &sink {
            info!("tracking run '{}' in {}", experiment, path.display());
        }
        Run {
            record: RunRecord {
                experiment: experiment.to_string(),
                config,
                seed,
                start_time: now(),
                stop_time: None,
                metrics: BTreeMap::new(),
                status: Status::Running,
                result: Value::Null,
            },
            sink,
        }
    }

    pub fn log_scalar(&mut self, name: &str, value: f64) {
        debug!("metric {} = {}", name, value);
        self.record.metrics.entry(name.to_string()).or_default().push(value);
    }

    pub fn metric(&self, name: &str) -> Option<&Vec<f64>> {
        self.record.metrics.get(name)
    }

    /// Closes the run with the outcome of the command. Failing to write the
    /// record is only logged.
    pub fn finish<T: Serialize>(mut self, outcome: &Result<T>) -> RunRecord {

        self.record.stop_time = Some(now());
        match outcome {
            Ok(result) => {
                self.record.status = Status::Completed;
                self.record.result = serde_json::to_value(result).unwrap_or(Value::Null);
            }
            Err(e) => {
                self.record.status = Status::Failed;
                self.record.result = Value::String(e.to_string());
            }
        }

        if let Some(path) = &self.sink {
            if let Err(e) = append_record(path, &self.record) {
                warn!("cannot write run record to {}: {}", path.display(), e);
            }
        }
        self.record
    }
}

fn now() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

/// Resolves the record file from the tracking url and database name. Only
/// `file://<dir>` urls are understood.
pub fn sink_from(url: Option<String>, db: Option<String>) -> Option<PathBuf> {
    let (url, db) = (url?, db?);
    match url.strip_prefix("file://") {
        Some(dir) if !db.is_empty() => Some(PathBuf::from(dir).join(format!("{}.jsonl", db))),
        _ => {
            warn!("unsupported tracking url '{}' or empty database name, tracking disabled", url);
            None
        }
    }
}

fn append_record(path: &Path, record: &RunRecord) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(f, "{}", serde_json::to_string(record)?)?;
    Ok(())
}
