//! Experiment recorders.
//!
//! A [`Recorder`] receives per-epoch metric maps and named JSON objects such
//! as the final fit report.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::error::{RecorderError, RecorderResult};

/// Sink for metrics and artifacts of a run.
pub trait Recorder {
    /// Records the metrics of step `step`.
    fn log_metrics(&mut self, step: usize, metrics: &BTreeMap<String, f64>) -> RecorderResult<()>;

    /// Stores a named JSON object.
    fn save_object(&mut self, name: &str, value: &Value) -> RecorderResult<()>;
}

/// Appends metrics to `metrics.jsonl` and writes objects to `<name>.json`
/// inside an existing directory.
#[derive(Debug)]
pub struct JsonlRecorder {
    dir: PathBuf,
}

impl JsonlRecorder {
    /// Name of the metrics file.
    pub const METRICS_FILE: &'static str = "metrics.jsonl";

    /// Creates a recorder writing into `dir`, which must exist.
    pub fn new(dir: impl Into<PathBuf>) -> RecorderResult<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(RecorderError::MissingDirectory(dir));
        }
        Ok(Self { dir })
    }

    /// Directory being written.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the metrics file.
    pub fn metrics_path(&self) -> PathBuf {
        self.dir.join(Self::METRICS_FILE)
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> RecorderError + '_ {
    move |source| RecorderError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl Recorder for JsonlRecorder {
    fn log_metrics(&mut self, step: usize, metrics: &BTreeMap<String, f64>) -> RecorderResult<()> {
        let path = self.metrics_path();
        let line = serde_json::json!({ "step": step, "metrics": metrics });
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err(&path))?;
        writeln!(file, "{}", serde_json::to_string(&line)?).map_err(io_err(&path))?;
        Ok(())
    }

    fn save_object(&mut self, name: &str, value: &Value) -> RecorderResult<()> {
        let path = self.dir.join(format!("{name}.json"));
        let file = File::create(&path).map_err(io_err(&path))?;
        serde_json::to_writer_pretty(file, value)?;
        debug!(path = %path.display(), "Object saved");
        Ok(())
    }
}

/// Keeps everything in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryRecorder {
    /// Logged metric maps with their step.
    pub metrics: Vec<(usize, BTreeMap<String, f64>)>,
    /// Saved objects by name.
    pub objects: BTreeMap<String, Value>,
}

impl MemoryRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Values of `key` across logged steps.
    pub fn series(&self, key: &str) -> Vec<f64> {
        self.metrics
            .iter()
            .filter_map(|(_, m)| m.get(key).copied())
            .collect()
    }
}

impl Recorder for MemoryRecorder {
    fn log_metrics(&mut self, step: usize, metrics: &BTreeMap<String, f64>) -> RecorderResult<()> {
        self.metrics.push((step, metrics.clone()));
        Ok(())
    }

    fn save_object(&mut self, name: &str, value: &Value) -> RecorderResult<()> {
        self.objects.insert(name.to_string(), value.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_jsonl_recorder_appends() {
        let dir = tempdir().unwrap();
        let mut recorder = JsonlRecorder::new(dir.path()).unwrap();
        let mut m = BTreeMap::new();
        m.insert("valid_ic".to_string(), 0.05);
        recorder.log_metrics(0, &m).unwrap();
        m.insert("valid_ic".to_string(), f64::NAN);
        recorder.log_metrics(1, &m).unwrap();
        recorder.save_object("fit_report", &serde_json::json!({"best_epoch": 0})).unwrap();

        let text = std::fs::read_to_string(recorder.metrics_path()).unwrap();
        let lines: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["step"], 0);
        assert_eq!(lines[0]["metrics"]["valid_ic"], 0.05);
        assert!(lines[1]["metrics"]["valid_ic"].is_null());

        let report: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("fit_report.json")).unwrap()).unwrap();
        assert_eq!(report["best_epoch"], 0);
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempdir().unwrap();
        let err = JsonlRecorder::new(dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, RecorderError::MissingDirectory(_)));
    }

    #[test]
    fn test_memory_recorder_series() {
        let mut recorder = MemoryRecorder::new();
        for step in 0..3 {
            let mut m = BTreeMap::new();
            m.insert("loss".to_string(), step as f64);
            recorder.log_metrics(step, &m).unwrap();
        }
        assert_eq!(recorder.series("loss"), vec![0.0, 1.0, 2.0]);
    }
}
