//! Per-run audit artifacts under `.audit/runs/<run-id>/`.
//!
//! Written alongside console output and unaffected by `RUST_LOG`.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::types::AnswerPath;
use crate::graph::LogicMap;
use crate::report::{AuditRecord, AuditSummary};

/// Attempts at a suffixed run id before giving up.
const MAX_RUN_ID_SUFFIX: usize = 100;

/// Fresh run identifier (`audit-YYYYmmdd_HHMMSS`, UTC).
pub fn new_run_id() -> String {
    format!("audit-{}", Utc::now().format("%Y%m%d_%H%M%S"))
}

/// Create the run directory for `base_id`, or for `base_id-2`, `base_id-3`
/// and so on when that one is taken.
fn claim_run_dir(root: &Path, base_id: &str) -> Result<(String, RunPaths)> {
    let runs_dir = root.join(".audit").join("runs");
    fs::create_dir_all(&runs_dir)
        .with_context(|| format!("create runs dir {}", runs_dir.display()))?;
    for attempt in 1..=MAX_RUN_ID_SUFFIX {
        let run_id = if attempt == 1 {
            base_id.to_string()
        } else {
            format!("{base_id}-{attempt}")
        };
        let run_paths = RunPaths::new(root, &run_id);
        match fs::create_dir(&run_paths.dir) {
            Ok(()) => return Ok((run_id, run_paths)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                debug!(run_id = %run_id, "run directory taken");
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("create run dir {}", run_paths.dir.display()));
            }
        }
    }
    bail!("no free run directory for {base_id} under {}", runs_dir.display())
}

#[derive(Debug, Clone)]
pub struct RunPaths {
    pub dir: PathBuf,
    pub logic_path: PathBuf,
    pub paths_path: PathBuf,
    pub results_path: PathBuf,
    pub summary_path: PathBuf,
}

impl RunPaths {
    pub fn new(root: &Path, run_id: &str) -> Self {
        Self::in_dir(root.join(".audit").join("runs").join(run_id))
    }

    pub fn in_dir(dir: PathBuf) -> Self {
        Self {
            logic_path: dir.join("logic.json"),
            paths_path: dir.join("paths.json"),
            results_path: dir.join("results.jsonl"),
            summary_path: dir.join("summary.json"),
            dir,
        }
    }
}

/// Contents of `summary.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub survey_url: String,
    pub started_at: String,
    pub finished_at: String,
    pub cancelled: bool,
    pub summary: AuditSummary,
}

/// Append-only writer for one audit run.
pub struct ResultsLog {
    paths: RunPaths,
    run_id: String,
    survey_url: String,
    started_at: String,
    results: File,
}

impl ResultsLog {
    /// Create a new run directory and write the inputs of the run.
    ///
    /// An existing run is never reused: if `run_id` is taken the directory
    /// gets a numeric suffix (see [`ResultsLog::run_id`]).
    pub fn create(
        root: &Path,
        run_id: &str,
        survey_url: &str,
        logic: &LogicMap,
        paths: &[AnswerPath],
    ) -> Result<Self> {
        let (run_id, run_paths) = claim_run_dir(root, run_id)?;

        // Write in deterministic order to keep logs stable.
        write_json(&run_paths.logic_path, logic)?;
        write_json(&run_paths.paths_path, &paths)?;
        let results = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&run_paths.results_path)
            .with_context(|| format!("create {}", run_paths.results_path.display()))?;
        debug!(dir = %run_paths.dir.display(), "results log created");

        Ok(Self {
            paths: run_paths,
            run_id,
            survey_url: survey_url.to_string(),
            started_at: Utc::now().to_rfc3339(),
            results,
        })
    }

    /// Run id actually used, including any suffix.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Append one record as a JSON line, flushed immediately.
    pub fn append(&mut self, record: &AuditRecord) -> Result<()> {
        let mut line = serde_json::to_string(record).context("serialize audit record")?;
        line.push('\n');
        self.results
            .write_all(line.as_bytes())
            .and_then(|()| self.results.flush())
            .with_context(|| format!("append {}", self.paths.results_path.display()))
    }

    /// Write `summary.json` and close the log.
    pub fn finish(self, summary: &AuditSummary, cancelled: bool) -> Result<RunPaths> {
        let run_summary = RunSummary {
            run_id: self.run_id,
            survey_url: self.survey_url,
            started_at: self.started_at,
            finished_at: Utc::now().to_rfc3339(),
            cancelled,
            summary: *summary,
        };
        write_json(&self.paths.summary_path, &run_summary)?;
        Ok(self.paths)
    }
}

/// Records read back from a `results.jsonl` file.
#[derive(Debug, Default)]
pub struct LoadedResults {
    pub records: Vec<AuditRecord>,
    /// 1-based line numbers that could not be parsed.
    pub skipped: Vec<usize>,
}

/// Read a run's records, skipping blank and malformed lines.
pub fn read_results(path: &Path) -> Result<LoadedResults> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut loaded = LoadedResults::default();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditRecord>(&line) {
            Ok(record) => loaded.records.push(record),
            Err(err) => {
                warn!(file = %path.display(), line = number + 1, err = %err, "skipping malformed record");
                loaded.skipped.push(number + 1);
            }
        }
    }
    Ok(loaded)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ExecutionTrace, StopReason, Verdict};
    use crate::test_support::{branching_graph, path};

    fn record(case: usize) -> AuditRecord {
        let trace = ExecutionTrace {
            steps_completed: 1,
            total_steps: 1,
            last_clicked: Some("B".to_string()),
            error: None,
            stop: StopReason::PathExhausted,
            soft_timeouts: 0,
        };
        AuditRecord::new(case, &path(2, &["B"]), Verdict::Success, trace)
    }

    #[test]
    fn run_paths_are_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = RunPaths::new(temp.path(), "audit-1");
        assert!(paths.dir.ends_with(Path::new(".audit/runs/audit-1")));
        assert!(paths.results_path.ends_with("results.jsonl"));
        assert!(new_run_id().starts_with("audit-"));
    }

    #[test]
    fn writes_inputs_records_and_summary() {
        let temp = tempfile::tempdir().expect("tempdir");
        let logic = branching_graph().to_map();
        let paths = vec![path(0, &["A", "C"]), path(1, &["B"])];
        let mut log =
            ResultsLog::create(temp.path(), "audit-x", "https://s.example", &logic, &paths)
                .expect("create");
        log.append(&record(1)).expect("append");
        log.append(&record(2)).expect("append");
        let summary = AuditSummary::from_records(&[record(1), record(2)]);
        let run = log.finish(&summary, false).expect("finish");

        let stored: Vec<AnswerPath> =
            serde_json::from_str(&fs::read_to_string(&run.paths_path).expect("read"))
                .expect("parse paths");
        assert_eq!(stored, paths);
        let loaded = read_results(&run.results_path).expect("read results");
        assert_eq!(loaded.records.len(), 2);
        assert_eq!(loaded.records[1].case, 2);
        let run_summary: RunSummary =
            serde_json::from_str(&fs::read_to_string(&run.summary_path).expect("read"))
                .expect("parse summary");
        assert_eq!(run_summary.summary.success, 2);
        assert_eq!(run_summary.survey_url, "https://s.example");
    }

    #[test]
    fn runs_in_the_same_second_get_distinct_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let logic = branching_graph().to_map();
        let first = ResultsLog::create(temp.path(), "audit-x", "u", &logic, &[]).expect("first");
        let second =
            ResultsLog::create(temp.path(), "audit-x", "u", &logic, &[]).expect("second");
        let third = ResultsLog::create(temp.path(), "audit-x", "u", &logic, &[]).expect("third");
        assert_eq!(first.run_id(), "audit-x");
        assert_eq!(second.run_id(), "audit-x-2");
        assert_eq!(third.run_id(), "audit-x-3");

        let first_dir = first.finish(&AuditSummary::default(), false).expect("finish").dir;
        let second_dir = second.finish(&AuditSummary::default(), false).expect("finish").dir;
        assert_ne!(first_dir, second_dir);
        assert!(second_dir.join("summary.json").is_file());
    }

    #[test]
    fn read_results_skips_malformed_lines() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("results.jsonl");
        let good = serde_json::to_string(&record(1)).expect("json");
        fs::write(&file, format!("{good}\n{{not json\n\n{good}\n")).expect("write");
        let loaded = read_results(&file).expect("read");
        assert_eq!(loaded.records.len(), 2);
        assert_eq!(loaded.skipped, vec![2]);
    }
}
