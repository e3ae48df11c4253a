use anyhow::Result;
use log::{error, warn};
use serde::{Deserialize, Serialize};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

const WALL_TIME_MARKER: &str = "Total wall time";

/// Why a LAMMPS run ended the way it did, as told by its log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FailureReason {
    Success,
    MissingGpu,
    MpiError,
    OsAbiIssue,
    Unknown,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Success => write!(f, "success"),
            FailureReason::MissingGpu => write!(f, "missing gpu"),
            FailureReason::MpiError => write!(f, "mpi error"),
            FailureReason::OsAbiIssue => write!(f, "os abi issue"),
            FailureReason::Unknown => write!(f, "unknown"),
        }
    }
}

impl FailureReason {
    pub fn from_log(log: &str) -> Self {
        if log.contains(WALL_TIME_MARKER) {
            FailureReason::Success
        } else if log.contains("libcuda.so.1: cannot open shared object file") {
            FailureReason::MissingGpu
        } else if log.contains("Other MPI error") {
            FailureReason::MpiError
        } else if log.contains("GLIBC") && log.contains("not found") {
            // Also covers GLIBCXX
            FailureReason::OsAbiIssue
        } else {
            FailureReason::Unknown
        }
    }
}

/// Parse a `[[H:]M:]S` duration into seconds.
pub fn time_str_to_seconds(time_str: &str) -> Option<f64> {
    let parts: Vec<&str> = time_str.trim().split(':').collect();
    if parts.len() > 3 {
        return None;
    }

    parts.iter().try_fold(0.0, |acc, part| {
        part.trim().parse::<f64>().ok().map(|value| acc * 60.0 + value)
    })
}

/// Wall time of a successful LAMMPS run, in seconds.
pub fn parse_wall_time(log: &str) -> Option<f64> {
    let line = log.lines().find(|line| line.contains(WALL_TIME_MARKER))?;
    let (_, raw_time) = line.split_once(':')?;
    time_str_to_seconds(raw_time)
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ResultRow {
    pub experiment: String,
    pub success: bool,
    pub reason: String,
    pub wall_time: Option<f64>,
}

/// Every file under `results_dir` with `log` in its name.
pub fn find_inputs(results_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = vec![];
    for entry in WalkDir::new(results_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let reason = format!(
                "error walking results (path={}, error={e:?})",
                results_dir.display()
            );
            error!("{reason}");
            anyhow::anyhow!(reason)
        })?;

        if entry.file_type().is_file() && entry.file_name().to_string_lossy().contains("log") {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// # Description
///
/// Parse LAMMPS logs into result rows. The experiment of a log is the first
/// directory below `results_dir` (i.e. the selection mode it ran with).
pub fn parse_results(results_dir: &Path, files: &[PathBuf]) -> Result<Vec<ResultRow>> {
    let mut rows = vec![];

    for file in files {
        if file.to_string_lossy().contains("topology") {
            continue;
        }

        let experiment = file
            .strip_prefix(results_dir)
            .ok()
            .and_then(|rel| rel.components().next())
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .ok_or_else(|| {
                let reason = format!("log is not under results (path={})", file.display());
                error!("{reason}");
                anyhow::anyhow!(reason)
            })?;

        let log = fs::read_to_string(file).map_err(|e| {
            let reason = format!("error reading log (path={}, error={e:?})", file.display());
            error!("{reason}");
            anyhow::anyhow!(reason)
        })?;

        let reason = FailureReason::from_log(&log);
        if reason == FailureReason::Unknown {
            warn!("found new failure reason (path={})", file.display());
        }

        let wall_time = match reason {
            FailureReason::Success => parse_wall_time(&log),
            _ => None,
        };

        rows.push(ResultRow {
            experiment,
            success: reason == FailureReason::Success,
            reason: reason.to_string(),
            wall_time,
        });
    }

    Ok(rows)
}

pub fn write_csv(rows: &[ResultRow], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| {
        let reason = format!("error creating csv (path={}, error={e:?})", path.display());
        error!("{reason}");
        anyhow::anyhow!(reason)
    })?;

    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}

/// Linear-interpolation quantile of sorted values, `q` in `[0, 1]`.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }

    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let weight = pos - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Whisker-low, first quartile, median, third quartile and whisker-high, with
/// whiskers at the 5th and 95th percentiles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxStats {
    pub low: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub high: f64,
}

impl BoxStats {
    pub fn new(values: &[f64]) -> Option<Self> {
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        Some(BoxStats {
            low: quantile(&sorted, 0.05)?,
            q1: quantile(&sorted, 0.25)?,
            median: quantile(&sorted, 0.5)?,
            q3: quantile(&sorted, 0.75)?,
            high: quantile(&sorted, 0.95)?,
        })
    }
}
