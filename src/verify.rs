use std::fmt;
use std::fs;

use camino::Utf8Path;
use serde::Serialize;
use tracing::info;

use crate::domain::{Batch, SequenceFormat};
use crate::store::OutputStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Ok {
        bytes: u64,
        records: usize,
    },
    CountMismatch {
        bytes: u64,
        records: usize,
        expected: usize,
    },
    Empty,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileCheck {
    pub file_name: String,
    pub batch: usize,
    pub format: SequenceFormat,
    pub status: FileStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Complete,
    Partial,
    NothingDownloaded,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Complete => write!(f, "complete"),
            Verdict::Partial => write!(f, "partial"),
            Verdict::NothingDownloaded => write!(f, "nothing downloaded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub root: String,
    pub root_exists: bool,
    pub checks: Vec<FileCheck>,
    pub verdict: Verdict,
}

pub fn verify(
    root: &Utf8Path,
    batches: &[Batch],
    formats: &[SequenceFormat],
) -> VerificationReport {
    let root_exists = root.as_std_path().is_dir();
    let mut checks = Vec::new();

    for batch in batches {
        for &format in formats {
            let file_name = OutputStore::batch_file_name(batch.number, format);
            let status = if root_exists {
                check_file(&root.join(&file_name), format, batch.len())
            } else {
                FileStatus::Missing
            };
            checks.push(FileCheck {
                file_name,
                batch: batch.number,
                format,
                status,
            });
        }
    }

    let verdict = resolve_verdict(&checks);
    info!(root = %root, %verdict, files = checks.len(), "verification finished");
    VerificationReport {
        root: root.to_string(),
        root_exists,
        checks,
        verdict,
    }
}

fn check_file(path: &Utf8Path, format: SequenceFormat, expected: usize) -> FileStatus {
    let metadata = match fs::metadata(path.as_std_path()) {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => return FileStatus::Missing,
    };
    let bytes = metadata.len();
    if bytes == 0 {
        return FileStatus::Empty;
    }
    let content = match fs::read_to_string(path.as_std_path()) {
        Ok(content) => content,
        Err(_) => return FileStatus::Missing,
    };
    let records = format.count_records(&content);
    if records == expected {
        FileStatus::Ok { bytes, records }
    } else {
        FileStatus::CountMismatch {
            bytes,
            records,
            expected,
        }
    }
}

fn resolve_verdict(checks: &[FileCheck]) -> Verdict {
    let usable = checks
        .iter()
        .filter(|check| {
            matches!(
                check.status,
                FileStatus::Ok { .. } | FileStatus::CountMismatch { .. }
            )
        })
        .count();
    let complete = checks
        .iter()
        .all(|check| matches!(check.status, FileStatus::Ok { .. }));

    if usable == 0 {
        Verdict::NothingDownloaded
    } else if complete {
        Verdict::Complete
    } else {
        Verdict::Partial
    }
}
