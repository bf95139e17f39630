use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::info;

use crate::domain::SequenceFormat;
use crate::error::RetrieverError;

pub const SUMMARY_JSON_NAME: &str = "run_summary.json";
pub const SUMMARY_TEXT_NAME: &str = "run_summary.txt";

#[derive(Debug, Clone)]
pub struct OutputStore {
    root: Utf8PathBuf,
    touched: HashSet<(usize, SequenceFormat)>,
}

impl OutputStore {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self {
            root,
            touched: HashSet::new(),
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn ensure_root(&self) -> Result<(), RetrieverError> {
        fs::create_dir_all(self.root.as_std_path()).map_err(|err| RetrieverError::OutputDir {
            path: self.root.clone(),
            message: err.to_string(),
        })?;
        info!(output = %self.root, "output directory ready");
        Ok(())
    }

    pub fn batch_file_name(number: usize, format: SequenceFormat) -> String {
        format!("batch_{number}_{format}.{}", format.extension())
    }

    pub fn batch_path(&self, number: usize, format: SequenceFormat) -> Utf8PathBuf {
        self.root.join(Self::batch_file_name(number, format))
    }

    pub fn write_batch(
        &mut self,
        number: usize,
        format: SequenceFormat,
        body: &str,
    ) -> Result<Utf8PathBuf, RetrieverError> {
        let path = self.batch_path(number, format);
        let first_touch = self.touched.insert((number, format));

        let mut options = OpenOptions::new();
        if first_touch {
            options.write(true).create(true).truncate(true);
        } else {
            options.create(true).append(true);
        }
        let mut file = options
            .open(path.as_std_path())
            .map_err(|err| RetrieverError::Filesystem(format!("open {path}: {err}")))?;
        file.write_all(body.as_bytes())
            .map_err(|err| RetrieverError::Filesystem(format!("write {path}: {err}")))?;
        if !body.ends_with('\n') {
            file.write_all(b"\n")
                .map_err(|err| RetrieverError::Filesystem(format!("write {path}: {err}")))?;
        }
        Ok(path)
    }

    pub fn write_summary(
        &self,
        summary: &impl Serialize,
        rendered: &str,
    ) -> Result<(), RetrieverError> {
        let json_path = self.root.join(SUMMARY_JSON_NAME);
        let content = serde_json::to_vec_pretty(summary)
            .map_err(|err| RetrieverError::Filesystem(err.to_string()))?;
        write_bytes_atomic(&json_path, &content)?;
        write_bytes_atomic(&self.root.join(SUMMARY_TEXT_NAME), rendered.as_bytes())
    }
}

fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), RetrieverError> {
    let parent = path
        .parent()
        .ok_or_else(|| RetrieverError::Filesystem(format!("invalid summary path {path}")))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| RetrieverError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix("run_summary")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| RetrieverError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| RetrieverError::Filesystem(err.to_string()))?;
    if path.as_std_path().exists() {
        fs::remove_file(path.as_std_path())
            .map_err(|err| RetrieverError::Filesystem(err.to_string()))?;
    }
    temp.persist(path.as_std_path())
        .map_err(|err| RetrieverError::Filesystem(err.to_string()))?;
    Ok(())
}
