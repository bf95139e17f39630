use std::fmt::Write as _;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info};

use crate::config::ResolvedConfig;
use crate::domain::SequenceFormat;
use crate::entrez::EntrezClient;
use crate::error::RetrieverError;
use crate::extract::extract_accessions;
use crate::fetch::{BatchFetcher, Sleeper, partition_batches};
use crate::store::OutputStore;
use crate::verify::VerificationReport;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub input_file: String,
    pub output_dir: String,
    pub accessions: usize,
    pub batch_size: usize,
    pub batches: usize,
    pub formats: Vec<SequenceFormat>,
    pub files_written: usize,
    pub totals: Vec<FormatTotal>,
    pub failures: Vec<FailureRecord>,
    pub started_at: String,
    pub finished_at: String,
    pub elapsed_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormatTotal {
    pub format: SequenceFormat,
    pub files: usize,
    pub records: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub batch: usize,
    pub format: SequenceFormat,
    pub attempts: usize,
    pub error: String,
}

impl RunSummary {
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "NCBI retrieval run summary");
        let _ = writeln!(out, "==========================");
        let _ = writeln!(out, "input:      {}", self.input_file);
        let _ = writeln!(out, "output:     {}", self.output_dir);
        let _ = writeln!(
            out,
            "accessions: {} in {} batches (batch size {})",
            self.accessions, self.batches, self.batch_size
        );
        let _ = writeln!(out);
        for total in &self.totals {
            let _ = writeln!(
                out,
                "{}: {} files, {} records",
                total.format, total.files, total.records
            );
        }
        let _ = writeln!(out);
        if self.failures.is_empty() {
            let _ = writeln!(out, "failures: none");
        } else {
            let _ = writeln!(out, "failures: {}", self.failures.len());
            for failure in &self.failures {
                let _ = writeln!(
                    out,
                    "  - batch {} {} after {} attempt(s): {}",
                    failure.batch, failure.format, failure.attempts, failure.error
                );
            }
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "started:  {}", self.started_at);
        let _ = writeln!(out, "finished: {}", self.finished_at);
        let _ = writeln!(out, "elapsed:  {:.1} s", self.elapsed_seconds);
        out
    }
}

#[derive(Clone)]
pub struct App<E: EntrezClient, S: Sleeper> {
    entrez: E,
    sleeper: S,
}

impl<E: EntrezClient, S: Sleeper> App<E, S> {
    pub fn new(entrez: E, sleeper: S) -> Self {
        Self { entrez, sleeper }
    }

    pub fn run(
        &self,
        config: &ResolvedConfig,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, RetrieverError> {
        let run_start = Instant::now();
        let started_at = iso_timestamp();

        sink.event(ProgressEvent {
            message: format!("phase=Extract; reading {}", config.input_file_path),
            elapsed: None,
        });
        let accessions = extract_accessions(&config.input_file_path)?;
        let batches = partition_batches(&accessions, config.batch_size);
        sink.event(ProgressEvent {
            message: format!(
                "phase=Extract; {} unique accessions in {} batches",
                accessions.len(),
                batches.len()
            ),
            elapsed: None,
        });

        let mut store = OutputStore::new(config.output_path.clone());
        store.ensure_root()?;

        let mut fetcher = BatchFetcher::new(
            &self.entrez,
            &self.sleeper,
            config.delay,
            config.max_retries,
        );
        let mut totals: Vec<FormatTotal> = config
            .formats
            .iter()
            .map(|&format| FormatTotal {
                format,
                files: 0,
                records: 0,
            })
            .collect();
        let mut failures = Vec::new();
        let mut files_written = 0usize;

        for batch in &batches {
            sink.event(ProgressEvent {
                message: format!(
                    "phase=Fetch; batch {}/{} ({} accessions)",
                    batch.number,
                    batches.len(),
                    batch.len()
                ),
                elapsed: None,
            });
            let batch_start = Instant::now();

            for fetch in fetcher.fetch_batch(batch, &config.formats) {
                match fetch.outcome {
                    Ok(payload) => {
                        match store.write_batch(batch.number, fetch.format, &payload.body) {
                            Ok(path) => {
                                files_written += 1;
                                if let Some(total) =
                                    totals.iter_mut().find(|total| total.format == fetch.format)
                                {
                                    total.files += 1;
                                    total.records += payload.records;
                                }
                                sink.event(ProgressEvent {
                                    message: format!(
                                        "phase=Store; wrote {path} ({} records, {} bytes)",
                                        payload.records,
                                        payload.body.len()
                                    ),
                                    elapsed: None,
                                });
                            }
                            Err(err) => {
                                error!(
                                    batch = batch.number,
                                    format = %fetch.format,
                                    error = %err,
                                    "failed to write batch file"
                                );
                                sink.event(ProgressEvent {
                                    message: format!(
                                        "phase=Store; batch {} {} write failed: {err}",
                                        batch.number, fetch.format
                                    ),
                                    elapsed: None,
                                });
                                failures.push(FailureRecord {
                                    batch: batch.number,
                                    format: fetch.format,
                                    attempts: fetch.attempts,
                                    error: err.to_string(),
                                });
                            }
                        }
                    }
                    Err(err) => {
                        sink.event(ProgressEvent {
                            message: format!(
                                "phase=Fetch; batch {} {} failed: {err}",
                                batch.number, fetch.format
                            ),
                            elapsed: None,
                        });
                        failures.push(FailureRecord {
                            batch: batch.number,
                            format: fetch.format,
                            attempts: fetch.attempts,
                            error: err.to_string(),
                        });
                    }
                }
            }

            sink.event(ProgressEvent {
                message: format!("phase=Fetch; batch {}/{} done", batch.number, batches.len()),
                elapsed: Some(batch_start.elapsed()),
            });
        }

        let summary = RunSummary {
            input_file: config.input_file_path.to_string(),
            output_dir: config.output_path.to_string(),
            accessions: accessions.len(),
            batch_size: config.batch_size,
            batches: batches.len(),
            formats: config.formats.clone(),
            files_written,
            totals,
            failures,
            started_at,
            finished_at: iso_timestamp(),
            elapsed_seconds: run_start.elapsed().as_secs_f64(),
        };

        if let Err(err) = store.write_summary(&summary, &summary.render_text()) {
            error!(error = %err, "failed to persist run summary");
        }
        info!(
            accessions = summary.accessions,
            batches = summary.batches,
            files = summary.files_written,
            failures = summary.failure_count(),
            "retrieval run finished"
        );
        Ok(summary)
    }
}

pub fn verify_run(config: &ResolvedConfig) -> Result<VerificationReport, RetrieverError> {
    let accessions = extract_accessions(&config.input_file_path)?;
    let batches = partition_batches(&accessions, config.batch_size);
    Ok(crate::verify::verify(
        &config.output_path,
        &batches,
        &config.formats,
    ))
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use camino::Utf8PathBuf;

    use super::*;
    use crate::domain::AccessionId;
    use crate::output::JsonOutput;

    struct MockEntrez;

    impl EntrezClient for MockEntrez {
        fn fetch_batch(
            &self,
            accessions: &[AccessionId],
            format: SequenceFormat,
        ) -> Result<String, RetrieverError> {
            let mut body = String::new();
            for accession in accessions {
                match format {
                    SequenceFormat::Genbank => {
                        body.push_str(&format!("LOCUS       {accession}  10 bp\n//\n"));
                    }
                    SequenceFormat::Fasta => {
                        body.push_str(&format!(">{accession} mock record\nACGT\n"));
                    }
                }
            }
            Ok(body)
        }
    }

    struct NoSleep;

    impl Sleeper for NoSleep {
        fn sleep(&self, _duration: Duration) {}
    }

    fn config_for(temp: &tempfile::TempDir, input_name: &str) -> ResolvedConfig {
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        ResolvedConfig {
            email: "student@example.edu".to_string(),
            input_file_path: root.join(input_name),
            output_path: root.join("downloads"),
            batch_size: 2,
            delay: Duration::ZERO,
            formats: vec![SequenceFormat::Genbank, SequenceFormat::Fasta],
            request_timeout: Duration::from_secs(30),
            max_retries: 0,
        }
    }

    #[test]
    fn run_dedups_and_writes_both_formats() {
        let temp = tempfile::tempdir().unwrap();
        let config = config_for(&temp, "accessions.txt");
        fs::write(
            config.input_file_path.as_std_path(),
            "NM_0001\nNM_0001\n\nXM_0002\n",
        )
        .unwrap();

        let app = App::new(MockEntrez, NoSleep);
        let summary = app.run(&config, &JsonOutput).unwrap();

        assert_eq!(summary.accessions, 2);
        assert_eq!(summary.batches, 1);
        assert_eq!(summary.failure_count(), 0);
        assert!(
            config
                .output_path
                .join("batch_1_genbank.genbank")
                .as_std_path()
                .exists()
        );
        assert!(
            config
                .output_path
                .join("batch_1_fasta.fasta")
                .as_std_path()
                .exists()
        );
    }
}
