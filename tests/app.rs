use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use ncbi_retriever::app::{App, ProgressEvent, ProgressSink};
use ncbi_retriever::config::ResolvedConfig;
use ncbi_retriever::domain::{AccessionId, SequenceFormat};
use ncbi_retriever::entrez::EntrezClient;
use ncbi_retriever::error::RetrieverError;
use ncbi_retriever::fetch::Sleeper;
use ncbi_retriever::store::SUMMARY_JSON_NAME;

struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

struct NoSleep;

impl Sleeper for NoSleep {
    fn sleep(&self, _duration: Duration) {}
}

#[derive(Clone, Default)]
struct CountingEntrez {
    calls: Arc<Mutex<usize>>,
}

impl EntrezClient for CountingEntrez {
    fn fetch_batch(
        &self,
        accessions: &[AccessionId],
        format: SequenceFormat,
    ) -> Result<String, RetrieverError> {
        *self.calls.lock().unwrap() += 1;
        Ok(render_records(accessions, format))
    }
}

struct FailingBatchEntrez {
    fail_on: (String, SequenceFormat),
}

impl EntrezClient for FailingBatchEntrez {
    fn fetch_batch(
        &self,
        accessions: &[AccessionId],
        format: SequenceFormat,
    ) -> Result<String, RetrieverError> {
        let (ref first, fail_format) = self.fail_on;
        if accessions[0].as_str() == first && format == fail_format {
            return Err(RetrieverError::EmptyResult);
        }
        Ok(render_records(accessions, format))
    }
}

fn render_records(accessions: &[AccessionId], format: SequenceFormat) -> String {
    let mut body = String::new();
    for accession in accessions {
        match format {
            SequenceFormat::Genbank => {
                body.push_str(&format!("LOCUS       {accession}  4 bp\n//\n"));
            }
            SequenceFormat::Fasta => {
                body.push_str(&format!(">{accession}\nACGT\n"));
            }
        }
    }
    body
}

fn config_in(temp: &tempfile::TempDir, batch_size: usize) -> ResolvedConfig {
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    ResolvedConfig {
        email: "student@example.edu".to_string(),
        input_file_path: root.join("accessions.txt"),
        output_path: root.join("downloads"),
        batch_size,
        delay: Duration::ZERO,
        formats: vec![SequenceFormat::Genbank, SequenceFormat::Fasta],
        request_timeout: Duration::from_secs(30),
        max_retries: 0,
    }
}

#[test]
fn run_writes_every_batch_and_persists_a_summary() {
    let temp = tempfile::tempdir().unwrap();
    let config = config_in(&temp, 2);
    fs::write(
        config.input_file_path.as_std_path(),
        "NM_000001\nNM_000002\nNM_000003\nNM_000004\nNM_000005\n",
    )
    .unwrap();

    let app = App::new(CountingEntrez::default(), NoSleep);
    let summary = app.run(&config, &NoopSink).unwrap();

    assert_eq!(summary.accessions, 5);
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.files_written, 6);
    assert_eq!(summary.failure_count(), 0);
    for batch in 1..=3 {
        assert!(
            config
                .output_path
                .join(format!("batch_{batch}_genbank.genbank"))
                .as_std_path()
                .exists()
        );
        assert!(
            config
                .output_path
                .join(format!("batch_{batch}_fasta.fasta"))
                .as_std_path()
                .exists()
        );
    }

    let summary_raw = fs::read_to_string(
        config
            .output_path
            .join(SUMMARY_JSON_NAME)
            .as_std_path(),
    )
    .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&summary_raw).unwrap();
    assert_eq!(parsed["accessions"], 5);
    assert_eq!(parsed["files_written"], 6);
}

#[test]
fn duplicate_and_blank_input_collapses_to_one_batch() {
    let temp = tempfile::tempdir().unwrap();
    let config = config_in(&temp, 2);
    fs::write(
        config.input_file_path.as_std_path(),
        "NM_0001\nNM_0001\n\nXM_0002\n",
    )
    .unwrap();

    let app = App::new(CountingEntrez::default(), NoSleep);
    let summary = app.run(&config, &NoopSink).unwrap();

    assert_eq!(summary.accessions, 2);
    assert_eq!(summary.batches, 1);
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

#[test]
fn empty_input_aborts_before_any_network_call() {
    let temp = tempfile::tempdir().unwrap();
    let config = config_in(&temp, 2);
    fs::write(config.input_file_path.as_std_path(), "").unwrap();

    let entrez = CountingEntrez::default();
    let calls = Arc::clone(&entrez.calls);
    let app = App::new(entrez, NoSleep);
    let err = app.run(&config, &NoopSink).unwrap_err();

    assert_matches!(err, RetrieverError::InputEmpty(_));
    assert_eq!(*calls.lock().unwrap(), 0);
}

#[test]
fn one_failed_call_does_not_disturb_the_rest() {
    let temp = tempfile::tempdir().unwrap();
    let config = config_in(&temp, 2);
    fs::write(
        config.input_file_path.as_std_path(),
        "NM_000001\nNM_000002\nNM_000003\nNM_000004\nNM_000005\nNM_000006\n",
    )
    .unwrap();

    let entrez = FailingBatchEntrez {
        fail_on: ("NM_000003".to_string(), SequenceFormat::Genbank),
    };
    let app = App::new(entrez, NoSleep);
    let summary = app.run(&config, &NoopSink).unwrap();

    assert_eq!(summary.failure_count(), 1);
    assert_eq!(summary.failures[0].batch, 2);
    assert_eq!(summary.failures[0].format, SequenceFormat::Genbank);
    assert_eq!(summary.files_written, 5);

    assert!(
        !config
            .output_path
            .join("batch_2_genbank.genbank")
            .as_std_path()
            .exists()
    );
    assert!(
        config
            .output_path
            .join("batch_2_fasta.fasta")
            .as_std_path()
            .exists()
    );
    assert!(
        config
            .output_path
            .join("batch_3_genbank.genbank")
            .as_std_path()
            .exists()
    );
}
