use std::fs;

use camino::Utf8PathBuf;

use ncbi_retriever::domain::SequenceFormat;
use ncbi_retriever::store::{OutputStore, SUMMARY_JSON_NAME, SUMMARY_TEXT_NAME};

fn temp_store(temp: &tempfile::TempDir) -> OutputStore {
    let root = Utf8PathBuf::from_path_buf(temp.path().join("downloads")).unwrap();
    OutputStore::new(root)
}

#[test]
fn naming_convention() {
    assert_eq!(
        OutputStore::batch_file_name(1, SequenceFormat::Genbank),
        "batch_1_genbank.genbank"
    );
    assert_eq!(
        OutputStore::batch_file_name(7, SequenceFormat::Fasta),
        "batch_7_fasta.fasta"
    );
}

#[test]
fn writes_append_within_a_run() {
    let temp = tempfile::tempdir().unwrap();
    let mut store = temp_store(&temp);
    store.ensure_root().unwrap();

    store
        .write_batch(1, SequenceFormat::Fasta, ">a\nACGT")
        .unwrap();
    let path = store
        .write_batch(1, SequenceFormat::Fasta, ">b\nTTTT\n")
        .unwrap();

    let content = fs::read_to_string(path.as_std_path()).unwrap();
    assert_eq!(content, ">a\nACGT\n>b\nTTTT\n");
}

#[test]
fn fresh_run_truncates_previous_output() {
    let temp = tempfile::tempdir().unwrap();
    let mut store = temp_store(&temp);
    store.ensure_root().unwrap();
    store
        .write_batch(1, SequenceFormat::Genbank, "LOCUS  old\n//\n")
        .unwrap();

    let mut fresh = OutputStore::new(store.root().to_path_buf());
    let path = fresh
        .write_batch(1, SequenceFormat::Genbank, "LOCUS  new\n//\n")
        .unwrap();

    let content = fs::read_to_string(path.as_std_path()).unwrap();
    assert_eq!(content, "LOCUS  new\n//\n");
}

#[test]
fn formats_do_not_share_files() {
    let temp = tempfile::tempdir().unwrap();
    let mut store = temp_store(&temp);
    store.ensure_root().unwrap();

    let genbank = store
        .write_batch(2, SequenceFormat::Genbank, "LOCUS  x\n//\n")
        .unwrap();
    let fasta = store
        .write_batch(2, SequenceFormat::Fasta, ">x\nACGT\n")
        .unwrap();

    assert_ne!(genbank, fasta);
    assert!(genbank.as_str().ends_with("batch_2_genbank.genbank"));
    assert!(fasta.as_str().ends_with("batch_2_fasta.fasta"));
}

#[test]
fn summary_files_are_written_and_parse() {
    let temp = tempfile::tempdir().unwrap();
    let store = temp_store(&temp);
    store.ensure_root().unwrap();

    let summary = serde_json::json!({ "accessions": 4, "batches": 2 });
    store.write_summary(&summary, "accessions: 4\n").unwrap();

    let json_raw = fs::read_to_string(store.root().join(SUMMARY_JSON_NAME).as_std_path()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json_raw).unwrap();
    assert_eq!(parsed["accessions"], 4);
    assert_eq!(parsed["batches"], 2);

    let text = fs::read_to_string(store.root().join(SUMMARY_TEXT_NAME).as_std_path()).unwrap();
    assert_eq!(text, "accessions: 4\n");
}

#[test]
fn summary_overwrites_previous_run() {
    let temp = tempfile::tempdir().unwrap();
    let store = temp_store(&temp);
    store.ensure_root().unwrap();

    store
        .write_summary(&serde_json::json!({ "run": 1 }), "run 1\n")
        .unwrap();
    store
        .write_summary(&serde_json::json!({ "run": 2 }), "run 2\n")
        .unwrap();

    let parsed: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(store.root().join(SUMMARY_JSON_NAME).as_std_path()).unwrap(),
    )
    .unwrap();
    assert_eq!(parsed["run"], 2);
}
