use std::fs;

use camino::Utf8PathBuf;

use ncbi_retriever::domain::{AccessionId, SequenceFormat};
use ncbi_retriever::fetch::partition_batches;
use ncbi_retriever::verify::{FileStatus, Verdict, verify};

fn accessions(count: usize) -> Vec<AccessionId> {
    (1..=count)
        .map(|i| format!("NM_{i:06}").parse().unwrap())
        .collect()
}

fn genbank_records(count: usize) -> String {
    (0..count)
        .map(|i| format!("LOCUS       NM_{i:06}  4 bp\nORIGIN\n//\n"))
        .collect()
}

fn fasta_records(count: usize) -> String {
    (0..count)
        .map(|i| format!(">NM_{i:06}\nACGT\n"))
        .collect()
}

#[test]
fn missing_root_reports_nothing_downloaded() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("absent")).unwrap();
    let batches = partition_batches(&accessions(4), 2);

    let report = verify(&root, &batches, &[SequenceFormat::Genbank]);

    assert!(!report.root_exists);
    assert_eq!(report.checks.len(), 2);
    assert!(
        report
            .checks
            .iter()
            .all(|check| check.status == FileStatus::Missing)
    );
    assert_eq!(report.verdict, Verdict::NothingDownloaded);
}

#[test]
fn complete_run_verifies_clean() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    fs::write(
        root.join("batch_1_genbank.genbank").as_std_path(),
        genbank_records(2),
    )
    .unwrap();
    fs::write(
        root.join("batch_1_fasta.fasta").as_std_path(),
        fasta_records(2),
    )
    .unwrap();

    let batches = partition_batches(&accessions(2), 2);
    let formats = [SequenceFormat::Genbank, SequenceFormat::Fasta];
    let report = verify(&root, &batches, &formats);

    assert_eq!(report.verdict, Verdict::Complete);
    assert!(
        report
            .checks
            .iter()
            .all(|check| matches!(check.status, FileStatus::Ok { records: 2, .. }))
    );
}

#[test]
fn partial_run_flags_each_discrepancy() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    fs::write(
        root.join("batch_1_genbank.genbank").as_std_path(),
        genbank_records(2),
    )
    .unwrap();
    fs::write(
        root.join("batch_1_fasta.fasta").as_std_path(),
        fasta_records(1),
    )
    .unwrap();
    fs::write(root.join("batch_2_fasta.fasta").as_std_path(), "").unwrap();

    let batches = partition_batches(&accessions(4), 2);
    let formats = [SequenceFormat::Genbank, SequenceFormat::Fasta];
    let report = verify(&root, &batches, &formats);

    assert_eq!(report.verdict, Verdict::Partial);
    let status_of = |name: &str| {
        report
            .checks
            .iter()
            .find(|check| check.file_name == name)
            .map(|check| check.status.clone())
            .unwrap()
    };
    assert!(matches!(
        status_of("batch_1_genbank.genbank"),
        FileStatus::Ok { records: 2, .. }
    ));
    assert!(matches!(
        status_of("batch_1_fasta.fasta"),
        FileStatus::CountMismatch {
            records: 1,
            expected: 2,
            ..
        }
    ));
    assert_eq!(status_of("batch_2_genbank.genbank"), FileStatus::Missing);
    assert_eq!(status_of("batch_2_fasta.fasta"), FileStatus::Empty);
}

#[test]
fn verification_is_idempotent() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    fs::write(
        root.join("batch_1_fasta.fasta").as_std_path(),
        fasta_records(3),
    )
    .unwrap();

    let batches = partition_batches(&accessions(3), 3);
    let formats = [SequenceFormat::Fasta];

    let first = verify(&root, &batches, &formats);
    let second = verify(&root, &batches, &formats);
    assert_eq!(first, second);
}
