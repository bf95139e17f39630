use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing::info;

use ncbi_retriever::blast::{BlastProgram, QblastHttpClient, first_fasta_sequence, run_search};
use ncbi_retriever::error::RetrieverError;
use ncbi_retriever::fetch::ThreadSleeper;
use ncbi_retriever::logging;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "blast-runner")]
#[command(about = "Run an NCBI BLAST search and save the results as JSON")]
#[command(version, author)]
struct Cli {
    #[arg(long, group = "query")]
    sequence: Option<String>,

    #[arg(long, group = "query")]
    fasta: Option<Utf8PathBuf>,

    #[arg(long, group = "query")]
    accession: Option<String>,

    #[arg(long, value_enum, default_value_t = BlastProgram::Blastn)]
    program: BlastProgram,

    #[arg(long, default_value = "nr")]
    database: String,

    #[arg(long, default_value = "blast_results.json")]
    out: Utf8PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<RetrieverError>() {
            return ExitCode::from(error.exit_code());
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init(logging::BLAST_LOG_FILE);

    let query = resolve_query(&cli)?;
    let preview: String = query.chars().take(20).collect();
    println!(
        "Running {} against {} with query '{preview}...'",
        cli.program, cli.database
    );

    let client = QblastHttpClient::new(REQUEST_TIMEOUT)?;
    let records = run_search(&client, &ThreadSleeper, cli.program, &cli.database, &query)?;

    let json = serde_json::to_string_pretty(&records).into_diagnostic()?;
    std::fs::write(cli.out.as_std_path(), json).into_diagnostic()?;

    let alignments: usize = records.iter().map(|record| record.alignments.len()).sum();
    info!(
        records = records.len(),
        alignments,
        out = %cli.out,
        "BLAST results saved"
    );
    println!(
        "BLAST results written to: {} ({} record(s), {} alignment(s))",
        cli.out,
        records.len(),
        alignments
    );
    Ok(())
}

fn resolve_query(cli: &Cli) -> miette::Result<String> {
    if let Some(sequence) = &cli.sequence {
        return Ok(sequence.trim().to_string());
    }
    if let Some(path) = &cli.fasta {
        return Ok(first_fasta_sequence(path)?);
    }
    if let Some(accession) = &cli.accession {
        return Ok(accession.trim().to_string());
    }
    prompt_query()
}

fn prompt_query() -> miette::Result<String> {
    println!("Choose the query type:");
    println!("1. Enter sequence directly");
    println!("2. Provide a FASTA file");
    println!("3. Enter an NCBI accession ID");

    loop {
        let choice = read_line("Enter your choice (1, 2, or 3): ")?;
        match choice.as_str() {
            "1" => {
                let sequence = read_line("Enter the query sequence: ")?;
                if !sequence.is_empty() {
                    return Ok(sequence);
                }
                println!("Empty sequence, try again.");
            }
            "2" => {
                let path = Utf8PathBuf::from(read_line("Enter the path to the FASTA file: ")?);
                match first_fasta_sequence(&path) {
                    Ok(sequence) => return Ok(sequence),
                    Err(err) => println!("{err}"),
                }
            }
            "3" => {
                let accession = read_line("Enter the NCBI accession ID: ")?;
                if !accession.is_empty() {
                    return Ok(accession);
                }
                println!("Empty accession, try again.");
            }
            _ => println!("Invalid choice."),
        }
    }
}

fn read_line(prompt: &str) -> miette::Result<String> {
    print!("{prompt}");
    io::stdout().flush().into_diagnostic()?;
    let mut line = String::new();
    let bytes = io::stdin().read_line(&mut line).into_diagnostic()?;
    if bytes == 0 {
        return Err(miette::Report::msg("standard input closed"));
    }
    Ok(line.trim().to_string())
}
