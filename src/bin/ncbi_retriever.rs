use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;

use ncbi_retriever::app::{App, RunSummary, verify_run};
use ncbi_retriever::config::ConfigLoader;
use ncbi_retriever::entrez::EntrezHttpClient;
use ncbi_retriever::error::RetrieverError;
use ncbi_retriever::fetch::ThreadSleeper;
use ncbi_retriever::logging;
use ncbi_retriever::output::{ConsoleSink, JsonOutput, OutputMode};
use ncbi_retriever::verify::{FileStatus, VerificationReport};

#[derive(Parser)]
#[command(name = "ncbi-retriever")]
#[command(about = "Batch-download GenBank and FASTA records from NCBI")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<Utf8PathBuf>,

    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Audit downloaded batch files against the input accession list")]
    Verify,
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
    let _guard = logging::init(logging::RETRIEVER_LOG_FILE);

    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Verify) => {
            let report = verify_run(&config)?;
            match output_mode {
                OutputMode::NonInteractive => {
                    JsonOutput::print_report(&report).into_diagnostic()?;
                }
                OutputMode::Interactive => print_verify_report(&report),
            }
            Ok(())
        }
        None => {
            let entrez = EntrezHttpClient::new(&config.email, config.request_timeout)?;
            let app = App::new(entrez, ThreadSleeper);
            match output_mode {
                OutputMode::NonInteractive => {
                    let summary = app.run(&config, &JsonOutput)?;
                    JsonOutput::print_summary(&summary).into_diagnostic()?;
                }
                OutputMode::Interactive => {
                    let summary = app.run(&config, &ConsoleSink)?;
                    print_run_summary(&summary);
                }
            }
            Ok(())
        }
    }
}

fn print_run_summary(summary: &RunSummary) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("{cyan}NCBI retrieval summary{reset}");
    println!(
        "{green}accessions: {} in {} batches (batch size {}){reset}",
        summary.accessions, summary.batches, summary.batch_size
    );
    for total in &summary.totals {
        println!(
            "{green}{}: {} files, {} records{reset}",
            total.format, total.files, total.records
        );
    }
    if summary.failures.is_empty() {
        println!("{green}failures: none{reset}");
    } else {
        println!("{yellow}failures: {}{reset}", summary.failures.len());
        for failure in &summary.failures {
            println!(
                "{red}  batch {} {} after {} attempt(s): {}{reset}",
                failure.batch, failure.format, failure.attempts, failure.error
            );
        }
    }
    println!("{cyan}output: {}{reset}", summary.output_dir);
    println!("{cyan}elapsed: {:.1} s{reset}", summary.elapsed_seconds);
}

fn print_verify_report(report: &VerificationReport) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("{cyan}Verification of {}{reset}", report.root);
    if !report.root_exists {
        println!("{red}output directory does not exist; run the retriever first{reset}");
    }
    for check in &report.checks {
        match &check.status {
            FileStatus::Ok { bytes, records } => {
                println!(
                    "{green}  {} ok ({records} records, {bytes} bytes){reset}",
                    check.file_name
                );
            }
            FileStatus::CountMismatch {
                bytes,
                records,
                expected,
            } => {
                println!(
                    "{yellow}  {} has {records} records, expected {expected} ({bytes} bytes){reset}",
                    check.file_name
                );
            }
            FileStatus::Empty => {
                println!("{red}  {} is empty{reset}", check.file_name);
            }
            FileStatus::Missing => {
                println!("{red}  {} is missing{reset}", check.file_name);
            }
        }
    }
    println!("{cyan}verdict: {}{reset}", report.verdict);
}
