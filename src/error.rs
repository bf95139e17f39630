use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RetrieverError {
    #[error("input file not found: {0}")]
    #[diagnostic(help(
        "check the `input_file_path` value in config.yaml; relative paths resolve against the working directory"
    ))]
    InputNotFound(Utf8PathBuf),

    #[error("failed to read input file {path}: {message}")]
    InputRead { path: Utf8PathBuf, message: String },

    #[error("input file is empty: {0}")]
    #[diagnostic(help("the input file must list at least one accession ID"))]
    InputEmpty(Utf8PathBuf),

    #[error("no valid accession IDs found in {0}")]
    #[diagnostic(help(
        "accessions may contain letters, digits, underscores and dots (e.g. NM_000518.5); everything else was skipped"
    ))]
    NoValidAccessions(Utf8PathBuf),

    #[error("unsupported input format: {0}")]
    #[diagnostic(help("supported extensions: .txt, .csv, .xlsx, .docx"))]
    UnsupportedInputFormat(String),

    #[error("legacy .xls workbooks are not supported: {0}")]
    #[diagnostic(help("re-save the workbook as .xlsx or export it to .csv"))]
    LegacyWorkbook(Utf8PathBuf),

    #[error("invalid accession ID: {0}")]
    InvalidAccession(String),

    #[error("config file not found at {0}")]
    #[diagnostic(help(
        "create config.yaml in the working directory or pass --config <path>"
    ))]
    ConfigNotFound(Utf8PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse YAML config: {0}")]
    ConfigParse(String),

    #[error("missing required config key `{key}`")]
    #[diagnostic(help("add a line like `{key}: {example}` to config.yaml"))]
    MissingConfigKey {
        key: &'static str,
        example: &'static str,
    },

    #[error("invalid value for config key `{key}`: {reason}")]
    InvalidConfigValue { key: &'static str, reason: String },

    #[error("both download_genbank and download_fasta are disabled")]
    #[diagnostic(help("enable at least one of the two formats in config.yaml"))]
    NoFormatsEnabled,

    #[error("NCBI request failed: {message}")]
    EntrezHttp { message: String, transient: bool },

    #[error("NCBI returned status {status}: {message}")]
    EntrezStatus { status: u16, message: String },

    #[error("malformed NCBI response: {0}")]
    MalformedResponse(String),

    #[error("NCBI returned no records for the requested accessions")]
    EmptyResult,

    #[error("BLAST request failed: {message}")]
    BlastHttp { message: String, transient: bool },

    #[error("BLAST returned status {status}: {message}")]
    BlastStatus { status: u16, message: String },

    #[error("BLAST search did not complete: {0}")]
    BlastSearchFailed(String),

    #[error("malformed BLAST reply: {0}")]
    MalformedBlastReply(String),

    #[error("failed to create output directory {path}: {message}")]
    #[diagnostic(help("check that the `output_path` location is writable"))]
    OutputDir { path: Utf8PathBuf, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl RetrieverError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::EntrezHttp { transient, .. } | Self::BlastHttp { transient, .. } => *transient,
            Self::EntrezStatus { status, .. } | Self::BlastStatus { status, .. } => {
                is_transient_status(*status)
            }
            _ => false,
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InputNotFound(_)
            | Self::InputRead { .. }
            | Self::InputEmpty(_)
            | Self::NoValidAccessions(_)
            | Self::UnsupportedInputFormat(_)
            | Self::LegacyWorkbook(_)
            | Self::InvalidAccession(_)
            | Self::ConfigNotFound(_)
            | Self::ConfigRead(_)
            | Self::ConfigParse(_)
            | Self::MissingConfigKey { .. }
            | Self::InvalidConfigValue { .. }
            | Self::NoFormatsEnabled => 2,
            Self::EntrezHttp { .. }
            | Self::EntrezStatus { .. }
            | Self::MalformedResponse(_)
            | Self::EmptyResult
            | Self::BlastHttp { .. }
            | Self::BlastStatus { .. }
            | Self::BlastSearchFailed(_)
            | Self::MalformedBlastReply(_) => 3,
            Self::OutputDir { .. } | Self::Filesystem(_) => 1,
        }
    }
}

pub(crate) fn is_transient_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

pub(crate) fn is_transient_reqwest(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
