use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RetrieverError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceFormat {
    Genbank,
    Fasta,
}

impl SequenceFormat {
    pub fn rettype(self) -> &'static str {
        match self {
            SequenceFormat::Genbank => "gb",
            SequenceFormat::Fasta => "fasta",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            SequenceFormat::Genbank => "genbank",
            SequenceFormat::Fasta => "fasta",
        }
    }

    pub fn count_records(self, body: &str) -> usize {
        match self {
            SequenceFormat::Genbank => body
                .lines()
                .filter(|line| line.starts_with("LOCUS"))
                .count(),
            SequenceFormat::Fasta => body.lines().filter(|line| line.starts_with('>')).count(),
        }
    }
}

impl fmt::Display for SequenceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceFormat::Genbank => write!(f, "genbank"),
            SequenceFormat::Fasta => write!(f, "fasta"),
        }
    }
}

const LABEL_PREFIXES: [&str; 3] = ["Accession:", "ACC:", "ID:"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessionId(String);

impl AccessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccessionId {
    type Err = RetrieverError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut normalized = value.trim();
        for prefix in LABEL_PREFIXES {
            if let Some(rest) = normalized.strip_prefix(prefix) {
                normalized = rest.trim();
            }
        }
        let charset_ok = normalized
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.');
        let has_substance = normalized.chars().any(|ch| ch.is_ascii_alphanumeric());
        if !charset_ok || !has_substance {
            return Err(RetrieverError::InvalidAccession(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub number: usize,
    pub accessions: Vec<AccessionId>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.accessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessions.is_empty()
    }
}
