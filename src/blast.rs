use std::fmt;
use std::fs;
use std::time::Duration;

use camino::Utf8Path;
use clap::ValueEnum;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RetrieverError, is_transient_reqwest};
use crate::extract::decode_xml_entities;
use crate::fetch::Sleeper;

pub const BLAST_BASE_URL: &str = "https://blast.ncbi.nlm.nih.gov/Blast.cgi";
pub const DEFAULT_RTOE_SECONDS: u64 = 15;
pub const POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const MAX_SEARCH_WAIT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BlastProgram {
    Blastn,
    Blastp,
    Blastx,
    Tblastn,
    Tblastx,
}

impl fmt::Display for BlastProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlastProgram::Blastn => write!(f, "blastn"),
            BlastProgram::Blastp => write!(f, "blastp"),
            BlastProgram::Blastx => write!(f, "blastx"),
            BlastProgram::Tblastn => write!(f, "tblastn"),
            BlastProgram::Tblastx => write!(f, "tblastx"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlastSubmission {
    pub rid: String,
    pub rtoe_seconds: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    Waiting,
    Ready,
    Failed,
    Unknown,
}

pub trait BlastClient: Send + Sync {
    fn submit(
        &self,
        program: BlastProgram,
        database: &str,
        query: &str,
    ) -> Result<BlastSubmission, RetrieverError>;
    fn poll_status(&self, rid: &str) -> Result<SearchStatus, RetrieverError>;
    fn retrieve_xml(&self, rid: &str) -> Result<String, RetrieverError>;
}

#[derive(Clone)]
pub struct QblastHttpClient {
    client: Client,
    base_url: String,
}

impl QblastHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, RetrieverError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("ncbi-retriever/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| RetrieverError::BlastHttp {
                    message: err.to_string(),
                    transient: false,
                })?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| RetrieverError::BlastHttp {
                message: err.to_string(),
                transient: false,
            })?;
        Ok(Self {
            client,
            base_url: BLAST_BASE_URL.to_string(),
        })
    }

    fn send_form(&self, params: &[(&str, &str)]) -> Result<String, RetrieverError> {
        let response = self
            .client
            .post(&self.base_url)
            .form(params)
            .send()
            .map_err(|err| RetrieverError::BlastHttp {
                message: err.to_string(),
                transient: is_transient_reqwest(&err),
            })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "BLAST request failed".to_string());
            return Err(RetrieverError::BlastStatus { status, message });
        }
        response.text().map_err(|err| RetrieverError::BlastHttp {
            message: err.to_string(),
            transient: is_transient_reqwest(&err),
        })
    }
}

impl BlastClient for QblastHttpClient {
    fn submit(
        &self,
        program: BlastProgram,
        database: &str,
        query: &str,
    ) -> Result<BlastSubmission, RetrieverError> {
        let program = program.to_string();
        let body = self.send_form(&[
            ("CMD", "Put"),
            ("PROGRAM", program.as_str()),
            ("DATABASE", database),
            ("QUERY", query),
        ])?;
        parse_put_reply(&body)
    }

    fn poll_status(&self, rid: &str) -> Result<SearchStatus, RetrieverError> {
        let body = self.send_form(&[
            ("CMD", "Get"),
            ("RID", rid),
            ("FORMAT_OBJECT", "SearchInfo"),
        ])?;
        parse_search_info(&body)
    }

    fn retrieve_xml(&self, rid: &str) -> Result<String, RetrieverError> {
        self.send_form(&[("CMD", "Get"), ("RID", rid), ("FORMAT_TYPE", "XML")])
    }
}

pub fn parse_put_reply(body: &str) -> Result<BlastSubmission, RetrieverError> {
    let rid_re = Regex::new(r"RID = (\S+)").unwrap();
    let rtoe_re = Regex::new(r"RTOE = (\d+)").unwrap();

    let rid = rid_re
        .captures(body)
        .map(|capture| capture[1].to_string())
        .ok_or_else(|| {
            let head: String = body.chars().take(200).collect();
            RetrieverError::MalformedBlastReply(format!("no RID in submission reply: {head}"))
        })?;
    let rtoe_seconds = rtoe_re
        .captures(body)
        .and_then(|capture| capture[1].parse().ok());
    Ok(BlastSubmission { rid, rtoe_seconds })
}

pub fn parse_search_info(body: &str) -> Result<SearchStatus, RetrieverError> {
    let status_re = Regex::new(r"Status=(\w+)").unwrap();
    let status = status_re
        .captures(body)
        .map(|capture| capture[1].to_string())
        .ok_or_else(|| {
            RetrieverError::MalformedBlastReply("no Status in SearchInfo reply".to_string())
        })?;
    match status.as_str() {
        "WAITING" => Ok(SearchStatus::Waiting),
        "READY" => Ok(SearchStatus::Ready),
        "FAILED" => Ok(SearchStatus::Failed),
        "UNKNOWN" => Ok(SearchStatus::Unknown),
        other => Err(RetrieverError::MalformedBlastReply(format!(
            "unrecognized search status {other}"
        ))),
    }
}

pub fn run_search<C: BlastClient, S: Sleeper>(
    client: &C,
    sleeper: &S,
    program: BlastProgram,
    database: &str,
    query: &str,
) -> Result<Vec<BlastRecord>, RetrieverError> {
    let submission = client.submit(program, database, query)?;
    let head_start = Duration::from_secs(
        submission.rtoe_seconds.unwrap_or(DEFAULT_RTOE_SECONDS),
    );
    info!(
        rid = %submission.rid,
        rtoe_seconds = head_start.as_secs(),
        %program,
        database,
        "BLAST search submitted"
    );

    sleeper.sleep(head_start);
    let mut waited = head_start;
    loop {
        match client.poll_status(&submission.rid)? {
            SearchStatus::Ready => break,
            SearchStatus::Waiting => {
                if waited >= MAX_SEARCH_WAIT {
                    return Err(RetrieverError::BlastSearchFailed(format!(
                        "search {} still running after {} seconds",
                        submission.rid,
                        waited.as_secs()
                    )));
                }
                debug!(rid = %submission.rid, waited_seconds = waited.as_secs(), "search still running");
                sleeper.sleep(POLL_INTERVAL);
                waited += POLL_INTERVAL;
            }
            SearchStatus::Failed => {
                return Err(RetrieverError::BlastSearchFailed(format!(
                    "search {} failed on the server",
                    submission.rid
                )));
            }
            SearchStatus::Unknown => {
                return Err(RetrieverError::BlastSearchFailed(format!(
                    "search {} expired or was never submitted",
                    submission.rid
                )));
            }
        }
    }

    info!(rid = %submission.rid, "BLAST search ready, retrieving results");
    let xml = client.retrieve_xml(&submission.rid)?;
    parse_blast_xml(&xml)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Hsp {
    pub align_length: Option<u64>,
    pub bits: Option<f64>,
    pub expect: Option<f64>,
    pub frame: (Option<i64>, Option<i64>),
    pub gaps: Option<u64>,
    pub identities: Option<u64>,
    pub positives: Option<u64>,
    pub query: String,
    pub query_end: Option<u64>,
    pub query_start: Option<u64>,
    pub sbjct: String,
    pub sbjct_end: Option<u64>,
    pub sbjct_start: Option<u64>,
    pub score: Option<f64>,
    pub strand: (Option<String>, Option<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BlastAlignment {
    pub title: String,
    pub hit_id: String,
    pub hit_def: String,
    pub length: Option<u64>,
    pub hsps: Vec<Hsp>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BlastRecord {
    pub query: String,
    pub query_id: String,
    pub alignments: Vec<BlastAlignment>,
}

pub fn parse_blast_xml(xml: &str) -> Result<Vec<BlastRecord>, RetrieverError> {
    if !xml.contains("<BlastOutput") {
        let head: String = xml.chars().take(200).collect();
        return Err(RetrieverError::MalformedBlastReply(format!(
            "reply is not BLAST XML: {head}"
        )));
    }

    let mut default_query = String::new();
    let mut default_query_id = String::new();
    let mut records = Vec::new();
    let mut record: Option<BlastRecord> = None;
    let mut alignment: Option<BlastAlignment> = None;
    let mut hsp: Option<Hsp> = None;

    for line in xml.lines() {
        match line.trim() {
            "<Iteration>" => {
                record = Some(BlastRecord {
                    query: default_query.clone(),
                    query_id: default_query_id.clone(),
                    alignments: Vec::new(),
                });
                continue;
            }
            "</Iteration>" => {
                if let Some(record) = record.take() {
                    records.push(record);
                }
                continue;
            }
            "<Hit>" => {
                alignment = Some(BlastAlignment::default());
                continue;
            }
            "</Hit>" => {
                if let (Some(mut hit), Some(record)) = (alignment.take(), record.as_mut()) {
                    hit.title = format!("{} {}", hit.hit_id, hit.hit_def);
                    record.alignments.push(hit);
                }
                continue;
            }
            "<Hsp>" => {
                hsp = Some(Hsp::default());
                continue;
            }
            "</Hsp>" => {
                if let (Some(hsp), Some(alignment)) = (hsp.take(), alignment.as_mut()) {
                    alignment.hsps.push(hsp);
                }
                continue;
            }
            _ => {}
        }

        let Some((tag, value)) = parse_tag_line(line) else {
            continue;
        };
        let text = decode_xml_entities(value);

        if let Some(hsp) = hsp.as_mut() {
            match tag {
                "Hsp_align-len" => hsp.align_length = text.parse().ok(),
                "Hsp_bit-score" => hsp.bits = text.parse().ok(),
                "Hsp_evalue" => hsp.expect = text.parse().ok(),
                "Hsp_query-frame" => hsp.frame.0 = text.parse().ok(),
                "Hsp_hit-frame" => hsp.frame.1 = text.parse().ok(),
                "Hsp_gaps" => hsp.gaps = text.parse().ok(),
                "Hsp_identity" => hsp.identities = text.parse().ok(),
                "Hsp_positive" => hsp.positives = text.parse().ok(),
                "Hsp_qseq" => hsp.query = text,
                "Hsp_query-to" => hsp.query_end = text.parse().ok(),
                "Hsp_query-from" => hsp.query_start = text.parse().ok(),
                "Hsp_hseq" => hsp.sbjct = text,
                "Hsp_hit-to" => hsp.sbjct_end = text.parse().ok(),
                "Hsp_hit-from" => hsp.sbjct_start = text.parse().ok(),
                "Hsp_score" => hsp.score = text.parse().ok(),
                _ => {}
            }
            continue;
        }

        if let Some(alignment) = alignment.as_mut() {
            match tag {
                "Hit_id" => alignment.hit_id = text,
                "Hit_def" => alignment.hit_def = text,
                "Hit_len" => alignment.length = text.parse().ok(),
                _ => {}
            }
            continue;
        }

        match tag {
            "BlastOutput_query-def" => default_query = text,
            "BlastOutput_query-ID" => default_query_id = text,
            "Iteration_query-def" => {
                if let Some(record) = record.as_mut() {
                    record.query = text;
                }
            }
            "Iteration_query-ID" => {
                if let Some(record) = record.as_mut() {
                    record.query_id = text;
                }
            }
            _ => {}
        }
    }

    Ok(records)
}

fn parse_tag_line(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    let rest = trimmed.strip_prefix('<')?;
    let (name, after) = rest.split_once('>')?;
    if name.starts_with('/') || name.ends_with('/') || name.contains(' ') {
        return None;
    }
    let (value, closing) = after.rsplit_once("</")?;
    let closing_name = closing.strip_suffix('>')?;
    if closing_name != name {
        return None;
    }
    Some((name, value))
}

pub fn first_fasta_sequence(path: &Utf8Path) -> Result<String, RetrieverError> {
    if !path.exists() {
        return Err(RetrieverError::InputNotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path.as_std_path()).map_err(|err| {
        RetrieverError::InputRead {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    })?;

    let mut in_record = false;
    let mut sequence = String::new();
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('>') {
            if in_record {
                break;
            }
            in_record = true;
            continue;
        }
        if in_record {
            sequence.push_str(line);
        }
    }

    if !in_record {
        return Err(RetrieverError::InputRead {
            path: path.to_path_buf(),
            message: "no FASTA records found".to_string(),
        });
    }
    Ok(sequence)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn put_reply_parses_rid_and_rtoe() {
        let body = "<!--QBlastInfoBegin\n    RID = 8AXW2Y5W013\n    RTOE = 28\nQBlastInfoEnd\n-->";
        let submission = parse_put_reply(body).unwrap();
        assert_eq!(submission.rid, "8AXW2Y5W013");
        assert_eq!(submission.rtoe_seconds, Some(28));
    }

    #[test]
    fn put_reply_without_rid() {
        let err = parse_put_reply("<html>maintenance window</html>").unwrap_err();
        assert_matches!(err, RetrieverError::MalformedBlastReply(_));
    }

    #[test]
    fn search_info_statuses() {
        let body = "QBlastInfoBegin\n\tStatus=WAITING\nQBlastInfoEnd";
        assert_eq!(parse_search_info(body).unwrap(), SearchStatus::Waiting);
        let body = "QBlastInfoBegin\n\tStatus=READY\nThereAreHits=yes\nQBlastInfoEnd";
        assert_eq!(parse_search_info(body).unwrap(), SearchStatus::Ready);
        assert_matches!(
            parse_search_info("nothing useful"),
            Err(RetrieverError::MalformedBlastReply(_))
        );
    }

    #[test]
    fn tag_lines() {
        assert_eq!(
            parse_tag_line("  <Hit_len>628</Hit_len>"),
            Some(("Hit_len", "628"))
        );
        assert_eq!(parse_tag_line("<Hit>"), None);
        assert_eq!(parse_tag_line("</Hit>"), None);
        assert_eq!(parse_tag_line("plain text"), None);
    }
}
