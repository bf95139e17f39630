use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::debug;

use crate::domain::{AccessionId, SequenceFormat};
use crate::error::{RetrieverError, is_transient_reqwest};

pub const EUTILS_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
pub const TOOL_NAME: &str = "ncbi-retriever";

pub trait EntrezClient: Send + Sync {
    fn fetch_batch(
        &self,
        accessions: &[AccessionId],
        format: SequenceFormat,
    ) -> Result<String, RetrieverError>;
}

#[derive(Debug, Deserialize)]
struct EsearchEnvelope {
    esearchresult: EsearchResult,
}

#[derive(Debug, Deserialize)]
struct EsearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

#[derive(Clone)]
pub struct EntrezHttpClient {
    client: Client,
    base_url: String,
    email: String,
    api_key: Option<String>,
}

impl EntrezHttpClient {
    pub fn new(email: &str, timeout: Duration) -> Result<Self, RetrieverError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!(
                "{TOOL_NAME}/{} ({email})",
                env!("CARGO_PKG_VERSION")
            ))
            .map_err(|err| RetrieverError::EntrezHttp {
                message: err.to_string(),
                transient: false,
            })?,
        );

        let api_key = std::env::var("NCBI_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| RetrieverError::EntrezHttp {
                message: err.to_string(),
                transient: false,
            })?;

        Ok(Self {
            client,
            base_url: EUTILS_BASE_URL.to_string(),
            email: email.to_string(),
            api_key,
        })
    }

    fn send(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Response, RetrieverError> {
        let url = format!("{}/{endpoint}", self.base_url);
        let mut request = self.client.get(&url).query(params).query(&[
            ("tool", TOOL_NAME),
            ("email", self.email.as_str()),
        ]);
        if let Some(api_key) = &self.api_key {
            request = request.query(&[("api_key", api_key.as_str())]);
        }
        let response = request.send().map_err(|err| RetrieverError::EntrezHttp {
            message: err.to_string(),
            transient: is_transient_reqwest(&err),
        })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "NCBI request failed".to_string());
            return Err(RetrieverError::EntrezStatus { status, message });
        }
        Ok(response)
    }

    fn search_uids(&self, accessions: &[AccessionId]) -> Result<Vec<String>, RetrieverError> {
        let term = accessions
            .iter()
            .map(AccessionId::as_str)
            .collect::<Vec<_>>()
            .join(" OR ");
        let params = [
            ("db", "nucleotide".to_string()),
            ("term", term),
            ("retmode", "json".to_string()),
            ("retmax", accessions.len().to_string()),
        ];
        let response = self.send("esearch.fcgi", &params)?;
        let body = response.text().map_err(|err| RetrieverError::EntrezHttp {
            message: err.to_string(),
            transient: is_transient_reqwest(&err),
        })?;
        let uids = parse_esearch_uids(&body)?;
        debug!(uids = uids.len(), "esearch resolved");
        Ok(uids)
    }

    fn fetch_records(
        &self,
        uids: &[String],
        format: SequenceFormat,
    ) -> Result<String, RetrieverError> {
        let params = [
            ("db", "nucleotide".to_string()),
            ("id", uids.join(",")),
            ("rettype", format.rettype().to_string()),
            ("retmode", "text".to_string()),
        ];
        let response = self.send("efetch.fcgi", &params)?;
        let body = response.text().map_err(|err| RetrieverError::EntrezHttp {
            message: err.to_string(),
            transient: is_transient_reqwest(&err),
        })?;
        validate_efetch_body(&body)
    }
}

impl EntrezClient for EntrezHttpClient {
    fn fetch_batch(
        &self,
        accessions: &[AccessionId],
        format: SequenceFormat,
    ) -> Result<String, RetrieverError> {
        let uids = self.search_uids(accessions)?;
        self.fetch_records(&uids, format)
    }
}

pub fn parse_esearch_uids(body: &str) -> Result<Vec<String>, RetrieverError> {
    let envelope: EsearchEnvelope = serde_json::from_str(body).map_err(|err| {
        RetrieverError::MalformedResponse(format!("esearch reply is not the expected JSON: {err}"))
    })?;
    if envelope.esearchresult.idlist.is_empty() {
        return Err(RetrieverError::EmptyResult);
    }
    Ok(envelope.esearchresult.idlist)
}

pub fn validate_efetch_body(body: &str) -> Result<String, RetrieverError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(RetrieverError::EmptyResult);
    }
    if trimmed.starts_with("Error")
        || trimmed.contains("<ERROR>")
        || trimmed.contains("<error>")
    {
        let head: String = trimmed.chars().take(200).collect();
        return Err(RetrieverError::MalformedResponse(head));
    }
    Ok(trimmed.to_string())
}
