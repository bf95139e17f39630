use std::collections::HashSet;
use std::fs;
use std::io::Read;

use camino::Utf8Path;
use regex::Regex;
use tracing::{info, warn};
use zip::ZipArchive;

use crate::domain::AccessionId;
use crate::error::RetrieverError;

const HEADER_LABELS: [&str; 5] = ["accession", "accession_id", "id", "acc", "sequence_id"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Text,
    Csv,
    Workbook,
    WordDocument,
}

impl InputFormat {
    pub fn from_path(path: &Utf8Path) -> Result<Self, RetrieverError> {
        let extension = path.extension().unwrap_or("").to_ascii_lowercase();
        match extension.as_str() {
            "txt" => Ok(InputFormat::Text),
            "csv" => Ok(InputFormat::Csv),
            "xlsx" => Ok(InputFormat::Workbook),
            "docx" => Ok(InputFormat::WordDocument),
            "xls" => Err(RetrieverError::LegacyWorkbook(path.to_path_buf())),
            _ => Err(RetrieverError::UnsupportedInputFormat(path.to_string())),
        }
    }
}

pub fn extract_accessions(path: &Utf8Path) -> Result<Vec<AccessionId>, RetrieverError> {
    if !path.exists() {
        return Err(RetrieverError::InputNotFound(path.to_path_buf()));
    }
    let metadata = fs::metadata(path).map_err(|err| RetrieverError::InputRead {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    if metadata.len() == 0 {
        return Err(RetrieverError::InputEmpty(path.to_path_buf()));
    }

    let format = InputFormat::from_path(path)?;
    info!(input = %path, ?format, bytes = metadata.len(), "reading accession IDs");

    let candidates = match format {
        InputFormat::Text => harvest_text(&read_input(path)?),
        InputFormat::Csv => harvest_csv(&read_input(path)?),
        InputFormat::Workbook => harvest_workbook(path)?,
        InputFormat::WordDocument => harvest_document(path)?,
    };

    clean_candidates(path, candidates)
}

fn read_input(path: &Utf8Path) -> Result<String, RetrieverError> {
    fs::read_to_string(path).map_err(|err| RetrieverError::InputRead {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn harvest_text(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn harvest_csv(content: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    for row in parse_csv(content) {
        for cell in row {
            let cell = cell.trim();
            if cell.is_empty() || is_header_label(cell) {
                continue;
            }
            candidates.push(cell.to_string());
        }
    }
    candidates
}

fn parse_csv(content: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    cell.push('"');
                }
                '"' => in_quotes = false,
                _ => cell.push(ch),
            }
            continue;
        }
        match ch {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut cell)),
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut cell));
                rows.push(std::mem::take(&mut row));
            }
            _ => cell.push(ch),
        }
    }
    if !cell.is_empty() || !row.is_empty() {
        row.push(cell);
        rows.push(row);
    }
    rows
}

fn harvest_workbook(path: &Utf8Path) -> Result<Vec<String>, RetrieverError> {
    let mut archive = open_archive(path)?;

    let shared_strings = match read_archive_entry(&mut archive, path, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml),
        None => Vec::new(),
    };

    let sheet_name = first_sheet_name(&mut archive);
    let sheet_xml = match sheet_name {
        Some(name) => read_archive_entry(&mut archive, path, &name)?,
        None => None,
    };
    let sheet_xml = sheet_xml.ok_or_else(|| RetrieverError::InputRead {
        path: path.to_path_buf(),
        message: "workbook contains no worksheets".to_string(),
    })?;

    let mut candidates = Vec::new();
    for value in parse_sheet_cells(&sheet_xml, &shared_strings) {
        let value = value.trim();
        if value.is_empty() || is_header_label(value) {
            continue;
        }
        candidates.push(value.to_string());
    }
    Ok(candidates)
}

fn first_sheet_name(archive: &mut ZipArchive<fs::File>) -> Option<String> {
    if archive.by_name("xl/worksheets/sheet1.xml").is_ok() {
        return Some("xl/worksheets/sheet1.xml".to_string());
    }
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|name| name.starts_with("xl/worksheets/sheet") && name.ends_with(".xml"))
        .map(str::to_string)
        .collect();
    names.sort();
    names.into_iter().next()
}

fn parse_shared_strings(xml: &str) -> Vec<String> {
    let text_re = Regex::new(r"(?s)<t[^>]*>(.*?)</t>").unwrap();
    xml.split("</si>")
        .filter(|chunk| chunk.contains("<si"))
        .map(|chunk| {
            let mut value = String::new();
            for capture in text_re.captures_iter(chunk) {
                value.push_str(&capture[1]);
            }
            decode_xml_entities(&value)
        })
        .collect()
}

fn parse_sheet_cells(xml: &str, shared_strings: &[String]) -> Vec<String> {
    let empty_cell_re = Regex::new(r"<c [^>]*/>").unwrap();
    let cell_re = Regex::new(r#"(?s)<c ([^>]*)>(.*?)</c>"#).unwrap();
    let type_re = Regex::new(r#"t="([^"]+)""#).unwrap();
    let value_re = Regex::new(r"(?s)<v[^>]*>(.*?)</v>").unwrap();
    let inline_re = Regex::new(r"(?s)<is>.*?<t[^>]*>(.*?)</t>").unwrap();

    let xml = empty_cell_re.replace_all(xml, "");
    let mut values = Vec::new();
    for capture in cell_re.captures_iter(&xml) {
        let attrs = &capture[1];
        let body = &capture[2];
        let cell_type = type_re
            .captures(attrs)
            .map(|m| m[1].to_string())
            .unwrap_or_default();

        let value = if cell_type == "s" {
            value_re
                .captures(body)
                .and_then(|m| m[1].trim().parse::<usize>().ok())
                .and_then(|index| shared_strings.get(index).cloned())
        } else if cell_type == "inlineStr" {
            inline_re
                .captures(body)
                .map(|m| decode_xml_entities(&m[1]))
        } else {
            value_re.captures(body).map(|m| decode_xml_entities(&m[1]))
        };

        if let Some(value) = value {
            values.push(value);
        }
    }
    values
}

fn harvest_document(path: &Utf8Path) -> Result<Vec<String>, RetrieverError> {
    let mut archive = open_archive(path)?;
    let document = read_archive_entry(&mut archive, path, "word/document.xml")?.ok_or_else(
        || RetrieverError::InputRead {
            path: path.to_path_buf(),
            message: "document contains no word/document.xml".to_string(),
        },
    )?;

    let run_re = Regex::new(r"(?s)<w:t[^>]*>(.*?)</w:t>|<w:br\s*/>").unwrap();
    let mut candidates = Vec::new();
    for paragraph in document.split("</w:p>") {
        let mut text = String::new();
        for capture in run_re.captures_iter(paragraph) {
            match capture.get(1) {
                Some(run) => text.push_str(run.as_str()),
                None => text.push('\n'),
            }
        }
        let text = decode_xml_entities(&text);
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            candidates.push(line.to_string());
        }
    }
    Ok(candidates)
}

fn open_archive(path: &Utf8Path) -> Result<ZipArchive<fs::File>, RetrieverError> {
    let file = fs::File::open(path).map_err(|err| RetrieverError::InputRead {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    ZipArchive::new(file).map_err(|err| RetrieverError::InputRead {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn read_archive_entry(
    archive: &mut ZipArchive<fs::File>,
    path: &Utf8Path,
    name: &str,
) -> Result<Option<String>, RetrieverError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(err) => {
            return Err(RetrieverError::InputRead {
                path: path.to_path_buf(),
                message: err.to_string(),
            });
        }
    };
    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .map_err(|err| RetrieverError::InputRead {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    Ok(Some(content))
}

pub(crate) fn decode_xml_entities(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn is_header_label(value: &str) -> bool {
    let lowered = value.to_ascii_lowercase();
    HEADER_LABELS.contains(&lowered.as_str())
}

fn clean_candidates(
    path: &Utf8Path,
    candidates: Vec<String>,
) -> Result<Vec<AccessionId>, RetrieverError> {
    let mut seen = HashSet::new();
    let mut accessions = Vec::new();
    for candidate in candidates {
        match candidate.parse::<AccessionId>() {
            Ok(accession) => {
                if seen.insert(accession.clone()) {
                    accessions.push(accession);
                }
            }
            Err(_) => warn!(candidate = %candidate, "skipping invalid accession ID"),
        }
    }
    if accessions.is_empty() {
        return Err(RetrieverError::NoValidAccessions(path.to_path_buf()));
    }
    info!(count = accessions.len(), "found unique accession IDs");
    Ok(accessions)
}
