//! Bulk ingestion of suppression exports
//!
//! Two formats are accepted:
//! - CSV with a header row holding an `email` column and/or one of the hash
//!   columns `md5`, `md5_hash`, `hash`
//! - plain text, one entry per line: a 32-hex digest or a raw address
//!
//! Blank, comment (`#`) and malformed lines are counted and skipped. Only an
//! unreadable source or an unusable CSV header fails the load.

use crate::core::hash_key::HashKey;
use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

const HASH_COLUMNS: [&str; 3] = ["md5", "md5_hash", "hash"];
const EMAIL_COLUMN: &str = "email";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestFormat {
    /// CSV when the file name ends in `.csv`, plain text otherwise
    #[default]
    Auto,
    Csv,
    Plain,
}

impl IngestFormat {
    pub fn resolve(self, path: &Path) -> IngestFormat {
        match self {
            IngestFormat::Auto => {
                let is_csv = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
                if is_csv {
                    IngestFormat::Csv
                } else {
                    IngestFormat::Plain
                }
            }
            other => other,
        }
    }
}

/// Parsed keys plus skip accounting. Duplicates are kept.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub keys: Vec<HashKey>,
    pub accepted: usize,
    pub blank: usize,
    pub comments: usize,
    pub malformed: usize,
}

impl IngestReport {
    fn accept(&mut self, key: HashKey) {
        self.keys.push(key);
        self.accepted += 1;
    }

    pub fn skipped(&self) -> usize {
        self.blank + self.comments + self.malformed
    }
}

/// Load a suppression export from disk
pub fn load_file(path: &Path, format: IngestFormat) -> Result<IngestReport, IngestError> {
    let format = format.resolve(path);
    let reader = BufReader::new(File::open(path)?);
    let report = match format {
        IngestFormat::Csv => parse_csv(reader)?,
        _ => parse_plain(reader)?,
    };
    info!(
        "Ingested {} ({:?}): {} accepted, {} blank, {} comments, {} malformed",
        path.display(),
        format,
        report.accepted,
        report.blank,
        report.comments,
        report.malformed
    );
    Ok(report)
}

/// Parse one entry: a hex digest, or anything containing `@` as an address
pub fn parse_entry(value: &str) -> Option<HashKey> {
    let value = value.trim();
    if value.contains('@') {
        return Some(HashKey::from_email(value));
    }
    HashKey::from_hex(value).ok()
}

/// Lines without their terminator; `None` for a line that is not valid UTF-8
fn decoded_lines<R: BufRead>(reader: R) -> impl Iterator<Item = io::Result<Option<String>>> {
    reader.split(b'\n').map(|bytes| {
        let mut bytes = bytes?;
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        Ok(String::from_utf8(bytes).ok())
    })
}

pub fn parse_plain<R: BufRead>(reader: R) -> Result<IngestReport, IngestError> {
    let mut report = IngestReport::default();
    for (line_no, line) in decoded_lines(reader).enumerate() {
        let Some(line) = line? else {
            debug!("Skipping undecodable line {}", line_no + 1);
            report.malformed += 1;
            continue;
        };
        let entry = line.trim();
        if entry.is_empty() {
            report.blank += 1;
        } else if entry.starts_with('#') {
            report.comments += 1;
        } else if let Some(key) = parse_entry(entry) {
            report.accept(key);
        } else {
            debug!("Skipping malformed line {}", line_no + 1);
            report.malformed += 1;
        }
    }
    Ok(report)
}

/// Column positions resolved from the CSV header
#[derive(Debug, Clone, Copy)]
struct CsvColumns {
    hash: Option<usize>,
    email: Option<usize>,
}

impl CsvColumns {
    fn from_header(header: &str) -> Result<Self, IngestError> {
        let names: Vec<String> = split_csv_line(header)
            .into_iter()
            .map(|name| name.trim().to_ascii_lowercase())
            .collect();
        let find = |wanted: &str| names.iter().position(|name| name == wanted);

        let columns = Self {
            hash: HASH_COLUMNS.iter().find_map(|name| find(*name)),
            email: find(EMAIL_COLUMN),
        };
        if columns.hash.is_none() && columns.email.is_none() {
            return Err(IngestError::MissingColumn {
                header: header.trim().to_string(),
            });
        }
        Ok(columns)
    }

    fn key_for(&self, fields: &[String]) -> Option<HashKey> {
        let cell = |idx: Option<usize>| idx.and_then(|i| fields.get(i)).map(|s| s.trim());

        if let Some(key) = cell(self.hash).and_then(|h| HashKey::from_hex(h).ok()) {
            return Some(key);
        }
        cell(self.email)
            .filter(|address| address.contains('@'))
            .map(HashKey::from_email)
    }
}

pub fn parse_csv<R: BufRead>(reader: R) -> Result<IngestReport, IngestError> {
    let mut report = IngestReport::default();
    let mut lines = decoded_lines(reader).enumerate();

    let columns = loop {
        match lines.next() {
            Some((line_no, line)) => {
                let Some(line) = line? else {
                    debug!("Skipping undecodable line {} before CSV header", line_no + 1);
                    report.malformed += 1;
                    continue;
                };
                if line.trim().is_empty() {
                    continue;
                }
                break CsvColumns::from_header(&line)?;
            }
            None => return Err(IngestError::MissingHeader),
        }
    };

    for (line_no, line) in lines {
        let Some(line) = line? else {
            debug!("Skipping undecodable CSV row {}", line_no + 1);
            report.malformed += 1;
            continue;
        };
        if line.trim().is_empty() {
            report.blank += 1;
            continue;
        }
        let fields = split_csv_line(&line);
        if fields
            .first()
            .is_some_and(|first| first.trim_start().starts_with('#'))
        {
            report.comments += 1;
            continue;
        }
        match columns.key_for(&fields) {
            Some(key) => report.accept(key),
            None => {
                debug!("Skipping malformed CSV row {}", line_no + 1);
                report.malformed += 1;
            }
        }
    }
    Ok(report)
}

/// Split one CSV record. Double-quoted fields may contain commas; `""`
/// inside quotes is a literal quote.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.trim_end_matches(['\r', '\n']).chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}
