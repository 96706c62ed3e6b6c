//! Event-log data model and delimited-file loading.

use std::fs;
use std::path::Path;

use csv::StringRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

const MIN_COLUMNS: usize = 3;

/// One purchase: who, when (`YYYYMMDD`), how much.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event<C> {
    pub customer_id: C,
    pub date: u32,
    pub sales: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElogCsvConfig {
    pub delimiter: u8,
    pub has_headers: bool,
}

impl Default for ElogCsvConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_headers: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ElogLoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("event record has {found} columns, expected at least {expected}")]
    InvalidRecordColumns { found: usize, expected: usize },
    #[error("failed to parse field {field} value '{value}'")]
    ParseField { field: &'static str, value: String },
}

/// Reads a delimited transaction log into events.
///
/// Records need at least three columns: customer id first, event date
/// second, and sales last. Extra middle columns (e.g. the transaction count
/// in CDNOW-style `cid date count sales` files) are ignored. Date validity
/// beyond being numeric is checked by the transform, not here.
pub fn load_event_log(
    path: &Path,
    cfg: &ElogCsvConfig,
) -> Result<Vec<Event<u64>>, ElogLoadError> {
    info!(
        component = "elog",
        event = "elog.load.start",
        path = %path.display(),
        has_headers = cfg.has_headers
    );

    let file = fs::File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(cfg.delimiter)
        .has_headers(cfg.has_headers)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut events = Vec::new();
    for record in reader.records() {
        let record = record?;
        events.push(parse_event_record(&record)?);
    }

    info!(
        component = "elog",
        event = "elog.load.finish",
        path = %path.display(),
        rows = events.len()
    );

    Ok(events)
}

fn parse_event_record(record: &StringRecord) -> Result<Event<u64>, ElogLoadError> {
    if record.len() < MIN_COLUMNS {
        return Err(ElogLoadError::InvalidRecordColumns {
            found: record.len(),
            expected: MIN_COLUMNS,
        });
    }

    Ok(Event {
        customer_id: parse_u64(record, 0, "customer_id")?,
        date: parse_u32(record, 1, "date")?,
        sales: parse_f64(record, record.len() - 1, "sales")?,
    })
}

fn parse_u64(
    record: &StringRecord,
    idx: usize,
    field: &'static str,
) -> Result<u64, ElogLoadError> {
    let raw = record.get(idx).unwrap_or_default();
    raw.parse::<u64>().map_err(|_| ElogLoadError::ParseField {
        field,
        value: raw.to_string(),
    })
}

fn parse_u32(
    record: &StringRecord,
    idx: usize,
    field: &'static str,
) -> Result<u32, ElogLoadError> {
    let raw = record.get(idx).unwrap_or_default();
    raw.parse::<u32>().map_err(|_| ElogLoadError::ParseField {
        field,
        value: raw.to_string(),
    })
}

fn parse_f64(
    record: &StringRecord,
    idx: usize,
    field: &'static str,
) -> Result<f64, ElogLoadError> {
    let raw = record.get(idx).unwrap_or_default();
    raw.parse::<f64>().map_err(|_| ElogLoadError::ParseField {
        field,
        value: raw.to_string(),
    })
}
