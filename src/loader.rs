use std::io::Cursor;
use std::time::Duration;

use calamine::{Data, Reader};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::models::{Cell, RawTable};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

pub struct Loader {
    client: reqwest::Client,
}

impl Loader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(30)))
            .build()
            .map_err(|e| {
                PipelineError::SourceUnavailable(format!("http client setup failed: {e}"))
            })?;
        Ok(Self { client })
    }

    /// Fetches `source` and parses it into a table. `http(s)://` references
    /// are downloaded, anything else is read as a local path.
    pub async fn load(&self, source: &str) -> Result<RawTable> {
        let bytes = self.fetch(source).await?;
        info!("loader: fetched {} bytes from {}", bytes.len(), source);
        let table = parse_bytes(&bytes)?;
        info!(
            "loader: parsed {} rows across {} columns",
            table.rows.len(),
            table.columns.len()
        );
        Ok(table)
    }

    async fn fetch(&self, source: &str) -> Result<Vec<u8>> {
        if !is_remote(source) {
            return tokio::fs::read(source).await.map_err(|e| {
                PipelineError::SourceUnavailable(format!("cannot read {source}: {e}"))
            });
        }

        let response = self
            .client
            .get(source)
            .send()
            .await
            .map_err(|e| PipelineError::SourceUnavailable(format!("GET {source} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::SourceUnavailable(format!(
                "GET {source} returned {status}"
            )));
        }

        let body = response.bytes().await.map_err(|e| {
            PipelineError::SourceUnavailable(format!("reading body of {source} failed: {e}"))
        })?;
        Ok(body.to_vec())
    }
}

fn is_remote(source: &str) -> bool {
    let lower = source.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Workbooks (xlsx/xls) are recognised by their container signature;
/// everything else must be a UTF-8 CSV export.
pub fn parse_bytes(bytes: &[u8]) -> Result<RawTable> {
    if bytes.is_empty() {
        return Err(PipelineError::Parse("source is empty".to_string()));
    }

    if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) {
        parse_workbook(bytes)
    } else {
        parse_csv(bytes)
    }
}

fn parse_workbook(bytes: &[u8]) -> Result<RawTable> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| PipelineError::Parse(format!("invalid workbook: {e}")))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| PipelineError::Parse("workbook has no worksheets".to_string()))?
        .map_err(|e| PipelineError::Parse(format!("unreadable worksheet: {e}")))?;

    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| PipelineError::Parse("worksheet has no header row".to_string()))?;
    let columns: Vec<String> = header.iter().map(|cell| cell.to_string()).collect();

    let rows = rows
        .map(|row| row.iter().map(workbook_cell).collect())
        .collect();

    Ok(RawTable::new(columns, rows))
}

fn workbook_cell(cell: &Data) -> Cell {
    match cell {
        Data::Int(value) => Cell::Number(*value as f64),
        Data::Float(value) => Cell::Number(*value),
        Data::String(value) | Data::DateTimeIso(value) | Data::DurationIso(value) => {
            text_cell(value)
        }
        Data::Bool(value) => Cell::Bool(*value),
        Data::DateTime(value) => value
            .as_datetime()
            .map(Cell::DateTime)
            .unwrap_or(Cell::Empty),
        Data::Error(_) | Data::Empty => Cell::Empty,
    }
}

fn parse_csv(bytes: &[u8]) -> Result<RawTable> {
    if bytes.contains(&0) {
        return Err(PipelineError::Parse(
            "binary content is neither a workbook nor a CSV export".to_string(),
        ));
    }

    let delimiter = sniff_delimiter(bytes);
    debug!("loader: reading CSV with delimiter {:?}", delimiter as char);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(bytes);

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| PipelineError::Parse(format!("invalid CSV header: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| PipelineError::Parse(format!("invalid CSV row: {e}")))?;
        rows.push(record.iter().map(text_cell).collect());
    }

    Ok(RawTable::new(columns, rows).with_decimal_comma(delimiter == b';'))
}

/// Regional exports often use `;` because `,` is the decimal separator.
fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let header = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
    let semicolons = header.iter().filter(|b| **b == b';').count();
    let commas = header.iter().filter(|b| **b == b',').count();
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

fn text_cell(value: &str) -> Cell {
    if value.trim().is_empty() {
        Cell::Empty
    } else {
        Cell::Text(value.to_string())
    }
}
