use chrono::NaiveDateTime;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::bands::{DelayBand, ValueBand};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static EMPTY_CELL: Cell = Cell::Empty;

/// A single spreadsheet cell as it came out of the source file.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

/// Rows × named columns, header names kept verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
    /// Set for `;`-delimited exports, where `,` is the decimal separator
    /// and `.` groups thousands in text amounts.
    pub decimal_comma: bool,
}

impl RawTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            columns,
            rows,
            decimal_comma: false,
        }
    }

    pub fn with_decimal_comma(mut self, decimal_comma: bool) -> Self {
        self.decimal_comma = decimal_comma;
        self
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|name| name == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.position(column).is_some()
    }

    /// Renames every header equal to `from`. Returns whether anything changed.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        let mut renamed = false;
        for name in self.columns.iter_mut().filter(|name| name.as_str() == from) {
            *name = to.to_string();
            renamed = true;
        }
        renamed
    }

    /// Removes a column and its cells. Absent columns are a no-op.
    pub fn drop_column(&mut self, column: &str) -> bool {
        let Some(index) = self.position(column) else {
            return false;
        };
        self.columns.remove(index);
        for row in self.rows.iter_mut() {
            if index < row.len() {
                row.remove(index);
            }
        }
        true
    }

    /// Ragged rows read as empty past their last cell.
    pub fn cell(&self, row: usize, column: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .unwrap_or(&EMPTY_CELL)
    }
}

/// `Proposta` is numeric in most exports but some carry alphanumeric ids.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Proposal {
    Number(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedRecord {
    #[serde(rename = "Proposta")]
    pub proposal: Option<Proposal>,
    #[serde(rename = "Cliente")]
    pub client: Option<String>,
    #[serde(rename = "Cpf")]
    pub tax_id: Option<String>,
    #[serde(rename = "Data_Base", serialize_with = "serialize_timestamp")]
    pub base_date: Option<NaiveDateTime>,
    #[serde(rename = "DataVcto", serialize_with = "serialize_timestamp")]
    pub due_date: Option<NaiveDateTime>,
    #[serde(rename = "ValorPago")]
    pub amount_paid: f64,
    #[serde(rename = "ValorComissao")]
    pub commission: f64,
    #[serde(rename = "BaseCalculo")]
    pub calculation_base: Option<f64>,
    #[serde(rename = "Atraso")]
    pub days_overdue: i64,
    #[serde(rename = "PercComissao")]
    pub commission_pct: f64,
    #[serde(rename = "FaixaAtraso")]
    pub delay_band: DelayBand,
    #[serde(rename = "FaixaValor")]
    pub value_band: ValueBand,
    #[serde(rename = "MesAno")]
    pub month: Option<String>,
    #[serde(rename = "DtPgtoCmss")]
    pub commission_paid_on: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    pub total_registros: usize,
    pub meses_disponiveis: Vec<String>,
    pub campos_numericos: Vec<String>,
    #[serde(serialize_with = "serialize_required_timestamp")]
    pub data_atualizacao: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BandSummary {
    pub operacoes: usize,
    pub valor_pago: f64,
    pub valor_comissao: f64,
    pub perc_comissao: f64,
}

/// Per-`FaixaAtraso` totals, serialized as a JSON object in band order.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayBreakdown(pub Vec<(DelayBand, BandSummary)>);

#[cfg(test)]
impl DelayBreakdown {
    pub fn get(&self, band: DelayBand) -> Option<&BandSummary> {
        self.0
            .iter()
            .find(|(candidate, _)| *candidate == band)
            .map(|(_, summary)| summary)
    }
}

impl Serialize for DelayBreakdown {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (band, summary) in &self.0 {
            map.serialize_entry(band.label(), summary)?;
        }
        map.end()
    }
}

/// The published dashboard document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub metadados: Metadata,
    pub dados_completos: Vec<EnrichedRecord>,
    pub analise_faixas: DelayBreakdown,
}

fn serialize_timestamp<S: Serializer>(
    value: &Option<NaiveDateTime>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(timestamp) => serializer.collect_str(&timestamp.format(TIMESTAMP_FORMAT)),
        None => serializer.serialize_none(),
    }
}

fn serialize_required_timestamp<S: Serializer>(
    value: &NaiveDateTime,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
}
