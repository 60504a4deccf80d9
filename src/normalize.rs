use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::bands::{DelayBand, ValueBand};
use crate::error::{PipelineError, Result};
use crate::models::{Cell, EnrichedRecord, Proposal, RawTable, TIMESTAMP_FORMAT};

pub const PROPOSTA: &str = "Proposta";
pub const CLIENTE: &str = "Cliente";
pub const CPF: &str = "Cpf";
pub const DATA_BASE: &str = "Data_Base";
pub const DATA_VCTO: &str = "DataVcto";
pub const VALOR_PAGO: &str = "ValorPago";
pub const VALOR_COMISSAO: &str = "ValorComissao";
pub const BASE_CALCULO: &str = "BaseCalculo";
pub const ATRASO: &str = "Atraso";
pub const DT_PGTO_CMSS: &str = "DtPgtoCmss";

/// Column tables that drive normalization. Passed by reference so tests can
/// run against their own layout without touching shared state.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    /// Legacy days-overdue header and the source name it stands in for.
    pub delay_alias: (&'static str, &'static str),
    pub dropped_columns: &'static [&'static str],
    pub renames: &'static [(&'static str, &'static str)],
    pub required_columns: &'static [&'static str],
    pub numeric_fields: &'static [&'static str],
}

impl Schema {
    pub const STANDARD: Schema = Schema {
        delay_alias: ("NDIAS_CON", "ATRASO"),
        dropped_columns: &[
            "TxAM",
            "VlrRetILA",
            "DtPgtoParc",
            "ComissionadoOrigem",
            "PMTsAgregCarteira",
            "Comissao",
            "QtdParc",
            "TipoComiss",
            "FormaLib",
            "SitPgtoR",
            "VlrLiqLiberadoOper",
            "VlrBruto",
            "Param",
            "Rateio",
            "DtAgenda",
            "DtFech",
            "DtCadastro",
        ],
        renames: &[
            ("Prop", PROPOSTA),
            ("VlBrutoOper", VALOR_PAGO),
            ("ValorComiss", VALOR_COMISSAO),
            ("ATRASO", ATRASO),
        ],
        required_columns: &[
            PROPOSTA,
            CLIENTE,
            CPF,
            DATA_BASE,
            DATA_VCTO,
            VALOR_PAGO,
            VALOR_COMISSAO,
            BASE_CALCULO,
            ATRASO,
            DT_PGTO_CMSS,
        ],
        numeric_fields: &["ValorPago", "ValorComissao", "BaseCalculo", "PercComissao", "Atraso"],
    };
}

/// Positions of the canonical columns once renaming is done.
struct ColumnIndex {
    proposal: usize,
    client: usize,
    tax_id: usize,
    base_date: usize,
    due_date: usize,
    amount_paid: usize,
    commission: usize,
    calculation_base: usize,
    days_overdue: usize,
    commission_paid_on: usize,
}

impl ColumnIndex {
    fn resolve(table: &RawTable, schema: &Schema) -> Result<Self> {
        let missing: Vec<&str> = schema
            .required_columns
            .iter()
            .copied()
            .filter(|column| !table.has_column(column))
            .collect();

        if !missing.is_empty() {
            return Err(PipelineError::Schema(format!(
                "missing required columns: {}",
                missing.join(", ")
            )));
        }

        let at = |column: &str| {
            table.position(column).ok_or_else(|| {
                PipelineError::Schema(format!("missing required column: {column}"))
            })
        };

        Ok(Self {
            proposal: at(PROPOSTA)?,
            client: at(CLIENTE)?,
            tax_id: at(CPF)?,
            base_date: at(DATA_BASE)?,
            due_date: at(DATA_VCTO)?,
            amount_paid: at(VALOR_PAGO)?,
            commission: at(VALOR_COMISSAO)?,
            calculation_base: at(BASE_CALCULO)?,
            days_overdue: at(ATRASO)?,
            commission_paid_on: at(DT_PGTO_CMSS)?,
        })
    }
}

/// Turns a raw export into enriched records, dropping rows without a
/// positive `ValorPago` or without `ValorComissao`.
pub fn normalize(mut table: RawTable, schema: &Schema) -> Result<Vec<EnrichedRecord>> {
    apply_column_mapping(&mut table, schema);
    let index = ColumnIndex::resolve(&table, schema)?;

    let mut records = Vec::with_capacity(table.rows.len());
    let mut dropped = 0usize;

    for row in 0..table.rows.len() {
        match enrich_row(&table, row, &index) {
            Some(record) => records.push(record),
            None => dropped += 1,
        }
    }

    info!(
        "normalize: kept {} records, dropped {} invalid rows",
        records.len(),
        dropped
    );
    Ok(records)
}

fn apply_column_mapping(table: &mut RawTable, schema: &Schema) {
    let (legacy, canonical) = schema.delay_alias;
    if table.has_column(legacy) {
        if table.has_column(canonical) {
            warn!("normalize: both {legacy} and {canonical} present, ignoring {legacy}");
            table.drop_column(legacy);
        } else {
            table.rename_column(legacy, canonical);
        }
    }

    for column in schema.dropped_columns {
        if table.drop_column(column) {
            debug!("normalize: dropped column {column}");
        }
    }

    for (from, to) in schema.renames {
        table.rename_column(from, to);
    }
}

fn enrich_row(table: &RawTable, row: usize, index: &ColumnIndex) -> Option<EnrichedRecord> {
    let amount = |column: usize| number(table.cell(row, column), table.decimal_comma);
    let amount_paid = amount(index.amount_paid)?;
    let commission = amount(index.commission)?;
    if amount_paid <= 0.0 {
        return None;
    }

    let base_date = timestamp(table.cell(row, index.base_date));
    let days_overdue = amount(index.days_overdue)
        .map(|days| days.round() as i64)
        .unwrap_or(0)
        .max(0);

    Some(EnrichedRecord {
        proposal: proposal(table.cell(row, index.proposal)),
        client: text(table.cell(row, index.client)),
        tax_id: text(table.cell(row, index.tax_id)),
        base_date,
        due_date: timestamp(table.cell(row, index.due_date)),
        amount_paid,
        commission,
        calculation_base: amount(index.calculation_base),
        days_overdue,
        commission_pct: commission / amount_paid * 100.0,
        delay_band: DelayBand::for_days(days_overdue),
        value_band: ValueBand::for_amount(amount_paid),
        month: base_date.map(|date| date.format("%Y-%m").to_string()),
        commission_paid_on: text(table.cell(row, index.commission_paid_on)),
    })
}

fn number(cell: &Cell, decimal_comma: bool) -> Option<f64> {
    match cell {
        Cell::Number(value) if value.is_finite() => Some(*value),
        Cell::Text(raw) => parse_number(raw, decimal_comma),
        _ => None,
    }
}

/// Accepts `.` or `,` decimals; when both appear the last one is the
/// decimal separator and the other groups thousands. With `decimal_comma`,
/// dots followed by groups of exactly three digits are thousands separators.
fn parse_number(raw: &str, decimal_comma: bool) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if decimal_comma && !trimmed.contains(',') && is_dot_grouped(trimmed) {
        debug!("normalize: reading {trimmed:?} with '.' as thousands separator");
        return trimmed.replace('.', "").parse::<f64>().ok();
    }

    let cleaned = match (trimmed.rfind(','), trimmed.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => trimmed.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => trimmed.replace(',', ""),
        (Some(_), None) => trimmed.replace(',', "."),
        _ => trimmed.to_string(),
    };

    cleaned.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn is_dot_grouped(raw: &str) -> bool {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    let mut groups = digits.split('.');
    let lead = groups.next().unwrap_or_default();
    let mut rest = groups.peekable();
    rest.peek().is_some()
        && (1..=3).contains(&lead.len())
        && lead.bytes().all(|b| b.is_ascii_digit())
        && rest.all(|group| group.len() == 3 && group.bytes().all(|b| b.is_ascii_digit()))
}

const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d/%m/%Y"];

// Serial 1 is 1900-01-01, 2958465 is 9999-12-31.
const MAX_SERIAL_DATE: f64 = 2_958_465.0;

fn timestamp(cell: &Cell) -> Option<NaiveDateTime> {
    match cell {
        Cell::DateTime(value) => Some(*value),
        Cell::Number(serial) => from_serial_date(*serial),
        Cell::Text(raw) => parse_timestamp(raw.trim()),
        _ => None,
    }
}

fn from_serial_date(serial: f64) -> Option<NaiveDateTime> {
    if !(1.0..=MAX_SERIAL_DATE).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn text(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Empty => None,
        Cell::Text(value) => Some(value.trim().to_string()),
        Cell::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
            Some(format!("{}", *value as i64))
        }
        Cell::Number(value) => Some(value.to_string()),
        Cell::Bool(value) => Some(value.to_string()),
        Cell::DateTime(value) => Some(value.format(TIMESTAMP_FORMAT).to_string()),
    }
}

fn proposal(cell: &Cell) -> Option<Proposal> {
    match cell {
        Cell::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
            Some(Proposal::Number(*value as i64))
        }
        Cell::Text(raw) => {
            let trimmed = raw.trim();
            Some(
                trimmed
                    .parse::<i64>()
                    .map(Proposal::Number)
                    .unwrap_or_else(|_| Proposal::Text(trimmed.to_string())),
            )
        }
        other => text(other).map(Proposal::Text),
    }
}
