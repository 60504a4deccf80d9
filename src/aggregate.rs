use std::collections::BTreeSet;

use chrono::NaiveDateTime;

use crate::bands::DelayBand;
use crate::models::{BandSummary, DelayBreakdown, EnrichedRecord, Metadata, Snapshot};
use crate::normalize::Schema;

pub fn build_snapshot(
    records: Vec<EnrichedRecord>,
    schema: &Schema,
    generated_at: NaiveDateTime,
) -> Snapshot {
    let metadados = Metadata {
        total_registros: records.len(),
        meses_disponiveis: available_months(&records),
        campos_numericos: schema
            .numeric_fields
            .iter()
            .map(|field| field.to_string())
            .collect(),
        data_atualizacao: generated_at,
    };
    let analise_faixas = summarize_by_delay(&records);

    Snapshot {
        metadados,
        dados_completos: records,
        analise_faixas,
    }
}

/// Distinct `MesAno` values. `YYYY-MM` sorts chronologically as text.
pub fn available_months(records: &[EnrichedRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(|record| record.month.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// One entry per `FaixaAtraso`, empty bands included.
pub fn summarize_by_delay(records: &[EnrichedRecord]) -> DelayBreakdown {
    let mut totals: Vec<(DelayBand, BandSummary)> = DelayBand::ALL
        .iter()
        .map(|band| (*band, BandSummary::default()))
        .collect();

    for record in records {
        if let Some((_, summary)) = totals.iter_mut().find(|(band, _)| *band == record.delay_band) {
            summary.operacoes += 1;
            summary.valor_pago += record.amount_paid;
            summary.valor_comissao += record.commission;
        }
    }

    for (_, summary) in totals.iter_mut() {
        summary.perc_comissao = if summary.valor_pago > 0.0 {
            summary.valor_comissao / summary.valor_pago * 100.0
        } else {
            0.0
        };
    }

    DelayBreakdown(totals)
}
