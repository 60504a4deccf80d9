use std::fmt::Write;

use serde_json::{json, Value};

use crate::bands::DelayBand;
use crate::error::PipelineError;
use crate::pipeline::PipelineOutput;

pub fn update_success(output: &PipelineOutput) -> Value {
    json!({
        "success": true,
        "message": "Dashboard atualizado com sucesso",
        "registros": output.record_count,
        "meses": output.months,
    })
}

pub fn update_failure(error: &PipelineError) -> Value {
    json!({
        "success": false,
        "kind": error.kind(),
        "error": error.to_string(),
    })
}

/// Plain-text view of `analise_faixas` from a published snapshot.
pub fn build_band_table(snapshot: &Value) -> String {
    let mut output = String::new();
    let metadata = &snapshot["metadados"];
    let bands = &snapshot["analise_faixas"];

    let _ = writeln!(output, "# Análise por faixa de atraso");
    let _ = writeln!(
        output,
        "Snapshot de {} com {} registros",
        metadata["data_atualizacao"].as_str().unwrap_or("data desconhecida"),
        metadata["total_registros"].as_u64().unwrap_or(0)
    );

    if let Some(months) = metadata["meses_disponiveis"].as_array() {
        let months: Vec<&str> = months.iter().filter_map(Value::as_str).collect();
        if !months.is_empty() {
            let _ = writeln!(output, "Meses: {}", months.join(", "));
        }
    }
    let _ = writeln!(output);

    for band in DelayBand::ALL {
        let summary = &bands[band.label()];
        if summary.is_null() {
            let _ = writeln!(output, "- {}: sem dados", band.label());
            continue;
        }

        let _ = writeln!(
            output,
            "- {}: {} operações, pago R$ {:.2}, comissão R$ {:.2} ({:.2}%)",
            band.label(),
            summary["operacoes"].as_u64().unwrap_or(0),
            summary["valor_pago"].as_f64().unwrap_or(0.0),
            summary["valor_comissao"].as_f64().unwrap_or(0.0),
            summary["perc_comissao"].as_f64().unwrap_or(0.0)
        );
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_bytes;
    use crate::normalize::Schema;
    use crate::pipeline::process;
    use chrono::NaiveDate;

    fn output() -> PipelineOutput {
        let table = parse_bytes(
            b"Prop,Cliente,Cpf,Data_Base,DataVcto,VlBrutoOper,ValorComiss,BaseCalculo,Atraso,DtPgtoCmss\n\
              1,Ana,1,2024-01-10,2024-02-10,1000,50,1000,5,\n\
              2,Bia,2,2024-03-10,2024-04-10,3000,30,3000,95,\n",
        )
        .unwrap();
        let generated_at = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        process(table, &Schema::STANDARD, generated_at).unwrap()
    }

    #[test]
    fn success_message_reports_count_and_months() {
        let message = update_success(&output());
        assert_eq!(message["success"], true);
        assert_eq!(message["registros"], 2);
        assert_eq!(message["meses"], json!(["2024-01", "2024-03"]));
    }

    #[test]
    fn failure_message_carries_error_kind() {
        let err = PipelineError::Schema("missing required columns: Cpf".into());
        let message = update_failure(&err);
        assert_eq!(message["success"], false);
        assert_eq!(message["kind"], "SchemaError");
        assert!(message["error"].as_str().unwrap().contains("Cpf"));
    }

    #[test]
    fn band_table_lists_every_band() {
        let snapshot = serde_json::to_value(&output().snapshot).unwrap();
        let table = build_band_table(&snapshot);

        assert!(table.contains("Snapshot de 2024-06-01 08:00:00 com 2 registros"));
        assert!(table.contains("Meses: 2024-01, 2024-03"));
        assert!(
            table.contains("- 0-20 dias: 1 operações, pago R$ 1000.00, comissão R$ 50.00 (5.00%)")
        );
        assert!(
            table.contains("- 91-180 dias: 1 operações, pago R$ 3000.00, comissão R$ 30.00 (1.00%)")
        );
        assert!(
            table.contains("- Maior que 360 dias: 0 operações, pago R$ 0.00, comissão R$ 0.00 (0.00%)")
        );
    }

    #[test]
    fn band_table_tolerates_incomplete_snapshots() {
        let table = build_band_table(&json!({ "metadados": {} }));
        assert!(table.contains("data desconhecida"));
        assert!(table.contains("- 31-60 dias: sem dados"));
    }
}
