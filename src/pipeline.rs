use chrono::{Local, NaiveDateTime};
use tracing::info;

use crate::aggregate;
use crate::error::{PipelineError, Result};
use crate::loader::Loader;
use crate::models::{RawTable, Snapshot};
use crate::normalize::{self, Schema};
use crate::publish::SnapshotPublisher;

/// What a successful run hands back to the caller.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub snapshot: Snapshot,
    pub record_count: usize,
    pub months: Vec<String>,
}

/// Loader → Normalizer → Aggregator for one source reference.
pub async fn run(loader: &Loader, source: &str, schema: &Schema) -> Result<PipelineOutput> {
    let table = loader.load(source).await?;
    process(table, schema, Local::now().naive_local())
}

pub fn process(
    table: RawTable,
    schema: &Schema,
    generated_at: NaiveDateTime,
) -> Result<PipelineOutput> {
    let records = normalize::normalize(table, schema)?;
    if records.is_empty() {
        return Err(PipelineError::ValidationEmpty);
    }

    let snapshot = aggregate::build_snapshot(records, schema, generated_at);
    info!(
        "pipeline: snapshot ready with {} records over {} months",
        snapshot.metadados.total_registros,
        snapshot.metadados.meses_disponiveis.len()
    );

    Ok(PipelineOutput {
        record_count: snapshot.metadados.total_registros,
        months: snapshot.metadados.meses_disponiveis.clone(),
        snapshot,
    })
}

/// Publishes to each target in order, stopping at the first failure.
pub async fn publish_all(
    snapshot: &Snapshot,
    publishers: &[&dyn SnapshotPublisher],
) -> anyhow::Result<()> {
    for publisher in publishers {
        publisher.publish(snapshot).await?;
        info!("publish: snapshot written to {}", publisher.target());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bands::DelayBand;
    use crate::loader::parse_bytes;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::io::Write;
    use std::sync::Mutex;
    use std::time::Duration;

    const EXPORT: &str = "\
Prop,Cliente,Cpf,Data_Base,DataVcto,VlBrutoOper,ValorComiss,BaseCalculo,NDIAS_CON,DtPgtoCmss,TxAM,Rateio
1001,Ana Lima,11122233344,2024-02-10,2024-03-10,2000,100,1900,45,2024-04-01,1.9,A
1002,Bruno Reis,22233344455,2024-01-05,2024-02-05,0,10,0,10,,1.9,A
1003,Carla Dias,33344455566,2024-02-20,2024-03-20,12000,240,11000,-5,,1.9,B
1004,Davi Melo,44455566677,15/12/2023,2024-01-15,800,,800,400,,1.9,B
1005,Elisa Cruz,55566677788,2023-12-01,nope,800,16,800,400,,1.9,B
";

    fn generated_at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn export() -> RawTable {
        parse_bytes(EXPORT.as_bytes()).unwrap()
    }

    #[test]
    fn processes_a_csv_export_end_to_end() {
        let output = process(export(), &Schema::STANDARD, generated_at(9)).unwrap();

        assert_eq!(output.record_count, 3);
        assert_eq!(output.months, vec!["2023-12", "2024-02"]);

        let records = &output.snapshot.dados_completos;
        assert!(records.iter().all(|r| r.amount_paid > 0.0));

        assert_eq!(records[0].days_overdue, 45);
        assert_eq!(records[0].delay_band.label(), "31-60 dias");
        assert_eq!(records[0].value_band.label(), "3. R$ 1.501 a R$ 2.000");
        assert!((records[0].commission_pct - 5.0).abs() < 1e-9);

        assert_eq!(records[1].days_overdue, 0);
        assert_eq!(records[1].delay_band, DelayBand::UpTo20);
        assert_eq!(records[1].value_band.label(), "7. Maior que R$ 10.000");

        assert_eq!(records[2].due_date, None);

        let bands = &output.snapshot.analise_faixas;
        assert_eq!(bands.0.len(), 7);
        assert_eq!(bands.get(DelayBand::UpTo20).unwrap().operacoes, 1);
        assert_eq!(bands.get(DelayBand::Over360).unwrap().operacoes, 1);
        assert_eq!(bands.get(DelayBand::Days61To90).unwrap().perc_comissao, 0.0);
    }

    #[test]
    fn identical_input_gives_identical_snapshots_apart_from_timestamp() {
        let first = process(export(), &Schema::STANDARD, generated_at(9)).unwrap();
        let second = process(export(), &Schema::STANDARD, generated_at(17)).unwrap();
        assert_ne!(first.snapshot, second.snapshot);

        let mut aligned = second.snapshot.clone();
        aligned.metadados.data_atualizacao = first.snapshot.metadados.data_atualizacao;
        assert_eq!(first.snapshot, aligned);
        assert_eq!(
            serde_json::to_string(&first.snapshot).unwrap(),
            serde_json::to_string(&aligned).unwrap()
        );
    }

    #[test]
    fn all_rows_filtered_is_validation_empty() {
        let table = parse_bytes(
            b"Prop,Cliente,Cpf,Data_Base,DataVcto,VlBrutoOper,ValorComiss,BaseCalculo,ATRASO,DtPgtoCmss\n\
              1,Ana,1,2024-01-01,2024-01-01,0,1,0,0,\n\
              2,Bia,2,2024-01-01,2024-01-01,100,,0,0,\n",
        )
        .unwrap();

        let err = process(table, &Schema::STANDARD, generated_at(9)).unwrap_err();
        assert!(matches!(err, PipelineError::ValidationEmpty));
    }

    #[test]
    fn header_only_export_is_validation_empty() {
        let table = parse_bytes(
            b"Prop,Cliente,Cpf,Data_Base,DataVcto,VlBrutoOper,ValorComiss,BaseCalculo,Atraso,DtPgtoCmss\n",
        )
        .unwrap();

        let err = process(table, &Schema::STANDARD, generated_at(9)).unwrap_err();
        assert_eq!(err.kind(), "ValidationEmpty");
    }

    #[tokio::test]
    async fn run_reads_a_local_export() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(EXPORT.as_bytes()).unwrap();

        let loader = Loader::new(Duration::from_secs(5)).unwrap();
        let output = run(&loader, file.path().to_str().unwrap(), &Schema::STANDARD)
            .await
            .unwrap();
        assert_eq!(output.record_count, 3);
    }

    struct RecordingPublisher {
        name: &'static str,
        fail: bool,
        seen: Mutex<Vec<usize>>,
    }

    impl RecordingPublisher {
        fn new(name: &'static str, fail: bool) -> Self {
            Self {
                name,
                fail,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SnapshotPublisher for RecordingPublisher {
        fn target(&self) -> String {
            self.name.to_string()
        }

        async fn publish(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("{} is unavailable", self.name);
            }
            self.seen
                .lock()
                .unwrap()
                .push(snapshot.metadados.total_registros);
            Ok(())
        }
    }

    #[tokio::test]
    async fn publishes_to_every_target_in_order() {
        let output = process(export(), &Schema::STANDARD, generated_at(9)).unwrap();
        let store = RecordingPublisher::new("store", false);
        let cache = RecordingPublisher::new("cache", false);

        publish_all(&output.snapshot, &[&store, &cache]).await.unwrap();

        assert_eq!(*store.seen.lock().unwrap(), vec![3]);
        assert_eq!(*cache.seen.lock().unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn stops_publishing_after_a_failure() {
        let output = process(export(), &Schema::STANDARD, generated_at(9)).unwrap();
        let store = RecordingPublisher::new("store", true);
        let cache = RecordingPublisher::new("cache", false);

        let err = publish_all(&output.snapshot, &[&store, &cache])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("store is unavailable"));
        assert!(cache.seen.lock().unwrap().is_empty());
    }
}
