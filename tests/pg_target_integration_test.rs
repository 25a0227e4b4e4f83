// ABOUTME: Integration tests for PgTarget against a live PostgreSQL
// ABOUTME: Run with TEST_TARGET_URL set and `cargo test -- --ignored`

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use sap_pg_sync::postgres::{check_table_privileges, PgTarget};
use sap_pg_sync::sync::mapping::{SYNCED_AT_COLUMN, UPDATE_DATE_MARKER, UPDATE_TICKS_MARKER};
use sap_pg_sync::sync::{
    CursorStore, DestinationTable, Field, SourceReader, SourceRow, SyncEngine, SyncStrategy,
    TableMapping, Transform,
};
use std::env;
use std::time::Duration;

fn get_target_url() -> Option<String> {
    env::var("TEST_TARGET_URL").ok()
}

/// Source double returning a fixed row set.
struct StaticSource(Vec<SourceRow>);

#[async_trait]
impl SourceReader for StaticSource {
    async fn fetch(&mut self, _query: &str) -> Result<Vec<SourceRow>> {
        Ok(self.0.clone())
    }
}

fn test_mapping(table: &str, strategy: SyncStrategy) -> TableMapping {
    let mut fields = vec![Field::text("cod_articolo"), Field::double("prezzo")];
    let mut builder = TableMapping::builder(format!("it_{}", table), "dbo.OITM")
        .column("ItemCode", "cod_articolo")
        .column("Price", "prezzo")
        .transform("cod_articolo", Transform::TEXT)
        .transform("prezzo", Transform::FLOAT)
        .primary_key("ItemCode")
        .strategy(strategy);
    if strategy == SyncStrategy::Upsert {
        builder = builder
            .column("UpdateDate", UPDATE_DATE_MARKER)
            .column("UpdateTS", UPDATE_TICKS_MARKER);
        fields.push(Field::timestamp(SYNCED_AT_COLUMN));
    }
    builder
        .destination(DestinationTable::new("public", table, fields))
        .build()
        .unwrap()
}

async fn setup_table(target: &PgTarget, table: &str) -> Result<()> {
    target
        .client()
        .batch_execute(&format!(
            r#"
            DROP TABLE IF EXISTS "public"."{table}";
            CREATE TABLE "public"."{table}" (
                cod_articolo TEXT PRIMARY KEY,
                prezzo DOUBLE PRECISION,
                last_synced_at TIMESTAMP
            )
            "#,
            table = table
        ))
        .await?;
    Ok(())
}

async fn cleanup(target: &PgTarget, table: &str) {
    let _ = target
        .client()
        .batch_execute(&format!(
            r#"DROP TABLE IF EXISTS "public"."{}" CASCADE;
               DELETE FROM "SAP_sync_states" WHERE table_name = 'it_{}'"#,
            table, table
        ))
        .await;
}

fn row(code: &str, price: f64, ticks: i64) -> SourceRow {
    SourceRow::new()
        .with("ItemCode", code)
        .with("Price", price)
        .with("UpdateDate", NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        .with("UpdateTS", ticks)
}

#[tokio::test]
#[ignore]
async fn test_upsert_twice_and_cursor() {
    let url = get_target_url().expect("TEST_TARGET_URL must be set");
    let table = "sap_sync_it_upsert";
    let mut target = PgTarget::connect(&url, 1, Duration::from_millis(100))
        .await
        .expect("Failed to connect to target");
    setup_table(&target, table).await.unwrap();

    let mapping = test_mapping(table, SyncStrategy::Upsert);
    let privileges = check_table_privileges(target.client(), mapping.destination())
        .await
        .unwrap();
    assert!(privileges.is_ready(), "{:?}", privileges);

    let engine = SyncEngine::new(2);
    let mut source = StaticSource(vec![
        row("A001", 1.5, 80000),
        row("A002", 2.5, 93015),
        row("A003", 3.5, 101500),
    ]);
    for _ in 0..2 {
        let stats = engine
            .sync_table(&mapping, &mut source, &mut target)
            .await
            .unwrap();
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.batches, 2);
    }

    let count: i64 = target
        .client()
        .query_one(&format!(r#"SELECT count(*) FROM "public"."{}""#, table), &[])
        .await
        .unwrap()
        .get(0);
    assert_eq!(count, 3);

    let cursor = target.last_synced_at(mapping.name()).await.unwrap();
    assert_eq!(
        cursor,
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 15, 0)
    );

    cleanup(&target, table).await;
}

#[tokio::test]
#[ignore]
async fn test_truncate_insert_replaces_rows() {
    let url = get_target_url().expect("TEST_TARGET_URL must be set");
    let table = "sap_sync_it_truncate";
    let mut target = PgTarget::connect(&url, 1, Duration::from_millis(100))
        .await
        .expect("Failed to connect to target");
    setup_table(&target, table).await.unwrap();

    let mapping = test_mapping(table, SyncStrategy::TruncateInsert);
    let engine = SyncEngine::default();

    let mut first = StaticSource(vec![
        row("A", 1.0, 0),
        row("B", 2.0, 0),
        row("C", 3.0, 0),
    ]);
    engine
        .sync_table(&mapping, &mut first, &mut target)
        .await
        .unwrap();

    let mut second = StaticSource(vec![row("A", 1.0, 0), row("C", 3.0, 0)]);
    engine
        .sync_table(&mapping, &mut second, &mut target)
        .await
        .unwrap();

    let codes: Vec<String> = target
        .client()
        .query(
            &format!(
                r#"SELECT cod_articolo FROM "public"."{}" ORDER BY cod_articolo"#,
                table
            ),
            &[],
        )
        .await
        .unwrap()
        .iter()
        .map(|r| r.get(0))
        .collect();
    assert_eq!(codes, vec!["A", "C"]);
    assert!(target
        .last_synced_at(mapping.name())
        .await
        .unwrap()
        .is_some());

    cleanup(&target, table).await;
}
