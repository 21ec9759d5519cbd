//! Staging store and reconciler against a real SQLite database

mod common;

use chrono::{Local, NaiveDate};

use visitor_relay::errors::TrackerError;
use visitor_relay::services::BatchOrigin;
use visitor_relay::staging::{NewStagingRecord, StagingStore};
use visitor_relay::structs::{ActivityHit, format_client_date};

use common::{ScriptedTransport, test_config, test_context};

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

fn record(page: &str, ip: &str, header_ip: &str, account_id: &str) -> NewStagingRecord {
    NewStagingRecord {
        page_title: page.to_string(),
        time_spent: 10,
        page_view: 1,
        visitor_ip: ip.to_string(),
        header_ip: header_ip.to_string(),
        visitor_city: String::new(),
        visitor_country: String::new(),
        visitor_company: String::new(),
        account_id: account_id.to_string(),
        last_update: day(),
    }
}

fn hit(title: &str, time_spent: i32, page_view: i32) -> ActivityHit {
    ActivityHit {
        page_title: title.to_string(),
        time_spent,
        page_view,
        last_update: format_client_date(Local::now().date_naive()),
    }
}

#[tokio::test]
async fn test_find_matches_page_ip_and_day() {
    let (_dir, ctx) = test_context(&test_config(), ScriptedTransport::new()).await;
    let store = ctx.store.as_ref();
    let inserted = store
        .insert(record("Pricing", "203.0.113.5", "", "abm_a"))
        .await
        .unwrap();

    let found = store.find("Pricing", "203.0.113.5", day()).await.unwrap();
    assert_eq!(found.map(|r| r.id), Some(inserted.id));

    assert!(
        store
            .find("Pricing", "203.0.113.5", day().succ_opt().unwrap())
            .await
            .unwrap()
            .is_none()
    );
    assert!(store.find("Pricing", "198.51.100.1", day()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_counters_overwrites_and_reports_missing_rows() {
    let (_dir, ctx) = test_context(&test_config(), ScriptedTransport::new()).await;
    let store = ctx.store.as_ref();
    let row = store
        .insert(record("Pricing", "203.0.113.5", "", "abm_a"))
        .await
        .unwrap();

    store.update_counters(row.id, 40, 3, day()).await.unwrap();
    let rows = store.all().await.unwrap();
    assert_eq!((rows[0].time_spent, rows[0].page_view), (40, 3));

    let err = store.update_counters(row.id + 100, 1, 1, day()).await.unwrap_err();
    assert!(matches!(err, TrackerError::NotFound(_)));
}

#[tokio::test]
async fn test_find_account_id_matches_either_address() {
    let (_dir, ctx) = test_context(&test_config(), ScriptedTransport::new()).await;
    let store = ctx.store.as_ref();
    store
        .insert(record("Pricing", "10.0.0.1", "203.0.113.5", "abm_proxy"))
        .await
        .unwrap();
    store
        .insert(record("Blog", "198.51.100.9", "", ""))
        .await
        .unwrap();

    // header IP 命中
    let found = store
        .find_account_id("172.16.0.4", "203.0.113.5", "Pricing")
        .await
        .unwrap();
    assert_eq!(found.as_deref(), Some("abm_proxy"));

    // 空 header IP 不匹配空字段
    let found = store.find_account_id("172.16.0.4", "", "Pricing").await.unwrap();
    assert_eq!(found, None);

    // 空 account_id 的行不算
    let found = store.find_account_id("198.51.100.9", "", "Blog").await.unwrap();
    assert_eq!(found, None);
}

#[tokio::test]
async fn test_delete_ids_removes_only_listed_rows() {
    let (_dir, ctx) = test_context(&test_config(), ScriptedTransport::new()).await;
    let store = ctx.store.as_ref();
    let mut ids = Vec::new();
    for i in 0..1200 {
        let row = store
            .insert(record(&format!("Page {}", i), "203.0.113.5", "", "abm_a"))
            .await
            .unwrap();
        ids.push(row.id);
    }

    let deleted = store.delete_ids(&ids[..1100]).await.unwrap();
    assert_eq!(deleted, 1100);
    assert_eq!(store.count().await.unwrap(), 100);
    assert_eq!(store.delete_ids(&[]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_reconcile_keeps_one_row_per_page_ip_day() {
    let (_dir, ctx) = test_context(&test_config(), ScriptedTransport::new()).await;
    let origin = BatchOrigin {
        account_id: "abm_0123456789abc",
        visitor_ip: "203.0.113.5",
        header_ip: "198.51.100.2",
    };

    let first = ctx
        .reconciler
        .reconcile(&[hit("Pricing", 10, 1), hit("Caf&#233; Menu", 10, 1)], origin)
        .await
        .unwrap();
    assert_eq!(first.inserted, 2);

    let second = ctx
        .reconciler
        .reconcile(&[hit("Pricing", 20, 1), hit("Café Menu", 30, 2)], origin)
        .await
        .unwrap();
    assert_eq!(second.updated, 2);

    let mut rows = ctx.store.all().await.unwrap();
    rows.sort_by(|a, b| a.page_title.cmp(&b.page_title));
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].page_title, "Café Menu");
    assert_eq!((rows[0].time_spent, rows[0].page_view), (30, 2));
    assert_eq!(rows[1].page_title, "Pricing");
    assert_eq!((rows[1].time_spent, rows[1].page_view), (20, 1));
    assert_eq!(rows[1].header_ip, "198.51.100.2");
    assert_eq!(rows[1].visitor_city, "Lisbon");
}

#[tokio::test]
async fn test_reconcile_after_transfer_starts_a_new_row() {
    let (_dir, ctx) = test_context(&test_config(), ScriptedTransport::new()).await;
    let origin = BatchOrigin {
        account_id: "abm_0123456789abc",
        visitor_ip: "203.0.113.5",
        header_ip: "",
    };

    ctx.reconciler
        .reconcile(&[hit("Pricing", 10, 1)], origin)
        .await
        .unwrap();
    let report = ctx.transfer.run_once().await.unwrap();
    assert!(report.truncated);

    // 记录缓存里仍有已删除的行
    let outcome = ctx
        .reconciler
        .reconcile(&[hit("Pricing", 20, 1)], origin)
        .await
        .unwrap();
    assert_eq!(outcome.inserted, 1);

    let rows = ctx.store.all().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].time_spent, 20);
}
