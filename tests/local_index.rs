mod common;

use clipsearch::{
    Embedding, Error, IndexRecord, LocalIndex, Pipeline, VectorIndex, assemble, select_top,
};
use common::*;
use rstest::*;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use tempfile::TempDir;

#[fixture]
fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

async fn open(dir: &TempDir) -> LocalIndex {
    LocalIndex::open(dir.path().join("test.usearch"), dir.path().join("test.db")).await.unwrap()
}

/// 绕过索引直接连接元数据库
async fn metadata_db(dir: &TempDir) -> SqlitePool {
    let options = SqliteConnectOptions::new().filename(dir.path().join("test.db"));
    SqlitePool::connect_with(options).await.unwrap()
}

fn records() -> Vec<IndexRecord> {
    let urls = ["https://img/a", "https://img/b", "https://img/c"].map(String::from);
    let embeddings: Vec<Embedding> = vec![
        vec![1., 0., 0., 0.].into(),
        vec![0., 1., 0., 0.].into(),
        vec![0.9, 0.1, 0., 0.].into(),
    ];
    assemble(&urls, &embeddings).unwrap()
}

#[rstest]
#[tokio::test]
async fn query_returns_nearest_with_metadata(temp_dir: TempDir) {
    let index = open(&temp_dir).await;
    index.ensure(4).await.unwrap();
    index.upsert(&records()).await.unwrap();

    let response = index.query(&vec![1., 0., 0., 0.].into(), 2, true).await.unwrap();

    assert_eq!(response.matches.len(), 2);
    assert_eq!(response.matches[0].id, "0");
    assert!((response.matches[0].score - 1.).abs() < 1e-4);
    assert_eq!(response.matches[1].id, "2");

    let top = select_top(&response.matches, 2).unwrap();
    assert_eq!(top[0].source, "https://img/a");
    assert_eq!(top[1].source, "https://img/c");
}

#[rstest]
#[tokio::test]
async fn ensure_is_idempotent(temp_dir: TempDir) {
    let index = open(&temp_dir).await;
    index.ensure(4).await.unwrap();
    index.ensure(4).await.unwrap();

    let err = index.ensure(8).await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 4, actual: 8 }));
}

#[rstest]
#[tokio::test]
async fn persists_across_reopen(temp_dir: TempDir) {
    {
        let index = open(&temp_dir).await;
        index.ensure(4).await.unwrap();
        index.upsert(&records()).await.unwrap();
    }

    let index = open(&temp_dir).await;
    index.ensure(4).await.unwrap();
    assert_eq!(index.len(), 3);

    let response = index.query(&vec![0., 1., 0., 0.].into(), 1, true).await.unwrap();
    assert_eq!(response.matches[0].id, "1");

    let reopened = open(&temp_dir).await;
    let err = reopened.ensure(512).await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { .. } | Error::Index(_)), "{err}");
}

#[rstest]
#[tokio::test]
async fn upsert_replaces_existing_ids(temp_dir: TempDir) {
    let index = open(&temp_dir).await;
    index.ensure(4).await.unwrap();
    index.upsert(&records()).await.unwrap();

    let replacement =
        assemble(&["https://img/new".to_string()], &[vec![0., 0., 1., 0.].into()]).unwrap();
    index.upsert(&replacement).await.unwrap();

    assert_eq!(index.len(), 3);
    let response = index.query(&vec![0., 0., 1., 0.].into(), 1, true).await.unwrap();
    let top = select_top(&response.matches, 1).unwrap();
    assert_eq!(top[0].id, "0");
    assert_eq!(top[0].source, "https://img/new");
}

#[rstest]
#[tokio::test]
async fn metadata_is_optional(temp_dir: TempDir) {
    let index = open(&temp_dir).await;
    index.ensure(4).await.unwrap();
    index.upsert(&records()).await.unwrap();

    let response = index.query(&vec![1., 0., 0., 0.].into(), 3, false).await.unwrap();

    assert_eq!(response.matches.len(), 3);
    assert!(response.matches.iter().all(|m| m.metadata.is_none()));
}

#[rstest]
#[tokio::test]
async fn rejects_wrong_dimension(temp_dir: TempDir) {
    let index = open(&temp_dir).await;
    index.ensure(4).await.unwrap();

    let err = index.query(&vec![1., 0.].into(), 1, true).await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 4, actual: 2 }));

    let bad = assemble(&["u".to_string()], &[vec![1.; 5].into()]).unwrap();
    let err = index.upsert(&bad).await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { .. }));
}

#[rstest]
#[tokio::test]
async fn requires_ensure_first(temp_dir: TempDir) {
    let index = open(&temp_dir).await;

    let err = index.upsert(&records()).await.unwrap_err();
    assert!(matches!(err, Error::Index(_)));
}

#[rstest]
#[tokio::test]
async fn empty_index_returns_no_matches(temp_dir: TempDir) {
    let index = open(&temp_dir).await;
    index.ensure(4).await.unwrap();

    let response = index.query(&vec![1., 0., 0., 0.].into(), 5, true).await.unwrap();
    assert!(response.matches.is_empty());
}

#[rstest]
#[tokio::test]
async fn missing_metadata_row_fails_query(temp_dir: TempDir) {
    let index = open(&temp_dir).await;
    index.ensure(4).await.unwrap();
    index.upsert(&records()).await.unwrap();

    let db = metadata_db(&temp_dir).await;
    sqlx::query("DELETE FROM record WHERE key = 1").execute(&db).await.unwrap();

    let response = index.query(&vec![0., 1., 0., 0.].into(), 3, true).await.unwrap();
    assert_eq!(response.matches.len(), 3);
    assert_eq!(response.matches[0].id, "1");
    assert!(response.matches[0].metadata.is_none());

    let fetcher = FakeFetcher::default();
    let encoder = FakeEncoder { dimension: 4 };
    let err = Pipeline::new(&fetcher, &encoder, &index)
        .query(&tagged_image(1, 8, 8), 3)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MalformedMatch { ref id, .. } if id == "1"), "{err}");
}

#[rstest]
#[tokio::test]
async fn failed_upsert_leaves_index_unchanged(temp_dir: TempDir) {
    let index = open(&temp_dir).await;
    index.ensure(4).await.unwrap();
    index.upsert(&records()[..1]).await.unwrap();

    let db = metadata_db(&temp_dir).await;
    sqlx::query(
        "CREATE TRIGGER reject_c BEFORE INSERT ON record WHEN NEW.id = '2' \
         BEGIN SELECT RAISE(ABORT, 'rejected'); END",
    )
    .execute(&db)
    .await
    .unwrap();

    let err = index.upsert(&records()).await.unwrap_err();
    assert!(matches!(err, Error::Index(_)), "{err}");
    assert_eq!(index.len(), 1);

    let response = index.query(&vec![0., 1., 0., 0.].into(), 3, true).await.unwrap();
    let top = select_top(&response.matches, 3).unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].source, "https://img/a");

    let reopened = open(&temp_dir).await;
    reopened.ensure(4).await.unwrap();
    assert_eq!(reopened.len(), 1);
}
