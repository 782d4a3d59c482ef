use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use log::{debug, error, info, warn};
use serde_json::Value;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use super::VectorIndex;
use crate::encoder::Embedding;
use crate::error::{Error, Result};
use crate::matches::{QueryResponse, RawMatch};
use crate::record::IndexRecord;

/// 本地向量索引：usearch 保存向量，SQLite 保存元数据
pub struct LocalIndex {
    index_path: PathBuf,
    db: SqlitePool,
    index: OnceLock<Index>,
}

impl LocalIndex {
    /// 打开元数据库，向量索引在 [`VectorIndex::ensure`] 时加载
    pub async fn open(index_path: impl AsRef<Path>, db_path: impl AsRef<Path>) -> Result<Self> {
        let index_path = index_path.as_ref().to_path_buf();
        let db_path = db_path.as_ref();
        if let Some(parent) = index_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!("初始化数据库连接: {}", db_path.display());
        let options = SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .filename(db_path)
            .create_if_missing(true);
        let db = SqlitePool::connect_with(options).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS record (
                key INTEGER PRIMARY KEY,
                id TEXT NOT NULL,
                metadata TEXT NOT NULL
            )
            "#,
        )
        .execute(&db)
        .await?;

        Ok(Self { index_path, db, index: OnceLock::new() })
    }

    /// 索引中的向量数量
    pub fn len(&self) -> usize {
        self.index.get().map(|index| index.size()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn index(&self) -> Result<&Index> {
        self.index.get().ok_or_else(|| Error::Index("索引尚未创建".into()))
    }

    /// 丢弃内存中未保存的修改，重新加载磁盘上的索引
    fn restore(&self, index: &Index) {
        let restored = self.index_path_str().and_then(|path| index.load(path).map_err(usearch_err));
        if let Err(e) = restored {
            error!("无法恢复索引 {}: {e}", self.index_path.display());
        }
    }

    fn index_path_str(&self) -> Result<&str> {
        self.index_path
            .to_str()
            .ok_or_else(|| Error::Index(format!("无效的索引路径: {}", self.index_path.display())))
    }
}

impl VectorIndex for LocalIndex {
    async fn ensure(&self, dimension: usize) -> Result<()> {
        if let Some(index) = self.index.get() {
            return check_dimension(index.dimensions(), dimension);
        }

        let options = IndexOptions {
            dimensions: dimension,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            ..Default::default()
        };
        let index = Index::new(&options).map_err(usearch_err)?;
        if self.index_path.exists() {
            info!("加载本地索引: {}", self.index_path.display());
            index.load(self.index_path_str()?).map_err(usearch_err)?;
            check_dimension(index.dimensions(), dimension)?;
        } else {
            info!("索引不存在，创建新索引: {}", self.index_path.display());
            index.save(self.index_path_str()?).map_err(usearch_err)?;
        }
        debug!("索引中已有 {} 条向量", index.size());

        // 并发调用时只保留第一个
        let _ = self.index.set(index);
        Ok(())
    }

    async fn upsert(&self, records: &[IndexRecord]) -> Result<()> {
        let index = self.index()?;
        for record in records {
            check_dimension(index.dimensions(), record.values.len())?;
        }

        // 先写元数据，向量全部写入成功后才提交
        let mut tx = self.db.begin().await?;
        for record in records {
            let metadata =
                serde_json::to_string(&record.metadata).map_err(|e| Error::Index(e.to_string()))?;
            sqlx::query("INSERT OR REPLACE INTO record (key, id, metadata) VALUES (?, ?, ?)")
                .bind(record_key(&record.id) as i64)
                .bind(&record.id)
                .bind(metadata)
                .execute(&mut *tx)
                .await?;
        }

        if let Err(e) = add_vectors(index, records) {
            self.restore(index);
            return Err(e);
        }
        if let Err(e) = tx.commit().await {
            self.restore(index);
            return Err(e.into());
        }

        index.save(self.index_path_str()?).map_err(usearch_err)?;
        info!("写入 {} 条记录，索引共 {} 条", records.len(), index.size());
        Ok(())
    }

    async fn query(
        &self,
        vector: &Embedding,
        top_k: usize,
        include_metadata: bool,
    ) -> Result<QueryResponse> {
        let index = self.index()?;
        check_dimension(index.dimensions(), vector.len())?;
        if top_k == 0 || index.size() == 0 {
            return Ok(QueryResponse::default());
        }

        let found = index.search(vector.as_slice(), top_k).map_err(usearch_err)?;

        let mut matches = Vec::with_capacity(found.keys.len());
        for (key, distance) in found.keys.iter().zip(found.distances.iter()) {
            let row: Option<(String, String)> =
                sqlx::query_as("SELECT id, metadata FROM record WHERE key = ?")
                    .bind(*key as i64)
                    .fetch_optional(&self.db)
                    .await?;
            // usearch 的余弦距离为 1 - cos
            let score = 1. - distance;
            let Some((id, metadata)) = row else {
                // 交给调用方按格式错误处理，不静默丢弃
                warn!("向量 {key} 没有对应的元数据");
                matches.push(RawMatch { id: key.to_string(), score, metadata: None });
                continue;
            };
            let metadata = include_metadata
                .then(|| serde_json::from_str(&metadata).unwrap_or(Value::String(metadata)));
            matches.push(RawMatch { id, score, metadata });
        }

        Ok(QueryResponse { matches })
    }
}

fn add_vectors(index: &Index, records: &[IndexRecord]) -> Result<()> {
    index.reserve(index.size() + records.len()).map_err(usearch_err)?;
    for record in records {
        let key = record_key(&record.id);
        if index.contains(key) {
            index.remove(key).map_err(usearch_err)?;
        }
        index.add(key, record.values.as_slice()).map_err(usearch_err)?;
    }
    Ok(())
}

/// 记录 ID 到 usearch key 的映射，非数字 ID 取 blake3 哈希的前 8 字节
pub fn record_key(id: &str) -> u64 {
    id.parse().unwrap_or_else(|_| {
        let hash = blake3::hash(id.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    })
}

fn check_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::DimensionMismatch { expected, actual });
    }
    Ok(())
}

fn usearch_err(e: impl std::fmt::Display) -> Error {
    Error::Index(e.to_string())
}
