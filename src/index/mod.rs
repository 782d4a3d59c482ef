mod local;
mod pinecone;

use std::future::Future;

use log::info;

pub use self::local::*;
pub use self::pinecone::*;
use crate::config::{Backend, ConfDir, IndexOptions};
use crate::encoder::Embedding;
use crate::error::{Error, Result};
use crate::matches::QueryResponse;
use crate::record::IndexRecord;

/// 存储向量及元数据，并提供余弦相似度查询的索引服务
pub trait VectorIndex: Sync {
    /// 索引不存在时按给定维度创建，已存在时检查维度是否一致
    fn ensure(&self, dimension: usize) -> impl Future<Output = Result<()>> + Send;

    /// 批量写入记录，相同 ID 的记录会被覆盖
    fn upsert(&self, records: &[IndexRecord]) -> impl Future<Output = Result<()>> + Send;

    /// 查询与 `vector` 最相似的 `top_k` 条记录
    fn query(
        &self,
        vector: &Embedding,
        top_k: usize,
        include_metadata: bool,
    ) -> impl Future<Output = Result<QueryResponse>> + Send;
}

/// 根据命令行选择的索引后端
pub enum IndexBackend {
    Local(LocalIndex),
    Pinecone(PineconeIndex),
}

impl IndexBackend {
    pub async fn open(opts: &IndexOptions, conf_dir: &ConfDir) -> Result<Self> {
        match opts.backend {
            Backend::Local => {
                info!("使用本地索引: {}", opts.index_name);
                let index = LocalIndex::open(
                    conf_dir.local_index(&opts.index_name),
                    conf_dir.local_database(&opts.index_name),
                )
                .await?;
                Ok(Self::Local(index))
            }
            Backend::Pinecone => {
                info!("使用 Pinecone 索引: {}", opts.index_name);
                let api_key = opts
                    .pinecone_api_key
                    .clone()
                    .ok_or_else(|| Error::Index("未设置 PINECONE_API_KEY".into()))?;
                let index = PineconeIndex::new(api_key, &opts.index_name)
                    .with_control_url(&opts.pinecone_url);
                Ok(Self::Pinecone(index))
            }
        }
    }
}

impl VectorIndex for IndexBackend {
    async fn ensure(&self, dimension: usize) -> Result<()> {
        match self {
            Self::Local(index) => index.ensure(dimension).await,
            Self::Pinecone(index) => index.ensure(dimension).await,
        }
    }

    async fn upsert(&self, records: &[IndexRecord]) -> Result<()> {
        match self {
            Self::Local(index) => index.upsert(records).await,
            Self::Pinecone(index) => index.upsert(records).await,
        }
    }

    async fn query(
        &self,
        vector: &Embedding,
        top_k: usize,
        include_metadata: bool,
    ) -> Result<QueryResponse> {
        match self {
            Self::Local(index) => index.query(vector, top_k, include_metadata).await,
            Self::Pinecone(index) => index.query(vector, top_k, include_metadata).await,
        }
    }
}
