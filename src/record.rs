use serde::{Deserialize, Serialize};

use crate::encoder::Embedding;
use crate::error::{Error, Result};

/// 随向量一起写入索引的元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub id: usize,
    /// 图片的原始 URL
    pub source: String,
}

/// 一条待写入向量索引的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub values: Embedding,
    pub metadata: RecordMetadata,
}

/// 将成功编码的 URL 与向量组装为索引记录
///
/// 记录 ID 为其在输入中的下标（从 0 开始），两个序列长度必须一致
pub fn assemble(urls: &[String], embeddings: &[Embedding]) -> Result<Vec<IndexRecord>> {
    if urls.len() != embeddings.len() {
        return Err(Error::Invariant(format!(
            "URL 数量 ({}) 与向量数量 ({}) 不一致",
            urls.len(),
            embeddings.len()
        )));
    }

    Ok(urls
        .iter()
        .zip(embeddings)
        .enumerate()
        .map(|(i, (url, embedding))| IndexRecord {
            id: i.to_string(),
            values: embedding.clone(),
            metadata: RecordMetadata { id: i, source: url.clone() },
        })
        .collect())
}
