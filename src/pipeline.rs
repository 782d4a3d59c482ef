use indicatif::ProgressBar;
use log::info;

use crate::batch::{BatchEmbedder, SkippedImage};
use crate::encoder::ImageEncoder;
use crate::error::Result;
use crate::index::VectorIndex;
use crate::loader::{ImageFetcher, ImageHandle};
use crate::matches::{MatchResult, select_top};
use crate::provider::ImageSearchProvider;
use crate::record::assemble;
use crate::utils::block_in_place;

/// 一次入库的统计
#[derive(Debug)]
pub struct IndexReport {
    /// 候选 URL 总数
    pub candidates: usize,
    /// 成功写入索引的数量
    pub indexed: usize,
    pub skipped: Vec<SkippedImage>,
}

/// 串联下载、编码、入库和查询
pub struct Pipeline<'a, F, E, I> {
    fetcher: &'a F,
    encoder: &'a E,
    index: &'a I,
    concurrency: usize,
    pb: ProgressBar,
}

impl<'a, F, E, I> Pipeline<'a, F, E, I>
where
    F: ImageFetcher,
    E: ImageEncoder,
    I: VectorIndex,
{
    pub fn new(fetcher: &'a F, encoder: &'a E, index: &'a I) -> Self {
        Self { fetcher, encoder, index, concurrency: 1, pb: ProgressBar::hidden() }
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n;
        self
    }

    pub fn progress(mut self, pb: ProgressBar) -> Self {
        self.pb = pb;
        self
    }

    /// 按关键词搜索图片并写入索引
    pub async fn index_keyword<P: ImageSearchProvider>(
        &self,
        provider: &P,
        keyword: &str,
        limit: usize,
    ) -> Result<IndexReport> {
        let urls = provider.search(keyword).await?;
        self.index_urls(&urls, limit).await
    }

    /// 编码前 `limit` 个 URL 并写入索引，记录 ID 按成功顺序从 0 开始分配
    pub async fn index_urls(&self, urls: &[String], limit: usize) -> Result<IndexReport> {
        let output = BatchEmbedder::new(self.fetcher, self.encoder)
            .concurrency(self.concurrency)
            .progress(self.pb.clone())
            .embed_batch(urls, limit)
            .await;
        let records = assemble(&output.urls, &output.embeddings)?;

        self.index.ensure(self.encoder.dimension()).await?;
        if records.is_empty() {
            info!("没有可写入的图片");
        } else {
            self.index.upsert(&records).await?;
        }

        Ok(IndexReport {
            candidates: urls.len().min(limit),
            indexed: records.len(),
            skipped: output.skipped,
        })
    }

    /// 查询与图片最相似的 `top_k` 张图片
    pub async fn query(&self, image: &ImageHandle, top_k: usize) -> Result<Vec<MatchResult>> {
        let embedding = block_in_place(|| self.encoder.embed(image))?;
        self.index.ensure(self.encoder.dimension()).await?;
        let response = self.index.query(&embedding, top_k, true).await?;
        select_top(&response.matches, top_k)
    }
}
