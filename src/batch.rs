use futures::StreamExt;
use futures::stream;
use indicatif::ProgressBar;
use log::{info, warn};

use crate::encoder::{Embedding, ImageEncoder};
use crate::loader::ImageFetcher;
use crate::utils::block_in_place;

/// 批量嵌入的结果
///
/// `embeddings[i]` 一定是 `urls[i]` 的特征向量
#[derive(Debug, Default)]
pub struct BatchOutput {
    pub embeddings: Vec<Embedding>,
    pub urls: Vec<String>,
    /// 被跳过的图片及原因
    pub skipped: Vec<SkippedImage>,
}

#[derive(Debug)]
pub struct SkippedImage {
    pub url: String,
    pub reason: String,
}

impl BatchOutput {
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// 下载候选图片并逐个编码，单张图片的失败不会影响整个批次
pub struct BatchEmbedder<'a, F, E> {
    fetcher: &'a F,
    encoder: &'a E,
    concurrency: usize,
    pb: ProgressBar,
}

impl<'a, F: ImageFetcher, E: ImageEncoder> BatchEmbedder<'a, F, E> {
    pub fn new(fetcher: &'a F, encoder: &'a E) -> Self {
        Self { fetcher, encoder, concurrency: 1, pb: ProgressBar::hidden() }
    }

    /// 同时下载的图片数量，推理仍然逐张进行
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn progress(mut self, pb: ProgressBar) -> Self {
        self.pb = pb;
        self
    }

    /// 对前 `limit` 个 URL 计算特征向量
    ///
    /// 超出 `limit` 的 URL 不会被下载；下载、解码或推理失败的 URL 会被跳过
    pub async fn embed_batch(&self, urls: &[String], limit: usize) -> BatchOutput {
        let candidates = &urls[..urls.len().min(limit)];
        self.pb.set_length(candidates.len() as u64);

        // buffered 按输入顺序产出结果，下载可以并发但顺序不变
        let mut loaded = stream::iter(candidates)
            .map(|url| async move { (url, self.fetcher.fetch(url).await) })
            .buffered(self.concurrency);

        let mut output = BatchOutput::default();
        while let Some((url, image)) = loaded.next().await {
            match image.and_then(|image| block_in_place(|| self.encoder.embed(&image))) {
                Ok(embedding) => {
                    output.embeddings.push(embedding);
                    output.urls.push(url.clone());
                    self.pb.set_message(url.clone());
                }
                Err(e) => {
                    warn!("跳过图片 {url}: {e}");
                    output.skipped.push(SkippedImage { url: url.clone(), reason: e.to_string() });
                }
            }
            self.pb.inc(1);
        }

        info!(
            "图片编码完成: 成功 {} / 尝试 {}，跳过 {}",
            output.len(),
            candidates.len(),
            output.skipped.len()
        );
        output
    }
}
