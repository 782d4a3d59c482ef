use std::future::Future;

use log::{debug, info};
use serde::Deserialize;

use crate::error::{Error, Result};

/// 按关键词返回候选图片 URL 的搜索服务
pub trait ImageSearchProvider: Sync {
    fn search(&self, keyword: &str) -> impl Future<Output = Result<Vec<String>>> + Send;
}

/// SerpApi Google 图片搜索
pub struct SerpApiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    /// 每次请求的结果数量
    num: usize,
}

#[derive(Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    images_results: Vec<ImageResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ImageResult {
    #[serde(default)]
    original: Option<String>,
}

impl SerpApiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: "https://serpapi.com".into(),
            num: 100,
        }
    }

    /// 替换服务地址，主要用于测试
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl ImageSearchProvider for SerpApiProvider {
    async fn search(&self, keyword: &str) -> Result<Vec<String>> {
        info!("搜索图片: {keyword}");
        let num = self.num.to_string();
        let resp = self
            .client
            .get(format!("{}/search.json", self.base_url.trim_end_matches('/')))
            .query(&[
                ("engine", "google"),
                ("q", keyword),
                ("tbm", "isch"),
                ("num", num.as_str()),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Search(format!("HTTP {status}: {body}")));
        }

        let body: SerpApiResponse = resp.json().await.map_err(|e| Error::Search(e.to_string()))?;
        if let Some(error) = body.error {
            // 没有搜索结果时 SerpApi 同样返回 error 字段
            if error.contains("hasn't returned any results") {
                info!("关键词 {keyword} 没有搜索结果");
                return Ok(vec![]);
            }
            return Err(Error::Search(error));
        }

        let urls = body.images_results.into_iter().filter_map(|r| r.original).collect::<Vec<_>>();
        debug!("搜索到 {} 张图片", urls.len());
        Ok(urls)
    }
}
