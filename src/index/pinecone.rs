use std::time::Duration;

use log::{debug, info};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;
use tokio::time::sleep;

use super::VectorIndex;
use crate::encoder::Embedding;
use crate::error::{Error, Result};
use crate::matches::QueryResponse;
use crate::record::IndexRecord;

const API_VERSION: &str = "2024-07";
/// 单次 upsert 请求的最大记录数
const UPSERT_BATCH: usize = 100;
/// 等待新建索引就绪的最大轮询次数
const MAX_READY_POLLS: usize = 120;

/// Pinecone 云端索引
pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    name: String,
    control_url: String,
    cloud: String,
    region: String,
    poll_interval: Duration,
    /// 数据面地址，ensure 之后可用
    host: OnceCell<String>,
}

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexDescription>,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    name: String,
    #[serde(default)]
    dimension: Option<usize>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    status: Option<IndexStatus>,
}

#[derive(Debug, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

impl IndexDescription {
    fn ready_host(&self) -> Option<&str> {
        match (&self.host, &self.status) {
            (Some(host), Some(status)) if status.ready && !host.is_empty() => Some(host),
            _ => None,
        }
    }
}

impl PineconeIndex {
    pub fn new(api_key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            name: name.into(),
            control_url: "https://api.pinecone.io".into(),
            cloud: "aws".into(),
            region: "us-east-1".into(),
            poll_interval: Duration::from_secs(1),
            host: OnceCell::new(),
        }
    }

    /// 替换控制面地址
    pub fn with_control_url(mut self, url: impl Into<String>) -> Self {
        self.control_url = url.into().trim_end_matches('/').to_owned();
        self
    }

    /// 新建 serverless 索引时使用的云服务商和区域
    pub fn with_serverless(mut self, cloud: impl Into<String>, region: impl Into<String>) -> Self {
        self.cloud = cloud.into();
        self.region = region.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let resp = req.send().await.map_err(|e| Error::Index(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Index(format!("Pinecone 返回 HTTP {status}: {body}")));
        }
        Ok(resp)
    }

    async fn list_indexes(&self) -> Result<Vec<IndexDescription>> {
        let req = self.request(reqwest::Method::GET, format!("{}/indexes", self.control_url));
        let list: IndexList =
            self.send(req).await?.json().await.map_err(|e| Error::Index(e.to_string()))?;
        Ok(list.indexes)
    }

    async fn describe_index(&self) -> Result<IndexDescription> {
        let url = format!("{}/indexes/{}", self.control_url, self.name);
        let req = self.request(reqwest::Method::GET, url);
        self.send(req).await?.json().await.map_err(|e| Error::Index(e.to_string()))
    }

    async fn create_index(&self, dimension: usize) -> Result<()> {
        info!("索引 {} 不存在，正在创建", self.name);
        let body = json!({
            "name": self.name,
            "dimension": dimension,
            "metric": "cosine",
            "spec": { "serverless": { "cloud": self.cloud, "region": self.region } },
        });
        let req = self.request(reqwest::Method::POST, format!("{}/indexes", self.control_url));
        self.send(req.json(&body)).await?;
        Ok(())
    }

    async fn wait_ready(&self) -> Result<String> {
        for _ in 0..MAX_READY_POLLS {
            let desc = self.describe_index().await?;
            if let Some(host) = desc.ready_host() {
                return Ok(host.to_owned());
            }
            debug!("等待索引 {} 就绪", self.name);
            sleep(self.poll_interval).await;
        }
        Err(Error::Index(format!("索引 {} 长时间未就绪", self.name)))
    }

    fn host(&self) -> Result<&str> {
        self.host.get().map(String::as_str).ok_or_else(|| Error::Index("索引尚未初始化".into()))
    }
}

impl VectorIndex for PineconeIndex {
    async fn ensure(&self, dimension: usize) -> Result<()> {
        if self.host.initialized() {
            return Ok(());
        }

        let existing = self.list_indexes().await?.into_iter().find(|idx| idx.name == self.name);
        let host = match existing {
            Some(desc) => {
                if let Some(actual) = desc.dimension {
                    if actual != dimension {
                        return Err(Error::DimensionMismatch { expected: dimension, actual });
                    }
                }
                match desc.ready_host() {
                    Some(host) => host.to_owned(),
                    None => self.wait_ready().await?,
                }
            }
            None => {
                self.create_index(dimension).await?;
                self.wait_ready().await?
            }
        };

        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host
        } else {
            format!("https://{host}")
        };
        debug!("索引 {} 数据面地址: {host}", self.name);
        let _ = self.host.set(host);
        Ok(())
    }

    async fn upsert(&self, records: &[IndexRecord]) -> Result<()> {
        let host = self.host()?;
        for chunk in records.chunks(UPSERT_BATCH) {
            let req = self.request(reqwest::Method::POST, format!("{host}/vectors/upsert"));
            self.send(req.json(&json!({ "vectors": chunk }))).await?;
        }
        info!("已向 Pinecone 写入 {} 条记录", records.len());
        Ok(())
    }

    async fn query(
        &self,
        vector: &Embedding,
        top_k: usize,
        include_metadata: bool,
    ) -> Result<QueryResponse> {
        let host = self.host()?;
        let body = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": include_metadata,
        });
        let req = self.request(reqwest::Method::POST, format!("{host}/query"));
        self.send(req.json(&body)).await?.json().await.map_err(|e| Error::Index(e.to_string()))
    }
}
