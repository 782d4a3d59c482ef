use std::future::Future;
use std::path::Path;
use std::time::Duration;

use log::debug;
use opencv::core::{CV_8UC3, Mat};
use opencv::prelude::*;
use opencv::{imgcodecs, imgproc};
use tokio::task::spawn_blocking;
use url::Url;

use crate::error::{Error, Result};

/// 部分图床会拒绝没有 UA 的请求
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0 Safari/537.36";

/// 解码后的 RGB 图片，保证为 8 位三通道
#[derive(Debug)]
pub struct ImageHandle {
    mat: Mat,
}

impl ImageHandle {
    /// 从内存中的图片数据解码
    ///
    /// # Arguments
    ///
    /// * `bytes` - 图片文件内容
    /// * `source` - 图片来源，仅用于错误信息
    pub fn decode(bytes: &[u8], source: &str) -> Result<Self> {
        let decode_err = |reason: String| Error::Decode { source_name: source.to_owned(), reason };

        if bytes.is_empty() {
            return Err(decode_err("数据为空".into()));
        }
        let buf = Mat::from_slice(bytes).map_err(|e| decode_err(e.to_string()))?;
        // IMREAD_COLOR 会把灰度、带透明通道的图片统一转换为 BGR 三通道
        let bgr = imgcodecs::imdecode(&buf, imgcodecs::IMREAD_COLOR)
            .map_err(|e| decode_err(e.to_string()))?;
        if bgr.empty() {
            return Err(decode_err("不支持的图片格式".into()));
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color_def(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB)
            .map_err(|e| decode_err(e.to_string()))?;
        Ok(Self { mat: rgb })
    }

    /// 使用已有的 RGB 矩阵构造图片
    pub fn from_rgb_mat(mat: Mat) -> Result<Self> {
        if mat.empty() || mat.typ() != CV_8UC3 {
            return Err(Error::Decode {
                source_name: "<mat>".into(),
                reason: format!("需要非空的 8UC3 矩阵，实际类型 {}", mat.typ()),
            });
        }
        Ok(Self { mat })
    }

    pub fn width(&self) -> i32 {
        self.mat.cols()
    }

    pub fn height(&self) -> i32 {
        self.mat.rows()
    }

    pub fn as_mat(&self) -> &Mat {
        &self.mat
    }
}

/// 按 URL 获取图片的能力，批量嵌入通过它下载候选图片
pub trait ImageFetcher: Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<ImageHandle>> + Send;
}

/// 从网络或本地文件加载图片
#[derive(Debug, Clone)]
pub struct ImageLoader {
    client: reqwest::Client,
}

impl ImageLoader {
    /// 创建加载器
    ///
    /// # Arguments
    ///
    /// * `timeout` - 单个请求的超时时间，超时视为下载失败
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Fetch { url: String::new(), reason: e.to_string() })?;
        Ok(Self { client })
    }

    /// 下载并解码一张网络图片
    pub async fn load_from_url(&self, url: &str) -> Result<ImageHandle> {
        let fetch_err = |reason: String| Error::Fetch { url: url.to_owned(), reason };

        debug!("下载图片: {url}");
        let resp = self.client.get(url).send().await.map_err(|e| fetch_err(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(fetch_err(format!("HTTP {status}")));
        }
        let bytes = resp.bytes().await.map_err(|e| fetch_err(e.to_string()))?;

        let source = url.to_owned();
        spawn_blocking(move || ImageHandle::decode(&bytes, &source))
            .await
            .map_err(|e| Error::Decode { source_name: url.to_owned(), reason: e.to_string() })?
    }

    /// 读取并解码一张本地图片
    pub async fn load_from_path(&self, path: impl AsRef<Path>) -> Result<ImageHandle> {
        let path = path.as_ref().to_path_buf();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(path));
            }
            Err(e) => return Err(e.into()),
        };

        let source = path.display().to_string();
        spawn_blocking(move || ImageHandle::decode(&bytes, &source))
            .await
            .map_err(|e| Error::Decode {
                source_name: path.display().to_string(),
                reason: e.to_string(),
            })?
    }

    /// 根据来源自动选择网络或本地加载，`http(s)://` 开头的视为 URL
    pub async fn load(&self, source: &str) -> Result<ImageHandle> {
        if is_remote(source) {
            self.load_from_url(source).await
        } else {
            self.load_from_path(source).await
        }
    }

    /// 检查 URL 当前是否指向一张可解码的图片
    ///
    /// 需要使用图片时应直接调用 [`ImageLoader::load_from_url`]，避免重复下载
    pub async fn validate_url(&self, url: &str) -> bool {
        self.load_from_url(url).await.is_ok()
    }
}

impl ImageFetcher for ImageLoader {
    async fn fetch(&self, url: &str) -> Result<ImageHandle> {
        self.load_from_url(url).await
    }
}

fn is_remote(source: &str) -> bool {
    Url::parse(source).map(|url| matches!(url.scheme(), "http" | "https")).unwrap_or(false)
}
