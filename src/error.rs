use std::path::PathBuf;

use thiserror::Error;

/// 图片检索流程中的错误类型
#[derive(Debug, Error)]
pub enum Error {
    /// 网络请求失败、超时或返回了非成功状态码
    #[error("下载图片失败 {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// 本地图片不存在或无法读取
    #[error("图片不存在: {}", .0.display())]
    NotFound(PathBuf),

    /// 数据无法解码为图片
    #[error("无法解码图片 {source_name}: {reason}")]
    Decode { source_name: String, reason: String },

    /// 预处理或前向推理失败
    #[error("推理失败: {0}")]
    Inference(String),

    /// 编码器模型无法加载
    #[error("无法加载模型 {model}: {reason}")]
    ModelLoad { model: String, reason: String },

    /// 调用方违反了前置条件
    #[error("前置条件不满足: {0}")]
    Invariant(String),

    /// 索引返回的匹配结果结构不正确
    #[error("匹配结果 {id} 格式错误: {reason}")]
    MalformedMatch { id: String, reason: String },

    /// 向量维度与索引维度不一致
    #[error("向量维度不一致: 期望 {expected}, 实际 {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// 向量索引服务出错
    #[error("向量索引错误: {0}")]
    Index(String),

    /// 图片搜索服务出错
    #[error("图片搜索错误: {0}")]
    Search(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// 是否为单张图片级别的失败，批处理中遇到这类错误只跳过当前图片
    pub fn is_item_failure(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. } | Self::NotFound(_) | Self::Decode { .. } | Self::Inference(_)
        )
    }
}

impl From<opencv::Error> for Error {
    fn from(err: opencv::Error) -> Self {
        Self::Inference(err.to_string())
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Index(err.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
