use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;

use crate::cli::*;

static CONF_DIR: LazyLock<ConfDir> = LazyLock::new(|| {
    let proj_dirs =
        ProjectDirs::from("", "clipsearch", "clipsearch").expect("failed to get project dir");
    ConfDir { path: proj_dirs.config_dir().to_path_buf() }
});

fn default_config_dir() -> &'static str {
    CONF_DIR.path().to_str().unwrap()
}

#[derive(Parser, Debug, Clone)]
pub struct EncoderOptions {
    /// CLIP 图像编码器，可以是 ONNX 文件路径或模型名
    #[arg(short, long, value_name = "MODEL", default_value = "openai/clip-vit-base-patch32")]
    pub model: String,
    /// 推理设备
    #[arg(long, value_enum, default_value_t = Device::Auto)]
    pub device: Device,
}

#[derive(Parser, Debug, Clone)]
pub struct BatchOptions {
    /// 最多处理的候选图片数量
    #[arg(short, long, value_name = "N", default_value_t = 100)]
    pub limit: usize,
    /// 单张图片下载超时，单位为秒
    #[arg(long, value_name = "SECS", default_value_t = 20)]
    pub timeout: u64,
    /// 同时下载的图片数量，默认为 CPU 核数
    #[arg(long, value_name = "N", default_value_t = num_cpus::get())]
    pub concurrency: usize,
}

#[derive(Parser, Debug, Clone)]
pub struct IndexOptions {
    /// 向量索引后端
    #[arg(long, value_enum, default_value_t = Backend::Local)]
    pub backend: Backend,
    /// 索引名称
    #[arg(long, value_name = "NAME", default_value = "duneimage2")]
    pub index_name: String,
    /// Pinecone API key
    #[arg(long, env = "PINECONE_API_KEY", hide_env_values = true)]
    pub pinecone_api_key: Option<String>,
    /// Pinecone 控制面地址
    #[arg(long, value_name = "URL", default_value = "https://api.pinecone.io")]
    pub pinecone_url: String,
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// 显示的结果数量
    #[arg(short = 'k', long, value_name = "K", default_value_t = 5)]
    pub top_k: usize,
    /// 输出格式
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "clipsearch", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// clipsearch 配置文件目录
    #[arg(short, long, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 按关键词搜索图片，编码后写入向量索引
    Add(AddCommand),
    /// 用一张图片在索引中搜索相似图片
    Search(SearchCommand),
    /// 输出一张图片的特征向量
    Embed(EmbedCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回模型目录
    pub fn models(&self) -> PathBuf {
        self.path.join("models")
    }

    /// 返回本地向量索引文件的路径
    pub fn local_index(&self, name: &str) -> PathBuf {
        self.path.join(format!("{name}.usearch"))
    }

    /// 返回本地元数据库的路径
    pub fn local_database(&self, name: &str) -> PathBuf {
        self.path.join(format!("{name}.db"))
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    /// 可用时使用 CUDA，否则使用 CPU
    Auto,
    Cpu,
    Cuda,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// 本地 usearch 索引
    Local,
    /// Pinecone 云端索引
    Pinecone,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}
