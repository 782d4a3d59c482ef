use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::Parser;
use indicatif::ProgressBar;
use log::info;
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{BatchOptions, EncoderOptions, IndexOptions, Opts};
use crate::encoder::{ClipEncoder, ImageEncoder};
use crate::index::IndexBackend;
use crate::loader::ImageLoader;
use crate::pipeline::Pipeline;
use crate::provider::{ImageSearchProvider, SerpApiProvider};
use crate::utils::{pb_style, read_url_list, write_url_list};

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    #[command(flatten)]
    pub encoder: EncoderOptions,
    #[command(flatten)]
    pub batch: BatchOptions,
    #[command(flatten)]
    pub index: IndexOptions,
    /// 图片搜索关键词
    #[arg(required_unless_present = "url_file")]
    pub keywords: Vec<String>,
    /// 从文件读取候选 URL，支持 JSON 数组或每行一个 URL，此时不会调用搜索服务
    #[arg(long, value_name = "FILE", conflicts_with = "keywords")]
    pub url_file: Option<PathBuf>,
    /// 将搜索到的 URL 保存为 JSON 文件
    #[arg(long, value_name = "FILE")]
    pub dump_urls: Option<PathBuf>,
    /// SerpApi key
    #[arg(long, env = "SERPAPI_KEY", hide_env_values = true)]
    pub serpapi_key: Option<String>,
}

impl AddCommand {
    async fn candidate_urls(&self) -> anyhow::Result<Vec<String>> {
        if let Some(path) = &self.url_file {
            return read_url_list(path).await;
        }

        let keyword = self.keywords.join(" ");
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(anyhow!("关键词不能为空"));
        }
        let api_key = self.serpapi_key.clone().context("未设置 SERPAPI_KEY")?;
        let urls = SerpApiProvider::new(api_key).search(keyword).await?;
        if let Some(path) = &self.dump_urls {
            write_url_list(path, &urls).await?;
        }
        Ok(urls)
    }
}

impl SubCommandExtend for AddCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let models = opts.conf_dir.models();
        let encoder = block_in_place(|| {
            ClipEncoder::initialize(&self.encoder.model, self.encoder.device, &models)
        })?;

        let urls = self.candidate_urls().await?;
        info!("共 {} 个候选 URL", urls.len());

        let loader = ImageLoader::new(Duration::from_secs(self.batch.timeout))?;
        let index = IndexBackend::open(&self.index, &opts.conf_dir).await?;

        let pb = ProgressBar::no_length().with_style(pb_style());
        let report = Pipeline::new(&loader, &encoder, &index)
            .concurrency(self.batch.concurrency)
            .progress(pb.clone())
            .index_urls(&urls, self.batch.limit)
            .await?;
        pb.finish_with_message("图片添加完成");

        println!(
            "写入 {} / {} 张图片，跳过 {} 张（向量维度 {}）",
            report.indexed,
            report.candidates,
            report.skipped.len(),
            encoder.dimension()
        );
        Ok(())
    }
}
