use std::time::Duration;

use clap::Parser;
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{EncoderOptions, IndexOptions, Opts, SearchOptions};
use crate::encoder::ClipEncoder;
use crate::index::IndexBackend;
use crate::loader::ImageLoader;
use crate::pipeline::Pipeline;
use crate::utils::print_matches;

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub encoder: EncoderOptions,
    #[command(flatten)]
    pub index: IndexOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 下载图片的超时时间，单位为秒
    #[arg(long, value_name = "SECS", default_value_t = 20)]
    pub timeout: u64,
    /// 被搜索的图片，可以是本地路径或 URL
    pub image: String,
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let models = opts.conf_dir.models();
        let encoder = block_in_place(|| {
            ClipEncoder::initialize(&self.encoder.model, self.encoder.device, &models)
        })?;

        let loader = ImageLoader::new(Duration::from_secs(self.timeout))?;
        let image = loader.load(&self.image).await?;

        let index = IndexBackend::open(&self.index, &opts.conf_dir).await?;
        let result = Pipeline::new(&loader, &encoder, &index)
            .query(&image, self.search.top_k)
            .await?;

        print_matches(&result, self.search.output_format)
    }
}
