use std::time::Duration;

use clap::Parser;
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{EncoderOptions, Opts};
use crate::encoder::{ClipEncoder, ImageEncoder};
use crate::loader::ImageLoader;

#[derive(Parser, Debug, Clone)]
pub struct EmbedCommand {
    #[command(flatten)]
    pub encoder: EncoderOptions,
    /// 下载图片的超时时间，单位为秒
    #[arg(long, value_name = "SECS", default_value_t = 20)]
    pub timeout: u64,
    /// 图片路径或 URL
    pub image: String,
}

impl SubCommandExtend for EmbedCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let models = opts.conf_dir.models();
        let encoder = block_in_place(|| {
            ClipEncoder::initialize(&self.encoder.model, self.encoder.device, &models)
        })?;

        let loader = ImageLoader::new(Duration::from_secs(self.timeout))?;
        let image = loader.load(&self.image).await?;
        let embedding = block_in_place(|| encoder.embed(&image))?;

        println!("{}", serde_json::to_string(&embedding)?);
        Ok(())
    }
}
