use clap::Parser;
use clipsearch::cli::SubCommandExtend;
use clipsearch::config::SubCommand;
use clipsearch::Opts;
use env_logger::Env;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();
    match &opts.subcmd {
        SubCommand::Add(config) => config.run(&opts).await,
        SubCommand::Search(config) => config.run(&opts).await,
        SubCommand::Embed(config) => config.run(&opts).await,
    }
}
