use std::path::Path;

use anyhow::Context;
use indicatif::ProgressStyle;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task;

use crate::config::OutputFormat;
use crate::matches::MatchResult;

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>5}/{len:5} ({eta}) {wide_msg}",
    )
    .expect("failed to build progress style")
    .progress_chars("##-")
}

/// 在当前工作线程上执行 CPU 密集的任务，期间其它任务移交给别的线程
///
/// 单线程运行时不支持 [`task::block_in_place`]，此时直接执行
pub fn block_in_place<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            task::block_in_place(f)
        }
        _ => f(),
    }
}

/// 读取 URL 列表，支持 JSON 数组或每行一个 URL
pub async fn read_url_list(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取 URL 列表: {}", path.display()))?;
    Ok(parse_url_list(&content))
}

pub fn parse_url_list(content: &str) -> Vec<String> {
    if let Ok(urls) = serde_json::from_str::<Vec<String>>(content) {
        return urls;
    }
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect()
}

/// 将 URL 列表保存为格式化的 JSON 数组
pub async fn write_url_list(path: &Path, urls: &[String]) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(urls)?;
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("无法写入 URL 列表: {}", path.display()))
}

pub fn print_matches(result: &[MatchResult], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            for m in result {
                println!("{:.2}\t{}\t{}", m.score, m.id, m.source);
            }
        }
    }
    Ok(())
}
