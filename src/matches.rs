use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::{Error, Result};

/// 向量索引返回的一条原始匹配
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMatch {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// 一次查询的原始响应
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub matches: Vec<RawMatch>,
}

/// 展示给用户的匹配结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub id: String,
    pub score: f32,
    pub source: String,
}

/// 查询结果中的元数据
///
/// 部分索引服务把数字统一存为浮点数，`id` 可能以 `3.0` 的形式返回
#[derive(Deserialize)]
struct MatchMetadata {
    #[serde(default)]
    id: Option<Number>,
    source: String,
}

/// 按分数从高到低选出前 `k` 个匹配
///
/// 分数相同时保持原有顺序。被选中的匹配中只要有一条元数据格式错误，
/// 整个调用就会失败，而不是返回残缺的结果
pub fn select_top(matches: &[RawMatch], k: usize) -> Result<Vec<MatchResult>> {
    let mut sorted = matches.iter().collect::<Vec<_>>();
    // sort_by 是稳定排序，-0.0 与 0.0 视为相同分数
    sorted.sort_by(|a, b| sort_key(b.score).total_cmp(&sort_key(a.score)));

    sorted.into_iter().take(k).map(to_result).collect()
}

/// 分数最高的一条匹配
pub fn highest_score(matches: &[RawMatch]) -> Result<Option<MatchResult>> {
    Ok(select_top(matches, 1)?.into_iter().next())
}

fn to_result(m: &RawMatch) -> Result<MatchResult> {
    let malformed = |reason: String| Error::MalformedMatch { id: m.id.clone(), reason };

    if m.score.is_nan() {
        return Err(malformed("分数为 NaN".into()));
    }
    let metadata = m.metadata.clone().ok_or_else(|| malformed("缺少元数据".into()))?;
    let metadata: MatchMetadata =
        serde_json::from_value(metadata).map_err(|e| malformed(e.to_string()))?;
    if let Some(id) = &metadata.id {
        if !is_index(id) {
            return Err(malformed(format!("无效的记录 ID {id}")));
        }
    }

    Ok(MatchResult { id: m.id.clone(), score: m.score, source: metadata.source })
}

fn sort_key(score: f32) -> f32 {
    if score == 0. { 0. } else { score }
}

/// 非负整数，允许小数部分为 0 的浮点数
fn is_index(n: &Number) -> bool {
    n.is_u64() || n.as_f64().is_some_and(|f| f >= 0. && f.fract() == 0.)
}
