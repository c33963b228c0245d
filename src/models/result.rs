//! 查询结果与工作者消息

use serde::{Deserialize, Serialize};

use crate::models::identifier::RollNumber;
use crate::models::record::StudentRecord;

/// 单次查询的可选参数（随 WorkUnit 复制到工作者）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScrapeOptions {
    pub headless: Option<bool>,
    pub max_retries: Option<usize>,
    pub timeout_ms: Option<u64>,
}

impl ScrapeOptions {
    /// 实际尝试次数；未指定或为 0 时使用默认值
    pub fn attempts(&self, default: usize) -> usize {
        self.max_retries.filter(|&n| n > 0).unwrap_or(default)
    }
}

/// 单个学号的查询结果（对外可见，生成后不可变）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResult {
    pub roll_number: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<StudentRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
    pub processing_time: u64,
}

impl ScrapeResult {
    pub fn found(roll_number: &RollNumber, data: StudentRecord, elapsed_ms: u64) -> Self {
        Self {
            roll_number: roll_number.to_string(),
            success: true,
            data: Some(data),
            error: None,
            timestamp: now_iso(),
            processing_time: elapsed_ms,
        }
    }

    pub fn failed(
        roll_number: impl Into<String>,
        error: impl Into<String>,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            roll_number: roll_number.into(),
            success: false,
            data: None,
            error: Some(error.into()),
            timestamp: now_iso(),
            processing_time: elapsed_ms,
        }
    }
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// 查询的终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryOutcome {
    Pending,
    Success,
    NotFound,
    Exhausted,
}

/// 一次逻辑查询（由状态机独占，返回后销毁）
#[derive(Debug, Clone)]
pub struct Query {
    pub roll_number: RollNumber,
    pub attempts_made: usize,
    pub outcome: QueryOutcome,
}

impl Query {
    pub fn new(roll_number: RollNumber) -> Self {
        Self {
            roll_number,
            attempts_made: 0,
            outcome: QueryOutcome::Pending,
        }
    }
}

/// 发给工作者的任务
#[derive(Debug, Clone, PartialEq)]
pub struct WorkUnit {
    pub worker_id: usize,
    pub roll_numbers: Vec<RollNumber>,
    pub options: ScrapeOptions,
}

/// 工作者返回的结果
#[derive(Debug, Clone, PartialEq)]
pub struct WorkResult {
    pub worker_id: usize,
    pub results: Vec<ScrapeResult>,
    pub elapsed_ms: u64,
}

/// 批量处理摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub completed: usize,
    pub successful: usize,
    pub errors: Vec<String>,
    pub processing_time: u64,
}

impl BatchSummary {
    pub fn from_results(total: usize, results: &[ScrapeResult], elapsed_ms: u64) -> Self {
        let errors = results
            .iter()
            .filter(|r| !r.success)
            .map(|r| {
                let reason = r.error.as_deref().unwrap_or("Unknown error");
                format!("{}: {}", r.roll_number, reason)
            })
            .collect();
        Self {
            total,
            completed: results.len(),
            successful: results.iter().filter(|r| r.success).count(),
            errors,
            processing_time: elapsed_ms,
        }
    }
}
