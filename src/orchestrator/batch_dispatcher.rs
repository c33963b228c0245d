//! 批量查询分发器 - 编排层
//!
//! ## 职责
//!
//! 1. **小批量**：不超过 3 个学号时直接在当前任务中顺序查询
//! 2. **分片**：其余情况按连续区间切分，每个工作者一片
//! 3. **并发**：每个工作者是独立的 tokio 任务，持有自己的查询状态机和会话
//! 4. **降级**：任一工作者没有按时交回完整结果，整批改为顺序重新查询
//!
//! 工作者之间只通过 mpsc 通道交换 `WorkUnit` / `WorkResult`，不共享会话。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{DispatchError, InputError};
use crate::models::{RollNumber, ScrapeOptions, ScrapeResult, WorkResult, WorkUnit};
use crate::utils::logging;
use crate::workflow::RunnerFactory;

/// 不超过该数量时不启动工作者
pub const SEQUENTIAL_THRESHOLD: usize = 3;

/// 本次分发采用的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Sequential,
    Distributed { workers: usize },
    /// 工作者失败后整批顺序重跑
    Fallback,
}

/// 分发结果：每个输入学号恰好对应一条结果
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub results: Vec<ScrapeResult>,
    pub mode: DispatchMode,
}

/// 分发参数
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    pub max_workers: usize,
    pub available_parallelism: usize,
    pub worker_delay: Duration,
    pub sequential_delay: Duration,
}

impl DispatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_workers: config.max_workers,
            available_parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            worker_delay: Duration::from_millis(config.worker_request_delay_ms),
            sequential_delay: Duration::from_millis(config.sequential_request_delay_ms),
        }
    }
}

/// 校验批量请求并规范化学号
pub fn validate_batch(
    raw: &[String],
    max_batch_size: usize,
) -> Result<Vec<RollNumber>, InputError> {
    if raw.is_empty() {
        return Err(InputError::EmptyBatch);
    }
    if raw.len() > max_batch_size {
        return Err(InputError::BatchTooLarge {
            max: max_batch_size,
            actual: raw.len(),
        });
    }
    raw.iter().map(|r| RollNumber::parse(r)).collect()
}

/// 批量查询分发器
pub struct BatchDispatcher {
    runners: Arc<dyn RunnerFactory>,
    settings: DispatchSettings,
}

impl BatchDispatcher {
    pub fn new(runners: Arc<dyn RunnerFactory>, settings: DispatchSettings) -> Self {
        Self { runners, settings }
    }

    /// 工作者数量：可用并行度、配置上限与批量大小三者取最小
    pub fn worker_count(&self, batch_len: usize) -> usize {
        self.settings
            .available_parallelism
            .min(self.settings.max_workers)
            .min(batch_len)
            .max(1)
    }

    /// 分发一批查询，结果顺序与输入一致
    pub async fn dispatch(
        &self,
        roll_numbers: &[RollNumber],
        options: &ScrapeOptions,
    ) -> DispatchReport {
        if roll_numbers.len() <= SEQUENTIAL_THRESHOLD {
            info!("📋 共 {} 个学号，直接顺序查询", roll_numbers.len());
            return DispatchReport {
                results: self.run_sequential(roll_numbers, options).await,
                mode: DispatchMode::Sequential,
            };
        }

        let workers = self.worker_count(roll_numbers.len());
        match self.distribute(roll_numbers, options, workers).await {
            Ok((results, spawned)) => DispatchReport {
                results,
                mode: DispatchMode::Distributed { workers: spawned },
            },
            Err(e) => {
                error!("❌ 分布式处理失败: {}，改为顺序处理整批", e);
                DispatchReport {
                    results: self.run_sequential(roll_numbers, options).await,
                    mode: DispatchMode::Fallback,
                }
            }
        }
    }

    async fn distribute(
        &self,
        roll_numbers: &[RollNumber],
        options: &ScrapeOptions,
        workers: usize,
    ) -> Result<(Vec<ScrapeResult>, usize), DispatchError> {
        let chunk_size = roll_numbers.len().div_ceil(workers);
        let chunks: Vec<Vec<RollNumber>> =
            roll_numbers.chunks(chunk_size).map(<[RollNumber]>::to_vec).collect();
        let spawned = chunks.len();
        logging::log_distribution(roll_numbers.len(), spawned, chunk_size);

        let (result_tx, mut result_rx) = mpsc::channel::<WorkResult>(spawned);
        let mut expected = Vec::with_capacity(spawned);
        let mut handles = Vec::with_capacity(spawned);

        for (index, chunk) in chunks.into_iter().enumerate() {
            let worker_id = index + 1;
            let (task_tx, task_rx) = mpsc::channel::<WorkUnit>(1);
            let handle = tokio::spawn(run_worker(
                self.runners.clone(),
                task_rx,
                result_tx.clone(),
                self.settings.worker_delay,
            ));
            handles.push((worker_id, handle));
            expected.push((worker_id, chunk.len()));

            task_tx
                .send(WorkUnit {
                    worker_id,
                    roll_numbers: chunk,
                    options: options.clone(),
                })
                .await
                .map_err(|_| DispatchError::ChannelClosed { worker_id })?;
        }
        drop(result_tx);

        let mut reported: HashMap<usize, WorkResult> = HashMap::with_capacity(spawned);
        while let Some(result) = result_rx.recv().await {
            info!(
                "[工作者 {}] ✓ 完成 {} 个学号 ({})",
                result.worker_id,
                result.results.len(),
                logging::format_elapsed(result.elapsed_ms)
            );
            reported.insert(result.worker_id, result);
        }

        for (worker_id, handle) in handles {
            if let Err(e) = handle.await {
                return Err(DispatchError::WorkerCrashed {
                    worker_id,
                    reason: e.to_string(),
                });
            }
        }

        let mut results = Vec::with_capacity(roll_numbers.len());
        for (worker_id, expected_len) in expected {
            let report = reported
                .remove(&worker_id)
                .ok_or(DispatchError::WorkerLost { worker_id })?;
            if report.results.len() != expected_len {
                return Err(DispatchError::IncompleteResult {
                    worker_id,
                    expected: expected_len,
                    actual: report.results.len(),
                });
            }
            results.extend(report.results);
        }
        Ok((results, spawned))
    }

    /// 在当前任务中逐个查询，两次查询之间短暂停顿
    async fn run_sequential(
        &self,
        roll_numbers: &[RollNumber],
        options: &ScrapeOptions,
    ) -> Vec<ScrapeResult> {
        let mut runner = self.runners.create(0, options);
        let max_attempts = options.attempts(self.runners.default_attempts());

        let mut results = Vec::with_capacity(roll_numbers.len());
        for (index, roll_number) in roll_numbers.iter().enumerate() {
            if index > 0 {
                sleep(self.settings.sequential_delay).await;
            }
            logging::log_query_progress(index + 1, roll_numbers.len(), roll_number.as_str());
            results.push(runner.run(roll_number, max_attempts).await);
        }
        runner.close().await;
        results
    }
}

/// 工作者循环：领取任务，顺序查询，交回结果
async fn run_worker(
    runners: Arc<dyn RunnerFactory>,
    mut tasks: mpsc::Receiver<WorkUnit>,
    results: mpsc::Sender<WorkResult>,
    delay: Duration,
) {
    while let Some(unit) = tasks.recv().await {
        let start = Instant::now();
        let worker_id = unit.worker_id;
        info!("[工作者 {}] 🚀 开始处理 {} 个学号", worker_id, unit.roll_numbers.len());

        let mut runner = runners.create(worker_id, &unit.options);
        let max_attempts = unit.options.attempts(runners.default_attempts());

        let mut out = Vec::with_capacity(unit.roll_numbers.len());
        for (index, roll_number) in unit.roll_numbers.iter().enumerate() {
            if index > 0 {
                sleep(delay).await;
            }
            out.push(runner.run(roll_number, max_attempts).await);
        }
        runner.close().await;

        let report = WorkResult {
            worker_id,
            results: out,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        if results.send(report).await.is_err() {
            warn!("[工作者 {}] 结果通道已关闭", worker_id);
            break;
        }
    }
}
