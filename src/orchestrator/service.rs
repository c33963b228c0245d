//! 成绩查询服务 - 编排层入口
//!
//! 持有配置、识别引擎池、验证码识别服务与性能统计，对外提供单个/批量查询。

use std::sync::Arc;

use tokio::time::Instant;
use tracing::info;

use crate::config::Config;
use crate::error::InputError;
use crate::infrastructure::SessionFactory;
use crate::models::{BatchSummary, RollNumber, ScrapeOptions, ScrapeResult};
use crate::ocr::{EngineFactory, RecognitionPool, RecognitionProfile};
use crate::orchestrator::batch_dispatcher::{
    validate_batch, BatchDispatcher, DispatchMode, DispatchSettings,
};
use crate::services::{
    CacheStats, CaptchaSolver, PerformanceMetrics, PerformanceMonitor, SolverSettings,
};
use crate::utils::logging;
use crate::workflow::{QueryFlowFactory, RunnerFactory};

/// 批量查询的返回值
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub results: Vec<ScrapeResult>,
    pub summary: BatchSummary,
    pub mode: DispatchMode,
}

/// 成绩查询服务
pub struct ResultService {
    config: Arc<Config>,
    solver: Arc<CaptchaSolver>,
    runners: Arc<dyn RunnerFactory>,
    dispatcher: BatchDispatcher,
}

impl ResultService {
    /// 按配置组装完整的查询服务
    pub fn new(
        config: Config,
        sessions: Arc<dyn SessionFactory>,
        engines: Arc<dyn EngineFactory>,
    ) -> Self {
        let config = Arc::new(config);
        let pool = Arc::new(RecognitionPool::new(
            engines,
            config.ocr_worker_threads,
            RecognitionProfile::baseline(),
        ));
        let solver = Arc::new(CaptchaSolver::new(
            pool,
            Arc::new(PerformanceMonitor::new()),
            SolverSettings::from_config(&config),
        ));
        let runners: Arc<dyn RunnerFactory> = Arc::new(QueryFlowFactory::new(
            sessions,
            solver.clone(),
            config.clone(),
        ));
        Self::from_parts(config, solver, runners)
    }

    /// 使用外部提供的查询工厂
    pub fn from_parts(
        config: Arc<Config>,
        solver: Arc<CaptchaSolver>,
        runners: Arc<dyn RunnerFactory>,
    ) -> Self {
        let dispatcher =
            BatchDispatcher::new(runners.clone(), DispatchSettings::from_config(&config));
        Self {
            config,
            solver,
            runners,
            dispatcher,
        }
    }

    /// 查询单个学号；学号格式错误时不会启动任何会话
    pub async fn scrape_single(
        &self,
        raw: &str,
        options: &ScrapeOptions,
    ) -> Result<ScrapeResult, InputError> {
        let roll_number = RollNumber::parse(raw)?;
        let max_attempts = options.attempts(self.runners.default_attempts());

        let mut runner = self.runners.create(0, options);
        let result = runner.run(&roll_number, max_attempts).await;
        runner.close().await;
        Ok(result)
    }

    /// 批量查询；任何一个学号不合法则整批拒绝
    pub async fn scrape_batch(
        &self,
        raw: &[String],
        options: &ScrapeOptions,
    ) -> Result<BatchOutcome, InputError> {
        let roll_numbers = validate_batch(raw, self.config.max_batch_size)?;
        let start = Instant::now();
        logging::log_startup(roll_numbers.len(), self.config.max_workers);

        let report = self.dispatcher.dispatch(&roll_numbers, options).await;
        let summary = BatchSummary::from_results(
            roll_numbers.len(),
            &report.results,
            start.elapsed().as_millis() as u64,
        );
        logging::print_summary(&summary);
        info!("分发方式: {:?}", report.mode);

        Ok(BatchOutcome {
            results: report.results,
            summary,
            mode: report.mode,
        })
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        self.solver.monitor().metrics()
    }

    pub fn reset_metrics(&self) {
        self.solver.monitor().reset();
    }

    pub fn log_performance(&self) {
        self.solver.monitor().log_report();
        logging::print_assessment(&self.metrics());
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.solver.cache_stats().await
    }

    pub async fn clear_cache(&self) {
        self.solver.clear_cache().await;
    }

    /// 释放识别引擎
    pub async fn shutdown(&self) {
        self.solver.terminate().await;
        info!("👋 查询服务已关闭");
    }
}
