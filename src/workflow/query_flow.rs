//! 单个学号的查询流程 - 流程层
//!
//! 核心职责：驱动"一次查询"的状态机
//!
//! 每次尝试的顺序：
//! 1. 确保会话可用（惰性创建，失败计入本次尝试）
//! 2. 清空并填写学号
//! 3. 截取验证码 → 识别
//! 4. 识别失败 → 刷新验证码，进入下一次尝试（不提交）
//! 5. 填写验证码 → 提交 → 等待本次提交对应的接口响应
//! 6. 成功 → 解析结果；"No record found" → 终止；其他 → 视为验证码错误，刷新后重试

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::infrastructure::{AutomationSession, ResponseMatcher, SessionFactory, SessionOptions};
use crate::models::record::NO_RECORD_MESSAGE;
use crate::models::{
    PortalResponse, PortalVerdict, Query, QueryOutcome, RollNumber, ScrapeOptions, ScrapeResult,
    StudentRecord,
};
use crate::services::CaptchaSolver;
use crate::workflow::result_parser::parse_result_table;

/// 有效验证码的最短长度
const MIN_CAPTCHA_LEN: usize = 3;

/// 查询状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Starting,
    AwaitingCaptcha,
    Submitting,
    Retrying,
    Success,
    NotFound,
    Exhausted,
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryState::Starting => "Starting",
            QueryState::AwaitingCaptcha => "AwaitingCaptcha",
            QueryState::Submitting => "Submitting",
            QueryState::Retrying => "Retrying",
            QueryState::Success => "Success",
            QueryState::NotFound => "NotFound",
            QueryState::Exhausted => "Exhausted",
        };
        f.write_str(name)
    }
}

/// 单次尝试的结果
#[derive(Debug)]
enum AttemptOutcome {
    Found(StudentRecord),
    NoRecord,
    /// 验证码没有识别出可用文本
    Unreadable,
    /// 门户拒绝了验证码
    Rejected,
}

/// 可执行查询的对象（状态机或测试替身）
#[async_trait]
pub trait QueryRunner: Send {
    async fn run(&mut self, roll_number: &RollNumber, max_attempts: usize) -> ScrapeResult;

    /// 释放会话
    async fn close(&mut self);
}

/// 为每个工作者创建独立的查询对象
pub trait RunnerFactory: Send + Sync {
    fn create(&self, worker_id: usize, options: &ScrapeOptions) -> Box<dyn QueryRunner>;

    /// 未指定重试次数时使用的默认值
    fn default_attempts(&self) -> usize;
}

/// 查询状态机
///
/// - 独占一个会话，不与其他工作者共享
/// - 会话在首次尝试时创建，出现异常后丢弃，下次尝试重新创建
/// - 只依赖会话工厂与验证码识别服务
pub struct QueryFlow {
    sessions: Arc<dyn SessionFactory>,
    solver: Arc<CaptchaSolver>,
    config: Arc<Config>,
    session_options: SessionOptions,
    session: Option<Box<dyn AutomationSession>>,
    label: String,
}

impl QueryFlow {
    pub fn new(
        sessions: Arc<dyn SessionFactory>,
        solver: Arc<CaptchaSolver>,
        config: Arc<Config>,
        options: &ScrapeOptions,
        label: impl Into<String>,
    ) -> Self {
        let session_options = SessionOptions {
            headless: options.headless.unwrap_or(config.headless),
            timeout: options
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.scraping_timeout()),
            launch_timeout: config.browser_timeout(),
        };
        Self {
            sessions,
            solver,
            config,
            session_options,
            session: None,
            label: label.into(),
        }
    }

    /// 执行一次完整查询，结果总是返回 `ScrapeResult`，不会向上抛错
    pub async fn run(&mut self, roll_number: &RollNumber, max_attempts: usize) -> ScrapeResult {
        let start = Instant::now();
        let max_attempts = max_attempts.max(1);
        let mut query = Query::new(roll_number.clone());
        let mut last_error = String::new();

        info!("{} 🚀 开始查询学号: {}", self.label, roll_number);
        self.trace(roll_number, QueryState::Starting);

        while query.attempts_made < max_attempts {
            query.attempts_made += 1;
            let attempt = query.attempts_made;
            info!("{} 第 {}/{} 次尝试: {}", self.label, attempt, max_attempts, roll_number);

            match self.attempt(roll_number, attempt).await {
                Ok(AttemptOutcome::Found(record)) => {
                    query.outcome = QueryOutcome::Success;
                    self.trace(roll_number, QueryState::Success);
                    info!("{} ✅ 查询成功: {}", self.label, roll_number);
                    self.finish(&query);
                    return ScrapeResult::found(roll_number, record, elapsed_ms(start));
                }
                Ok(AttemptOutcome::NoRecord) => {
                    query.outcome = QueryOutcome::NotFound;
                    self.trace(roll_number, QueryState::NotFound);
                    info!("{} ❌ 学号不存在: {}", self.label, roll_number);
                    self.finish(&query);
                    return ScrapeResult::failed(
                        roll_number.as_str(),
                        NO_RECORD_MESSAGE,
                        elapsed_ms(start),
                    );
                }
                Ok(AttemptOutcome::Unreadable) => {
                    last_error = "captcha could not be resolved".to_string();
                    self.trace(roll_number, QueryState::Retrying);
                }
                Ok(AttemptOutcome::Rejected) => {
                    last_error = "captcha rejected by portal".to_string();
                    self.trace(roll_number, QueryState::Retrying);
                }
                Err(e) => {
                    last_error = e.to_string();
                    error!("{} 第 {} 次尝试出错: {:#}", self.label, attempt, e);
                    // 识别引擎故障与页面无关，会话保持可用
                    if !matches!(e.downcast_ref::<AppError>(), Some(AppError::Recognition(_))) {
                        self.discard_session().await;
                    }
                    self.trace(roll_number, QueryState::Retrying);
                    if attempt < max_attempts {
                        tokio::time::sleep(Duration::from_millis(self.config.error_delay_ms))
                            .await;
                    }
                }
            }
        }

        query.outcome = QueryOutcome::Exhausted;
        self.trace(roll_number, QueryState::Exhausted);
        warn!(
            "{} ⚠️  {} 次尝试均失败: {} ({})",
            self.label, max_attempts, roll_number, last_error
        );
        self.finish(&query);
        ScrapeResult::failed(
            roll_number.as_str(),
            format!("Failed after {} attempts: {}", max_attempts, last_error),
            elapsed_ms(start),
        )
    }

    async fn attempt(
        &mut self,
        roll_number: &RollNumber,
        attempt: usize,
    ) -> Result<AttemptOutcome> {
        self.ensure_session().await?;
        let Some(session) = self.session.as_deref() else {
            anyhow::bail!("会话不可用");
        };
        let selectors = &self.config.selectors;

        session.fill(&selectors.roll_number, "").await?;
        session.fill(&selectors.captcha_input, "").await?;
        session.fill(&selectors.roll_number, roll_number.as_str()).await?;

        self.trace(roll_number, QueryState::AwaitingCaptcha);
        session
            .wait_for_element(&selectors.captcha_image, self.session_options.timeout)
            .await?;
        let image = session.screenshot_element(&selectors.captcha_image).await?;
        let captcha = self.solver.solve(&image, attempt).await?;

        if captcha.len() < MIN_CAPTCHA_LEN {
            info!("{} 验证码识别失败，刷新后重试: {}", self.label, roll_number);
            session.click(&selectors.refresh_captcha).await?;
            session.wait_ms(self.config.unreadable_captcha_delay_ms).await;
            return Ok(AttemptOutcome::Unreadable);
        }

        self.trace(roll_number, QueryState::Submitting);
        session.fill(&selectors.captcha_input, &captcha).await?;
        let matcher = ResponseMatcher::ok_response(&self.config.result_api_endpoint);
        let body = session
            .click_and_wait_for_response(
                &selectors.submit_button,
                &matcher,
                self.session_options.timeout,
            )
            .await?;

        match PortalResponse::from_json(body).verdict() {
            PortalVerdict::Found(applicant) => {
                let table = parse_result_table(session, &selectors.result_table).await;
                Ok(AttemptOutcome::Found(StudentRecord::from_sources(
                    roll_number.as_str(),
                    &applicant,
                    table.as_ref(),
                )))
            }
            PortalVerdict::NoRecord => Ok(AttemptOutcome::NoRecord),
            PortalVerdict::CaptchaRejected => {
                info!("{} 验证码被拒绝，刷新后重试: {}", self.label, roll_number);
                session.fill(&selectors.captcha_input, "").await?;
                session.click(&selectors.refresh_captcha).await?;
                session.wait_ms(self.config.rejected_captcha_delay_ms).await;
                Ok(AttemptOutcome::Rejected)
            }
        }
    }

    /// 没有会话时创建并打开门户页面
    async fn ensure_session(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        info!("{} 🔄 正在启动浏览器...", self.label);
        let session = self.sessions.open(&self.session_options).await?;
        if let Err(e) = session.navigate(&self.config.portal_url).await {
            let _ = session.close().await;
            return Err(e);
        }
        info!("{} ✅ 门户页面已加载", self.label);
        self.session = Some(session);
        Ok(())
    }

    async fn discard_session(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!("{} 关闭会话失败: {}", self.label, e);
            }
        }
    }

    fn finish(&self, query: &Query) {
        debug!(
            "{} {} 结束: {:?}，共 {} 次尝试",
            self.label, query.roll_number, query.outcome, query.attempts_made
        );
    }

    fn trace(&self, roll_number: &RollNumber, state: QueryState) {
        debug!("{} {} → {}", self.label, roll_number, state);
    }

    /// 关闭会话并输出缓存统计
    pub async fn close(&mut self) {
        if self.session.is_some() {
            self.discard_session().await;
            let stats = self.solver.cache_stats().await;
            info!(
                "{} 🔄 浏览器已关闭，验证码缓存: {} 条，命中率 {:.1}%",
                self.label, stats.size, stats.hit_rate
            );
        }
    }
}

#[async_trait]
impl QueryRunner for QueryFlow {
    async fn run(&mut self, roll_number: &RollNumber, max_attempts: usize) -> ScrapeResult {
        QueryFlow::run(self, roll_number, max_attempts).await
    }

    async fn close(&mut self) {
        QueryFlow::close(self).await
    }
}

/// 按配置创建查询状态机
pub struct QueryFlowFactory {
    sessions: Arc<dyn SessionFactory>,
    solver: Arc<CaptchaSolver>,
    config: Arc<Config>,
}

impl QueryFlowFactory {
    pub fn new(
        sessions: Arc<dyn SessionFactory>,
        solver: Arc<CaptchaSolver>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            sessions,
            solver,
            config,
        }
    }
}

impl RunnerFactory for QueryFlowFactory {
    fn create(&self, worker_id: usize, options: &ScrapeOptions) -> Box<dyn QueryRunner> {
        let label = if worker_id == 0 {
            "[顺序]".to_string()
        } else {
            format!("[工作者 {}]", worker_id)
        };
        Box::new(QueryFlow::new(
            self.sessions.clone(),
            self.solver.clone(),
            self.config.clone(),
            options,
            label,
        ))
    }

    fn default_attempts(&self) -> usize {
        self.config.max_attempts
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
