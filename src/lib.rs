//! # B.Ed Results Scraper
//!
//! 批量查询 B.Ed 入学考试成绩的 Rust 应用程序：自动填写门户表单、识别验证码、解析结果
//!
//! ## 架构设计
//!
//! 本系统采用四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 页面自动化契约（`AutomationSession` / `SessionFactory`）
//! - `browser/` - 基于 chromiumoxide 的实现，每个会话独占一个浏览器
//! - `ocr/` - 识别引擎契约、tesseract 实现与轮询引擎池
//!
//! ### ② 业务能力层（Services）
//! - `CaptchaSolver` - 多方案并发识别验证码，按置信度择优
//! - `CaptchaCache` - 按图片哈希缓存识别结果
//! - `PerformanceMonitor` - 识别耗时与成功率统计
//!
//! ### ③ 流程层（Workflow）
//! - `QueryFlow` - 单个学号的查询状态机（填表 → 验证码 → 提交 → 判定 → 重试）
//!
//! ### ④ 编排层（Orchestration）
//! - `BatchDispatcher` - 批量分片、工作者调度、失败降级
//! - `ResultService` - 对外入口
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod ocr;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::AppError;
pub use models::{BatchSummary, RollNumber, ScrapeOptions, ScrapeResult, StudentRecord};
pub use orchestrator::{BatchDispatcher, BatchOutcome, DispatchMode, ResultService};
pub use services::{CaptchaSolver, PerformanceMetrics, PerformanceMonitor};
pub use workflow::{QueryFlow, QueryRunner, RunnerFactory};
