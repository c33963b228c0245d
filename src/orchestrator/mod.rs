//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `batch_dispatcher` - 批量查询分发器
//! - 校验批量请求
//! - 决定顺序处理还是分给多个工作者
//! - 工作者失败时整批降级为顺序处理
//!
//! ### `service` - 查询服务入口
//! - 组装引擎池、验证码识别服务、查询状态机
//! - 提供单个/批量查询、性能统计、缓存管理
//!
//! ## 层次关系
//!
//! ```text
//! service (ResultService)
//!     ↓
//! batch_dispatcher (处理 Vec<RollNumber>)
//!     ↓
//! workflow::QueryFlow (处理单个学号)
//!     ↓
//! services (能力层：验证码识别 / 缓存 / 性能统计)
//!     ↓
//! infrastructure + ocr (基础设施：自动化会话、识别引擎)
//! ```

pub mod batch_dispatcher;
pub mod service;

pub use batch_dispatcher::{
    validate_batch, BatchDispatcher, DispatchMode, DispatchReport, DispatchSettings,
    SEQUENTIAL_THRESHOLD,
};
pub use service::{BatchOutcome, ResultService};
