use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 文字识别错误
    #[error("识别错误: {0}")]
    Recognition(#[from] RecognitionError),
    /// 输入校验错误
    #[error("输入错误: {0}")]
    Input(#[from] InputError),
    /// 批量分发错误
    #[error("分发错误: {0}")]
    Dispatch(#[from] DispatchError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 浏览器配置失败
    #[error("浏览器配置失败: {reason}")]
    ConfigurationFailed { reason: String },
    /// 启动浏览器失败
    #[error("启动浏览器失败: {source}")]
    LaunchFailed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 导航失败
    #[error("导航到 {url} 失败: {source}")]
    NavigationFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 等待元素超时
    #[error("等待元素 {selector} 超时 ({timeout_ms}ms)")]
    ElementTimeout { selector: String, timeout_ms: u64 },
    /// 元素不存在
    #[error("找不到元素: {selector}")]
    ElementNotFound { selector: String },
    /// 等待接口响应超时
    #[error("等待接口响应超时 ({timeout_ms}ms)")]
    ResponseTimeout { timeout_ms: u64 },
    /// 会话已关闭
    #[error("浏览器会话已关闭")]
    SessionClosed,
}

/// 文字识别错误
#[derive(Debug, Error)]
pub enum RecognitionError {
    /// 识别引擎无法构建
    #[error("无法创建识别引擎 #{index}: {reason}")]
    EngineUnavailable { index: usize, reason: String },
    /// 识别池为空
    #[error("识别池未初始化或没有可用引擎")]
    PoolEmpty,
    /// 验证码图片为空
    #[error("验证码图片为空")]
    EmptyImage,
    /// 引擎输出无法解析
    #[error("识别输出无法解析: {reason}")]
    MalformedOutput { reason: String },
}

/// 输入校验错误（在任何自动化操作之前拒绝）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// 学号格式不正确
    #[error("Invalid roll number format: {0}")]
    InvalidIdentifier(String),
    /// 批量列表为空
    #[error("rollNumbers must be a non-empty array")]
    EmptyBatch,
    /// 批量超出上限
    #[error("Maximum {max} roll numbers allowed per batch (got {actual})")]
    BatchTooLarge { max: usize, actual: usize },
}

/// 批量分发错误
#[derive(Debug, Error)]
pub enum DispatchError {
    /// 工作者未返回结果
    #[error("工作者 {worker_id} 未返回结果")]
    WorkerLost { worker_id: usize },
    /// 工作者崩溃
    #[error("工作者 {worker_id} 崩溃: {reason}")]
    WorkerCrashed { worker_id: usize, reason: String },
    /// 工作者结果与分配的学号不一致
    #[error("工作者 {worker_id} 返回 {actual} 条结果，应为 {expected} 条")]
    IncompleteResult {
        worker_id: usize,
        expected: usize,
        actual: usize,
    },
    /// 任务通道已关闭
    #[error("工作者 {worker_id} 的任务通道已关闭")]
    ChannelClosed { worker_id: usize },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件读取失败
    #[error("读取配置文件失败 ({path}): {reason}")]
    FileReadFailed { path: String, reason: String },
    /// 配置值非法
    #[error("配置项 {field} 非法: {reason}")]
    InvalidValue { field: String, reason: String },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建浏览器启动错误
    pub fn browser_launch_failed(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        AppError::Browser(BrowserError::LaunchFailed {
            source: Box::new(source),
        })
    }

    /// 创建导航失败错误
    pub fn navigation_failed(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::NavigationFailed {
            url: url.into(),
            source: Box::new(source),
        })
    }

    /// 创建识别引擎不可用错误
    pub fn engine_unavailable(index: usize, reason: impl Into<String>) -> Self {
        AppError::Recognition(RecognitionError::EngineUnavailable {
            index,
            reason: reason.into(),
        })
    }
}
