use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::ConfigError;

/// 表单元素选择器
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FormSelectors {
    /// 学号输入框
    pub roll_number: String,
    /// 验证码输入框
    pub captcha_input: String,
    /// 验证码图片
    pub captcha_image: String,
    /// 提交按钮
    pub submit_button: String,
    /// 刷新验证码
    pub refresh_captcha: String,
    /// 查询结果表格
    pub result_table: String,
}

impl Default for FormSelectors {
    fn default() -> Self {
        Self {
            roll_number: "#txtBarcode".to_string(),
            captcha_input: "#captchaInput".to_string(),
            captcha_image: "#imgcode".to_string(),
            submit_button: "#btnSubmit".to_string(),
            refresh_captcha: "#switchCode".to_string(),
            result_table: "#dataContainer table".to_string(),
        }
    }
}

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 门户配置 ---
    /// 查询门户地址
    pub portal_url: String,
    /// 查询结果接口路径（用于匹配提交后的响应）
    pub result_api_endpoint: String,
    /// 表单选择器
    pub selectors: FormSelectors,
    /// 单个学号最大尝试次数
    pub max_attempts: usize,
    /// 门户导航与响应等待超时（毫秒）
    pub scraping_timeout_ms: u64,

    // --- 浏览器配置 ---
    /// 是否无头模式
    pub headless: bool,
    /// 浏览器启动超时（毫秒）
    pub browser_timeout_ms: u64,
    /// 自定义浏览器可执行文件
    pub chrome_executable: Option<String>,

    // --- 批量分发 ---
    /// 最大工作者数量
    pub max_workers: usize,
    /// 单批最大学号数量
    pub max_batch_size: usize,

    // --- 验证码识别 ---
    /// 识别引擎数量
    pub ocr_worker_threads: usize,
    /// 并行识别方案数量
    pub parallel_ocr_attempts: usize,
    /// 单次识别竞速超时（毫秒）
    pub ocr_timeout_ms: u64,
    /// 验证码缓存容量
    pub captcha_cache_size: usize,
    /// 验证码缓存有效期（秒）
    pub captcha_cache_ttl_secs: u64,
    /// 写入缓存的最低置信度
    pub min_cache_confidence: f32,
    /// tesseract 可执行文件
    pub tesseract_path: String,

    // --- 延迟策略（毫秒） ---
    /// 验证码无法识别后刷新等待
    pub unreadable_captcha_delay_ms: u64,
    /// 验证码被拒绝后刷新等待
    pub rejected_captcha_delay_ms: u64,
    /// 自动化异常后等待
    pub error_delay_ms: u64,
    /// 工作者内学号间隔
    pub worker_request_delay_ms: u64,
    /// 顺序处理时学号间隔
    pub sequential_request_delay_ms: u64,

    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            portal_url: "https://resultsbed.samsodisha.gov.in/ResultBED/BEDSelectionlist"
                .to_string(),
            result_api_endpoint: "/ResultBED/appstatusbed".to_string(),
            selectors: FormSelectors::default(),
            max_attempts: 3,
            scraping_timeout_ms: 30_000,
            headless: true,
            browser_timeout_ms: 30_000,
            chrome_executable: None,
            max_workers: 4,
            max_batch_size: 100,
            ocr_worker_threads: 4,
            parallel_ocr_attempts: 4,
            ocr_timeout_ms: 3_000,
            captcha_cache_size: 100,
            captcha_cache_ttl_secs: 300,
            min_cache_confidence: 40.0,
            tesseract_path: "tesseract".to_string(),
            unreadable_captcha_delay_ms: 500,
            rejected_captcha_delay_ms: 300,
            error_delay_ms: 1_000,
            worker_request_delay_ms: 1_000,
            sequential_request_delay_ms: 500,
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 从环境变量加载，未设置的项使用默认值
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件加载，环境变量仍然优先
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config = Self::from_toml_str(&content).map_err(|e| ConfigError::FileReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(config.with_env_overrides())
    }

    /// 解析 TOML 文本（不读取环境变量）
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn with_env_overrides(self) -> Self {
        let default = self;
        Self {
            portal_url: std::env::var("PORTAL_URL").unwrap_or(default.portal_url),
            max_attempts: env_parse("MAX_RETRY_ATTEMPTS").unwrap_or(default.max_attempts),
            scraping_timeout_ms: env_parse("SCRAPING_TIMEOUT_MS")
                .unwrap_or(default.scraping_timeout_ms),
            headless: std::env::var("HEADLESS_MODE")
                .map(|v| v != "false")
                .unwrap_or(default.headless),
            browser_timeout_ms: env_parse("BROWSER_TIMEOUT_MS")
                .unwrap_or(default.browser_timeout_ms),
            chrome_executable: std::env::var("CHROME_EXECUTABLE")
                .ok()
                .or(default.chrome_executable),
            max_workers: env_parse("MAX_WORKERS").unwrap_or(default.max_workers),
            max_batch_size: env_parse("MAX_BATCH_SIZE").unwrap_or(default.max_batch_size),
            ocr_worker_threads: env_parse("OCR_WORKER_THREADS")
                .unwrap_or(default.ocr_worker_threads),
            parallel_ocr_attempts: env_parse("PARALLEL_OCR_ATTEMPTS")
                .unwrap_or(default.parallel_ocr_attempts),
            ocr_timeout_ms: env_parse("OCR_TIMEOUT_MS").unwrap_or(default.ocr_timeout_ms),
            captcha_cache_size: env_parse("CAPTCHA_CACHE_SIZE")
                .unwrap_or(default.captcha_cache_size),
            tesseract_path: std::env::var("TESSERACT_PATH").unwrap_or(default.tesseract_path),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
            ..default
        }
    }

    /// 校验配置值
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("max_attempts", self.max_attempts),
            ("max_workers", self.max_workers),
            ("max_batch_size", self.max_batch_size),
            ("ocr_worker_threads", self.ocr_worker_threads),
            ("parallel_ocr_attempts", self.parallel_ocr_attempts),
            ("captcha_cache_size", self.captcha_cache_size),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "必须大于 0".to_string(),
                });
            }
        }
        if !(0.0..=100.0).contains(&self.min_cache_confidence) {
            return Err(ConfigError::InvalidValue {
                field: "min_cache_confidence".to_string(),
                reason: format!("{} 不在 0-100 范围内", self.min_cache_confidence),
            });
        }
        Ok(())
    }

    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_millis(self.ocr_timeout_ms)
    }

    pub fn scraping_timeout(&self) -> Duration {
        Duration::from_millis(self.scraping_timeout_ms)
    }

    pub fn browser_timeout(&self) -> Duration {
        Duration::from_millis(self.browser_timeout_ms)
    }

    pub fn captcha_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.captcha_cache_ttl_secs)
    }
}

/// 读取并解析环境变量；无法解析时记录警告并沿用原值
fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let value = std::env::var(name).ok()?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(
                "{}，使用默认值",
                ConfigError::EnvVarParseFailed {
                    var_name: name.to_string(),
                    value,
                    expected_type: std::any::type_name::<T>().to_string(),
                }
            );
            None
        }
    }
}
