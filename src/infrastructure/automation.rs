//! 页面自动化能力 - 基础设施层
//!
//! 状态机只依赖这里的 trait，不直接接触浏览器。每个会话相互隔离、可以单独关闭。

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// 网络响应的元信息（用于匹配提交后的接口响应）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMeta {
    pub url: String,
    pub status: u16,
}

/// 接口响应匹配条件：URL 包含指定路径且状态码一致
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMatcher {
    pub url_fragment: String,
    pub status: u16,
}

impl ResponseMatcher {
    pub fn ok_response(url_fragment: impl Into<String>) -> Self {
        Self {
            url_fragment: url_fragment.into(),
            status: 200,
        }
    }

    pub fn matches(&self, meta: &ResponseMeta) -> bool {
        meta.status == self.status && meta.url.contains(&self.url_fragment)
    }
}

/// 打开会话的参数
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub headless: bool,
    /// 导航与响应等待超时
    pub timeout: Duration,
    /// 浏览器启动与 CDP 请求超时
    pub launch_timeout: Duration,
}

/// 一个独立的自动化会话（单线程顺序使用）
#[async_trait]
pub trait AutomationSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    /// 覆盖输入框内容（空字符串即清空）
    async fn fill(&self, selector: &str, text: &str) -> Result<()>;

    async fn wait_for_element(&self, selector: &str, timeout: Duration) -> Result<()>;

    async fn screenshot_element(&self, selector: &str) -> Result<Vec<u8>>;

    async fn click(&self, selector: &str) -> Result<()>;

    /// 点击后等待匹配的接口响应并返回其 JSON 内容
    ///
    /// 监听必须在点击之前建立，只接收这一次提交触发的响应。
    async fn click_and_wait_for_response(
        &self,
        selector: &str,
        matcher: &ResponseMatcher,
        timeout: Duration,
    ) -> Result<JsonValue>;

    /// 在页面中执行 JS 并返回 JSON 结果
    async fn eval(&self, js_code: &str) -> Result<JsonValue>;

    async fn wait_ms(&self, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    async fn close(&self) -> Result<()>;
}

/// 会话工厂：每个工作者通过它获得自己的会话
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, options: &SessionOptions) -> Result<Box<dyn AutomationSession>>;
}

/// 执行 JS 并反序列化为指定类型
pub async fn eval_as<T: DeserializeOwned>(
    session: &dyn AutomationSession,
    js_code: &str,
) -> Result<T> {
    let json_value = session.eval(js_code).await?;
    let typed_value = serde_json::from_value(json_value)?;
    Ok(typed_value)
}
