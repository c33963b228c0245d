//! 基于 chromiumoxide 的自动化会话
//!
//! 每个会话启动一个独立的浏览器进程，关闭会话即关闭浏览器。

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFinished, EventResponseReceived, GetResponseBodyParams,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::error::{AppError, BrowserError};
use crate::infrastructure::{
    AutomationSession, ResponseMatcher, ResponseMeta, SessionFactory, SessionOptions,
};

/// 轮询元素的间隔
const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 浏览器会话工厂
#[derive(Debug, Clone, Default)]
pub struct ChromeSessionFactory {
    chrome_executable: Option<String>,
}

impl ChromeSessionFactory {
    pub fn new(chrome_executable: Option<String>) -> Self {
        Self { chrome_executable }
    }
}

#[async_trait]
impl SessionFactory for ChromeSessionFactory {
    async fn open(&self, options: &SessionOptions) -> Result<Box<dyn AutomationSession>> {
        let session = ChromeSession::launch(self.chrome_executable.as_deref(), options).await?;
        Ok(Box::new(session))
    }
}

/// 单个浏览器会话：持有 Browser 与唯一的 Page
pub struct ChromeSession {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler_task: JoinHandle<()>,
    timeout: Duration,
}

impl ChromeSession {
    /// 启动浏览器并创建空白页面
    pub async fn launch(chrome_executable: Option<&str>, options: &SessionOptions) -> Result<Self> {
        info!("🚀 启动浏览器 (无头模式: {})...", options.headless);

        let mut builder = BrowserConfig::builder()
            .request_timeout(options.launch_timeout)
            .args(vec![
                "--disable-gpu",
                "--no-sandbox",
                "--disable-dev-shm-usage",
            ]);
        builder = if options.headless {
            builder.new_headless_mode()
        } else {
            builder.with_head()
        };
        if let Some(path) = chrome_executable {
            debug!("使用浏览器可执行文件: {}", path);
            builder = builder.chrome_executable(Path::new(path));
        }
        let config = builder.build().map_err(|reason| {
            error!("配置浏览器失败: {}", reason);
            AppError::Browser(BrowserError::ConfigurationFailed { reason })
        })?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
            error!("启动浏览器失败: {}", e);
            AppError::browser_launch_failed(e)
        })?;
        debug!("浏览器启动成功");

        // 在后台处理浏览器事件
        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("创建页面失败")?;
        page.execute(EnableParams::default())
            .await
            .context("启用网络事件失败")?;

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            page,
            handler_task,
            timeout: options.timeout,
        })
    }

    async fn wait_for_matching_body(
        &self,
        selector: &str,
        matcher: &ResponseMatcher,
    ) -> Result<String> {
        // 先建立监听再点击，确保只收到这次提交的响应
        let mut responses = self.page.event_listener::<EventResponseReceived>().await?;
        let mut finished = self.page.event_listener::<EventLoadingFinished>().await?;

        self.click(selector).await?;

        let request_id = loop {
            let event = responses
                .next()
                .await
                .ok_or(AppError::Browser(BrowserError::SessionClosed))?;
            let meta = ResponseMeta {
                url: event.response.url.clone(),
                status: u16::try_from(event.response.status).unwrap_or_default(),
            };
            if matcher.matches(&meta) {
                debug!("匹配到接口响应: {} ({})", meta.url, meta.status);
                break event.request_id.clone();
            }
        };

        while let Some(done) = finished.next().await {
            if done.request_id == request_id {
                break;
            }
        }

        let body = self
            .page
            .execute(GetResponseBodyParams::new(request_id))
            .await
            .context("读取接口响应失败")?;
        if body.result.base64_encoded {
            anyhow::bail!("接口响应为二进制内容");
        }
        Ok(body.result.body.clone())
    }
}

#[async_trait]
impl AutomationSession for ChromeSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        tokio::time::timeout(self.timeout, async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            anyhow::Ok(())
        })
        .await
        .map_err(|e| AppError::navigation_failed(url, e))?
        .map_err(|e| {
            error!("导航到 {} 失败: {}", url, e);
            e
        })?;
        info!("✅ 已导航到: {}", url);
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        let js_code = format!(
            r#"
            (() => {{
                const el = document.querySelector({});
                if (!el) return false;
                el.focus();
                el.value = {};
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()
            "#,
            serde_json::to_string(selector)?,
            serde_json::to_string(text)?
        );
        match self.eval(&js_code).await? {
            JsonValue::Bool(true) => Ok(()),
            _ => Err(AppError::Browser(BrowserError::ElementNotFound {
                selector: selector.to_string(),
            })
            .into()),
        }
    }

    async fn wait_for_element(&self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AppError::Browser(BrowserError::ElementTimeout {
                    selector: selector.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
                .into());
            }
            sleep(ELEMENT_POLL_INTERVAL).await;
        }
    }

    async fn screenshot_element(&self, selector: &str) -> Result<Vec<u8>> {
        let element = self
            .page
            .find_element(selector)
            .await
            .with_context(|| format!("找不到元素: {}", selector))?;
        let bytes = element
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .with_context(|| format!("截图失败: {}", selector))?;
        Ok(bytes)
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.page
            .find_element(selector)
            .await
            .with_context(|| format!("找不到元素: {}", selector))?
            .click()
            .await
            .with_context(|| format!("点击失败: {}", selector))?;
        Ok(())
    }

    async fn click_and_wait_for_response(
        &self,
        selector: &str,
        matcher: &ResponseMatcher,
        timeout: Duration,
    ) -> Result<JsonValue> {
        let body = tokio::time::timeout(timeout, self.wait_for_matching_body(selector, matcher))
            .await
            .map_err(|_| {
                AppError::Browser(BrowserError::ResponseTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            })??;

        // 非 JSON 响应交给上层按"未知形态"处理
        Ok(serde_json::from_str(&body).unwrap_or(JsonValue::String(body)))
    }

    async fn eval(&self, js_code: &str) -> Result<JsonValue> {
        let result = self.page.evaluate(js_code).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.browser.lock().await;
        if let Some(mut browser) = guard.take() {
            if let Err(e) = browser.close().await {
                warn!("关闭浏览器失败: {}", e);
            }
            let _ = browser.wait().await;
            self.handler_task.abort();
            debug!("浏览器已关闭");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // 需要本机安装 Chrome/Chromium：cargo test -- --ignored
    async fn test_launch_and_eval() {
        let _ = tracing_subscriber::fmt::try_init();

        let options = SessionOptions {
            headless: true,
            timeout: Duration::from_secs(30),
            launch_timeout: Duration::from_secs(30),
        };
        let session = ChromeSession::launch(None, &options)
            .await
            .expect("启动浏览器失败");

        let value = session.eval("1 + 2").await.expect("执行 JS 失败");
        assert_eq!(value, serde_json::json!(3));

        session.close().await.expect("关闭失败");
        // 重复关闭不报错
        session.close().await.expect("重复关闭失败");
    }
}
