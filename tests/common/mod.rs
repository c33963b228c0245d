//! 集成测试共用的假门户与假识别引擎

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use bed_results_scraper::config::Config;
use bed_results_scraper::infrastructure::{
    AutomationSession, ResponseMatcher, SessionFactory, SessionOptions,
};
use bed_results_scraper::ocr::{EngineFactory, RawRecognition, RecognitionProfile, TextRecognizer};
use bed_results_scraper::ResultService;

/// 门户脚本：依次返回验证码图片与提交响应，并记录页面操作
#[derive(Default)]
pub struct PortalScript {
    pub captcha_images: Mutex<VecDeque<Vec<u8>>>,
    pub responses: Mutex<VecDeque<JsonValue>>,
    pub table: Mutex<Option<JsonValue>>,
    pub events: Mutex<Vec<String>>,
    pub fail_screenshots: AtomicUsize,
    pub fail_opens: AtomicUsize,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub submits: AtomicUsize,
}

impl PortalScript {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_captchas(self: &Arc<Self>, images: &[&str]) -> Arc<Self> {
        self.captcha_images
            .lock()
            .unwrap()
            .extend(images.iter().map(|i| i.as_bytes().to_vec()));
        self.clone()
    }

    pub fn with_responses(self: &Arc<Self>, responses: Vec<JsonValue>) -> Arc<Self> {
        self.responses.lock().unwrap().extend(responses);
        self.clone()
    }

    pub fn with_table(self: &Arc<Self>, table: JsonValue) -> Arc<Self> {
        *self.table.lock().unwrap() = Some(table);
        self.clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }

    fn log(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn success_response() -> JsonValue {
    json!({
        "state": "success",
        "data": {
            "vchApplicantName": "API NAME",
            "vchCourse": "B.Ed",
            "vchStream": "Arts",
            "vchSocialCategory": "GEN",
            "vchPreference": "61.25"
        }
    })
}

pub fn no_record_response() -> JsonValue {
    json!({ "state": "error", "message": "No record found" })
}

pub fn invalid_captcha_response() -> JsonValue {
    json!({ "state": "error", "message": "Invalid Captcha" })
}

pub struct MockSession {
    script: Arc<PortalScript>,
}

#[async_trait]
impl AutomationSession for MockSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.script.log(format!("navigate {}", url));
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        self.script.log(format!("fill {}={}", selector, text));
        Ok(())
    }

    async fn wait_for_element(&self, _selector: &str, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn screenshot_element(&self, selector: &str) -> Result<Vec<u8>> {
        let remaining = self.script.fail_screenshots.load(Ordering::SeqCst);
        if remaining > 0 {
            self.script.fail_screenshots.store(remaining - 1, Ordering::SeqCst);
            return Err(anyhow!("page crashed"));
        }
        self.script.log(format!("screenshot {}", selector));
        let mut images = self.script.captcha_images.lock().unwrap();
        let image = if images.len() > 1 {
            images.pop_front()
        } else {
            images.front().cloned()
        };
        image.ok_or_else(|| anyhow!("no captcha image scripted"))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.script.log(format!("click {}", selector));
        Ok(())
    }

    async fn click_and_wait_for_response(
        &self,
        selector: &str,
        _matcher: &ResponseMatcher,
        _timeout: Duration,
    ) -> Result<JsonValue> {
        self.script.submits.fetch_add(1, Ordering::SeqCst);
        self.script.log(format!("submit {}", selector));
        self.script
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("response timeout"))
    }

    async fn eval(&self, _js_code: &str) -> Result<JsonValue> {
        Ok(self.script.table.lock().unwrap().clone().unwrap_or(JsonValue::Null))
    }

    async fn close(&self) -> Result<()> {
        self.script.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockSessionFactory {
    pub script: Arc<PortalScript>,
}

#[async_trait]
impl SessionFactory for MockSessionFactory {
    async fn open(&self, _options: &SessionOptions) -> Result<Box<dyn AutomationSession>> {
        let remaining = self.script.fail_opens.load(Ordering::SeqCst);
        if remaining > 0 {
            self.script.fail_opens.store(remaining - 1, Ordering::SeqCst);
            return Err(anyhow!("browser launch failed"));
        }
        self.script.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            script: self.script.clone(),
        }))
    }
}

/// 假识别引擎
///
/// 图片内容即识别脚本：`"AB12XZ:85"` 对所有方案生效，
/// `"single-word=AB12XZ:85;single-line=Q:30"` 按方案名分别指定。
pub struct ScriptedEngine {
    pub calls: Arc<AtomicUsize>,
}

fn parse_answer(answer: &str) -> (String, f32) {
    let (text, conf) = answer.rsplit_once(':').unwrap_or((answer, "0"));
    (text.to_string(), conf.parse().unwrap_or(0.0))
}

#[async_trait]
impl TextRecognizer for ScriptedEngine {
    async fn recognize(
        &self,
        image: &[u8],
        profile: &RecognitionProfile,
    ) -> Result<RawRecognition> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = String::from_utf8_lossy(image).to_string();

        let answer = if script.contains('=') {
            script
                .split(';')
                .filter_map(|part| part.split_once('='))
                .find(|(name, _)| *name == profile.name)
                .map(|(_, answer)| parse_answer(answer))
                .unwrap_or_else(|| (String::new(), 0.0))
        } else {
            parse_answer(&script)
        };

        Ok(RawRecognition {
            text: answer.0,
            confidence: answer.1,
        })
    }
}

#[derive(Default)]
pub struct ScriptedEngineFactory {
    pub calls: Arc<AtomicUsize>,
    pub creates: AtomicUsize,
    pub unavailable: AtomicBool,
}

#[async_trait]
impl EngineFactory for ScriptedEngineFactory {
    async fn create(
        &self,
        _index: usize,
        _baseline: &RecognitionProfile,
    ) -> Result<Arc<dyn TextRecognizer>> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(anyhow!("tesseract binary not found"));
        }
        Ok(Arc::new(ScriptedEngine {
            calls: self.calls.clone(),
        }))
    }
}

pub fn test_config() -> Config {
    Config {
        max_workers: 4,
        ..Config::default()
    }
}

/// 用假门户和假引擎组装服务
pub fn service(script: &Arc<PortalScript>) -> (ResultService, Arc<ScriptedEngineFactory>) {
    let engines = Arc::new(ScriptedEngineFactory::default());
    let service = ResultService::new(
        test_config(),
        Arc::new(MockSessionFactory {
            script: script.clone(),
        }),
        engines.clone(),
    );
    (service, engines)
}
