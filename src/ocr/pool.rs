//! 识别引擎池
//!
//! 持有固定数量的长生命周期引擎，轮询分发识别请求。首次使用时自动初始化。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use futures::future::try_join_all;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{AppError, RecognitionError};
use crate::ocr::engine::{EngineFactory, RecognitionProfile, TextRecognizer};

/// 单次识别结果（已清洗）
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub text: String,
    pub confidence: f32,
    pub elapsed_ms: u64,
}

/// 引擎池状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub initialized: bool,
    pub worker_count: usize,
    pub current_index: usize,
}

/// 识别引擎池
pub struct RecognitionPool {
    factory: Arc<dyn EngineFactory>,
    worker_count: usize,
    baseline: RecognitionProfile,
    engines: RwLock<Vec<Arc<dyn TextRecognizer>>>,
    next_index: AtomicUsize,
}

impl RecognitionPool {
    pub fn new(
        factory: Arc<dyn EngineFactory>,
        worker_count: usize,
        baseline: RecognitionProfile,
    ) -> Self {
        Self {
            factory,
            worker_count: worker_count.max(1),
            baseline,
            engines: RwLock::new(Vec::new()),
            next_index: AtomicUsize::new(0),
        }
    }

    /// 创建全部引擎；任何一个创建失败都视为致命错误
    pub async fn initialize(&self) -> Result<()> {
        let mut engines = self.engines.write().await;
        if !engines.is_empty() {
            return Ok(());
        }

        info!("🚀 正在初始化 {} 个识别引擎...", self.worker_count);
        let created = try_join_all((0..self.worker_count).map(|index| async move {
            self.factory
                .create(index, &self.baseline)
                .await
                .map_err(|e| match e.downcast::<AppError>() {
                    Ok(typed) => typed.into(),
                    Err(e) => anyhow::Error::from(AppError::engine_unavailable(
                        index,
                        format!("{:#}", e),
                    )),
                })
        }))
        .await?;

        *engines = created;
        self.next_index.store(0, Ordering::SeqCst);
        info!("🎉 {} 个识别引擎已就绪", engines.len());
        Ok(())
    }

    /// 轮询选择下一个引擎
    async fn next_engine(&self) -> Result<Arc<dyn TextRecognizer>> {
        if self.engines.read().await.is_empty() {
            self.initialize().await?;
        }

        let engines = self.engines.read().await;
        let len = engines.len();
        if len == 0 {
            return Err(AppError::Recognition(RecognitionError::PoolEmpty).into());
        }
        let previous = self
            .next_index
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |i| Some((i + 1) % len))
            .unwrap_or_default();
        Ok(engines[previous % len].clone())
    }

    /// 识别图片
    ///
    /// `profile` 会合并到基线方案之上；返回的文本只保留字母数字。
    pub async fn recognize(
        &self,
        image: &[u8],
        profile: Option<&RecognitionProfile>,
    ) -> Result<Recognition> {
        let engine = self.next_engine().await?;
        let effective = match profile {
            Some(p) => p.merged_over(&self.baseline),
            None => self.baseline.clone(),
        };

        let start = Instant::now();
        let raw = engine.recognize(image, &effective).await?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let text = clean_text(&raw.text);
        debug!(
            "识别方案 '{}' 结果: '{}' (置信度 {:.1}, {}ms)",
            effective.name, text, raw.confidence, elapsed_ms
        );

        Ok(Recognition {
            text,
            confidence: raw.confidence,
            elapsed_ms,
        })
    }

    /// 释放全部引擎；重复调用无副作用
    pub async fn terminate(&self) {
        let engines = std::mem::take(&mut *self.engines.write().await);
        if engines.is_empty() {
            return;
        }

        info!("🔄 正在释放 {} 个识别引擎...", engines.len());
        for (index, engine) in engines.iter().enumerate() {
            if let Err(e) = engine.terminate().await {
                warn!("释放识别引擎 {} 失败: {}", index + 1, e);
            }
        }
        self.next_index.store(0, Ordering::SeqCst);
        info!("✅ 识别引擎已全部释放");
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub async fn stats(&self) -> PoolStats {
        let engines = self.engines.read().await;
        PoolStats {
            initialized: !engines.is_empty(),
            worker_count: engines.len(),
            current_index: self.next_index.load(Ordering::SeqCst),
        }
    }
}

/// 去除字母数字以外的字符
fn clean_text(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::engine::RawRecognition;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// 记录调用顺序的假引擎
    struct TaggedEngine {
        index: usize,
        calls: Arc<Mutex<Vec<(usize, String)>>>,
        terminated: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TextRecognizer for TaggedEngine {
        async fn recognize(
            &self,
            _image: &[u8],
            profile: &RecognitionProfile,
        ) -> Result<RawRecognition> {
            self.calls
                .lock()
                .unwrap()
                .push((self.index, profile.name.clone()));
            Ok(RawRecognition {
                text: " ab-12 xz\n".to_string(),
                confidence: 77.0,
            })
        }

        async fn terminate(&self) -> Result<()> {
            self.terminated.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct TaggedFactory {
        created: AtomicUsize,
        fail_at: Option<usize>,
        untyped_failure: bool,
        calls: Arc<Mutex<Vec<(usize, String)>>>,
        terminated: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EngineFactory for TaggedFactory {
        async fn create(
            &self,
            index: usize,
            _baseline: &RecognitionProfile,
        ) -> Result<Arc<dyn TextRecognizer>> {
            if self.fail_at == Some(index) {
                if self.untyped_failure {
                    anyhow::bail!("tesseract missing");
                }
                return Err(AppError::engine_unavailable(index, "boom").into());
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(TaggedEngine {
                index,
                calls: self.calls.clone(),
                terminated: self.terminated.clone(),
            }))
        }
    }

    #[test]
    fn test_stats_before_init() {
        let pool = RecognitionPool::new(
            Arc::new(TaggedFactory::default()),
            2,
            RecognitionProfile::baseline(),
        );
        let stats = tokio_test::block_on(pool.stats());
        assert_eq!(
            stats,
            PoolStats {
                initialized: false,
                worker_count: 0,
                current_index: 0,
            }
        );
        assert_eq!(pool.worker_count(), 2);
    }

    #[tokio::test]
    async fn test_lazy_init_and_round_robin() {
        let factory = Arc::new(TaggedFactory::default());
        let pool = RecognitionPool::new(factory.clone(), 3, RecognitionProfile::baseline());
        assert!(!pool.stats().await.initialized);

        for _ in 0..4 {
            pool.recognize(b"img", None).await.unwrap();
        }

        assert_eq!(factory.created.load(Ordering::SeqCst), 3);
        let used: Vec<usize> = factory.calls.lock().unwrap().iter().map(|c| c.0).collect();
        assert_eq!(used, vec![0, 1, 2, 0]);
        assert_eq!(pool.stats().await.current_index, 1);
    }

    #[tokio::test]
    async fn test_text_is_cleaned_and_profile_applied() {
        let factory = Arc::new(TaggedFactory::default());
        let pool = RecognitionPool::new(factory.clone(), 1, RecognitionProfile::baseline());

        let profile = RecognitionProfile {
            name: "single-line".to_string(),
            ..Default::default()
        };
        let result = pool.recognize(b"img", Some(&profile)).await.unwrap();
        assert_eq!(result.text, "ab12xz");
        assert_eq!(result.confidence, 77.0);

        let result = pool.recognize(b"img", None).await.unwrap();
        assert_eq!(result.text, "ab12xz");

        let names: Vec<String> = factory
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.1.clone())
            .collect();
        assert_eq!(names, vec!["single-line".to_string(), "baseline".to_string()]);
    }

    #[tokio::test]
    async fn test_init_failure_is_fatal() {
        let factory = Arc::new(TaggedFactory {
            fail_at: Some(1),
            ..Default::default()
        });
        let pool = RecognitionPool::new(factory, 2, RecognitionProfile::baseline());
        assert!(pool.initialize().await.is_err());
        assert!(pool.recognize(b"img", None).await.is_err());
        assert!(!pool.stats().await.initialized);
    }

    #[tokio::test]
    async fn test_init_failure_is_typed_as_recognition_error() {
        let factory = Arc::new(TaggedFactory {
            fail_at: Some(0),
            untyped_failure: true,
            ..Default::default()
        });
        let pool = RecognitionPool::new(factory, 2, RecognitionProfile::baseline());
        let err = pool.initialize().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AppError>(),
            Some(AppError::Recognition(RecognitionError::EngineUnavailable { index: 0, .. }))
        ));
        assert!(err.to_string().contains("tesseract missing"));
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let factory = Arc::new(TaggedFactory::default());
        let pool = RecognitionPool::new(factory.clone(), 2, RecognitionProfile::baseline());
        pool.initialize().await.unwrap();

        pool.terminate().await;
        pool.terminate().await;
        assert_eq!(factory.terminated.load(Ordering::SeqCst), 2);
        assert!(!pool.stats().await.initialized);
    }
}
