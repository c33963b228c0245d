//! 验证码识别服务
//!
//! 同一张图片用多个识别方案并发竞速，在统一的超时时间内收集结果，按置信度选出最佳文本。
//! 识别过的图片按内容哈希缓存。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, RecognitionError};
use crate::ocr::{PoolStats, RecognitionPool, RecognitionProfile};
use crate::services::captcha_cache::{image_hash, CaptchaCache};
use crate::services::performance_monitor::PerformanceMonitor;

/// 有效验证码的长度范围
const MIN_CAPTCHA_LEN: usize = 3;
const MAX_CAPTCHA_LEN: usize = 8;

/// 识别服务参数
#[derive(Debug, Clone, PartialEq)]
pub struct SolverSettings {
    pub parallel_attempts: usize,
    pub timeout: Duration,
    pub min_cache_confidence: f32,
    pub cache_size: usize,
    pub cache_ttl: Duration,
}

impl SolverSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            parallel_attempts: config.parallel_ocr_attempts,
            timeout: config.ocr_timeout(),
            min_cache_confidence: config.min_cache_confidence,
            cache_size: config.captcha_cache_size,
            cache_ttl: config.captcha_cache_ttl(),
        }
    }
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// 一个识别方案的结果
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionAttempt {
    pub text: String,
    pub confidence: f32,
    pub elapsed_ms: u64,
    pub profile_index: usize,
}

/// 缓存统计
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub pool: PoolStats,
}

/// 验证码识别服务
pub struct CaptchaSolver {
    pool: Arc<RecognitionPool>,
    cache: Mutex<CaptchaCache>,
    monitor: Arc<PerformanceMonitor>,
    profiles: Vec<RecognitionProfile>,
    settings: SolverSettings,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CaptchaSolver {
    pub fn new(
        pool: Arc<RecognitionPool>,
        monitor: Arc<PerformanceMonitor>,
        settings: SolverSettings,
    ) -> Self {
        Self::with_profiles(pool, monitor, settings, RecognitionProfile::race_profiles())
    }

    /// 使用自定义的方案列表（按从快到慢排列）
    pub fn with_profiles(
        pool: Arc<RecognitionPool>,
        monitor: Arc<PerformanceMonitor>,
        settings: SolverSettings,
        profiles: Vec<RecognitionProfile>,
    ) -> Self {
        Self {
            cache: Mutex::new(CaptchaCache::new(settings.cache_size, settings.cache_ttl)),
            pool,
            monitor,
            profiles,
            settings,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// 识别验证码
    ///
    /// 返回空字符串表示本次没有可用结果，由调用方刷新验证码后重试。
    /// 只有空图片和引擎池初始化失败会返回错误。
    pub async fn solve(&self, image: &[u8], attempt: usize) -> Result<String> {
        if image.is_empty() {
            return Err(AppError::Recognition(RecognitionError::EmptyImage).into());
        }

        let start = Instant::now();
        let hash = image_hash(image);

        let cached = self
            .cache
            .lock()
            .await
            .get(&hash, start)
            .map(|entry| entry.solved_text.clone());
        if let Some(text) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            let elapsed_ms = start.elapsed().as_millis() as u64;
            self.monitor.record_attempt(true, elapsed_ms);
            debug!("🎯 验证码命中缓存: '{}' (第 {} 次尝试)", text, attempt);
            return Ok(text);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        self.pool.initialize().await?;

        let candidates = self.race(image, start + self.settings.timeout).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let Some(best) = pick_best(candidates) else {
            self.monitor.record_attempt(false, elapsed_ms);
            warn!(
                "⚠️  第 {} 次尝试: 没有有效的验证码识别结果 ({}ms)",
                attempt, elapsed_ms
            );
            return Ok(String::new());
        };

        if best.confidence > self.settings.min_cache_confidence {
            self.cache.lock().await.insert(
                hash,
                best.text.clone(),
                best.confidence,
                Instant::now(),
            );
        }
        self.monitor.record_attempt(true, elapsed_ms);
        info!(
            "🔤 第 {} 次尝试识别验证码: '{}' (置信度 {:.1}, 方案 #{}, {}ms)",
            attempt,
            best.text,
            best.confidence,
            best.profile_index + 1,
            elapsed_ms
        );
        Ok(best.text)
    }

    /// 并发运行各识别方案，收集截止时间前完成的结果
    ///
    /// 超时后未完成的任务被放弃：它们在后台继续运行，结果不再使用。
    async fn race(&self, image: &[u8], deadline: Instant) -> Vec<RecognitionAttempt> {
        let count = self
            .profiles
            .len()
            .min(self.settings.parallel_attempts.max(1))
            .min(self.pool.worker_count());
        let image: Arc<Vec<u8>> = Arc::new(image.to_vec());

        let mut pending: FuturesUnordered<_> = self
            .profiles
            .iter()
            .take(count)
            .cloned()
            .enumerate()
            .map(|(index, profile)| {
                let pool = self.pool.clone();
                let image = image.clone();
                let handle =
                    tokio::spawn(async move { pool.recognize(&image, Some(&profile)).await });
                async move { (index, handle.await) }
            })
            .collect();

        let mut completed = Vec::with_capacity(count);
        loop {
            let next = timeout_at(deadline, pending.next()).await;
            match next {
                Ok(Some((index, Ok(Ok(recognition))))) => completed.push(RecognitionAttempt {
                    text: recognition.text,
                    confidence: recognition.confidence,
                    elapsed_ms: recognition.elapsed_ms,
                    profile_index: index,
                }),
                Ok(Some((index, Ok(Err(e))))) => {
                    debug!("识别方案 #{} 失败: {}", index + 1, e);
                }
                Ok(Some((index, Err(join_err)))) => {
                    warn!("识别方案 #{} 任务异常: {}", index + 1, join_err);
                }
                Ok(None) => break,
                Err(_) => {
                    debug!("⏰ 验证码识别超时，{} 个方案未完成", pending.len());
                    break;
                }
            }
        }
        completed
    }

    pub async fn cache_stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            size: self.cache.lock().await.len(),
            hits,
            misses,
            hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64 * 100.0
            } else {
                0.0
            },
            pool: self.pool.stats().await,
        }
    }

    pub async fn clear_cache(&self) {
        let mut cache = self.cache.lock().await;
        if !cache.is_empty() {
            info!("🧹 清空 {} 条验证码缓存", cache.len());
            cache.clear();
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub async fn terminate(&self) {
        self.pool.terminate().await;
    }
}

/// 过滤长度不合法的结果后按置信度取最高者，相同置信度取靠前的方案
fn pick_best(candidates: Vec<RecognitionAttempt>) -> Option<RecognitionAttempt> {
    candidates
        .into_iter()
        .filter(|c| (MIN_CAPTCHA_LEN..=MAX_CAPTCHA_LEN).contains(&c.text.len()))
        .fold(None, |best: Option<RecognitionAttempt>, c| match best {
            Some(b)
                if b.confidence > c.confidence
                    || (b.confidence == c.confidence && b.profile_index < c.profile_index) =>
            {
                Some(b)
            }
            _ => Some(c),
        })
}
