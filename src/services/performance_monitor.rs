//! 验证码识别性能统计
//!
//! 进程内共享一个实例（通过 `Arc` 显式传递），计数只增不减，直到调用 `reset()`。

use std::sync::Mutex;

use serde::Serialize;
use tracing::info;

#[derive(Debug, Default)]
struct Counters {
    total_attempts: u64,
    successful_attempts: u64,
    total_solved: u64,
    total_time_ms: u64,
    fastest_ms: Option<u64>,
    slowest_ms: u64,
}

/// 性能统计快照
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub total_attempts: u64,
    pub successful_attempts: u64,
    pub total_captchas_solved: u64,
    pub total_captcha_time: u64,
    pub average_captcha_time: f64,
    pub fastest_captcha: u64,
    pub slowest_captcha: u64,
    pub success_rate: f64,
}

/// 对快照的评价
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceAssessment {
    pub average_time_status: &'static str,
    pub success_rate_status: &'static str,
    pub tips: Vec<&'static str>,
}

impl PerformanceMetrics {
    pub fn assessment(&self) -> PerformanceAssessment {
        let average_time_status = if self.average_captcha_time < 3000.0 {
            "Good"
        } else if self.average_captcha_time < 5000.0 {
            "Fair"
        } else {
            "Needs Improvement"
        };
        let success_rate_status = if self.success_rate > 80.0 {
            "Excellent"
        } else if self.success_rate > 60.0 {
            "Good"
        } else {
            "Needs Improvement"
        };

        let mut tips = Vec::new();
        if self.average_captcha_time > 5000.0 {
            tips.push("Consider reducing recognition profiles or increasing the OCR pool size");
        }
        if self.success_rate < 60.0 {
            tips.push("Check captcha image quality and OCR configuration");
        }

        PerformanceAssessment {
            average_time_status,
            success_rate_status,
            tips,
        }
    }
}

/// 性能计数器
#[derive(Debug, Default)]
pub struct PerformanceMonitor {
    counters: Mutex<Counters>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次验证码识别
    pub fn record_attempt(&self, success: bool, elapsed_ms: u64) {
        let mut c = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        c.total_attempts += 1;
        if success {
            c.successful_attempts += 1;
            c.total_solved += 1;
            c.total_time_ms += elapsed_ms;
            c.fastest_ms = Some(c.fastest_ms.map_or(elapsed_ms, |f| f.min(elapsed_ms)));
            c.slowest_ms = c.slowest_ms.max(elapsed_ms);
        }
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        let c = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let average = if c.total_solved > 0 {
            c.total_time_ms as f64 / c.total_solved as f64
        } else {
            0.0
        };
        let success_rate = if c.total_attempts > 0 {
            c.successful_attempts as f64 / c.total_attempts as f64 * 100.0
        } else {
            0.0
        };
        PerformanceMetrics {
            total_attempts: c.total_attempts,
            successful_attempts: c.successful_attempts,
            total_captchas_solved: c.total_solved,
            total_captcha_time: c.total_time_ms,
            average_captcha_time: average,
            fastest_captcha: c.fastest_ms.unwrap_or(0),
            slowest_captcha: c.slowest_ms,
            success_rate,
        }
    }

    pub fn reset(&self) {
        *self.counters.lock().unwrap_or_else(|e| e.into_inner()) = Counters::default();
    }

    /// 输出性能报告
    pub fn log_report(&self) {
        let m = self.metrics();
        info!("📊 验证码识别性能报告:");
        info!("   总尝试: {}", m.total_attempts);
        info!("   成功: {} ({:.1}%)", m.successful_attempts, m.success_rate);
        info!("   平均耗时: {:.0}ms", m.average_captcha_time);
        info!("   最快: {}ms", m.fastest_captcha);
        info!("   最慢: {}ms", m.slowest_captcha);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_record_and_snapshot() {
        let monitor = PerformanceMonitor::new();
        monitor.record_attempt(true, 100);
        monitor.record_attempt(true, 300);
        monitor.record_attempt(false, 999);
        monitor.record_attempt(true, 200);

        let m = monitor.metrics();
        assert_eq!(m.total_attempts, 4);
        assert_eq!(m.successful_attempts, 3);
        assert_eq!(m.total_captchas_solved, 3);
        assert_eq!(m.average_captcha_time, 200.0);
        assert_eq!(m.fastest_captcha, 100);
        assert_eq!(m.slowest_captcha, 300);
        assert_eq!(m.success_rate, 75.0);
    }

    #[test]
    fn test_empty_snapshot_and_reset() {
        let monitor = PerformanceMonitor::new();
        let m = monitor.metrics();
        assert_eq!(m.fastest_captcha, 0);
        assert_eq!(m.success_rate, 0.0);

        monitor.record_attempt(true, 50);
        monitor.reset();
        assert_eq!(monitor.metrics(), PerformanceMonitor::new().metrics());
    }

    #[test]
    fn test_concurrent_increments() {
        let monitor = Arc::new(PerformanceMonitor::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let monitor = monitor.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        monitor.record_attempt(i % 2 == 0, 10);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let m = monitor.metrics();
        assert_eq!(m.total_attempts, 800);
        assert_eq!(m.successful_attempts, 400);
        assert_eq!(m.success_rate, 50.0);
    }

    #[test]
    fn test_assessment() {
        let monitor = PerformanceMonitor::new();
        monitor.record_attempt(true, 6000);
        monitor.record_attempt(false, 10);
        let a = monitor.metrics().assessment();
        assert_eq!(a.average_time_status, "Needs Improvement");
        assert_eq!(a.success_rate_status, "Needs Improvement");
        assert_eq!(a.tips.len(), 2);
    }
}
