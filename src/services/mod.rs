pub mod captcha_cache;
pub mod captcha_solver;
pub mod performance_monitor;

pub use captcha_cache::{image_hash, CaptchaCache, CaptchaCacheEntry};
pub use captcha_solver::{CacheStats, CaptchaSolver, RecognitionAttempt, SolverSettings};
pub use performance_monitor::{PerformanceAssessment, PerformanceMetrics, PerformanceMonitor};
