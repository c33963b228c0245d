/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::models::BatchSummary;
use crate::services::PerformanceMetrics;

/// 初始化日志
///
/// 优先使用 `RUST_LOG`；未设置时根据 `verbose` 选择 debug 或 info。
/// 日志写到 stderr，stdout 留给 JSON 输出。
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "bed_results_scraper=debug,info"
        } else {
            "info"
        })
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `total`: 学号数量
/// - `max_workers`: 最大工作者数
pub fn log_startup(total: usize, max_workers: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 成绩批量查询模式");
    info!("📋 待查询学号: {} 个", total);
    info!("📊 最大工作者数: {}", max_workers);
    info!("{}", "=".repeat(60));
}

/// 记录分片信息
pub fn log_distribution(total: usize, workers: usize, chunk_size: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 分布式处理: {} 个学号 → {} 个工作者", total, workers);
    info!("📄 每个工作者最多 {} 个学号", chunk_size);
    info!("{}", "=".repeat(60));
}

pub fn log_query_progress(current: usize, total: usize, roll_number: &str) {
    info!("[{}/{}] 🔍 查询学号: {}", current, total, roll_number);
}

/// 打印批量处理摘要
pub fn print_summary(summary: &BatchSummary) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", summary.successful, summary.total);
    info!("❌ 失败: {}", summary.completed - summary.successful);
    info!("⏱️  总耗时: {}", format_elapsed(summary.processing_time));
    for err in &summary.errors {
        info!("   - {}", truncate_text(err, 120));
    }
    info!("{}", "=".repeat(60));
}

/// 打印性能评估
pub fn print_assessment(metrics: &PerformanceMetrics) {
    let assessment = metrics.assessment();
    info!("📈 平均耗时评价: {}", assessment.average_time_status);
    info!("📈 成功率评价: {}", assessment.success_rate_status);
    for tip in assessment.tips {
        info!("💡 {}", tip);
    }
}

/// 将毫秒格式化为便于阅读的时长
pub fn format_elapsed(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1000)
    }
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
