use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use bed_results_scraper::browser::ChromeSessionFactory;
use bed_results_scraper::models::ScrapeOptions;
use bed_results_scraper::ocr::TesseractFactory;
use bed_results_scraper::utils::logging;
use bed_results_scraper::{Config, ResultService};

#[derive(Parser, Debug)]
#[command(name = "bed-results")]
#[command(about = "Look up B.Ed entrance results by roll number")]
struct Args {
    /// Roll numbers to look up, e.g. ED18A02166
    #[arg(required = true)]
    roll_numbers: Vec<String>,

    /// Path to config TOML. Falls back to $SCRAPER_CONFIG, then environment variables.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Show the browser window.
    #[arg(long)]
    headed: bool,

    #[arg(long)]
    max_retries: Option<usize>,

    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print captcha performance and cache statistics after the run.
    #[arg(long)]
    stats: bool,
}

fn load_config(args: &Args) -> Result<Config> {
    let path = args
        .config
        .clone()
        .or_else(|| std::env::var_os("SCRAPER_CONFIG").map(PathBuf::from));
    let config = match path {
        Some(path) => Config::from_toml_file(&path)
            .with_context(|| format!("加载配置失败: {}", path.display()))?,
        None => Config::from_env(),
    };
    config.validate()?;
    Ok(config)
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    logging::init(config.verbose_logging);

    let options = ScrapeOptions {
        headless: args.headed.then_some(false),
        max_retries: args.max_retries,
        timeout_ms: args.timeout_ms,
    };

    let service = ResultService::new(
        config.clone(),
        Arc::new(ChromeSessionFactory::new(config.chrome_executable.clone())),
        Arc::new(TesseractFactory::new(config.tesseract_path.clone())),
    );

    let output = if let [single] = args.roll_numbers.as_slice() {
        let result = service.scrape_single(single, &options).await?;
        serde_json::to_value(&result)?
    } else {
        let outcome = service.scrape_batch(&args.roll_numbers, &options).await?;
        json!({
            "results": outcome.results,
            "summary": outcome.summary,
        })
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    if args.stats {
        service.log_performance();
        let stats = json!({
            "performance": service.metrics(),
            "cache": service.cache_stats().await,
        });
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    service.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if let Err(err) = run(args).await {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
    Ok(())
}
