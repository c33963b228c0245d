mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use bed_results_scraper::error::InputError;
use bed_results_scraper::models::{RollNumber, ScrapeOptions, ScrapeResult};
use bed_results_scraper::orchestrator::{BatchDispatcher, DispatchMode, DispatchSettings};
use bed_results_scraper::workflow::{QueryRunner, RunnerFactory};

use common::{no_record_response, service, success_response, PortalScript};

fn roll_strings(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("ED18A{:05}", 2160 + i)).collect()
}

#[tokio::test(start_paused = true)]
async fn test_small_batch_uses_single_session() {
    let script = PortalScript::new()
        .with_captchas(&["AB12XZ:85"])
        .with_responses(vec![success_response(), no_record_response()]);
    let (service, _) = service(&script);

    let outcome = service
        .scrape_batch(&roll_strings(2), &ScrapeOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.mode, DispatchMode::Sequential);
    assert_eq!(script.opens.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.summary.total, 2);
    assert_eq!(outcome.summary.completed, 2);
    assert_eq!(outcome.summary.successful, 1);
    assert_eq!(outcome.summary.errors, vec!["ED18A02161: No record found".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_large_batch_one_session_per_worker() {
    let script = PortalScript::new()
        .with_captchas(&["AB12XZ:85"])
        .with_responses((0..6).map(|_| no_record_response()).collect());
    let (service, _) = service(&script);
    let input = roll_strings(6);

    let outcome = service
        .scrape_batch(&input, &ScrapeOptions::default())
        .await
        .unwrap();

    let DispatchMode::Distributed { workers } = outcome.mode else {
        panic!("expected distributed mode, got {:?}", outcome.mode);
    };
    assert!(workers >= 1 && workers <= 4);
    assert_eq!(script.opens.load(Ordering::SeqCst), workers);

    let got: Vec<&str> = outcome.results.iter().map(|r| r.roll_number.as_str()).collect();
    let want: Vec<&str> = input.iter().map(String::as_str).collect();
    assert_eq!(got, want);
    assert!(outcome
        .results
        .iter()
        .all(|r| r.error.as_deref() == Some("No record found")));
}

#[tokio::test]
async fn test_batch_validation_happens_before_automation() {
    let script = PortalScript::new();
    let (service, _) = service(&script);

    let err = service
        .scrape_batch(&[], &ScrapeOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err, InputError::EmptyBatch);

    let err = service
        .scrape_batch(&roll_strings(101), &ScrapeOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err, InputError::BatchTooLarge { max: 100, actual: 101 });

    let mut mixed = roll_strings(4);
    mixed.push("ED18A0216".to_string());
    let err = service
        .scrape_batch(&mixed, &ScrapeOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err, InputError::InvalidIdentifier("ED18A0216".to_string()));

    assert_eq!(script.opens.load(Ordering::SeqCst), 0);
}

/// 指定工作者在处理时崩溃
struct CrashingRunner {
    crash: bool,
}

#[async_trait]
impl QueryRunner for CrashingRunner {
    async fn run(&mut self, roll_number: &RollNumber, _max_attempts: usize) -> ScrapeResult {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if self.crash {
            panic!("worker lost its session");
        }
        ScrapeResult::failed(roll_number.as_str(), "No record found", 10)
    }

    async fn close(&mut self) {}
}

struct CrashingFactory {
    crash_worker: usize,
}

impl RunnerFactory for CrashingFactory {
    fn create(&self, worker_id: usize, _options: &ScrapeOptions) -> Box<dyn QueryRunner> {
        Box::new(CrashingRunner {
            crash: worker_id == self.crash_worker,
        })
    }

    fn default_attempts(&self) -> usize {
        3
    }
}

#[tokio::test(start_paused = true)]
async fn test_worker_crash_reprocesses_every_id_once() {
    let dispatcher = BatchDispatcher::new(
        Arc::new(CrashingFactory { crash_worker: 3 }),
        DispatchSettings {
            max_workers: 4,
            available_parallelism: 4,
            worker_delay: Duration::from_millis(1000),
            sequential_delay: Duration::from_millis(500),
        },
    );
    let input: Vec<RollNumber> = roll_strings(12)
        .iter()
        .map(|r| RollNumber::parse(r).unwrap())
        .collect();

    let report = dispatcher.dispatch(&input, &ScrapeOptions::default()).await;

    assert_eq!(report.mode, DispatchMode::Fallback);
    assert_eq!(report.results.len(), input.len());
    for (result, roll) in report.results.iter().zip(&input) {
        assert_eq!(result.roll_number, roll.as_str());
    }
}
