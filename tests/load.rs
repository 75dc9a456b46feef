mod common;

use std::sync::Arc;
use std::time::Duration;
use volley::http::{self, HttpProbe, Probe};
use volley::load::{self, LoadPlan};
use volley::{Aggregator, BoxError, Context, Work};

#[test]
fn counts_every_request() {
    let work = Arc::new(|b: &[u8]| -> Result<Vec<u8>, BoxError> { Ok(b.to_vec()) });
    let plan = LoadPlan::new(40, 4);

    let summary = load::run(&plan, &Context::new(), work, Aggregator::new()).unwrap();

    assert_eq!(summary.submitted, 40);
    assert_eq!(summary.total, 40);
    assert_eq!(summary.successes, 40);
    assert_eq!(summary.failures, 0);
    assert_eq!(summary.latency.unwrap().samples, 40);
    assert!(summary.throughput > 0.0);
}

#[test]
fn failures_are_counted_not_fatal() {
    let work = Arc::new(|_: &[u8]| -> Result<Vec<u8>, BoxError> { Err("refused".into()) });
    let plan = LoadPlan::new(10, 3).with_queue_capacity(0);

    let summary = load::run(&plan, &Context::new(), work, Aggregator::new()).unwrap();

    assert_eq!(summary.total, 10);
    assert_eq!(summary.failures, 10);
    assert!(summary.latency.is_none());
}

#[test]
fn deadline_cuts_the_run_short() {
    let work = Arc::new(|_: &[u8]| -> Result<Vec<u8>, BoxError> { Ok(Vec::new()) });
    // 1000 requests at 20/s would take 50s
    let plan = LoadPlan::new(1_000, 2).with_rate(20);
    let ctx = Context::with_timeout(Duration::from_millis(300));

    let summary = load::run(&plan, &ctx, work, Aggregator::new()).unwrap();

    assert!(summary.submitted < 1_000);
    assert!(summary.total <= summary.submitted);
    assert!(summary.duration < Duration::from_secs(5));
}

#[test]
fn http_probe_against_local_server() {
    let base = common::serve();
    let ok = HttpProbe::new(format!("{}/ok", base), Duration::from_secs(5)).unwrap();
    let out = ok.execute(b"").unwrap();
    assert_eq!(
        Probe::decode(&out).unwrap(),
        Probe {
            status: 200,
            bytes: 5
        }
    );

    let plan = LoadPlan::new(12, 3);
    let summary = load::run(
        &plan,
        &Context::new(),
        Arc::new(ok),
        Aggregator::with_classifier(http::is_success),
    )
    .unwrap();
    assert_eq!(summary.successes, 12);

    let missing = HttpProbe::new(format!("{}/missing", base), Duration::from_secs(5)).unwrap();
    let summary = load::run(
        &plan,
        &Context::new(),
        Arc::new(missing),
        Aggregator::with_classifier(http::is_success),
    )
    .unwrap();
    assert_eq!(summary.failures, 12);
    assert!(summary.latency.is_none());
}

#[test]
fn unreachable_host_is_a_job_error() {
    // nothing listens on port 9 of localhost in a test environment
    let probe = HttpProbe::new("http://127.0.0.1:9/", Duration::from_secs(2)).unwrap();
    assert!(probe.execute(b"").is_err());
}
