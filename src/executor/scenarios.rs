//! End-to-end engine scenarios

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::models::{
    body, ensure, hook, Constructor, Dependency, FixtureRef, HookScope, RetryPolicy, TestClass,
    TestContext, TestError, TestFixture, TestOutcome, TestRecord, TestResult,
};
use crate::sink::CollectingSink;

fn class(name: &str) -> Arc<TestClass> {
    Arc::new(TestClass::new(name))
}

fn passing(id: &str, class: &Arc<TestClass>) -> TestCaseDescriptor {
    TestCaseDescriptor::new(id, class.clone()).with_body(body(|_| async { Ok(()) }))
}

fn failing(id: &str, class: &Arc<TestClass>) -> TestCaseDescriptor {
    TestCaseDescriptor::new(id, class.clone())
        .with_body(body(|_| async { Err(TestError::assertion("expected 200, got 503")) }))
}

/// Body that counts how often it was invoked
fn counting(id: &str, class: &Arc<TestClass>, calls: &Arc<AtomicUsize>) -> TestCaseDescriptor {
    let calls = calls.clone();
    TestCaseDescriptor::new(id, class.clone()).with_body(body(move |_| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }))
}

/// Tracks how many bodies run at once
#[derive(Default)]
struct Overlap {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Overlap {
    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

fn overlapping(id: &str, class: &Arc<TestClass>, overlap: &Arc<Overlap>) -> TestCaseDescriptor {
    let overlap = overlap.clone();
    TestCaseDescriptor::new(id, class.clone()).with_body(body(move |_| {
        let overlap = overlap.clone();
        async move {
            let now = overlap.active.fetch_add(1, Ordering::SeqCst) + 1;
            overlap.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            overlap.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }))
}

async fn run(descriptors: Vec<TestCaseDescriptor>, parallelism: usize) -> (RunReport, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::new());
    let engine = ExecutionEngine::new(EngineConfig::default().with_max_parallelism(parallelism));
    let report = engine
        .run(descriptors, sink.clone(), CancellationToken::new())
        .await
        .unwrap();
    (report, sink)
}

fn record<'a>(records: &'a [TestRecord], id: &str) -> &'a TestRecord {
    records
        .iter()
        .find(|r| r.id.as_str() == id)
        .unwrap_or_else(|| panic!("no record for {id}"))
}

#[tokio::test]
async fn every_test_reported_exactly_once() {
    let c = class("Mixed");
    let mut descriptors = Vec::new();
    for i in 0..6 {
        descriptors.push(passing(&format!("p{i}"), &c));
    }
    descriptors.push(failing("f", &c));
    descriptors.push(passing("after_f", &c).depends_on("f"));
    descriptors.push(passing("after_after", &c).depends_on("after_f"));
    descriptors.push(passing("k1", &c).constraint_key("db"));
    descriptors.push(passing("k2", &c).constraint_key("db").constraint_key("fs"));
    descriptors.push(passing("serial", &c).not_in_parallel());
    descriptors.push(passing("g1", &c).exclusive_group("g"));
    descriptors.push(passing("g2", &c).exclusive_group("g").depends_on("p0"));
    descriptors.push(TestCaseDescriptor::new("static", c.clone()).skip("not today"));
    descriptors.push(TestCaseDescriptor::new("bodiless", c.clone()));

    let expected = descriptors.len();
    let (report, sink) = run(descriptors, 3).await;
    let records = sink.records();

    assert_eq!(report.total, expected);
    assert_eq!(records.len(), expected);
    let unique: HashSet<_> = records.iter().map(|r| r.id.clone()).collect();
    assert_eq!(unique.len(), expected);
    assert!(!report.cancelled);
}

#[tokio::test]
async fn failed_dependency_cascades_skip() {
    let c = class("Cascade");
    let calls = Arc::new(AtomicUsize::new(0));

    let (_, sink) = run(
        vec![
            failing("a", &c),
            counting("b", &c, &calls).depends_on("a"),
            counting("c", &c, &calls).depends_on("b"),
        ],
        4,
    )
    .await;
    let records = sink.records();

    assert_eq!(record(&records, "a").outcome, TestOutcome::Failed);
    let b = record(&records, "b");
    assert_eq!(b.outcome, TestOutcome::Skipped);
    assert!(b.message.as_deref().unwrap().starts_with("Dependency failed"));
    assert_eq!(record(&records, "c").outcome, TestOutcome::Skipped);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn proceed_on_failure_still_runs() {
    let c = class("Proceed");
    let calls = Arc::new(AtomicUsize::new(0));

    let (_, sink) = run(
        vec![
            failing("a", &c),
            counting("b", &c, &calls).with_dependency(Dependency::on("a").proceed_on_failure()),
        ],
        4,
    )
    .await;
    let records = sink.records();

    assert_eq!(record(&records, "a").outcome, TestOutcome::Failed);
    assert_eq!(record(&records, "b").outcome, TestOutcome::Passed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dependency_runs_before_dependent() {
    let c = class("Order");
    let a_done = Arc::new(AtomicBool::new(false));
    let flag = a_done.clone();
    let a = TestCaseDescriptor::new("a", c.clone()).with_body(body(move |_| {
        let flag = flag.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        }
    }));
    let seen = a_done.clone();
    let b = TestCaseDescriptor::new("b", c.clone())
        .depends_on("a")
        .with_body(body(move |_| {
            let seen = seen.clone();
            async move { ensure(seen.load(Ordering::SeqCst), "a has not finished") }
        }));

    let (_, sink) = run(vec![b, a], 4).await;
    assert_eq!(sink.outcome_of(&"b".into()), Some(TestOutcome::Passed));
}

#[tokio::test]
async fn shared_constraint_key_serializes() {
    let c = class("Keys");
    let overlap = Arc::new(Overlap::default());

    let (_, sink) = run(
        vec![
            overlapping("one", &c, &overlap).constraint_key("db"),
            overlapping("two", &c, &overlap).constraint_key("db"),
            overlapping("three", &c, &overlap).constraint_key("db"),
        ],
        8,
    )
    .await;

    assert_eq!(overlap.peak(), 1);
    assert_eq!(sink.summary("keys").passed, 3);
}

#[tokio::test]
async fn parallel_limit_bounds_peak_concurrency() {
    let c = class("Limit");
    let overlap = Arc::new(Overlap::default());
    let descriptors = (0..10)
        .map(|i| overlapping(&format!("t{i}"), &c, &overlap).parallel_limit(3))
        .collect();

    let (_, sink) = run(descriptors, 8).await;

    assert!(overlap.peak() <= 3, "peak was {}", overlap.peak());
    assert_eq!(sink.summary("limit").passed, 10);
}

#[tokio::test]
async fn exclusive_group_never_overlaps_outsiders() {
    let c = class("Exclusive");
    let inside = Arc::new(AtomicUsize::new(0));
    let clash = Arc::new(AtomicBool::new(false));

    let member = |id: &str| {
        let inside = inside.clone();
        TestCaseDescriptor::new(id, c.clone())
            .exclusive_group("g")
            .with_body(body(move |_| {
                let inside = inside.clone();
                async move {
                    inside.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(15)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            }))
    };
    let outsider = |id: &str| {
        let inside = inside.clone();
        let clash = clash.clone();
        TestCaseDescriptor::new(id, c.clone()).with_body(body(move |_| {
            let inside = inside.clone();
            let clash = clash.clone();
            async move {
                for _ in 0..3 {
                    if inside.load(Ordering::SeqCst) > 0 {
                        clash.store(true, Ordering::SeqCst);
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                Ok(())
            }
        }))
    };

    let (_, sink) = run(
        vec![member("m1"), outsider("o1"), member("m2"), outsider("o2")],
        4,
    )
    .await;

    assert!(!clash.load(Ordering::SeqCst));
    assert_eq!(sink.summary("exclusive").passed, 4);
}

#[tokio::test]
async fn retry_until_pass() {
    let c = class("Flaky");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let flaky = TestCaseDescriptor::new("flaky", c.clone())
        .with_retry(RetryPolicy::new(3))
        .with_body(body(move |_| {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                ensure(n >= 3, format!("attempt {n} failed"))
            }
        }));

    let (_, sink) = run(vec![flaky], 2).await;
    let records = sink.records();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, TestOutcome::Passed);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retries_exhausted_reports_last_failure() {
    let c = class("Exhausted");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let test = TestCaseDescriptor::new("never", c.clone())
        .with_retry(RetryPolicy::new(2).with_delay(Duration::from_millis(1)))
        .with_body(body(move |_| {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Err(TestError::assertion(format!("attempt {n}")))
            }
        }));

    let (_, sink) = run(vec![test], 2).await;
    let records = sink.records();

    assert_eq!(records[0].outcome, TestOutcome::Failed);
    assert!(records[0].message.as_deref().unwrap().contains("attempt 3"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn runtime_error_reports_error() {
    let c = class("Runtime");
    let test = TestCaseDescriptor::new("io", c.clone())
        .with_body(body(|_| async { Err(anyhow::anyhow!("connection refused").into()) }));

    let (_, sink) = run(vec![test], 2).await;
    let records = sink.records();

    assert_eq!(records[0].outcome, TestOutcome::Error);
    assert_eq!(records[0].error_kind.as_deref(), Some("runtime"));
}

#[tokio::test]
async fn timeout_is_error_and_not_retried() {
    let c = class("Slow");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let slow = TestCaseDescriptor::new("slow", c.clone())
        .with_timeout(Duration::from_millis(30))
        .with_retry(RetryPolicy::new(2))
        .with_body(body(move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }
        }));

    let (report, sink) = run(vec![slow], 2).await;
    let records = sink.records();

    assert_eq!(records[0].outcome, TestOutcome::Error);
    assert_eq!(records[0].error_kind.as_deref(), Some("timeout"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(report.duration < Duration::from_secs(5));
}

#[tokio::test]
async fn default_timeout_applies() {
    let c = class("DefaultTimeout");
    let slow = TestCaseDescriptor::new("slow", c.clone()).with_body(body(|_| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }));

    let sink = Arc::new(CollectingSink::new());
    let engine = ExecutionEngine::new(
        EngineConfig::default().with_default_timeout(Some(Duration::from_millis(20))),
    );
    engine
        .run(vec![slow], sink.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(sink.records()[0].error_kind.as_deref(), Some("timeout"));
}

#[tokio::test]
async fn timeout_cancels_attempt_token() {
    let c = class("Cooperative");
    let observed = Arc::new(AtomicBool::new(false));
    let flag = observed.clone();
    let test = TestCaseDescriptor::new("coop", c.clone())
        .with_timeout(Duration::from_millis(20))
        .with_body(body(move |invocation| {
            let flag = flag.clone();
            async move {
                let token = invocation.cancellation.clone();
                tokio::spawn(async move {
                    token.cancelled().await;
                    flag.store(true, Ordering::SeqCst);
                });
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }
        }));

    let outer = CancellationToken::new();
    let sink = Arc::new(CollectingSink::new());
    ExecutionEngine::default()
        .run(vec![test], sink.clone(), outer.clone())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(observed.load(Ordering::SeqCst));
    assert!(!outer.is_cancelled());
}

#[tokio::test]
async fn assembly_skip_skips_everything() {
    let c = class("Assembly");
    let calls = Arc::new(AtomicUsize::new(0));
    let skip_all = hook(|_| async { Err(TestError::skip("no cluster available")) });

    let descriptors = (0..4)
        .map(|i| {
            counting(&format!("t{i}"), &c, &calls).before(HookScope::Assembly, skip_all.clone())
        })
        .collect();

    let (_, sink) = run(descriptors, 4).await;
    let records = sink.records();

    assert_eq!(records.len(), 4);
    for r in &records {
        assert_eq!(r.outcome, TestOutcome::Skipped);
        assert_eq!(r.message.as_deref(), Some("no cluster available"));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn assembly_failure_errors_everything() {
    let c = class("AssemblyFail");
    let calls = Arc::new(AtomicUsize::new(0));
    let broken = hook(|_| async { Err(TestError::runtime("migration failed")) });

    let descriptors = (0..3)
        .map(|i| counting(&format!("t{i}"), &c, &calls).before(HookScope::Assembly, broken.clone()))
        .collect();

    let (_, sink) = run(descriptors, 4).await;

    for r in sink.records() {
        assert_eq!(r.outcome, TestOutcome::Error);
        assert!(r.message.as_deref().unwrap().contains("migration failed"));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn class_setup_runs_once_for_parallel_tests() {
    let c = class("Shared");
    let setups = Arc::new(AtomicUsize::new(0));
    let setup = {
        let setups = setups.clone();
        hook(move |_| {
            let setups = setups.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                setups.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    };
    let observe = |id: &str| {
        let setups = setups.clone();
        TestCaseDescriptor::new(id, c.clone())
            .before(HookScope::Class, setup.clone())
            .with_body(body(move |_| {
                let setups = setups.clone();
                async move {
                    let seen = setups.load(Ordering::SeqCst);
                    ensure(seen == 1, format!("class setup ran {seen} times"))
                }
            }))
    };

    let (report, sink) = run(vec![observe("x"), observe("y")], 4).await;

    assert_eq!(report.batches, 1);
    assert_eq!(sink.summary("shared").passed, 2);
    assert_eq!(setups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn class_skip_is_scoped_to_class() {
    let skipped_class = class("Skipped");
    let other_class = class("Other");
    let skip = hook(|_| async { Err(TestError::skip("feature flag off")) });

    let (_, sink) = run(
        vec![
            passing("a", &skipped_class).before(HookScope::Class, skip.clone()),
            passing("b", &skipped_class).before(HookScope::Class, skip),
            passing("c", &other_class),
        ],
        4,
    )
    .await;
    let records = sink.records();

    assert_eq!(record(&records, "a").outcome, TestOutcome::Skipped);
    assert_eq!(record(&records, "b").outcome, TestOutcome::Skipped);
    assert_eq!(record(&records, "c").outcome, TestOutcome::Passed);
}

#[tokio::test]
async fn teardown_runs_after_all_tests() {
    let c = class("Teardown");
    let class_teardowns = Arc::new(AtomicUsize::new(0));
    let assembly_teardowns = Arc::new(AtomicUsize::new(0));
    let counter = |n: &Arc<AtomicUsize>| {
        let n = n.clone();
        hook(move |_| {
            let n = n.clone();
            async move {
                n.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    };

    let descriptors = vec![
        passing("a", &c)
            .after(HookScope::Class, counter(&class_teardowns))
            .after(HookScope::Assembly, counter(&assembly_teardowns)),
        passing("b", &c).after(HookScope::Class, counter(&class_teardowns)),
    ];

    run(descriptors, 2).await;

    assert_eq!(class_teardowns.load(Ordering::SeqCst), 1);
    assert_eq!(assembly_teardowns.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn skip_from_body_is_not_retried() {
    let c = class("BodySkip");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let test = TestCaseDescriptor::new("s", c.clone())
        .with_retry(RetryPolicy::new(3))
        .with_body(body(move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TestError::skip("platform unsupported"))
            }
        }));

    let (_, sink) = run(vec![test], 2).await;

    assert_eq!(sink.outcome_of(&"s".into()), Some(TestOutcome::Skipped));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn static_skip_and_missing_body() {
    let c = class("Static");
    let (_, sink) = run(
        vec![
            passing("skipped", &c).skip("flaky on CI"),
            TestCaseDescriptor::new("empty", c.clone()),
        ],
        2,
    )
    .await;
    let records = sink.records();

    let skipped = record(&records, "skipped");
    assert_eq!(skipped.outcome, TestOutcome::Skipped);
    assert_eq!(skipped.message.as_deref(), Some("flaky on CI"));

    let empty = record(&records, "empty");
    assert_eq!(empty.outcome, TestOutcome::Error);
    assert!(empty.message.as_deref().unwrap().contains("no body"));
}

#[tokio::test]
async fn panic_in_body_is_a_failure() {
    let c = class("Panics");
    let test = TestCaseDescriptor::new("p", c.clone()).with_body(body(|_| async {
        let values: Vec<u32> = Vec::new();
        ensure(values.first().copied().unwrap_or_else(|| panic!("boom")) > 0, "unreachable")
    }));

    let (_, sink) = run(vec![test], 2).await;
    let records = sink.records();

    assert_eq!(records[0].outcome, TestOutcome::Failed);
    assert!(records[0].message.as_deref().unwrap().contains("boom"));
}

struct Probe {
    context: TestContext,
    disposed: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl TestFixture for Probe {
    async fn dispose(&self) -> TestResult {
        self.disposed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn fresh_fixture_and_context_per_attempt() {
    let built = Arc::new(AtomicUsize::new(0));
    let disposed = Arc::new(AtomicUsize::new(0));
    let probe_class = {
        let built = built.clone();
        let disposed = disposed.clone();
        Arc::new(
            TestClass::new("Probe")
                .with_constructor(Constructor::default_with(|| Err(TestError::runtime("wrong shape"))))
                .with_constructor(Constructor::context_and_output(move |context, output| {
                    built.fetch_add(1, Ordering::SeqCst);
                    output.writeln("constructed");
                    let fixture: FixtureRef = Arc::new(Probe {
                        context,
                        disposed: disposed.clone(),
                    });
                    Ok(fixture)
                })),
        )
    };

    let test = TestCaseDescriptor::new("attempts", probe_class)
        .with_retry(RetryPolicy::new(2))
        .with_body(body(|invocation| async move {
            let probe = invocation
                .fixture
                .downcast_ref::<Probe>()
                .ok_or_else(|| TestError::runtime("fixture is not a probe"))?;
            let attempt = probe.context.attempt();
            probe.context.output().writeln(&format!("attempt {attempt}"));
            ensure(attempt == 3, format!("attempt {attempt} too early"))
        }));

    let (_, sink) = run(vec![test], 2).await;
    let records = sink.records();

    assert_eq!(records[0].outcome, TestOutcome::Passed);
    assert_eq!(built.load(Ordering::SeqCst), 3);
    assert_eq!(disposed.load(Ordering::SeqCst), 3);
    assert_eq!(
        records[0].output.as_deref(),
        Some("constructed\nattempt 3\n")
    );
}

struct FragileFixture {
    failures_left: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl TestFixture for FragileFixture {
    async fn dispose(&self) -> TestResult {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(TestError::runtime("handle leaked"));
        }
        Ok(())
    }
}

#[tokio::test]
async fn disposal_error_on_success_is_retriable() {
    let failures_left = Arc::new(AtomicUsize::new(1));
    let fragile = {
        let failures_left = failures_left.clone();
        Arc::new(TestClass::new("Fragile").with_constructor(Constructor::default_with(move || {
            let fixture: FixtureRef = Arc::new(FragileFixture {
                failures_left: failures_left.clone(),
            });
            Ok(fixture)
        })))
    };

    let (_, sink) = run(
        vec![
            passing("retried", &fragile).with_retry(RetryPolicy::new(1)),
        ],
        2,
    )
    .await;
    assert_eq!(sink.outcome_of(&"retried".into()), Some(TestOutcome::Passed));

    failures_left.store(1, Ordering::SeqCst);
    let (_, sink) = run(vec![passing("single", &fragile)], 2).await;
    let records = sink.records();
    assert_eq!(records[0].outcome, TestOutcome::Error);
    assert!(records[0].message.as_deref().unwrap().contains("handle leaked"));
}

#[tokio::test]
async fn cancellation_skips_remaining_tests() {
    let c = class("Cancel");
    let slow = TestCaseDescriptor::new("slow", c.clone()).with_body(body(|_| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }));
    let calls = Arc::new(AtomicUsize::new(0));
    let later = counting("later", &c, &calls).depends_on("slow");

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        canceller.cancel();
    });

    let sink = Arc::new(CollectingSink::new());
    let report = ExecutionEngine::default()
        .run(vec![slow, later], sink.clone(), token)
        .await
        .unwrap();
    let records = sink.records();

    assert!(report.cancelled);
    assert_eq!(records.len(), 2);
    let slow = record(&records, "slow");
    assert_eq!(slow.outcome, TestOutcome::Error);
    assert_eq!(slow.error_kind.as_deref(), Some("cancelled"));
    let later = record(&records, "later");
    assert_eq!(later.outcome, TestOutcome::Skipped);
    assert_eq!(later.message.as_deref(), Some(RUN_CANCELLED));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn run_cancel_before_timeout_is_cancelled_not_timeout() {
    let c = class("CancelWithTimeout");
    let slow = TestCaseDescriptor::new("bounded", c.clone())
        .with_timeout(Duration::from_secs(5))
        .with_retry(RetryPolicy::new(2))
        .with_body(body(|_| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        }));

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        canceller.cancel();
    });

    let sink = Arc::new(CollectingSink::new());
    let report = ExecutionEngine::default()
        .run(vec![slow], sink.clone(), token)
        .await
        .unwrap();
    let records = sink.records();

    assert!(report.cancelled);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, TestOutcome::Error);
    assert_eq!(records[0].error_kind.as_deref(), Some("cancelled"));
    assert!(report.duration < Duration::from_secs(5));
}

#[tokio::test]
async fn critical_fault_aborts_run_but_tears_down() {
    let c = class("Critical");
    let torn_down = Arc::new(AtomicUsize::new(0));
    let teardown = {
        let torn_down = torn_down.clone();
        hook(move |_| {
            let torn_down = torn_down.clone();
            async move {
                torn_down.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    };
    let calls = Arc::new(AtomicUsize::new(0));

    let fatal = TestCaseDescriptor::new("fatal", c.clone())
        .after(HookScope::Class, teardown)
        .with_body(body(|_| async { Err(TestError::critical("out of file descriptors")) }));
    let next = counting("next", &c, &calls).depends_on("fatal");

    let sink = Arc::new(CollectingSink::new());
    let err = ExecutionEngine::default()
        .run(vec![fatal, next], sink.clone(), CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        RunError::Critical { test, message } => {
            assert_eq!(test.as_str(), "fatal");
            assert!(message.contains("file descriptors"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(torn_down.load(Ordering::SeqCst), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unresolved_dependency_fails_before_running() {
    let c = class("Graph");
    let calls = Arc::new(AtomicUsize::new(0));

    let sink = Arc::new(CollectingSink::new());
    let err = ExecutionEngine::default()
        .run(
            vec![counting("a", &c, &calls), passing("b", &c).depends_on("ghost")],
            sink.clone(),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::Graph(GraphError::UnresolvedDependency { .. })));
    assert!(sink.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_run_is_a_no_op() {
    let (report, sink) = run(Vec::new(), 2).await;
    assert_eq!(report.total, 0);
    assert!(sink.is_empty());
}
