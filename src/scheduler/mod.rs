//! Batch scheduler
//!
//! Turns the dependency graph into a lazy, strictly ordered sequence of
//! batches. A round is planned from the currently ready nodes whenever the
//! previous round's queue runs dry; asking for the next batch completes the
//! one handed out before it.

mod batch;
mod grouping;
mod outcomes;

pub use batch::{BatchKind, TestBatch};
pub use grouping::{any_shared_key, cluster_by_keys, DisjointSet, KeyCluster};
pub use outcomes::OutcomeTable;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::graph::DependencyGraph;
use crate::models::{TestCaseDescriptor, TestCaseId, TestOutcome};

/// Default prefix of cascade-skip reasons
pub const DEPENDENCY_SKIP_PREFIX: &str = "Dependency failed";

/// Scheduling knobs
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Cap for tests without an explicit parallel limit
    pub default_parallelism: usize,
    /// Parallel chunks hold `cap * chunk_factor` tests
    pub chunk_factor: usize,
    pub skip_reason_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            chunk_factor: 2,
            skip_reason_prefix: DEPENDENCY_SKIP_PREFIX.to_string(),
        }
    }
}

/// One batch of a dry-run plan
#[derive(Clone, Debug)]
pub struct PlannedBatch {
    pub round: usize,
    pub batch: TestBatch,
}

/// Lazy batch producer over one run's graph
pub struct BatchScheduler {
    graph: DependencyGraph,
    outcomes: Arc<OutcomeTable>,
    config: SchedulerConfig,
    queue: VecDeque<(TestBatch, Vec<usize>)>,
    in_flight: Vec<usize>,
    round: usize,
    yielded: usize,
}

impl BatchScheduler {
    pub fn new(graph: DependencyGraph, outcomes: Arc<OutcomeTable>, config: SchedulerConfig) -> Self {
        Self {
            graph,
            outcomes,
            config,
            queue: VecDeque::new(),
            in_flight: Vec::new(),
            round: 0,
            yielded: 0,
        }
    }

    /// Next batch to execute, or `None` when done or cancelled.
    ///
    /// The batch returned by the previous call is marked complete first.
    pub fn next_batch(&mut self, cancellation: &CancellationToken) -> Option<TestBatch> {
        for index in std::mem::take(&mut self.in_flight) {
            self.graph.mark_complete(index);
        }

        if cancellation.is_cancelled() {
            return None;
        }

        if self.queue.is_empty() {
            self.plan_round();
        }

        if cancellation.is_cancelled() {
            return None;
        }

        let (batch, members) = self.queue.pop_front()?;
        self.in_flight = members;
        self.yielded += 1;

        debug!("Round {}: yielding {}", self.round, batch);
        Some(batch)
    }

    /// Rounds planned so far
    pub fn current_round(&self) -> usize {
        self.round
    }

    /// Batches handed out so far
    pub fn batches_yielded(&self) -> usize {
        self.yielded
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Descriptors that have no recorded outcome, in input order
    pub fn unreported(&self) -> Vec<Arc<TestCaseDescriptor>> {
        self.graph
            .nodes()
            .iter()
            .filter(|node| !self.outcomes.contains(&node.descriptor().id))
            .map(|node| node.descriptor().clone())
            .collect()
    }

    /// Walk the whole plan as if every test passed
    pub fn dry_run(mut self) -> Vec<PlannedBatch> {
        let token = CancellationToken::new();
        let mut plan = Vec::new();

        while let Some(batch) = self.next_batch(&token) {
            for test in batch.tests() {
                self.outcomes.record(&test.id, TestOutcome::Passed);
            }
            plan.push(PlannedBatch {
                round: self.round,
                batch,
            });
        }

        plan
    }

    /// Dependencies of `index` that make it cascade-skip
    fn failed_prerequisites(&self, index: usize) -> Vec<TestCaseId> {
        self.graph
            .node(index)
            .dependencies()
            .iter()
            .filter(|edge| !edge.proceed_on_failure)
            .filter_map(|edge| {
                let id = &self.graph.node(edge.node).descriptor().id;
                match self.outcomes.get(id) {
                    Some(outcome) if outcome != TestOutcome::Passed => Some(id.clone()),
                    _ => None,
                }
            })
            .collect()
    }

    fn plan_round(&mut self) {
        let ready = self.graph.ready_indices();
        if ready.is_empty() {
            return;
        }
        self.round += 1;

        let mut skipped = Vec::new();
        let mut runnable = Vec::new();
        for index in ready {
            let failed = self.failed_prerequisites(index);
            if failed.is_empty() {
                runnable.push(index);
            } else {
                skipped.push((index, failed));
            }
        }

        if !skipped.is_empty() {
            self.queue_skip_batch(skipped);
        }

        let mut exclusive: Vec<(String, Vec<usize>)> = Vec::new();
        let mut plain_serial = Vec::new();
        let mut constrained = Vec::new();
        let mut parallel = Vec::new();

        for index in runnable {
            let settings = &self.graph.node(index).descriptor().parallel;
            if let Some(group) = &settings.exclusive_group {
                match exclusive.iter_mut().find(|(name, _)| name == group) {
                    Some((_, members)) => members.push(index),
                    None => exclusive.push((group.clone(), vec![index])),
                }
            } else if !settings.constraint_keys.is_empty() {
                constrained.push(index);
            } else if settings.not_in_parallel {
                plain_serial.push(index);
            } else {
                parallel.push(index);
            }
        }

        for (group, members) in exclusive {
            self.queue_exclusive(group, members);
        }

        for index in plain_serial {
            let batch = TestBatch::serial(self.graph.node(index).descriptor().clone());
            self.queue.push_back((batch, vec![index]));
        }

        self.queue_constrained(&constrained);
        self.queue_parallel(parallel);

        debug!(
            "Planned round {}: {} batch(es), {} test(s) pending",
            self.round,
            self.queue.len(),
            self.graph.pending()
        );
    }

    fn queue_skip_batch(&mut self, skipped: Vec<(usize, Vec<TestCaseId>)>) {
        let mut tests = Vec::with_capacity(skipped.len());
        for (index, failed) in skipped {
            let ids: Vec<&str> = failed.iter().map(TestCaseId::as_str).collect();
            let reason = format!("{}: {}", self.config.skip_reason_prefix, ids.join(", "));
            let descriptor = self.graph.node(index).descriptor().with_skip_reason(reason);
            tests.push(Arc::new(descriptor));
            // Release dependents now so the next round can see them
            self.graph.mark_complete(index);
        }
        self.queue.push_back((TestBatch::skip(tests), Vec::new()));
    }

    fn queue_exclusive(&mut self, group: String, members: Vec<usize>) {
        let descriptors: Vec<Arc<TestCaseDescriptor>> = members
            .iter()
            .map(|&i| self.graph.node(i).descriptor().clone())
            .collect();

        let limit = descriptors
            .iter()
            .filter_map(|d| d.parallel.parallel_limit)
            .min()
            .unwrap_or(self.config.default_parallelism);

        let key_sets: Vec<&[String]> = descriptors
            .iter()
            .map(|d| d.parallel.constraint_keys.as_slice())
            .collect();
        let concurrency = if any_shared_key(&key_sets) { 1 } else { limit };

        let mut keys: Vec<String> = key_sets.iter().flat_map(|k| k.iter().cloned()).collect();
        keys.sort();
        keys.dedup();

        let batch = TestBatch::exclusive(group, descriptors, concurrency, keys);
        self.queue.push_back((batch, members));
    }

    fn queue_constrained(&mut self, constrained: &[usize]) {
        if constrained.is_empty() {
            return;
        }

        let items: Vec<(usize, &[String])> = constrained
            .iter()
            .map(|&i| (i, self.graph.node(i).descriptor().parallel.constraint_keys.as_slice()))
            .collect();
        let clusters = cluster_by_keys(&items);

        for cluster in clusters {
            for index in cluster.members {
                let descriptor = self.graph.node(index).descriptor().clone();
                let batch = TestBatch::constrained(descriptor, cluster.keys.clone());
                self.queue.push_back((batch, vec![index]));
            }
        }
    }

    fn queue_parallel(&mut self, parallel: Vec<usize>) {
        let mut by_cap: Vec<(usize, Vec<usize>)> = Vec::new();
        let mut slot_of_cap: HashMap<usize, usize> = HashMap::new();

        for index in parallel {
            let cap = self
                .graph
                .node(index)
                .descriptor()
                .parallel
                .parallel_limit
                .unwrap_or(self.config.default_parallelism)
                .max(1);
            let slot = *slot_of_cap.entry(cap).or_insert_with(|| {
                by_cap.push((cap, Vec::new()));
                by_cap.len() - 1
            });
            by_cap[slot].1.push(index);
        }

        for (cap, members) in by_cap {
            let chunk_size = cap.saturating_mul(self.config.chunk_factor.max(1));
            for chunk in members.chunks(chunk_size) {
                let descriptors = chunk
                    .iter()
                    .map(|&i| self.graph.node(i).descriptor().clone())
                    .collect();
                self.queue
                    .push_back((TestBatch::parallel(descriptors, cap), chunk.to_vec()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Dependency, TestClass};

    fn test(id: &str) -> TestCaseDescriptor {
        TestCaseDescriptor::new(id, Arc::new(TestClass::new("Sched")))
    }

    fn scheduler(descriptors: Vec<TestCaseDescriptor>, parallelism: usize) -> (BatchScheduler, Arc<OutcomeTable>) {
        let graph = DependencyGraph::build(descriptors).unwrap();
        let outcomes = Arc::new(OutcomeTable::new());
        let config = SchedulerConfig {
            default_parallelism: parallelism,
            ..Default::default()
        };
        (BatchScheduler::new(graph, outcomes.clone(), config), outcomes)
    }

    fn ids(batch: &TestBatch) -> Vec<&str> {
        batch.tests().iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_yield_order_within_round() {
        let (mut sched, _) = scheduler(
            vec![
                test("p1"),
                test("k1").constraint_key("db"),
                test("s1").not_in_parallel(),
                test("e1").exclusive_group("g"),
                test("p2"),
                test("e2").exclusive_group("g"),
            ],
            4,
        );
        let token = CancellationToken::new();

        let kinds: Vec<BatchKind> = std::iter::from_fn(|| sched.next_batch(&token))
            .map(|b| b.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                BatchKind::Exclusive,
                BatchKind::Serial,
                BatchKind::Constrained,
                BatchKind::Parallel
            ]
        );
        assert_eq!(sched.current_round(), 1);
    }

    #[test]
    fn test_cascade_skip_batch() {
        let (mut sched, outcomes) = scheduler(
            vec![
                test("a"),
                test("b").depends_on("a"),
                test("c").depends_on("b"),
                test("d").with_dependency(Dependency::on("a").proceed_on_failure()),
            ],
            4,
        );
        let token = CancellationToken::new();

        let first = sched.next_batch(&token).unwrap();
        assert_eq!(ids(&first), vec!["a"]);
        outcomes.record(&"a".into(), TestOutcome::Failed);

        let skip = sched.next_batch(&token).unwrap();
        assert!(skip.is_skip_batch());
        assert_eq!(ids(&skip), vec!["b"]);
        assert_eq!(
            skip.tests()[0].skip_reason.as_deref(),
            Some("Dependency failed: a")
        );

        let run = sched.next_batch(&token).unwrap();
        assert_eq!(ids(&run), vec!["d"]);
        outcomes.record(&"b".into(), TestOutcome::Skipped);
        outcomes.record(&"d".into(), TestOutcome::Passed);

        // c only becomes ready after b was released by the skip batch
        let skip = sched.next_batch(&token).unwrap();
        assert!(skip.is_skip_batch());
        assert_eq!(ids(&skip), vec!["c"]);
        assert!(sched.next_batch(&token).is_none());
    }

    #[test]
    fn test_constrained_clusters_are_single_test_batches() {
        let (mut sched, _) = scheduler(
            vec![
                test("a").constraint_key("db"),
                test("b").constraint_key("cache"),
                test("c").constraint_key("db").not_in_parallel(),
            ],
            4,
        );
        let token = CancellationToken::new();

        let batches: Vec<TestBatch> = std::iter::from_fn(|| sched.next_batch(&token)).collect();
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.is_serial() && b.len() == 1));
        assert_eq!(ids(&batches[0]), vec!["a"]);
        assert_eq!(ids(&batches[1]), vec!["c"]);
        assert_eq!(ids(&batches[2]), vec!["b"]);
        assert_eq!(batches[0].constraint_keys(), &["db".to_string()]);
    }

    #[test]
    fn test_parallel_chunking_by_cap() {
        let mut descriptors: Vec<_> = (0..10).map(|i| test(&format!("t{i}"))).collect();
        descriptors.push(test("limited").parallel_limit(1));
        let (mut sched, _) = scheduler(descriptors, 2);
        let token = CancellationToken::new();

        let batches: Vec<TestBatch> = std::iter::from_fn(|| sched.next_batch(&token)).collect();
        let sizes: Vec<usize> = batches.iter().map(TestBatch::len).collect();
        assert_eq!(sizes, vec![4, 4, 2, 1]);
        assert_eq!(batches[0].concurrency(), 2);
        assert_eq!(batches[3].concurrency(), 1);
    }

    #[test]
    fn test_exclusive_group_limits() {
        let (mut sched, _) = scheduler(
            vec![
                test("a").exclusive_group("g").parallel_limit(3),
                test("b").exclusive_group("g").parallel_limit(2),
                test("c").exclusive_group("h").constraint_key("x"),
                test("d").exclusive_group("h").constraint_key("x"),
            ],
            8,
        );
        let token = CancellationToken::new();

        let g = sched.next_batch(&token).unwrap();
        assert_eq!(g.exclusive_group(), Some("g"));
        assert_eq!(g.concurrency(), 2);

        let h = sched.next_batch(&token).unwrap();
        assert_eq!(h.exclusive_group(), Some("h"));
        assert!(h.is_serial());
    }

    #[test]
    fn test_not_in_parallel_member_stays_in_group() {
        let (mut sched, _) = scheduler(
            vec![
                test("a").exclusive_group("g").not_in_parallel(),
                test("b").exclusive_group("g"),
                test("solo").not_in_parallel(),
            ],
            4,
        );
        let token = CancellationToken::new();

        let group = sched.next_batch(&token).unwrap();
        assert_eq!(group.kind(), BatchKind::Exclusive);
        assert_eq!(ids(&group), vec!["a", "b"]);

        let solo = sched.next_batch(&token).unwrap();
        assert_eq!(solo.kind(), BatchKind::Serial);
        assert_eq!(ids(&solo), vec!["solo"]);
        assert!(sched.next_batch(&token).is_none());
    }

    #[test]
    fn test_cancelled_yields_nothing() {
        let (mut sched, _) = scheduler(vec![test("a"), test("b").depends_on("a")], 4);
        let token = CancellationToken::new();
        assert!(sched.next_batch(&token).is_some());

        token.cancel();
        assert!(sched.next_batch(&token).is_none());
        let unreported: Vec<_> = sched.unreported().iter().map(|d| d.id.to_string()).collect();
        assert_eq!(unreported, vec!["a", "b"]);
    }

    #[test]
    fn test_dry_run_rounds() {
        let (sched, _) = scheduler(
            vec![test("a"), test("b").depends_on("a"), test("c").depends_on("b"), test("d")],
            4,
        );

        let plan = sched.dry_run();
        let rounds: Vec<(usize, Vec<String>)> = plan
            .iter()
            .map(|p| (p.round, p.batch.tests().iter().map(|t| t.id.to_string()).collect()))
            .collect();
        assert_eq!(
            rounds,
            vec![
                (1, vec!["a".to_string(), "d".to_string()]),
                (2, vec!["b".to_string()]),
                (3, vec!["c".to_string()]),
            ]
        );
    }
}
