use std::fmt;
use std::sync::mpsc::channel;
use std::time::{Duration, Instant};

use petgraph::Direction;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use tracing::{Level, Span, info};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::checkpoint::{CacheContext, CheckpointCache};
use crate::core::{ArcStr, Dynamic, Mode, RunContext, TaskContext};
use crate::engine::{GraphId, InputRef, TaskHandle};
use crate::error::RunError;
use crate::graph::Graph;
use crate::param::ParamSnapshot;

/// Where the output of a task came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// The task body ran.
    Computed,
    /// The output was read from a checkpoint.
    Cached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskReport {
    pub status: TaskStatus,
    pub duration: Duration,
}

struct Finished {
    value: Dynamic,
    report: TaskReport,
}

struct Entry {
    name: ArcStr,
    value: Dynamic,
    report: TaskReport,
}

/// The outputs of a successful run, one per task.
pub struct Outputs {
    graph: GraphId,
    entries: Vec<Entry>,
}

impl Outputs {
    /// The output of the task behind `handle`.
    pub fn get<T>(&self, handle: TaskHandle<T>) -> Option<&T>
    where
        T: 'static,
    {
        if handle.graph != self.graph {
            return None;
        }

        self.entries.get(handle.index.index())?.value.downcast_ref()
    }

    /// The output of the task called `name`, if it has type `T`.
    pub fn get_by_name<T>(&self, name: &str) -> Option<&T>
    where
        T: 'static,
    {
        self.entry(name)?.value.downcast_ref()
    }

    pub fn report(&self, name: &str) -> Option<TaskReport> {
        self.entry(name).map(|entry| entry.report)
    }

    /// Task names with their reports, in declaration order.
    pub fn reports(&self) -> impl Iterator<Item = (&str, TaskReport)> {
        self.entries.iter().map(|e| (e.name.as_ref(), e.report))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name.as_ref() == name)
    }
}

impl fmt::Debug for Outputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.reports()).finish()
    }
}

/// Runs frozen graphs, optionally backed by a checkpoint cache.
///
/// The engine itself holds no per-run state, so one engine can run any
/// number of graphs, one after another or from several threads.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    cache: Option<CheckpointCache>,
}

impl Engine {
    /// An engine that computes every task, checkpointed or not.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(cache: CheckpointCache) -> Self {
        Self { cache: Some(cache) }
    }

    pub fn cache(&self) -> Option<&CheckpointCache> {
        self.cache.as_ref()
    }

    /// Runs every task of `graph` once.
    ///
    /// Fails with the first task that fails. Nothing computed by the run is
    /// returned in that case, but checkpoints it wrote stay in the cache.
    pub fn run(
        &self,
        graph: &Graph,
        params: &ParamSnapshot,
        context: &RunContext,
        mode: Mode,
    ) -> Result<Outputs, RunError> {
        if params.graph != graph.id {
            return Err(RunError::ForeignParameters);
        }

        let root = tracing::span!(Level::INFO, "run", tasks = graph.len());
        root.pb_set_length(graph.len() as u64);
        if let Some(style) = crate::utils::style_run() {
            root.pb_set_style(&style);
        }
        let _enter = root.enter();

        let started = Instant::now();

        let finished = match mode {
            Mode::Sequential => self.run_sequential(graph, params, context, &root)?,
            Mode::Parallel { workers } => self.run_parallel(graph, params, context, &root, workers)?,
        };

        let entries = graph
            .graph
            .node_indices()
            .zip(finished)
            .map(|(index, finished)| {
                let name = graph.graph[index].name.clone();
                finished
                    .map(|Finished { value, report }| Entry {
                        name: name.clone(),
                        value,
                        report,
                    })
                    .ok_or_else(|| missing(&name))
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(elapsed = ?started.elapsed(), "Run complete");

        Ok(Outputs {
            graph: graph.id,
            entries,
        })
    }

    fn run_sequential(
        &self,
        graph: &Graph,
        params: &ParamSnapshot,
        context: &RunContext,
        root: &Span,
    ) -> Result<Vec<Option<Finished>>, RunError> {
        let mut finished: Vec<Option<Finished>> = graph.graph.node_indices().map(|_| None).collect();

        for &index in graph.topological() {
            let inputs = gather(graph, params, &finished, index)?;
            let done = self
                .execute(graph, params, context, index, &inputs, root)
                .map_err(|source| RunError::TaskExecution {
                    node: graph.graph[index].name.to_string(),
                    source,
                })?;

            finished[index.index()] = Some(done);
            root.pb_inc(1);
        }

        Ok(finished)
    }

    /// Dispatches tasks to a bounded pool as soon as everything they depend
    /// on has finished.
    ///
    /// The calling thread coordinates: it owns every output, counts the
    /// unfinished dependencies of each task and hands ready tasks their
    /// inputs. Workers report back through a channel, so each output is
    /// written exactly once, by the coordinator, before any dependent is
    /// dispatched. After a failure nothing new is dispatched and the tasks
    /// already running are drained.
    fn run_parallel(
        &self,
        graph: &Graph,
        params: &ParamSnapshot,
        context: &RunContext,
        root: &Span,
        workers: usize,
    ) -> Result<Vec<Option<Finished>>, RunError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("epiflow-worker-{i}"))
            .build()?;

        let mut finished: Vec<Option<Finished>> = graph.graph.node_indices().map(|_| None).collect();
        let mut waiting_on: Vec<usize> = graph
            .graph
            .node_indices()
            .map(|i| graph.graph.edges_directed(i, Direction::Incoming).count())
            .collect();

        let mut failure: Option<RunError> = None;

        // The coordinator runs on this thread, not on a pool thread, so a
        // single worker is never blocked waiting for itself.
        pool.in_place_scope(|s| {
            let (sender, receiver) = channel::<(NodeIndex, anyhow::Result<Finished>)>();

            let spawn = |index: NodeIndex, inputs: Vec<Dynamic>| {
                let sender = sender.clone();
                s.spawn(move |_| {
                    let result = self.execute(graph, params, context, index, &inputs, root);
                    // The coordinator outlives every worker.
                    let _ = sender.send((index, result));
                });
            };

            let mut running = 0;

            for &index in graph.topological() {
                if waiting_on[index.index()] == 0 {
                    match gather(graph, params, &finished, index) {
                        Ok(inputs) => {
                            spawn(index, inputs);
                            running += 1;
                        }
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
            }

            while running > 0 {
                let Ok((index, result)) = receiver.recv() else {
                    break;
                };
                running -= 1;

                let done = match result {
                    Ok(done) => done,
                    Err(source) => {
                        if failure.is_none() {
                            failure = Some(RunError::TaskExecution {
                                node: graph.graph[index].name.to_string(),
                                source,
                            });
                        }
                        continue;
                    }
                };

                finished[index.index()] = Some(done);
                root.pb_inc(1);

                if failure.is_some() {
                    continue;
                }

                let mut ready: Vec<NodeIndex> = Vec::new();
                for edge in graph.graph.edges_directed(index, Direction::Outgoing) {
                    let target = edge.target();
                    waiting_on[target.index()] -= 1;
                    if waiting_on[target.index()] == 0 {
                        ready.push(target);
                    }
                }
                ready.sort();

                for target in ready {
                    match gather(graph, params, &finished, target) {
                        Ok(inputs) => {
                            spawn(target, inputs);
                            running += 1;
                        }
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
            }
        });

        match failure {
            Some(e) => Err(e),
            None => Ok(finished),
        }
    }

    /// Produces the output of one task: from its checkpoint when there is
    /// one for the current key, otherwise by running the task body.
    fn execute(
        &self,
        graph: &Graph,
        params: &ParamSnapshot,
        context: &RunContext,
        index: NodeIndex,
        inputs: &[Dynamic],
        root: &Span,
    ) -> anyhow::Result<Finished> {
        let node = &graph.graph[index];

        let span = tracing::span!(parent: root, Level::INFO, "task", name = %node.name);
        if let Some(style) = crate::utils::style_task() {
            span.pb_set_style(&style);
        }
        span.pb_set_message(&format!("Running {}", node.name));
        let _enter = span.enter();

        let start = Instant::now();

        let checkpoint = match (&self.cache, &node.checkpoint) {
            (Some(cache), Some(checkpoint)) => {
                let cache_context = CacheContext::new(context.today()).with_params(params);
                let key = checkpoint.template.render(&node.name, &cache_context);
                Some((cache, checkpoint, key))
            }
            _ => None,
        };

        if let Some((cache, checkpoint, key)) = &checkpoint
            && let Some(value) = cache.load(key, &checkpoint.codec)
        {
            info!(key = %key, "Restored from checkpoint");
            return Ok(Finished {
                value,
                report: TaskReport {
                    status: TaskStatus::Cached,
                    duration: start.elapsed(),
                },
            });
        }

        let task_context = TaskContext {
            name: &node.name,
            run: context,
            span: span.clone(),
        };

        // AssertUnwindSafe: a panicking task only ever sees its own inputs,
        // which are immutable and shared through `Arc`.
        let value = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            node.task.execute(&task_context, inputs)
        })) {
            Ok(result) => result?,
            Err(panic) => {
                let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                    format!("Task panicked: {s}")
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    format!("Task panicked: {s}")
                } else {
                    String::from("Task panicked with unknown payload")
                };

                return Err(anyhow::anyhow!(msg));
            }
        };

        if let Some((cache, checkpoint, key)) = &checkpoint {
            cache.store(key, &checkpoint.codec, &value, context.now);
        }

        let duration = start.elapsed();
        info!(elapsed = ?duration, "Finished");

        Ok(Finished {
            value,
            report: TaskReport {
                status: TaskStatus::Computed,
                duration,
            },
        })
    }
}

/// Collects the values a task receives, in the order it declared them.
fn gather(
    graph: &Graph,
    params: &ParamSnapshot,
    finished: &[Option<Finished>],
    index: NodeIndex,
) -> Result<Vec<Dynamic>, RunError> {
    let node = &graph.graph[index];

    node.inputs
        .iter()
        .map(|input| {
            let value = match *input {
                InputRef::Task(upstream) => finished
                    .get(upstream.index())
                    .and_then(Option::as_ref)
                    .map(|done| done.value.clone()),
                InputRef::Param(id) => params.decoded(id).cloned(),
            };

            value.ok_or_else(|| missing(&node.name))
        })
        .collect()
}

fn missing(node: &str) -> RunError {
    RunError::TaskExecution {
        node: node.to_string(),
        source: anyhow::anyhow!("an input was not produced before the task was scheduled"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    use super::*;
    use crate::checkpoint::{CheckpointStore, MemoryStore};
    use crate::error::CacheError;
    use crate::{Blueprint, BuildError};

    fn day(d: u32) -> RunContext {
        RunContext::at(Utc.with_ymd_and_hms(2021, 1, d, 8, 0, 0).unwrap())
    }

    fn diamond() -> (Graph, Vec<TaskHandle<i64>>) {
        let mut blueprint = Blueprint::new();
        let base = blueprint.parameter("base", 3_i64).unwrap();
        let a = blueprint.add_node("a", base, |_, b| Ok(*b)).unwrap();
        let b = blueprint.add_node("b", a, |_, a| Ok(a * 2)).unwrap();
        let c = blueprint.add_node("c", a, |_, a| Ok(a + 10)).unwrap();
        let d = blueprint.add_node("d", (b, c), |_, (b, c)| Ok(b * c)).unwrap();
        (blueprint.build().unwrap(), vec![a, b, c, d])
    }

    #[test]
    fn test_sequential_diamond() {
        let (graph, handles) = diamond();
        let params = graph.resolve(&BTreeMap::new()).unwrap();

        let outputs = Engine::new()
            .run(&graph, &params, &day(1), Mode::Sequential)
            .unwrap();

        let values: Vec<i64> = handles.iter().map(|&h| *outputs.get(h).unwrap()).collect();
        assert_eq!(values, [3, 6, 13, 78]);
        assert_eq!(outputs.get_by_name::<i64>("d"), Some(&78));
        assert_eq!(outputs.get_by_name::<String>("d"), None);
        assert_eq!(outputs.names().collect::<Vec<_>>(), ["a", "b", "c", "d"]);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (graph, handles) = diamond();
        let overrides = BTreeMap::from([("base".to_string(), serde_json::json!(5))]);
        let params = graph.resolve(&overrides).unwrap();

        let engine = Engine::new();
        let sequential = engine.run(&graph, &params, &day(1), Mode::Sequential).unwrap();

        for workers in [1, 2, 8] {
            let parallel = engine
                .run(&graph, &params, &day(1), Mode::Parallel { workers })
                .unwrap();

            for &handle in &handles {
                assert_eq!(sequential.get(handle), parallel.get(handle));
            }
        }
    }

    #[test]
    fn test_failure_names_task() {
        let mut blueprint = Blueprint::new();
        let a = blueprint.add_node("a", (), |_, ()| Ok(1)).unwrap();
        let b = blueprint
            .add_node("b", a, |_, _| -> anyhow::Result<i32> { anyhow::bail!("boom") })
            .unwrap();
        blueprint.add_node("c", b, |_, b| Ok(b + 1)).unwrap();
        let graph = blueprint.build().unwrap();
        let params = graph.resolve(&BTreeMap::new()).unwrap();

        for mode in [Mode::Sequential, Mode::Parallel { workers: 2 }] {
            let err = Engine::new().run(&graph, &params, &day(1), mode).unwrap_err();
            assert_eq!(err.node(), Some("b"));
            assert!(err.to_string().contains("boom"));
        }
    }

    #[test]
    fn test_panic_is_failure() {
        let mut blueprint = Blueprint::new();
        blueprint
            .add_node("explode", (), |_, ()| -> anyhow::Result<()> { panic!("kaboom") })
            .unwrap();
        let graph = blueprint.build().unwrap();
        let params = graph.resolve(&BTreeMap::new()).unwrap();

        for mode in [Mode::Sequential, Mode::Parallel { workers: 1 }] {
            let err = Engine::new().run(&graph, &params, &day(1), mode).unwrap_err();
            assert_eq!(err.node(), Some("explode"));
            assert!(err.to_string().contains("kaboom"));
        }
    }

    #[test]
    fn test_foreign_parameters() {
        let (graph, _) = diamond();
        let (other, _) = diamond();
        let params = other.resolve(&BTreeMap::new()).unwrap();

        let err = Engine::new()
            .run(&graph, &params, &day(1), Mode::Sequential)
            .unwrap_err();
        assert!(matches!(err, RunError::ForeignParameters));
    }

    fn counted(calls: Arc<AtomicUsize>) -> Graph {
        let mut blueprint = Blueprint::new();
        let download = blueprint
            .task()
            .name("download")
            .checkpoint()
            .run(move |_, ()| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![1_i64, 2, 3])
            })
            .unwrap();
        blueprint
            .add_node("sum", download, |_, rows| Ok(rows.iter().sum::<i64>()))
            .unwrap();
        blueprint.build().unwrap()
    }

    #[test]
    fn test_checkpoint_same_day() {
        let calls = Arc::new(AtomicUsize::new(0));
        let graph = counted(calls.clone());
        let params = graph.resolve(&BTreeMap::new()).unwrap();
        let engine = Engine::with_cache(CheckpointCache::in_memory());

        let first = engine.run(&graph, &params, &day(1), Mode::Sequential).unwrap();
        let second = engine
            .run(&graph, &params, &day(1), Mode::Parallel { workers: 2 })
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.get_by_name::<i64>("sum"), Some(&6));
        assert_eq!(second.get_by_name::<i64>("sum"), Some(&6));
        assert_eq!(first.report("download").unwrap().status, TaskStatus::Computed);
        assert_eq!(second.report("download").unwrap().status, TaskStatus::Cached);
        assert_eq!(second.report("sum").unwrap().status, TaskStatus::Computed);
    }

    #[test]
    fn test_checkpoint_new_day() {
        let calls = Arc::new(AtomicUsize::new(0));
        let graph = counted(calls.clone());
        let params = graph.resolve(&BTreeMap::new()).unwrap();
        let engine = Engine::with_cache(CheckpointCache::in_memory());

        engine.run(&graph, &params, &day(1), Mode::Sequential).unwrap();
        engine.run(&graph, &params, &day(2), Mode::Sequential).unwrap();
        engine.run(&graph, &params, &day(2), Mode::Sequential).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_without_cache_always_computes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let graph = counted(calls.clone());
        let params = graph.resolve(&BTreeMap::new()).unwrap();

        Engine::new().run(&graph, &params, &day(1), Mode::Sequential).unwrap();
        Engine::new().run(&graph, &params, &day(1), Mode::Sequential).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    struct BrokenStore;

    impl CheckpointStore for BrokenStore {
        fn read(&self, _: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Err(std::io::Error::other("disk on fire").into())
        }

        fn write(&self, _: &str, _: &[u8]) -> Result<(), CacheError> {
            Err(std::io::Error::other("disk on fire").into())
        }

        fn clear(&self) -> Result<usize, CacheError> {
            Ok(0)
        }
    }

    #[test]
    fn test_broken_cache_does_not_fail_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let graph = counted(calls.clone());
        let params = graph.resolve(&BTreeMap::new()).unwrap();
        let engine = Engine::with_cache(CheckpointCache::new(BrokenStore));

        let outputs = engine.run(&graph, &params, &day(1), Mode::Sequential).unwrap();
        engine.run(&graph, &params, &day(1), Mode::Sequential).unwrap();

        assert_eq!(outputs.get_by_name::<i64>("sum"), Some(&6));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failure_keeps_earlier_checkpoints() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut blueprint = Blueprint::new();
        let download = blueprint
            .task()
            .name("download")
            .checkpoint()
            .run(move |_, ()| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(1_u32)
            })
            .unwrap();
        blueprint
            .add_node("fail", download, |_, _| -> anyhow::Result<()> { anyhow::bail!("nope") })
            .unwrap();
        let graph = blueprint.build().unwrap();
        let params = graph.resolve(&BTreeMap::new()).unwrap();

        let store = Arc::new(MemoryStore::new());
        let engine = Engine::with_cache(CheckpointCache::new(SharedStore(store.clone())));

        assert!(engine.run(&graph, &params, &day(1), Mode::Sequential).is_err());
        assert!(engine.run(&graph, &params, &day(1), Mode::Sequential).is_err());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.clear().unwrap(), 1);
    }

    struct SharedStore(Arc<MemoryStore>);

    impl CheckpointStore for SharedStore {
        fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            self.0.read(key)
        }

        fn write(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
            self.0.write(key, bytes)
        }

        fn clear(&self) -> Result<usize, CacheError> {
            self.0.clear()
        }
    }

    #[test]
    fn test_param_in_key() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut blueprint = Blueprint::new();
        let country = blueprint.parameter("country", "Germany".to_string()).unwrap();
        blueprint
            .task()
            .name("download")
            .using(country)
            .checkpoint()
            .key("{task_name}-{country}-{today}")
            .run(move |_, country| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(country.clone())
            })
            .unwrap();
        let graph = blueprint.build().unwrap();
        let engine = Engine::with_cache(CheckpointCache::in_memory());

        let germany = graph.resolve(&BTreeMap::new()).unwrap();
        let overrides = BTreeMap::from([("country".to_string(), serde_json::json!("France"))]);
        let france = graph.resolve(&overrides).unwrap();

        engine.run(&graph, &germany, &day(1), Mode::Sequential).unwrap();
        let out = engine.run(&graph, &france, &day(1), Mode::Sequential).unwrap();
        engine.run(&graph, &france, &day(1), Mode::Sequential).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(out.get_by_name::<String>("download").map(String::as_str), Some("France"));
    }

    #[test]
    fn test_cycle_never_runs() {
        let mut blueprint = Blueprint::new();
        let a = blueprint.add_node("a", (), |_, ()| Ok(())).unwrap();
        let b = blueprint.add_node("b", a, |_, _| Ok(())).unwrap();
        blueprint.set_upstream(a, b).unwrap();

        assert!(matches!(blueprint.build(), Err(BuildError::CyclicGraph { .. })));
    }

    /// Builds a random DAG where task `i` sums its inputs plus `i`.
    fn random_graph(edges: &[(usize, usize)], size: usize) -> (Graph, Vec<TaskHandle<u64>>) {
        let mut blueprint = Blueprint::new();
        let mut handles: Vec<TaskHandle<u64>> = Vec::new();

        for i in 0..size {
            let inputs: Vec<TaskHandle<u64>> = edges
                .iter()
                .filter(|&&(from, to)| to == i && from < i)
                .map(|&(from, _)| handles[from])
                .collect();

            let own = i as u64;
            let handle = blueprint
                .add_node(&format!("t{i}"), inputs, move |_, values| {
                    Ok(values.into_iter().sum::<u64>() + own)
                })
                .unwrap();
            handles.push(handle);
        }

        (blueprint.build().unwrap(), handles)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_parallel_equals_sequential(
            size in 1_usize..24,
            edges in proptest::collection::vec((0_usize..24, 0_usize..24), 0..64),
            workers in 1_usize..6,
        ) {
            let (graph, handles) = random_graph(&edges, size);
            let params = graph.resolve(&BTreeMap::new()).unwrap();
            let engine = Engine::new();

            let sequential = engine.run(&graph, &params, &day(1), Mode::Sequential).unwrap();
            let parallel = engine.run(&graph, &params, &day(1), Mode::Parallel { workers }).unwrap();

            for handle in handles {
                prop_assert_eq!(sequential.get(handle), parallel.get(handle));
            }
        }

        #[test]
        fn prop_order_respects_edges(
            size in 1_usize..24,
            edges in proptest::collection::vec((0_usize..24, 0_usize..24), 0..64),
        ) {
            let (graph, _) = random_graph(&edges, size);
            let order: Vec<&str> = graph.order().collect();
            prop_assert_eq!(order.len(), size);

            for &(from, to) in &edges {
                if from < to && to < size {
                    let a = order.iter().position(|n| *n == format!("t{from}"));
                    let b = order.iter().position(|n| *n == format!("t{to}"));
                    prop_assert!(a < b);
                }
            }
        }
    }
}
