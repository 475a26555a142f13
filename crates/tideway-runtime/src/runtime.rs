//! The pipeline scheduler
//!
//! The [`Runtime`] holds the processor registry, resolves resource kinds
//! through the dispatch registries, and drives a run: one task per replica,
//! each wiring a worker, a sink actor, and a source actor, with
//! `recommended_num_threads()` pull/process/ack loops sharing the source
//! actor. The run joins every task before resolving - there is no mid-run
//! cancellation - and the registry is reset on every exit path so the next
//! run starts from a clean slate.

use crate::connectors;
use crate::registry::{SinkProvider, SinkRegistry, SourceProvider, SourceRegistry};
use crate::resource::ResourceRef;
use crate::session::{SessionTracker, UsageReporter};
use crate::sink_runner::SinkActor;
use crate::source_runner::SourceActor;
use crate::worker::Worker;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tideway_core::{PipelineError, ProcessorFactory, Record, Result};
use tracing::{debug, error, info, warn};

/// Aggregated per-sink results of one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutput {
    sinks: BTreeMap<String, Vec<Record>>,
}

impl RunOutput {
    /// An output with no sinks
    pub fn new() -> Self {
        Self::default()
    }

    /// Append records under a sink key, preserving their order after any
    /// records already recorded for that key
    pub fn extend(&mut self, key: &str, records: Vec<Record>) {
        self.sinks.entry(key.to_string()).or_default().extend(records);
    }

    /// The records recorded for a sink key
    pub fn records(&self, key: &str) -> Option<&[Record]> {
        self.sinks.get(key).map(Vec::as_slice)
    }

    /// The sink keys, sorted
    pub fn sink_keys(&self) -> impl Iterator<Item = &str> {
        self.sinks.keys().map(String::as_str)
    }

    /// Number of sink keys
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Total records across all sinks
    pub fn total_records(&self) -> usize {
        self.sinks.values().map(Vec::len).sum()
    }

    /// Whether no sink produced anything
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Consume into the underlying map
    pub fn into_inner(self) -> BTreeMap<String, Vec<Record>> {
        self.sinks
    }
}

/// Lifecycle state of a runtime instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    /// Constructed, between runs
    Ready,
    /// Inside `run`
    Running,
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Running => write!(f, "running"),
        }
    }
}

/// A registered processor with its input and output references
#[derive(Clone)]
struct ProcessorRef {
    factory: Arc<dyn ProcessorFactory>,
    input: ResourceRef,
    output: ResourceRef,
}

/// The processor runtime
pub struct Runtime {
    processors: Mutex<HashMap<String, ProcessorRef>>,
    sources: SourceRegistry,
    sinks: SinkRegistry,
    usage: Box<dyn UsageReporter>,
    run_gate: tokio::sync::Mutex<()>,
    state: Mutex<RuntimeState>,
}

static GLOBAL: OnceLock<Runtime> = OnceLock::new();

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Runtime {
    /// Create a runtime with the built-in connector registries
    pub fn new() -> Self {
        Self::with_registries(
            connectors::create_source_registry(),
            connectors::create_sink_registry(),
        )
    }

    /// Create a runtime with custom dispatch registries
    pub fn with_registries(sources: SourceRegistry, sinks: SinkRegistry) -> Self {
        Self {
            processors: Mutex::new(HashMap::new()),
            sources,
            sinks,
            usage: Box::new(SessionTracker::load()),
            run_gate: tokio::sync::Mutex::new(()),
            state: Mutex::new(RuntimeState::Ready),
        }
    }

    /// The process-wide runtime, initialized on first use
    pub fn global() -> &'static Runtime {
        GLOBAL.get_or_init(Runtime::new)
    }

    /// Current lifecycle state
    pub fn state(&self) -> RuntimeState {
        *lock(&self.state)
    }

    /// Ids of the currently registered processors
    pub fn registered_processors(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.processors).keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Register a processor with its input and output resources
    ///
    /// The id defaults to the factory's `processor_id()`. Re-registering
    /// the same id overwrites it with a logged warning. The runtime
    /// supports a single live processor per run: registering a second,
    /// distinct id is a configuration error.
    pub fn register_processor(
        &self,
        factory: Arc<dyn ProcessorFactory>,
        input: ResourceRef,
        output: ResourceRef,
        processor_id: Option<&str>,
    ) -> Result<()> {
        let id = processor_id
            .map(str::to_string)
            .unwrap_or_else(|| factory.processor_id().to_string());

        let mut processors = lock(&self.processors);
        if processors.contains_key(&id) {
            warn!(processor = %id, "processor already registered, overwriting");
        } else if let Some(existing) = processors.keys().next() {
            return Err(PipelineError::configuration(format!(
                "cannot register processor '{}': '{}' is already registered and the \
                 runtime supports a single live processor",
                id, existing
            )));
        }

        processors.insert(
            id,
            ProcessorRef {
                factory,
                input,
                output,
            },
        );
        Ok(())
    }

    /// Run the registered processor across `num_replicas` replicas
    ///
    /// Whatever the outcome, the processor registry is cleared before this
    /// returns; a failed run logs the error and propagates it unchanged.
    pub async fn run(&self, num_replicas: usize) -> Result<RunOutput> {
        let _gate = self.run_gate.lock().await;
        *lock(&self.state) = RuntimeState::Running;
        self.usage.record_run();
        info!(num_replicas, "starting pipeline run");

        let result = self.run_inner(num_replicas).await;
        match &result {
            Ok(output) => info!(
                sinks = output.sink_count(),
                records = output.total_records(),
                "pipeline run finished"
            ),
            Err(e) => error!(error = %e, detail = ?e, "pipeline run failed"),
        }

        lock(&self.processors).clear();
        *lock(&self.state) = RuntimeState::Ready;
        result
    }

    async fn run_inner(&self, num_replicas: usize) -> Result<RunOutput> {
        if num_replicas == 0 {
            return Err(PipelineError::configuration(
                "num_replicas must be at least 1",
            ));
        }

        let processor = {
            let processors = lock(&self.processors);
            processors.values().next().cloned()
        }
        .ok_or_else(|| PipelineError::configuration("no processor registered"))?;

        let source_provider = self.sources.get(&processor.input.kind).ok_or_else(|| {
            PipelineError::configuration(format!(
                "unknown source kind '{}'. Available: {:?}",
                processor.input.kind,
                self.sources.kinds()
            ))
        })?;
        let sink_provider = self.sinks.get(&processor.output.kind).ok_or_else(|| {
            PipelineError::configuration(format!(
                "unknown sink kind '{}'. Available: {:?}",
                processor.output.kind,
                self.sinks.kinds()
            ))
        })?;

        let replica_args = source_provider
            .replica_args(&processor.input.config, num_replicas)
            .map_err(|e| PipelineError::source(processor.input.kind.clone(), e.to_string()))?;

        let mut handles = Vec::with_capacity(replica_args.len());
        for (replica, source_arg) in replica_args.into_iter().enumerate() {
            let ctx = ReplicaContext {
                replica,
                factory: processor.factory.clone(),
                source_kind: processor.input.kind.clone(),
                source_provider: source_provider.clone(),
                source_arg,
                sink_kind: processor.output.kind.clone(),
                sink_key: processor.output.key().to_string(),
                sink_provider: sink_provider.clone(),
                sink_config: processor.output.config.clone(),
            };
            handles.push(tokio::spawn(run_replica(ctx)));
        }

        // fan-in join: every replica finishes before the run resolves, and
        // the first failure wins once all are done
        let mut fragments = Vec::with_capacity(handles.len());
        let mut first_err: Option<PipelineError> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(fragment)) => fragments.push(fragment),
                Ok(Err(e)) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(PipelineError::Task(e.to_string()));
                    }
                }
            }
        }
        if let Some(e) = first_err {
            return Err(e);
        }

        let mut output = RunOutput::new();
        for (key, records) in fragments {
            output.extend(&key, records);
        }
        Ok(output)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

struct ReplicaContext {
    replica: usize,
    factory: Arc<dyn ProcessorFactory>,
    source_kind: String,
    source_provider: Arc<dyn SourceProvider>,
    source_arg: serde_yaml::Value,
    sink_kind: String,
    sink_key: String,
    sink_provider: Arc<dyn SinkProvider>,
    sink_config: serde_yaml::Value,
}

async fn run_replica(ctx: ReplicaContext) -> Result<(String, Vec<Record>)> {
    let worker = Worker::start(ctx.factory.as_ref()).await?;
    let input_hint = worker.input_hint();
    let output_hint = worker.output_hint();

    let sink_strategy = ctx
        .sink_provider
        .create(&ctx.sink_config)
        .await
        .map_err(|e| PipelineError::sink(ctx.sink_kind.clone(), e.to_string()))?;
    let push_converter = sink_strategy.push_converter(output_hint);
    let sink = Arc::new(SinkActor::new(
        ctx.sink_key.clone(),
        ctx.sink_kind.clone(),
        worker,
        sink_strategy,
        push_converter,
    ));

    let source_strategy = ctx
        .source_provider
        .create(&ctx.source_arg)
        .await
        .map_err(|e| PipelineError::source(ctx.source_kind.clone(), e.to_string()))?;
    let pull_converter = source_strategy.pull_converter(input_hint);
    let num_threads = source_strategy.recommended_num_threads().max(1);
    let source = SourceActor::new(
        ctx.source_kind.clone(),
        source_strategy,
        pull_converter,
        sink.clone(),
    );

    debug!(
        replica = ctx.replica,
        num_threads, "replica loop tasks starting"
    );
    let loops = futures::future::join_all((0..num_threads).map(|_| source.run())).await;

    let output = sink.take_output().await;
    for result in loops {
        result?;
    }
    Ok((ctx.sink_key, output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tideway_core::FnProcessor;

    fn identity() -> Arc<dyn ProcessorFactory> {
        Arc::new(FnProcessor::new("identity", |r| r))
    }

    fn dataset_ref(rows: &[Record]) -> ResourceRef {
        let config = serde_yaml::to_value(serde_json::json!({ "rows": rows })).unwrap();
        ResourceRef::new("dataset").with_config(config)
    }

    #[test]
    fn test_second_distinct_registration_fails() {
        let runtime = Runtime::new();
        runtime
            .register_processor(identity(), ResourceRef::empty(), ResourceRef::empty(), None)
            .unwrap();

        let err = runtime
            .register_processor(
                identity(),
                ResourceRef::empty(),
                ResourceRef::empty(),
                Some("other"),
            )
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(runtime.registered_processors(), vec!["identity"]);
    }

    #[test]
    fn test_same_id_registration_overwrites() {
        let runtime = Runtime::new();
        runtime
            .register_processor(identity(), ResourceRef::empty(), ResourceRef::empty(), None)
            .unwrap();
        runtime
            .register_processor(
                identity(),
                ResourceRef::new("dataset"),
                ResourceRef::empty(),
                Some("identity"),
            )
            .unwrap();
        assert_eq!(runtime.registered_processors(), vec!["identity"]);
    }

    #[tokio::test]
    async fn test_run_without_processor_fails_and_stays_ready() {
        let runtime = Runtime::new();
        let err = runtime.run(1).await.unwrap_err();
        assert!(err.to_string().contains("no processor registered"));
        assert_eq!(runtime.state(), RuntimeState::Ready);
    }

    #[tokio::test]
    async fn test_zero_replicas_is_a_configuration_error() {
        let runtime = Runtime::new();
        runtime
            .register_processor(identity(), ResourceRef::empty(), ResourceRef::empty(), None)
            .unwrap();
        let err = runtime.run(0).await.unwrap_err();
        assert!(err.to_string().contains("num_replicas"));
    }

    #[tokio::test]
    async fn test_unknown_kind_fails_at_run_time_not_registration() {
        let runtime = Runtime::new();
        runtime
            .register_processor(
                identity(),
                ResourceRef::new("warehouse"),
                ResourceRef::empty(),
                None,
            )
            .unwrap();

        let err = runtime.run(1).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("unknown source kind 'warehouse'"));
        assert!(message.contains("dataset"));
        // failed run still reset the registry
        assert!(runtime.registered_processors().is_empty());
    }

    #[tokio::test]
    async fn test_registry_resets_after_success_and_failure() {
        let runtime = Runtime::new();

        runtime
            .register_processor(identity(), dataset_ref(&[json!(1)]), ResourceRef::empty(), None)
            .unwrap();
        runtime.run(1).await.unwrap();
        assert!(runtime.registered_processors().is_empty());

        let failing = Arc::new(FnProcessor::fallible("explode", |_| {
            Err(PipelineError::transform("no thanks"))
        }));
        runtime
            .register_processor(failing, dataset_ref(&[json!(1)]), ResourceRef::empty(), None)
            .unwrap();
        runtime.run(1).await.unwrap_err();
        assert!(runtime.registered_processors().is_empty());

        // a fresh registration runs independent of the prior outcome
        runtime
            .register_processor(identity(), dataset_ref(&[json!(2)]), ResourceRef::empty(), None)
            .unwrap();
        let output = runtime.run(1).await.unwrap();
        assert_eq!(output.records("empty"), Some(&[json!(2)][..]));
    }

    #[tokio::test]
    async fn test_replica_merge_preserves_per_replica_order() {
        let runtime = Runtime::new();
        runtime
            .register_processor(
                identity(),
                dataset_ref(&[json!("a"), json!("b"), json!("c")]),
                ResourceRef::empty(),
                None,
            )
            .unwrap();

        let output = runtime.run(2).await.unwrap();
        let records = output.records("empty").unwrap();
        assert_eq!(records.len(), 3);
        let pos = |r: &Record| records.iter().position(|x| x == r).unwrap();
        assert!(pos(&json!("a")) < pos(&json!("b")));
        assert!(records.contains(&json!("c")));
    }

    #[test]
    fn test_run_output_extend_and_queries() {
        let mut output = RunOutput::new();
        assert!(output.is_empty());

        output.extend("orders", vec![json!(1), json!(2)]);
        output.extend("orders", vec![json!(3)]);
        assert_eq!(
            output.records("orders"),
            Some(&[json!(1), json!(2), json!(3)][..])
        );
        assert_eq!(output.sink_count(), 1);
        assert_eq!(output.total_records(), 3);
        assert_eq!(output.sink_keys().collect::<Vec<_>>(), vec!["orders"]);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(RuntimeState::Ready.to_string(), "ready");
        assert_eq!(RuntimeState::Running.to_string(), "running");
    }

    #[test]
    fn test_global_runtime_is_one_instance() {
        let first = Runtime::global() as *const Runtime;
        let second = Runtime::global() as *const Runtime;
        assert_eq!(first, second);
        assert_eq!(Runtime::global().state(), RuntimeState::Ready);
    }
}
