use super::core::BatchScheduler;
use crate::analyzer::{AnalyzerRegistry, BatchAnalyzer};
use crate::batch::{AccumulatorConfig, PriorityBatchAccumulator};
use crate::cache::{CacheBackend, CacheConfig, CacheKeyGenerator, MemoryCache, NullCache, ResultCache};
use crate::config::BatchProcessorConfig;
use crate::events::{noop_sink, JobEventSink};
use crate::registry::{JobRegistry, JobStore};
use crate::stats::StatisticsCollector;
use crate::types::TaskType;
use crate::worker::{spawn_deadline_ticker, WorkerContext, WorkerPool};
use crate::{Error, ErrorContext, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Builder for [`BatchScheduler`].
///
/// Everything except the analyzers has a working default: in-memory job
/// store, LRU result cache sized by `max_cache_size`, and a no-op event sink.
pub struct BatchSchedulerBuilder {
    config: BatchProcessorConfig,
    analyzers: AnalyzerRegistry,
    cache_backend: Option<Box<dyn CacheBackend>>,
    key_generator: Option<CacheKeyGenerator>,
    sink: Arc<dyn JobEventSink>,
    store: Option<Arc<dyn JobStore>>,
}

impl BatchSchedulerBuilder {
    pub fn new() -> Self {
        Self {
            config: BatchProcessorConfig::default(),
            analyzers: AnalyzerRegistry::new(),
            cache_backend: None,
            key_generator: None,
            sink: noop_sink(),
            store: None,
        }
    }

    pub fn config(mut self, config: BatchProcessorConfig) -> Self {
        self.config = config;
        self
    }

    /// Register the analyzer for one task type, replacing any previous one.
    pub fn analyzer(mut self, task_type: TaskType, analyzer: impl BatchAnalyzer + 'static) -> Self {
        self.analyzers.register(task_type, Arc::new(analyzer));
        self
    }

    pub fn shared_analyzer(mut self, task_type: TaskType, analyzer: Arc<dyn BatchAnalyzer>) -> Self {
        self.analyzers.register(task_type, analyzer);
        self
    }

    /// Replace the whole analyzer table.
    pub fn analyzers(mut self, analyzers: AnalyzerRegistry) -> Self {
        self.analyzers = analyzers;
        self
    }

    /// Use a custom cache backend instead of the default LRU memory cache.
    pub fn cache_backend(mut self, backend: impl CacheBackend + 'static) -> Self {
        self.cache_backend = Some(Box::new(backend));
        self
    }

    pub fn cache_keys(mut self, keys: CacheKeyGenerator) -> Self {
        self.key_generator = Some(keys);
        self
    }

    /// Inject a job event sink. Default is a no-op sink.
    pub fn event_sink(mut self, sink: Arc<dyn JobEventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn job_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Validate the configuration and start the worker pool and deadline
    /// ticker on the current tokio runtime.
    pub fn build(self) -> Result<BatchScheduler> {
        let config = self.config;
        config.validate()?;
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(Error::configuration_with_context(
                "BatchScheduler must be built inside a tokio runtime",
                ErrorContext::new().with_source("BatchSchedulerBuilder::build"),
            ));
        }

        let backend: Box<dyn CacheBackend> = match self.cache_backend {
            Some(backend) => backend,
            None if config.max_cache_size == 0 => Box::new(NullCache::new()),
            None => Box::new(MemoryCache::new(config.max_cache_size)),
        };
        let mut cache = ResultCache::new(
            CacheConfig::new()
                .with_enabled(config.cache_results)
                .with_ttl(config.cache_ttl()),
            backend,
        );
        if let Some(keys) = self.key_generator {
            cache = cache.with_key_generator(keys);
        }

        let analyzers = self.analyzers.with_composite_full();
        if analyzers.registered().is_empty() {
            warn!("no analyzers registered; every batch will fail");
        }

        let accumulator = Arc::new(PriorityBatchAccumulator::new(AccumulatorConfig {
            max_batch_size: config.max_batch_size,
            max_wait: config.max_wait(),
        }));
        let registry = self
            .store
            .map(JobRegistry::new)
            .unwrap_or_else(JobRegistry::in_memory);

        let ctx = Arc::new(WorkerContext {
            accumulator: accumulator.clone(),
            registry,
            analyzers,
            cache: Arc::new(cache),
            stats: Arc::new(StatisticsCollector::new(config.duration_window)),
            sink: self.sink,
            batch_timeout: config.batch_timeout(),
        });

        let workers = WorkerPool::spawn(ctx.clone(), config.worker_count);
        let token = CancellationToken::new();
        let ticker = spawn_deadline_ticker(accumulator, config.tick_interval(), token.clone());

        info!(
            workers = config.worker_count,
            max_batch_size = config.max_batch_size,
            max_wait_ms = config.max_wait().as_millis() as u64,
            cache = ctx.cache.backend_name(),
            analyzers = ?ctx.analyzers.registered(),
            "batch scheduler started"
        );

        Ok(BatchScheduler::from_parts(config, ctx, workers, ticker, token))
    }
}

impl Default for BatchSchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
