//! 分析器模块：按任务类型注册可插拔的批量分析函数。
//!
//! # Analyzer Module
//!
//! The scheduler treats analysis routines as black boxes with a batch
//! signature: an ordered slice of inputs in, a same-length, same-order vector
//! of results out (or an error that fails the whole batch).
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`BatchAnalyzer`] | Capability implemented once per task type |
//! | [`FnAnalyzer`] | Adapts a synchronous closure into a [`BatchAnalyzer`] |
//! | [`FullAnalyzer`] | Runs every component analyzer and merges the results |
//! | [`AnalyzerRegistry`] | Enum-keyed lookup table from [`TaskType`] to analyzer |
//!
//! ## Example
//!
//! ```rust
//! use analysis_scheduler::analyzer::{AnalyzerRegistry, FnAnalyzer};
//! use analysis_scheduler::TaskType;
//! use serde_json::json;
//!
//! let registry = AnalyzerRegistry::new().with(
//!     TaskType::Sentiment,
//!     FnAnalyzer::new("length", |inputs: &[String]| {
//!         Ok(inputs.iter().map(|s| json!(s.len())).collect())
//!     }),
//! );
//! assert!(registry.get(TaskType::Sentiment).is_some());
//! ```

mod full;

pub use full::FullAnalyzer;

use crate::types::TaskType;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;

/// Batch analysis routine for one task type.
///
/// Implementations must return exactly one result per input, in input order.
#[async_trait]
pub trait BatchAnalyzer: Send + Sync {
    async fn analyze_batch(&self, inputs: &[String]) -> Result<Vec<Value>>;

    fn name(&self) -> &str {
        "anonymous"
    }
}

/// Wraps a synchronous `Fn(&[String]) -> Result<Vec<Value>>`.
///
/// The closure runs on tokio's blocking pool, so a slow closure neither stalls
/// the runtime nor escapes the worker's batch timeout. A timed-out closure
/// still runs to completion on its blocking thread; its result is discarded.
pub struct FnAnalyzer<F> {
    name: String,
    f: Arc<F>,
}

impl<F> FnAnalyzer<F>
where
    F: Fn(&[String]) -> Result<Vec<Value>> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }
}

#[async_trait]
impl<F> BatchAnalyzer for FnAnalyzer<F>
where
    F: Fn(&[String]) -> Result<Vec<Value>> + Send + Sync + 'static,
{
    async fn analyze_batch(&self, inputs: &[String]) -> Result<Vec<Value>> {
        let f = Arc::clone(&self.f);
        let inputs = inputs.to_vec();
        tokio::task::spawn_blocking(move || f(&inputs))
            .await
            .map_err(|e| {
                let message = if e.is_panic() {
                    format!("Analyzer panicked: {}", panic_message(e.into_panic().as_ref()))
                } else {
                    format!("Analyzer task was cancelled: {e}")
                };
                Error::processing_with_context(
                    message,
                    ErrorContext::new().with_source(self.name.clone()),
                )
            })?
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Lookup table of analyzers indexed by task type.
#[derive(Clone, Default)]
pub struct AnalyzerRegistry {
    table: [Option<Arc<dyn BatchAnalyzer>>; 5],
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task_type: TaskType, analyzer: Arc<dyn BatchAnalyzer>) {
        self.table[task_type.index()] = Some(analyzer);
    }

    pub fn with(mut self, task_type: TaskType, analyzer: impl BatchAnalyzer + 'static) -> Self {
        self.register(task_type, Arc::new(analyzer));
        self
    }

    pub fn get(&self, task_type: TaskType) -> Option<Arc<dyn BatchAnalyzer>> {
        self.table[task_type.index()].clone()
    }

    pub fn registered(&self) -> Vec<TaskType> {
        TaskType::ALL
            .iter()
            .copied()
            .filter(|t| self.table[t.index()].is_some())
            .collect()
    }

    /// Fill the `full` slot with a [`FullAnalyzer`] over the registered components,
    /// unless one was registered explicitly or no component exists.
    pub fn with_composite_full(mut self) -> Self {
        if self.table[TaskType::Full.index()].is_some() {
            return self;
        }
        let parts: Vec<(TaskType, Arc<dyn BatchAnalyzer>)> = TaskType::COMPONENTS
            .iter()
            .filter_map(|t| self.get(*t).map(|a| (*t, a)))
            .collect();
        if !parts.is_empty() {
            self.register(TaskType::Full, Arc::new(FullAnalyzer::new(parts)));
        }
        self
    }
}

impl std::fmt::Debug for AnalyzerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerRegistry")
            .field("registered", &self.registered())
            .finish()
    }
}
