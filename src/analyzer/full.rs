//! Composite analyzer for the `full` task type.

use super::BatchAnalyzer;
use crate::types::TaskType;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Runs each component analyzer over the same batch concurrently and merges
/// the per-input results into one object keyed by task name.
///
/// Any component failure fails the whole batch.
pub struct FullAnalyzer {
    parts: Vec<(TaskType, Arc<dyn BatchAnalyzer>)>,
}

impl FullAnalyzer {
    pub fn new(parts: Vec<(TaskType, Arc<dyn BatchAnalyzer>)>) -> Self {
        Self { parts }
    }
}

#[async_trait]
impl BatchAnalyzer for FullAnalyzer {
    async fn analyze_batch(&self, inputs: &[String]) -> Result<Vec<Value>> {
        let runs = self.parts.iter().map(|(task, analyzer)| async move {
            let out = analyzer.analyze_batch(inputs).await?;
            if out.len() != inputs.len() {
                return Err(Error::processing_with_context(
                    format!(
                        "component returned {} results for {} inputs",
                        out.len(),
                        inputs.len()
                    ),
                    ErrorContext::new().with_source(format!("analyzer:{}", task)),
                ));
            }
            Ok((*task, out))
        });
        let per_task = try_join_all(runs).await?;

        let mut merged: Vec<Map<String, Value>> = vec![Map::new(); inputs.len()];
        for (task, results) in per_task {
            for (slot, value) in merged.iter_mut().zip(results) {
                slot.insert(task.as_str().to_string(), value);
            }
        }
        Ok(merged.into_iter().map(Value::Object).collect())
    }

    fn name(&self) -> &str {
        "full"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::FnAnalyzer;
    use serde_json::json;

    fn constant(value: Value) -> Arc<dyn BatchAnalyzer> {
        Arc::new(FnAnalyzer::new("const", move |i: &[String]| {
            Ok(i.iter().map(|_| value.clone()).collect())
        }))
    }

    #[tokio::test]
    async fn test_merges_components_per_input() {
        let lengths: Arc<dyn BatchAnalyzer> = Arc::new(FnAnalyzer::new("len", |i: &[String]| {
            Ok(i.iter().map(|s| json!(s.len())).collect())
        }));
        let full = FullAnalyzer::new(vec![
            (TaskType::Sentiment, constant(json!("positive"))),
            (TaskType::Difficulty, lengths),
        ]);
        let out = full
            .analyze_batch(&["ab".to_string(), "abcd".to_string()])
            .await
            .unwrap();
        assert_eq!(
            out,
            vec![
                json!({"sentiment": "positive", "difficulty": 2}),
                json!({"sentiment": "positive", "difficulty": 4}),
            ]
        );
    }

    #[tokio::test]
    async fn test_component_failure_fails_batch() {
        let offline: Arc<dyn BatchAnalyzer> = Arc::new(FnAnalyzer::new("ner", |_: &[String]| {
            Err(Error::processing("ner model offline"))
        }));
        let full = FullAnalyzer::new(vec![
            (TaskType::Sentiment, constant(json!(0))),
            (TaskType::Entities, offline),
        ]);
        let err = full.analyze_batch(&["x".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("ner model offline"));
    }

    #[tokio::test]
    async fn test_short_component_output_rejected() {
        let empty: Arc<dyn BatchAnalyzer> =
            Arc::new(FnAnalyzer::new("topics", |_: &[String]| Ok(Vec::new())));
        let full = FullAnalyzer::new(vec![(TaskType::Topics, empty)]);
        let err = full.analyze_batch(&["x".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("analyzer:topics"));
    }
}
