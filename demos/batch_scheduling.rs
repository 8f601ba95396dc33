//! Batch Scheduling Demo
//!
//! Wires a scheduler with toy analyzers for every task type, submits a mix of
//! priorities, and prints statuses, results and statistics.
//!
//! Run with `RUST_LOG=analysis_scheduler=debug` to watch batches seal and dispatch.
//! Configuration can be overridden through `ANALYSIS_SCHEDULER_*` variables,
//! e.g. `ANALYSIS_SCHEDULER_MAX_BATCH_SIZE=4`.

use analysis_scheduler::analyzer::FnAnalyzer;
use analysis_scheduler::telemetry::{CompositeJobSink, InMemoryJobSink, TracingJobSink};
use analysis_scheduler::{BatchProcessorConfig, BatchScheduler, Priority, TaskType};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const POSITIVE: &[&str] = &["good", "great", "love", "excellent"];
const NEGATIVE: &[&str] = &["bad", "awful", "hate", "broken"];

fn polarity(text: &str) -> f64 {
    let words: Vec<String> = text.split_whitespace().map(|w| w.to_lowercase()).collect();
    let pos = words.iter().filter(|w| POSITIVE.contains(&w.as_str())).count() as f64;
    let neg = words.iter().filter(|w| NEGATIVE.contains(&w.as_str())).count() as f64;
    if pos + neg == 0.0 {
        0.0
    } else {
        (pos - neg) / (pos + neg)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("analysis_scheduler=info")),
        )
        .init();

    let config = BatchProcessorConfig::default()
        .with_max_batch_size(8)
        .with_max_wait(Duration::from_millis(300))
        .with_env_overrides()?;

    let events = Arc::new(InMemoryJobSink::new(1000));
    let sink = CompositeJobSink::new()
        .add_sink(events.clone())
        .add_sink(Arc::new(TracingJobSink));

    let scheduler = BatchScheduler::builder()
        .config(config)
        .event_sink(Arc::new(sink))
        .analyzer(
            TaskType::Sentiment,
            FnAnalyzer::new("lexicon-polarity", |inputs: &[String]| {
                Ok(inputs.iter().map(|t| json!(polarity(t))).collect())
            }),
        )
        .analyzer(
            TaskType::Entities,
            FnAnalyzer::new("capitalized-words", |inputs: &[String]| {
                Ok(inputs
                    .iter()
                    .map(|t| {
                        let names: Vec<&str> = t
                            .split_whitespace()
                            .filter(|w| w.chars().next().is_some_and(char::is_uppercase))
                            .collect();
                        json!(names)
                    })
                    .collect())
            }),
        )
        .analyzer(
            TaskType::Topics,
            FnAnalyzer::new("longest-words", |inputs: &[String]| {
                Ok(inputs
                    .iter()
                    .map(|t| {
                        let mut words: Vec<&str> = t.split_whitespace().collect();
                        words.sort_by_key(|w| std::cmp::Reverse(w.len()));
                        words.truncate(2);
                        json!(words)
                    })
                    .collect())
            }),
        )
        .analyzer(
            TaskType::Difficulty,
            FnAnalyzer::new("mean-word-length", |inputs: &[String]| {
                Ok(inputs
                    .iter()
                    .map(|t| {
                        let words: Vec<&str> = t.split_whitespace().collect();
                        let total: usize = words.iter().map(|w| w.len()).sum();
                        json!(total as f64 / words.len().max(1) as f64)
                    })
                    .collect())
            }),
        )
        .build()?;

    let reviews: Vec<String> = [
        "I love this great phone",
        "The battery is awful and the screen is broken",
        "Shipping from Berlin to Lisbon took a week",
        "Excellent support from Alice at Contoso",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let sentiment = scheduler
        .submit(reviews.clone(), TaskType::Sentiment, Priority::Normal)
        .await?;
    println!(
        "submitted {} sentiment jobs, estimated wait {:?}",
        sentiment.job_ids.len(),
        sentiment.estimated_time
    );
    let full = scheduler
        .submit(reviews.clone(), "full".parse()?, "urgent".parse()?)
        .await?;

    tokio::time::sleep(Duration::from_millis(500)).await;

    // identical inputs are answered from the cache
    let repeat = scheduler
        .submit(reviews, TaskType::Sentiment, Priority::Low)
        .await?;
    println!("repeat submission estimated wait {:?}", repeat.estimated_time);

    for id in sentiment.job_ids.iter().chain(&full.job_ids) {
        let outcome = scheduler.get_result(id)?;
        println!("{id}: {}", serde_json::to_string(&outcome)?);
    }

    scheduler.shutdown().await;
    println!("{}", serde_json::to_string_pretty(&scheduler.get_statistics())?);
    println!("{} job events recorded", events.len());
    Ok(())
}
