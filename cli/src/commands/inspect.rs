use anyhow::Context;
use resilient_core::{AppConfig, ErrorClassifier, RetryPolicy, RetryStrategy, TaskError};

use super::cli::{ClassifyArgs, DelaysArgs};

pub fn classify(args: ClassifyArgs) -> anyhow::Result<i32> {
    let classifier = ErrorClassifier::new();
    let error = TaskError::named(args.name, args.message);
    let found = classifier.classify_detailed(&error);

    println!("kind:      {}", found.kind);
    println!("pattern:   {}", found.pattern);
    println!("retryable: {}", found.kind.is_retryable());
    Ok(0)
}

pub fn delays(args: DelaysArgs, cfg: &AppConfig) -> anyhow::Result<i32> {
    let mut policy = RetryPolicy::from_config(&cfg.engine);
    if let Some(s) = args.strategy.as_deref() {
        policy.strategy = s
            .parse::<RetryStrategy>()
            .map_err(anyhow::Error::msg)
            .context("--strategy")?;
    }
    if let Some(ms) = args.base_ms {
        policy.base_delay_ms = ms;
    }
    if let Some(ms) = args.max_ms {
        policy.max_delay_ms = ms;
    }
    if let Some(n) = args.retries {
        policy.max_retries = n;
    }

    println!(
        "strategy={} base={}ms cap={}ms retries={}",
        policy.strategy.as_str(),
        policy.base_delay_ms,
        policy.max_delay_ms,
        policy.max_retries
    );
    let mut total = 0u64;
    for (attempt, delay) in policy.schedule().into_iter().enumerate() {
        total = total.saturating_add(delay);
        println!("  retry {:>2}: {:>8}ms  (cumulative {}ms)", attempt + 1, delay, total);
    }
    Ok(0)
}

pub fn show_config(cfg: &AppConfig) -> anyhow::Result<i32> {
    let s = serde_json::to_string_pretty(cfg).context("serialize config")?;
    println!("{s}");
    Ok(0)
}
