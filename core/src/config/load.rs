use std::path::Path;

use anyhow::Context;

use super::types::AppConfig;

pub const CONFIG_FILE_NAME: &str = "resilient.toml";

/// Load `path` (or defaults when it does not exist), then apply env overrides.
pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let mut cfg = if path.exists() {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        toml::from_str::<AppConfig>(&s)
            .with_context(|| format!("parse config {}", path.display()))?
    } else {
        AppConfig::default()
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    cfg.engine.validate()?;
    Ok(cfg)
}

/// `./resilient.toml` if present, defaults otherwise.
pub fn load_default() -> anyhow::Result<AppConfig> {
    load_from_path(Path::new(CONFIG_FILE_NAME))
}

fn apply_env_overrides<F>(cfg: &mut AppConfig, get: F) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("RESILIENT_MAX_RETRIES") {
        cfg.engine.max_retries = v
            .trim()
            .parse()
            .with_context(|| format!("RESILIENT_MAX_RETRIES={v}"))?;
    }
    if let Some(v) = get("RESILIENT_BASE_RETRY_DELAY_MS") {
        cfg.engine.base_retry_delay_ms = v
            .trim()
            .parse()
            .with_context(|| format!("RESILIENT_BASE_RETRY_DELAY_MS={v}"))?;
    }
    if let Some(v) = get("RESILIENT_TIMEOUT_MS") {
        cfg.engine.timeout_ms = v
            .trim()
            .parse()
            .with_context(|| format!("RESILIENT_TIMEOUT_MS={v}"))?;
    }
    if let Some(v) = get("RESILIENT_RETRY_STRATEGY") {
        cfg.engine.retry_strategy = v.parse().map_err(anyhow::Error::msg)?;
    }
    if let Some(v) = get("RESILIENT_FALLBACK_STRATEGY") {
        cfg.engine.fallback_strategy = v.parse().map_err(anyhow::Error::msg)?;
    }
    if let Some(v) = get("RESILIENT_LOG_LEVEL") {
        cfg.logging.level = v;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::FallbackStrategy;
    use crate::retry::RetryStrategy;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_from_path(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.engine.max_retries, 3);
    }

    #[test]
    fn test_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "[engine]\nbase_retry_delay_ms = 250\nmax_concurrent = 4\n",
        )
        .unwrap();

        let cfg = load_from_path(&path).unwrap();
        assert_eq!(cfg.engine.base_retry_delay_ms, 250);
        assert_eq!(cfg.engine.max_concurrent, Some(4));
    }

    #[test]
    fn test_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[engine]\nmax_concurrent = 0\n").unwrap();
        assert!(load_from_path(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("RESILIENT_MAX_RETRIES", "7"),
            ("RESILIENT_RETRY_STRATEGY", "linear"),
            ("RESILIENT_FALLBACK_STRATEGY", "alternative_task"),
            ("RESILIENT_TIMEOUT_MS", " "),
        ]
        .into_iter()
        .collect();

        let mut cfg = AppConfig::default();
        apply_env_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(cfg.engine.max_retries, 7);
        assert_eq!(cfg.engine.retry_strategy, RetryStrategy::Linear);
        assert_eq!(
            cfg.engine.fallback_strategy,
            FallbackStrategy::AlternativeTask
        );
        assert_eq!(cfg.engine.timeout_ms, 30_000);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut cfg = AppConfig::default();
        let res = apply_env_overrides(&mut cfg, |k| {
            (k == "RESILIENT_MAX_RETRIES").then(|| "lots".to_string())
        });
        assert!(res.is_err());
    }
}
