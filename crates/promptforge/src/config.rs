use std::time::Duration;

use anyhow::{Context, Result};

/// Engine-wide refinement defaults. A [`crate::models::BatchJob`] carries
/// its own copy, so per-job overrides never touch process-wide state.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Accept a candidate once `overall` reaches this (0–10 scale).
    pub quality_threshold: f64,
    /// Hard budget of generate→evaluate rounds per request.
    pub max_iterations: u32,
    /// Upper bound on concurrently running controllers per batch.
    pub concurrency_limit: usize,
    /// Retries per generation call (in addition to the first attempt).
    pub max_retries: u32,
    /// Minimum improvement over the prior best to keep revising.
    pub min_delta: f64,
    /// Per-call budget for one Generation Port call.
    pub generation_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quality_threshold: 8.0,
            max_iterations: 3,
            concurrency_limit: 3,
            max_retries: 3,
            min_delta: 0.1,
            generation_timeout: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    /// Loads overrides from the environment, falling back to defaults for
    /// anything unset. Reads `.env` if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = Self::default();
        Ok(Self {
            quality_threshold: env_parse("FORGE_QUALITY_THRESHOLD", defaults.quality_threshold)?,
            max_iterations: env_parse("FORGE_MAX_ITERATIONS", defaults.max_iterations)?,
            concurrency_limit: env_parse("FORGE_CONCURRENCY_LIMIT", defaults.concurrency_limit)?,
            max_retries: env_parse("FORGE_MAX_RETRIES", defaults.max_retries)?,
            min_delta: env_parse("FORGE_MIN_DELTA", defaults.min_delta)?,
            generation_timeout: Duration::from_secs(env_parse(
                "FORGE_GENERATION_TIMEOUT_SECS",
                defaults.generation_timeout.as_secs(),
            )?),
        })
    }

    pub fn with_quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_min_delta(mut self, delta: f64) -> Self {
        self.min_delta = delta;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("environment variable '{key}' has an invalid value")),
        Err(_) => Ok(default),
    }
}
