//! Run configuration for the pipeline.

use std::collections::BTreeSet;

use crate::defaults;

/// Tuning knobs for one pipeline run.
///
/// Built from [`RunConfig::default`], the `with_*` builders, or environment
/// variables via [`RunConfig::from_env`].
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Minimum similarity for a fuzzy term match, in [0, 1].
    pub similarity_threshold: f32,
    /// Maximum submission attempts per resource (first try included).
    pub max_retry_attempts: u32,
    /// Resources per checkpointed batch.
    pub batch_size: usize,
    /// Coded fields that must resolve for a resource to be built.
    pub mandatory_fields: BTreeSet<String>,
    /// Bounded queue capacity between stages.
    pub queue_capacity: usize,
    /// Concurrent resolver/builder workers.
    pub resolver_workers: usize,
    /// Concurrent submission workers.
    pub submit_workers: usize,
    /// Exponential backoff base delay in milliseconds.
    pub backoff_base_ms: u64,
    /// Backoff ceiling in milliseconds.
    pub backoff_max_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: defaults::SIMILARITY_THRESHOLD,
            max_retry_attempts: defaults::MAX_RETRY_ATTEMPTS,
            batch_size: defaults::BATCH_SIZE,
            mandatory_fields: BTreeSet::new(),
            queue_capacity: defaults::QUEUE_CAPACITY,
            resolver_workers: defaults::RESOLVER_WORKERS,
            submit_workers: defaults::SUBMIT_WORKERS,
            backoff_base_ms: defaults::BACKOFF_BASE_MS,
            backoff_max_ms: defaults::BACKOFF_MAX_MS,
        }
    }
}

impl RunConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `PHENOLINK_SIMILARITY_THRESHOLD` | `0.85` | Fuzzy match floor, clamped to [0, 1] |
    /// | `PHENOLINK_MAX_RETRY_ATTEMPTS` | `5` | Submission attempt ceiling (min 1) |
    /// | `PHENOLINK_BATCH_SIZE` | `50` | Resources per checkpointed batch (min 1) |
    /// | `PHENOLINK_MANDATORY_FIELDS` | (empty) | Comma-separated coded field names |
    /// | `PHENOLINK_QUEUE_CAPACITY` | `100` | Bounded queue capacity (min batch size) |
    /// | `PHENOLINK_RESOLVER_WORKERS` | `4` | Resolver/builder concurrency (min 1) |
    /// | `PHENOLINK_SUBMIT_WORKERS` | `4` | Submission concurrency (min 1) |
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PHENOLINK_SIMILARITY_THRESHOLD") {
            if let Ok(t) = val.parse::<f32>() {
                config.similarity_threshold = t.clamp(0.0, 1.0);
            } else {
                tracing::warn!(value = %val, "Invalid PHENOLINK_SIMILARITY_THRESHOLD, using default");
            }
        }

        if let Ok(val) = std::env::var("PHENOLINK_MAX_RETRY_ATTEMPTS") {
            if let Ok(n) = val.parse::<u32>() {
                config.max_retry_attempts = n.max(1);
            } else {
                tracing::warn!(value = %val, "Invalid PHENOLINK_MAX_RETRY_ATTEMPTS, using default");
            }
        }

        if let Ok(val) = std::env::var("PHENOLINK_BATCH_SIZE") {
            if let Ok(n) = val.parse::<usize>() {
                config.batch_size = n.max(1);
            } else {
                tracing::warn!(value = %val, "Invalid PHENOLINK_BATCH_SIZE, using default");
            }
        }

        if let Ok(val) = std::env::var("PHENOLINK_MANDATORY_FIELDS") {
            config.mandatory_fields = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        if let Ok(val) = std::env::var("PHENOLINK_QUEUE_CAPACITY") {
            if let Ok(n) = val.parse::<usize>() {
                config.queue_capacity = n;
            }
        }

        if let Ok(val) = std::env::var("PHENOLINK_RESOLVER_WORKERS") {
            if let Ok(n) = val.parse::<usize>() {
                config.resolver_workers = n.max(1);
            }
        }

        if let Ok(val) = std::env::var("PHENOLINK_SUBMIT_WORKERS") {
            if let Ok(n) = val.parse::<usize>() {
                config.submit_workers = n.max(1);
            }
        }

        // Queue must hold at least one batch or the producer deadlocks.
        config.queue_capacity = config.queue_capacity.max(config.batch_size);

        config
    }

    /// Set the fuzzy similarity threshold (clamped to [0, 1]).
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set the submission attempt ceiling (minimum 1).
    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts.max(1);
        self
    }

    /// Set the batch size (minimum 1); queue capacity grows to fit.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self.queue_capacity = self.queue_capacity.max(self.batch_size);
        self
    }

    /// Set the coded fields that must resolve.
    pub fn with_mandatory_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mandatory_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Set resolver/builder worker count (minimum 1).
    pub fn with_resolver_workers(mut self, workers: usize) -> Self {
        self.resolver_workers = workers.max(1);
        self
    }

    /// Set submission worker count (minimum 1).
    pub fn with_submit_workers(mut self, workers: usize) -> Self {
        self.submit_workers = workers.max(1);
        self
    }

    /// Set backoff base and ceiling in milliseconds.
    pub fn with_backoff(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.backoff_base_ms = base_ms;
        self.backoff_max_ms = max_ms.max(base_ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = RunConfig::default();
        assert_eq!(config.similarity_threshold, defaults::SIMILARITY_THRESHOLD);
        assert_eq!(config.max_retry_attempts, defaults::MAX_RETRY_ATTEMPTS);
        assert_eq!(config.batch_size, defaults::BATCH_SIZE);
        assert!(config.mandatory_fields.is_empty());
    }

    #[test]
    fn test_config_builder_chaining() {
        let config = RunConfig::default()
            .with_similarity_threshold(0.9)
            .with_max_retry_attempts(3)
            .with_batch_size(10)
            .with_mandatory_fields(["phenotype"])
            .with_resolver_workers(2)
            .with_submit_workers(8);

        assert_eq!(config.similarity_threshold, 0.9);
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.batch_size, 10);
        assert!(config.mandatory_fields.contains("phenotype"));
        assert_eq!(config.resolver_workers, 2);
        assert_eq!(config.submit_workers, 8);
    }

    #[test]
    fn test_threshold_clamped() {
        assert_eq!(
            RunConfig::default()
                .with_similarity_threshold(1.5)
                .similarity_threshold,
            1.0
        );
        assert_eq!(
            RunConfig::default()
                .with_similarity_threshold(-0.2)
                .similarity_threshold,
            0.0
        );
    }

    #[test]
    fn test_minimums_enforced() {
        let config = RunConfig::default()
            .with_max_retry_attempts(0)
            .with_batch_size(0)
            .with_resolver_workers(0)
            .with_submit_workers(0);

        assert_eq!(config.max_retry_attempts, 1);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.resolver_workers, 1);
        assert_eq!(config.submit_workers, 1);
    }

    #[test]
    fn test_queue_capacity_covers_batch() {
        let config = RunConfig::default().with_batch_size(500);
        assert!(config.queue_capacity >= 500);
    }

    #[test]
    fn test_backoff_ceiling_at_least_base() {
        let config = RunConfig::default().with_backoff(1000, 10);
        assert_eq!(config.backoff_base_ms, 1000);
        assert_eq!(config.backoff_max_ms, 1000);
    }
}
