//! Command-line / environment configuration.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use drover_core::config::ProcessingOptions;
use drover_core::domain::{ConfigError, RetryPolicy};
use drover_core::impls::EmbeddingConfig;
use drover_core::impls::embedding::DEFAULT_API_VERSION;

/// Resilient message-queue consumer
#[derive(Parser, Debug, Clone)]
#[command(name = "drover")]
#[command(about = "Consume a subscription in batches with retries, lease renewal and a circuit breaker")]
pub struct Cli {
    /// Topic the subscription belongs to
    #[arg(long, env = "TOPIC_NAME", default_value = "embeddings")]
    pub topic_name: String,

    #[arg(long, env = "SUBSCRIPTION_NAME", default_value = "drover")]
    pub subscription_name: String,

    #[arg(long, env = "MAX_MESSAGES_PER_BATCH", default_value_t = 10)]
    pub max_messages_per_batch: usize,

    /// Retry outcomes in one batch that open the circuit breaker
    #[arg(long, env = "MAX_FAILURES_PER_BATCH", default_value_t = 2)]
    pub max_failures_per_batch: usize,

    #[arg(long, env = "MAX_WAIT_TIME_SECS", default_value_t = 30)]
    pub max_wait_time_secs: u64,

    #[arg(long, env = "MAX_LEASE_RENEWAL_DURATION_SECS", default_value_t = 300)]
    pub max_lease_renewal_duration_secs: u64,

    #[arg(long, env = "LEASE_RENEWAL_INTERVAL_SECS", default_value_t = 10)]
    pub lease_renewal_interval_secs: u64,

    #[arg(long, env = "CIRCUIT_BREAKER_OPEN_SLEEP_TIME_SECS", default_value_t = 5)]
    pub circuit_breaker_open_sleep_time_secs: u64,

    /// In-process attempts per delivery
    #[arg(long, env = "MAX_RETRIES_PER_MESSAGE", default_value_t = 3)]
    pub max_retries_per_message: u32,

    /// Cap on a single backoff wait (uncapped when unset)
    #[arg(long, env = "MAX_BACKOFF_SECS")]
    pub max_backoff_secs: Option<u64>,

    /// Azure OpenAI resource endpoint; the simulated handler is used when unset
    #[arg(long, env = "OPENAI_ENDPOINT")]
    pub openai_endpoint: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_EMBEDDING_DEPLOYMENT", default_value = "text-embedding-ada-002")]
    pub openai_embedding_deployment: String,

    #[arg(long, env = "OPENAI_API_VERSION", default_value = DEFAULT_API_VERSION)]
    pub openai_api_version: String,

    #[arg(long, env = "OPENAI_TIMEOUT_SECS", default_value_t = 10)]
    pub openai_timeout_secs: u64,

    /// Sample messages published to the local subscription at startup
    #[arg(long, env = "SEED_MESSAGES", default_value_t = 5)]
    pub seed_messages: usize,

    /// Calls the simulated handler fails before it starts succeeding
    #[arg(long, env = "SIMULATED_FAILURES", default_value_t = 2)]
    pub simulated_failures: u32,

    /// Serve Prometheus metrics on this port; metrics are not exported when unset
    #[arg(long, env = "METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

impl Cli {
    pub fn to_options(&self) -> Result<ProcessingOptions, ConfigError> {
        let mut policy = RetryPolicy::doubling();
        if let Some(secs) = self.max_backoff_secs {
            policy = policy.with_max_delay(Duration::from_secs(secs));
        }

        ProcessingOptions::builder()
            .max_messages_per_batch(self.max_messages_per_batch)
            .max_failures_per_batch(self.max_failures_per_batch)
            .max_wait_time(Duration::from_secs(self.max_wait_time_secs))
            .max_lease_renewal_duration(Duration::from_secs(self.max_lease_renewal_duration_secs))
            .lease_renewal_interval(Duration::from_secs(self.lease_renewal_interval_secs))
            .circuit_breaker_open_sleep_time(Duration::from_secs(
                self.circuit_breaker_open_sleep_time_secs,
            ))
            .max_retry_attempts(self.max_retries_per_message)
            .retry_policy(policy)
            .build()
    }

    pub fn metrics_listener(&self) -> Option<SocketAddr> {
        self.metrics_port.map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    }

    /// `None` when no endpoint is configured.
    pub fn embedding_config(&self) -> Result<Option<EmbeddingConfig>> {
        let Some(endpoint) = &self.openai_endpoint else {
            return Ok(None);
        };
        let Some(api_key) = &self.openai_api_key else {
            bail!("OPENAI_API_KEY is required when OPENAI_ENDPOINT is set");
        };

        Ok(Some(
            EmbeddingConfig::new(endpoint, api_key, &self.openai_embedding_deployment)
                .with_api_version(&self.openai_api_version)
                .with_timeout(Duration::from_secs(self.openai_timeout_secs)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("drover").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn flags_override_defaults() {
        let cli = parse(&[
            "--max-messages-per-batch",
            "20",
            "--max-failures-per-batch",
            "4",
            "--max-backoff-secs",
            "8",
        ]);
        let options = cli.to_options().unwrap();

        assert_eq!(options.max_messages_per_batch(), 20);
        assert_eq!(options.max_failures_per_batch(), 4);
        assert_eq!(options.retry_policy().max_delay, Some(Duration::from_secs(8)));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cli = parse(&["--max-messages-per-batch", "0"]);
        assert!(cli.to_options().is_err());
    }

    #[test]
    fn metrics_listener_only_when_port_given() {
        let mut cli = parse(&["--metrics-port", "9100"]);
        assert_eq!(cli.metrics_port, Some(9100));
        assert_eq!(
            cli.metrics_listener(),
            Some(SocketAddr::from(([0, 0, 0, 0], 9100)))
        );

        cli.metrics_port = None;
        assert_eq!(cli.metrics_listener(), None);
    }

    #[test]
    fn endpoint_requires_api_key() {
        let mut cli = parse(&[]);
        cli.openai_endpoint = Some("https://example.openai.azure.com".into());
        cli.openai_api_key = None;
        assert!(cli.embedding_config().is_err());

        cli.openai_api_key = Some("key".into());
        let config = cli.embedding_config().unwrap().unwrap();
        assert_eq!(config.timeout, Duration::from_secs(cli.openai_timeout_secs));
    }
}
