//! Retry policy and cross-provider fallback

use std::future::Future;
use std::time::Duration;
use log::{debug, error, info, warn};

use crate::providers::{ProviderClient, ProviderOutcome};
use crate::request::{GenerationConfig, Prompt, UnifiedOutcome};

/// Retry policy for a single provider
#[derive(Debug, Clone)]
pub struct RetryPolicy
{   /// Attempts after the first one
    pub max_retries: usize
  , /// Attempt n sleeps `backoff_base * (n + 1)` before attempt n + 1
    pub backoff_base: Duration
}

impl RetryPolicy
{   /// Create a new retry policy
    pub fn new(
      max_retries: usize
    , backoff_base_ms: u64
    ) -> Self
    {   RetryPolicy
        {   max_retries
          , backoff_base: Duration::from_millis(backoff_base_ms)
        }
    }

    /// Linear backoff applied after a failed `attempt` (0-based)
    pub fn backoff_for_attempt(
      &self
    , attempt: usize
    ) -> Duration
    {   self.backoff_base * (attempt as u32 + 1)
    }

    /// Call `invoke` until it succeeds, fails terminally, or the
    /// retry budget is spent. Returns the last outcome only.
    pub async fn run<F, Fut>(&self, mut invoke: F) -> ProviderOutcome
    where
      F: FnMut() -> Fut
    , Fut: Future<Output = ProviderOutcome>
    {   let mut attempt = 0;
        loop
        {   let record = AttemptRecord::new(
              self
            , attempt
            , invoke().await
            );
            match record.backoff
            {   None => {
                  debug!(
                    "Attempt {} settled (success: {})",
                    record.attempt,
                    record.outcome.is_success()
                  );
                  return record.outcome;
                }
              , Some(delay) => {
                  warn!(
                    "Attempt {} failed: {}. Retrying in {:?}",
                    record.attempt,
                    record.outcome.failure_message().unwrap_or_default(),
                    delay
                  );
                  tokio::time::sleep(delay).await;
                  attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy
{   fn default() -> Self
    {   RetryPolicy::new(2, 800)
    }
}

impl From<&crate::config::FailoverConfig> for RetryPolicy
{   fn from(config: &crate::config::FailoverConfig) -> Self
    {   RetryPolicy::new(config.max_retries, config.backoff_base_ms)
    }
}

/// One attempt's result and the backoff it earns, if any.
/// Lives for a single loop iteration of `RetryPolicy::run`.
#[derive(Debug, Clone)]
pub struct AttemptRecord
{   pub attempt: usize
  , /// `Some` only when another attempt will follow
    pub backoff: Option<Duration>
  , pub outcome: ProviderOutcome
}

impl AttemptRecord
{   pub fn new(
      policy: &RetryPolicy
    , attempt: usize
    , outcome: ProviderOutcome
    ) -> Self
    {   let backoff = if outcome.is_retriable()
                         && attempt < policy.max_retries
        {   Some(policy.backoff_for_attempt(attempt))
        } else
        {   None
        };
        AttemptRecord
        {   attempt
          , backoff
          , outcome
        }
    }
}

/// Runs the retry policy against a primary provider and, once that is
/// exhausted, against an optional secondary.
#[derive(Debug, Clone)]
pub struct FallbackOrchestrator
{   policy: RetryPolicy
  , fallback_enabled: bool
}

impl FallbackOrchestrator
{   pub fn new(policy: RetryPolicy, fallback_enabled: bool) -> Self
    {   FallbackOrchestrator
        {   policy
          , fallback_enabled
        }
    }

    pub fn from_config(config: &crate::config::FailoverConfig) -> Self
    {   FallbackOrchestrator::new(
          RetryPolicy::from(config)
        , config.enabled
        )
    }

    /// Produce diagnosis text, or the error the caller should see.
    ///
    /// A missing primary credential fails before any attempt. The
    /// secondary only runs after the primary's whole budget is spent,
    /// and always with its own default model.
    pub async fn diagnose(
      &self
    , prompt: &Prompt
    , config: &GenerationConfig
    , primary: &dyn ProviderClient
    , secondary: Option<&dyn ProviderClient>
    ) -> Result<String, crate::error::Error>
    {   if !primary.has_credential()
        {   error!("{} credential missing", primary.provider());
            return Err(crate::error::Error::MissingApiKey(
              primary.provider()
            ));
        }

        let mut last_failure
          = match self.run_provider(primary, prompt, config).await
        {   ProviderOutcome::Success { text } => return Ok(text)
          , ProviderOutcome::Failure { message, .. } => message
        };

        match secondary.filter(|_| self.fallback_enabled)
        {   Some(secondary) if secondary.has_credential() => {
              info!(
                "{} exhausted, falling back to {}",
                primary.provider(),
                secondary.provider()
              );
              let fallback_config = config.without_model();
              match self
                .run_provider(secondary, prompt, &fallback_config)
                .await
              {   ProviderOutcome::Success { text } => return Ok(text)
                , ProviderOutcome::Failure { message, .. } => {
                    last_failure = message;
                  }
              }
            }
          , Some(secondary) => {
              debug!(
                "Skipping fallback: {} has no credential",
                secondary.provider()
              );
            }
          , None => {
              debug!("No fallback provider for {}", primary.provider());
            }
        }

        error!("All providers exhausted: {}", last_failure);
        Err(crate::error::Error::ProvidersExhausted(last_failure))
    }

    /// `diagnose`, folded into the caller-facing shape
    pub async fn diagnose_outcome(
      &self
    , prompt: &Prompt
    , config: &GenerationConfig
    , primary: &dyn ProviderClient
    , secondary: Option<&dyn ProviderClient>
    ) -> UnifiedOutcome
    {   self.diagnose(prompt, config, primary, secondary)
          .await
          .into()
    }

    async fn run_provider(
      &self
    , client: &dyn ProviderClient
    , prompt: &Prompt
    , config: &GenerationConfig
    ) -> ProviderOutcome
    {   debug!("Running retry policy against {}", client.provider());
        self.policy
          .run(move || client.invoke(prompt, config))
          .await
    }
}

impl Default for FallbackOrchestrator
{   fn default() -> Self
    {   FallbackOrchestrator::new(RetryPolicy::default(), true)
    }
}
