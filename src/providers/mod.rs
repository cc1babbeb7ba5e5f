//! Text-generation provider clients
//!
//! Each client issues exactly one HTTP call per `invoke` and folds
//! every result, including transport errors, into a `ProviderOutcome`.
//! Retrying is the caller's business (see `crate::failover`).

pub mod gemini;
pub mod openai;

pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

use std::time::Duration;
use async_trait::async_trait;
use serde_json::Value;
use log::{debug, error, trace, warn};

/// Message for a 2xx response that carried no usable text
pub const EMPTY_RESPONSE_MESSAGE: &str
  = "APIは応答しましたが、診断テキストが含まれていませんでした。";

/// Prefix for connection / timeout / body-read failures
pub const TRANSPORT_ERROR_PREFIX: &str = "通信エラー: ";

/// Provider-reported phrases that mark an overload as transient.
/// Matched case-insensitively as substrings.
const TRANSIENT_PHRASES: &[&str] = &[
  "high demand"
, "please try again later"
];

/// Whether a failure is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass
{   Retriable
  , Terminal
}

/// Normalized result of one provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome
{   /// Trimmed, never blank
    Success
    {   text: String
    }
  , Failure
    {   message: String
      , class: FailureClass
    }
}

impl ProviderOutcome
{   /// Success when `text` has content after trimming, otherwise a
    /// Terminal failure. A well-formed empty answer is not transient.
    pub fn from_text(text: Option<&str>) -> Self
    {   match text.map(str::trim)
        {   Some(t) if !t.is_empty() => {
              ProviderOutcome::Success { text: t.to_string() }
            }
          , _ => ProviderOutcome::Failure
            {   message: EMPTY_RESPONSE_MESSAGE.to_string()
              , class: FailureClass::Terminal
            }
        }
    }

    pub fn transport(detail: impl std::fmt::Display) -> Self
    {   ProviderOutcome::Failure
        {   message: format!("{}{}", TRANSPORT_ERROR_PREFIX, detail)
          , class: FailureClass::Retriable
        }
    }

    pub fn terminal(message: impl Into<String>) -> Self
    {   ProviderOutcome::Failure
        {   message: message.into()
          , class: FailureClass::Terminal
        }
    }

    pub fn is_success(&self) -> bool
    {   matches!(self, ProviderOutcome::Success { .. })
    }

    pub fn is_retriable(&self) -> bool
    {   matches!(
          self
        , ProviderOutcome::Failure { class: FailureClass::Retriable, .. }
        )
    }

    /// Failure message, `None` on success
    pub fn failure_message(&self) -> Option<&str>
    {   match self
        {   ProviderOutcome::Failure { message, .. } => Some(message)
          , ProviderOutcome::Success { .. } => None
        }
    }
}

/// One text-generation provider.
#[async_trait]
pub trait ProviderClient: Send + Sync
{   fn provider(&self) -> crate::Provider;

    /// Whether a non-blank server credential is configured
    fn has_credential(&self) -> bool;

    /// Issue a single generation call. Never retries.
    async fn invoke(
      &self
    , prompt: &crate::request::Prompt
    , config: &crate::request::GenerationConfig
    ) -> ProviderOutcome;
}

/// Classify a non-2xx response.
pub fn classify_status(status: u16, message: &str) -> FailureClass
{   let lowered = message.to_lowercase();
    let transient_text = TRANSIENT_PHRASES
      .iter()
      .any(|phrase| lowered.contains(phrase));
    if status >= 500 || status == 429 || transient_text
    {   FailureClass::Retriable
    } else
    {   FailureClass::Terminal
    }
}

/// Error text from a provider error body: `error.message`, then a
/// string `error`, then the bare status.
pub fn error_message(status: u16, body: Option<&Value>) -> String
{   let error = body.and_then(|b| b.get("error"));
    error
      .and_then(|e| e.get("message"))
      .and_then(Value::as_str)
      .filter(|m| !m.is_empty())
      .or_else(|| error.and_then(Value::as_str).filter(|m| !m.is_empty()))
      .map(str::to_string)
      .unwrap_or_else(|| format!("HTTP {}", status))
}

/// Turn a provider response into an outcome. `extract` pulls the
/// generated text out of a successful body.
pub(crate) async fn read_outcome(
  provider: crate::Provider
, response: reqwest::Response
, extract: fn(&Value) -> Option<&str>
) -> ProviderOutcome
{   let status = response.status();
    trace!("{} response status: {}", provider, status);

    let raw = match response.text().await
    {   Ok(raw) => raw
      , Err(e) => {
          error!("{} body read failed: {}", provider, e);
          return ProviderOutcome::transport(e.without_url());
        }
    };
    let body = serde_json::from_str::<Value>(&raw).ok();

    if !status.is_success()
    {   let message = error_message(status.as_u16(), body.as_ref());
        let class = classify_status(status.as_u16(), &message);
        warn!("{} API error ({}, {:?}): {}", provider, status, class, message);
        return ProviderOutcome::Failure { message, class };
    }

    let outcome = ProviderOutcome::from_text(
      body.as_ref().and_then(extract)
    );
    if !outcome.is_success()
    {   warn!("{} answered without usable text", provider);
    }
    outcome
}

/// Shared HTTP client construction
pub(crate) fn build_http_client(timeout_secs: u64)
  -> Result<reqwest::Client, crate::error::Error>
{   debug!("Building HTTP client with {}s timeout", timeout_secs);
    reqwest::Client::builder()
      .timeout(Duration::from_secs(timeout_secs))
      .build()
      .map_err(|e| {
        error!("Failed to build HTTP client: {}", e);
        crate::error::Error::HttpError(e.to_string())
      })
}
