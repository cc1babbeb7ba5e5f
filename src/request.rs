//! Inbound request validation and the unified caller-facing outcome

use serde::{Deserialize, Serialize};
use serde_json::Value;
use log::{debug, trace};

/// Temperature used when the caller sends none or garbage
pub const DEFAULT_TEMPERATURE: f32 = 0.9;
pub const MIN_TEMPERATURE: f32 = 0.0;
pub const MAX_TEMPERATURE: f32 = 2.0;

/// Validated prompt text, never empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt(String);

impl Prompt
{   pub fn new(text: impl Into<String>)
      -> Result<Self, crate::error::Error>
    {   let text = text.into();
        if text.is_empty()
        {   return Err(crate::error::Error::MissingPrompt);
        }
        Ok(Prompt(text))
    }

    pub fn as_str(&self) -> &str
    {   &self.0
    }
}

/// Per-request generation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig
{   /// Sampling temperature, always within [0, 2]
    pub temperature: f32
  , /// Requested model; the provider default applies when `None`
    pub model: Option<String>
}

impl Default for GenerationConfig
{   fn default() -> Self
    {   GenerationConfig
        {   temperature: DEFAULT_TEMPERATURE
          , model: None
        }
    }
}

impl GenerationConfig
{   /// Same parameters without a model, for dispatch to a fallback
    /// provider that would not recognise the caller's model id.
    pub fn without_model(&self) -> Self
    {   GenerationConfig
        {   temperature: self.temperature
          , model: None
        }
    }
}

/// Clamp a raw temperature into [0, 2].
///
/// Absent, null, empty and unparsable values become 0.9. Numbers and
/// numeric strings are clamped.
pub fn clamp_temperature(raw: Option<&Value>) -> f32
{   let parsed = match raw
    {   Some(Value::Number(n)) => n.as_f64()
      , Some(Value::String(s)) => s.trim().parse::<f64>().ok()
      , _ => None
    };
    match parsed
    {   Some(t) if !t.is_nan() => {
          (t as f32).clamp(MIN_TEMPERATURE, MAX_TEMPERATURE)
        }
      , _ => DEFAULT_TEMPERATURE
    }
}

/// Validate a diagnosis request body.
pub fn validate(body: &Value)
  -> Result<(Prompt, GenerationConfig), crate::error::Error>
{   trace!("Validating request body");
    let prompt = match body.get("prompt")
    {   Some(Value::String(text)) => Prompt::new(text.clone())?
      , _ => {
          debug!("Rejected request without usable prompt");
          return Err(crate::error::Error::MissingPrompt);
        }
    };

    let model = match body.get("model")
    {   Some(Value::String(m)) if !m.is_empty() => Some(m.clone())
      , _ => None
    };

    let config = GenerationConfig
    {   temperature: clamp_temperature(body.get("temperature"))
      , model
    };
    debug!(
      "Validated prompt ({} chars), temperature {}",
      prompt.as_str().chars().count(),
      config.temperature
    );
    Ok((prompt, config))
}

/// Validate raw request bytes; bodies that are not JSON count as empty.
pub fn validate_bytes(body: &[u8])
  -> Result<(Prompt, GenerationConfig), crate::error::Error>
{   let value = serde_json::from_slice::<Value>(body)
      .unwrap_or(Value::Null);
    validate(&value)
}

/// The value handed back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedOutcome
{   pub ok: bool
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>
}

impl UnifiedOutcome
{   pub fn success(text: impl Into<String>) -> Self
    {   UnifiedOutcome
        {   ok: true
          , text: Some(text.into())
          , error: None
        }
    }

    pub fn failure(error: &crate::error::Error) -> Self
    {   UnifiedOutcome
        {   ok: false
          , text: None
          , error: Some(error.to_string())
        }
    }
}

impl From<Result<String, crate::error::Error>> for UnifiedOutcome
{   fn from(result: Result<String, crate::error::Error>) -> Self
    {   match result
        {   Ok(text) => UnifiedOutcome::success(text)
          , Err(e) => UnifiedOutcome::failure(&e)
        }
    }
}

#[cfg(test)]
mod tests
{   use super::*;
    use serde_json::json;

    #[test]
    fn temperature_defaults_when_absent_or_garbage()
    {   assert_eq!(clamp_temperature(None), DEFAULT_TEMPERATURE);
        for raw in [json!(null), json!(""), json!("warm"), json!(true),
                    json!([1]), json!({"t": 1})]
        {   assert_eq!(
              clamp_temperature(Some(&raw))
            , DEFAULT_TEMPERATURE
            , "input {}", raw
            );
        }
    }

    #[test]
    fn temperature_is_clamped()
    {   assert_eq!(clamp_temperature(Some(&json!(-3))), 0.0);
        assert_eq!(clamp_temperature(Some(&json!(7.5))), 2.0);
        assert_eq!(clamp_temperature(Some(&json!("2.5"))), 2.0);
        assert_eq!(clamp_temperature(Some(&json!(" -0.1 "))), 0.0);
        assert_eq!(clamp_temperature(Some(&json!("1.2"))), 1.2);
        assert_eq!(clamp_temperature(Some(&json!(0))), 0.0);
        for raw in [json!(-1e9), json!(1e9), json!("abc"), json!(1.5)]
        {   let t = clamp_temperature(Some(&raw));
            assert!((0.0..=2.0).contains(&t));
        }
    }

    #[test]
    fn missing_or_non_string_prompt_is_rejected()
    {   for body in [json!({}), json!({"prompt": ""}),
                     json!({"prompt": 42}), json!({"prompt": null}),
                     json!(null), json!("prompt")]
        {   assert_eq!(
              validate(&body)
            , Err(crate::error::Error::MissingPrompt)
            );
        }
    }

    #[test]
    fn model_passes_through_verbatim()
    {   let (prompt, config) = validate(&json!({
          "prompt": "Hello"
        , "model": "gemini-2.0-pro"
        , "temperature": "0.4"
        })).unwrap();
        assert_eq!(prompt.as_str(), "Hello");
        assert_eq!(config.model.as_deref(), Some("gemini-2.0-pro"));
        assert_eq!(config.temperature, 0.4);

        let (_, config) = validate(&json!({
          "prompt": "Hello", "model": ""
        })).unwrap();
        assert_eq!(config.model, None);
        assert_eq!(config.temperature, DEFAULT_TEMPERATURE);
    }

    #[test]
    fn non_json_body_counts_as_missing_prompt()
    {   assert_eq!(
          validate_bytes(b"prompt=hello")
        , Err(crate::error::Error::MissingPrompt)
        );
    }

    #[test]
    fn outcome_serializes_without_empty_fields()
    {   let ok = serde_json::to_value(
          UnifiedOutcome::success("Diagnosis: A")
        ).unwrap();
        assert_eq!(ok, json!({"ok": true, "text": "Diagnosis: A"}));

        let failed = serde_json::to_value(
          UnifiedOutcome::failure(&crate::error::Error::MissingPrompt)
        ).unwrap();
        assert_eq!(failed, json!({"ok": false, "error": "prompt が必要です。"}));
    }
}
