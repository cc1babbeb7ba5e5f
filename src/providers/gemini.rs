use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use log::{debug, error, trace};

/// Output cap sent with every Gemini request
pub const GEMINI_MAX_OUTPUT_TOKENS: u32 = 2048;

// ===== Message Types =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part
{   pub text: String
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content
{   pub parts: Vec<Part>
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiGenerationConfig
{   pub max_output_tokens: u32
  , pub temperature: f32
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest
{   pub contents: Vec<Content>
  , pub generation_config: GeminiGenerationConfig
}

impl GeminiRequest
{   pub fn new(
      prompt: &crate::request::Prompt
    , config: &crate::request::GenerationConfig
    ) -> Self
    {   GeminiRequest
        {   contents: vec![
              Content
              {   parts: vec![
                    Part { text: prompt.as_str().to_string() }
                  ]
              }
            ]
          , generation_config: GeminiGenerationConfig
            {   max_output_tokens: GEMINI_MAX_OUTPUT_TOKENS
              , temperature: config.temperature
            }
        }
    }
}

/// `candidates[0].content.parts[0].text`
pub fn extract_text(body: &Value) -> Option<&str>
{   body.get("candidates")?
      .get(0)?
      .get("content")?
      .get("parts")?
      .get(0)?
      .get("text")?
      .as_str()
}

// ===== Gemini Client =====

/// Gemini `generateContent` client
pub struct GeminiClient
{   config: crate::config::ProviderConfig
  , http_client: reqwest::Client
}

impl GeminiClient
{   pub fn new(config: crate::config::ProviderConfig)
      -> Result<Self, crate::error::Error>
    {   debug!("Creating GeminiClient");
        let http_client
          = super::build_http_client(config.timeout_secs())?;
        Ok(GeminiClient
        {   config
          , http_client
        })
    }

    fn endpoint(&self, model: &str) -> String
    {   format!(
          "{}/models/{}:generateContent"
        , self.config.api_base()
        , model
        )
    }
}

#[async_trait]
impl super::ProviderClient for GeminiClient
{   fn provider(&self) -> crate::Provider
    {   crate::Provider::Gemini
    }

    fn has_credential(&self) -> bool
    {   self.config.credential().is_some()
    }

    async fn invoke(
      &self
    , prompt: &crate::request::Prompt
    , config: &crate::request::GenerationConfig
    ) -> super::ProviderOutcome
    {   let Some(api_key) = self.config.credential()
        else
        {   error!("No API key for Gemini");
            return super::ProviderOutcome::terminal(
              crate::error::Error::MissingApiKey(
                crate::Provider::Gemini
              ).to_string()
            );
        };

        let model = config.model.as_deref()
          .unwrap_or_else(|| self.config.default_model());
        debug!("Invoking Gemini model: {}", model);

        let request = GeminiRequest::new(prompt, config);
        trace!("Gemini generation config: {:?}", request.generation_config);

        let response = self.http_client
          .post(self.endpoint(model))
          .query(&[("key", api_key)])
          .json(&request)
          .send()
          .await;

        match response
        {   Ok(response) => {
              super::read_outcome(
                crate::Provider::Gemini
              , response
              , extract_text
              ).await
            }
          , Err(e) => {
              // the request URL carries the key
              let e = e.without_url();
              error!("Gemini HTTP error: {}", e);
              super::ProviderOutcome::transport(e)
            }
        }
    }
}

#[cfg(test)]
mod tests
{   use super::*;
    use serde_json::json;

    #[test]
    fn request_payload_shape()
    {   let prompt = crate::request::Prompt::new("Hello").unwrap();
        let config = crate::request::GenerationConfig
        {   temperature: 0.5
          , model: None
        };
        let payload = serde_json::to_value(
          GeminiRequest::new(&prompt, &config)
        ).unwrap();
        assert_eq!(payload, json!({
          "contents": [{"parts": [{"text": "Hello"}]}]
        , "generationConfig": {
            "maxOutputTokens": 2048
          , "temperature": 0.5
          }
        }));
    }

    #[test]
    fn extracts_first_candidate_text()
    {   let body = json!({
          "candidates": [
            {"content": {"parts": [{"text": "first"}, {"text": "second"}]}}
          , {"content": {"parts": [{"text": "other"}]}}
          ]
        });
        assert_eq!(extract_text(&body), Some("first"));
        assert_eq!(extract_text(&json!({"candidates": []})), None);
        assert_eq!(extract_text(&json!({"promptFeedback": {}})), None);
    }

    #[test]
    fn endpoint_uses_configured_base()
    {   let client = GeminiClient::new(
          crate::config::ProviderConfig::new(crate::Provider::Gemini)
            .with_api_base("http://127.0.0.1:9/v1beta")
        ).unwrap();
        assert_eq!(
          client.endpoint("gemini-2.5-flash-lite")
        , "http://127.0.0.1:9/v1beta/models/gemini-2.5-flash-lite:generateContent"
        );
    }
}
