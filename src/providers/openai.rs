use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use log::{debug, error, trace};

/// Output cap sent with every OpenAI request
pub const OPENAI_MAX_TOKENS: u32 = 1024;

// ===== Message Types =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage
{   pub role: String
  , pub content: String
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiChatRequest
{   pub model: String
  , pub messages: Vec<ChatMessage>
  , pub temperature: f32
  , pub max_tokens: u32
}

impl OpenAiChatRequest
{   pub fn new(
      prompt: &crate::request::Prompt
    , config: &crate::request::GenerationConfig
    , model: &str
    ) -> Self
    {   OpenAiChatRequest
        {   model: model.to_string()
          , messages: vec![
              ChatMessage
              {   role: "user".to_string()
                , content: prompt.as_str().to_string()
              }
            ]
          , temperature: config.temperature
          , max_tokens: OPENAI_MAX_TOKENS
        }
    }
}

/// `choices[0].message.content`
pub fn extract_text(body: &Value) -> Option<&str>
{   body.get("choices")?
      .get(0)?
      .get("message")?
      .get("content")?
      .as_str()
}

// ===== OpenAI Client =====

/// OpenAI chat completions client
pub struct OpenAiClient
{   config: crate::config::ProviderConfig
  , http_client: reqwest::Client
}

impl OpenAiClient
{   pub fn new(config: crate::config::ProviderConfig)
      -> Result<Self, crate::error::Error>
    {   debug!("Creating OpenAiClient");
        let http_client
          = super::build_http_client(config.timeout_secs())?;
        Ok(OpenAiClient
        {   config
          , http_client
        })
    }
}

#[async_trait]
impl super::ProviderClient for OpenAiClient
{   fn provider(&self) -> crate::Provider
    {   crate::Provider::OpenAi
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
        {   error!("No API key for OpenAI");
            return super::ProviderOutcome::terminal(
              crate::error::Error::MissingApiKey(
                crate::Provider::OpenAi
              ).to_string()
            );
        };

        let model = config.model.as_deref()
          .unwrap_or_else(|| self.config.default_model());
        debug!("Invoking OpenAI model: {}", model);

        let request = OpenAiChatRequest::new(prompt, config, model);
        trace!(
          "OpenAI request: model={} temperature={} max_tokens={}",
          request.model, request.temperature, request.max_tokens
        );

        let response = self.http_client
          .post(format!("{}/chat/completions", self.config.api_base()))
          .bearer_auth(api_key)
          .json(&request)
          .send()
          .await;

        match response
        {   Ok(response) => {
              super::read_outcome(
                crate::Provider::OpenAi
              , response
              , extract_text
              ).await
            }
          , Err(e) => {
              let e = e.without_url();
              error!("OpenAI HTTP error: {}", e);
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
        let config = crate::request::GenerationConfig::default();
        let payload = serde_json::to_value(
          OpenAiChatRequest::new(&prompt, &config, "gpt-4o")
        ).unwrap();
        assert_eq!(payload["model"], "gpt-4o");
        assert_eq!(payload["max_tokens"], 1024);
        assert_eq!(
          payload["messages"]
        , json!([{"role": "user", "content": "Hello"}])
        );
    }

    #[tokio::test]
    async fn transport_error_omits_request_url()
    {   use crate::providers::ProviderClient;
        let client = OpenAiClient::new(
          crate::config::ProviderConfig::new(crate::Provider::OpenAi)
            .with_api_key("sk-test")
            .with_api_base("http://127.0.0.1:1/v1")
        ).unwrap();
        let prompt = crate::request::Prompt::new("Hello").unwrap();

        let outcome = client
          .invoke(&prompt, &crate::request::GenerationConfig::default())
          .await;

        assert!(outcome.is_retriable());
        let message = outcome.failure_message().unwrap();
        assert!(message.starts_with(crate::providers::TRANSPORT_ERROR_PREFIX));
        assert!(!message.contains("127.0.0.1:1"));
        assert!(!message.contains("sk-test"));
    }

    #[test]
    fn extracts_first_choice_content()
    {   let body = json!({
          "choices": [
            {"message": {"role": "assistant", "content": "Diagnosis: A"}}
          ]
        });
        assert_eq!(extract_text(&body), Some("Diagnosis: A"));
        assert_eq!(
          extract_text(&json!({"choices": [{"message": {"content": null}}]}))
        , None
        );
    }
}
