use std::fmt;

/// Fixed apology shown when every configured provider gave up.
pub const APOLOGY_MESSAGE: &str
  = "申し訳ありません。現在、利用可能なAI（Gemini / OpenAI）がいずれも\
     高負荷またはエラーのため診断結果を生成できませんでした。\
     時間をおいてもう一度お試しください。";

/// Custom error type for dxrelay operations
/// Implements Clone so it can travel through reply channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error
{   /// Prompt absent, not a string, or empty
    MissingPrompt
  , /// Record submission body was not a JSON object
    InvalidRecordBody
  , /// Server credential missing for a provider
    MissingApiKey(crate::Provider)
  , /// Primary (and secondary, if tried) exhausted their retries.
    /// Carries the last failure message only.
    ProvidersExhausted(String)
  , /// Record store read/write failure
    Persistence(String)
  , /// HTTP client construction error
    HttpError(String)
  , /// Invalid configuration
    InvalidConfiguration(String)
  , /// Record store task is gone
    StoreDisconnected
  , /// Generic error
    Other(String)
}

impl Error
{   /// HTTP status used when this error reaches the inbound surface
    pub fn status_code(&self) -> u16
    {   match self
        {   Error::MissingPrompt
          | Error::InvalidRecordBody => 400
          , Error::ProvidersExhausted(_) => 502
          , _ => 500
        }
    }
}

impl fmt::Display for Error
{   fn fmt(&self, f: &mut fmt::Formatter<'_>)
      -> fmt::Result
    {   match self
        {   Error::MissingPrompt => {
              write!(f, "prompt が必要です。")
            }
          , Error::InvalidRecordBody => {
              write!(f, "body が必要です。")
            }
          , Error::MissingApiKey(provider) => {
              write!(f,
                "サーバーに {} が設定されていません。\
                 環境変数で設定してください。",
                provider.credential_var()
              )
            }
          , Error::ProvidersExhausted(detail) => {
              write!(f, "{}（詳細: {}）", APOLOGY_MESSAGE, detail)
            }
          , Error::Persistence(msg) => {
              write!(f, "保存に失敗しました: {}", msg)
            }
          , Error::HttpError(msg) => {
              write!(f, "HTTP error: {}", msg)
            }
          , Error::InvalidConfiguration(msg) => {
              write!(f, "Invalid configuration: {}", msg)
            }
          , Error::StoreDisconnected => {
              write!(f, "保存に失敗しました: record store disconnected")
            }
          , Error::Other(msg) => {
              write!(f, "Error: {}", msg)
            }
        }
    }
}

impl std::error::Error for Error {}
