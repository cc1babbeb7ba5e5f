//! Configuration for dxrelay providers, failover and the HTTP server

use std::path::{Component, Path, PathBuf};
use serde::{Deserialize, Serialize};
use log::debug;

pub const GEMINI_API_BASE: &str
  = "https://generativelanguage.googleapis.com/v1beta";
pub const OPENAI_API_BASE: &str
  = "https://api.openai.com/v1";
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Provider configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig
{   /// Which provider this configures
    pub provider: crate::Provider
  , /// Server-side credential; never serialized back out
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>
  , /// API base URL (if custom)
    pub api_base: Option<String>
  , /// Model used when the request names none
    pub model: Option<String>
  , /// Request timeout in seconds
    pub timeout_secs: Option<u64>
}

impl ProviderConfig
{   pub fn new(provider: crate::Provider) -> Self
    {   ProviderConfig
        {   provider
          , api_key: None
          , api_base: None
          , model: None
          , timeout_secs: None
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self
    {   self.api_key = Some(key.into());
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self
    {   self.api_base = Some(base.into());
        self
    }

    /// Trimmed credential, `None` when absent or blank
    pub fn credential(&self) -> Option<&str>
    {   self.api_key
          .as_deref()
          .map(str::trim)
          .filter(|k| !k.is_empty())
    }

    pub fn api_base(&self) -> &str
    {   match (&self.api_base, self.provider)
        {   (Some(base), _) => base.trim_end_matches('/')
          , (None, crate::Provider::Gemini) => GEMINI_API_BASE
          , (None, crate::Provider::OpenAi) => OPENAI_API_BASE
        }
    }

    pub fn default_model(&self) -> &str
    {   match (&self.model, self.provider)
        {   (Some(model), _) if !model.is_empty() => model.as_str()
          , (_, crate::Provider::Gemini) => GEMINI_DEFAULT_MODEL
          , (_, crate::Provider::OpenAi) => OPENAI_DEFAULT_MODEL
        }
    }

    pub fn timeout_secs(&self) -> u64
    {   self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }
}

impl std::fmt::Debug for ProviderConfig
{   fn fmt(&self, f: &mut std::fmt::Formatter<'_>)
      -> std::fmt::Result
    {   f.debug_struct("ProviderConfig")
          .field("provider", &self.provider)
          .field("api_key", &self.credential().map(|_| "<redacted>"))
          .field("api_base", &self.api_base)
          .field("model", &self.model)
          .field("timeout_secs", &self.timeout_secs)
          .finish()
    }
}

/// Failover configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverConfig
{   /// Fall back to the other provider once the primary is exhausted
    pub enabled: bool
  , /// Retries after the first attempt, per provider
    pub max_retries: usize
  , /// Backoff base in milliseconds; attempt n waits base * (n + 1)
    pub backoff_base_ms: u64
}

impl Default for FailoverConfig
{   fn default() -> Self
    {   FailoverConfig
        {   enabled: true
          , max_retries: 2
          , backoff_base_ms: 800
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig
{   pub port: u16
  , /// Directory holding diagnostic-results.json
    pub data_dir: PathBuf
  , /// Directory served as static assets
    pub static_dir: PathBuf
  , /// File under static_dir served at `/`
    pub index_file: String
}

impl Default for ServerConfig
{   fn default() -> Self
    {   ServerConfig
        {   port: 3000
          , data_dir: PathBuf::from("data")
          , static_dir: PathBuf::from("public")
          , index_file: "xnative_cfr_r050.html".to_string()
        }
    }
}

impl ServerConfig
{   /// Refuse a data dir inside the static dir; the record file would
    /// be downloadable through the static fallback.
    pub fn check_layout(&self) -> Result<(), crate::error::Error>
    {   let data_dir = lexical_absolute(&self.data_dir);
        let static_dir = lexical_absolute(&self.static_dir);
        if data_dir.starts_with(&static_dir)
        {   return Err(crate::error::Error::InvalidConfiguration(format!(
              "DATA_DIR {} lies inside STATIC_DIR {}",
              self.data_dir.display(),
              self.static_dir.display()
            )));
        }
        Ok(())
    }
}

/// Absolute form of `path` with `.` and `..` resolved without touching
/// the filesystem.
fn lexical_absolute(path: &Path) -> PathBuf
{   let joined = if path.is_absolute()
    {   path.to_path_buf()
    } else
    {   std::env::current_dir().unwrap_or_default().join(path)
    };
    let mut resolved = PathBuf::new();
    for component in joined.components()
    {   match component
        {   Component::CurDir => {}
          , Component::ParentDir => {
              resolved.pop();
            }
          , other => resolved.push(other)
        }
    }
    resolved
}

/// DXRELAY configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DxConfig
{   pub server: ServerConfig
  , pub gemini: ProviderConfig
  , pub openai: ProviderConfig
  , pub failover: FailoverConfig
}

impl Default for DxConfig
{   fn default() -> Self
    {   DxConfig
        {   server: ServerConfig::default()
          , gemini: ProviderConfig::new(crate::Provider::Gemini)
          , openai: ProviderConfig::new(crate::Provider::OpenAi)
          , failover: FailoverConfig::default()
        }
    }
}

impl DxConfig
{   /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, crate::error::Error>
    {   Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from any variable lookup.
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F)
      -> Result<Self, crate::error::Error>
    where
      F: Fn(&str) -> Option<String>
    {   let var = |name: &str| {
          lookup(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
        };
        let mut config = DxConfig::default();

        if let Some(port) = var("PORT")
        {   config.server.port = port.parse().map_err(|_| {
              crate::error::Error::InvalidConfiguration(
                format!("PORT is not a port number: {}", port)
              )
            })?;
        }
        if let Some(dir) = var("DATA_DIR")
        {   config.server.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("STATIC_DIR")
        {   config.server.static_dir = PathBuf::from(dir);
        }
        if let Some(file) = var("INDEX_FILE")
        {   config.server.index_file = file;
        }

        let timeout_secs = match var("PROVIDER_TIMEOUT_SECS")
        {   Some(secs) => Some(secs.parse().map_err(|_| {
              crate::error::Error::InvalidConfiguration(format!(
                "PROVIDER_TIMEOUT_SECS is not a number: {}", secs
              ))
            })?)
          , None => None
        };

        config.gemini.api_key = var("GEMINI_API_KEY");
        config.gemini.model = var("GEMINI_MODEL");
        config.gemini.api_base = var("GEMINI_API_BASE");
        config.gemini.timeout_secs = timeout_secs;

        config.openai.api_key = var("OPENAI_API_KEY");
        config.openai.model = var("OPENAI_MODEL");
        config.openai.api_base = var("OPENAI_API_BASE");
        config.openai.timeout_secs = timeout_secs;

        if let Some(flag) = var("FALLBACK_ENABLED")
        {   config.failover.enabled = !matches!(
              flag.to_ascii_lowercase().as_str()
            , "0" | "false" | "no" | "off"
            );
        }

        config.server.check_layout()?;
        debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    pub fn provider(&self, provider: crate::Provider) -> &ProviderConfig
    {   match provider
        {   crate::Provider::Gemini => &self.gemini
          , crate::Provider::OpenAi => &self.openai
        }
    }
}

#[cfg(test)]
mod tests
{   use super::*;
    use std::collections::HashMap;

    fn lookup_from(
      pairs: &[(&str, &str)]
    ) -> impl Fn(&str) -> Option<String>
    {   let map: HashMap<String, String> = pairs
          .iter()
          .map(|(k, v)| (k.to_string(), v.to_string()))
          .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_without_environment()
    {   let config = DxConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.data_dir, PathBuf::from("data"));
        assert_eq!(config.server.static_dir, PathBuf::from("public"));
        assert!(config.gemini.credential().is_none());
        assert!(config.openai.credential().is_none());
        assert_eq!(config.gemini.default_model(), GEMINI_DEFAULT_MODEL);
        assert_eq!(config.openai.default_model(), OPENAI_DEFAULT_MODEL);
        assert!(config.failover.enabled);
        assert_eq!(config.failover.max_retries, 2);
        assert_eq!(config.failover.backoff_base_ms, 800);
    }

    #[test]
    fn reads_credentials_and_overrides()
    {   let config = DxConfig::from_lookup(lookup_from(&[
          ("PORT", "8080")
        , ("GEMINI_API_KEY", "  g-key  ")
        , ("OPENAI_API_KEY", "   ")
        , ("OPENAI_MODEL", "gpt-4o-mini")
        , ("FALLBACK_ENABLED", "false")
        ])).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.gemini.credential(), Some("g-key"));
        assert!(config.openai.credential().is_none());
        assert_eq!(config.openai.default_model(), "gpt-4o-mini");
        assert!(!config.failover.enabled);
    }

    #[test]
    fn rejects_bad_port()
    {   let result = DxConfig::from_lookup(lookup_from(&[
          ("PORT", "eighty")
        ]));
        assert!(matches!(
          result
        , Err(crate::error::Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn data_dir_inside_static_dir_is_rejected()
    {   for (data, assets) in [
          ("data", ".")
        , ("./public/data", "public")
        , ("/srv/site/data", "/srv/site")
        , ("/srv/other/../site/results", "/srv/site/")
        ]
        {   let result = DxConfig::from_lookup(lookup_from(&[
              ("DATA_DIR", data)
            , ("STATIC_DIR", assets)
            ]));
            assert!(
              matches!(
                result
              , Err(crate::error::Error::InvalidConfiguration(_))
              )
            , "{} under {}", data, assets
            );
        }

        let config = DxConfig::from_lookup(lookup_from(&[
          ("DATA_DIR", "/srv/data")
        , ("STATIC_DIR", "/srv/site")
        ])).unwrap();
        assert!(config.server.check_layout().is_ok());
    }

    #[test]
    fn debug_output_redacts_key()
    {   let config = ProviderConfig::new(crate::Provider::OpenAi)
          .with_api_key("sk-secret");
        let printed = format!("{:?}", config);
        assert!(!printed.contains("sk-secret"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn custom_base_drops_trailing_slash()
    {   let config = ProviderConfig::new(crate::Provider::Gemini)
          .with_api_base("http://127.0.0.1:9000/");
        assert_eq!(config.api_base(), "http://127.0.0.1:9000");
    }
}
