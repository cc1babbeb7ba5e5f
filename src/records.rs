//! Diagnostic record normalization
//!
//! Submissions come from a browser form and are reshaped into a fixed
//! schema before they reach the store. Missing or oddly-typed fields
//! fall back to empty values instead of failing the submission.

use std::path::Path;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use log::trace;

/// One event the user ticked on the timeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Selection
{   /// Kept verbatim (number or string), null when absent
    pub year: Value
  , pub label: String
  , pub genre_codes: Vec<String>
}

/// Normalized diagnostic submission, as persisted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiagnosticRecord
{   /// Submitted value when truthy, otherwise the ISO time of receipt
    pub timestamp: Value
  , pub gender: String
  , /// Kept verbatim, null when absent
    pub birth_year: Value
  , pub nickname: String
  , pub owner: String
  , pub repo: String
  , /// Path of the timeline JSON the user diagnosed against
    pub file_path: String
  , /// Final component of `file_path`
    pub timeline_file_name: String
  , pub selections: Vec<Selection>
  , pub selected_genres: Vec<String>
}

impl DiagnosticRecord
{   /// Normalize a raw submission. Only a JSON object is accepted.
    pub fn normalize(raw: &Value)
      -> Result<Self, crate::error::Error>
    {   let Value::Object(_) = raw
        else
        {   return Err(crate::error::Error::InvalidRecordBody);
        };
        Ok(Self::normalize_at(raw, &now_iso8601()))
    }

    /// Normalize with an explicit fallback timestamp
    pub fn normalize_at(raw: &Value, now: &str) -> Self
    {   let file_path = text_field(raw, "filePath");
        let timeline_file_name = Path::new(&file_path)
          .file_name()
          .map(|name| name.to_string_lossy().into_owned())
          .unwrap_or_default();

        let selections = match raw.get("selections")
        {   Some(Value::Array(items)) => {
              items.iter().map(Selection::normalize).collect()
            }
          , _ => vec![]
        };

        let timestamp = match raw.get("timestamp")
        {   Some(value) if is_truthy(value) => value.clone()
          , _ => Value::String(now.to_string())
        };

        trace!(
          "Normalized record with {} selections",
          selections.len()
        );
        DiagnosticRecord
        {   timestamp
          , gender: text_field(raw, "gender")
          , birth_year: verbatim_field(raw, "birthYear")
          , nickname: text_field(raw, "nickname")
          , owner: text_field(raw, "owner")
          , repo: text_field(raw, "repo")
          , file_path
          , timeline_file_name
          , selections
          , selected_genres: string_list(raw.get("selectedGenres"))
        }
    }
}

impl Selection
{   fn normalize(raw: &Value) -> Self
    {   let genre_codes = match raw.get("genre")
        {   Some(Value::Array(_)) => string_list(raw.get("genre"))
          , None | Some(Value::Null) => vec![]
          , Some(Value::String(s)) if s.is_empty() => vec![]
          , Some(single) => vec![stringify(single)]
        };
        Selection
        {   year: verbatim_field(raw, "year")
          , label: text_field(raw, "label")
          , genre_codes
        }
    }
}

/// Current UTC time, millisecond precision, `Z` suffix
pub fn now_iso8601() -> String
{   chrono::Utc::now()
      .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Scalars become their plain text; compound values their JSON text.
fn stringify(value: &Value) -> String
{   match value
    {   Value::String(s) => s.clone()
      , other => other.to_string()
    }
}

/// `false`, `0`, `""` and `null` are falsy; everything else is kept
fn is_truthy(value: &Value) -> bool
{   match value
    {   Value::Null => false
      , Value::Bool(b) => *b
      , Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0)
      , Value::String(s) => !s.is_empty()
      , Value::Array(_) | Value::Object(_) => true
    }
}

fn text_field(raw: &Value, key: &str) -> String
{   match raw.get(key)
    {   None | Some(Value::Null) => String::new()
      , Some(value) => stringify(value)
    }
}

fn verbatim_field(raw: &Value, key: &str) -> Value
{   raw.get(key).cloned().unwrap_or(Value::Null)
}

fn string_list(value: Option<&Value>) -> Vec<String>
{   match value
    {   Some(Value::Array(items)) => items.iter().map(stringify).collect()
      , _ => vec![]
    }
}
