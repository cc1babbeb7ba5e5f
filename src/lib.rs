pub mod error;
pub mod config;
pub mod providers;
pub mod request;
pub mod failover;
pub mod records;
pub mod store;
pub mod server;
use serde::{Deserialize, Serialize};

/*

dxrelay: forwards a diagnosis prompt to one of two text-generation
providers (Gemini / OpenAI), retrying and falling back to the other
provider when one is degraded, and accumulates submitted diagnostic
records into an append-only JSON store.

src/
├── lib.rs          # Re-exports, provider enum, store channel types
├── error.rs        # Error taxonomy and caller-facing messages
├── config.rs       # Server / provider / failover configuration
├── request.rs      # Inbound validation, unified outcome
├── providers/      # One client per provider
│   ├── mod.rs      # ProviderClient trait, outcome classification
│   ├── gemini.rs
│   └── openai.rs
├── failover.rs     # RetryPolicy and FallbackOrchestrator
├── records.rs      # Diagnostic record normalization
├── store.rs        # Single-owner JSON record store task
└── server.rs       # axum routes

*/

/// DXRELAY API INTERFACE (record store):

// ===== AppendRecord =====

pub type AppendRecordReply = Result<usize, crate::error::Error>;
pub type AppendRecordReplySender
  = tokio::sync::mpsc::UnboundedSender<AppendRecordReply>;

pub struct AppendRecordArgs
{   pub record: crate::records::DiagnosticRecord
  , pub reply: AppendRecordReplySender
}

// ===== ListRecords =====

/// Stored entries exactly as they sit in the file
pub type ListRecordsReply
  = Result<Vec<serde_json::Value>, crate::error::Error>;
pub type ListRecordsReplySender
  = tokio::sync::mpsc::UnboundedSender<ListRecordsReply>;

pub struct ListRecordsArgs
{   pub reply: ListRecordsReplySender
}

// ===== KillProcess =====

pub type KillProcessReply = Result<(), crate::error::Error>;
pub type KillProcessReplySender
  = tokio::sync::mpsc::UnboundedSender<KillProcessReply>;

pub struct KillProcessArgs
{   pub reply: KillProcessReplySender
}

// ===== StoreHand (sender side) =====

#[derive(Clone)]
pub struct StoreHand
{   pub append_record_tx
      : tokio::sync::mpsc::UnboundedSender<AppendRecordArgs>
  , pub list_records_tx
      : tokio::sync::mpsc::UnboundedSender<ListRecordsArgs>
  , pub kill_process_tx
      : tokio::sync::mpsc::UnboundedSender<KillProcessArgs>
}

// ===== StoreFoot (receiver side) =====

pub struct StoreFoot
{   pub append_record_rx
      : tokio::sync::mpsc::UnboundedReceiver<AppendRecordArgs>
  , pub list_records_rx
      : tokio::sync::mpsc::UnboundedReceiver<ListRecordsArgs>
  , pub kill_process_rx
      : tokio::sync::mpsc::UnboundedReceiver<KillProcessArgs>
}

/// DXRELAY STRUCTURES:

/// The two interchangeable text-generation providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Hash)]
pub enum Provider
{
  /// Google AI Studio (Gemini models), key in query string
  Gemini
  ,
  /// OpenAI chat completions, bearer token
  OpenAi
}

impl Provider
{   /// Environment variable that carries this provider's credential
    pub fn credential_var(&self) -> &'static str
    {   match self
        {   Provider::Gemini => "GEMINI_API_KEY"
          , Provider::OpenAi => "OPENAI_API_KEY"
        }
    }

    /// The provider used as fallback when this one is primary
    pub fn other(&self) -> Provider
    {   match self
        {   Provider::Gemini => Provider::OpenAi
          , Provider::OpenAi => Provider::Gemini
        }
    }
}

impl std::fmt::Display for Provider
{   fn fmt(&self, f: &mut std::fmt::Formatter<'_>)
      -> std::fmt::Result
    {   match self
        {   Provider::Gemini => write!(f, "Gemini")
          , Provider::OpenAi => write!(f, "OpenAI")
        }
    }
}

pub use error::Error;
pub use failover::{FallbackOrchestrator, RetryPolicy};
pub use providers::{ProviderClient, ProviderOutcome, FailureClass};
pub use request::{GenerationConfig, Prompt, UnifiedOutcome};
pub use store::RecordStore;
