use std::path::{Path, PathBuf};
use serde_json::Value;
use tokio::sync::mpsc;
use log::{debug, trace, error, info, warn};
use crate::records::DiagnosticRecord;
use crate::StoreFoot;

/// File name of the record list inside the data directory
pub const RESULTS_FILE_NAME: &str = "diagnostic-results.json";

/// Owns the record file. Only the store task touches it, so an append
/// is a single read-modify-write with no interleaving.
pub struct RecordStoreState
{   data_dir: PathBuf
  , path: PathBuf
}

impl RecordStoreState
{   pub fn new(data_dir: impl Into<PathBuf>) -> Self
    {   let data_dir = data_dir.into();
        let path = data_dir.join(RESULTS_FILE_NAME);
        debug!("Creating RecordStoreState at {}", path.display());
        RecordStoreState
        {   data_dir
          , path
        }
    }

    pub fn path(&self) -> &Path
    {   &self.path
    }

    async fn ensure_data_dir(&self) -> Result<(), crate::error::Error>
    {   tokio::fs::create_dir_all(&self.data_dir)
          .await
          .map_err(|e| {
            error!(
              "Cannot create data dir {}: {}",
              self.data_dir.display(), e
            );
            crate::error::Error::Persistence(e.to_string())
          })
    }

    /// Stored entries as raw JSON. A missing, unreadable or non-array
    /// file reads as an empty list.
    async fn read_entries(&self)
      -> Result<Vec<Value>, crate::error::Error>
    {   self.ensure_data_dir().await?;
        let raw = match tokio::fs::read_to_string(&self.path).await
        {   Ok(raw) => raw
          , Err(e) => {
              trace!("No readable record file ({}), starting empty", e);
              return Ok(vec![]);
            }
        };
        match serde_json::from_str::<Value>(&raw)
        {   Ok(Value::Array(entries)) => Ok(entries)
          , _ => {
              warn!(
                "{} is not a JSON list, treating as empty",
                self.path.display()
              );
              Ok(vec![])
            }
        }
    }

    async fn write_entries(&self, entries: &[Value])
      -> Result<(), crate::error::Error>
    {   self.ensure_data_dir().await?;
        let text = serde_json::to_string_pretty(entries)
          .map_err(|e| crate::error::Error::Persistence(e.to_string()))?;

        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, text)
          .await
          .map_err(|e| {
            error!("Write to {} failed: {}", staging.display(), e);
            crate::error::Error::Persistence(e.to_string())
          })?;
        tokio::fs::rename(&staging, &self.path)
          .await
          .map_err(|e| {
            error!("Rename to {} failed: {}", self.path.display(), e);
            crate::error::Error::Persistence(e.to_string())
          })
    }

    async fn handle_append(
      &self
    , record: DiagnosticRecord
    ) -> Result<usize, crate::error::Error>
    {   let mut entries = self.read_entries().await?;
        let entry = serde_json::to_value(&record)
          .map_err(|e| crate::error::Error::Persistence(e.to_string()))?;
        entries.push(entry);
        self.write_entries(&entries).await?;
        debug!("Stored record #{}", entries.len());
        Ok(entries.len())
    }

    async fn handle_list(&self)
      -> Result<Vec<Value>, crate::error::Error>
    {   let entries = self.read_entries().await?;
        debug!("Listed {} records", entries.len());
        Ok(entries)
    }
}

/// Public API for the record store - owns the task
pub struct RecordStore
{   hand: crate::StoreHand
  , _task_handle: tokio::task::JoinHandle<()>
}

impl RecordStore
{   /// Create and spawn a record store over `data_dir`.
    /// Must be called inside a tokio runtime.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self
    {   let state = RecordStoreState::new(data_dir);
        debug!("Creating RecordStore with task ownership");

        let (append_record_tx, append_record_rx)
          = mpsc::unbounded_channel();
        let (list_records_tx, list_records_rx)
          = mpsc::unbounded_channel();
        let (kill_process_tx, kill_process_rx)
          = mpsc::unbounded_channel();

        let hand = crate::StoreHand
        {   append_record_tx
          , list_records_tx
          , kill_process_tx
        };

        let foot = crate::StoreFoot
        {   append_record_rx
          , list_records_rx
          , kill_process_rx
        };

        let _task_handle = tokio::spawn(async move {
          run_store_loop(foot, state).await
        });

        RecordStore
        {   hand
          , _task_handle
        }
    }

    /// Cloneable sender side, for handing to other tasks
    pub fn hand(&self) -> crate::StoreHand
    {   self.hand.clone()
    }

    /// Append an already-normalized record; returns the new count
    pub async fn append_record(
      &self
    , record: DiagnosticRecord
    ) -> Result<usize, crate::error::Error>
    {   let (reply_tx, mut reply_rx)
          = mpsc::unbounded_channel();

        self.hand.append_record_tx
          .send(crate::AppendRecordArgs
          {   record
            , reply: reply_tx
          })
          .map_err(|_| {
            error!("Store channel closed");
            crate::error::Error::StoreDisconnected
          })?;

        reply_rx.recv()
          .await
          .unwrap_or(Err(crate::error::Error::StoreDisconnected))
    }

    /// All stored entries in insertion order, verbatim
    pub async fn list_records(
      &self
    ) -> Result<Vec<Value>, crate::error::Error>
    {   let (reply_tx, mut reply_rx)
          = mpsc::unbounded_channel();

        self.hand.list_records_tx
          .send(crate::ListRecordsArgs
          {   reply: reply_tx
          })
          .map_err(|_| {
            error!("Store channel closed");
            crate::error::Error::StoreDisconnected
          })?;

        reply_rx.recv()
          .await
          .unwrap_or(Err(crate::error::Error::StoreDisconnected))
    }

    /// Gracefully shutdown the store
    pub async fn shutdown(self)
      -> Result<(), crate::error::Error>
    {   debug!("Shutting down RecordStore");
        let (reply_tx, mut reply_rx)
          = mpsc::unbounded_channel();

        self.hand.kill_process_tx
          .send(crate::KillProcessArgs
          {   reply: reply_tx
          })
          .map_err(|_| {
            error!("Store channel already closed");
            crate::error::Error::StoreDisconnected
          })?;

        if let Some(result) = reply_rx.recv().await
        {   debug!("Store shutdown confirmed");
            result
        } else
        {   error!("Store shutdown not confirmed");
            Err(crate::error::Error::StoreDisconnected)
        }
    }
}

/// Store event loop. Commands are served one at a time, in arrival
/// order per channel.
async fn run_store_loop(
  foot: StoreFoot
, state: RecordStoreState
)
{   debug!("Starting RecordStore loop at {}", state.path().display());
    let StoreFoot
    {   mut append_record_rx
      , mut list_records_rx
      , mut kill_process_rx
    } = foot;

    loop
    { tokio::select!
      { Some(cmd) = append_record_rx.recv() => {
          trace!("Received AppendRecord");
          let result = state.handle_append(cmd.record).await;
          let _ = cmd.reply.send(result);
        }
      , Some(cmd) = list_records_rx.recv() => {
          trace!("Received ListRecords");
          let result = state.handle_list().await;
          let _ = cmd.reply.send(result);
        }
      , Some(cmd) = kill_process_rx.recv() => {
          debug!("Received KillProcess");
          let _ = cmd.reply.send(Ok(()));
          info!("RecordStore shutting down");
          break;
        }
      , else => {
          debug!("All store channels closed");
          break;
        }
      }
    }
}

#[cfg(test)]
mod tests
{   use super::*;
    use serde_json::json;

    fn record(nickname: &str) -> DiagnosticRecord
    {   DiagnosticRecord::normalize_at(
          &json!({"nickname": nickname, "birthYear": 1975})
        , "2026-01-01T00:00:00.000Z"
        )
    }

    #[tokio::test]
    async fn appends_preserve_insertion_order()
    {   let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("nested/data"));

        for (i, name) in ["a", "b", "c", "d"].iter().enumerate()
        {   let count = store.append_record(record(name)).await.unwrap();
            assert_eq!(count, i + 1);
        }

        let listed = store.list_records().await.unwrap();
        let names: Vec<&str> = listed
          .iter()
          .filter_map(|r| r["nickname"].as_str())
          .collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        assert!(dir.path().join("nested/data").join(RESULTS_FILE_NAME).exists());

        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn missing_or_corrupt_file_reads_empty()
    {   let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        assert!(store.list_records().await.unwrap().is_empty());

        std::fs::write(dir.path().join(RESULTS_FILE_NAME), "{not json").unwrap();
        assert!(store.list_records().await.unwrap().is_empty());

        assert_eq!(store.append_record(record("x")).await, Ok(1));
    }

    #[tokio::test]
    async fn persists_across_store_instances()
    {   let dir = tempfile::tempdir().unwrap();
        {   let store = RecordStore::new(dir.path());
            store.append_record(record("first")).await.unwrap();
            store.shutdown().await.unwrap();
        }
        let store = RecordStore::new(dir.path());
        assert_eq!(store.append_record(record("second")).await, Ok(2));

        let raw = std::fs::read_to_string(
          dir.path().join(RESULTS_FILE_NAME)
        ).unwrap();
        let stored: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored[0]["nickname"], "first");
        assert_eq!(stored[1]["birthYear"], 1975);
    }

    #[tokio::test]
    async fn legacy_entries_are_listed_verbatim()
    {   let dir = tempfile::tempdir().unwrap();
        std::fs::write(
          dir.path().join(RESULTS_FILE_NAME)
        , r#"[{"gender": 5, "extra": [1]}, {"nickname": "ok"}]"#
        ).unwrap();
        let store = RecordStore::new(dir.path());

        let listed = store.list_records().await.unwrap();
        assert_eq!(listed, vec![
          json!({"gender": 5, "extra": [1]})
        , json!({"nickname": "ok"})
        ]);

        assert_eq!(store.append_record(record("new")).await, Ok(3));
        assert_eq!(store.list_records().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn numeric_timestamps_survive_listing()
    {   let dir = tempfile::tempdir().unwrap();
        std::fs::write(
          dir.path().join(RESULTS_FILE_NAME)
        , r#"[{"timestamp": 1700000000000, "nickname": "old"}]"#
        ).unwrap();
        let store = RecordStore::new(dir.path());

        let fresh = DiagnosticRecord::normalize(
          &json!({"timestamp": 1700000000001u64, "nickname": "new"})
        ).unwrap();
        let count = store.append_record(fresh).await.unwrap();
        let listed = store.list_records().await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(listed.len(), count);
        assert_eq!(listed[0]["timestamp"], json!(1700000000000u64));
        assert_eq!(listed[1]["timestamp"], json!(1700000000001u64));
    }

    #[tokio::test]
    async fn data_dir_blocked_by_a_file_fails_both_ways()
    {   let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("data");
        std::fs::write(&blocked, "not a directory").unwrap();
        let store = RecordStore::new(blocked.clone());

        let appended = store.append_record(record("x")).await;
        assert!(matches!(appended, Err(crate::error::Error::Persistence(_))));
        let listed = store.list_records().await;
        assert!(matches!(listed, Err(crate::error::Error::Persistence(_))));
    }

    #[tokio::test]
    async fn calls_after_shutdown_report_disconnect()
    {   let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        let hand = store.hand();
        store.shutdown().await.unwrap();

        let (reply, _rx) = mpsc::unbounded_channel();
        tokio::task::yield_now().await;
        let sent = hand.list_records_tx.send(crate::ListRecordsArgs { reply });
        assert!(sent.is_err());
    }
}
