//! File-backed conversation store
//!
//! Layout under the history root:
//!
//! ```text
//! wa-<identity>/
//!   chat_history.jsonl   one JSON turn per line, append-only
//!   configuration.json   contact settings, `{}` until used
//! ```

use std::fs::File;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use super::{ContactSettings, Identity, Turn};
use crate::Result;

/// Turn log file name inside a contact directory
pub const HISTORY_FILE: &str = "chat_history.jsonl";

/// Settings file name inside a contact directory
pub const SETTINGS_FILE: &str = "configuration.json";

/// Contact directory prefix
const DIR_PREFIX: &str = "wa-";

/// Durable append-only turn log, one per contact
///
/// The store holds no state beyond its root path; every call goes to disk,
/// so clones and concurrent callers see the same data.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    root: PathBuf,
}

impl ConversationStore {
    /// Create a store rooted at `root` (created lazily per contact)
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one contact's files
    #[must_use]
    pub fn contact_dir(&self, identity: &Identity) -> PathBuf {
        self.root.join(format!("{DIR_PREFIX}{identity}"))
    }

    /// Path of a contact's turn log
    #[must_use]
    pub fn history_path(&self, identity: &Identity) -> PathBuf {
        self.contact_dir(identity).join(HISTORY_FILE)
    }

    /// Path of a contact's settings file
    #[must_use]
    pub fn settings_path(&self, identity: &Identity) -> PathBuf {
        self.contact_dir(identity).join(SETTINGS_FILE)
    }

    /// Ensure storage exists for `identity`, logging instead of failing
    pub async fn initialize(&self, identity: &Identity) {
        match self.try_initialize(identity).await {
            Ok(()) => tracing::debug!(identity = %identity, "history initialized"),
            Err(e) => {
                tracing::error!(identity = %identity, error = %e, "failed to initialize history");
            }
        }
    }

    /// Ensure storage exists for `identity`
    ///
    /// Creates the contact directory, an empty log, and an empty settings
    /// file when missing. Existing files are never truncated.
    ///
    /// # Errors
    ///
    /// Returns error if the directory or files cannot be created
    pub async fn try_initialize(&self, identity: &Identity) -> Result<()> {
        tokio::fs::create_dir_all(self.contact_dir(identity)).await?;
        create_if_missing(&self.history_path(identity), b"").await?;

        let settings = serde_json::to_string_pretty(&ContactSettings::default())?;
        create_if_missing(&self.settings_path(identity), settings.as_bytes()).await?;
        Ok(())
    }

    /// Append a turn, logging instead of failing
    pub async fn append(&self, identity: &Identity, turn: &Turn) {
        match self.try_append(identity, turn).await {
            Ok(()) => tracing::debug!(identity = %identity, sender = %turn.speaker, "turn appended"),
            Err(e) => tracing::error!(identity = %identity, error = %e, "failed to append turn"),
        }
    }

    /// Append one turn as a single JSON line
    ///
    /// The record goes out in one `write_all` on a blocking append-mode
    /// handle, so it is never split across the runtime's write chunks. If the
    /// log ends in a torn record (no trailing newline) the new record starts
    /// on a fresh line so only the torn one is lost.
    ///
    /// # Errors
    ///
    /// Returns error if the turn cannot be serialized or the log cannot be written
    pub async fn try_append(&self, identity: &Identity, turn: &Turn) -> Result<()> {
        let mut record = serde_json::to_vec(turn)?;
        record.push(b'\n');

        let path = self.history_path(identity);
        let repaired = tokio::task::spawn_blocking(move || append_record(&path, record))
            .await
            .map_err(io::Error::other)??;

        if repaired {
            tracing::warn!(identity = %identity, "history ended mid-record, started a new line");
        }
        Ok(())
    }

    /// Read every stored turn in write order
    ///
    /// Records that fail to parse are skipped. A log that cannot be opened
    /// reads as empty.
    pub async fn read_all(&self, identity: &Identity) -> Vec<Turn> {
        let path = self.history_path(identity);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(identity = %identity, "no history yet");
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(
                    identity = %identity,
                    path = %path.display(),
                    error = %e,
                    "failed to read history"
                );
                return Vec::new();
            }
        };

        parse_log(&bytes, identity)
    }

    /// Read the contact settings, defaulting when missing or malformed
    pub async fn read_settings(&self, identity: &Identity) -> ContactSettings {
        let path = self.settings_path(identity);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!(identity = %identity, error = %e, "failed to read contact settings");
                }
                return ContactSettings::default();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(identity = %identity, error = %e, "malformed contact settings, using defaults");
            ContactSettings::default()
        })
    }
}

async fn create_if_missing(path: &Path, contents: &[u8]) -> Result<()> {
    match OpenOptions::new().write(true).create_new(true).open(path).await {
        Ok(mut file) => {
            file.write_all(contents).await?;
            file.flush().await?;
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Write `record` at the end of the log, returning whether a torn tail had
/// to be closed off first
fn append_record(path: &Path, mut record: Vec<u8>) -> io::Result<bool> {
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)?;

    let torn = ends_with_torn_record(&mut file)?;
    if torn {
        record.insert(0, b'\n');
    }

    file.write_all(&record)?;
    file.flush()?;
    Ok(torn)
}

fn ends_with_torn_record(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }

    file.seek(SeekFrom::End(-1))?;
    let mut last = [0_u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn parse_log(content: &[u8], identity: &Identity) -> Vec<Turn> {
    content
        .split(|&b| b == b'\n')
        .enumerate()
        .filter(|(_, line)| !line.trim_ascii().is_empty())
        .filter_map(|(idx, line)| match serde_json::from_slice::<Turn>(line) {
            Ok(turn) => Some(turn),
            Err(e) => {
                tracing::warn!(
                    identity = %identity,
                    line = idx + 1,
                    error = %e,
                    "skipping malformed history record"
                );
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Speaker;

    fn store() -> (tempfile::TempDir, ConversationStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path().join("history"));
        (dir, store)
    }

    fn id(address: &str) -> Identity {
        Identity::from_address(address).unwrap()
    }

    #[tokio::test]
    async fn initialize_creates_layout() {
        let (_dir, store) = store();
        let who = id("555@c.us");

        store.try_initialize(&who).await.unwrap();

        assert!(store.contact_dir(&who).ends_with("wa-555"));
        assert_eq!(std::fs::read_to_string(store.history_path(&who)).unwrap(), "");
        let settings: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.settings_path(&who)).unwrap()).unwrap();
        assert_eq!(settings, serde_json::json!({}));
    }

    #[tokio::test]
    async fn append_then_read_keeps_order() {
        let (_dir, store) = store();
        let who = id("555@c.us");
        store.try_initialize(&who).await.unwrap();

        for i in 0..10 {
            let turn = if i % 2 == 0 {
                Turn::user("555@c.us", format!("msg {i}"))
            } else {
                Turn::bot("555@c.us", format!("msg {i}"))
            };
            store.try_append(&who, &turn).await.unwrap();
        }

        let turns = store.read_all(&who).await;
        assert_eq!(turns.len(), 10);
        for (i, turn) in turns.iter().enumerate() {
            assert_eq!(turn.text, format!("msg {i}"));
        }
        assert_eq!(turns[0].speaker, Speaker::User);
        assert_eq!(turns[1].speaker, Speaker::Bot);
    }

    #[tokio::test]
    async fn initialize_twice_keeps_history_and_settings() {
        let (_dir, store) = store();
        let who = id("555@c.us");
        store.try_initialize(&who).await.unwrap();
        store.try_append(&who, &Turn::user("555@c.us", "hi")).await.unwrap();
        std::fs::write(store.settings_path(&who), r#"{"persona":"orin"}"#).unwrap();

        store.try_initialize(&who).await.unwrap();

        assert_eq!(store.read_all(&who).await.len(), 1);
        let settings = store.read_settings(&who).await;
        assert_eq!(settings.extra.get("persona").and_then(|v| v.as_str()), Some("orin"));
    }

    #[tokio::test]
    async fn malformed_record_is_skipped() {
        let (_dir, store) = store();
        let who = id("555@c.us");
        store.try_initialize(&who).await.unwrap();
        store.try_append(&who, &Turn::user("555@c.us", "one")).await.unwrap();
        store.try_append(&who, &Turn::bot("555@c.us", "two")).await.unwrap();

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(store.history_path(&who))
            .unwrap();
        std::io::Write::write_all(&mut file, b"{not json at all}\n").unwrap();
        drop(file);

        store.try_append(&who, &Turn::user("555@c.us", "three")).await.unwrap();

        let texts: Vec<_> = store.read_all(&who).await.into_iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn torn_record_does_not_swallow_next_append() {
        let (_dir, store) = store();
        let who = id("555@c.us");
        store.try_initialize(&who).await.unwrap();
        store.try_append(&who, &Turn::user("555@c.us", "kept")).await.unwrap();

        // Simulate a writer that died halfway through a record
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(store.history_path(&who))
            .unwrap();
        std::io::Write::write_all(&mut file, br#"{"from":"555@c.us","mess"#).unwrap();
        drop(file);

        store.try_append(&who, &Turn::bot("555@c.us", "after crash")).await.unwrap();

        let texts: Vec<_> = store.read_all(&who).await.into_iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["kept", "after crash"]);
    }

    #[tokio::test]
    async fn invalid_utf8_record_is_skipped() {
        let (_dir, store) = store();
        let who = id("555@c.us");
        store.try_initialize(&who).await.unwrap();
        store.try_append(&who, &Turn::user("555@c.us", "clean")).await.unwrap();

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(store.history_path(&who))
            .unwrap();
        std::io::Write::write_all(
            &mut file,
            b"{\"from\":\"555@c.us\",\"message\":\"bad \xff\xfe bytes\",\"timestamp\":1,\"sender\":\"user\"}\n",
        )
        .unwrap();
        drop(file);

        store.try_append(&who, &Turn::bot("555@c.us", "still clean")).await.unwrap();

        let texts: Vec<_> = store.read_all(&who).await.into_iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["clean", "still clean"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn large_concurrent_appends_stay_whole() {
        let (_dir, store) = store();
        let who = id("555@c.us");
        store.try_initialize(&who).await.unwrap();

        // Larger than the runtime's per-call write buffer
        let big = "x".repeat(5 * 1024 * 1024);
        let tasks: Vec<_> = (0..6)
            .map(|i| {
                let store = store.clone();
                let who = who.clone();
                let text = if i % 2 == 0 { big.clone() } else { format!("small {i}") };
                tokio::spawn(async move {
                    store.try_append(&who, &Turn::user("555@c.us", text)).await.unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let turns = store.read_all(&who).await;
        assert_eq!(turns.len(), 6);
        assert_eq!(turns.iter().filter(|t| t.text == big).count(), 3);
        assert_eq!(turns.iter().filter(|t| t.text.starts_with("small ")).count(), 3);
    }

    #[tokio::test]
    async fn missing_storage_reads_empty() {
        let (_dir, store) = store();
        assert!(store.read_all(&id("nobody@c.us")).await.is_empty());
        assert_eq!(store.read_settings(&id("nobody@c.us")).await, ContactSettings::default());
    }

    #[tokio::test]
    async fn append_without_initialize_fails_softly() {
        let (_dir, store) = store();
        let who = id("555@c.us");

        assert!(store.try_append(&who, &Turn::user("555@c.us", "lost")).await.is_err());
        // Degrading form only logs
        store.append(&who, &Turn::user("555@c.us", "lost")).await;
        assert!(store.read_all(&who).await.is_empty());
    }

    #[tokio::test]
    async fn unknown_speaker_survives_read() {
        let (_dir, store) = store();
        let who = id("555@c.us");
        store.try_initialize(&who).await.unwrap();
        std::fs::write(
            store.history_path(&who),
            "{\"from\":\"555@c.us\",\"message\":\"be brief\",\"timestamp\":1,\"sender\":\"system\"}\n",
        )
        .unwrap();

        let turns = store.read_all(&who).await;
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].speaker, Speaker::Other("system".to_string()));
    }
}
