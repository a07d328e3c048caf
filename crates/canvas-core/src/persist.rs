use crate::error::PersistError;
use crate::names::is_valid_panel_name;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

pub const SNAPSHOT_VERSION: u32 = 1;

pub type PanelSet = BTreeMap<String, String>;

#[derive(Debug, Serialize)]
struct Snapshot<'a> {
    version: u32,
    #[serde(rename = "updatedAt")]
    updated_at: String,
    panels: &'a PanelSet,
}

/// Mirrors the full panel set into a single JSON file.
#[derive(Debug, Clone)]
pub struct PersistenceManager {
    path: PathBuf,
}

impl PersistenceManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the state file. A missing file is a first run and yields an
    /// empty set; unparseable JSON is an error; entries with bad names or
    /// non-string content are dropped.
    pub async fn load(&self) -> Result<PanelSet, PersistError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(event = "state_missing", path = %self.path.display());
                return Ok(PanelSet::new());
            }
            Err(source) => {
                return Err(PersistError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let value: Value = serde_json::from_str(&raw).map_err(|source| PersistError::Parse {
            path: self.path.clone(),
            source,
        })?;
        Ok(panels_from_value(&value, &self.path))
    }

    /// Rewrites the whole file: temp sibling, fsync, rename over the target.
    /// The target is always either the previous or the new complete snapshot.
    pub async fn save(&self, panels: &PanelSet) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| PersistError::Write {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
        }

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            updated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            panels,
        };
        let mut payload = serde_json::to_string_pretty(&snapshot)?;
        payload.push('\n');

        let temp_path = temp_sibling(&self.path);
        if let Err(source) = write_synced(&temp_path, payload.as_bytes()).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(PersistError::Write {
                path: temp_path,
                source,
            });
        }
        if let Err(source) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(PersistError::Write {
                path: self.path.clone(),
                source,
            });
        }
        debug!(
            event = "state_saved",
            path = %self.path.display(),
            panels = panels.len(),
            bytes = payload.len()
        );
        Ok(())
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

fn temp_sibling(path: &Path) -> PathBuf {
    match path.file_name() {
        Some(name) => path.with_file_name(format!("{}.tmp", name.to_string_lossy())),
        None => path.with_extension("tmp"),
    }
}

fn panels_from_value(value: &Value, path: &Path) -> PanelSet {
    if let Some(version) = value.get("version").and_then(Value::as_u64) {
        if version != u64::from(SNAPSHOT_VERSION) {
            warn!(event = "state_version_mismatch", path = %path.display(), version);
        }
    }

    let mut panels = PanelSet::new();
    let Some(entries) = value.get("panels").and_then(Value::as_object) else {
        warn!(event = "state_shape_invalid", path = %path.display());
        return panels;
    };
    let mut dropped = 0usize;
    for (name, html) in entries {
        match html.as_str() {
            Some(html) if is_valid_panel_name(name) => {
                panels.insert(name.clone(), html.to_string());
            }
            _ => dropped += 1,
        }
    }
    if dropped > 0 {
        warn!(event = "state_entries_dropped", path = %path.display(), dropped);
    }
    panels
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> PersistenceManager {
        PersistenceManager::new(dir.path().join("state").join("panels.json"))
    }

    #[tokio::test]
    async fn missing_file_loads_as_empty_set() {
        let dir = TempDir::new().expect("temp dir");
        let panels = manager(&dir).load().await.expect("load");
        assert!(panels.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_reproduces_content_exactly() {
        let dir = TempDir::new().expect("temp dir");
        let store = manager(&dir);
        let mut panels = PanelSet::new();
        panels.insert("default".to_string(), "<h1>hi</h1>".to_string());
        panels.insert("empty".to_string(), String::new());
        panels.insert(
            "tricky".to_string(),
            "quotes \" backslash \\ newline\n unicode \u{2603} <script>x</script>".to_string(),
        );

        store.save(&panels).await.expect("save");
        assert_eq!(store.load().await.expect("load"), panels);
    }

    #[tokio::test]
    async fn saved_file_has_documented_layout() {
        let dir = TempDir::new().expect("temp dir");
        let store = manager(&dir);
        let mut panels = PanelSet::new();
        panels.insert("default".to_string(), "<p>x</p>".to_string());
        store.save(&panels).await.expect("save");

        let raw = std::fs::read_to_string(store.path()).expect("read");
        assert!(raw.ends_with("}\n"));
        let value: Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(value["version"], 1);
        assert_eq!(value["panels"]["default"], "<p>x</p>");
        let updated_at = value["updatedAt"].as_str().expect("timestamp");
        assert!(chrono::DateTime::parse_from_rfc3339(updated_at).is_ok());
        assert!(!temp_sibling(store.path()).exists());
    }

    #[tokio::test]
    async fn invalid_entries_are_dropped_on_load() {
        let dir = TempDir::new().expect("temp dir");
        let store = manager(&dir);
        std::fs::create_dir_all(store.path().parent().expect("parent")).expect("mkdir");
        std::fs::write(
            store.path(),
            r#"{"panels": {"default": "<p>x</p>", "bad name!": "y", "num": 5}}"#,
        )
        .expect("write");

        let panels = store.load().await.expect("load");
        assert_eq!(panels.len(), 1);
        assert_eq!(panels.get("default").map(String::as_str), Some("<p>x</p>"));
    }

    #[tokio::test]
    async fn wrong_top_level_shape_loads_as_empty() {
        let dir = TempDir::new().expect("temp dir");
        let store = manager(&dir);
        std::fs::create_dir_all(store.path().parent().expect("parent")).expect("mkdir");
        for raw in [r#"["default"]"#, r#"{"panels": "nope"}"#, r#"{"version": 1}"#] {
            std::fs::write(store.path(), raw).expect("write");
            assert!(store.load().await.expect("load").is_empty(), "{raw}");
        }
    }

    #[tokio::test]
    async fn malformed_json_is_an_error() {
        let dir = TempDir::new().expect("temp dir");
        let store = manager(&dir);
        std::fs::create_dir_all(store.path().parent().expect("parent")).expect("mkdir");
        std::fs::write(store.path(), "{\"panels\": ").expect("write");

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, PersistError::Parse { .. }));
    }

    #[tokio::test]
    async fn failed_save_leaves_previous_snapshot_intact() {
        let dir = TempDir::new().expect("temp dir");
        let store = manager(&dir);
        let mut panels = PanelSet::new();
        panels.insert("default".to_string(), "<p>old</p>".to_string());
        store.save(&panels).await.expect("save");

        // A directory squatting on the temp path makes the write fail.
        std::fs::create_dir(temp_sibling(store.path())).expect("block temp path");
        panels.insert("default".to_string(), "<p>new</p>".to_string());
        assert!(matches!(
            store.save(&panels).await,
            Err(PersistError::Write { .. })
        ));

        let on_disk = store.load().await.expect("load");
        assert_eq!(on_disk.get("default").map(String::as_str), Some("<p>old</p>"));
    }
}
