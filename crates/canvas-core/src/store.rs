use crate::error::CanvasError;
use crate::event::ChangeEvent;
use crate::hub::{BroadcastHub, Subscription};
use crate::names::{name_or_default, normalize_panel_name, DEFAULT_PANEL};
use crate::paths::resolve_within;
use crate::persist::{PanelSet, PersistenceManager};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutcome {
    pub panel: String,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOutcome {
    pub panel: String,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    pub panel: String,
    pub path: PathBuf,
    pub bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullOutcome {
    pub panel: String,
    pub path: PathBuf,
    pub html: String,
    pub created: bool,
}

/// Values needed to put the map back exactly as it was before one mutation.
enum Undo {
    Remove(String),
    Restore { panel: String, html: String },
    Rename { from: String, to: String },
}

impl Undo {
    fn apply(self, panels: &mut PanelSet) {
        match self {
            Undo::Remove(panel) => {
                panels.remove(&panel);
            }
            Undo::Restore { panel, html } => {
                panels.insert(panel, html);
            }
            Undo::Rename { from, to } => {
                if let Some(html) = panels.remove(&to) {
                    panels.insert(from, html);
                }
            }
        }
    }
}

/// Authoritative panel map. Every mutation validates, applies in memory,
/// persists the full map, then broadcasts; a failed save rolls the map back.
pub struct PanelStore {
    panels: RwLock<PanelSet>,
    // Held from validation until the persistence outcome is known, so a
    // rollback can never clobber a newer committed value.
    writer: Mutex<()>,
    persistence: PersistenceManager,
    hub: Arc<BroadcastHub>,
    project_root: PathBuf,
}

impl PanelStore {
    /// Builds a store around an already-loaded set, seeding `default` when
    /// the set is empty.
    pub fn new(
        initial: PanelSet,
        persistence: PersistenceManager,
        hub: Arc<BroadcastHub>,
        project_root: impl Into<PathBuf>,
    ) -> Self {
        let mut panels = initial;
        if panels.is_empty() {
            panels.insert(DEFAULT_PANEL.to_string(), String::new());
        }
        Self {
            panels: RwLock::new(panels),
            writer: Mutex::new(()),
            persistence,
            hub,
            project_root: project_root.into(),
        }
    }

    /// Loads the state file and builds the store from it.
    pub async fn open(
        persistence: PersistenceManager,
        hub: Arc<BroadcastHub>,
        project_root: impl Into<PathBuf>,
    ) -> Result<Self, CanvasError> {
        let initial = persistence.load().await?;
        info!(
            event = "state_loaded",
            path = %persistence.path().display(),
            panels = initial.len()
        );
        Ok(Self::new(initial, persistence, hub, project_root))
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn state_path(&self) -> &Path {
        self.persistence.path()
    }

    pub async fn list_panels(&self) -> Vec<String> {
        self.panels.read().await.keys().cloned().collect()
    }

    pub async fn all_panels(&self) -> PanelSet {
        self.panels.read().await.clone()
    }

    pub async fn get_panel(&self, name: &str) -> Option<String> {
        self.panels.read().await.get(name).cloned()
    }

    /// Attaches a live viewer. The replay carries one render per panel and
    /// only ever reflects committed state.
    pub async fn subscribe(&self) -> Subscription {
        let _writer = self.writer.lock().await;
        let panels = self.panels.read().await;
        self.hub.subscribe(
            panels
                .iter()
                .map(|(panel, html)| ChangeEvent::rendered(panel.clone(), html.clone())),
        )
    }

    pub fn unsubscribe(&self, conn_id: &str) -> bool {
        self.hub.unsubscribe(conn_id)
    }

    pub async fn render(
        &self,
        name: Option<&str>,
        html: String,
    ) -> Result<RenderOutcome, CanvasError> {
        let panel = name_or_default(name)?;
        let _writer = self.writer.lock().await;
        let created = self.write_content(&panel, html).await?;
        info!(event = "panel_rendered", panel = %panel, created);
        Ok(RenderOutcome { panel, created })
    }

    pub async fn create_panel(&self, name: Option<&str>) -> Result<CreateOutcome, CanvasError> {
        let requested = match name {
            Some(value) if !value.trim().is_empty() => Some(normalize_panel_name(value)?),
            _ => None,
        };
        let _writer = self.writer.lock().await;
        let (panel, snapshot) = {
            let mut panels = self.panels.write().await;
            let panel = match requested {
                Some(panel) => panel,
                None => generate_panel_name(&panels),
            };
            if panels.contains_key(&panel) {
                return Ok(CreateOutcome {
                    panel,
                    created: false,
                });
            }
            panels.insert(panel.clone(), String::new());
            (panel, panels.clone())
        };
        self.commit(
            snapshot,
            Undo::Remove(panel.clone()),
            vec![ChangeEvent::PanelCreated {
                panel: panel.clone(),
            }],
        )
        .await?;
        info!(event = "panel_created", panel = %panel);
        Ok(CreateOutcome {
            panel,
            created: true,
        })
    }

    pub async fn rename_panel(&self, old: &str, new: &str) -> Result<String, CanvasError> {
        let from = normalize_panel_name(old)?;
        let to = normalize_panel_name(new)?;
        let _writer = self.writer.lock().await;
        let snapshot = {
            let mut panels = self.panels.write().await;
            if !panels.contains_key(&from) {
                return Err(CanvasError::NotFound(from));
            }
            // Renaming onto an existing name, the panel's own included, is a conflict.
            if panels.contains_key(&to) {
                return Err(CanvasError::Conflict(to));
            }
            if let Some(html) = panels.remove(&from) {
                panels.insert(to.clone(), html);
            }
            panels.clone()
        };
        self.commit(
            snapshot,
            Undo::Rename {
                from: from.clone(),
                to: to.clone(),
            },
            vec![ChangeEvent::PanelRenamed {
                from: from.clone(),
                to: to.clone(),
            }],
        )
        .await?;
        info!(event = "panel_renamed", from = %from, to = %to);
        Ok(to)
    }

    pub async fn delete_panel(&self, name: &str) -> Result<(), CanvasError> {
        let panel = normalize_panel_name(name)?;
        let _writer = self.writer.lock().await;
        let (html, snapshot) = {
            let mut panels = self.panels.write().await;
            if !panels.contains_key(&panel) {
                return Err(CanvasError::NotFound(panel));
            }
            if panels.len() <= 1 {
                return Err(CanvasError::LastPanel(panel));
            }
            let html = panels.remove(&panel).unwrap_or_default();
            (html, panels.clone())
        };
        self.commit(
            snapshot,
            Undo::Restore {
                panel: panel.clone(),
                html,
            },
            vec![ChangeEvent::PanelDeleted {
                panel: panel.clone(),
            }],
        )
        .await?;
        info!(event = "panel_deleted", panel = %panel);
        Ok(())
    }

    /// Writes a panel's content to a file under the project root.
    pub async fn push_to_file(
        &self,
        name: Option<&str>,
        path: &str,
    ) -> Result<PushOutcome, CanvasError> {
        let panel = name_or_default(name)?;
        let target = resolve_within(&self.project_root, path)?;
        let html = self
            .get_panel(&panel)
            .await
            .ok_or_else(|| CanvasError::NotFound(panel.clone()))?;
        tokio::fs::write(&target, html.as_bytes())
            .await
            .map_err(|source| CanvasError::Io {
                path: target.clone(),
                source,
            })?;
        info!(
            event = "panel_pushed",
            panel = %panel,
            path = %target.display(),
            bytes = html.len()
        );
        Ok(PushOutcome {
            panel,
            path: target,
            bytes: html.len(),
        })
    }

    /// Reads a file under the project root into a panel, with the same
    /// implicit-create and rollback behaviour as `render`.
    pub async fn pull_from_file(
        &self,
        name: Option<&str>,
        path: &str,
    ) -> Result<PullOutcome, CanvasError> {
        let panel = name_or_default(name)?;
        let source_path = resolve_within(&self.project_root, path)?;
        let bytes = tokio::fs::read(&source_path)
            .await
            .map_err(|source| CanvasError::Io {
                path: source_path.clone(),
                source,
            })?;
        // Content is opaque; bytes that are not UTF-8 become U+FFFD.
        let html = String::from_utf8_lossy(&bytes).into_owned();
        let _writer = self.writer.lock().await;
        let created = self.write_content(&panel, html.clone()).await?;
        info!(
            event = "panel_pulled",
            panel = %panel,
            path = %source_path.display(),
            created
        );
        Ok(PullOutcome {
            panel,
            path: source_path,
            html,
            created,
        })
    }

    /// Shared body of render and pull. Caller holds the writer gate.
    async fn write_content(&self, panel: &str, html: String) -> Result<bool, CanvasError> {
        let (undo, snapshot, created) = {
            let mut panels = self.panels.write().await;
            let previous = panels.insert(panel.to_string(), html.clone());
            let created = previous.is_none();
            let undo = match previous {
                Some(previous) => Undo::Restore {
                    panel: panel.to_string(),
                    html: previous,
                },
                None => Undo::Remove(panel.to_string()),
            };
            (undo, panels.clone(), created)
        };
        let mut events = Vec::with_capacity(2);
        if created {
            events.push(ChangeEvent::PanelCreated {
                panel: panel.to_string(),
            });
        }
        events.push(ChangeEvent::rendered(panel, html));
        self.commit(snapshot, undo, events).await?;
        Ok(created)
    }

    async fn commit(
        &self,
        snapshot: PanelSet,
        undo: Undo,
        events: Vec<ChangeEvent>,
    ) -> Result<(), CanvasError> {
        match self.persistence.save(&snapshot).await {
            Ok(()) => {
                for event in &events {
                    self.hub.publish(event);
                }
                Ok(())
            }
            Err(err) => {
                undo.apply(&mut *self.panels.write().await);
                warn!(
                    event = "persist_failed",
                    path = %self.persistence.path().display(),
                    error = %err
                );
                Err(CanvasError::Persistence(err))
            }
        }
    }
}

fn generate_panel_name(panels: &PanelSet) -> String {
    let base = format!("panel-{}", to_base36(Utc::now().timestamp_millis().unsigned_abs()));
    if !panels.contains_key(&base) {
        return base;
    }
    (2u32..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !panels.contains_key(candidate))
        .unwrap_or(base)
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
