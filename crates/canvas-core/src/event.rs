use serde::{Deserialize, Serialize};

/// Live notification for viewers. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    #[serde(rename = "render")]
    PanelRendered { panel: String, html: String },
    PanelCreated { panel: String },
    PanelRenamed { from: String, to: String },
    PanelDeleted { panel: String },
}

impl ChangeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::PanelRendered { .. } => "render",
            ChangeEvent::PanelCreated { .. } => "panel_created",
            ChangeEvent::PanelRenamed { .. } => "panel_renamed",
            ChangeEvent::PanelDeleted { .. } => "panel_deleted",
        }
    }

    pub fn rendered(panel: impl Into<String>, html: impl Into<String>) -> Self {
        ChangeEvent::PanelRendered {
            panel: panel.into(),
            html: html.into(),
        }
    }
}
