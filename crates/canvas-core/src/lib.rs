pub mod error;
pub mod event;
pub mod hub;
pub mod names;
pub mod paths;
pub mod persist;
pub mod store;

pub use error::{CanvasError, PersistError};
pub use event::ChangeEvent;
pub use hub::{BroadcastHub, Subscription, DEFAULT_QUEUE_CAPACITY};
pub use names::{normalize_panel_name, DEFAULT_PANEL, MAX_PANEL_NAME_LEN};
pub use paths::resolve_within;
pub use persist::{PanelSet, PersistenceManager, SNAPSHOT_VERSION};
pub use store::{CreateOutcome, PanelStore, PullOutcome, PushOutcome, RenderOutcome};
