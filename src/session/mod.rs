// src/session/mod.rs — Session records, browser pool, and their lifecycle

pub mod manager;
pub mod pool;
pub mod reaper;
pub mod store;
pub mod types;

pub use manager::{ReclaimReport, SessionManager};
pub use pool::{Lease, ResourcePool};
pub use reaper::{spawn_reaper, ReaperHandle};
pub use types::{HistoryEntry, HistoryItem, SessionRecord, SessionUpdate};
