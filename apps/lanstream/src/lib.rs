//! Broadcast text messages and file drops to every browser on the local
//! network, with a bounded persisted history.

pub mod cli;
pub mod config;
pub mod event;
pub mod history;
pub mod hub;
pub mod net;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod uploads;

pub use event::{Event, EventClock, EventKind};
pub use history::{History, HistoryLog};
pub use hub::{ConnectionHub, HubHandle};
pub use state::AppState;
