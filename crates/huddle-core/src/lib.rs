//! Huddle session core.
//!
//! Connection lifecycle, local/remote track bookkeeping and callback to
//! event translation for one video call. The media engine is reached only
//! through the [`engine::MediaEngine`] trait.

pub mod controls;
pub mod data_track;
pub mod engine;
pub mod errors;
pub mod events;
pub mod loopback;
pub mod participants;
pub mod room;
pub mod runtime;
pub mod settings;
pub mod stats;
pub mod tracks;
pub mod translate;

pub use errors::{EngineError, SessionError};
pub use events::{EventEmitter, SessionEvent, SessionEventListener};
pub use room::{ConnectConfig, ConnectionState, SessionController};
pub use runtime::{Command, SessionHandle};
pub use settings::{Settings, SettingsStore};
