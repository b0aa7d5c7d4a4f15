pub mod config;
pub mod error;
pub mod negotiation;
pub mod registry;
pub mod room;
pub mod signaling;
pub mod supervisor;
pub mod topology;
pub mod transport;

pub use config::{ServerConfig, Timings};
pub use error::{SignalError, SignalResult};
pub use registry::SessionRegistry;
pub use room::{Room, RoomCommand, RoomManager};
pub use signaling::{AppState, SignalingOutput, SignalingService, ws_handler};
pub use topology::{MediaPathSelector, Topology};
