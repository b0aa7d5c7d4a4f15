mod audio_transport;
mod transport_config;
mod transport_event;

pub use audio_transport::*;
pub use transport_config::*;
pub use transport_event::*;
