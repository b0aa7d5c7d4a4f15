mod participant;
mod room_state;
mod session_registry;

pub use participant::*;
pub use room_state::*;
pub use session_registry::*;
