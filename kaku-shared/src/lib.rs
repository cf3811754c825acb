//! Shared building blocks of the kaku bridge: the pulse encoder, the
//! command and event model, and the serial transmitter link.

pub mod encode;
pub mod protocol;

#[cfg(feature = "transport")]
pub mod link;

#[cfg(feature = "transport")]
pub use link::{PulseTransmitter, SerialLink, TransportError};
pub use protocol::{SwitchCommand, SwitchToggled};
