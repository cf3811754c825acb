//! Command and event types shared between the bridge front-ends and the
//! transmitter link, plus the wire constants of the serial handshake.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Serial baud rate of the transmitter board.
pub const BAUD_RATE: u32 = 115_200;

/// Byte written to wake the transmitter out of its idle loop.
pub const WAKE_BYTE: u8 = b'\n';
/// Keepalive line emitted by the transmitter while it is not yet ready.
pub const KEEPALIVE: &str = "C";
/// Line emitted by the transmitter when it will accept a frame.
pub const READY: &str = "?";
/// Marker byte that introduces a pulse frame.
pub const FRAME_MARKER: u8 = b'R';
/// Line emitted by the transmitter once the frame has been sent on air.
pub const DONE: &str = "!";

/// Width of a device group id.
pub const DEVICE_ID_BITS: u32 = 26;
/// Width of a channel address within a group.
pub const CHANNEL_BITS: u32 = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("device id {0} does not fit in {} bits", DEVICE_ID_BITS)]
    DeviceIdRange(u32),
    #[error("channel {0} does not fit in {} bits", CHANNEL_BITS)]
    ChannelRange(u8),
}

/// A single validated switch command, ready for encoding.
///
/// Construction enforces the address widths of the RF protocol, so the
/// encoder never has to truncate anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchCommand {
    device_id: u32,
    channel: u8,
    group: bool,
    state: bool,
}

impl SwitchCommand {
    pub fn new(
        device_id: u32,
        channel: u8,
        group: bool,
        state: bool,
    ) -> Result<Self, CommandError> {
        if device_id >= 1 << DEVICE_ID_BITS {
            return Err(CommandError::DeviceIdRange(device_id));
        }
        if u32::from(channel) >= 1 << CHANNEL_BITS {
            return Err(CommandError::ChannelRange(channel));
        }

        Ok(SwitchCommand {
            device_id,
            channel,
            group,
            state,
        })
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Whether the command addresses every channel in the group at once.
    pub fn group(&self) -> bool {
        self.group
    }

    pub fn state(&self) -> bool {
        self.state
    }
}

/// Event published onto the command queue when a switch is toggled.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchToggled {
    pub device_id: u32,
    pub channel: u8,
    pub state: bool,
}

impl TryFrom<SwitchToggled> for SwitchCommand {
    type Error = CommandError;

    fn try_from(event: SwitchToggled) -> Result<Self, CommandError> {
        SwitchCommand::new(event.device_id, event.channel, false, event.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_the_full_addressable_range() {
        assert!(SwitchCommand::new((1 << DEVICE_ID_BITS) - 1, 15, false, true).is_ok());
        assert!(SwitchCommand::new(0, 0, true, false).is_ok());
    }

    #[test]
    fn rejects_device_ids_wider_than_26_bits() {
        assert_eq!(
            SwitchCommand::new(1 << DEVICE_ID_BITS, 0, false, false),
            Err(CommandError::DeviceIdRange(1 << DEVICE_ID_BITS))
        );
    }

    #[test]
    fn rejects_channels_wider_than_4_bits() {
        assert_eq!(
            SwitchCommand::new(1, 16, false, false),
            Err(CommandError::ChannelRange(16))
        );
    }

    #[test]
    fn toggle_events_convert_to_single_switch_commands() {
        let event = SwitchToggled {
            device_id: 9,
            channel: 2,
            state: true,
        };

        let cmd = SwitchCommand::try_from(event).unwrap();
        assert_eq!(cmd, SwitchCommand::new(9, 2, false, true).unwrap());
    }
}
