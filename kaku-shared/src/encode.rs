//! Pulse encoding for the KlikAanKlikUit on-off-keyed RF protocol.
//!
//! A logical command expands into an alternating high/low duration train.
//! Every data bit becomes a pair of pulses, short-then-long for `0` and
//! long-then-short for `1`. A short sync pulse opens the frame, a long one
//! closes it, and the whole frame is sent twice back to back so the
//! receiver gets a second chance at it.

use crate::protocol::{SwitchCommand, CHANNEL_BITS, DEVICE_ID_BITS};

/// Base time unit in microseconds. Fixed by the protocol.
pub const TIME_UNIT_US: u32 = 265;

/// Pulses in a single frame: two sync pulses plus two per data bit.
pub const FRAME_PULSES: usize =
    2 + 2 * (DEVICE_ID_BITS as usize + 1 + 1 + CHANNEL_BITS as usize);

fn symbol(bit: u32) -> [u32; 2] {
    const T: u32 = TIME_UNIT_US;
    if bit & 1 == 0 {
        [T, 5 * T]
    } else {
        [5 * T, T]
    }
}

/// Expand a command into its pulse train.
///
/// Returns the durations in microseconds together with the base time unit.
/// Deterministic and total; field ranges are enforced when the command is
/// constructed, never here.
pub fn encode(cmd: &SwitchCommand) -> (Vec<u32>, u32) {
    let t = TIME_UNIT_US;
    let mut pulses = Vec::with_capacity(2 * FRAME_PULSES);

    pulses.push(11 * t);
    for i in (0..DEVICE_ID_BITS).rev() {
        pulses.extend_from_slice(&symbol(cmd.device_id() >> i));
    }
    pulses.extend_from_slice(&symbol(cmd.group() as u32));
    pulses.extend_from_slice(&symbol(cmd.state() as u32));
    for i in (0..CHANNEL_BITS).rev() {
        pulses.extend_from_slice(&symbol(u32::from(cmd.channel()) >> i));
    }
    pulses.push(32 * t);

    // The receiver wants the frame twice in a row.
    pulses.extend_from_within(..);

    (pulses, t)
}
