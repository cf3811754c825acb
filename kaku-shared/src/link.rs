//! Serial link to the transmitter board.
//!
//! The board speaks a line-based text protocol. It announces readiness
//! with a `?` line, interspersed with `C` keepalives, accepts a frame as a
//! pulse count followed by interleaved time-unit and duration lines, and
//! confirms the on-air transmission with `!`. Any deviation leaves the
//! board's state machine desynchronized, so every protocol error here is
//! terminal for the transmission.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::encode::encode;
use crate::protocol::{
    SwitchCommand, BAUD_RATE, DONE, FRAME_MARKER, KEEPALIVE, READY, WAKE_BYTE,
};

/// Default bound on each handshake step. Covers the bootloader delay of a
/// board that resets when the port is opened.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval for serial reads.
const READ_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not open serial port: {0}")]
    Open(#[from] serialport::Error),
    #[error("serial i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("transmitter sent {got:?} while waiting for {expected:?}")]
    Protocol { expected: &'static str, got: String },
    #[error("no {expected:?} from transmitter within {after:?}")]
    Timeout {
        expected: &'static str,
        after: Duration,
    },
}

/// Anything able to put a switch command on the air.
pub trait PulseTransmitter {
    fn transmit(&mut self, cmd: &SwitchCommand) -> Result<(), TransportError>;
}

/// Serial connection to the transmitter.
///
/// The port is opened fresh for every transmission, so a board reset or
/// replug between commands goes unnoticed.
pub struct SerialLink {
    path: PathBuf,
    step_timeout: Duration,
}

impl SerialLink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SerialLink {
            path: path.into(),
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    pub fn with_step_timeout(mut self, step_timeout: Duration) -> Self {
        self.step_timeout = step_timeout;
        self
    }
}

impl PulseTransmitter for SerialLink {
    fn transmit(&mut self, cmd: &SwitchCommand) -> Result<(), TransportError> {
        let mut port = serialport::new(self.path.to_string_lossy(), BAUD_RATE)
            .timeout(READ_POLL)
            .open()?;
        log::debug!("serial port {} open", self.path.display());

        send_pulses(&mut port, cmd, self.step_timeout)
    }
}

/// Run the full ready/frame/done exchange on an open connection.
fn send_pulses<P: Read + Write>(
    port: &mut P,
    cmd: &SwitchCommand,
    step_timeout: Duration,
) -> Result<(), TransportError> {
    port.write_all(&[WAKE_BYTE])?;
    await_ready(port, step_timeout)?;

    port.write_all(&[FRAME_MARKER])?;
    let (pulses, unit) = encode(cmd);
    write_frame(port, &pulses, unit)?;
    port.flush()?;

    await_done(port, step_timeout)
}

fn await_ready<R: Read>(port: &mut R, step_timeout: Duration) -> Result<(), TransportError> {
    loop {
        let line = read_line(port, READY, step_timeout)?;
        match line.as_str() {
            READY => return Ok(()),
            KEEPALIVE => log::debug!("transmitter not ready yet, keepalive received"),
            _ => {
                return Err(TransportError::Protocol {
                    expected: READY,
                    got: line,
                })
            }
        }
    }
}

fn await_done<R: Read>(port: &mut R, step_timeout: Duration) -> Result<(), TransportError> {
    let line = read_line(port, DONE, step_timeout)?;
    if line == DONE {
        Ok(())
    } else {
        Err(TransportError::Protocol {
            expected: DONE,
            got: line,
        })
    }
}

/// Frame body: the pulse count plus one, then unit and duration lines
/// interleaved, ending on a bare unit.
fn write_frame<W: Write>(w: &mut W, pulses: &[u32], unit: u32) -> io::Result<()> {
    writeln!(w, "{}", pulses.len() + 1)?;
    for pulse in pulses {
        writeln!(w, "{}", unit)?;
        writeln!(w, "{}", pulse)?;
    }
    writeln!(w, "{}", unit)
}

/// Read one `\n`-terminated line, trimmed of surrounding whitespace.
///
/// Serial reads poll with a short timeout; `step_timeout` bounds how long
/// we are willing to wait for the line as a whole.
fn read_line<R: Read>(
    port: &mut R,
    expected: &'static str,
    step_timeout: Duration,
) -> Result<String, TransportError> {
    let deadline = Instant::now() + step_timeout;
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        match port.read(&mut byte) {
            Ok(0) => {
                return Err(TransportError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "serial connection closed",
                )))
            }
            Ok(_) => {
                if byte[0] == b'\n' {
                    return Ok(String::from_utf8_lossy(&line).trim().to_owned());
                }
                line.push(byte[0]);
            }
            Err(e)
                if e.kind() == io::ErrorKind::TimedOut
                    || e.kind() == io::ErrorKind::WouldBlock =>
            {
                if Instant::now() >= deadline {
                    return Err(TransportError::Timeout {
                        expected,
                        after: step_timeout,
                    });
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory stand-in for the serial port: a scripted input transcript
    /// and a capture buffer for everything written.
    struct FakePort {
        input: io::Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl FakePort {
        fn new(transcript: &str) -> Self {
            FakePort {
                input: io::Cursor::new(transcript.as_bytes().to_vec()),
                written: Vec::new(),
            }
        }
    }

    impl Read for FakePort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for FakePort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Never has anything to say.
    struct SilentPort;

    impl Read for SilentPort {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::ErrorKind::TimedOut.into())
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn cmd() -> SwitchCommand {
        SwitchCommand::new(1, 0, false, true).unwrap()
    }

    #[test]
    fn ready_marker_after_any_number_of_keepalives() {
        let mut port = FakePort::new("C\nC\n?\n");
        await_ready(&mut port, TIMEOUT).unwrap();
        assert_eq!(port.input.position(), 6);

        let mut port = FakePort::new("?\n");
        await_ready(&mut port, TIMEOUT).unwrap();
    }

    #[test]
    fn crlf_lines_are_accepted() {
        let mut port = FakePort::new("C\r\n?\r\n");
        await_ready(&mut port, TIMEOUT).unwrap();
    }

    #[test]
    fn unexpected_line_instead_of_ready_is_fatal() {
        let mut port = FakePort::new("garbage\n");
        let err = await_ready(&mut port, TIMEOUT).unwrap_err();
        assert!(matches!(
            err,
            TransportError::Protocol { expected: "?", got } if got == "garbage"
        ));
    }

    #[test]
    fn frame_interleaves_units_and_durations() {
        let mut out = Vec::new();
        write_frame(&mut out, &[100, 200, 300], 265).unwrap();

        let lines: Vec<&str> = std::str::from_utf8(&out).unwrap().lines().collect();
        assert_eq!(lines[0], "4"); // count is pulses plus one
        assert_eq!(&lines[1..], ["265", "100", "265", "200", "265", "300", "265"]);
    }

    #[test]
    fn full_exchange_writes_wake_marker_and_frame() {
        let mut port = FakePort::new("C\n?\n!\n");
        send_pulses(&mut port, &cmd(), TIMEOUT).unwrap();

        let (pulses, unit) = encode(&cmd());
        let mut expected = String::from("\nR");
        expected.push_str(&format!("{}\n", pulses.len() + 1));
        for pulse in &pulses {
            expected.push_str(&format!("{}\n{}\n", unit, pulse));
        }
        expected.push_str(&format!("{}\n", unit));

        assert_eq!(String::from_utf8(port.written).unwrap(), expected);
    }

    #[test]
    fn missing_done_marker_is_fatal() {
        let mut port = FakePort::new("?\nnope\n");
        let err = send_pulses(&mut port, &cmd(), TIMEOUT).unwrap_err();
        assert!(matches!(err, TransportError::Protocol { expected: "!", .. }));
    }

    #[test]
    fn no_frame_bytes_written_after_handshake_failure() {
        let mut port = FakePort::new("junk\n");
        send_pulses(&mut port, &cmd(), TIMEOUT).unwrap_err();

        // Only the wake byte went out before the failure.
        assert_eq!(port.written, b"\n");
    }

    #[test]
    fn truncated_transcript_reports_eof() {
        let mut port = FakePort::new("?\n");
        let err = send_pulses(&mut port, &cmd(), TIMEOUT).unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[test]
    fn silent_transmitter_times_out() {
        let err = read_line(&mut SilentPort, READY, Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, TransportError::Timeout { expected: "?", .. }));
    }
}
