//! The single transmit worker and its bounded command queue.

use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use kaku_shared::link::{PulseTransmitter, TransportError};
use kaku_shared::protocol::{SwitchCommand, SwitchToggled};

use crate::registry::SwitchRegistry;

/// Commands that may sit in the queue before producers start blocking.
pub const QUEUE_CAPACITY: usize = 2;

/// Start the transmit worker.
///
/// All serial traffic goes through the returned queue; the worker drains
/// it strictly in order, at most one transmission in flight. Dropping
/// every sender closes the queue and lets the thread drain and exit.
///
/// A transport failure is terminal: the protocol has no way to resume a
/// partial frame, so the worker reports the error through `on_fatal` and
/// stops instead of retrying.
pub fn spawn<T, F>(
    mut transmitter: T,
    registry: Arc<SwitchRegistry>,
    on_fatal: F,
) -> (SyncSender<SwitchToggled>, JoinHandle<()>)
where
    T: PulseTransmitter + Send + 'static,
    F: FnOnce(TransportError) + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(QUEUE_CAPACITY);
    let handle = thread::spawn(move || run(&mut transmitter, rx, &registry, on_fatal));

    (tx, handle)
}

fn run<T, F>(
    transmitter: &mut T,
    queue: Receiver<SwitchToggled>,
    registry: &SwitchRegistry,
    on_fatal: F,
) where
    T: PulseTransmitter,
    F: FnOnce(TransportError),
{
    for event in queue {
        let cmd = match SwitchCommand::try_from(event) {
            Ok(cmd) => cmd,
            Err(err) => {
                log::warn!("dropping unencodable event {:?}: {}", event, err);
                continue;
            }
        };

        log::info!(
            "switching hwid {} channel {} {}",
            event.device_id,
            event.channel,
            if event.state { "on" } else { "off" },
        );

        if let Err(err) = transmitter.transmit(&cmd) {
            log::error!("transmission failed: {}", err);
            on_fatal(err);
            return;
        }

        registry.record(&event);
    }

    log::info!("command queue closed, transmit worker exiting");
}
