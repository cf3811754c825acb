use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use structopt::StructOpt;

mod http;
mod registry;
mod worker;

use kaku_shared::link::{PulseTransmitter, SerialLink};
use kaku_shared::protocol::SwitchCommand;
use registry::SwitchRegistry;

#[derive(Debug, StructOpt)]
#[structopt(name = "kaku", about = "KlikAanKlikUit 433MHz switch bridge")]
struct Opt {
    /// Serial device connected to the transmitter. Defaults to the first
    /// detected port, then /dev/ttyUSB0
    #[structopt(long = "device", parse(from_os_str))]
    serial: Option<PathBuf>,
    /// Seconds to wait for each handshake step
    #[structopt(long, default_value = "10")]
    handshake_timeout: u64,
    #[structopt(short, long)]
    debug: bool,
    #[structopt(subcommand)]
    cmd: CliCommand,
}

#[derive(StructOpt, Debug)]
enum CliCommand {
    /// Transmit a single switch command and exit
    Send {
        /// Hardware id of the switch group
        #[structopt(long)]
        hwid: u32,
        /// Channel within the group
        #[structopt(long, default_value = "0")]
        channel: u8,
        /// Address every channel in the group at once
        #[structopt(long)]
        group: bool,
        /// on or off
        state: OnOff,
    },
    /// Run the bridge daemon with the HTTP front-end
    Serve {
        /// Hardware id of the switch group
        #[structopt(long)]
        hwid: u32,
        /// Address for the HTTP front-end
        #[structopt(long, default_value = "127.0.0.1:8080")]
        http_addr: SocketAddr,
    },
}

#[derive(Debug, Clone, Copy)]
enum OnOff {
    On,
    Off,
}

impl FromStr for OnOff {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on" | "1" => Ok(OnOff::On),
            "off" | "0" => Ok(OnOff::Off),
            other => anyhow::bail!("expected on or off, got {:?}", other),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let opt = Opt::from_args();

    let loglevel = if opt.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new().filter_level(loglevel).init();

    let device = opt.serial.unwrap_or_else(default_device);
    let link = SerialLink::new(device)
        .with_step_timeout(Duration::from_secs(opt.handshake_timeout));

    match opt.cmd {
        CliCommand::Send {
            hwid,
            channel,
            group,
            state,
        } => {
            let cmd = SwitchCommand::new(hwid, channel, group, matches!(state, OnOff::On))?;
            send_once(link, cmd)
        }
        CliCommand::Serve { hwid, http_addr } => serve(link, hwid, http_addr),
    }
}

fn default_device() -> PathBuf {
    serialport::available_ports()
        .ok()
        .and_then(|ports| ports.first().map(|port| PathBuf::from(&port.port_name)))
        .unwrap_or_else(|| PathBuf::from("/dev/ttyUSB0"))
}

fn send_once(mut link: SerialLink, cmd: SwitchCommand) -> anyhow::Result<()> {
    log::info!(
        "sending hwid {} channel {} group {} state {}",
        cmd.device_id(),
        cmd.channel(),
        cmd.group(),
        cmd.state(),
    );

    link.transmit(&cmd).context("transmission failed")?;
    log::info!("transmitter confirmed");
    Ok(())
}

fn serve(link: SerialLink, hwid: u32, http_addr: SocketAddr) -> anyhow::Result<()> {
    let registry = Arc::new(SwitchRegistry::new());
    registry.register(hwid);

    let (fatal_tx, fatal_rx) = tokio::sync::oneshot::channel();
    let (queue, worker) = worker::spawn(link, registry.clone(), move |err| {
        let _ = fatal_tx.send(err);
    });

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start http runtime")?;

    let result = runtime.block_on(http::serve(http_addr, queue.clone(), registry, fatal_rx));

    // Runtime first: an enqueue task still running holds a queue handle.
    // Once every sender is gone the queue closes and the worker drains.
    drop(runtime);
    drop(queue);
    if worker.join().is_err() {
        log::error!("transmit worker panicked");
    }

    result
}
