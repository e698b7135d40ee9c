use std::time::Duration;

use anyhow::Context as _;
use hijack::{
    runtime::{self, Runtime},
    Receiver,
};
use tokio::{signal, time};
use tracing::{debug, info, warn};

/// How often the attachments are checked and the local addresses and interfaces re-read.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Runtime { conf, .. } = Runtime::new()?;
    runtime::init_tracing(conf.log_level);

    info!(
        event.name = "hijack.starting",
        network.interface.name = %conf.interface,
        all_interfaces = conf.all_interfaces,
        udp.port = conf.port,
        receiver.mode = conf.mode.as_str(),
        config.path = ?conf.config_path,
        "starting receiver"
    );

    let mut receiver = Receiver::start(&conf)
        .with_context(|| format!("starting {} receiver", conf.mode.as_str()))?;

    let mut maintenance = time::interval(MAINTENANCE_INTERVAL);
    maintenance.tick().await;

    info!("receiver running, press Ctrl-C to exit");

    loop {
        tokio::select! {
            datagram = receiver.recv() => {
                let Some(datagram) = datagram else {
                    warn!(event.name = "hijack.receiver_stopped", "receiver stopped unexpectedly");
                    break;
                };
                info!(
                    event.name = "hijack.datagram",
                    source.address = %datagram.src,
                    destination.address = %datagram.dst,
                    datagram.kind = datagram.kind.as_str(),
                    datagram.len = datagram.payload.len(),
                    "received datagram"
                );
            }
            _ = maintenance.tick() => {
                if let Err(e) = receiver.health_check() {
                    warn!(event.name = "hijack.unhealthy", error = %e, "receiver health check failed");
                }
                let addresses = receiver.refresh();
                debug!(
                    event.name = "hijack.refreshed",
                    address.count = addresses,
                    network.interface.count = receiver.interfaces().count(),
                    "refreshed local addresses and interfaces"
                );
            }
            res = signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!(event.name = "hijack.signal_failed", error = %e, "failed to listen for Ctrl-C");
                }
                info!(event.name = "hijack.shutdown", "shutting down");
                break;
            }
        }
    }

    receiver.close();
    Ok(())
}
