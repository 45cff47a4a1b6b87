#![forbid(unsafe_code)]

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use z21_lan_lib::{BroadcastFlags, StationAddr, Z21Client, DEFAULT_PORT};

#[derive(Parser, Debug)]
#[command(author, version, about = "Z21 command station monitor")]
struct Cli {
    /// Station host name or IP address
    #[arg(short = 'H', long, env = "Z21_HOST")]
    host: String,

    /// Station UDP port
    #[arg(short, long, env = "Z21_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let client = Z21Client::new(StationAddr::new(cli.host, cli.port));

    if let Err(err) = client.connect().await {
        error!(%err, "failed to connect to station");
        std::process::exit(1);
    }
    if let Err(err) = run(&client).await {
        error!(%err, "monitor exited with error");
        std::process::exit(1);
    }
}

async fn run(client: &Z21Client) -> z21_lan_lib::Result<()> {
    let mut events = client.events();
    client.listen()?;

    // Startup sequence: identity, feature code, broadcast subscription,
    // then an initial system-state reading.
    client.lan_get_serial_number().await?;
    client.lan_get_hwinfo().await?;
    client.lan_get_code().await?;
    client
        .lan_set_broadcast_flags(
            BroadcastFlags::DRIVING_AND_SWITCHING | BroadcastFlags::Z21_STATUS_CHANGES,
        )
        .await?;
    client.lan_get_broadcast_flags().await?;
    client.lan_systemstate_getdata().await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(dataset) => info!(?dataset, "event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event stream lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    let status = client.status();
    info!(
        serial = status.serial_number,
        hw_type = status.hw_type,
        fw = %status.fw_version,
        main_current_ma = status.main_current,
        supply_mv = status.supply_voltage,
        "station status at shutdown"
    );
    client.lan_logoff().await?;
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
