use std::time::Duration;

use clap::{
    Parser,
    Subcommand,
};
use color_eyre::eyre::{
    Error,
    bail,
};
use efb_api_server::{
    api::Api,
    config::{
        Config,
        DEFAULT_LISTEN_ADDRESS,
    },
};
use psx_link::{
    Endpoint,
    PsxClient,
    RegisterCode,
    RegisterShadow,
    Sequencer,
    Transport,
    WireLine,
    pushback::{
        DEFAULT_SESSION_KEY,
        Direction,
        Heading,
    },
    resolver::read_register,
    transport::{
        DEFAULT_HOST,
        DEFAULT_PORT,
    },
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = dotenvy::dotenv();
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    match args.command {
        Command::Serve {
            listen_address,
            psx,
            poll_interval,
            hold_interval,
        } => {
            let shutdown = CancellationToken::new();
            let config = Config {
                poll_interval,
                hold_interval,
                ..psx.config()
            };
            let api = Api::new(config, shutdown.clone());

            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => tracing::info!("received ctrl-c, shutting down"),
                    Err(error) => tracing::error!(?error, "failed to listen for ctrl-c"),
                }
                shutdown.cancel();
            });

            api.serve(listen_address).await?;
        }
        Command::Ping { psx } => {
            let transport = psx.transport();
            transport.ping().await?;
            println!("PSX at {} is reachable", transport.endpoint());
        }
        Command::Send { psx, lines } => {
            let lines: Vec<WireLine> = lines
                .iter()
                .filter_map(|line| WireLine::from_raw(line))
                .collect();
            if lines.is_empty() {
                bail!("no lines to send");
            }
            let response = psx.transport().send_lines(&lines).await?;
            print!("{response}");
        }
        Command::Read { psx, code } => {
            let value = read_register(&psx.transport(), code).await?;
            println!("{code}={value}");
        }
        Command::Status { psx } => {
            let client = PsxClient::new(psx.transport(), RegisterShadow::default());
            client.power().await?;
            client.air().await?;
            client.doors().await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&client.shadow().snapshot())?
            );
        }
        Command::Pushback { psx, action } => {
            // no hold loops here, the process exits right away
            let sequencer = Sequencer::new(psx.transport());
            match action {
                PushbackAction::Start { direction, heading } => {
                    sequencer
                        .start(
                            DEFAULT_SESSION_KEY,
                            direction,
                            Heading::from_degrees(heading)?,
                        )
                        .await?;
                }
                PushbackAction::Stop { heading } => {
                    sequencer
                        .stop(DEFAULT_SESSION_KEY, Heading::from_degrees(heading)?)
                        .await?;
                }
            }
        }
    }

    Ok(())
}

#[derive(Debug, Parser)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP bridge.
    Serve {
        #[clap(short, long, env = "EFB_LISTEN", default_value = DEFAULT_LISTEN_ADDRESS)]
        listen_address: String,

        #[clap(flatten)]
        psx: PsxArgs,

        /// Interval of the status poll.
        #[clap(long, env = "PSX_POLL_INTERVAL", default_value = "5s", value_parser = humantime::parse_duration)]
        poll_interval: Duration,

        /// Interval at which held pushback turns are re-sent.
        #[clap(long, env = "PUSHBACK_HOLD_INTERVAL", default_value = "5s", value_parser = humantime::parse_duration)]
        hold_interval: Duration,
    },
    /// Check that PSX accepts connections.
    Ping {
        #[clap(flatten)]
        psx: PsxArgs,
    },
    /// Send raw Q-lines and print whatever PSX replies.
    Send {
        #[clap(flatten)]
        psx: PsxArgs,

        #[clap(required = true)]
        lines: Vec<String>,
    },
    /// Read a register, e.g. `Qi132`.
    Read {
        #[clap(flatten)]
        psx: PsxArgs,

        code: RegisterCode,
    },
    /// Read and decode power, air and doors.
    Status {
        #[clap(flatten)]
        psx: PsxArgs,
    },
    Pushback {
        #[clap(flatten)]
        psx: PsxArgs,

        #[clap(subcommand)]
        action: PushbackAction,
    },
}

#[derive(Debug, Subcommand)]
enum PushbackAction {
    Start {
        #[clap(short, long)]
        direction: Direction,

        /// Degrees
        #[clap(long, allow_negative_numbers = true)]
        heading: f64,
    },
    Stop {
        /// Degrees
        #[clap(long, allow_negative_numbers = true)]
        heading: f64,
    },
}

#[derive(Debug, clap::Args)]
struct PsxArgs {
    #[clap(long, env = "PSX_HOST", default_value = DEFAULT_HOST)]
    host: String,

    #[clap(long, env = "PSX_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    #[clap(long, env = "PSX_CONNECT_TIMEOUT", default_value = "4s", value_parser = humantime::parse_duration)]
    connect_timeout: Duration,

    /// How long to wait for replies after writing.
    #[clap(long, env = "PSX_GRACE", default_value = "150ms", value_parser = humantime::parse_duration)]
    grace: Duration,
}

impl PsxArgs {
    fn config(&self) -> Config {
        Config {
            psx: Endpoint::new(self.host.clone(), self.port),
            connect_timeout: self.connect_timeout,
            grace: self.grace,
            ..Default::default()
        }
    }

    fn transport(&self) -> Transport {
        self.config().transport(&CancellationToken::new())
    }
}
