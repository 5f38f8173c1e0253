//! Entry point for `link-arq`.
//!
//! Parses CLI arguments and dispatches into **send**, **recv** or
//! **make-data** mode. All protocol work is delegated to library modules;
//! `main.rs` owns only process setup (logging, argument parsing, sockets and
//! files).

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::net::{TcpListener, TcpStream};

use link_arq::config::{ArqConfig, Protocol};
use link_arq::payload::{self, LineSink, LineSource};
use link_arq::simulator::SimulatorConfig;

/// Sliding-window ARQ over a simulated unreliable link.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Accept one connection and send every line of a file as a payload.
    Send {
        #[command(flatten)]
        link: LinkArgs,
        /// Local address to listen on.
        #[arg(short, long, default_value = "0.0.0.0:8000")]
        listen: String,
        /// File whose lines are sent.
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Connect to a sender and write each delivered payload as a line.
    Recv {
        #[command(flatten)]
        link: LinkArgs,
        /// Sender address.
        #[arg(short, long, default_value = "127.0.0.1:8000")]
        connect: String,
        /// File to write delivered payloads to.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Write random newline-free test payloads, one per line.
    MakeData {
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, default_value_t = 10)]
        count: usize,
        #[arg(long, default_value_t = 10)]
        min_len: usize,
        #[arg(long, default_value_t = 120)]
        max_len: usize,
        #[arg(long, default_value_t = 12345)]
        seed: u64,
    },
}

/// Engine and channel flags shared by `send` and `recv`.
#[derive(Args)]
struct LinkArgs {
    /// sw | gbn | sr
    #[arg(short, long, default_value = "gbn")]
    protocol: Protocol,
    /// Per-bit error probability on outbound datagrams.
    #[arg(long, default_value_t = 0.0)]
    ber: f64,
    /// Maximum simulated one-way delay.
    #[arg(long, default_value_t = 0)]
    max_delay_ms: u64,
    /// Whole-datagram loss probability.
    #[arg(long, default_value_t = 0.0)]
    loss: f64,
    /// Window size (defaults: sw 1, gbn 4, sr 4).
    #[arg(short, long)]
    window: Option<usize>,
    /// Initial retransmission timeout.
    #[arg(long, default_value_t = 1000)]
    rto_ms: u64,
    /// Seed for the channel simulator.
    #[arg(long)]
    seed: Option<u64>,
    /// Give up after this many retransmissions of one frame.
    #[arg(long)]
    max_retries: Option<u32>,
    /// Selective-Repeat deadline sweep interval.
    #[arg(long, default_value_t = 10)]
    poll_ms: u64,
}

impl LinkArgs {
    fn config(&self) -> ArqConfig {
        ArqConfig {
            simulator: SimulatorConfig {
                bit_error_rate: self.ber,
                max_delay: Duration::from_millis(self.max_delay_ms),
                loss_rate: self.loss,
                seed: self.seed,
            },
            window_size: self.window,
            initial_rto: Duration::from_millis(self.rto_ms),
            poll_interval: Duration::from_millis(self.poll_ms),
            max_retries: self.max_retries,
            ..ArqConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    if let Mode::Send { link, .. } | Mode::Recv { link, .. } = &cli.mode {
        let sim = link.config().simulator;
        if !sim.is_ideal() {
            log::info!(
                "Channel: ber={} max_delay={}ms loss={}",
                sim.bit_error_rate,
                sim.max_delay.as_millis(),
                sim.loss_rate
            );
        }
    }

    match cli.mode {
        Mode::Send { link, listen, input } => {
            let config = link.config();
            config.validate(link.protocol)?;
            let file = File::open(&input).with_context(|| format!("opening {}", input.display()))?;

            let listener = TcpListener::bind(&listen)
                .await
                .with_context(|| format!("binding {listen}"))?;
            log::info!("Listening on {listen} ({})", link.protocol);
            let (stream, peer) = listener.accept().await?;
            log::info!("Receiver connected from {peer}");

            let mut source = LineSource::new(BufReader::new(file));
            let report = link_arq::run_sender(stream, link.protocol, &config, &mut source).await?;
            println!("{report:#?}");
            if let Some(e) = source.take_error() {
                return Err(e).with_context(|| {
                    format!("reading {} failed after {} payloads", input.display(), report.payloads)
                });
            }
        }
        Mode::Recv { link, connect, output } => {
            let config = link.config();
            config.validate(link.protocol)?;
            let file =
                File::create(&output).with_context(|| format!("creating {}", output.display()))?;

            let stream = TcpStream::connect(&connect)
                .await
                .with_context(|| format!("connecting to {connect}"))?;
            log::info!("Connected to {connect} ({})", link.protocol);

            let sink = LineSink::new(BufWriter::new(file));
            let report = link_arq::run_receiver(stream, link.protocol, &config, sink).await?;
            println!("{report:#?}");
        }
        Mode::MakeData {
            output,
            count,
            min_len,
            max_len,
            seed,
        } => {
            let mut rng = StdRng::seed_from_u64(seed);
            let data = payload::generate(&mut rng, count, min_len, max_len);
            let file =
                File::create(&output).with_context(|| format!("creating {}", output.display()))?;
            payload::write_lines(BufWriter::new(file), &data)?;
            log::info!("Wrote {count} payloads to {}", output.display());
        }
    }
    Ok(())
}
