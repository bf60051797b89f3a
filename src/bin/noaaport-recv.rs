use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use tracing::info;

use noaaport::avec::{
    self, Archiver, Ingest, LinkStats, LinkStatus,
    config::{ReceiverConfig, ReceiverType},
    server::Server,
    session,
};
use noaaport::sans::{pdi::PdiDecoder, raw::RawDecoder, record::CanonicalRecord};

#[derive(Parser)]
#[command(name = "noaaport-recv", version, about = "Receive GOES DCP messages from a NOAAPORT feed")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Listen for (or connect to) the feed, writing records to stdout.
    Run {
        /// Receiver configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the configured port.
        #[arg(long)]
        port: Option<u16>,
        /// Expect the PDI packet encapsulation.
        #[arg(long)]
        pdi: bool,
    },
    /// Decode a captured feed file, writing records to stdout.
    Replay {
        capture: PathBuf,
        /// The capture holds the PDI packet encapsulation.
        #[arg(long)]
        pdi: bool,
        /// The capture carries sequence numbers.
        #[arg(long, conflicts_with = "pdi")]
        sequenced: bool,
    },
}

/// Writes each record to stdout, one per line.
struct StdoutArchiver {
    out: Mutex<std::io::Stdout>,
}

impl Archiver for StdoutArchiver {
    fn archive(&self, record: CanonicalRecord) {
        let mut out = self.out.lock();
        let _ = out.write_all(&record.to_bytes());
        let _ = out.write_all(b"\n");
    }

    fn set_status(&self, status: LinkStatus) {
        info!(%status, "feed status");
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let archiver = Arc::new(StdoutArchiver {
        out: Mutex::new(std::io::stdout()),
    });

    match Cli::parse().command {
        Command::Run { config, port, pdi } => {
            let mut config = match config {
                Some(path) => ReceiverConfig::load(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => ReceiverConfig::default(),
            };
            if let Some(port) = port {
                config.port = port;
            }
            if pdi {
                config.receiver_type = ReceiverType::Pdi;
            }

            if config.hostname.is_some() {
                session::dial(&config, archiver, Arc::new(LinkStats::default()))?;
            } else {
                let server = Server::bind(config.clone(), archiver)
                    .with_context(|| format!("binding {}", config.listen_addr()))?;
                server.listen()?;
            }
        }

        Command::Replay {
            capture,
            pdi,
            sequenced,
        } => {
            let mut file = std::fs::File::open(&capture)
                .with_context(|| format!("opening {}", capture.display()))?;
            let stats = LinkStats::default();
            let decoder = if pdi {
                either::Right(PdiDecoder::new())
            } else {
                either::Left(RawDecoder::new(sequenced))
            };
            let mut ingest = Ingest::new(decoder, &*archiver, &stats);
            avec::decode_reader(&mut file, &mut ingest, &mut None)?;
            info!(
                archived = stats.archived(),
                dropped = stats.dropped(),
                "replay complete"
            );
        }
    }

    Ok(())
}
