//! `presence-probe` binary: sign on, probe, report, exit.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use presence_probe::config::{
    DEFAULT_AVATAR, DEFAULT_PAYLOAD_SIZE, DEFAULT_PROBE_COUNT, DEFAULT_TALK_EVERY,
};
use presence_probe::quotes::{resolve_corpus_path, QuoteCorpus, DEFAULT_CORPUS, DEFAULT_CORPUS_DIR};
use presence_probe::{
    probe, LagReporting, PresenceClient, PresenceConfig, Probe, ProbeConfig, WebSocketTransport,
};

/// Synthetic load and latency probe for a presence chat service
#[derive(Parser, Debug)]
#[command(name = "presence-probe", version)]
#[command(about = "Whispers timestamped probes to itself and reports round-trip lag")]
struct Args {
    /// Community URL to connect to
    community_url: String,

    /// Member name to sign on as
    #[arg(short = 'u', long = "user")]
    user: String,

    /// Password for the member
    #[arg(short = 'p', long, default_value = "")]
    password: String,

    /// Seconds between probes
    #[arg(short = 't', long = "interval", default_value_t = 10)]
    interval_secs: u64,

    /// Number of probes to send before exiting
    #[arg(short = 'l', long = "loops", default_value_t = DEFAULT_PROBE_COUNT)]
    loops: u64,

    /// Filler characters per probe
    #[arg(short = 's', long = "size", default_value_t = DEFAULT_PAYLOAD_SIZE)]
    size: usize,

    /// Room to enter instead of the community lobby
    #[arg(short = 'r', long)]
    room: Option<String>,

    /// Avatar image to wear once in the room
    #[arg(short = 'a', long, default_value = DEFAULT_AVATAR)]
    avatar: PathBuf,

    /// Round-trip seconds above which lag is reported
    #[arg(short = 'd', long = "max-lag", default_value_t = 5)]
    max_lag_secs: u64,

    /// Report lag to the log instead of the room
    #[arg(short = 'L', long = "lag-to-log")]
    lag_to_log: bool,

    /// Fortune corpus to quote from
    #[arg(short = 'f', long = "fortune", default_value = DEFAULT_CORPUS)]
    fortune: String,

    /// Directory holding fortune corpora
    #[arg(long, default_value = DEFAULT_CORPUS_DIR)]
    corpus_dir: PathBuf,

    /// Speak a quote every N probes
    #[arg(long, default_value_t = DEFAULT_TALK_EVERY)]
    talk_every: u32,

    /// Seconds to wait for the connection to open
    #[arg(long, default_value_t = 10)]
    connect_timeout: u64,

    /// Seconds to wait for sign-on to complete
    #[arg(long, default_value_t = 30)]
    sign_on_timeout: u64,

    /// Seconds a single outgoing message may take
    #[arg(long, default_value_t = 10)]
    send_timeout: u64,

    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn probe_config(&self) -> ProbeConfig {
        let mut config = ProbeConfig::new(&self.user, &self.password, &self.community_url)
            .with_avatar(&self.avatar)
            .with_interval(Duration::from_secs(self.interval_secs))
            .with_probe_count(self.loops)
            .with_payload_size(self.size)
            .with_max_lag(Duration::from_secs(self.max_lag_secs))
            .with_talk_every(self.talk_every)
            .with_sign_on_timeout(Duration::from_secs(self.sign_on_timeout));
        if let Some(room) = &self.room {
            config = config.with_room(room);
        }
        if self.lag_to_log {
            config = config.with_lag_reporting(LagReporting::Log);
        }
        config
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = args.probe_config();
    info!(
        "{}, loop interval = {}s, loops = {}, msg size = {}",
        config.name,
        config.interval.as_secs(),
        config.probe_count,
        config.payload_size
    );

    let corpus_path = resolve_corpus_path(&args.fortune, &args.corpus_dir);
    let corpus = match QuoteCorpus::load(&corpus_path) {
        Ok(corpus) => corpus,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(1);
        }
    };
    info!(path = %corpus_path.display(), quotes = corpus.len(), "corpus loaded");

    let transport = match WebSocketTransport::connect_with_timeout(
        &config.community_url,
        Duration::from_secs(args.connect_timeout),
    )
    .await
    {
        Ok(transport) => transport,
        Err(e) => {
            error!(url = %config.community_url, "cannot connect: {e}");
            return ExitCode::from(1);
        }
    };

    let client_config =
        PresenceConfig::new().with_send_timeout(Duration::from_secs(args.send_timeout));
    let (mut client, mut events) = PresenceClient::start(transport, client_config);

    let outcome = {
        let mut runner = Probe::new(config, corpus, &client);
        let interrupt = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("cannot listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        };
        probe::run(&mut runner, &mut events, interrupt).await
    };

    if client.is_signed_on() {
        let _ = client.sign_off();
    }
    client.shutdown().await;

    match &outcome {
        probe::ProbeOutcome::Failed(e) => error!("probe failed: {e}"),
        other => info!(?other, "probe finished"),
    }
    outcome.exit_code()
}
