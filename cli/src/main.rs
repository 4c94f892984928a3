// mixhop — command-line driver for the mix-hop privacy primitives
//
// Transposes keys from hex input and runs the delay queue against a
// simulated clock. No networking.

mod config;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use mixhop_core::{
    CurveKind, KeyPair, KeyTransposer, QueueConfig, RandomQueue, Ristretto, Secp256k1Curve,
    SecureRandomSource, TransposeCurve, TransposeSecret,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mixhop")]
#[command(about = "mixhop — key transposition and randomized delay queue", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a keypair
    Keygen {
        #[arg(long, value_enum)]
        curve: Option<CurveArg>,
    },
    /// Transpose a keypair with a shared secret
    Transpose {
        #[arg(long, value_enum)]
        curve: Option<CurveArg>,
        /// Base public key (hex), for public-only transposition
        #[arg(long, conflicts_with = "private")]
        public: Option<String>,
        /// Base private key (hex)
        #[arg(long)]
        private: Option<String>,
        /// Shared transposition secret
        #[arg(long)]
        secret: String,
        /// Treat the secret as hex rather than text
        #[arg(long)]
        secret_hex: bool,
    },
    /// Push messages through the delay queue on a simulated clock
    Simulate {
        #[arg(short, long, default_value = "1000")]
        messages: u64,
        /// Simulated start time (Unix seconds)
        #[arg(long, default_value = "1700000000")]
        start: u64,
        /// Drain every due slice per poll instead of one
        #[arg(long)]
        catch_up: bool,
        /// Poll interval as a multiple of the granularity
        #[arg(long, default_value = "1")]
        poll_every: u64,
    },
    /// Show the effective configuration
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum CurveArg {
    Ristretto,
    Secp256k1,
}

impl From<CurveArg> for CurveKind {
    fn from(arg: CurveArg) -> Self {
        match arg {
            CurveArg::Ristretto => CurveKind::Ristretto,
            CurveArg::Secp256k1 => CurveKind::Secp256k1,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => config::Config::load_from(path)?,
        None => config::Config::load()?,
    };

    match cli.command {
        Commands::Keygen { curve } => {
            let curve = curve.map(CurveKind::from).unwrap_or(config.curve);
            match curve {
                CurveKind::Ristretto => cmd_keygen(Ristretto),
                CurveKind::Secp256k1 => cmd_keygen(Secp256k1Curve::new()),
            }
        }
        Commands::Transpose {
            curve,
            public,
            private,
            secret,
            secret_hex,
        } => {
            let secret = parse_secret(&secret, secret_hex)?;
            let base = KeyInput::parse(public.as_deref(), private.as_deref())?;
            let curve = curve.map(CurveKind::from).unwrap_or(config.curve);
            match curve {
                CurveKind::Ristretto => cmd_transpose(Ristretto, &base, &secret),
                CurveKind::Secp256k1 => cmd_transpose(Secp256k1Curve::new(), &base, &secret),
            }
        }
        Commands::Simulate {
            messages,
            start,
            catch_up,
            poll_every,
        } => cmd_simulate(&config.queue, messages, start, catch_up, poll_every),
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Raw key bytes from the command line, before a curve is chosen.
enum KeyInput {
    Public(Vec<u8>),
    Private(Vec<u8>),
}

impl KeyInput {
    fn parse(public: Option<&str>, private: Option<&str>) -> Result<Self> {
        match (public, private) {
            (_, Some(private)) => Ok(KeyInput::Private(
                hex::decode(private.trim()).context("Private key is not valid hex")?,
            )),
            (Some(public), None) => Ok(KeyInput::Public(
                hex::decode(public.trim()).context("Public key is not valid hex")?,
            )),
            (None, None) => bail!("One of --public or --private is required"),
        }
    }
}

fn parse_secret(secret: &str, is_hex: bool) -> Result<TransposeSecret> {
    let secret = if is_hex {
        TransposeSecret::new(hex::decode(secret.trim()).context("Secret is not valid hex")?)
    } else {
        TransposeSecret::from(secret)
    };
    if secret.is_empty() {
        bail!("Secret must not be empty");
    }
    Ok(secret)
}

fn cmd_keygen<C: TransposeCurve>(curve: C) -> Result<()> {
    let mut random = SecureRandomSource::from_os()?;
    let pair = KeyPair::generate(&curve, &mut random)?;
    let private = pair
        .private
        .as_ref()
        .context("Generated keypair has no private key")?;

    println!("{} {}", "Curve:".bold(), curve.name());
    println!("  Public:  {}", hex::encode(curve.serialize_point(&pair.public)));
    println!("  Private: {}", hex::encode(curve.serialize_scalar(private)));
    Ok(())
}

fn cmd_transpose<C: TransposeCurve>(
    curve: C,
    base: &KeyInput,
    secret: &TransposeSecret,
) -> Result<()> {
    let pair = match base {
        KeyInput::Public(bytes) => KeyPair::from_public_bytes(&curve, bytes)?,
        KeyInput::Private(bytes) => KeyPair::from_private_bytes(&curve, bytes)?,
    };
    let transposer = KeyTransposer::new(curve);
    let transposed = transposer.transpose(&pair, secret)?;
    let curve = transposer.curve();

    println!("{} {}", "Curve:".bold(), curve.name());
    println!(
        "  Base public:       {}",
        hex::encode(curve.serialize_point(&pair.public))
    );
    println!(
        "  Transposed public: {}",
        hex::encode(curve.serialize_point(&transposed.public)).green()
    );
    if let Some(private) = &transposed.private {
        println!(
            "  Transposed private: {}",
            hex::encode(curve.serialize_scalar(private)).yellow()
        );
    }
    Ok(())
}

fn cmd_simulate(
    queue_config: &QueueConfig,
    messages: u64,
    start: u64,
    catch_up: bool,
    poll_every: u64,
) -> Result<()> {
    if start == 0 {
        bail!("--start must be non-zero (0 means wall clock)");
    }
    if poll_every == 0 {
        bail!("--poll-every must be at least 1");
    }

    let queue = RandomQueue::<u64>::from_config(queue_config.clone())?;
    let window = queue.window_size();
    let granularity = queue.granularity();

    println!("{}", "Simulating delay queue...".bold());
    println!(
        "  Window {}s, granularity {}s, {} slices",
        window,
        granularity,
        queue.rounds()
    );

    for id in 0..messages {
        let send_time = start + id % window;
        queue.add(send_time, id, start)?;
    }
    println!("  {} Queued {} messages", "✓".green(), queue.len());

    let mut delivered = 0u64;
    let mut batches = 0u64;
    let mut largest = 0usize;
    let step = granularity * poll_every;
    let end = start + 2 * window;
    let mut now = start;
    while now < end {
        let batch = if catch_up {
            queue.get_due_queue(now)
        } else {
            queue.get_send_queue(now)
        };
        if !batch.is_empty() {
            batches += 1;
            largest = largest.max(batch.len());
            delivered += batch.len() as u64;
        }
        tracing::debug!(now, released = batch.len(), "Poll");
        now += step;
    }

    println!(
        "  {} Released {} messages in {} batches (largest {})",
        "✓".green(),
        delivered,
        batches,
        largest
    );
    let stranded = queue.len();
    if stranded > 0 {
        println!(
            "  {} {} messages still queued; poll every granularity or use --catch-up",
            "⚠".yellow(),
            stranded
        );
    }
    Ok(())
}
