//! CLI front-end for the download session: impersonates a client against
//! a remote server and harvests its full quest catalogue to disk.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rand::RngCore;
use tokio::net::TcpStream;
use tracing::{error, info};

use pso_core::cipher::KeyFile;
use pso_core::download::{Config, Credentials, DownloadSession};
use pso_core::family::{ClientFamily, LanguageCode};

/// Operator-local defaults layered in before CLI flags: an optional
/// `pso-download.toml` in the working directory, then `PSO_DOWNLOAD_*`
/// environment variables, mirroring the login server binary's layered
/// startup convention.
#[derive(Debug, Default, serde::Deserialize)]
struct Defaults {
    output_dir: Option<String>,
    #[serde(default)]
    ships: Vec<String>,
}

fn load_defaults() -> Defaults {
    let loaded = config::Config::builder()
        .add_source(config::File::with_name("pso-download").required(false))
        .add_source(config::Environment::with_prefix("PSO_DOWNLOAD"))
        .build();

    match loaded {
        Ok(cfg) => cfg.try_deserialize().unwrap_or_default(),
        Err(_) => Defaults::default(),
    }
}

/// Harvests every quest a remote server offers by impersonating a client.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Remote server endpoint, e.g. `127.0.0.1:9100`.
    endpoint: String,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Client family to emulate.
    #[arg(long, value_enum)]
    version: VersionArg,

    #[arg(long, default_value_t = 1)]
    language: u8,

    #[arg(long)]
    bb_key_file: Option<PathBuf>,

    #[arg(long)]
    serial_number: Option<String>,
    #[arg(long)]
    access_key: Option<String>,
    #[arg(long)]
    username: Option<String>,
    #[arg(long)]
    password: Option<String>,
    #[arg(long)]
    xb_gamertag: Option<String>,
    #[arg(long)]
    xb_user_id: Option<String>,
    #[arg(long)]
    xb_account_id: Option<String>,

    /// Display name of a ship to auto-select; may be repeated.
    #[arg(long = "ship")]
    ships: Vec<String>,

    /// A chat command to send after each completed download; may be repeated.
    #[arg(long = "on-complete-command")]
    on_complete_commands: Vec<String>,

    #[arg(long)]
    interactive: bool,

    #[arg(long)]
    show_command_data: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum VersionArg {
    DcV1,
    DcV2,
    PcV2,
    GcV3,
    XbV3,
    BbV4,
}

impl From<VersionArg> for ClientFamily {
    fn from(v: VersionArg) -> Self {
        match v {
            VersionArg::DcV1 => ClientFamily::DcV1,
            VersionArg::DcV2 => ClientFamily::DcV2,
            VersionArg::PcV2 => ClientFamily::PcV2,
            VersionArg::GcV3 => ClientFamily::GcV3,
            VersionArg::XbV3 => ClientFamily::XbV3,
            VersionArg::BbV4 => ClientFamily::BbV4,
        }
    }
}

fn build_credentials(args: &Args, family: ClientFamily) -> Result<Credentials> {
    if matches!(family, ClientFamily::XbV3) {
        return Ok(Credentials::Xbox {
            gamertag: args.xb_gamertag.clone().context("--xb-gamertag is required for xb-v3")?,
            user_id: args.xb_user_id.clone().context("--xb-user-id is required for xb-v3")?,
            account_id: args.xb_account_id.clone().context("--xb-account-id is required for xb-v3")?,
        });
    }
    if matches!(family, ClientFamily::BbV4) {
        return Ok(Credentials::UserPassword {
            username: args.username.clone().context("--username is required for bb-v4")?,
            password: args.password.clone().context("--password is required for bb-v4")?,
        });
    }
    Ok(Credentials::SerialAccessKey {
        serial_number: args.serial_number.clone().context("--serial-number is required for this version")?,
        access_key: args.access_key.clone().context("--access-key is required for this version")?,
    })
}

fn random_hardware_id() -> u32 {
    rand::thread_rng().next_u32()
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("warning: failed to load .env: {e}");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    let version = args.version;

    match run(args).await {
        Ok(()) => {
            info!("download session complete");
            Ok(())
        }
        Err(e) => {
            error!("[DownloadSession:{version:?}] {e}");
            std::process::exit(exit_code_for(&e));
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(core_err) = err.downcast_ref::<pso_core::CoreError>() {
        match core_err {
            pso_core::CoreError::Auth(_) => 1,
            _ => 2,
        }
    } else {
        2
    }
}

async fn run(args: Args) -> Result<()> {
    info!("==============================================");
    info!("   quest download session v{}", env!("CARGO_PKG_VERSION"));
    info!("==============================================");

    let defaults = load_defaults();
    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| defaults.output_dir.map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("downloaded_quests"));
    let ships: HashSet<String> = if args.ships.is_empty() {
        defaults.ships.into_iter().collect()
    } else {
        args.ships.iter().cloned().collect()
    };

    let family: ClientFamily = args.version.into();
    let credentials = build_credentials(&args, family)?;

    let bb_key_file = match &args.bb_key_file {
        Some(path) => {
            let bytes = std::fs::read(path).with_context(|| format!("reading key file {}", path.display()))?;
            Some(KeyFile::from_bytes(&bytes)?)
        }
        None => None,
    };

    std::fs::create_dir_all(&output_dir).with_context(|| format!("creating output directory {}", output_dir.display()))?;

    let config = Config::new(
        args.endpoint.clone(),
        output_dir,
        family,
        LanguageCode(args.language),
        bb_key_file,
        credentials,
        Vec::new(),
        ships,
        args.on_complete_commands,
        args.interactive,
        args.show_command_data,
    )?;

    info!(endpoint = %args.endpoint, family = ?family, "connecting");
    let stream = TcpStream::connect(&args.endpoint)
        .await
        .with_context(|| format!("connecting to {}", args.endpoint))?;

    let mut session = DownloadSession::new(config, stream, random_hardware_id());
    session.run().await?;
    Ok(())
}
