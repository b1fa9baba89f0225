//! Thin CLI over the extraction pipeline.
//!
//! stdout carries only the result (raw API key, or one-line JSON for the
//! download credential) so automation callers can consume it directly; logs
//! and diagnostics go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use nxmkey::extract::{self, Extraction, ExtractionTarget};
use nxmkey::SiteConfig;

/// Fetch Nexus Mods secrets through an authenticated browser session.
///
/// With no positional arguments, prints the account's personal API key.
/// With all three, prints the single-use download credential for that file.
#[derive(Debug, Parser)]
#[command(name = "nxmkey", version, about)]
struct Cli {
    /// Game domain, e.g. "skyrimspecialedition" (omit for API-key mode)
    game_domain: Option<String>,
    /// Mod id within the game domain
    mod_id: Option<u64>,
    /// File id within the mod
    file_id: Option<u64>,

    /// Path to the exported cookies file
    #[arg(long, default_value = "./cookies.json")]
    cookies: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let target = match (cli.game_domain, cli.mod_id, cli.file_id) {
        (None, None, None) => ExtractionTarget::ApiKey,
        (Some(game_domain), Some(mod_id), Some(file_id)) => ExtractionTarget::DownloadKey {
            game_domain,
            mod_id,
            file_id,
        },
        _ => {
            eprintln!("Usage: nxmkey [<gameDomain> <modId> <fileId>] [--cookies <path>]");
            return ExitCode::from(2);
        }
    };

    let config = SiteConfig {
        cookies_path: cli.cookies,
        ..SiteConfig::default()
    };

    match extract::run(&config, &target).await {
        Ok(Extraction::ApiKey(key)) => {
            println!("{key}");
            ExitCode::SUCCESS
        }
        Ok(Extraction::DownloadKey(credential)) => match serde_json::to_string(&credential) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("nxmkey: {e}");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("nxmkey: {e}");
            ExitCode::FAILURE
        }
    }
}
