use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use voicevault::config::Config;
use voicevault::error::Result;
use voicevault::models::fetch::format_bytes;
use voicevault::{CancelToken, InstallEvent, ModelManager};

#[derive(Parser)]
#[command(name = "voicevault")]
#[command(about = "Voice model installer for RVC voice conversion", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List installed voice models
    List,
    /// Download a voice model archive from a URL and install it
    Install {
        /// Link to a zip file containing a .pth model file and an optional .index file
        url: String,
        /// Unique name for the new voice model
        name: String,
    },
    /// Install a voice model from a local zip archive
    Add {
        /// Path to the zip archive
        zip: PathBuf,
        /// Unique name for the new voice model
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::load()?;
    let manager = ModelManager::new(config);

    let outcome = match cli.command {
        Commands::List => {
            for name in manager.list_installed()? {
                println!("{name}");
            }
            return Ok(());
        }
        Commands::Install { url, name } => {
            let bar = stage_bar();
            let cancel = install_cancel_on_ctrl_c();
            let result = manager
                .install_from_url_with_progress(&url, &name, &cancel, |event| {
                    report(&bar, event);
                })
                .await;
            bar.finish_and_clear();
            result
        }
        Commands::Add { zip, name } => {
            let bar = stage_bar();
            let result =
                manager.install_from_local_with_progress(&zip, &name, |event| report(&bar, event));
            bar.finish_and_clear();
            result
        }
    };

    match outcome {
        Ok(message) => {
            println!("✓ {message}");
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn stage_bar() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn report(bar: &ProgressBar, event: InstallEvent) {
    match event {
        InstallEvent::DownloadStarted => bar.set_message("Downloading archive..."),
        InstallEvent::DownloadProgress { bytes } => {
            bar.set_message(format!("Downloading archive... {}", format_bytes(bytes)));
        }
        InstallEvent::ExtractionStarted => bar.set_message("Extracting zip..."),
        InstallEvent::Classifying => bar.set_message("Scanning model files..."),
        InstallEvent::Finalizing => bar.set_message("Finalizing..."),
    }
}

/// Ctrl-C cancels the in-flight download instead of killing the process,
/// so the partial temp file gets cleaned up.
fn install_cancel_on_ctrl_c() -> CancelToken {
    let cancel = CancelToken::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });
    cancel
}
