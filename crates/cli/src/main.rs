use anyhow::Result;
use clap::{CommandFactory, Parser};
use color_eyre::config::HookBuilder;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod handlers;
mod upload;
mod wizard;

/// pushpilot - resumable chunked uploads to signed URLs
#[derive(Parser, Debug)]
#[command(name = "pushpilot")]
#[command(author = "Kev <kev@m7academy.com>")]
#[command(version)]
#[command(about = "Upload large files in resumable chunks from your terminal", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Initial setup (interactive wizard)
    Init,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Request a signed upload URL from the control plane
    Url {
        /// Access policy of the resulting media (public, private, drm)
        #[arg(long, default_value = "public")]
        access_policy: String,
        /// Maximum resolution of the resulting media
        #[arg(long, default_value = "2160p")]
        max_resolution: String,
        /// Metadata entry, repeatable (key=value)
        #[arg(short, long = "meta", value_name = "KEY=VALUE")]
        metadata: Vec<String>,
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Upload a file
    Upload {
        /// Local file to upload
        file: PathBuf,
        /// Signed destination URL (requested from the control plane when omitted)
        #[arg(short, long, env = "PUSHPILOT_URL")]
        url: Option<String>,
        /// Chunk size in MiB (5 to 500)
        #[arg(long)]
        chunk_size_mb: Option<u64>,
        /// Retries per range before giving up
        #[arg(long)]
        max_retries: Option<u32>,
        /// Base retry delay in milliseconds
        #[arg(long)]
        retry_delay_ms: Option<u64>,
        /// Watch destination reachability and pause traffic while it is down
        #[arg(long)]
        probe: bool,
    },

    /// Shell completion
    Completion {
        /// Shell type (bash, zsh, fish, elvish, powershell)
        shell: String,
    },

    /// Diagnostics
    Doctor {
        #[command(subcommand)]
        action: DoctorAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Show the current configuration
    Show,
    /// Edit the configuration in $EDITOR
    Edit,
    /// Validate the configuration and credentials
    Validate,
}

#[derive(clap::Subcommand, Debug)]
enum DoctorAction {
    /// Check the installation
    Check,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("pushpilot=debug,pushpilot_core=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = pushpilot_core::load_config()
                .ok()
                .and_then(|config| config.logging)
                .map(|logging| logging.level)
                .unwrap_or_else(|| "warn".to_string());
            EnvFilter::new(format!("pushpilot={0},pushpilot_core={0}", level))
        })
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup error handling
    if let Err(e) = HookBuilder::default().install() {
        eprintln!("Warning: Failed to install error handler: {}", e);
    }

    // Parse CLI arguments
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Execute command
    match cli.command {
        Commands::Init => handlers::handle_init().await,
        Commands::Config { action } => {
            let action_str = match action {
                ConfigAction::Show => "show",
                ConfigAction::Edit => "edit",
                ConfigAction::Validate => "validate",
            };
            handlers::handle_config(action_str).await
        }
        Commands::Url {
            access_policy,
            max_resolution,
            metadata,
            output,
        } => handlers::handle_url(&access_policy, &max_resolution, &metadata, &output).await,
        Commands::Upload {
            file,
            url,
            chunk_size_mb,
            max_retries,
            retry_delay_ms,
            probe,
        } => {
            let args = upload::UploadArgs {
                file,
                url,
                chunk_size_mb,
                max_retries,
                retry_delay_ms,
                probe,
            };
            upload::handle_upload(args).await
        }
        Commands::Completion { shell } => {
            handlers::handle_completion(&shell, &mut Cli::command()).await
        }
        Commands::Doctor { action } => {
            let action_str = match action {
                DoctorAction::Check => "check",
            };
            handlers::handle_doctor(action_str).await
        }
    }
}
