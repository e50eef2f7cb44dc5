//! Interactive setup wizard for pushpilot configuration

use anyhow::Result;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Password};
use indicatif::{ProgressBar, ProgressStyle};
use pushpilot_core::{
    get_config_path, save_config, validate_config, ConfigFile, ControlPlaneConfig, HttpSettings,
    UploadDefaults,
};

const DEFAULT_ENDPOINT: &str = "https://api.fastpix.io/v1";

/// Run the interactive setup wizard
pub async fn run_init_wizard() -> Result<()> {
    println!("🚀 Welcome to pushpilot setup!\n");

    println!("This wizard will guide you through the configuration process.");
    println!("You will need:");
    println!("  1. The control plane endpoint");
    println!("  2. An access token ID and its secret key\n");

    // Step 1: Endpoint
    let endpoint = prompt_endpoint()?;

    // Step 2: Credentials
    let (token_id, secret_key) = prompt_credentials()?;

    // Step 3: Upload defaults
    let upload = prompt_upload_defaults()?;

    // Summary
    println!("\n📋 Configuration summary:");
    println!("  Endpoint: {}", endpoint);
    println!("  Token ID: {}", token_id);
    println!("  Chunk size: {} MiB", upload.chunk_size_mb);
    println!("  Max retries: {}", upload.max_retries);

    // Confirmation
    let confirm = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Save this configuration?")
        .default(false)
        .interact()?;

    if !confirm {
        println!("❌ Configuration cancelled");
        return Ok(());
    }

    let config = ConfigFile {
        control_plane: ControlPlaneConfig {
            endpoint,
            token_id,
            secret_key,
        },
        upload,
        http: HttpSettings::default(),
        logging: None,
    };
    validate_config(&config)?;

    // Save config
    let pb = ProgressBar::new(2);
    pb.set_style(
        ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    pb.set_message("Saving configuration...");

    save_config(&config)?;

    pb.inc(1);
    pb.finish_with_message("✅ Configuration saved!");

    println!("\n🎉 Setup complete!");
    println!("\nConfiguration saved to: {}", get_config_path()?.display());
    println!("\nYou can now use pushpilot:");
    println!("  $ pushpilot upload video.mp4");
    println!("  $ pushpilot url --output json");
    println!("  $ pushpilot config show");

    Ok(())
}

/// Prompt for the control plane endpoint
fn prompt_endpoint() -> Result<String> {
    Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Control plane endpoint")
        .default(DEFAULT_ENDPOINT.to_string())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.starts_with("https://") || input.starts_with("http://") {
                Ok(())
            } else {
                Err("Endpoint must start with https:// or http://")
            }
        })
        .interact()
        .map_err(|e| anyhow::anyhow!("Failed to get endpoint: {}", e))
}

/// Prompt for the access token pair
fn prompt_credentials() -> Result<(String, String)> {
    let token_id = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Access token ID")
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Access token ID cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact()
        .map_err(|e| anyhow::anyhow!("Failed to get access token ID: {}", e))?;

    let secret_key = Password::with_theme(&ColorfulTheme::default())
        .with_prompt("Secret key")
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.is_empty() {
                Err("Secret key cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact()
        .map_err(|e| anyhow::anyhow!("Failed to get secret key: {}", e))?;

    Ok((token_id.trim().to_string(), secret_key))
}

/// Prompt for chunk size and retry budget
fn prompt_upload_defaults() -> Result<UploadDefaults> {
    let defaults = UploadDefaults::default();

    let chunk_size_mb: u64 = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Chunk size in MiB (5-500)")
        .default(defaults.chunk_size_mb)
        .validate_with(|input: &u64| -> Result<(), &str> {
            if (5..=500).contains(input) {
                Ok(())
            } else {
                Err("Chunk size must be between 5 and 500 MiB")
            }
        })
        .interact()
        .map_err(|e| anyhow::anyhow!("Failed to get chunk size: {}", e))?;

    let max_retries: u32 = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Retries per chunk")
        .default(defaults.max_retries)
        .interact()
        .map_err(|e| anyhow::anyhow!("Failed to get retry count: {}", e))?;

    Ok(UploadDefaults {
        chunk_size_mb,
        max_retries,
        ..defaults
    })
}
