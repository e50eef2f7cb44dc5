//! Command handlers for pushpilot CLI

use crate::wizard::run_init_wizard;
use anyhow::Result;
use clap::Command;
use clap_complete::{generate, Shell as ClapShell};
use pushpilot_core::{
    get_config_path, load_config, validate_config, Connectivity, ControlPlaneClient,
    CreateUploadRequest, ReachabilityProbe,
};
use tabled::{Table, Tabled};

/// Handle init command
pub async fn handle_init() -> Result<()> {
    run_init_wizard().await
}

/// Handle config commands
pub async fn handle_config(action: &str) -> Result<()> {
    match action {
        "show" => {
            println!("Current configuration:");
            println!();

            let config = load_config()?;

            println!("Control plane:");
            println!("  Endpoint: {}", config.control_plane.endpoint);
            println!("  Token ID: {}", mask(&config.control_plane.token_id));
            println!("  Secret key: {}", mask(&config.control_plane.secret_key));
            println!();
            println!("Upload:");
            println!("  Chunk size: {} MiB", config.upload.chunk_size_mb);
            println!("  Max retries: {}", config.upload.max_retries);
            println!(
                "  Retry delay: {}ms (max {}ms)",
                config.upload.retry_delay_ms, config.upload.max_retry_delay_ms
            );
            println!();
            println!("HTTP:");
            println!(
                "  Timeouts: connect {}s, read {}s, write {}s",
                config.http.connect_timeout_secs,
                config.http.read_timeout_secs,
                config.http.write_timeout_secs
            );
            if let Some(logging) = &config.logging {
                println!();
                println!("Logging:");
                println!("  Level: {}", logging.level);
            }

            Ok(())
        }
        "validate" => {
            println!("Validating configuration...");

            let config = load_config()?;

            validate_config(&config)?;
            println!("  ✅ Valid configuration format");

            println!("  Testing control plane reachability...");
            let probe = ReachabilityProbe::for_url(&config.control_plane.endpoint)?;
            match probe.probe_once().await {
                Connectivity::Available => {
                    println!("  ✅ {} is reachable", probe.target());
                }
                Connectivity::Lost => {
                    return Err(anyhow::anyhow!(
                        "Control plane {} is not reachable",
                        probe.target()
                    ));
                }
            }

            Ok(())
        }
        "edit" => {
            let config_path = get_config_path()?;

            println!("Opening editor...");
            println!("  File: {}", config_path.display());
            println!();

            let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
            let status = std::process::Command::new(editor)
                .arg(&config_path)
                .status()?;

            if status.success() {
                println!("  ✅ Configuration edited");

                // Validate after edit
                let config = load_config()?;
                validate_config(&config)?;
                println!("  ✅ Configuration valid");
            } else {
                println!("  ⚠️  Editor exited with error");
            }

            Ok(())
        }
        _ => {
            println!("Unknown action: {}", action);
            println!("Available actions: show, edit, validate");
            Ok(())
        }
    }
}

/// Handle url command
pub async fn handle_url(
    access_policy: &str,
    max_resolution: &str,
    metadata: &[String],
    output: &str,
) -> Result<()> {
    let config = load_config()?;
    validate_config(&config)?;

    let mut request = CreateUploadRequest::default()
        .access_policy(access_policy)
        .max_resolution(max_resolution);
    for entry in metadata {
        let (key, value) = parse_metadata(entry)?;
        request = request.metadata(key, value);
    }

    let client = ControlPlaneClient::from_config(&config.control_plane);
    let upload = client.create_upload(&request).await?;

    match output {
        "json" => {
            println!(
                "{}",
                serde_json::json!({
                    "upload_id": upload.upload_id,
                    "url": upload.url,
                    "access_policy": access_policy,
                    "requested_at": chrono::Utc::now(),
                })
            );
        }
        _ => {
            #[derive(Tabled)]
            struct UrlRow {
                field: String,
                value: String,
            }

            let rows = vec![
                UrlRow {
                    field: "Upload ID".to_string(),
                    value: upload.upload_id.clone().unwrap_or_else(|| "-".to_string()),
                },
                UrlRow {
                    field: "Access policy".to_string(),
                    value: access_policy.to_string(),
                },
                UrlRow {
                    field: "Requested".to_string(),
                    value: chrono::Local::now().format("%Y-%m-%d %H:%M").to_string(),
                },
            ];

            println!("  ✅ Signed URL:");
            println!("  {}", upload.url);
            println!();
            println!("{}", Table::new(rows));
        }
    }

    Ok(())
}

/// Handle doctor commands
pub async fn handle_doctor(action: &str) -> Result<()> {
    match action {
        "check" => {
            println!("Checking pushpilot installation...");

            println!("  ✅ pushpilot is installed");
            println!("  Version: {}", env!("CARGO_PKG_VERSION"));

            // Check config
            let config_path = get_config_path()?;
            if config_path.exists() {
                println!("  ✅ Configuration found");

                let config = load_config()?;
                validate_config(&config)?;
                println!("  ✅ Configuration valid");
            } else {
                println!("  ⚠️  Configuration not found (run 'pushpilot init')");
            }

            Ok(())
        }
        _ => {
            println!("Unknown action: {}", action);
            println!("Available actions: check");
            Ok(())
        }
    }
}

/// Parse a `key=value` metadata entry
fn parse_metadata(entry: &str) -> Result<(String, String)> {
    match entry.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(anyhow::anyhow!(
            "Invalid metadata '{}', expected key=value",
            entry
        )),
    }
}

/// Keep the first characters of a credential, hide the rest
fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}

/// Format bytes to human-readable size
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Handle shell completion generation
pub async fn handle_completion(shell: &str, cmd: &mut Command) -> Result<()> {
    use std::io;

    let clap_shell = match shell {
        "bash" => ClapShell::Bash,
        "zsh" => ClapShell::Zsh,
        "fish" => ClapShell::Fish,
        "elvish" => ClapShell::Elvish,
        "powershell" | "pwsh" => ClapShell::PowerShell,
        _ => {
            return Err(anyhow::anyhow!(
                "Unsupported shell: {}\nSupported shells: bash, zsh, fish, elvish, powershell",
                shell
            ));
        }
    };

    // Generate completion script
    generate(clap_shell, cmd, "pushpilot", &mut io::stdout());

    eprintln!();
    eprintln!("Installation instructions:");

    match shell {
        "bash" => {
            eprintln!("  # Add to your ~/.bashrc:");
            eprintln!("  source <(pushpilot completion bash)");
        }
        "zsh" => {
            eprintln!("  # Add to your ~/.zshrc:");
            eprintln!("  source <(pushpilot completion zsh)");
            eprintln!();
            eprintln!("  # Or for permanent installation:");
            eprintln!("  pushpilot completion zsh > ~/.zsh/completion/_pushpilot");
            eprintln!("  # then add to ~/.zshrc:");
            eprintln!("  fpath=(~/.zsh/completion $fpath)");
            eprintln!("  autoload -U compinit && compinit");
        }
        "fish" => {
            eprintln!("  pushpilot completion fish > ~/.config/fish/completions/pushpilot.fish");
        }
        "elvish" => {
            eprintln!("  pushpilot completion elvish > ~/.elvish/lib/pushpilot.elv");
            eprintln!("  # then add to rc.elv:");
            eprintln!("  use ~/.elvish/lib/pushpilot");
        }
        "powershell" | "pwsh" => {
            eprintln!("  # Run in PowerShell:");
            eprintln!("  pushpilot completion powershell | Out-String | Invoke-Expression");
        }
        _ => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512.00 B");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_bytes(1536), "1.50 KB");
    }

    #[test]
    fn test_parse_metadata() {
        assert_eq!(
            parse_metadata("title = Holiday").unwrap(),
            ("title".to_string(), "Holiday".to_string())
        );
        assert_eq!(
            parse_metadata("empty=").unwrap(),
            ("empty".to_string(), String::new())
        );
        assert!(parse_metadata("novalue").is_err());
        assert!(parse_metadata("=x").is_err());
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask("abcdefgh"), "abcd****");
        assert_eq!(mask("abc"), "****");
    }
}
