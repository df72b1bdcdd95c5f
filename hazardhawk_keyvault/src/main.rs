//! HazardHawk KeyVault - CLI
//!
//! Command-line interface for credential vault operations.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use tracing_subscriber::EnvFilter;

use hazardhawk_keyvault::{ComplianceLevel, CredentialVault, SecretMetadata, VaultConfig};

#[derive(Parser)]
#[command(name = "hazardhawk-keyvault")]
#[command(version = hazardhawk_keyvault::VERSION)]
#[command(about = "HazardHawk KeyVault - encrypted credential storage")]
struct Cli {
    /// Vault directory (defaults to the platform data dir)
    #[arg(short, long)]
    vault: Option<PathBuf>,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a secret (value is prompted when not given)
    Store {
        key: String,

        #[arg(long)]
        value: Option<String>,

        /// standard | enhanced | critical | regulated_compliant
        #[arg(long)]
        compliance: Option<ComplianceLevel>,
    },

    /// Print a secret
    Get {
        key: String,
    },

    /// Remove a secret
    Remove {
        key: String,
    },

    /// List secret keys
    List,

    /// Remove every secret
    Clear {
        /// Skip confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Show or update secret metadata
    Meta {
        key: String,

        #[arg(long)]
        compliance: Option<ComplianceLevel>,

        /// Tag in key=value form, repeatable
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Export the signed audit trail and purge it from the vault
    AuditExport {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show vault status
    Status,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => VaultConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => VaultConfig::default(),
    };
    if let Some(dir) = cli.vault {
        config.vault_dir = dir;
    }

    let vault = CredentialVault::open(config).await?;

    match cli.command {
        Commands::Store {
            key,
            value,
            compliance,
        } => {
            let value = match value {
                Some(v) => v,
                None => rpassword::prompt_password(format!("Value for '{}': ", key))?,
            };
            let metadata = compliance.map(SecretMetadata::new);
            vault.store(&key, &value, metadata).await?;
            println!("✅ Stored '{}'", key);
        }

        Commands::Get { key } => match vault.get(&key).await? {
            Some(value) => println!("{}", value.expose_secret()),
            None => bail!("no secret stored under '{}'", key),
        },

        Commands::Remove { key } => {
            vault.remove(&key).await?;
            println!("🗑️ Removed '{}'", key);
        }

        Commands::List => {
            let keys = vault.list_keys().await?;
            if keys.is_empty() {
                println!("📭 Vault is empty");
            } else {
                for key in keys {
                    println!("{}", key);
                }
            }
        }

        Commands::Clear { yes } => {
            if !yes {
                let answer = rpassword::prompt_password("Type 'clear' to remove every secret: ")?;
                if answer.trim() != "clear" {
                    bail!("aborted");
                }
            }
            vault.clear_all().await?;
            println!("✅ Vault cleared");
        }

        Commands::Meta {
            key,
            compliance,
            tags,
        } => {
            let Some(mut metadata) = vault.get_metadata(&key).await? else {
                bail!("no secret stored under '{}'", key);
            };

            if compliance.is_some() || !tags.is_empty() {
                if let Some(level) = compliance {
                    metadata.compliance_level = level;
                }
                for tag in tags {
                    let Some((k, v)) = tag.split_once('=') else {
                        bail!("tag '{}' is not in key=value form", tag);
                    };
                    metadata.tags.insert(k.to_string(), v.to_string());
                }
                metadata.updated_at = chrono::Utc::now();
                vault.update_metadata(&key, metadata.clone()).await?;
            }

            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }

        Commands::AuditExport { output } => {
            let export = vault.export_and_purge_audit().await?;
            let json = serde_json::to_string_pretty(&export)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!(
                        "✅ Exported {} events to {}",
                        export.events.len(),
                        path.display()
                    );
                }
                None => println!("{}", json),
            }
        }

        Commands::Status => {
            let status = vault.status().await;
            println!("🔐 HazardHawk KeyVault");
            println!("{:-<40}", "");
            println!("Available:        {}", status.available);
            println!(
                "Protection:       {}",
                status.protection_path.map(|p| p.as_str()).unwrap_or("none")
            );
            println!("Security level:   {}", status.security_level.as_str());
            println!("Platform:         {}", vault.capability().platform_version);
            println!("Secrets:          {}", status.secret_count);
            println!("Audit events:     {}", status.audit_events);
            if let Some(reason) = status.unavailable_reason {
                println!("Reason:           {}", reason);
            }
        }
    }

    Ok(())
}
