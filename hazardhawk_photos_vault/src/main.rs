//! HazardHawk Photos Vault - CLI
//!
//! Command-line interface for content encryption.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use walkdir::WalkDir;

use hazardhawk_keyvault::{CredentialVault, VaultConfig};
use hazardhawk_photos_vault::{
    BatchItem, CompressionHint, ContentEncryptionEngine, EncryptedPayload, EngineConfig,
    KeyPurpose, PayloadKind, ENCRYPTED_EXTENSION,
};

#[derive(Parser)]
#[command(name = "hazardhawk-photos")]
#[command(version = hazardhawk_photos_vault::VERSION)]
#[command(about = "HazardHawk Photos Vault - encrypted evidentiary photos")]
struct Cli {
    /// Credential vault directory holding the content keys
    #[arg(short, long)]
    vault: Option<PathBuf>,

    /// Engine config (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a photo or thumbnail
    Encrypt {
        input: PathBuf,

        /// Output path (defaults to <input>.hhenc)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Photo id (defaults to the file stem)
        #[arg(long)]
        id: Option<String>,

        /// Encrypt as a thumbnail
        #[arg(long)]
        thumbnail: bool,
    },

    /// Decrypt an encrypted payload
    Decrypt {
        input: PathBuf,

        output: PathBuf,
    },

    /// Check payload integrity without writing plaintext
    Verify {
        input: PathBuf,
    },

    /// Encrypt every file under a directory
    EncryptDir {
        dir: PathBuf,

        /// Output directory
        output: PathBuf,
    },

    /// Rotate the active key for a purpose
    Rotate {
        /// photo | thumbnail
        #[arg(long, default_value = "photo")]
        purpose: KeyPurpose,
    },

    /// Print engine metrics for this process
    Metrics,

    /// Show vault, capability and rotation status
    Status,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn open_engine(cli: &Cli) -> anyhow::Result<ContentEncryptionEngine> {
    let vault_config = match &cli.vault {
        Some(dir) => VaultConfig::with_dir(dir),
        None => VaultConfig::default(),
    };
    let engine_config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading engine config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let vault = Arc::new(CredentialVault::open(vault_config).await?);
    Ok(ContentEncryptionEngine::new(vault, engine_config).await?)
}

fn compression_for(path: &Path) -> CompressionHint {
    path.extension()
        .and_then(|e| e.to_str())
        .map(CompressionHint::from_extension)
        .unwrap_or_default()
}

fn content_id_for(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

fn read_payload(path: &Path) -> anyhow::Result<EncryptedPayload> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(EncryptedPayload::from_bytes(&data)?)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let engine = open_engine(&cli).await?;

    match cli.command {
        Commands::Encrypt {
            input,
            output,
            id,
            thumbnail,
        } => {
            let data = std::fs::read(&input)?;
            let id = id.unwrap_or_else(|| content_id_for(&input));
            let compression = compression_for(&input);

            let encrypted = if thumbnail {
                engine.encrypt_thumbnail(&data, &id, compression).await?
            } else {
                engine.encrypt_photo(&data, &id, compression).await?
            };

            let output = output.unwrap_or_else(|| {
                let mut name = input.clone().into_os_string();
                name.push(".");
                name.push(ENCRYPTED_EXTENSION);
                PathBuf::from(name)
            });
            std::fs::write(&output, encrypted.to_bytes()?)?;
            println!("🔐 {} -> {} (key {})", input.display(), output.display(), encrypted.key_id);
        }

        Commands::Decrypt { input, output } => {
            let payload = read_payload(&input)?;
            let plaintext = match payload.kind {
                PayloadKind::Photo => engine.decrypt_photo(&payload).await?,
                PayloadKind::Thumbnail => engine.decrypt_thumbnail(&payload).await?,
            };
            std::fs::write(&output, &plaintext)?;
            println!("✅ Decrypted {} ({} bytes)", output.display(), plaintext.len());
        }

        Commands::Verify { input } => {
            let payload = read_payload(&input)?;
            let ok = match payload.kind {
                PayloadKind::Photo => engine.verify_photo_integrity(&payload).await,
                PayloadKind::Thumbnail => engine.verify_thumbnail_integrity(&payload).await,
            };
            if !ok {
                bail!("integrity check failed for {}", input.display());
            }
            println!("💚 {} is intact", input.display());
        }

        Commands::EncryptDir { dir, output } => {
            let files: Vec<PathBuf> = WalkDir::new(&dir)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .collect();
            if files.is_empty() {
                println!("📭 No files under {}", dir.display());
                return Ok(());
            }

            let mut items = Vec::with_capacity(files.len());
            for path in &files {
                let relative = path.strip_prefix(&dir).unwrap_or(path);
                items.push(
                    BatchItem::new(std::fs::read(path)?, relative.to_string_lossy())
                        .with_compression(compression_for(path)),
                );
            }

            let bar = ProgressBar::new(files.len() as u64);
            bar.set_style(
                ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            let progress = |current: usize, _total: usize| bar.set_position(current as u64);

            let encrypted = engine
                .encrypt_photo_batch(items, Some(&progress), None)
                .await?;
            bar.finish_with_message("done");

            std::fs::create_dir_all(&output)?;
            for (path, payload) in files.iter().zip(&encrypted) {
                let relative = path.strip_prefix(&dir).unwrap_or(path);
                let mut target = output.join(relative).into_os_string();
                target.push(".");
                target.push(ENCRYPTED_EXTENSION);
                let target = PathBuf::from(target);
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&target, payload.to_bytes()?)?;
            }

            let metrics = engine.get_encryption_metrics();
            println!(
                "✅ Encrypted {} files ({} bytes, avg {:.2} ms)",
                encrypted.len(),
                metrics.bytes_encrypted,
                metrics.average_latency_ms
            );
        }

        Commands::Rotate { purpose } => {
            let Some(old) = engine.active_key_id(purpose).await? else {
                bail!("no active {} key to rotate", purpose.as_str());
            };
            let rotation = engine.rotate_encryption_key(&old).await?;
            println!("🔄 Rotated {} key", purpose.as_str());
            println!("   Old: {}", rotation.old_key_id);
            println!("   New: {}", rotation.new_key_id);
        }

        Commands::Metrics => {
            println!(
                "{}",
                serde_json::to_string_pretty(&engine.get_encryption_metrics())?
            );
        }

        Commands::Status => {
            let capability = engine.capability();
            println!("📊 HazardHawk Photos Vault");
            println!("{:-<40}", "");
            println!("Security level:   {}", capability.level.as_str());
            println!("Hardware-backed:  {}", capability.hardware_backed);
            println!("Platform:         {}", capability.platform_version);
            for purpose in KeyPurpose::ALL {
                if engine.active_key_id(purpose).await?.is_none() {
                    println!("{:<17} no active key", format!("{}:", purpose.as_str()));
                    continue;
                }
                let status = engine.rotation_status(purpose).await?;
                println!(
                    "{:<17} {} ({} days to rotation{})",
                    format!("{}:", purpose.as_str()),
                    status.active_key_id,
                    status.days_remaining,
                    if status.warning { ", rotate soon" } else { "" }
                );
            }
        }
    }

    Ok(())
}
