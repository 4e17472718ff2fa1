/*!
Keepsake CLI - Command-line interface for Keepsake save slots.

This CLI provides utilities for listing, inspecting and cleaning up the slot files a
Keepsake engine writes to a local directory.
*/

use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use keepsake_core::config::{ENV_CIPHER, ENV_DIR, ENV_PASSWORD};
use keepsake_core::{
    init_tracing_with_level, CipherAlgorithm, EncryptionConfig, EngineConfig, LocalFileStorage,
    LogFormat, SaveEngine, SlotInfo, StorageBackend,
};
use std::io::{self, Write};
use std::path::PathBuf;
use tabled::{Table, Tabled};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "keepsake")]
#[command(about = "CLI for Keepsake save slots")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding the slot files
    #[arg(short, long, global = true, env = ENV_DIR, default_value = "./saves")]
    dir: PathBuf,

    /// Cipher the slots were written with (none, xor)
    #[arg(short, long, global = true, env = ENV_CIPHER, default_value = "none")]
    cipher: CipherAlgorithm,

    /// Password for encrypted slots
    #[arg(short, long, global = true, env = ENV_PASSWORD, hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List all slots in the directory
    List,
    /// Decode a slot and show its entries
    Inspect {
        /// Slot name, relative to the directory
        slot: String,
    },
    /// Blank one or more slots, keeping the files
    Erase {
        #[arg(required = true)]
        slots: Vec<String>,
    },
    /// Delete one or more slots
    Delete {
        #[arg(required = true)]
        slots: Vec<String>,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Tabled)]
struct SlotRow {
    #[tabled(rename = "Slot")]
    name: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Modified")]
    modified: String,
}

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Type")]
    type_tag: String,
    #[tabled(rename = "Size")]
    size: String,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_tracing_with_level(LogFormat::Pretty, if cli.verbose { "debug" } else { "warn" })?;

    match &cli.command {
        Commands::List => list_slots(&cli).await?,
        Commands::Inspect { slot } => inspect_slot(&cli, slot).await?,
        Commands::Erase { slots } => erase_slots(&cli, slots).await?,
        Commands::Delete { slots, force } => delete_slots(&cli, slots, *force).await?,
    }

    Ok(())
}

fn engine_config(cli: &Cli) -> EngineConfig {
    EngineConfig::local(&cli.dir).with_encryption(EncryptionConfig {
        algorithm: cli.cipher,
        password: cli.password.clone(),
    })
}

fn build_engine(cli: &Cli) -> Result<SaveEngine, anyhow::Error> {
    SaveEngine::from_config(&engine_config(cli)).context("failed to start the save engine")
}

async fn list_slots(cli: &Cli) -> Result<(), anyhow::Error> {
    info!("Listing slots in {}", cli.dir.display());

    if !cli.dir.exists() {
        println!("No slot directory found at: {}", cli.dir.display());
        return Ok(());
    }

    let slots = LocalFileStorage::new(&cli.dir)
        .list()
        .await
        .with_context(|| format!("failed to list {}", cli.dir.display()))?;

    if slots.is_empty() {
        println!("No slots found");
    } else {
        let rows: Vec<SlotRow> = slots.into_iter().map(slot_row).collect();
        println!("{}", Table::new(rows));
    }

    Ok(())
}

fn slot_row(info: SlotInfo) -> SlotRow {
    SlotRow {
        name: info.name,
        size: format_size(info.size),
        modified: info
            .modified
            .map(format_timestamp)
            .unwrap_or_else(|| "Unknown".to_string()),
    }
}

async fn inspect_slot(cli: &Cli, slot: &str) -> Result<(), anyhow::Error> {
    info!("Inspecting slot: {}", slot);

    let engine = build_engine(cli)?;
    let record = match engine.inspect(slot, None).await {
        Ok(record) => record,
        Err(e) => {
            error!("Failed to decode slot: {}", e);
            return Err(e.into());
        }
    };

    println!("Slot: {slot}");
    if record.is_empty() {
        println!("  (empty)");
        return Ok(());
    }

    let rows: Vec<EntryRow> = record
        .iter()
        .map(|entry| EntryRow {
            key: entry.key.clone(),
            type_tag: entry.data.type_tag.clone(),
            size: format_size(entry.data.encoded_len() as u64),
        })
        .collect();
    println!("{}", Table::new(rows));

    Ok(())
}

async fn erase_slots(cli: &Cli, slots: &[String]) -> Result<(), anyhow::Error> {
    let engine = build_engine(cli)?;
    engine.erase(slots.iter().cloned()).await.into_result()?;
    println!("✓ Erased {} slot(s)", slots.len());
    Ok(())
}

async fn delete_slots(cli: &Cli, slots: &[String], force: bool) -> Result<(), anyhow::Error> {
    if !force && !confirm(&format!("Delete {}?", slots.join(", ")))? {
        println!("Deletion cancelled");
        return Ok(());
    }

    let engine = build_engine(cli)?;
    engine.delete(slots.iter().cloned()).await.into_result()?;
    println!("✓ Deleted {} slot(s)", slots.len());
    Ok(())
}

fn confirm(question: &str) -> Result<bool, anyhow::Error> {
    print!("{question} (y/N): ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_lowercase().starts_with('y'))
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_parse_delete_with_globals() {
        let cli = Cli::try_parse_from([
            "keepsake", "--dir", "/tmp/saves", "--cipher", "xor", "--password", "pw", "delete",
            "a.dat", "b.dat", "--force",
        ])
        .unwrap();

        assert_eq!(cli.dir, PathBuf::from("/tmp/saves"));
        assert_eq!(cli.cipher, CipherAlgorithm::Xor);
        match cli.command {
            Commands::Delete { slots, force } => {
                assert_eq!(slots, ["a.dat", "b.dat"]);
                assert!(force);
            }
            other => panic!("Expected delete command, got {other:?}"),
        }

        let config = engine_config(&Cli::try_parse_from(["keepsake", "list"]).unwrap());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_unknown_cipher_and_empty_erase() {
        assert!(Cli::try_parse_from(["keepsake", "--cipher", "rot13", "list"]).is_err());
        assert!(Cli::try_parse_from(["keepsake", "erase"]).is_err());
    }

    #[test]
    fn test_slot_row_without_timestamp() {
        let row = slot_row(SlotInfo {
            name: "save.dat".to_string(),
            size: 10,
            modified: None,
        });
        assert_eq!(row.size, "10 B");
        assert_eq!(row.modified, "Unknown");
    }
}
