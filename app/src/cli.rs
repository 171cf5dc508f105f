//! Terminal front end for the ingestion commands

use std::time::Duration;

use clap::Subcommand;

use crate::commands;
use crate::error::{CommandResult, ResultExt};
use pantry_core::{AppState, Config, TaskSnapshot};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze every markdown file of a profile and write an artifact
    Run {
        /// Profile name (dishes, tips, starsystem)
        profile: String,
        /// Keep printing progress until the run finishes
        #[arg(long)]
        wait: bool,
    },
    /// List configured profiles
    Profiles,
    /// Summarize the latest artifact of a profile for import
    Import {
        profile: String,
        /// Print the import documents as JSON
        #[arg(long)]
        json: bool,
    },
    /// List artifact files of a profile, newest first
    Artifacts { profile: String },
}

pub async fn execute(command: Command) -> CommandResult<()> {
    let config = Config::load_or_default();
    tracing::info!("Data directory: {:?}", config.data_dir);
    let state = AppState::new(config)?;

    match command {
        Command::Run { profile, wait } => run(&state, &profile, wait).await,
        Command::Profiles => {
            for profile in commands::list_profiles(&state) {
                println!(
                    "{:<12} {}  (keep {}, required: {})",
                    profile.name,
                    profile.directory,
                    profile.max_artifacts,
                    profile.required_fields.join(", ")
                );
            }
            Ok(())
        }
        Command::Import { profile, json } => {
            let preview = commands::prepare_import(&state, &profile)?;
            if json {
                let out = serde_json::to_string_pretty(&preview.documents).internal_err()?;
                println!("{}", out);
                return Ok(());
            }
            println!("Artifact:   {}", preview.artifact_path);
            println!("Processed:  {}", preview.processed_at);
            println!(
                "Importable: {}/{}",
                preview.summary.importable, preview.summary.total
            );
            for skipped in &preview.summary.skipped {
                println!("Skipped:    {} ({})", skipped.file_path, skipped.error);
            }
            Ok(())
        }
        Command::Artifacts { profile } => {
            for artifact in commands::list_artifacts(&state, &profile)? {
                println!("{}", artifact.path);
            }
            Ok(())
        }
    }
}

async fn run(state: &AppState, profile: &str, wait: bool) -> CommandResult<()> {
    let snapshot = commands::start_ingestion(state, profile).await?;
    print_progress(&snapshot);
    // The run lives on this process's runtime, so always wait for it
    wait_for(state, profile, wait).await
}

/// Poll until the profile's run finishes, printing progress when `verbose`.
async fn wait_for(state: &AppState, profile: &str, verbose: bool) -> CommandResult<()> {
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        let snapshot = commands::get_ingestion_progress(state, profile).await?;
        if !snapshot.is_processing {
            break;
        }
        if verbose {
            print_progress(&snapshot);
        }
    }

    match commands::list_artifacts(state, profile)?.first() {
        Some(latest) => println!("Artifact written: {}", latest.path),
        None => println!("Run finished without an artifact"),
    }
    Ok(())
}

fn print_progress(snapshot: &TaskSnapshot) {
    println!(
        "[{:>3}%] {}/{} {}{}",
        snapshot.progress,
        snapshot.current_file,
        snapshot.total_files,
        snapshot.current_file_name,
        if snapshot.errors.is_empty() {
            String::new()
        } else {
            format!("  ({} errors)", snapshot.errors.len())
        }
    );
}
