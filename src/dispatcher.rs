//! Command dispatcher that routes parsed CLI commands to their handlers.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::anchor::TimeAnchor;
use crate::cli::formatters;
use crate::cli::{CacheCommands, Commands};
use crate::config::Config;
use crate::export;
use crate::pricing::source_from_config;
use crate::returns::ReturnPeriod;
use crate::snapshot::{BuildEvent, BuildOptions, SnapshotBuilder, SnapshotReport};
use crate::store::{SnapshotStore, StoreKey};

/// Route a parsed command to its handler
pub async fn dispatch_command(command: Commands, config: &Config, json_output: bool) -> Result<()> {
    match command {
        Commands::Show { as_of, refresh } => {
            dispatch_show(config, as_of.as_deref(), refresh, json_output).await
        }
        Commands::Export {
            as_of,
            refresh,
            csv,
            json_out,
        } => {
            let anchor = resolve_anchor(config, as_of.as_deref())?;
            let report = load_report(config, anchor, refresh, !json_output).await?;
            let csv_path = csv.unwrap_or_else(|| {
                export::default_csv_path(&config.output_dir, report.snapshot.as_of)
            });
            export::export_csv(&csv_path, &report.snapshot)?;
            if let Some(path) = &json_out {
                export::export_json(path, &report)?;
            }

            if json_output {
                let summary = serde_json::json!({
                    "csv": csv_path,
                    "json": json_out,
                    "records": report.snapshot.records.len(),
                    "warnings": report.warnings,
                });
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{} CSV written to {}", "✓".green().bold(), csv_path.display());
                if let Some(path) = &json_out {
                    println!("{} JSON written to {}", "✓".green().bold(), path.display());
                }
                if !report.warnings.is_empty() {
                    print!("{}", formatters::format_warnings(&report.warnings));
                }
            }
            Ok(())
        }
        Commands::Anchors { as_of } => dispatch_anchors(config, as_of.as_deref(), json_output),
        Commands::Instruments => {
            if json_output {
                println!("{}", serde_json::to_string_pretty(&config.instruments)?);
            } else {
                print!("{}", formatters::format_instruments_table(config));
            }
            Ok(())
        }
        Commands::Cache { action } => match action {
            CacheCommands::Clear => {
                let store = open_store(config)?;
                let removed = store.clear()?;
                if json_output {
                    println!("{}", serde_json::json!({ "removed": removed }));
                } else if removed {
                    println!("{} Cleared cached snapshot", "✓".green().bold());
                } else {
                    println!("{} No cached snapshot", "ℹ".blue().bold());
                }
                Ok(())
            }
        },
    }
}

async fn dispatch_show(
    config: &Config,
    as_of: Option<&str>,
    refresh: bool,
    json_output: bool,
) -> Result<()> {
    let anchor = resolve_anchor(config, as_of)?;
    let report = load_report(config, anchor, refresh, !json_output).await?;

    if json_output {
        println!("{}", formatters::format_report_json(&report));
    } else {
        print!("{}", formatters::format_snapshot_table(&report));
    }
    Ok(())
}

fn dispatch_anchors(config: &Config, as_of: Option<&str>, json_output: bool) -> Result<()> {
    let anchor = resolve_anchor(config, as_of)?;
    let dates = anchor.reference_dates()?;

    if json_output {
        let by_label: BTreeMap<ReturnPeriod, NaiveDate> = dates
            .iter()
            .map(|(period, at)| (*period, at.date_naive()))
            .collect();
        let value = serde_json::json!({
            "as_of": anchor.today(),
            "timezone": anchor.timezone().name(),
            "reference_dates": by_label,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print!("{}", formatters::format_anchor_table(&anchor, &dates));
    }
    Ok(())
}

/// Today in the configured zone, or the parsed `--as-of` date.
pub fn resolve_anchor(config: &Config, as_of: Option<&str>) -> Result<TimeAnchor> {
    let tz = config.tz()?;
    match as_of {
        Some(input) => TimeAnchor::parse_as_of(input, tz)
            .with_context(|| format!("Invalid --as-of value '{}'", input)),
        None => Ok(TimeAnchor::now_in(tz)),
    }
}

fn open_store(config: &Config) -> Result<SnapshotStore> {
    SnapshotStore::open_default(config.cache_ttl())
}

/// Reuse a fresh cached snapshot or build a new one and cache it.
pub async fn load_report(
    config: &Config,
    anchor: TimeAnchor,
    refresh: bool,
    show_progress: bool,
) -> Result<SnapshotReport> {
    let store = open_store(config)?;
    let key = StoreKey::new(anchor.today(), config);

    if !refresh {
        if let Some(report) = store.load_fresh(&key)? {
            return Ok(report);
        }
    }

    let source = source_from_config(config)?;
    let builder = SnapshotBuilder::new(anchor, BuildOptions::from(config))
        .with_priority(config.priority.clone());

    let pb = if show_progress {
        let pb = ProgressBar::new(config.instruments.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let result = builder
        .build_with_progress(&config.instruments, source, |event| match event {
            BuildEvent::Started { total } => pb.set_length(*total as u64),
            BuildEvent::Fetched {
                instrument,
                completed,
                ..
            } => {
                pb.set_position(*completed as u64);
                pb.set_message(instrument.clone());
            }
        })
        .await;
    pb.finish_and_clear();
    let report = result?;

    if let Err(e) = store.save(&key, &report) {
        warn!("Could not cache snapshot: {:#}", e);
    } else {
        info!("Cached snapshot at {:?}", store.path());
    }
    Ok(report)
}
