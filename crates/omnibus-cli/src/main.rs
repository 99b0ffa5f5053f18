//! `omnibus` — build and verify transit data bundles.
//!
//! # Usage
//!
//! ```
//! omnibus validate --tables data/normalized/routes_fares/2026-08-01/tables \
//!     --source-id routes_fares --version 2026-08-01 \
//!     --report data/validation/routes_fares.json
//! omnibus commit --tables routes_fares=data/.../tables \
//!     --mapping data/.../map_route_source.csv \
//!     --out data/out/transport.sqlite --bundle-id public_transport \
//!     --version 2026-08-01
//! omnibus app --canonical data/out/transport.sqlite --out data/out/app.sqlite
//! ```

mod input;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use omnibus_commit::bundle::BuildRequest;
use omnibus_core::Tables;
use omnibus_validate::{spec_for_source, Validator};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "omnibus", about = "Transit bundle build & verification")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "omnibus.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Run the validation rule engine over one source's canonical tables and
  /// write a JSON report.
  Validate {
    /// Directory of `<table>.csv` canonical tables.
    #[arg(long)]
    tables: PathBuf,
    /// Directory of source-identity mapping tables (sample enrichment).
    #[arg(long)]
    mappings: Option<PathBuf>,
    /// Directory of unresolved side-tables.
    #[arg(long)]
    unresolved: Option<PathBuf>,
    #[arg(long)]
    source_id: String,
    #[arg(long)]
    version: String,
    /// Report output path.
    #[arg(long)]
    report: PathBuf,
  },

  /// Build the canonical bundle from one or more sources' tables.
  Commit {
    /// Table directories as `SOURCE_ID=DIR`, repeatable.
    #[arg(long = "tables", value_name = "SOURCE_ID=DIR", required = true)]
    tables: Vec<String>,
    /// Source-identity mapping CSV for the headway resolver.
    #[arg(long)]
    mapping: Option<PathBuf>,
    /// Validation reports as `SOURCE_ID=PATH`, repeatable.
    #[arg(long = "report", value_name = "SOURCE_ID=PATH")]
    reports: Vec<String>,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    bundle_id: String,
    #[arg(long)]
    version: String,
    /// `map_route_source.source` value the resolver filters on.
    #[arg(long, default_value = "routes_fares")]
    routes_fares_source: String,
  },

  /// Derive the client-facing app view from a finished canonical bundle.
  App {
    #[arg(long)]
    canonical: PathBuf,
    #[arg(long)]
    out: PathBuf,
  },
}

// ─── Configuration ───────────────────────────────────────────────────────────

/// Layered settings: TOML file, then `OMNIBUS_`-prefixed environment
/// variables (e.g. `OMNIBUS_COMMIT__RUN_VACUUM=false`).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Settings {
  validate: omnibus_validate::ValidateConfig,
  commit:   omnibus_commit::CommitConfig,
}

fn load_settings(path: &PathBuf) -> Result<Settings> {
  config::Config::builder()
    .add_source(config::File::from(path.clone()).required(false))
    .add_source(
      config::Environment::with_prefix("OMNIBUS").separator("__"),
    )
    .build()
    .context("failed to read configuration")?
    .try_deserialize()
    .context("failed to deserialise configuration")
}

// ─── Entry point ─────────────────────────────────────────────────────────────

fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  match run(cli) {
    Ok(code) => code,
    Err(err) => {
      tracing::error!("{err:#}");
      ExitCode::from(2)
    }
  }
}

fn run(cli: Cli) -> Result<ExitCode> {
  let settings = load_settings(&cli.config)?;

  match cli.command {
    Command::Validate {
      tables,
      mappings,
      unresolved,
      source_id,
      version,
      report,
    } => {
      let spec = spec_for_source(&source_id).with_context(|| {
        format!("no validation spec registered for source '{source_id}'")
      })?;

      let table_set = input::load_tables_dir(&tables)?;
      let mapping_set = match &mappings {
        Some(dir) => input::load_tables_dir(dir)?,
        None => Tables::new(),
      };
      let unresolved_set = match &unresolved {
        Some(dir) => input::load_tables_dir(dir)?,
        None => Tables::new(),
      };

      let validator = Validator::new(spec, settings.validate.clone());
      let result =
        validator.run(&source_id, &version, &table_set, &unresolved_set, &mapping_set);
      omnibus_validate::write_report(&report, &result)?;

      tracing::info!(
        report = %report.display(),
        errors = result.summary.errors,
        warnings = result.summary.warnings,
        "validation report written"
      );
      if result.failed(settings.validate.fail_on_warn) {
        return Ok(ExitCode::from(1));
      }
      Ok(ExitCode::SUCCESS)
    }

    Command::Commit {
      tables,
      mapping,
      reports,
      out,
      bundle_id,
      version,
      routes_fares_source,
    } => {
      let mut sources = Vec::new();
      for pair in &tables {
        let (source_id, dir) = split_pair(pair)
          .with_context(|| format!("expected SOURCE_ID=DIR, got '{pair}'"))?;
        let set = input::load_tables_dir(&PathBuf::from(dir))?;
        if set.is_empty() {
          tracing::warn!(source_id, dir, "no tables found for source");
          continue;
        }
        sources.push((source_id.to_owned(), set));
      }
      let merged = omnibus_commit::merge_source_tables(
        sources,
        settings.commit.enforce_single_source_per_table,
      )?;
      if merged.is_empty() {
        anyhow::bail!("no canonical tables found for any selected source");
      }

      let mapping_table = match &mapping {
        Some(path) => Some(input::load_table_csv(path)?),
        None => None,
      };

      let mut report_paths = BTreeMap::new();
      for pair in &reports {
        let (source_id, path) = split_pair(pair)
          .with_context(|| format!("expected SOURCE_ID=PATH, got '{pair}'"))?;
        report_paths.insert(source_id.to_owned(), PathBuf::from(path));
      }

      let metadata = omnibus_commit::build_bundle(&BuildRequest {
        tables:  &merged,
        mapping: mapping_table.as_ref(),
        validation_reports: &report_paths,
        cfg: &settings.commit,
        bundle_id:      &bundle_id,
        bundle_version: &version,
        routes_fares_source_id: &routes_fares_source,
        out_path: &out,
      })?;

      tracing::info!(
        out = %out.display(),
        tables = metadata.row_counts.len(),
        headways = metadata.headway_resolution.inserted_rows,
        unresolved = metadata.headway_resolution.unresolved_total(),
        "bundle committed"
      );
      Ok(ExitCode::SUCCESS)
    }

    Command::App { canonical, out } => {
      let metrics =
        omnibus_commit::app::build_app_bundle(&canonical, &out, &settings.commit)?;
      tracing::info!(
        out = %out.display(),
        fare_segments = metrics.fare_segments_rows,
        build_ms = metrics.build_ms,
        "app bundle built"
      );
      Ok(ExitCode::SUCCESS)
    }
  }
}

fn split_pair(pair: &str) -> Option<(&str, &str)> {
  let (left, right) = pair.split_once('=')?;
  (!left.is_empty() && !right.is_empty()).then_some((left, right))
}
