//! Subcommand runners.
//!
//! Each runner returns a [`RunStatus`] for completed runs and an error only
//! for failures that stopped the run.

use std::path::Path;

use chrono::Utc;
use dbmon_core::discovery::{
    RegionInventory, discover_with_settings, parse_clusters, parse_instances,
};
use dbmon_core::models::DiscoverySettings;
use dbmon_core::{
    DbMonError, FixScriptReporter, OutputFormat, Pipeline, PipelineOutcome, Reporter,
    ResolverConfig, Result, SummaryReporter, normalize, read_documents,
};
use tracing::{info, warn};

use crate::output::{write_document, write_private};
use crate::{DiscoverArgs, RunStatus, TransformArgs, ValidateArgs};

fn log_outcome(outcome: &PipelineOutcome) {
    info!(
        "Processed {} entries: {} emitted, {} excluded",
        outcome.config.entries.len() + outcome.config.rejected.len(),
        outcome.document.len(),
        outcome.excluded.len()
    );
    for excluded in &outcome.excluded {
        info!("Excluded '{}': {}", excluded.name, excluded.reason);
    }
    if outcome.report.error_count() > 0 || outcome.report.warning_count() > 0 {
        warn!(
            "{} error(s), {} warning(s)",
            outcome.report.error_count(),
            outcome.report.warning_count()
        );
    }
}

/// Runs the pipeline and writes (or prints) the canonical document.
///
/// Issues are summarized on stderr so a dry run's stdout holds only the
/// document.
///
/// # Errors
/// Returns fatal pipeline errors and output write failures.
pub async fn transform(args: &TransformArgs) -> Result<RunStatus> {
    info!("Transforming {} input document(s)", args.inputs.len());

    let outcome = Pipeline::new(ResolverConfig::from_env())
        .with_region(args.region.clone())
        .run_paths(&args.inputs)
        .await?;
    log_outcome(&outcome);

    if !outcome.report.issues().is_empty() {
        eprint!(
            "{}",
            SummaryReporter.render(&outcome.report, &outcome.excluded)?
        );
    }

    match (&args.output, args.dry_run) {
        (Some(path), false) => {
            write_document(&outcome.document, path).await?;
            println!("Configuration written to {}", path.display());
            println!("MySQL entries: {}", outcome.document.mysql_databases.len());
            println!(
                "PostgreSQL entries: {}",
                outcome.document.postgresql_databases.len()
            );
        }
        (path, _) => {
            let format = path.as_deref().map(OutputFormat::from_path).unwrap_or_default();
            let document = if args.show_secrets {
                warn!("Dry run output includes plaintext passwords");
                outcome.document.clone()
            } else {
                outcome.document.masked()
            };
            print!("{}", document.render(format)?);
        }
    }

    Ok(RunStatus::from_errors(outcome.has_errors()))
}

/// Runs every stage except writing, prints the report, and optionally
/// writes the remediation script.
///
/// # Errors
/// Returns fatal pipeline errors and script write failures.
pub async fn validate(args: &ValidateArgs) -> Result<RunStatus> {
    info!("Validating {} input document(s)", args.inputs.len());

    let outcome = Pipeline::new(ResolverConfig::from_env())
        .with_region(args.region.clone())
        .offline(args.offline)
        .run_paths(&args.inputs)
        .await?;
    log_outcome(&outcome);

    print!(
        "{}",
        args.format
            .reporter()
            .render(&outcome.report, &outcome.excluded)?
    );

    if args.fix {
        write_fix_script(&outcome, &args.fix_output).await?;
    }

    Ok(RunStatus::from_errors(outcome.has_errors()))
}

async fn write_fix_script(outcome: &PipelineOutcome, path: &Path) -> Result<()> {
    let script = FixScriptReporter::timestamped().render(&outcome.report, &outcome.excluded)?;
    write_private(path, &script).await?;

    let fixable = outcome.report.fixable().count();
    info!("✓ Remediation script written to {}", path.display());
    eprintln!(
        "Wrote {} fix command(s) to {}; review it before running",
        fixable,
        path.display()
    );
    Ok(())
}

async fn read_inventory_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DbMonError::io(format!("Failed to read {}", path.display()), e))
}

/// `discovery` block of the `--config` document, with `--tag-filter`
/// flags taking precedence over its filters.
async fn discovery_settings(args: &DiscoverArgs) -> Result<DiscoverySettings> {
    let mut settings = match &args.config {
        Some(path) => {
            let config = normalize(&read_documents(std::slice::from_ref(path)).await?)?;
            config.discovery.unwrap_or_else(|| {
                warn!("{} has no discovery block; using defaults", path.display());
                DiscoverySettings::default()
            })
        }
        None => DiscoverySettings::default(),
    };
    if !args.tag_filters.is_empty() {
        settings.tag_filters = args.filters();
    }
    Ok(settings)
}

/// Maps saved RDS/Aurora descriptions into an input document.
///
/// Returns without writing anything when the `--config` document disables
/// discovery.
///
/// # Errors
/// Returns a configuration error when neither description file is given,
/// a schema error for unparseable descriptions or config, and I/O errors.
pub async fn discover_resources(args: &DiscoverArgs) -> Result<RunStatus> {
    if args.instances.is_none() && args.clusters.is_none() {
        return Err(DbMonError::configuration(
            "discover needs --instances, --clusters, or both",
        ));
    }

    let settings = discovery_settings(args).await?;
    if !settings.enabled {
        warn!("Discovery is disabled by the configuration; nothing written");
        return Ok(RunStatus::Clean);
    }

    let mut inventory = RegionInventory {
        region: args.region.clone(),
        ..RegionInventory::default()
    };
    if let Some(path) = &args.instances {
        inventory.instances = parse_instances(&read_inventory_file(path).await?)?;
    }
    if let Some(path) = &args.clusters {
        inventory.clusters = parse_clusters(&read_inventory_file(path).await?)?;
    }

    let discovered = discover_with_settings(&[inventory], &settings, Utc::now());
    for skipped in &discovered.skipped {
        warn!(
            "Skipped '{}' in {}: {}",
            skipped.identifier, skipped.region, skipped.reason
        );
    }
    info!(
        "Discovered {} MySQL and {} PostgreSQL resources",
        discovered.document.mysql_databases.len(),
        discovered.document.postgresql_databases.len()
    );

    match &args.output {
        Some(path) => {
            let rendered = discovered.document.render(OutputFormat::from_path(path))?;
            write_private(path, &rendered).await?;
            println!("Discovery output written to {}", path.display());
        }
        None => print!("{}", discovered.document.render(OutputFormat::Yaml)?),
    }

    Ok(RunStatus::Clean)
}
