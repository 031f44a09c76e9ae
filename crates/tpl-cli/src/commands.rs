use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::json;
use tpl_config::{ConfigOverrides, DataDbConfig, LoaderConfig, RunMode, SourceConfig};
use tpl_loader::{
    source_for, validate_dataset, ImportSummary, LoadedIdTracker, StorDbImporter, TpWriter,
    WriteOptions, WriteSummary,
};
use tpl_reload::{InvalidationPlan, InvalidationReport, Orchestrator, PassState, StepOutcome};
use tpl_store::{current_versions, version_drift, DataStore, DirDataStore, InMemoryDataStore};
use tpl_types::{EntityCategory, TpDataset};
use tracing::{info, warn};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let verbose = cli.verbose;
    let format = cli.format;
    let config_path = cli.config_path.clone();
    match cli.into_command() {
        Command::Load(args) => {
            let config = build_config(config_path, args.overrides(verbose))?;
            let outcome = cmd_load(&config).await?;
            print_load(&config, &outcome, format);
            Ok(())
        }
        Command::Import(args) => {
            let config = build_config(config_path, args.overrides(verbose))?;
            let summary = cmd_import(&config, &args.stordb_path, args.flush_stordb)?;
            print_import(&summary, &args.stordb_path, format);
            Ok(())
        }
        Command::Reload(args) => {
            let config = build_config(config_path, args.overrides(verbose))?;
            let report = cmd_reload(&config).await;
            print_report(&report, format);
            Ok(())
        }
        Command::Versions(args) => {
            let overrides = ConfigOverrides {
                datadb_path: args.datadb_path,
                ..Default::default()
            };
            let config = build_config(config_path, overrides)?;
            cmd_versions(&config, format)
        }
    }
}

fn build_config(
    path: Option<PathBuf>,
    overrides: ConfigOverrides,
) -> anyhow::Result<LoaderConfig> {
    LoaderConfig::load(path.as_deref())
        .and_then(|base| base.with_overrides(overrides))
        .and_then(LoaderConfig::validate)
        .context("invalid configuration")
}

fn open_store(config: &DataDbConfig) -> anyhow::Result<Box<dyn DataStore>> {
    match &config.path {
        Some(path) => {
            let store = DirDataStore::open(path)
                .with_context(|| format!("cannot open data store at {}", path.display()))?;
            Ok(Box::new(store))
        }
        None => {
            warn!("no data store path configured, keeping data in memory");
            Ok(Box::new(InMemoryDataStore::new()))
        }
    }
}

/// What a load pass did.
#[derive(Debug)]
pub struct LoadOutcome {
    pub state: PassState,
    pub stats: BTreeMap<EntityCategory, usize>,
    pub summary: Option<WriteSummary>,
    pub report: Option<InvalidationReport>,
}

pub async fn cmd_load(config: &LoaderConfig) -> anyhow::Result<LoadOutcome> {
    let mut state = PassState::Idle;
    let source = source_for(&config.source, &config.tpid);
    info!(source = %source.describe(), "reading tariff plan");
    let dataset = source
        .read()
        .with_context(|| format!("cannot read tariff plan from {}", source.describe()))?;
    state = state.advance();

    let mut outcome = LoadOutcome {
        state,
        stats: dataset.stats(),
        summary: None,
        report: None,
    };
    let store = if config.dry_run {
        None
    } else {
        Some(open_store(&config.data_db)?)
    };
    if config.check_references && config.mode == RunMode::Load {
        check_references(&dataset, store.as_deref())?;
    }
    let Some(store) = store else {
        info!(records = dataset.len(), "dry run, nothing written");
        return Ok(outcome);
    };

    let mut tracker = LoadedIdTracker::for_config(config);
    let writer = TpWriter::new(store.as_ref(), WriteOptions::from_config(config));
    let summary = match config.mode {
        RunMode::Load => writer.write_to_store(&dataset, &mut tracker),
        RunMode::Remove => writer.remove_from_store(&dataset, &mut tracker),
    }
    .context("cannot write tariff plan")?;
    outcome.state = outcome.state.advance();
    outcome.summary = Some(summary);

    if config.mode == RunMode::Remove {
        info!("removal does not reload caches; run `tpl-loader reload` if needed");
        return Ok(outcome);
    }

    let report = Orchestrator::from_config(config)
        .run(tracker.into_loaded().as_ref(), config.flush)
        .await;
    outcome.state = report.final_state;
    outcome.report = Some(report);
    Ok(outcome)
}

/// Fail when records name records that are neither loaded nor in `store`.
fn check_references(dataset: &TpDataset, store: Option<&dyn DataStore>) -> anyhow::Result<()> {
    let report = validate_dataset(dataset, store).context("cannot validate tariff plan")?;
    if !report.is_valid() {
        let issues: Vec<_> = report.issues.iter().map(ToString::to_string).collect();
        bail!(
            "tariff plan failed validation with {} issue(s): {}",
            issues.len(),
            issues.join("; ")
        );
    }
    info!(records = dataset.len(), "tariff plan references are consistent");
    Ok(())
}

/// Read the files source and stage it under `<stordb>/<tpid>/`.
pub fn cmd_import(
    config: &LoaderConfig,
    stordb: &Path,
    flush: bool,
) -> anyhow::Result<ImportSummary> {
    if !matches!(config.source, SourceConfig::Files { .. }) {
        bail!("import reads tariff plan files; pass --path");
    }
    let source = source_for(&config.source, &config.tpid);
    info!(source = %source.describe(), stordb = %stordb.display(), "importing tariff plan");
    let dataset = source
        .read()
        .with_context(|| format!("cannot read tariff plan from {}", source.describe()))?;
    if config.check_references {
        check_references(&dataset, None)?;
    }
    StorDbImporter::new(stordb, config.tpid.as_str())
        .import(&dataset, flush)
        .context("cannot stage tariff plan")
}

pub async fn cmd_reload(config: &LoaderConfig) -> InvalidationReport {
    let orchestrator = Orchestrator::from_config(config);
    if !orchestrator.is_enabled() {
        return orchestrator.run(None, config.flush).await;
    }
    orchestrator
        .execute(InvalidationPlan::reload_all(config.flush))
        .await
}

fn cmd_versions(config: &LoaderConfig, format: OutputFormat) -> anyhow::Result<()> {
    let store = open_store(&config.data_db)?;
    let stored = store.versions().context("cannot read schema versions")?;

    if format == OutputFormat::Json {
        let drift: Vec<_> = stored
            .as_ref()
            .map(version_drift)
            .unwrap_or_default()
            .into_iter()
            .map(|d| json!({ "subsystem": d.subsystem, "current": d.current, "stored": d.stored }))
            .collect();
        let out = json!({ "stored": stored, "current": current_versions(), "drift": drift });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let Some(stored) = stored else {
        println!("{} No schema version record in the data store.", "!".yellow().bold());
        return Ok(());
    };
    let drift = version_drift(&stored);
    for (subsystem, current) in current_versions() {
        let found = stored.get(&subsystem).copied();
        let mark = if found == Some(current) {
            "✓".green()
        } else {
            "✗".red()
        };
        let found = found.map_or_else(|| "-".to_string(), |v| v.to_string());
        println!("  {mark} {:<22} {found:>3} (current {current})", subsystem);
    }
    if drift.is_empty() {
        println!("{} Schema versions are current.", "✓".green().bold());
    } else {
        println!("{} {} subsystem(s) need migration.", "✗".red().bold(), drift.len());
    }
    Ok(())
}

fn print_load(config: &LoaderConfig, outcome: &LoadOutcome, format: OutputFormat) {
    if format == OutputFormat::Json {
        let out = json!({
            "tpid": config.tpid,
            "state": outcome.state.to_string(),
            "stats": category_map(&outcome.stats),
            "load_id": outcome.summary.as_ref().map(|s| s.load_id.to_string()),
            "written": outcome.summary.as_ref().map(|s| category_map(&s.counts)),
            "invalidation": outcome.report.as_ref().map(report_json),
        });
        println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
        return;
    }

    if config.stats || config.dry_run {
        println!("Tariff plan statistics:");
        for (category, count) in &outcome.stats {
            println!("  {:<24} {count}", category.as_str());
        }
    }
    if config.dry_run {
        println!("{} Dry run, nothing written.", "✓".green().bold());
        return;
    }
    if let Some(summary) = &outcome.summary {
        let action = match config.mode {
            RunMode::Load => "Loaded",
            RunMode::Remove => "Removed",
        };
        let tpid = if config.tpid.is_empty() { "tariff plan" } else { config.tpid.as_str() };
        println!(
            "{} {} {} ({} records, load {})",
            "✓".green().bold(),
            action,
            tpid.bold(),
            summary.total(),
            summary.load_id.short_id().as_str().yellow()
        );
        if config.verbose {
            for (category, count) in &summary.counts {
                println!("  {:<24} {count}", category.as_str());
            }
        }
    }
    if let Some(report) = &outcome.report {
        print_report(report, format);
    }
}

fn print_report(report: &InvalidationReport, format: OutputFormat) {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report_json(report)).unwrap_or_default());
        return;
    }
    if report.plan.is_none() {
        let reason = report
            .steps
            .iter()
            .find_map(|s| match &s.outcome {
                StepOutcome::Skipped { reason } => Some(reason.as_str()),
                _ => None,
            })
            .unwrap_or("nothing to reload");
        println!("{} Cache invalidation skipped: {reason}.", "!".yellow().bold());
        return;
    }
    println!("Cache invalidation:");
    for step in &report.steps {
        let line = match &step.outcome {
            StepOutcome::Completed => format!("{} done", "✓".green()),
            StepOutcome::Skipped { reason } => format!("{} skipped ({reason})", "-".dimmed()),
            StepOutcome::Failed { error } => format!("{} failed: {error}", "✗".red()),
        };
        println!("  {:<18} {line}", step.name);
    }
}

fn print_import(summary: &ImportSummary, stordb: &Path, format: OutputFormat) {
    let dir = stordb.join(&summary.tpid);
    if format == OutputFormat::Json {
        let out = json!({
            "tpid": summary.tpid,
            "stordb": dir,
            "flushed": summary.flushed,
            "imported": category_map(&summary.counts),
        });
        println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
        return;
    }
    println!(
        "{} Staged {} ({} records) in {}",
        "✓".green().bold(),
        summary.tpid.as_str().bold(),
        summary.total(),
        dir.display()
    );
}

fn report_json(report: &InvalidationReport) -> serde_json::Value {
    let steps: Vec<_> = report
        .steps
        .iter()
        .map(|s| {
            let (status, detail) = match &s.outcome {
                StepOutcome::Completed => ("completed", None),
                StepOutcome::Skipped { reason } => ("skipped", Some(reason.as_str())),
                StepOutcome::Failed { error } => ("failed", Some(error.as_str())),
            };
            json!({ "step": s.name, "status": status, "detail": detail })
        })
        .collect();
    let plan = report.plan.as_ref().map(|p| {
        json!({
            "flush_all": p.flush_all,
            "categories": p.categories().map(|c| c.as_str()).collect::<Vec<_>>(),
            "index_keys": p.index_keys(),
        })
    });
    json!({ "plan": plan, "steps": steps, "state": report.final_state.to_string() })
}

fn category_map(counts: &BTreeMap<EntityCategory, usize>) -> serde_json::Value {
    counts
        .iter()
        .map(|(category, count)| (category.as_str().to_string(), json!(count)))
        .collect::<serde_json::Map<_, _>>()
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;

    fn write_plan(dir: &Path) {
        fs::write(
            dir.join("destinations.json"),
            r#"[{"id": "DST_DE", "body": {"prefixes": ["49"]}}]"#,
        )
        .unwrap();
        fs::write(
            dir.join("rating_plans.json"),
            r#"[{"id": "RP_RETAIL", "body": {"rates": []}}]"#,
        )
        .unwrap();
    }

    fn config(source: &Path, datadb: &Path, extra: ConfigOverrides) -> LoaderConfig {
        LoaderConfig::default()
            .with_overrides(ConfigOverrides {
                path: Some(source.to_path_buf()),
                datadb_path: Some(datadb.to_path_buf()),
                tpid: Some("TP1".into()),
                caches: Some(String::new()),
                ..extra
            })
            .unwrap()
    }

    #[tokio::test]
    async fn load_writes_the_store() {
        let source = tempfile::tempdir().unwrap();
        let datadb = tempfile::tempdir().unwrap();
        write_plan(source.path());

        let cfg = config(source.path(), datadb.path(), ConfigOverrides::default());
        let outcome = cmd_load(&cfg).await.unwrap();

        assert_eq!(outcome.state, PassState::Done);
        assert_eq!(outcome.stats[&EntityCategory::RatingPlans], 1);
        assert!(outcome.report.unwrap().plan.is_none());

        let store = DirDataStore::open(datadb.path()).unwrap();
        assert_eq!(store.ids(EntityCategory::RatingPlans).unwrap(), vec!["RP_RETAIL"]);
        assert_eq!(store.ids(EntityCategory::ReverseDestinations).unwrap(), vec!["49"]);
        assert_eq!(store.load_history().unwrap()[0].tariff_plan_id, "TP1");
        assert_eq!(store.versions().unwrap(), Some(current_versions()));
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let source = tempfile::tempdir().unwrap();
        let datadb = tempfile::tempdir().unwrap();
        write_plan(source.path());

        let cfg = config(
            source.path(),
            datadb.path(),
            ConfigOverrides {
                dry_run: Some(true),
                ..Default::default()
            },
        );
        let outcome = cmd_load(&cfg).await.unwrap();

        assert_eq!(outcome.state, PassState::Loaded);
        assert!(outcome.summary.is_none());
        assert_eq!(fs::read_dir(datadb.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn remove_skips_invalidation() {
        let source = tempfile::tempdir().unwrap();
        let datadb = tempfile::tempdir().unwrap();
        write_plan(source.path());

        cmd_load(&config(source.path(), datadb.path(), ConfigOverrides::default()))
            .await
            .unwrap();
        let cfg = config(
            source.path(),
            datadb.path(),
            ConfigOverrides {
                remove: Some(true),
                ..Default::default()
            },
        );
        let outcome = cmd_load(&cfg).await.unwrap();

        assert_eq!(outcome.state, PassState::Written);
        assert!(outcome.report.is_none());
        let store = DirDataStore::open(datadb.path()).unwrap();
        assert!(store.ids(EntityCategory::RatingPlans).unwrap().is_empty());
        assert!(store.ids(EntityCategory::ReverseDestinations).unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_source_is_fatal() {
        let datadb = tempfile::tempdir().unwrap();
        let missing = Path::new("/definitely/not/here");
        let cfg = config(missing, datadb.path(), ConfigOverrides::default());
        let err = cmd_load(&cfg).await.unwrap_err();
        assert!(err.to_string().contains("cannot read tariff plan"));
    }

    #[tokio::test]
    async fn reload_without_cache_is_disabled() {
        let cfg = LoaderConfig::default()
            .with_overrides(ConfigOverrides {
                caches: Some(String::new()),
                ..Default::default()
            })
            .unwrap();
        let report = cmd_reload(&cfg).await;
        assert!(report.plan.is_none());
        assert_eq!(report.final_state, PassState::Done);
    }

    #[test]
    fn tpid_flag_completes_a_stordb_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("loader.toml");
        fs::write(&file, "[source]\nstordb_path = \"/srv/stordb\"\n").unwrap();

        let err = build_config(Some(file.clone()), ConfigOverrides::default()).unwrap_err();
        assert!(format!("{err:#}").contains("tariff plan id"));

        let cli = Cli::try_parse_from(["tpl-loader", "--tpid", "TP1"]).unwrap();
        let cfg = build_config(Some(file), cli.load.overrides(false)).unwrap();
        assert_eq!(cfg.tpid, "TP1");
        assert!(matches!(cfg.source, SourceConfig::StorDb { .. }));
    }

    fn dangling_plan(dir: &Path) {
        fs::write(
            dir.join("rating_plans.json"),
            r#"[{"id": "RP_FR", "body": {"rates": [{"destination_id": "DST_FR"}]}}]"#,
        )
        .unwrap();
    }

    #[tokio::test]
    async fn validate_stops_before_writing() {
        let source = tempfile::tempdir().unwrap();
        let datadb = tempfile::tempdir().unwrap();
        dangling_plan(source.path());

        let check = || ConfigOverrides {
            check_references: Some(true),
            ..Default::default()
        };
        let err = cmd_load(&config(source.path(), datadb.path(), check())).await.unwrap_err();
        assert!(err.to_string().contains("unknown destinations DST_FR"), "{err}");

        let store = DirDataStore::open(datadb.path()).unwrap();
        assert!(store.ids(EntityCategory::RatingPlans).unwrap().is_empty());
        assert_eq!(store.versions().unwrap(), None);

        // Without the check the same plan loads.
        cmd_load(&config(source.path(), datadb.path(), ConfigOverrides::default()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn validate_resolves_against_the_store() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let datadb = tempfile::tempdir().unwrap();
        fs::write(
            first.path().join("destinations.json"),
            r#"[{"id": "DST_FR", "body": {"prefixes": ["33"]}}]"#,
        )
        .unwrap();
        dangling_plan(second.path());

        cmd_load(&config(first.path(), datadb.path(), ConfigOverrides::default()))
            .await
            .unwrap();
        let cfg = config(
            second.path(),
            datadb.path(),
            ConfigOverrides {
                check_references: Some(true),
                ..Default::default()
            },
        );
        let outcome = cmd_load(&cfg).await.unwrap();
        assert_eq!(outcome.state, PassState::Done);
    }

    #[tokio::test]
    async fn imported_plan_loads_from_stordb() {
        let source = tempfile::tempdir().unwrap();
        let stordb = tempfile::tempdir().unwrap();
        let datadb = tempfile::tempdir().unwrap();
        write_plan(source.path());

        let import = config(source.path(), datadb.path(), ConfigOverrides::default());
        let summary = cmd_import(&import, stordb.path(), false).unwrap();
        assert_eq!(summary.total(), 2);
        assert!(stordb.path().join("TP1").join("rating_plans.json").is_file());

        let cfg = LoaderConfig::default()
            .with_overrides(ConfigOverrides {
                stordb_path: Some(stordb.path().to_path_buf()),
                datadb_path: Some(datadb.path().to_path_buf()),
                tpid: Some("TP1".into()),
                caches: Some(String::new()),
                ..Default::default()
            })
            .and_then(LoaderConfig::validate)
            .unwrap();
        let outcome = cmd_load(&cfg).await.unwrap();
        assert_eq!(outcome.summary.unwrap().total(), 2);
        let store = DirDataStore::open(datadb.path()).unwrap();
        assert_eq!(store.ids(EntityCategory::Destinations).unwrap(), vec!["DST_DE"]);
    }

    #[test]
    fn import_checks_references_before_staging() {
        let source = tempfile::tempdir().unwrap();
        let stordb = tempfile::tempdir().unwrap();
        let datadb = tempfile::tempdir().unwrap();
        dangling_plan(source.path());

        let cfg = config(
            source.path(),
            datadb.path(),
            ConfigOverrides {
                check_references: Some(true),
                ..Default::default()
            },
        );
        assert!(cmd_import(&cfg, stordb.path(), false).is_err());
        assert!(!stordb.path().join("TP1").exists());
    }

    #[test]
    fn report_json_shape() {
        let report = InvalidationReport {
            plan: Some(InvalidationPlan::reload_all(true)),
            steps: Vec::new(),
            final_state: PassState::Done,
            elapsed: std::time::Duration::ZERO,
        };
        let value = report_json(&report);
        assert_eq!(value["plan"]["flush_all"], true);
        assert_eq!(value["plan"]["index_keys"].as_array().unwrap().len(), 6);
        assert_eq!(value["state"], "done");
    }
}
