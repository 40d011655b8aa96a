use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde_json::json;
use tidemark_access::{
    is_fingerprint_key, AccessData, AccessTable, CrawlReport, CrawlSession, SnapshotStorage,
    SyncAccessData,
};
use tidemark_snapshot::{FileSnapshotStorage, StorageConfig};
use tidemark_types::{keys, ContentHash};
use tracing::warn;
use walkdir::WalkDir;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = resolve_config(&cli)?;
    let format = cli.format;
    match cli.command {
        Command::Stats => cmd_stats(&config, format),
        Command::Ids(args) => cmd_ids(&config, args, format),
        Command::Show(args) => cmd_show(&config, args, format),
        Command::Tree(args) => cmd_tree(&config, args, format),
        Command::Remove(args) => cmd_remove(&config, args),
        Command::Scan(args) => cmd_scan(&config, args, format),
        Command::Clear => cmd_clear(&config),
        Command::Config => cmd_config(&config),
    }
}

fn resolve_config(cli: &Cli) -> anyhow::Result<StorageConfig> {
    let mut config = match &cli.config {
        Some(path) => StorageConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => StorageConfig::default(),
    };
    if let Some(state) = &cli.state {
        config.path = state.clone();
    }
    Ok(config)
}

fn open_table(config: &StorageConfig) -> anyhow::Result<AccessTable> {
    AccessTable::open(FileSnapshotStorage::from_config(config))
        .with_context(|| format!("opening crawl state {}", config.path.display()))
}

fn cmd_stats(config: &StorageConfig, format: OutputFormat) -> anyhow::Result<()> {
    let storage = FileSnapshotStorage::from_config(config);
    let Some(snapshot) = storage
        .load()
        .with_context(|| format!("reading {}", config.path.display()))?
    else {
        println!("No crawl state at {}", config.path.display().to_string().bold());
        return Ok(());
    };
    let version = snapshot.version;
    let saved_at = snapshot.saved_at;
    let mut table = AccessTable::new();
    table.restore(snapshot).context("restoring snapshot")?;

    let mut properties = 0;
    let mut links = 0;
    let mut aggregated = 0;
    for id in table.known_ids() {
        properties += table
            .properties(id)
            .map_or(0, |p| p.iter().filter(|(k, _)| !keys::is_reserved(k)).count());
        links += table.referred_ids(id).len();
        if table.aggregating_id(id).is_some() {
            aggregated += 1;
        }
    }

    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "path": config.path,
                "version": version,
                "savedAt": saved_at,
                "ids": table.len(),
                "properties": properties,
                "links": links,
                "aggregated": aggregated,
            })
        ),
        OutputFormat::Text => {
            println!("Crawl state {}", config.path.display().to_string().bold());
            let saved = saved_at.map_or_else(|| "unknown".to_string(), |t| t.to_rfc3339());
            println!("  Version: {}  Saved: {}", version.unwrap_or_default(), saved.dimmed());
            println!("  Identifiers: {}", table.len().to_string().bold());
            println!("  Properties:  {properties}");
            println!("  Links:       {links}");
            println!("  Aggregated:  {aggregated}");
        }
    }
    Ok(())
}

fn cmd_ids(config: &StorageConfig, args: IdsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let table = open_table(config)?;
    let ids: Vec<&str> = table
        .known_ids()
        .filter(|id| args.prefix.as_deref().map_or(true, |p| id.starts_with(p)))
        .filter(|id| !args.roots || table.aggregating_id(id).is_none())
        .collect();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&ids)?),
        OutputFormat::Text => ids.iter().for_each(|id| println!("{id}")),
    }
    Ok(())
}

fn cmd_show(config: &StorageConfig, args: ShowArgs, format: OutputFormat) -> anyhow::Result<()> {
    let table = open_table(config)?;
    if !table.is_known_id(&args.id) {
        bail!("unknown identifier {}", args.id);
    }
    let properties: BTreeMap<&str, &str> = table
        .properties(&args.id)
        .map(|p| p.iter().filter(|(k, _)| !keys::is_reserved(k)).collect())
        .unwrap_or_default();
    let referred = table.referred_ids(&args.id);
    let parent = table.aggregating_id(&args.id);
    let children = table.aggregated_ids(&args.id);

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "id": args.id,
                "properties": properties,
                "referredIDs": referred,
                "aggregatedBy": parent,
                "aggregates": children,
            }))?
        ),
        OutputFormat::Text => {
            println!("{}", args.id.yellow().bold());
            for (key, value) in &properties {
                let key = if is_fingerprint_key(key) { key.cyan() } else { key.normal() };
                println!("  {key}: {value}");
            }
            if let Some(parent) = parent {
                println!("  {} {}", "aggregated by".dimmed(), parent);
            }
            if !children.is_empty() {
                println!("  {} {} ids", "aggregates".dimmed(), children.len());
            }
            for target in &referred {
                println!("  {} {}", "→".blue(), target);
            }
        }
    }
    Ok(())
}

fn cmd_tree(config: &StorageConfig, args: TreeArgs, format: OutputFormat) -> anyhow::Result<()> {
    let table = open_table(config)?;
    if !table.is_known_id(&args.id) {
        bail!("unknown identifier {}", args.id);
    }
    let mut depths: BTreeMap<&str, usize> = BTreeMap::new();
    let mut lines = Vec::new();
    for id in table.aggregated_ids_closure(&args.id)? {
        let depth = match table.aggregating_id(id) {
            Some(parent) if id != args.id => depths.get(parent).map_or(0, |d| d + 1),
            _ => 0,
        };
        depths.insert(id, depth);
        if args.depth.map_or(true, |max| depth <= max) {
            lines.push((depth, id));
        }
    }

    match format {
        OutputFormat::Json => {
            let ids: Vec<&str> = lines.iter().map(|(_, id)| *id).collect();
            println!("{}", serde_json::to_string_pretty(&ids)?);
        }
        OutputFormat::Text => {
            for (depth, id) in lines {
                let label = if depth == 0 { id.bold() } else { id.normal() };
                println!("{}{}", "  ".repeat(depth), label);
            }
        }
    }
    Ok(())
}

fn cmd_remove(config: &StorageConfig, args: RemoveArgs) -> anyhow::Result<()> {
    let mut table = open_table(config)?;
    let removed = table.remove(&args.id)?;
    if removed == 0 {
        bail!("unknown identifier {}", args.id);
    }
    table.store().context("saving crawl state")?;
    println!("{} Removed {} ({} ids)", "✓".green().bold(), args.id.yellow(), removed);
    Ok(())
}

fn cmd_clear(config: &StorageConfig) -> anyhow::Result<()> {
    let mut table = AccessTable::with_storage(FileSnapshotStorage::from_config(config));
    table.clear().context("clearing crawl state")?;
    println!("{} Cleared {}", "✓".green().bold(), config.path.display());
    Ok(())
}

fn cmd_config(config: &StorageConfig) -> anyhow::Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}

fn cmd_scan(config: &StorageConfig, args: ScanArgs, format: OutputFormat) -> anyhow::Result<()> {
    let root = fs::canonicalize(&args.dir)
        .with_context(|| format!("resolving {}", args.dir.display()))?;
    let data = SyncAccessData::open(FileSnapshotStorage::from_config(config))
        .with_context(|| format!("opening crawl state {}", config.path.display()))?;
    let mut session = CrawlSession::begin(&data)?;
    crawl(&mut session, &root, &args)?;

    if args.dry_run {
        let doomed: Vec<String> = data.untouched_ids()?.collect::<Result<Vec<_>, _>>()?;
        match format {
            OutputFormat::Json => println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "report": session.report(),
                    "wouldRemove": doomed,
                }))?
            ),
            OutputFormat::Text => {
                println!("{} (dry run, nothing saved)", session.report());
                for id in &doomed {
                    println!("  {} {}", "-".red(), id);
                }
            }
        }
        return Ok(());
    }

    let report = session.finish().context("finishing crawl")?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&root, &report),
    }
    Ok(())
}

fn print_report(root: &Path, report: &CrawlReport) {
    let mark = if report.is_clean() { "✓".green() } else { "✓".yellow() };
    println!("{} Scanned {}", mark.bold(), root.display().to_string().bold());
    println!(
        "  {} new, {} changed, {} unchanged, {} removed",
        report.new.to_string().green(),
        report.changed.to_string().yellow(),
        report.unchanged,
        report.removed.to_string().red()
    );
}

fn file_id(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Walk `root`, observing every entry. Folders aggregate their entries; files
/// are fingerprinted by date and size, plus content hash with `--hash`.
fn crawl(
    session: &mut CrawlSession<'_, SyncAccessData>,
    root: &Path,
    args: &ScanArgs,
) -> anyhow::Result<()> {
    let mut walker = WalkDir::new(root).sort_by_file_name().into_iter();
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        let id = file_id(entry.path());
        if entry.depth() > 0 {
            if let Some(parent) = entry.path().parent() {
                session.aggregate(&file_id(parent), &id)?;
            }
        }
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(%id, error = %e, "skipping entry without metadata");
                continue;
            }
        };
        let date = metadata
            .modified()
            .map(|t| DateTime::<Utc>::from(t).to_rfc3339())
            .unwrap_or_default();

        if metadata.is_dir() {
            let stored = session.store().get(&id, keys::DATE)?;
            if args.trust_folder_dates && stored.as_deref() == Some(date.as_str()) {
                session.observe_unchanged_subtree(&id)?;
                walker.skip_current_dir();
                continue;
            }
            session.observe(&id, &[(keys::DATE, date.as_str())])?;
        } else {
            let size = metadata.len().to_string();
            let mut fingerprint = vec![(keys::DATE, date.as_str()), (keys::BYTE_SIZE, size.as_str())];
            let hash = if args.hash {
                match fs::read(entry.path()) {
                    Ok(bytes) => Some(ContentHash::of(&bytes).to_hex()),
                    Err(e) => {
                        warn!(%id, error = %e, "skipping unreadable file");
                        continue;
                    }
                }
            } else {
                None
            };
            if let Some(hash) = &hash {
                fingerprint.push((keys::CONTENT_HASH, hash.as_str()));
            }
            session.observe(&id, &fingerprint)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scan_args(dir: &Path) -> ScanArgs {
        ScanArgs {
            dir: dir.to_path_buf(),
            hash: false,
            trust_folder_dates: false,
            dry_run: false,
        }
    }

    fn scan(data: &SyncAccessData, root: &Path, args: &ScanArgs) -> CrawlReport {
        let mut session = CrawlSession::begin(data).unwrap();
        crawl(&mut session, root, args).unwrap();
        session.finish().unwrap()
    }

    fn fixture() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir(root.join("docs")).unwrap();
        fs::write(root.join("docs/a.txt"), "alpha").unwrap();
        fs::write(root.join("docs/b.txt"), "beta").unwrap();
        fs::write(root.join("readme"), "hi").unwrap();
        (dir, root)
    }

    #[test]
    fn first_scan_records_tree() {
        let (_dir, root) = fixture();
        let data = SyncAccessData::new();
        let report = scan(&data, &root, &scan_args(&root));

        // root, docs, a.txt, b.txt, readme
        assert_eq!(report.new, 5);
        let docs = file_id(&root.join("docs"));
        assert_eq!(data.aggregated_ids(&docs).unwrap().len(), 2);
        assert_eq!(
            data.get(&file_id(&root.join("docs/a.txt")), keys::BYTE_SIZE).unwrap().as_deref(),
            Some("5")
        );
    }

    #[test]
    fn rescan_detects_changes_and_deletions() {
        let (_dir, root) = fixture();
        let data = SyncAccessData::new();
        scan(&data, &root, &scan_args(&root));

        fs::write(root.join("readme"), "hello there").unwrap();
        fs::remove_dir_all(root.join("docs")).unwrap();
        let report = scan(&data, &root, &scan_args(&root));

        assert_eq!(report.removed, 3);
        assert!(report.changed >= 1);
        assert!(!data.is_known_id(&file_id(&root.join("docs/a.txt"))).unwrap());
    }

    #[test]
    fn content_hash_is_recorded() {
        let (_dir, root) = fixture();
        let data = SyncAccessData::new();
        let mut args = scan_args(&root);
        args.hash = true;
        scan(&data, &root, &args);

        let stored = data
            .get(&file_id(&root.join("readme")), keys::CONTENT_HASH)
            .unwrap();
        assert_eq!(stored, Some(ContentHash::of(b"hi").to_hex()));
    }

    #[test]
    fn trusted_folder_dates_keep_whole_tree() {
        let (_dir, root) = fixture();
        let data = SyncAccessData::new();
        scan(&data, &root, &scan_args(&root));

        let mut args = scan_args(&root);
        args.trust_folder_dates = true;
        let report = scan(&data, &root, &args);
        assert_eq!(report.removed, 0);
        assert_eq!(report.unchanged, 5);
        assert_eq!(data.size().unwrap(), 5);
    }
}
