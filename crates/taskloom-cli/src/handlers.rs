use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use serde_json::json;

use taskloom_providers::TaskDetector;
use taskloom_runtime::{
    ArchiveReader, ArchiveWriter, BuildProgress, BuildService, Config, IndexProgress,
    IndexService, ReconstructProgress, ReconstructService, SkeletonCache, TaskNavigator,
};
use taskloom_store::{
    HttpEmbedder, PipelineConfig, QdrantStore, TaskActivity, UpsertPipeline, decide,
    sample_jitter,
};

use crate::args::{Cli, OutputFormat};
use crate::output::{format_size, format_time, preview};

/// Resolved invocation environment shared by every handler.
pub struct Context {
    pub detector: TaskDetector,
    /// Root that hosts the `.skeletons/` cache directory.
    pub primary_root: PathBuf,
    pub config: Config,
    pub format: OutputFormat,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config = Config::load().unwrap_or_default();

        let mut roots = cli.tasks_root.clone();
        roots.extend(config.task_roots.iter().cloned());
        let use_defaults = roots.is_empty();
        let detector = TaskDetector::new(roots, use_defaults);

        let primary_root = detector
            .roots()
            .first()
            .cloned()
            .context("no task storage root found; pass --tasks-root")?;

        Ok(Self {
            detector,
            primary_root,
            config,
            format: cli.format,
        })
    }

    fn open_cache(&self) -> Result<SkeletonCache> {
        Ok(SkeletonCache::open(&self.primary_root)?)
    }

    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}

pub fn scan(ctx: &Context) -> Result<()> {
    let manifests = ctx.detector.scan()?;

    if ctx.json() {
        let rows: Vec<_> = manifests
            .iter()
            .map(|m| {
                json!({
                    "task_id": m.task_id,
                    "directory": m.directory,
                    "has_exchange_log": m.exchange_log.is_some(),
                    "has_ui_log": m.ui_log.is_some(),
                    "total_size": m.total_size(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for manifest in &manifests {
        let files = [
            manifest.exchange_log.as_ref().map(|_| "exchange"),
            manifest.ui_log.as_ref().map(|_| "ui"),
            manifest.metadata_file.as_ref().map(|_| "metadata"),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("+");
        println!(
            "{}  {:>9}  {}",
            manifest.task_id,
            format_size(manifest.total_size()),
            files
        );
    }
    println!("{} task directories", manifests.len());
    Ok(())
}

pub fn build(ctx: &Context, force: bool) -> Result<()> {
    let mut cache = ctx.open_cache()?;
    let mut service = BuildService::new(&mut cache, ctx.detector_clone());
    let summary = service.run(force, |progress| {
        if let BuildProgress::TaskFailed { task_id, message } = progress {
            eprintln!("warn: {}: {}", task_id, message);
        }
    })?;

    if ctx.json() {
        println!(
            "{}",
            json!({
                "discovered": summary.discovered,
                "built": summary.built,
                "unchanged": summary.unchanged,
                "failed": summary.failed,
            })
        );
    } else {
        println!(
            "{} discovered, {} built, {} unchanged, {} failed",
            summary.discovered, summary.built, summary.unchanged, summary.failed
        );
    }
    Ok(())
}

pub fn reconstruct(ctx: &Context, permissive: bool, workspace: Option<String>) -> Result<()> {
    let mut config = if permissive {
        taskloom_engine::ReconstructionConfig::permissive()
    } else {
        ctx.config.reconstruction_config()
    };
    config.workspace_filter = workspace;

    let mut cache = ctx.open_cache()?;
    let mut service = ReconstructService::new(&mut cache, config);
    let summary = service.run(|progress| {
        if let ReconstructProgress::Pass1Completed { errors, .. } = &progress
            && *errors > 0
        {
            eprintln!("warn: pass 1 recorded {} task errors", errors);
        }
    })?;

    if ctx.json() {
        println!(
            "{}",
            json!({
                "pass1": {
                    "processed": summary.pass1.processed,
                    "skipped": summary.pass1.skipped,
                    "instructions": summary.pass1.total_instructions,
                    "index_size": summary.pass1.index_size,
                    "errors": summary.pass1.errors.len(),
                },
                "pass2": {
                    "processed": summary.pass2.processed,
                    "already_linked": summary.pass2.already_linked,
                    "roots": summary.pass2.roots_detected,
                    "resolved": summary.pass2.resolved,
                    "unresolved": summary.pass2.unresolved,
                    "avg_confidence": summary.pass2.avg_confidence,
                    "methods": summary.pass2.method_counts,
                },
            })
        );
        return Ok(());
    }

    println!(
        "pass 1: {} processed, {} skipped, {} instructions indexed ({} entries)",
        summary.pass1.processed,
        summary.pass1.skipped,
        summary.pass1.total_instructions,
        summary.pass1.index_size
    );
    println!(
        "pass 2: {} resolved, {} unresolved, {} roots, {} already linked (avg confidence {:.2})",
        summary.pass2.resolved,
        summary.pass2.unresolved,
        summary.pass2.roots_detected,
        summary.pass2.already_linked,
        summary.pass2.avg_confidence
    );
    for (task_id, method, confidence, parent) in &summary.resolutions {
        println!(
            "  {} -> {}  [{} {:.2}]",
            task_id,
            parent,
            method.as_str(),
            confidence
        );
    }
    Ok(())
}

pub fn list(ctx: &Context) -> Result<()> {
    let cache = ctx.open_cache()?;

    if ctx.json() {
        let rows: Vec<_> = cache
            .iter()
            .map(|(id, s)| {
                json!({
                    "task_id": id,
                    "title": s.metadata.title,
                    "workspace": s.metadata.workspace,
                    "created_at": s.metadata.created_at,
                    "is_completed": s.is_completed,
                    "parent": s.reconstructed_parent_id.as_ref().or(s.parent_task_id.as_ref()),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for (task_id, skeleton) in cache.iter() {
        let title = skeleton.metadata.title.as_deref().unwrap_or("(untitled)");
        println!(
            "{}  {}  {}",
            task_id,
            format_time(skeleton.metadata.created_at),
            preview(title, 60)
        );
    }
    println!("{} skeletons", cache.len());
    Ok(())
}

pub fn show(ctx: &Context, task_id: &str) -> Result<()> {
    let cache = ctx.open_cache()?;
    let Some(skeleton) = cache.get(task_id) else {
        bail!("no skeleton for task {}", task_id);
    };

    if ctx.json() {
        println!("{}", serde_json::to_string_pretty(skeleton)?);
        return Ok(());
    }

    println!("task        {}", skeleton.task_id);
    if let Some(title) = &skeleton.metadata.title {
        println!("title       {}", title);
    }
    if let Some(workspace) = &skeleton.metadata.workspace {
        println!("workspace   {}", workspace);
    }
    println!("created     {}", format_time(skeleton.metadata.created_at));
    println!("activity    {}", format_time(skeleton.metadata.last_activity));
    println!(
        "events      {} messages, {} actions, {}",
        skeleton.metadata.message_count,
        skeleton.metadata.action_count,
        format_size(skeleton.metadata.total_size)
    );
    println!("completed   {}", skeleton.is_completed);
    if let Some(parent) = &skeleton.reconstructed_parent_id {
        println!("parent      {} (reconstructed)", parent);
    } else if let Some(parent) = &skeleton.parent_task_id {
        println!("parent      {} (recorded)", parent);
    }
    if let Some(instruction) = &skeleton.truncated_instruction {
        println!("instruction {}", preview(instruction, 100));
    }
    if !skeleton.child_task_instruction_prefixes.is_empty() {
        println!("delegations:");
        for prefix in &skeleton.child_task_instruction_prefixes {
            println!("  - {}", preview(prefix, 90));
        }
    }
    if !skeleton.processing.errors.is_empty() {
        println!("errors:");
        for error in &skeleton.processing.errors {
            println!("  - {}", error);
        }
    }
    Ok(())
}

pub fn tree(ctx: &Context, task_id: Option<&str>, depth: usize) -> Result<()> {
    let cache = ctx.open_cache()?;
    let navigator = TaskNavigator::new(cache.skeletons());

    let roots: Vec<&taskloom_types::ConversationSkeleton> = match task_id {
        Some(id) => match cache.get(id) {
            Some(s) => vec![s],
            None => bail!("no skeleton for task {}", id),
        },
        None => navigator.roots(),
    };

    for root in roots {
        print_subtree(&navigator, root, 0, depth);
    }
    Ok(())
}

fn print_subtree(
    navigator: &TaskNavigator,
    node: &taskloom_types::ConversationSkeleton,
    level: usize,
    max_depth: usize,
) {
    let title = node
        .metadata
        .title
        .as_deref()
        .or(node.truncated_instruction.as_deref())
        .unwrap_or("(untitled)");
    println!(
        "{}{}  {}",
        "  ".repeat(level),
        node.task_id,
        preview(title, 70 - (2 * level).min(40))
    );
    if level < max_depth {
        for child in navigator.children(&node.task_id) {
            print_subtree(navigator, child, level + 1, max_depth);
        }
    }
}

pub fn cache_stats(ctx: &Context) -> Result<()> {
    let cache = ctx.open_cache()?;
    let stats = cache.stats();

    if ctx.json() {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("skeletons             {}", stats.skeletons);
    println!("roots                 {}", stats.roots);
    println!("recorded parents      {}", stats.with_recorded_parent);
    println!("reconstructed parents {}", stats.with_reconstructed_parent);
    println!("completed             {}", stats.completed);
    println!("total source size     {}", format_size(stats.total_size));
    Ok(())
}

pub fn cache_reset(ctx: &Context) -> Result<()> {
    let cache = ctx.open_cache()?;
    let dir = cache.dir().to_path_buf();
    drop(cache);
    std::fs::remove_dir_all(&dir)?;
    println!("cache cleared: {}", dir.display());
    Ok(())
}

pub fn index(ctx: &Context, dry_run: bool) -> Result<()> {
    let mut cache = ctx.open_cache()?;
    let decision_config = ctx.config.decision_config();

    if dry_run {
        let mut will_index = 0;
        for (task_id, skeleton) in cache.iter() {
            let decision = decide(
                skeleton.metadata.indexing_state.as_ref(),
                TaskActivity {
                    last_activity: skeleton.metadata.last_activity,
                    legacy_indexed_at: skeleton.metadata.legacy_indexed_at,
                },
                chrono::Utc::now(),
                &decision_config,
                sample_jitter(),
            );
            if decision.should_index {
                will_index += 1;
            }
            println!(
                "{}  {}  {}",
                task_id,
                if decision.should_index { "index" } else { "skip " },
                decision.reason
            );
        }
        println!("{} of {} tasks would be indexed", will_index, cache.len());
        return Ok(());
    }

    let store_url = ctx
        .config
        .indexing
        .vector_store_url
        .clone()
        .context("indexing.vector_store_url not configured")?;
    let embed_endpoint = ctx
        .config
        .indexing
        .embedding_endpoint
        .clone()
        .context("indexing.embedding_endpoint not configured")?;

    let store = Arc::new(QdrantStore::connect(&store_url)?);
    let embedder = Arc::new(HttpEmbedder::new(
        embed_endpoint,
        std::time::Duration::from_secs(30),
    )?);
    let pipeline = Arc::new(UpsertPipeline::new(
        store,
        embedder,
        PipelineConfig::new(
            ctx.config.collection_name(),
            ctx.config.indexing.embedding_model.clone(),
        ),
    ));

    let runtime = tokio::runtime::Runtime::new()?;
    let summary = runtime.block_on(async {
        let mut service = IndexService::new(&mut cache, pipeline, decision_config);
        service
            .run(|progress| match progress {
                IndexProgress::TaskFailed {
                    task_id, message, ..
                } => eprintln!("warn: {}: {}", task_id, message),
                IndexProgress::BackPressure { task_id } => {
                    eprintln!("warn: {}: store unavailable, left unindexed", task_id)
                }
                _ => {}
            })
            .await
    })?;

    println!(
        "{} indexed, {} skipped, {} failed, {} refused",
        summary.indexed, summary.skipped, summary.failed, summary.refused
    );
    Ok(())
}

pub fn archive_write(ctx: &Context, task_id: &str, dir: &Path) -> Result<()> {
    let cache = ctx.open_cache()?;
    let Some(skeleton) = cache.get(task_id) else {
        bail!("no skeleton for task {}", task_id);
    };

    let machine_id = hostname_machine_id();
    let writer = ArchiveWriter::new(dir, &machine_id, &machine_id);
    let path = writer.write(skeleton)?;
    println!("archived to {}", path.display());
    Ok(())
}

pub fn archive_find(ctx: &Context, task_id: &str, dir: &Path) -> Result<()> {
    let reader = ArchiveReader::new(dir);
    match reader.find(task_id)? {
        Some(archived) => {
            if ctx.json() {
                println!("{}", serde_json::to_string_pretty(&archived)?);
            } else {
                println!(
                    "task {} archived from {} at {} ({} messages)",
                    archived.task_id,
                    archived.machine_id,
                    format_time(archived.archived_at),
                    archived.messages.len()
                );
            }
            Ok(())
        }
        None => bail!("no archive found for task {}", task_id),
    }
}

pub fn archive_list(_ctx: &Context, dir: &Path) -> Result<()> {
    let reader = ArchiveReader::new(dir);
    let entries = reader.list()?;
    for (machine_id, task_id) in &entries {
        println!("{}  {}", machine_id, task_id);
    }
    println!("{} archives", entries.len());
    Ok(())
}

pub fn archive_import(ctx: &Context, task_id: &str, dir: &Path) -> Result<()> {
    let reader = ArchiveReader::new(dir);
    let Some(archived) = reader.find(task_id)? else {
        bail!("no archive found for task {}", task_id);
    };

    let mut cache = ctx.open_cache()?;
    if cache.contains(task_id) {
        bail!("task {} already has a local skeleton; remove it first", task_id);
    }

    let skeleton = taskloom_runtime::skeleton_from_archive(&archived);
    cache.upsert(skeleton)?;
    println!(
        "imported {} from {} ({} messages)",
        task_id,
        archived.machine_id,
        archived.messages.len()
    );
    Ok(())
}

pub fn doctor(ctx: &Context) -> Result<()> {
    let mut problems = 0;

    println!("task roots:");
    for root in ctx.detector.roots() {
        let status = if root.is_dir() { "ok" } else { "missing" };
        if !root.is_dir() {
            problems += 1;
        }
        println!("  {:<7} {}", status, root.display());
    }

    let manifests = ctx.detector.scan()?;
    println!("discovered task directories: {}", manifests.len());

    let cache = ctx.open_cache()?;
    println!("cached skeletons: {}", cache.len());

    let missing: Vec<&str> = manifests
        .iter()
        .filter(|m| !cache.contains(&m.task_id))
        .map(|m| m.task_id.as_str())
        .collect();
    if !missing.is_empty() {
        problems += missing.len();
        println!("not yet built ({}):", missing.len());
        for task_id in missing.iter().take(10) {
            println!("  {}", task_id);
        }
        if missing.len() > 10 {
            println!("  ... and {} more", missing.len() - 10);
        }
    }

    let mut with_errors = 0;
    let mut unresolved = 0;
    let mut failed_indexing = 0;
    for (_, skeleton) in cache.iter() {
        if !skeleton.processing.errors.is_empty() {
            with_errors += 1;
        }
        if skeleton.reconstructed_parent_id.is_none() && skeleton.parent_task_id.is_none() {
            unresolved += 1;
        }
        if skeleton
            .metadata
            .indexing_state
            .as_ref()
            .is_some_and(|s| s.index_status == taskloom_types::IndexStatus::Failed)
        {
            failed_indexing += 1;
        }
    }
    println!("skeletons with build errors: {}", with_errors);
    println!("tasks without any parent (roots + unresolved): {}", unresolved);
    println!("tasks in permanent indexing failure: {}", failed_indexing);
    problems += with_errors + failed_indexing;

    if problems == 0 {
        println!("all checks passed");
    } else {
        println!("{} finding(s); run `taskloom build` / inspect `show` output", problems);
    }
    Ok(())
}

fn hostname_machine_id() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "local".to_string())
}

impl Context {
    fn detector_clone(&self) -> TaskDetector {
        TaskDetector::new(self.detector.roots().to_vec(), false)
    }
}
