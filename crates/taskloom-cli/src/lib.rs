mod args;
mod handlers;
mod output;

pub use args::{ArchiveCommands, CacheCommands, Cli, Commands, OutputFormat};

use anyhow::Result;

pub fn run(cli: Cli) -> Result<()> {
    init_tracing();

    let ctx = handlers::Context::from_cli(&cli)?;
    match cli.command {
        Commands::Scan => handlers::scan(&ctx),
        Commands::Build { force } => handlers::build(&ctx, force),
        Commands::Reconstruct { permissive, workspace } => {
            handlers::reconstruct(&ctx, permissive, workspace)
        }
        Commands::List => handlers::list(&ctx),
        Commands::Show { task_id } => handlers::show(&ctx, &task_id),
        Commands::Tree { task_id, depth } => handlers::tree(&ctx, task_id.as_deref(), depth),
        Commands::Cache { command } => match command {
            CacheCommands::Stats => handlers::cache_stats(&ctx),
            CacheCommands::Reset => handlers::cache_reset(&ctx),
        },
        Commands::Index { dry_run } => handlers::index(&ctx, dry_run),
        Commands::Archive { command } => match command {
            ArchiveCommands::Write { task_id, dir } => handlers::archive_write(&ctx, &task_id, &dir),
            ArchiveCommands::Find { task_id, dir } => handlers::archive_find(&ctx, &task_id, &dir),
            ArchiveCommands::List { dir } => handlers::archive_list(&ctx, &dir),
            ArchiveCommands::Import { task_id, dir } => {
                handlers::archive_import(&ctx, &task_id, &dir)
            }
        },
        Commands::Doctor => handlers::doctor(&ctx),
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("TASKLOOM_LOG")
        .unwrap_or_else(|_| EnvFilter::new("taskloom=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
