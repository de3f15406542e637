use anyhow::Result;
use clap::Parser;
use relief_setup::cli::{AppContext, Cli, Commands};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        no_color: cli.no_color,
        dry_run: cli.dry_run,
    };

    match cli.command {
        Commands::Check(args) => relief_setup::check_run(args, &ctx),
        Commands::Load(args) => relief_setup::load_run(args, &ctx),
        Commands::Import(args) => relief_setup::import_run(args, &ctx),
        Commands::Profiles(args) => relief_setup::profiles_run(args, &ctx),
        Commands::Ranges(args) => relief_setup::ranges_run(args, &ctx),
        Commands::Init(args) => relief_setup::infra::config::init(args, &ctx),
        Commands::Completions(args) => relief_setup::completion::run(args, &ctx),
    }
}
