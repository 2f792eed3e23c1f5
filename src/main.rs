use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use imarisha_sync::cli::args::{Cli, Commands};
use imarisha_sync::cli::commands::{self, Context};
use imarisha_sync::config::{ColorSetting, Config};
use imarisha_sync::error::SyncError;

/// Environment variable overriding the log filter.
const LOG_ENV: &str = "IMARISHA_LOG";

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8, config: &Config) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        let level = match verbose {
            0 => config.logging.level.as_str(),
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        EnvFilter::new(format!("imarisha_sync={level}"))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn apply_color(setting: ColorSetting) {
    match setting {
        ColorSetting::Auto => {}
        ColorSetting::Always => colored::control::set_override(true),
        ColorSetting::Never => colored::control::set_override(false),
    }
}

fn run() -> Result<(), SyncError> {
    let cli = Cli::parse();

    // Completions must work even with a broken config file
    if let Commands::Completions { shell, install } = cli.command {
        println!("{}", commands::completions(shell, install)?);
        return Ok(());
    }

    let ctx = Context::load(cli.home.as_deref(), cli.output)?;
    init_logging(cli.verbose, &ctx.config);
    apply_color(ctx.config.general.color);

    let output = match cli.command {
        Commands::Enqueue(args) => commands::enqueue(&ctx, args)?,
        Commands::Send(args) => commands::send(&ctx, args)?,
        Commands::List => commands::list(&ctx)?,
        Commands::Status => commands::status(&ctx)?,
        Commands::Remove { id } => commands::remove(&ctx, &id)?,
        Commands::Clear { force } => commands::clear(&ctx, force)?,
        Commands::Process { dry_run } => commands::process(&ctx, dry_run)?,
        Commands::Watch { max_ticks } => commands::watch(&ctx, max_ticks)?,
        Commands::Dead(args) => commands::dead(&ctx, args.command)?,
        Commands::Completions { .. } => String::new(),
    };

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
