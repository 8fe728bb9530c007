//! grist - a build runner for front-end JavaScript libraries
//!
//! Lints, tests, concatenates and minifies a library as declared in
//! `grist.toml`, strictly in order, halting at the first failure.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use console::style;
use tracing_subscriber::EnvFilter;

use grist::cache::Cache;
use grist::cli::{CacheCommands, Cli, Commands, EffectiveCommand, ListFormat, RunOptions};
use grist::config::{Config, CONFIG_FILES};
use grist::directive::Resolver;
use grist::error::{GristError, Result};
use grist::executor::{Executor, ExecutorConfig};
use grist::graph::{BuiltinTask, TaskGraph};
use grist::template::{RenderContext, TemplateEngine};
use grist::watch;

#[tokio::main]
async fn main() -> ExitCode {
    // Set up panic handler for nice error messages
    miette::set_panic_hook();

    let cli = Cli::parse();

    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    // Handle --no-color
    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:?}", style("error").red().bold(), miette::Report::new(e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Change working directory if specified
    if let Some(cwd) = &cli.cwd {
        std::env::set_current_dir(cwd)?;
    }

    match cli.effective_command() {
        EffectiveCommand::Subcommand(cmd) => run_command(cmd, &cli).await,
        EffectiveCommand::RunTasks(tasks, options) => run_tasks(&tasks, options, &cli).await,
    }
}

/// Load the configuration and the project root it lives in
fn load(cli: &Cli) -> Result<(Config, PathBuf, PathBuf)> {
    let (config, path) = Config::load(cli.config.as_deref())?;
    let path = path.canonicalize()?;
    let root = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or(std::env::current_dir()?);
    Ok((config, path, root))
}

async fn run_command(cmd: &Commands, cli: &Cli) -> Result<()> {
    match cmd {
        // handled by effective_command
        Commands::Run { .. } => Ok(()),

        Commands::List { format } => {
            let (config, _, _) = load(cli)?;
            let graph = TaskGraph::from_config(&config)?;
            print_task_list(&graph, &config, *format)
        }

        Commands::Watch => {
            let (config, _, root) = load(cli)?;
            let graph = TaskGraph::from_config(&config)?;

            let exec_config = ExecutorConfig {
                cwd: root,
                quiet: cli.quiet,
                ..Default::default()
            };

            watch::watch_and_run(&config, &graph, exec_config).await
        }

        Commands::Banner => {
            let (config, _, root) = load(cli)?;
            let templates = TemplateEngine::new(RenderContext::new(config.meta.clone()));
            let banner = Resolver::new(&config, &root, &templates).banner(None)?;
            print!("{}", banner);
            Ok(())
        }

        Commands::Cache { command } => run_cache_command(command, cli).await,

        Commands::Init { force } => init_config(*force),

        Commands::Check => {
            let (config, path, _) = load(cli)?;
            let graph = TaskGraph::from_config(&config)?;

            println!(
                "{} {} is valid ({} aliases, {} configured tasks)",
                style("✓").green(),
                path.display(),
                graph.aliases().len(),
                grist::config::BUILTIN_TASKS
                    .iter()
                    .filter(|t| config.has_section(t))
                    .count()
            );
            Ok(())
        }
    }
}

async fn run_tasks(tasks: &[String], options: RunOptions, cli: &Cli) -> Result<()> {
    let (config, _, root) = load(cli)?;
    let graph = TaskGraph::from_config(&config)?;
    let steps = graph.expand_all(tasks)?;

    let cache = if config.settings.cache && !options.no_cache && !options.dry_run {
        Some(Cache::new(config.cache_dir())?)
    } else {
        None
    };

    let exec_config = ExecutorConfig {
        dry_run: options.dry_run,
        force: options.force,
        cwd: root,
        quiet: cli.quiet,
    };

    let executor = Executor::new(config, exec_config, cache);
    executor.execute(&steps).await?;

    Ok(())
}

async fn run_cache_command(cmd: &CacheCommands, cli: &Cli) -> Result<()> {
    let cache_dir = load(cli).ok().and_then(|(c, _, _)| c.cache_dir());
    let cache = Cache::new(cache_dir)?;

    match cmd {
        CacheCommands::Stats => {
            let stats = cache.stats()?;
            println!("Cache: {}", stats);
        }

        CacheCommands::Clear => {
            cache.clear().await?;
            println!("{} Cache cleared", style("✓").green());
        }

        CacheCommands::Path => {
            println!("{}", cache.dir().display());
        }
    }

    Ok(())
}

fn print_task_list(graph: &TaskGraph, config: &Config, format: ListFormat) -> Result<()> {
    let builtins = [
        BuiltinTask::Lint,
        BuiltinTask::Qunit,
        BuiltinTask::Concat,
        BuiltinTask::Min,
    ];

    match format {
        ListFormat::Table => {
            println!("{}", style("Built-in tasks:").bold());
            println!();

            for task in builtins {
                let targets = graph.targets(task);
                let note = if !config.has_section(task.name()) {
                    style("(not configured)".to_string()).red().dim()
                } else if targets.is_empty() {
                    style(String::new())
                } else {
                    style(format!("[targets: {}]", targets.join(", "))).yellow().dim()
                };
                println!(
                    "  {:<8}{}  {}",
                    style(task.name()).cyan().bold(),
                    style(task.description()).dim(),
                    note
                );
            }

            println!();
            println!("{}", style("Aliases:").bold());
            println!();

            let aliases = graph.aliases();
            let width = aliases.iter().map(|(n, _)| n.len()).max().unwrap_or(0);
            for (name, members) in aliases {
                println!(
                    "  {}{}  {}",
                    style(name).cyan().bold(),
                    " ".repeat(width - name.len()),
                    members.join(" ")
                );
            }
        }

        ListFormat::Json => {
            let mut tasks = serde_json::Map::new();
            for task in builtins {
                tasks.insert(
                    task.name().to_string(),
                    serde_json::json!({
                        "description": task.description(),
                        "configured": config.has_section(task.name()),
                        "targets": graph.targets(task),
                    }),
                );
            }

            let mut aliases = serde_json::Map::new();
            for (name, members) in graph.aliases() {
                aliases.insert(name.to_string(), serde_json::json!(members));
            }

            let output = serde_json::json!({ "tasks": tasks, "aliases": aliases });
            let text = serde_json::to_string_pretty(&output).map_err(|e| GristError::InvalidConfig {
                reason: e.to_string(),
            })?;
            println!("{}", text);
        }

        ListFormat::Plain => {
            for task in builtins {
                println!("{}", task.name());
                for target in graph.targets(task) {
                    println!("{}:{}", task.name(), target);
                }
            }
            for (name, _) in graph.aliases() {
                println!("{}", name);
            }
        }
    }

    Ok(())
}

fn init_config(force: bool) -> Result<()> {
    let name = CONFIG_FILES[0];
    let path = Path::new(name);

    if path.exists() && !force {
        return Err(GristError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists (use --force to overwrite)", name),
        )));
    }

    let template = r#"# grist.toml - build configuration

[meta]
name = "my-library"
version = "0.1.0"
banner = """/*! <%= meta.name %> - v<%= meta.version %> - <%= today("yyyy-mm-dd") %>
* Copyright (c) <%= today("yyyy") %> Your Name; Licensed MIT */"""

[lint]
files = ["lib/**/*.js", "test/**/*.js"]

[qunit]
files = ["test/**/*.html"]
runner = "phantomjs test/run-qunit.js {file}"
# timeout = 30

[concat.dist]
src = ["<banner:meta.banner>", "<file_strip_banner:lib/my-library.js>"]
dest = "dist/my-library.js"

[min.dist]
src = ["<banner:meta.banner>", "<config:concat.dist.dest>"]
dest = "dist/my-library.min.js"

[watch]
files = "<config:lint.files>"
tasks = "lint qunit"

[jshint.options]
curly = true
eqeqeq = true
immed = true
latedef = true
newcap = true
noarg = true
sub = true
undef = true
boss = true
eqnull = true
browser = true

[jshint.globals]
jQuery = true

[tasks]
default = "lint qunit concat min"

[settings]
# cache = true              # Reuse lint results for unchanged files
# watch_debounce_ms = 300   # Watch mode debounce delay
"#;

    std::fs::write(path, template)?;

    println!("{} Created {}", style("✓").green(), style(name).bold());

    Ok(())
}
