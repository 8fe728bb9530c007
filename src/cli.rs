//! CLI command definitions and handling
//!
//! Uses `clap` derive API for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// grist - lint, test, concatenate and minify front-end JavaScript
#[derive(Parser, Debug)]
#[command(name = "grist")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to grist.toml config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Working directory
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Keep going when a task fails
    #[arg(short, long)]
    pub force: bool,

    /// Show execution plan without running
    #[arg(long)]
    pub dry_run: bool,

    /// Lint every file even if a cached result exists
    #[arg(long)]
    pub no_cache: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Tasks to run (shorthand for `grist run <task>...`); defaults to `default`
    #[arg(trailing_var_arg = true)]
    pub task: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one or more tasks or aliases, in order
    Run {
        /// Tasks to run, e.g. `lint`, `concat:dist`, `default`
        #[arg(default_value = "default")]
        tasks: Vec<String>,

        /// Show execution plan without running
        #[arg(long)]
        dry_run: bool,

        /// Keep going when a task fails
        #[arg(short, long)]
        force: bool,

        /// Lint every file even if a cached result exists
        #[arg(long)]
        no_cache: bool,
    },

    /// List built-in tasks, targets and aliases
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: ListFormat,
    },

    /// Watch files and re-run the watch tasks on change
    Watch,

    /// Print the rendered banner
    Banner,

    /// Manage the lint cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Initialize a new grist.toml
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Validate grist.toml configuration
    Check,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache statistics
    Stats,

    /// Clear the cache
    Clear,

    /// Show cache directory location
    Path,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ListFormat {
    #[default]
    Table,
    Json,
    Plain,
}

/// Options shared by every task run
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub force: bool,
    pub no_cache: bool,
}

impl Cli {
    /// Get the effective command, treating bare task names as `run <task>`
    pub fn effective_command(&self) -> EffectiveCommand<'_> {
        let options = RunOptions {
            dry_run: self.dry_run,
            force: self.force,
            no_cache: self.no_cache,
        };

        match &self.command {
            Some(Commands::Run {
                tasks,
                dry_run,
                force,
                no_cache,
            }) => EffectiveCommand::RunTasks(
                tasks.clone(),
                RunOptions {
                    dry_run: *dry_run || options.dry_run,
                    force: *force || options.force,
                    no_cache: *no_cache || options.no_cache,
                },
            ),
            Some(cmd) => EffectiveCommand::Subcommand(cmd),
            None if self.task.is_empty() => EffectiveCommand::RunTasks(vec!["default".to_string()], options),
            None => EffectiveCommand::RunTasks(self.task.clone(), options),
        }
    }
}

pub enum EffectiveCommand<'a> {
    Subcommand(&'a Commands),
    RunTasks(Vec<String>, RunOptions),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tasks(args: &[&str]) -> (Vec<String>, RunOptions) {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.effective_command() {
            EffectiveCommand::RunTasks(tasks, options) => (tasks, options),
            EffectiveCommand::Subcommand(cmd) => panic!("unexpected subcommand {:?}", cmd),
        }
    }

    #[test]
    fn test_bare_invocation_runs_default() {
        let (names, options) = tasks(&["grist"]);
        assert_eq!(names, vec!["default"]);
        assert!(!options.force);
    }

    #[test]
    fn test_bare_task_names_and_force() {
        let (names, options) = tasks(&["grist", "--force", "lint", "concat:dist"]);
        assert_eq!(names, vec!["lint", "concat:dist"]);
        assert!(options.force);
    }

    #[test]
    fn test_run_subcommand_flags() {
        let (names, options) = tasks(&["grist", "run", "min", "--dry-run", "--no-cache"]);
        assert_eq!(names, vec!["min"]);
        assert!(options.dry_run && options.no_cache);
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
