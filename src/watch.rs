//! File watching for automatic task re-execution
//!
//! Uses `notify` crate with debouncing to watch the project root and re-run
//! the watch task list whenever a file matching `watch.files` changes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use console::style;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::directive::Resolver;
use crate::error::{GristError, Result};
use crate::executor::{Executor, ExecutorConfig};
use crate::graph::TaskGraph;
use crate::template::{RenderContext, TemplateEngine};

/// Debounced recursive watcher filtered by glob
pub struct FileWatcher {
    debouncer: Debouncer<notify::RecommendedWatcher>,
    rx: mpsc::Receiver<Vec<PathBuf>>,
    filter: WatchFilter,
}

/// Decides which changed paths are relevant
#[derive(Debug, Clone)]
pub struct WatchFilter {
    root: PathBuf,
    patterns: GlobSet,
}

impl WatchFilter {
    /// Patterns are relative to `root`
    pub fn new(root: &Path, patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| GristError::Glob {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
            builder.add(glob);
        }
        let patterns = builder.build().map_err(|e| GristError::Glob {
            pattern: patterns.join(", "),
            message: e.to_string(),
        })?;

        Ok(Self {
            root: root.to_path_buf(),
            patterns,
        })
    }

    pub fn is_match(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        self.patterns.is_match(relative)
    }
}

impl FileWatcher {
    pub fn new(filter: WatchFilter, debounce_ms: u64) -> Result<Self> {
        let (tx, rx) = mpsc::channel(16);

        let debouncer = new_debouncer(
            Duration::from_millis(debounce_ms),
            move |events: std::result::Result<Vec<DebouncedEvent>, notify::Error>| match events {
                Ok(events) => {
                    let paths: Vec<PathBuf> = events.into_iter().map(|e| e.path).collect();
                    let _ = tx.blocking_send(paths);
                }
                Err(e) => warn!("watch error: {}", e),
            },
        )
        .map_err(|e| GristError::Watch { source: e })?;

        Ok(Self {
            debouncer,
            rx,
            filter,
        })
    }

    /// Start watching the filter root recursively
    pub fn start(&mut self) -> Result<()> {
        self.debouncer
            .watcher()
            .watch(&self.filter.root, RecursiveMode::Recursive)
            .map_err(|e| GristError::Watch { source: e })
    }

    /// Wait for the next relevant file change
    pub async fn wait_for_change(&mut self) -> Option<Vec<PathBuf>> {
        loop {
            let paths = self.rx.recv().await?;

            let mut matching: Vec<PathBuf> = paths
                .into_iter()
                .filter(|p| self.filter.is_match(p))
                .collect();
            matching.sort();
            matching.dedup();

            if !matching.is_empty() {
                return Some(matching);
            }
        }
    }
}

/// Watch the project and re-run `watch.tasks` on every relevant change
pub async fn watch_and_run(config: &Config, graph: &TaskGraph, exec_config: ExecutorConfig) -> Result<()> {
    let root = exec_config.cwd.canonicalize()?;
    let exec_config = ExecutorConfig {
        cwd: root.clone(),
        ..exec_config
    };

    let templates = TemplateEngine::new(RenderContext::new(config.meta.clone()));
    let patterns = Resolver::new(config, &root, &templates).patterns(&config.watch_files())?;
    if patterns.is_empty() {
        return Err(GristError::InvalidConfig {
            reason: "nothing to watch; set watch.files or lint.files".to_string(),
        });
    }

    let task_names = config.watch_tasks();
    let steps = graph.expand_all(&task_names)?;

    println!(
        "{} Watching for changes to run {}",
        style("👀").cyan(),
        style(task_names.join(" ")).bold()
    );
    println!("   Patterns: {}", style(patterns.join(", ")).dim());
    println!();

    let mut watcher = FileWatcher::new(WatchFilter::new(&root, &patterns)?, config.settings.watch_debounce_ms)?;
    watcher.start()?;

    while let Some(changed) = watcher.wait_for_change().await {
        println!();
        println!(
            "{} Changed: {}",
            style("📝").yellow(),
            changed
                .iter()
                .map(|p| p.strip_prefix(&root).unwrap_or(p).display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        println!("{}", style("─".repeat(60)).dim());

        // fresh executor so banners pick up the current date
        let executor = Executor::new(config.clone(), exec_config.clone(), None);
        if let Err(e) = executor.execute(&steps).await {
            debug!("watch run failed: {}", e);
            println!("{}", style(e.to_string()).red());
        }

        println!("{}", style("─".repeat(60)).dim());
        println!("{} Waiting for changes...", style("👀").cyan());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matches_relative_paths() {
        let root = Path::new("/project");
        let filter = WatchFilter::new(root, &["js/**/*.js".to_string(), "grist.toml".to_string()]).unwrap();

        assert!(filter.is_match(Path::new("/project/js/app.js")));
        assert!(filter.is_match(Path::new("/project/js/lib/util.js")));
        assert!(filter.is_match(Path::new("/project/grist.toml")));
        assert!(!filter.is_match(Path::new("/project/dist/app.min.js")));
        assert!(!filter.is_match(Path::new("/project/js/readme.md")));
    }

    #[test]
    fn test_single_star_stays_in_directory() {
        let filter = WatchFilter::new(Path::new("/p"), &["test/*.js".to_string()]).unwrap();
        assert!(filter.is_match(Path::new("/p/test/a.js")));
        assert!(!filter.is_match(Path::new("/p/test/unit/a.js")));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            WatchFilter::new(Path::new("/p"), &["js/[".to_string()]),
            Err(GristError::Glob { .. })
        ));
    }
}
