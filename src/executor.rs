//! Task execution engine
//!
//! Runs expanded task invocations one after another. A failing step stops
//! the run unless `force` is set, in which case the failure is reported as
//! a warning and the next step starts.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::concat;
use crate::config::{BuildTarget, Config};
use crate::directive::{Directive, Resolver};
use crate::error::{GristError, Result};
use crate::graph::{BuiltinTask, TaskInvocation};
use crate::lint;
use crate::minify;
use crate::qunit;
use crate::template::{RenderContext, TemplateEngine};

/// Result of executing a single step
#[derive(Debug)]
pub struct StepResult {
    pub invocation: TaskInvocation,
    pub success: bool,
    pub duration: Duration,
    /// One-line outcome, e.g. `3 files lint free.`
    pub message: Option<String>,
    pub error: Option<String>,
}

/// Executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Dry run mode (don't execute, just show plan)
    pub dry_run: bool,
    /// Keep going after a failed step
    pub force: bool,
    /// Project root; every path in the configuration is relative to it
    pub cwd: PathBuf,
    /// Suppress spinners and per-step status lines
    pub quiet: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            force: false,
            cwd: std::env::current_dir().unwrap_or_default(),
            quiet: false,
        }
    }
}

/// Task executor
pub struct Executor {
    config: Config,
    exec_config: ExecutorConfig,
    cache: Option<Cache>,
    templates: TemplateEngine,
}

impl Executor {
    /// Create a new executor; the run date is captured here
    pub fn new(config: Config, exec_config: ExecutorConfig, cache: Option<Cache>) -> Self {
        let templates = TemplateEngine::new(RenderContext::new(config.meta.clone()));
        Self {
            config,
            exec_config,
            cache,
            templates,
        }
    }

    /// Replace the render context, e.g. to pin the run date
    pub fn with_render_context(mut self, ctx: RenderContext) -> Self {
        self.templates = TemplateEngine::new(ctx);
        self
    }

    /// Execute steps in order
    pub async fn execute(&self, steps: &[TaskInvocation]) -> Result<Vec<StepResult>> {
        if self.exec_config.dry_run {
            self.print_dry_run(steps);
            return Ok(Vec::new());
        }

        let mut results = Vec::with_capacity(steps.len());

        for step in steps {
            let pb = self.spinner(step);
            let start = Instant::now();
            let outcome = self.run_step(step, &pb).await;
            pb.finish_and_clear();

            let duration = start.elapsed();
            match outcome {
                Ok(message) => {
                    let result = StepResult {
                        invocation: step.clone(),
                        success: true,
                        duration,
                        message: Some(message),
                        error: None,
                    };
                    self.print_step_result(&result);
                    results.push(result);
                }
                Err(e) => {
                    let result = StepResult {
                        invocation: step.clone(),
                        success: false,
                        duration,
                        message: None,
                        error: Some(e.to_string()),
                    };
                    self.print_step_result(&result);
                    results.push(result);

                    if !self.exec_config.force {
                        self.print_summary(&results);
                        return Err(e);
                    }
                    warn!("'{}' failed, continuing because of --force", step);
                }
            }
        }

        self.print_summary(&results);
        Ok(results)
    }

    fn spinner(&self, step: &TaskInvocation) -> ProgressBar {
        if self.exec_config.quiet {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("Running \"{}\"", step));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Run one step, returning its outcome line
    async fn run_step(&self, step: &TaskInvocation, pb: &ProgressBar) -> Result<String> {
        if !self.config.has_section(step.task.name()) {
            return Err(GristError::InvalidConfig {
                reason: format!("task '{}' has no [{}] section", step, step.task),
            });
        }

        match step.task {
            BuiltinTask::Lint => self.run_lint(pb).await,
            BuiltinTask::Qunit => self.run_qunit(pb).await,
            BuiltinTask::Concat => {
                let mut lines = Vec::new();
                for (name, target) in self.select_targets(&self.config.concat, step)? {
                    debug!("concat:{}", name);
                    lines.push(self.run_concat(target).await?);
                }
                Ok(lines.join("\n"))
            }
            BuiltinTask::Min => {
                let mut lines = Vec::new();
                for (name, target) in self.select_targets(&self.config.min, step)? {
                    debug!("min:{}", name);
                    lines.push(self.run_min(target).await?);
                }
                Ok(lines.join("\n"))
            }
        }
    }

    fn select_targets<'a>(
        &self,
        targets: &'a std::collections::BTreeMap<String, BuildTarget>,
        step: &TaskInvocation,
    ) -> Result<Vec<(&'a str, &'a BuildTarget)>> {
        match &step.target {
            Some(name) => targets
                .get_key_value(name)
                .map(|(k, v)| vec![(k.as_str(), v)])
                .ok_or_else(|| GristError::TargetNotFound {
                    task: step.task.to_string(),
                    target: name.clone(),
                }),
            None => Ok(targets.iter().map(|(k, v)| (k.as_str(), v)).collect()),
        }
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.config, self.base(), &self.templates)
    }

    fn base(&self) -> &Path {
        &self.exec_config.cwd
    }

    async fn run_lint(&self, pb: &ProgressBar) -> Result<String> {
        let Some(lint_config) = &self.config.lint else {
            return Ok(String::new());
        };

        let files = self.resolver().expand_files(&lint_config.files.to_vec())?;
        let report = lint::lint_files(&files, self.base(), &self.config.jshint, self.cache.as_ref()).await?;

        pb.suspend(|| lint::print_report(&report));

        if !report.is_clean() {
            return Err(GristError::LintFailed {
                count: report.problem_count(),
                files: report.failing_files(),
            });
        }

        Ok(format!("{} file(s) lint free.", report.files.len()))
    }

    async fn run_qunit(&self, pb: &ProgressBar) -> Result<String> {
        let Some(qunit_config) = &self.config.qunit else {
            return Ok(String::new());
        };

        let pages = self.resolver().expand_files(&qunit_config.files.to_vec())?;
        let report = qunit::run_pages(qunit_config, &pages, self.base(), self.config.settings.shell).await?;

        pb.suspend(|| qunit::print_report(&report));
        report.check()?;

        Ok(format!("{} test page(s) passed.", report.total()))
    }

    async fn run_concat(&self, target: &BuildTarget) -> Result<String> {
        let (dest, _) = concat::build(&self.resolver(), self.base(), target).await?;
        Ok(format!("File \"{}\" created.", self.display_path(&dest)))
    }

    /// Banner first, then each remaining source minified on its own and
    /// the results joined with `;`
    async fn run_min(&self, target: &BuildTarget) -> Result<String> {
        let resolver = self.resolver();
        let mut entries = target.src.to_vec();

        let banner = match entries.first().and_then(|e| Directive::parse(e)) {
            Some(d) if d.is_banner() => {
                let banner = resolver.banner(d.arg)?;
                entries.remove(0);
                banner
            }
            _ => String::new(),
        };

        let sources = resolver.expand_sources(&entries)?;
        let mut bodies = Vec::with_capacity(sources.len());
        let mut original = 0;
        for source in &sources {
            original += source.content.len();
            let body = minify::minify(&source.content, &self.config.uglify).map_err(|e| GristError::JsSyntax {
                path: PathBuf::from(&source.origin),
                line: e.line,
                column: e.column,
                message: e.message.clone(),
            })?;
            bodies.push(body);
        }
        let original = original + sources.len().saturating_sub(1);
        let minified = bodies.join(";");

        let output = format!("{}{}", banner, minified);
        let dest = concat::write_output(self.base(), &target.dest, output.as_bytes()).await?;

        let gzipped = minify::gzip_size(output.as_bytes())?;
        Ok(format!(
            "File \"{}\" created.\nUncompressed size: {} bytes.\nCompressed size: {} bytes gzipped ({} bytes minified).",
            self.display_path(&dest),
            original,
            gzipped,
            output.len()
        ))
    }

    fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(self.base())
            .unwrap_or(path)
            .display()
            .to_string()
    }

    /// Print dry run information
    fn print_dry_run(&self, steps: &[TaskInvocation]) {
        println!("{}", style("Execution plan (dry run):").bold());
        for (i, step) in steps.iter().enumerate() {
            println!("  {}. {}", i + 1, style(step).cyan());
        }
    }

    /// Print step result
    fn print_step_result(&self, result: &StepResult) {
        if self.exec_config.quiet && result.success {
            return;
        }

        let status = if result.success {
            style("✓").green()
        } else if self.exec_config.force {
            style("!").yellow()
        } else {
            style("✗").red()
        };

        println!(
            "{} Running \"{}\" {}",
            status,
            result.invocation,
            style(format!("({:.2?})", result.duration)).dim()
        );

        if let Some(message) = result.message.as_deref().filter(|m| !m.is_empty()) {
            for line in message.lines() {
                println!("  {}", line);
            }
        }

        if let Some(error) = &result.error {
            println!("  {}", style(error).red());
        }
    }

    /// Print execution summary
    fn print_summary(&self, results: &[StepResult]) {
        if self.exec_config.quiet {
            return;
        }

        let total = results.len();
        let failed = results.iter().filter(|r| !r.success).count();
        let total_time: Duration = results.iter().map(|r| r.duration).sum();

        println!();
        if failed == 0 {
            println!(
                "{} {} step(s) completed in {:.2?}",
                style("Done, without errors.").green().bold(),
                total,
                total_time
            );
        } else if self.exec_config.force {
            println!(
                "{} {} of {} step(s) failed in {:.2?}",
                style("Done, but with warnings.").yellow().bold(),
                failed,
                total,
                total_time
            );
        } else {
            println!(
                "{} {} of {} step(s) failed in {:.2?}",
                style("Aborted.").red().bold(),
                failed,
                total,
                total_time
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TaskGraph;
    use chrono::NaiveDate;
    use std::fs;

    const PROJECT: &str = r#"
        [meta]
        version = "0.3.1"
        banner = '/*! demo - v<%= meta.version %> - <%= today("yyyy-mm-dd") %> */'

        [lint]
        files = ["lib/**/*.js"]

        [concat.dist]
        src = ["<banner:meta.banner>", "<file_strip_banner:lib/one.js>", "lib/two.js"]
        dest = "dist/demo.js"

        [min.dist]
        src = ["<banner:meta.banner>", "<config:concat.dist.dest>"]
        dest = "dist/demo.min.js"

        [jshint.options]
        curly = true
        eqeqeq = true
        undef = true
        browser = true
    "#;

    fn project(two: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(
            dir.path().join("lib/one.js"),
            "/* internal notes */\nvar one = function (a) {\n  return a + 1;\n};\n",
        )
        .unwrap();
        fs::write(dir.path().join("lib/two.js"), two).unwrap();
        dir
    }

    fn executor(dir: &Path, force: bool) -> (Executor, Vec<TaskInvocation>) {
        let config = Config::parse(PROJECT).unwrap();
        let steps = TaskGraph::from_config(&config).unwrap().expand("default").unwrap();
        let now = NaiveDate::from_ymd_opt(2012, 7, 4)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let ctx = RenderContext::at(config.meta.clone(), now);
        let exec = Executor::new(
            config,
            ExecutorConfig {
                cwd: dir.to_path_buf(),
                quiet: true,
                force,
                ..Default::default()
            },
            None,
        )
        .with_render_context(ctx);
        (exec, steps)
    }

    #[tokio::test]
    async fn test_default_run_builds_artifacts() {
        let dir = project("window.two = window.one(1);\n");
        let (exec, steps) = executor(dir.path(), false);

        let results = exec.execute(&steps).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.success));

        let banner = "/*! demo - v0.3.1 - 2012-07-04 */\n";
        let concat = fs::read_to_string(dir.path().join("dist/demo.js")).unwrap();
        assert_eq!(
            concat,
            format!(
                "{}var one = function (a) {{\n  return a + 1;\n}};\n\nwindow.two = window.one(1);\n",
                banner
            )
        );

        let min = fs::read_to_string(dir.path().join("dist/demo.min.js")).unwrap();
        assert!(min.starts_with(banner));
        assert_eq!(
            &min[banner.len()..],
            "var one=function(a){return a+1;};window.two=window.one(1);"
        );
    }

    #[tokio::test]
    async fn test_second_run_is_byte_identical() {
        let dir = project("window.two = window.one(1);\n");
        let (exec, steps) = executor(dir.path(), false);

        exec.execute(&steps).await.unwrap();
        let first = fs::read(dir.path().join("dist/demo.min.js")).unwrap();
        exec.execute(&steps).await.unwrap();
        let second = fs::read(dir.path().join("dist/demo.min.js")).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_lint_failure_halts_before_concat() {
        let dir = project("if (one(1) == 2) two = 3;\n");
        let (exec, steps) = executor(dir.path(), false);

        let err = exec.execute(&steps).await.unwrap_err();
        assert!(matches!(err, GristError::LintFailed { .. }));
        assert!(!dir.path().join("dist/demo.js").exists());
    }

    #[tokio::test]
    async fn test_force_continues_past_lint_failure() {
        let dir = project("if (one(1) == 2) two = 3;\n");
        let (exec, steps) = executor(dir.path(), true);

        let results = exec.execute(&steps).await.unwrap();
        assert!(!results[0].success);
        assert!(results[1].success && results[2].success);
        assert!(dir.path().join("dist/demo.min.js").exists());
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let dir = project("window.two = window.one(1);\n");
        let config = Config::parse(PROJECT).unwrap();
        let steps = TaskGraph::from_config(&config).unwrap().expand("default").unwrap();
        let exec = Executor::new(
            config,
            ExecutorConfig {
                cwd: dir.path().to_path_buf(),
                dry_run: true,
                quiet: true,
                ..Default::default()
            },
            None,
        );

        assert!(exec.execute(&steps).await.unwrap().is_empty());
        assert!(!dir.path().join("dist").exists());
    }

    #[tokio::test]
    async fn test_unconfigured_task_fails() {
        let dir = project("window.two = window.one(1);\n");
        let (exec, _) = executor(dir.path(), false);
        let step = TaskInvocation {
            task: BuiltinTask::Qunit,
            target: None,
        };
        assert!(matches!(
            exec.execute(&[step]).await,
            Err(GristError::InvalidConfig { .. })
        ));
    }

    fn min_only(dir: &Path) -> (Executor, Vec<TaskInvocation>) {
        let config = Config::parse(
            r#"
            [min.dist]
            src = ["lib/a.js", "lib/b.js"]
            dest = "dist/ab.min.js"
            "#,
        )
        .unwrap();
        let steps = TaskGraph::from_config(&config).unwrap().expand("min:dist").unwrap();
        let exec = Executor::new(
            config,
            ExecutorConfig {
                cwd: dir.to_path_buf(),
                quiet: true,
                ..Default::default()
            },
            None,
        );
        (exec, steps)
    }

    #[tokio::test]
    async fn test_min_keeps_source_after_trailing_line_comment() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/a.js"), "window.a = 1; // end of a").unwrap();
        fs::write(dir.path().join("lib/b.js"), "window.b = 2;\n").unwrap();

        let (exec, steps) = min_only(dir.path());
        exec.execute(&steps).await.unwrap();

        let min = fs::read_to_string(dir.path().join("dist/ab.min.js")).unwrap();
        assert_eq!(min, "window.a=1;;window.b=2;");
    }

    #[tokio::test]
    async fn test_min_syntax_error_names_the_source() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/a.js"), "window.a = 1;\n").unwrap();
        fs::write(dir.path().join("lib/b.js"), "var ok = 1;\nvar s = 'open;\n").unwrap();

        let (exec, steps) = min_only(dir.path());
        match exec.execute(&steps).await {
            Err(GristError::JsSyntax { path, line, .. }) => {
                assert!(path.ends_with("lib/b.js"), "{}", path.display());
                assert_eq!(line, 2);
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
        assert!(!dir.path().join("dist/ab.min.js").exists());
    }
}
