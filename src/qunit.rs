//! Headless test page runner
//!
//! Each page matched by `qunit.files` is handed to the configured runner
//! command. A page passes when the runner exits zero.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use console::style;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::QunitConfig;
use crate::error::{GristError, Result};

const FILE_PLACEHOLDER: &str = "{file}";

/// Outcome of one test page
#[derive(Debug, Clone)]
pub struct PageResult {
    pub path: PathBuf,
    pub passed: bool,
    pub duration: Duration,
    /// Runner output, kept for failing pages
    pub output: Option<String>,
}

#[derive(Debug, Default)]
pub struct TestReport {
    pub pages: Vec<PageResult>,
}

impl TestReport {
    pub fn failed(&self) -> usize {
        self.pages.iter().filter(|p| !p.passed).count()
    }

    pub fn total(&self) -> usize {
        self.pages.len()
    }

    /// Fail if any page failed
    pub fn check(&self) -> Result<()> {
        match self.failed() {
            0 => Ok(()),
            failed => Err(GristError::TestsFailed {
                failed,
                total: self.total(),
            }),
        }
    }
}

/// Run every page; all pages are attempted even after a failure
pub async fn run_pages(
    config: &QunitConfig,
    pages: &[PathBuf],
    base: &Path,
    shell: bool,
) -> Result<TestReport> {
    let runner = config.runner.as_deref().ok_or_else(|| GristError::InvalidConfig {
        reason: "qunit.runner is not set; name the headless runner command, e.g. \
                 \"phantomjs run-qunit.js {file}\""
            .to_string(),
    })?;

    let mut report = TestReport::default();

    if pages.is_empty() {
        warn!("qunit: no test pages matched");
        return Ok(report);
    }

    if !shell {
        let program = split_runner(runner)?.swap_remove(0);
        which::which(&program).map_err(|_| GristError::CommandNotFound { command: program })?;
    }

    let limit = config.timeout.map(Duration::from_secs);

    for page in pages {
        let result = run_page(runner, page, base, shell, limit).await?;
        debug!(
            "{} {} in {:.2?}",
            page.display(),
            if result.passed { "passed" } else { "failed" },
            result.duration
        );
        report.pages.push(result);
    }

    Ok(report)
}

async fn run_page(
    runner: &str,
    page: &Path,
    base: &Path,
    shell: bool,
    limit: Option<Duration>,
) -> Result<PageResult> {
    let start = Instant::now();
    let mut command = build_command(runner, &page.to_string_lossy(), shell)?;
    command
        .current_dir(base)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match limit {
        Some(limit) => match timeout(limit, command.output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Ok(PageResult {
                    path: page.to_path_buf(),
                    passed: false,
                    duration: start.elapsed(),
                    output: Some(format!("timed out after {}s", limit.as_secs())),
                })
            }
        },
        None => command.output().await?,
    };

    let passed = output.status.success();
    let text = (!passed).then(|| {
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        text
    });

    Ok(PageResult {
        path: page.to_path_buf(),
        passed,
        duration: start.elapsed(),
        output: text,
    })
}

fn build_command(runner: &str, page: &str, shell: bool) -> Result<Command> {
    if shell {
        let (program, flag) = if cfg!(windows) { ("cmd", "/C") } else { ("sh", "-c") };
        let page = quote_page(page)?;
        let line = if runner.contains(FILE_PLACEHOLDER) {
            runner.replace(FILE_PLACEHOLDER, &page)
        } else {
            format!("{} {}", runner, page)
        };
        let mut c = Command::new(program);
        c.arg(flag).arg(line);
        return Ok(c);
    }

    let mut parts = split_runner(runner)?.into_iter();
    let program = parts.next().unwrap_or_default();

    let mut has_placeholder = false;
    let mut args: Vec<String> = parts
        .map(|arg| {
            has_placeholder |= arg.contains(FILE_PLACEHOLDER);
            arg.replace(FILE_PLACEHOLDER, page)
        })
        .collect();
    if !has_placeholder {
        args.push(page.to_string());
    }

    let mut c = Command::new(program);
    c.args(args);
    Ok(c)
}

/// Split the runner command line into words; never returns an empty list
fn split_runner(runner: &str) -> Result<Vec<String>> {
    match shlex::split(runner) {
        Some(words) if !words.is_empty() => Ok(words),
        Some(_) => Err(GristError::InvalidConfig {
            reason: "qunit.runner is empty".to_string(),
        }),
        None => Err(GristError::InvalidConfig {
            reason: format!("qunit.runner has unbalanced quotes: {}", runner),
        }),
    }
}

/// Quote a page path for the shell command line
fn quote_page(page: &str) -> Result<String> {
    if cfg!(windows) {
        return Ok(format!("\"{}\"", page));
    }
    shlex::try_quote(page)
        .map(|q| q.into_owned())
        .map_err(|e| GristError::InvalidConfig {
            reason: format!("cannot pass page {} to the shell: {}", page, e),
        })
}

/// Print one line per page, with runner output under failures
pub fn print_report(report: &TestReport) {
    for page in &report.pages {
        if page.passed {
            println!("  {} {}", style("✓").green(), page.path.display());
        } else {
            println!("  {} {}", style("✗").red(), page.path.display());
            if let Some(output) = page.output.as_deref().map(str::trim).filter(|o| !o.is_empty()) {
                for line in output.lines() {
                    println!("      {}", style(line).dim());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qunit(runner: Option<&str>, timeout: Option<u64>) -> QunitConfig {
        QunitConfig {
            files: crate::config::PatternList::One("test/*.html".to_string()),
            runner: runner.map(str::to_string),
            timeout,
        }
    }

    fn pages() -> Vec<PathBuf> {
        vec![PathBuf::from("test/a.html"), PathBuf::from("test/b.html")]
    }

    #[test]
    fn test_split_runner() {
        assert_eq!(
            split_runner("phantomjs 'run qunit.js' {file}").unwrap(),
            vec!["phantomjs", "run qunit.js", "{file}"]
        );
        assert_eq!(split_runner("  a   b ").unwrap(), vec!["a", "b"]);
        assert!(matches!(split_runner("   "), Err(GristError::InvalidConfig { .. })));
        assert!(matches!(
            split_runner("phantomjs 'run.js {file}"),
            Err(GristError::InvalidConfig { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_runner_quotes_page_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("my tests")).unwrap();
        std::fs::write(dir.path().join("my tests/a;b.html"), "<html></html>").unwrap();
        let pages = vec![PathBuf::from("my tests/a;b.html")];

        let report = run_pages(&qunit(Some("test -f {file}"), None), &pages, dir.path(), true)
            .await
            .unwrap();
        assert!(report.check().is_ok());

        // without a placeholder the quoted path is appended
        let report = run_pages(&qunit(Some("test -f"), None), &pages, dir.path(), true)
            .await
            .unwrap();
        assert!(report.check().is_ok());
    }

    #[tokio::test]
    async fn test_missing_runner_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_pages(&qunit(None, None), &pages(), dir.path(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, GristError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn test_no_pages_is_not_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let report = run_pages(&qunit(Some("false {file}"), None), &[], dir.path(), false)
            .await
            .unwrap();
        assert_eq!(report.total(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_decides() {
        let dir = tempfile::tempdir().unwrap();

        let report = run_pages(&qunit(Some("true {file}"), None), &pages(), dir.path(), false)
            .await
            .unwrap();
        assert_eq!(report.total(), 2);
        assert!(report.check().is_ok());

        let err = run_pages(&qunit(Some("false {file}"), None), &pages(), dir.path(), false)
            .await
            .unwrap()
            .check()
            .unwrap_err();
        assert!(matches!(err, GristError::TestsFailed { failed: 2, total: 2 }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_runner_sees_page_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("test")).unwrap();
        std::fs::write(dir.path().join("test/a.html"), "<html></html>").unwrap();

        let err = run_pages(&qunit(Some("test -f {file}"), None), &pages(), dir.path(), true)
            .await
            .unwrap()
            .check()
            .unwrap_err();
        // a.html exists, b.html does not
        assert!(matches!(err, GristError::TestsFailed { failed: 1, total: 2 }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_fails_page() {
        let dir = tempfile::tempdir().unwrap();
        let pages = vec![PathBuf::from("slow.html")];
        let report = run_pages(&qunit(Some("sleep 5; true {file}"), Some(1)), &pages, dir.path(), true)
            .await
            .unwrap();
        assert_eq!(report.pages[0].output.as_deref(), Some("timed out after 1s"));
        let err = report.check().unwrap_err();
        assert!(matches!(err, GristError::TestsFailed { failed: 1, total: 1 }));
    }

    #[tokio::test]
    async fn test_unknown_runner_command() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_pages(
            &qunit(Some("grist-no-such-runner-xyz {file}"), None),
            &pages(),
            dir.path(),
            false,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GristError::CommandNotFound { .. }));
    }
}
