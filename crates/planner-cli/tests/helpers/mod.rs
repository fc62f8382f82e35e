use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::TempDir;

/// Runs the `planner` binary against a throwaway database and working directory.
pub struct CliTestHarness {
    temp_dir: TempDir,
    db_path: PathBuf,
}

impl CliTestHarness {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");
        Self { temp_dir, db_path }
    }

    /// A command isolated from any `planner.toml` and from the host timezone.
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("planner").expect("Failed to find planner binary");
        cmd.current_dir(self.temp_dir.path())
            .env("PLANNER_DATABASE_PATH", &self.db_path)
            .env("PLANNER_DEFAULT_TIMEZONE", "UTC")
            .env_remove("PLANNER_LOG");
        cmd
    }

    pub fn run_success(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().success()
    }

    pub fn run_failure(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().failure()
    }

    /// Runs `add` and returns the id it printed.
    pub fn add_task(&self, args: &[&str]) -> String {
        let output = self.command().arg("add").args(args).output().expect("Failed to run planner");
        assert!(output.status.success(), "add failed: {}", String::from_utf8_lossy(&output.stderr));
        let stdout = strip_ansi(&String::from_utf8_lossy(&output.stdout));
        let (_, rest) = stdout.split_once("Task ID: ").expect("add did not print a task id");
        rest.chars().take(36).collect()
    }

    /// Stdout of a successful command with color codes removed.
    pub fn stdout(&self, args: &[&str]) -> String {
        let output = self.command().args(args).output().expect("Failed to run planner");
        assert!(
            output.status.success(),
            "{:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        strip_ansi(&String::from_utf8_lossy(&output.stdout))
    }
}

pub fn strip_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            for c in chars.by_ref() {
                if c.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}
