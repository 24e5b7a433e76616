//! Shared helpers for the CLI specs

#![allow(dead_code)]

use assert_cmd::Command;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use std::time::Duration;
use tempfile::TempDir;

/// Heartbeat settings short enough for a stale owner to show up quickly
pub const FAST_HEARTBEATS: &str = r#"
[heartbeat]
interval = "100ms"
grace_multiplier = 2

[backoff]
floor = "10ms"
ceiling = "50ms"
"#;

/// Longer than the grace window of [`FAST_HEARTBEATS`]
pub const FAST_GRACE_WINDOW: Duration = Duration::from_millis(600);

/// A scratch directory holding one database
pub struct Project {
    dir: TempDir,
    config: Option<PathBuf>,
}

impl Project {
    pub fn empty() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp dir"),
            config: None,
        }
    }

    /// Every invocation uses [`FAST_HEARTBEATS`]
    pub fn fast_heartbeats() -> Self {
        let mut project = Self::empty();
        project.config = Some(project.file("relsem.toml", FAST_HEARTBEATS));
        project
    }

    /// A project whose database already has the tables
    pub fn initialized() -> Self {
        let project = Self::empty();
        project.relsem().args(&["init"]).passes();
        project
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn db(&self) -> PathBuf {
        self.dir.path().join("relsem.db")
    }

    /// Write a file relative to the project root
    pub fn file(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(rel);
        std::fs::write(&path, content).expect("failed to write file");
        path
    }

    /// A relsem invocation pointed at this project's database
    pub fn relsem(&self) -> CliBuilder {
        let mut cmd = Command::cargo_bin("relsem").expect("relsem binary not built");
        cmd.current_dir(self.dir.path())
            .env("RELSEM_DB", self.db())
            .env_remove("RELSEM_CONFIG")
            .env_remove("RUST_LOG");
        if let Some(config) = &self.config {
            cmd.env("RELSEM_CONFIG", config);
        }
        CliBuilder { cmd }
    }

    /// Start `relsem hold` in the background and wait until it holds its permits
    pub fn spawn_hold(&self, args: &[&str]) -> Holder {
        let bin = assert_cmd::cargo::cargo_bin("relsem");
        let mut cmd = std::process::Command::new(bin);
        cmd.current_dir(self.dir.path())
            .env("RELSEM_DB", self.db())
            .env_remove("RELSEM_CONFIG")
            .env_remove("RUST_LOG")
            .arg("hold")
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        if let Some(config) = &self.config {
            cmd.env("RELSEM_CONFIG", config);
        }
        let mut child = cmd.spawn().expect("failed to spawn relsem hold");

        let stdout = child.stdout.take().expect("stdout not piped");
        let mut line = String::new();
        BufReader::new(stdout)
            .read_line(&mut line)
            .expect("failed to read hold output");
        assert!(line.starts_with("Holding"), "unexpected hold output: {:?}", line);
        let owner = line
            .trim_end()
            .rsplit(' ')
            .next()
            .unwrap_or_default()
            .to_string();

        Holder { child, owner }
    }
}

/// A background `relsem hold` process
pub struct Holder {
    child: Child,
    pub owner: String,
}

impl Holder {
    /// SIGKILL: no release and no heartbeat cleanup
    pub fn crash(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for Holder {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub struct CliBuilder {
    cmd: Command,
}

impl CliBuilder {
    pub fn args(mut self, args: &[&str]) -> Self {
        self.cmd.args(args);
        self
    }

    pub fn env(mut self, key: &str, value: impl AsRef<std::ffi::OsStr>) -> Self {
        self.cmd.env(key, value);
        self
    }

    /// Run and require exit code 0
    pub fn passes(mut self) -> RunAssert {
        let output = self.cmd.output().expect("failed to run relsem");
        let run = RunAssert::from(output);
        assert!(
            run.success,
            "expected success\nstdout:\n{}\nstderr:\n{}",
            run.stdout, run.stderr
        );
        run
    }

    /// Run and require a non-zero exit code
    pub fn fails(mut self) -> RunAssert {
        let output = self.cmd.output().expect("failed to run relsem");
        let run = RunAssert::from(output);
        assert!(
            !run.success,
            "expected failure\nstdout:\n{}\nstderr:\n{}",
            run.stdout, run.stderr
        );
        run
    }
}

pub struct RunAssert {
    success: bool,
    stdout: String,
    stderr: String,
}

impl From<std::process::Output> for RunAssert {
    fn from(output: std::process::Output) -> Self {
        Self {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

impl RunAssert {
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    pub fn stdout_has(self, needle: &str) -> Self {
        assert!(
            self.stdout.contains(needle),
            "stdout missing {:?}\nstdout:\n{}",
            needle,
            self.stdout
        );
        self
    }

    pub fn stdout_lacks(self, needle: &str) -> Self {
        assert!(
            !self.stdout.contains(needle),
            "stdout unexpectedly has {:?}\nstdout:\n{}",
            needle,
            self.stdout
        );
        self
    }

    pub fn stderr_has(self, needle: &str) -> Self {
        assert!(
            self.stderr.contains(needle),
            "stderr missing {:?}\nstderr:\n{}",
            needle,
            self.stderr
        );
        self
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.stdout).expect("stdout is not JSON")
    }
}
