//! EnergyPlus invocation
//!
//! Runs the external executable as a subprocess bounded by the configured
//! timeout. The child is spawned with kill-on-drop, so a timeout or an aborted
//! task never leaves a simulation running in the background.

use crate::error::{EngineError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Runs EnergyPlus with a wall-clock bound
#[derive(Debug, Clone)]
pub struct EnergyPlusRunner {
    executable: PathBuf,
    timeout: Duration,
}

impl EnergyPlusRunner {
    /// Create a runner for `executable`
    pub fn new(executable: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            timeout,
        }
    }

    /// Configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build command-line arguments for one simulation
    pub fn args(idf: &Path, epw: &Path, outdir: &Path) -> Vec<String> {
        vec![
            "--weather".to_string(),
            epw.display().to_string(),
            "--output-directory".to_string(),
            outdir.display().to_string(),
            "--readvars".to_string(),
            "--expandobjects".to_string(),
            idf.display().to_string(),
        ]
    }

    /// Run one simulation, writing outputs into `outdir`
    ///
    /// # Errors
    /// - [`EngineError::Timeout`] if the process outlives the timeout (it is killed)
    /// - [`EngineError::Simulation`] on a non-zero exit, with captured output
    /// - [`EngineError::Io`] if the executable cannot be spawned
    pub async fn run(&self, idf: &Path, epw: &Path, outdir: &Path) -> Result<()> {
        let args = Self::args(idf, epw, outdir);
        debug!("EnergyPlus command: {} {:?}", self.executable.display(), args);

        let child = Command::new(&self.executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let start = Instant::now();
        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(
                    input = %idf.display(),
                    timeout_secs = self.timeout.as_secs(),
                    "EnergyPlus exceeded timeout, killed"
                );
                return Err(EngineError::Timeout(self.timeout));
            }
        };

        if !output.status.success() {
            return Err(EngineError::Simulation {
                code: output.status.code(),
                input: idf
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        info!(
            input = %idf.display(),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "EnergyPlus finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_order() {
        let args = EnergyPlusRunner::args(
            Path::new("/tmp/run/a.idf"),
            Path::new("/tmp/run/w.epw"),
            Path::new("/tmp/run"),
        );
        assert_eq!(
            args,
            vec![
                "--weather",
                "/tmp/run/w.epw",
                "--output-directory",
                "/tmp/run",
                "--readvars",
                "--expandobjects",
                "/tmp/run/a.idf",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_executable_is_io_error() {
        let runner = EnergyPlusRunner::new(
            "/nonexistent/energyplus-binary",
            Duration::from_secs(5),
        );
        let err = runner
            .run(Path::new("a.idf"), Path::new("w.epw"), Path::new("."))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn fake_energyplus(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("energyplus");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn test_run_success() {
            let dir = tempfile::tempdir().unwrap();
            let exe = fake_energyplus(dir.path(), "exit 0");
            let runner = EnergyPlusRunner::new(exe, Duration::from_secs(10));

            let result = runner
                .run(&dir.path().join("a.idf"), &dir.path().join("w.epw"), dir.path())
                .await;
            tokio_test::assert_ok!(result);
        }

        #[tokio::test]
        async fn test_run_nonzero_exit_captures_output() {
            let dir = tempfile::tempdir().unwrap();
            let exe = fake_energyplus(dir.path(), "echo severe >&2\nexit 3");
            let runner = EnergyPlusRunner::new(exe, Duration::from_secs(10));

            let err = runner
                .run(&dir.path().join("a.idf"), &dir.path().join("w.epw"), dir.path())
                .await
                .unwrap_err();
            match err {
                EngineError::Simulation {
                    code,
                    input,
                    stderr,
                    ..
                } => {
                    assert_eq!(code, Some(3));
                    assert_eq!(input, "a.idf");
                    assert!(stderr.contains("severe"));
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[tokio::test]
        async fn test_run_timeout_kills_process() {
            let dir = tempfile::tempdir().unwrap();
            let exe = fake_energyplus(dir.path(), "exec sleep 30");
            let runner = EnergyPlusRunner::new(exe, Duration::from_millis(200));

            let start = Instant::now();
            let err = runner
                .run(&dir.path().join("a.idf"), &dir.path().join("w.epw"), dir.path())
                .await
                .unwrap_err();
            assert!(err.is_timeout());
            assert!(start.elapsed() < Duration::from_secs(10));
        }
    }
}
