//! Command execution on the local machine.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, StepError};
use crate::services::{CommandOutput, CommandRunner, CommandSpec};

/// How long to keep reading output after a timed-out command was killed.
const PIPE_DRAIN_LIMIT: Duration = Duration::from_secs(5);

/// Runs commands as child processes inside a working directory.
#[derive(Debug, Clone)]
pub struct LocalCommandRunner {
    workdir: PathBuf,
}

impl LocalCommandRunner {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!(error = %e, "failed to read command output");
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn collect(handle: tokio::task::JoinHandle<String>, limit: Option<Duration>) -> String {
    let joined = match limit {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => return String::new(),
        },
        None => handle.await,
    };
    joined.unwrap_or_default()
}

#[async_trait]
impl CommandRunner for LocalCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let (program, args) = spec.argv.split_first().ok_or(StepError::EmptyCommand)?;

        // A results file left over from an earlier run must not be mistaken
        // for this run's output.
        if let Some(logfile) = &spec.logfile {
            match tokio::fs::remove_file(self.workdir.join(logfile)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let start = Instant::now();
        let mut child = Command::new(program)
            .args(args)
            .envs(&spec.env)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| StepError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = tokio::spawn(read_pipe(child.stdout.take()));
        let stderr = tokio::spawn(read_pipe(child.stderr.take()));

        let (status, timed_out) = match spec.timeout {
            Some(limit) => {
                let waited = tokio::time::timeout(limit, child.wait()).await;
                match waited {
                    Ok(status) => (Some(status?), false),
                    Err(_) => {
                        warn!(command = %spec, timeout_secs = limit.as_secs(), "command timed out");
                        child.kill().await?;
                        (None, true)
                    }
                }
            }
            None => (Some(child.wait().await?), false),
        };

        let drain_limit = timed_out.then_some(PIPE_DRAIN_LIMIT);
        let stdout = collect(stdout, drain_limit).await;
        let stderr = collect(stderr, drain_limit).await;

        let logfile = match &spec.logfile {
            Some(logfile) => tokio::fs::read_to_string(self.workdir.join(logfile))
                .await
                .ok(),
            None => None,
        };

        Ok(CommandOutput {
            exit_code: status.and_then(|s| s.code()).unwrap_or(-1),
            stdout,
            stderr,
            timed_out,
            duration_ms: start.elapsed().as_millis() as u64,
            logfile,
        })
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<()> {
        let target = self.workdir.join(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, contents).await?;
        Ok(())
    }
}
