//! Preview server process management - spawning, output streaming and teardown

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Split};
use tokio::process::{Child, ChildStdout};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::shell;

/// Line stream over the preview server's stdout. Lines are raw bytes so a
/// stray non-UTF-8 byte never ends the stream early.
pub type PreviewLines = Split<BufReader<ChildStdout>>;

/// Next line from a split stream, decoded lossily with any trailing `\r`
/// removed. `None` once the stream is closed.
pub async fn read_line<R>(lines: &mut Split<R>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    Ok(lines.next_segment().await?.map(|bytes| {
        let mut line = String::from_utf8_lossy(&bytes).into_owned();
        if line.ends_with('\r') {
            line.pop();
        }
        line
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Unstarted,
    Running,
    Terminated,
}

/// Handle to a preview server running in its own process group
pub struct PreviewProcess {
    state: ProcessState,
    child: Option<Child>,
    pgid: Option<Pid>,
    lines: Option<PreviewLines>,
    drain: Option<JoinHandle<()>>,
    grace: Duration,
}

impl PreviewProcess {
    pub fn new(grace: Duration) -> Self {
        Self {
            state: ProcessState::Unstarted,
            child: None,
            pgid: None,
            lines: None,
            drain: None,
            grace,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Process group id of the running server
    pub fn pgid(&self) -> Option<i32> {
        self.pgid.map(Pid::as_raw)
    }

    /// Spawn `command` in `dir` with stdout captured
    pub fn start(&mut self, command: &str, dir: &Path) -> E2eResult<()> {
        if self.state != ProcessState::Unstarted {
            return Err(E2eError::Process(format!(
                "Preview process cannot start from state {:?}",
                self.state
            )));
        }

        info!("Starting preview server: {}", command);

        let mut cmd = shell::sh(command, dir);
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .process_group(0)
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            E2eError::Process(format!("Failed to spawn `{}`: {}", command, e))
        })?;

        let pid = child
            .id()
            .ok_or_else(|| E2eError::Process("Preview process exited before it was tracked".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Process("Preview process stdout not captured".into()))?;

        self.pgid = Some(Pid::from_raw(pid as i32));
        self.lines = Some(BufReader::new(stdout).split(b'\n'));
        self.child = Some(child);
        self.state = ProcessState::Running;
        debug!("Preview server running (pgid: {})", pid);
        Ok(())
    }

    /// Borrow the output stream. `None` once the stream has been detached
    /// or the process terminated.
    pub fn output(&mut self) -> Option<&mut PreviewLines> {
        self.lines.as_mut()
    }

    /// Keep reading the remaining output in the background so the server
    /// never blocks on a full pipe.
    pub fn detach_output(&mut self) {
        if let Some(mut lines) = self.lines.take() {
            self.drain = Some(tokio::spawn(async move {
                while let Ok(Some(line)) = read_line(&mut lines).await {
                    debug!("[preview] {}", line);
                }
            }));
        }
    }

    /// Interrupt the process group, close the output stream and reap the
    /// child. A no-op unless the process is running.
    pub async fn terminate(&mut self) {
        if self.state != ProcessState::Running {
            self.state = ProcessState::Terminated;
            return;
        }

        if let Some(pgid) = self.pgid {
            info!("Stopping preview server (pgid: {})", pgid);
            signal_group(pgid, Signal::SIGINT);
        }

        self.lines = None;
        if let Some(drain) = self.drain.take() {
            drain.abort();
        }

        if let Some(mut child) = self.child.take() {
            match timeout(self.grace, child.wait()).await {
                Ok(Ok(status)) => debug!("Preview server exited: {}", status),
                Ok(Err(e)) => warn!("Failed to wait for preview server: {}", e),
                Err(_) => {
                    warn!("Preview server ignored SIGINT for {:?}, killing", self.grace);
                    if let Some(pgid) = self.pgid {
                        signal_group(pgid, Signal::SIGKILL);
                    }
                    let _ = child.kill().await;
                }
            }
        }

        // Sweep anything in the group that outlived the shell
        if let Some(pgid) = self.pgid.take() {
            signal_group(pgid, Signal::SIGKILL);
        }

        self.state = ProcessState::Terminated;
    }
}

impl Drop for PreviewProcess {
    fn drop(&mut self) {
        if self.state == ProcessState::Running {
            if let Some(pgid) = self.pgid {
                signal_group(pgid, Signal::SIGKILL);
            }
        }
        if let Some(drain) = self.drain.take() {
            drain.abort();
        }
    }
}

fn signal_group(pgid: Pid, signal: Signal) {
    match killpg(pgid, signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to send {} to process group {}: {}", signal, pgid, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn process() -> PreviewProcess {
        PreviewProcess::new(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_terminate_unstarted_is_noop() {
        let mut proc = process();
        proc.terminate().await;
        assert_eq!(proc.state(), ProcessState::Terminated);
        proc.terminate().await;
        assert_eq!(proc.state(), ProcessState::Terminated);
    }

    #[tokio::test]
    async fn test_start_streams_lines() {
        let dir = TempDir::new().unwrap();
        let mut proc = process();
        proc.start("echo one; echo two", dir.path()).unwrap();
        assert_eq!(proc.state(), ProcessState::Running);

        let lines = proc.output().unwrap();
        assert_eq!(read_line(lines).await.unwrap().as_deref(), Some("one"));
        assert_eq!(read_line(lines).await.unwrap().as_deref(), Some("two"));
        assert_eq!(read_line(lines).await.unwrap(), None);

        proc.terminate().await;
        assert_eq!(proc.state(), ProcessState::Terminated);
        assert!(proc.output().is_none());
    }

    #[tokio::test]
    async fn test_read_line_decodes_invalid_utf8_lossily() {
        let output: &[u8] = b"ok\r\n\xff\xfe\nlast";
        let mut lines = BufReader::new(output).split(b'\n');

        assert_eq!(read_line(&mut lines).await.unwrap().as_deref(), Some("ok"));
        assert_eq!(read_line(&mut lines).await.unwrap().as_deref(), Some("\u{fffd}\u{fffd}"));
        assert_eq!(read_line(&mut lines).await.unwrap().as_deref(), Some("last"));
        assert_eq!(read_line(&mut lines).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_detached_output_keeps_draining_past_invalid_utf8() {
        let dir = TempDir::new().unwrap();
        let mut proc = process();
        // 1 MiB after the bad byte is far more than a pipe buffer holds
        proc.start(
            "echo ready; printf '\\377\\n'; head -c 1048576 /dev/zero | tr '\\0' 'a'; echo; touch done; sleep 30",
            dir.path(),
        )
        .unwrap();

        let lines = proc.output().unwrap();
        assert_eq!(read_line(lines).await.unwrap().as_deref(), Some("ready"));
        proc.detach_output();
        assert!(proc.output().is_none());

        let done = dir.path().join("done");
        for _ in 0..50 {
            if done.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(done.exists(), "preview server blocked writing its output");

        proc.terminate().await;
    }

    #[tokio::test]
    async fn test_terminate_kills_process_group() {
        let dir = TempDir::new().unwrap();
        let mut proc = process();
        // The background job ignores SIGINT, so only the group sweep stops it
        proc.start("(sleep 1; touch survived) & sleep 30", dir.path()).unwrap();
        assert!(proc.pgid().is_some());

        proc.terminate().await;
        assert_eq!(proc.state(), ProcessState::Terminated);
        assert!(proc.pgid().is_none());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!dir.path().join("survived").exists());
    }

    #[tokio::test]
    async fn test_terminate_escalates_when_interrupt_ignored() {
        let dir = TempDir::new().unwrap();
        let mut proc = PreviewProcess::new(Duration::from_millis(200));
        proc.start("trap '' INT; sleep 1; touch survived", dir.path()).unwrap();

        let started = std::time::Instant::now();
        proc.terminate().await;
        assert!(started.elapsed() < Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!dir.path().join("survived").exists());
    }

    #[tokio::test]
    async fn test_start_twice_is_error() {
        let dir = TempDir::new().unwrap();
        let mut proc = process();
        proc.start("sleep 30", dir.path()).unwrap();
        assert!(proc.start("sleep 30", dir.path()).is_err());
        proc.terminate().await;
        assert!(proc.start("sleep 30", dir.path()).is_err());
    }
}
