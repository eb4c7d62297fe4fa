//! Managed RRDtool subprocess.
//!
//! [`StorageChannel`] owns at most one `rrdtool -` process and talks to it over
//! its stdin/stdout pipes. Liveness is an explicit [`ChannelState`]: every
//! command first reaps an exited process and respawns through
//! [`StorageChannel::ensure_running`] before anything is written.

use std::fs::OpenOptions;
use std::io::{BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

use crate::storage::StorageError;
use crate::storage::command::{Reply, RrdCommand, read_reply, request_line};

/// How long [`StorageChannel::stop`] waits for the engine to exit on EOF.
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Poll interval while waiting for the engine to exit.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A live engine process with its pipes.
struct Subprocess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Subprocess {
    fn spawn(binary: &Path) -> Result<Self, StorageError> {
        let mut child = Command::new(binary)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| StorageError::ProcessSpawn {
                binary: binary.to_path_buf(),
                source,
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(StorageError::Internal(
                "subprocess pipes were not captured".to_string(),
            ));
        };

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Send one request line and read its reply.
    fn exchange(&mut self, line: &str) -> Result<Reply, StorageError> {
        if let Err(e) = self
            .stdin
            .write_all(line.as_bytes())
            .and_then(|()| self.stdin.flush())
        {
            return Err(if e.kind() == ErrorKind::BrokenPipe {
                StorageError::ChannelClosed
            } else {
                StorageError::Io(e)
            });
        }
        read_reply(&mut self.stdout)
    }

    /// Close stdin and wait for the process, killing it after the grace period.
    fn shutdown(self) {
        let Self {
            mut child, stdin, ..
        } = self;
        drop(stdin);

        let deadline = Instant::now() + STOP_GRACE_PERIOD;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(%status, "RRDtool subprocess exited");
                    return;
                }
                Ok(None) if Instant::now() < deadline => std::thread::sleep(STOP_POLL_INTERVAL),
                _ => break,
            }
        }

        tracing::warn!(pid = child.id(), "RRDtool did not exit on EOF, killing it");
        let _ = child.kill();
        let _ = child.wait();
    }
}

/// Channel lifecycle.
enum ChannelState {
    Stopped,
    Running(Subprocess),
}

/// Line-protocol channel to a supervised RRDtool process.
pub struct StorageChannel {
    binary: PathBuf,
    base_dir: PathBuf,
    state: ChannelState,
    spawn_count: u64,
}

impl std::fmt::Debug for StorageChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageChannel")
            .field("binary", &self.binary)
            .field("base_dir", &self.base_dir)
            .field("running", &self.is_running())
            .field("spawn_count", &self.spawn_count)
            .finish()
    }
}

impl StorageChannel {
    /// Create a stopped channel. Nothing is spawned until the first command
    /// or an explicit [`ensure_running`](Self::ensure_running).
    pub fn new(binary: impl Into<PathBuf>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            base_dir: base_dir.into(),
            state: ChannelState::Stopped,
            spawn_count: 0,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Whether a subprocess handle is currently held.
    ///
    /// This does not poll; a process that died since the last command is
    /// still reported as running until the next command reaps it.
    pub fn is_running(&self) -> bool {
        matches!(self.state, ChannelState::Running(_))
    }

    /// Number of subprocesses started over the channel's lifetime.
    pub fn spawn_count(&self) -> u64 {
        self.spawn_count
    }

    /// Process id of the running subprocess.
    pub fn pid(&self) -> Option<u32> {
        match &self.state {
            ChannelState::Running(sub) => Some(sub.child.id()),
            ChannelState::Stopped => None,
        }
    }

    /// Spawn the engine unless one is already alive.
    ///
    /// Before spawning, the base directory is created if missing and checked
    /// for writability.
    pub fn ensure_running(&mut self) -> Result<(), StorageError> {
        self.reap();
        if self.is_running() {
            return Ok(());
        }

        ensure_writable_dir(&self.base_dir)?;
        let sub = Subprocess::spawn(&self.binary)?;
        tracing::info!(pid = sub.child.id(), binary = %self.binary.display(), "Started RRDtool subprocess");

        self.state = ChannelState::Running(sub);
        self.spawn_count += 1;
        Ok(())
    }

    /// Send one command and return the engine's reply.
    ///
    /// A non-`OK` reply is returned as [`StorageError::Command`]. If the
    /// engine turns out to be dead before it answered anything, it is
    /// respawned and the line is sent once more.
    pub fn run(
        &mut self,
        command: RrdCommand,
        path: &Path,
        args: &str,
    ) -> Result<Reply, StorageError> {
        let line = request_line(command, path, args);

        let reply = match self.transmit(&line) {
            Err(StorageError::ChannelClosed) => {
                tracing::warn!(%command, path = %path.display(), "RRDtool went away before replying, resending");
                self.transmit(&line)?
            }
            other => other?,
        };

        if !reply.is_ok() {
            return Err(StorageError::Command {
                command,
                path: path.to_path_buf(),
                reply: reply.text(),
            });
        }
        Ok(reply)
    }

    /// Stop the subprocess, if any.
    pub fn stop(&mut self) {
        if let ChannelState::Running(sub) = std::mem::replace(&mut self.state, ChannelState::Stopped) {
            tracing::info!(pid = sub.child.id(), "Stopping RRDtool subprocess");
            sub.shutdown();
        }
    }

    fn transmit(&mut self, line: &str) -> Result<Reply, StorageError> {
        self.ensure_running()?;
        let ChannelState::Running(sub) = &mut self.state else {
            return Err(StorageError::Internal(
                "channel stopped right after start".to_string(),
            ));
        };

        let result = sub.exchange(line);
        if matches!(
            result,
            Err(StorageError::ChannelClosed | StorageError::TruncatedReply(_) | StorageError::Io(_))
        ) {
            self.discard();
        }
        result
    }

    /// Transition to `Stopped` if the subprocess has exited.
    fn reap(&mut self) {
        let ChannelState::Running(sub) = &mut self.state else {
            return;
        };

        match sub.child.try_wait() {
            Ok(None) => {}
            Ok(Some(status)) => {
                tracing::info!(%status, "RRDtool seemed to exit, restarting it");
                self.state = ChannelState::Stopped;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to poll RRDtool subprocess, restarting it");
                self.discard();
            }
        }
    }

    /// Drop a broken subprocess without waiting on its pipes.
    fn discard(&mut self) {
        if let ChannelState::Running(mut sub) =
            std::mem::replace(&mut self.state, ChannelState::Stopped)
        {
            let _ = sub.child.kill();
            let _ = sub.child.wait();
        }
    }
}

impl Drop for StorageChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Create `dir` if missing and check a file can be written in it.
pub(crate) fn ensure_writable_dir(dir: &Path) -> Result<(), StorageError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| StorageError::DirectoryAccess {
            path: dir.to_path_buf(),
            reason: format!("unable to create directory: {e}"),
        })?;
    }
    if !dir.is_dir() {
        return Err(StorageError::DirectoryAccess {
            path: dir.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }

    let probe = dir.join(format!(".write-probe-{}", std::process::id()));
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&probe)
        .map_err(|e| StorageError::DirectoryAccess {
            path: dir.to_path_buf(),
            reason: format!("unable to write in the directory: {e}"),
        })?;
    let _ = std::fs::remove_file(&probe);
    Ok(())
}
