// ── Local execution context ──────────────────────────────────────────────────

use crate::exec::connection::Connection;
use crate::exec::error::{ExecError, ExecErrorKind, ExecResult};
use crate::exec::session::{OutputBuffer, Session};
use crate::exec::transfer;
use crate::exec::types::{
    ByteSink, ByteSource, ConnectionKind, FileMode, LineConsumer, DEFAULT_LOCAL_ADDRESS,
};
use async_trait::async_trait;
use log::debug;
use sorng_core::host_of;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The current machine. Never dials; the address is informational.
#[derive(Debug, Clone)]
pub struct LocalConnection {
    address: String,
}

impl LocalConnection {
    pub fn new() -> Self {
        Self::at(DEFAULT_LOCAL_ADDRESS)
    }

    pub fn at(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl Default for LocalConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connection for LocalConnection {
    fn address(&self) -> &str {
        &self.address
    }

    fn host(&self) -> &str {
        host_of(&self.address)
    }

    fn kind(&self) -> ConnectionKind {
        ConnectionKind::Local
    }

    async fn close(&mut self) -> ExecResult<()> {
        Ok(())
    }

    async fn new_session(&self, ctx: &CancellationToken) -> ExecResult<Box<dyn Session>> {
        Ok(Box::new(LocalSession::new(ctx.clone())))
    }

    async fn open_sink(&self, path: &str, mode: FileMode) -> ExecResult<ByteSink> {
        transfer::open_local_sink(path, mode)
    }

    async fn open_source(&self, path: &str) -> ExecResult<ByteSource> {
        transfer::open_local_source(path)
    }

    async fn file_size(&self, path: &str) -> ExecResult<u64> {
        transfer::local_file_size(path)
    }
}

// ── Session ──────────────────────────────────────────────────────────────────

/// A subprocess run through the platform shell.
pub struct LocalSession {
    id: String,
    ctx: CancellationToken,
    child: Option<Child>,
    output: OutputBuffer,
    pumps: Vec<JoinHandle<()>>,
    started: bool,
}

impl LocalSession {
    pub fn new(ctx: CancellationToken) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            ctx,
            child: None,
            output: OutputBuffer::default(),
            pumps: Vec::new(),
            started: false,
        }
    }

    fn abort_pumps(&mut self) {
        for pump in self.pumps.drain(..) {
            pump.abort();
        }
    }
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(not(windows))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

/// Append everything read from `pipe` to `output` until end of stream.
async fn pump_into<R: AsyncRead + Unpin>(mut pipe: R, output: OutputBuffer) {
    let mut buf = [0u8; 8192];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => output.append(&buf[..n]),
        }
    }
}

/// Feed `pipe` to `consumer` one line at a time, newline stripped.
async fn feed_lines<R: AsyncRead + Unpin>(
    pipe: R,
    mut consumer: LineConsumer,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(pipe);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(());
        }
        consumer(line_text(&line));
    }
}

pub(crate) fn line_text(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[async_trait]
impl Session for LocalSession {
    async fn run_with_consumer(
        &mut self,
        command: &str,
        consumer: Option<LineConsumer>,
    ) -> ExecResult<()> {
        if self.started {
            return Err(ExecError::unsupported("a session runs a single command"));
        }
        self.started = true;

        if self.ctx.is_cancelled() {
            return Err(ExecError::cancelled("cancelled before start"));
        }

        let mut cmd = shell_command(command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| ExecError::spawn_failed(format!("failed to start '{}': {}", command, e)))?;
        debug!("[local:{}] started: {}", self.id, command);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecError::pipe_failed("stdout pipe unavailable"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecError::pipe_failed("stderr pipe unavailable"))?;

        self.pumps
            .push(tokio::spawn(pump_into(stderr, self.output.clone())));
        self.child = Some(child);

        let consumer = match consumer {
            None => {
                self.pumps
                    .push(tokio::spawn(pump_into(stdout, self.output.clone())));
                return Ok(());
            }
            Some(consumer) => consumer,
        };

        let mut reader = tokio::spawn(feed_lines(stdout, consumer));
        let finished = tokio::select! {
            biased;
            res = &mut reader => Some(res),
            _ = self.ctx.cancelled() => None,
        };

        match finished {
            Some(res) => res?
                .map_err(|e| ExecError::pipe_failed(format!("reading stdout: {}", e))),
            None => {
                reader.abort();
                if let Some(child) = self.child.as_mut() {
                    let _ = child.start_kill();
                }
                self.abort_pumps();
                Err(ExecError::cancelled("command cancelled while streaming stdout"))
            }
        }
    }

    async fn wait(&mut self) -> ExecResult<()> {
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| ExecError::session_failed("no command has been started"))?;

        let exited = tokio::select! {
            biased;
            status = child.wait() => Some(status),
            _ = self.ctx.cancelled() => None,
        };

        let status = match exited {
            Some(status) => status.map_err(|e| ExecError::io(format!("wait failed: {}", e)))?,
            None => {
                let _ = child.kill().await;
                self.abort_pumps();
                debug!("[local:{}] killed on cancellation", self.id);
                return Err(ExecError::cancelled("command cancelled"));
            }
        };

        for pump in self.pumps.drain(..) {
            let _ = pump.await;
        }
        debug!("[local:{}] finished: {}", self.id, status);

        if status.success() {
            return Ok(());
        }
        match status.code() {
            Some(code) => Err(ExecError::non_zero_exit(code)),
            None => Err(ExecError::new(
                ExecErrorKind::NonZeroExit,
                format!("command terminated: {}", status),
            )),
        }
    }

    async fn close(&mut self) -> ExecResult<()> {
        Ok(())
    }

    fn output(&self) -> String {
        self.output.text()
    }
}
