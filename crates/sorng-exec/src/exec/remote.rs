// ── Remote execution context (SSH exec channels + SFTP) ─────────────────────

use crate::exec::auth::{self, AuthMethod};
use crate::exec::config::{DialConfig, HostKeyPolicy};
use crate::exec::connection::Connection;
use crate::exec::error::{ExecError, ExecResult};
use crate::exec::local::line_text;
use crate::exec::session::{OutputBuffer, Session};
use crate::exec::transfer::shell_escape;
use crate::exec::types::{ByteSink, ByteSource, ConnectionKind, FileMode, LineConsumer};
use async_trait::async_trait;
use log::{debug, info, warn};
use sorng_core::{host_of, normalize_address, port_of};
use ssh2::{CheckResult, ExtendedData, KnownHostFileKind, MethodType, OpenFlags, OpenType};
use std::io::{self, BufRead, BufReader, ErrorKind, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// An authenticated SSH session to one host.
pub struct RemoteConnection {
    address: String,
    username: String,
    session: ssh2::Session,
    // Keeps the socket alive for the lifetime of the session.
    _tcp: TcpStream,
    sftp: Arc<StdMutex<Option<ssh2::Sftp>>>,
    streaming: StreamingCount,
}

impl std::fmt::Debug for RemoteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConnection")
            .field("address", &self.address)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl RemoteConnection {
    /// Connect, negotiate and authenticate.
    pub async fn dial(
        username: &str,
        auth: AuthMethod,
        addr: &str,
        config: &DialConfig,
    ) -> ExecResult<Self> {
        let address = normalize_address(addr)?;
        let username = username.to_string();
        let config = config.clone();
        tokio::task::spawn_blocking(move || dial_blocking(address, username, auth, config)).await?
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Run `f` against the connection's SFTP subsystem, opening it on first use.
    async fn with_sftp<T, F>(&self, f: F) -> ExecResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&ssh2::Sftp) -> ExecResult<T> + Send + 'static,
    {
        let session = self.session.clone();
        let cache = self.sftp.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = cache
                .lock()
                .map_err(|_| ExecError::session_failed("SFTP handle lock poisoned"))?;
            if guard.is_none() {
                let sftp = session
                    .sftp()
                    .map_err(|e| ExecError::session_failed(format!("SFTP subsystem unavailable: {}", e)))?;
                *guard = Some(sftp);
            }
            match guard.as_ref() {
                Some(sftp) => f(sftp),
                None => Err(ExecError::session_failed("SFTP subsystem unavailable")),
            }
        })
        .await?
    }
}

fn dial_blocking(
    address: String,
    username: String,
    auth: AuthMethod,
    config: DialConfig,
) -> ExecResult<RemoteConnection> {
    info!("SSH connecting to {} as {}", address, username);
    let timeout = config.connect_timeout();

    let socket_addr = address
        .to_socket_addrs()
        .map_err(|e| ExecError::connection_failed(format!("cannot resolve {}: {}", address, e)))?
        .next()
        .ok_or_else(|| ExecError::connection_failed(format!("no socket address for {}", address)))?;

    let tcp = TcpStream::connect_timeout(&socket_addr, timeout).map_err(|e| {
        ExecError::connection_failed(format!("TCP connection to {} failed: {}", address, e))
    })?;

    let mut session = ssh2::Session::new()
        .map_err(|e| ExecError::handshake_failed(format!("failed to create SSH session: {}", e)))?;
    session.set_timeout(timeout.as_millis().min(u32::MAX as u128) as u32);
    session.set_compress(config.compress);

    let ciphers = config.cipher_pref();
    for direction in [MethodType::CryptCs, MethodType::CryptSc] {
        session.method_pref(direction, &ciphers).map_err(|e| {
            ExecError::handshake_failed(format!("cipher preference '{}' rejected: {}", ciphers, e))
        })?;
    }

    session.set_tcp_stream(tcp.try_clone()?);
    session.handshake().map_err(|e| {
        ExecError::handshake_failed(format!("SSH handshake with {} failed: {}", address, e))
    })?;

    verify_host_key(&session, &address, &config)?;
    auth::authenticate(&session, &username, &auth)?;

    session.set_timeout(0);
    if config.keepalive_interval_secs > 0 {
        session.set_keepalive(true, config.keepalive_interval_secs);
    }

    info!("SSH connected to {} as {}", address, username);
    Ok(RemoteConnection {
        address,
        username,
        session,
        _tcp: tcp,
        sftp: Arc::new(StdMutex::new(None)),
        streaming: StreamingCount::default(),
    })
}

fn verify_host_key(session: &ssh2::Session, address: &str, config: &DialConfig) -> ExecResult<()> {
    if config.host_key_policy == HostKeyPolicy::AcceptAll {
        warn!("host key of {} accepted without verification", address);
        return Ok(());
    }

    let (key, _) = session
        .host_key()
        .ok_or_else(|| ExecError::host_key_rejected(format!("{} presented no host key", address)))?;
    let path = config.resolved_known_hosts_path().ok_or_else(|| {
        ExecError::host_key_rejected("no known_hosts file configured and no home directory")
    })?;

    let mut known = session.known_hosts()?;
    known
        .read_file(&path, KnownHostFileKind::OpenSSH)
        .map_err(|e| {
            ExecError::host_key_rejected(format!("cannot read '{}': {}", path.display(), e))
        })?;

    match known.check_port(host_of(address), port_of(address), key) {
        CheckResult::Match => Ok(()),
        CheckResult::Mismatch => Err(ExecError::host_key_rejected(format!(
            "host key of {} does not match '{}'",
            address,
            path.display()
        ))),
        CheckResult::NotFound => Err(ExecError::host_key_rejected(format!(
            "{} is not listed in '{}'",
            address,
            path.display()
        ))),
        CheckResult::Failure => Err(ExecError::host_key_rejected(format!(
            "host key check for {} failed",
            address
        ))),
    }
}

/// Run a short command to completion on a fresh channel. Blocking.
fn exec_blocking(session: &ssh2::Session, command: &str) -> ExecResult<String> {
    let mut channel = session.channel_session()?;
    channel.handle_extended_data(ExtendedData::Merge)?;
    channel.exec(command)?;
    let mut out = String::new();
    channel.read_to_string(&mut out)?;
    channel.wait_close()?;
    match channel.exit_status()? {
        0 => Ok(out),
        code => Err(ExecError::non_zero_exit(code).with_output(out)),
    }
}

fn remote_mkdir_p(session: &ssh2::Session, path: &str) -> ExecResult<()> {
    let parent = match Path::new(path).parent().and_then(|p| p.to_str()) {
        Some(p) if !p.is_empty() && p != "/" => p,
        _ => return Ok(()),
    };
    exec_blocking(session, &format!("mkdir -p {}", shell_escape(parent)))
        .map(|_| ())
        .map_err(|e| ExecError::io(format!("cannot create remote directory '{}': {}", parent, e)))
}

#[async_trait]
impl Connection for RemoteConnection {
    fn address(&self) -> &str {
        &self.address
    }

    fn host(&self) -> &str {
        host_of(&self.address)
    }

    fn kind(&self) -> ConnectionKind {
        ConnectionKind::Remote
    }

    async fn close(&mut self) -> ExecResult<()> {
        if let Ok(mut guard) = self.sftp.lock() {
            guard.take();
        }
        let session = self.session.clone();
        tokio::task::spawn_blocking(move || {
            session
                .disconnect(None, "Client disconnecting", None)
                .map_err(|e| ExecError::connection_failed(format!("disconnect failed: {}", e)))
        })
        .await??;
        info!("SSH disconnected from {}", self.address);
        Ok(())
    }

    async fn new_session(&self, ctx: &CancellationToken) -> ExecResult<Box<dyn Session>> {
        Ok(Box::new(RemoteSession::new(
            self.session.clone(),
            self.streaming.clone(),
            ctx,
        )))
    }

    async fn open_sink(&self, path: &str, mode: FileMode) -> ExecResult<ByteSink> {
        let session = self.session.clone();
        let dir_path = path.to_string();
        tokio::task::spawn_blocking(move || remote_mkdir_p(&session, &dir_path)).await??;

        let path = path.to_string();
        self.with_sftp(move |sftp| {
            let target = Path::new(&path);
            let file = sftp
                .open_mode(
                    target,
                    OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
                    mode.permissions() as i32,
                    OpenType::File,
                )
                .map_err(|e| ExecError::io(format!("cannot create remote '{}': {}", path, e)))?;
            let mut stat = sftp
                .stat(target)
                .map_err(|e| ExecError::io(format!("cannot stat remote '{}': {}", path, e)))?;
            stat.perm = Some(mode.permissions());
            sftp.setstat(target, stat)
                .map_err(|e| ExecError::io(format!("cannot chmod remote '{}': {}", path, e)))?;
            Ok(Box::new(file) as ByteSink)
        })
        .await
    }

    async fn open_source(&self, path: &str) -> ExecResult<ByteSource> {
        let path = path.to_string();
        self.with_sftp(move |sftp| {
            sftp.open(Path::new(&path))
                .map(|file| Box::new(file) as ByteSource)
                .map_err(|e| ExecError::io(format!("cannot open remote '{}': {}", path, e)))
        })
        .await
    }

    async fn file_size(&self, path: &str) -> ExecResult<u64> {
        let path = path.to_string();
        self.with_sftp(move |sftp| {
            sftp.stat(Path::new(&path))
                .map(|stat| stat.size.unwrap_or(0))
                .map_err(|e| ExecError::io(format!("cannot stat remote '{}': {}", path, e)))
        })
        .await
    }
}

// ── Session ──────────────────────────────────────────────────────────────────

/// libssh2 timeout while a command streams. Blocking channel calls return at
/// least this often, so a worker notices cancellation and releases the
/// session lock between calls.
const STREAM_POLL_MS: u32 = 250;

/// Commands currently streaming on one SSH session.
#[derive(Clone, Default)]
struct StreamingCount(Arc<StdMutex<usize>>);

/// Keeps the session at [`STREAM_POLL_MS`] while alive. The last guard to
/// drop puts blocking calls back to no timeout.
struct StreamingGuard {
    session: ssh2::Session,
    count: StreamingCount,
}

impl StreamingGuard {
    fn enter(session: &ssh2::Session, count: &StreamingCount) -> Self {
        if let Ok(mut active) = count.0.lock() {
            if *active == 0 {
                session.set_timeout(STREAM_POLL_MS);
            }
            *active += 1;
        }
        Self {
            session: session.clone(),
            count: count.clone(),
        }
    }
}

impl Drop for StreamingGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.count.0.lock() {
            *active = active.saturating_sub(1);
            if *active == 0 {
                self.session.set_timeout(0);
            }
        }
    }
}

/// One command on one SSH exec channel.
pub struct RemoteSession {
    id: String,
    session: ssh2::Session,
    streaming: StreamingCount,
    /// Child of the caller's token. `close` cancels it to stop a running worker.
    ctx: CancellationToken,
    output: OutputBuffer,
    started: bool,
    /// Channel whose stdout has been fully consumed by a line consumer.
    channel: Option<ssh2::Channel>,
    /// Drains the channel into the output buffer, then waits for the exit status.
    worker: Option<JoinHandle<ExecResult<i32>>>,
}

impl RemoteSession {
    fn new(session: ssh2::Session, streaming: StreamingCount, ctx: &CancellationToken) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session,
            streaming,
            ctx: ctx.child_token(),
            output: OutputBuffer::default(),
            started: false,
            channel: None,
            worker: None,
        }
    }
}

fn is_retryable(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}

fn close_channel(channel: &mut ssh2::Channel) {
    if let Err(e) = channel.close() {
        debug!("closing exec channel failed: {}", e);
    }
}

/// Append everything `reader` yields to `output` until EOF. Blocking.
fn drain_into<R: Read>(
    reader: &mut R,
    output: &OutputBuffer,
    ctx: &CancellationToken,
) -> ExecResult<()> {
    let mut buf = [0u8; 8192];
    loop {
        if ctx.is_cancelled() {
            return Err(ExecError::cancelled("remote command cancelled"));
        }
        match reader.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => output.append(&buf[..n]),
            Err(e) if is_retryable(&e) => continue,
            Err(e) => return Err(ExecError::pipe_failed(format!("reading channel: {}", e))),
        }
    }
}

/// Hand each line of `reader` to `consumer` until EOF. A read that times out
/// keeps the partial line for the next pass. Blocking.
fn feed_lines<R: Read>(
    reader: R,
    consumer: &mut dyn FnMut(String),
    ctx: &CancellationToken,
) -> ExecResult<()> {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        if ctx.is_cancelled() {
            return Err(ExecError::cancelled(
                "remote command cancelled while streaming stdout",
            ));
        }
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => {
                if !line.is_empty() {
                    consumer(line_text(&line));
                }
                return Ok(());
            }
            Ok(_) => {
                if line.ends_with(b"\n") {
                    consumer(line_text(&line));
                    line.clear();
                }
            }
            Err(e) if is_retryable(&e) => continue,
            Err(e) => return Err(ExecError::pipe_failed(format!("reading channel: {}", e))),
        }
    }
}

/// Wait for the remote side to close the channel and return its exit status.
fn wait_for_exit(channel: &mut ssh2::Channel, ctx: &CancellationToken) -> ExecResult<i32> {
    loop {
        if ctx.is_cancelled() {
            return Err(ExecError::cancelled("remote command cancelled"));
        }
        match channel.wait_close() {
            Ok(()) => return Ok(channel.exit_status()?),
            Err(e) => {
                let e = io::Error::from(e);
                if !is_retryable(&e) {
                    return Err(e.into());
                }
            }
        }
    }
}

/// Worker for a command without a consumer: merged output into `output`,
/// then the exit status. The channel is closed on every error. Blocking.
fn drain_and_wait(
    mut channel: ssh2::Channel,
    session: ssh2::Session,
    streaming: StreamingCount,
    output: OutputBuffer,
    ctx: CancellationToken,
) -> ExecResult<i32> {
    let _poll = StreamingGuard::enter(&session, &streaming);
    let result = drain_into(&mut channel, &output, &ctx)
        .and_then(|()| wait_for_exit(&mut channel, &ctx));
    if result.is_err() {
        close_channel(&mut channel);
    }
    result
}

/// Worker feeding stdout to a consumer. Hands the channel back at EOF.
fn feed_channel(
    mut channel: ssh2::Channel,
    mut consumer: LineConsumer,
    session: ssh2::Session,
    streaming: StreamingCount,
    ctx: CancellationToken,
) -> ExecResult<ssh2::Channel> {
    let _poll = StreamingGuard::enter(&session, &streaming);
    match feed_lines(&mut channel, &mut consumer, &ctx) {
        Ok(()) => Ok(channel),
        Err(e) => {
            close_channel(&mut channel);
            Err(e)
        }
    }
}

fn wait_channel(
    mut channel: ssh2::Channel,
    session: ssh2::Session,
    streaming: StreamingCount,
    ctx: CancellationToken,
) -> ExecResult<i32> {
    let _poll = StreamingGuard::enter(&session, &streaming);
    let result = wait_for_exit(&mut channel, &ctx);
    if result.is_err() {
        close_channel(&mut channel);
    }
    result
}

/// Remove a leading `[sudo] password for …:` prompt from captured output.
pub(crate) fn strip_sudo_prompt(output: &str) -> String {
    if output.starts_with("[sudo]") {
        if let Some((_, rest)) = output.split_once(':') {
            return rest.strip_prefix(' ').unwrap_or(rest).to_string();
        }
    }
    output.to_string()
}

#[async_trait]
impl Session for RemoteSession {
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

        let opener = self.session.clone();
        let cmd = command.to_string();
        let merge = consumer.is_none();
        let channel = tokio::task::spawn_blocking(move || -> ExecResult<ssh2::Channel> {
            let mut channel = opener.channel_session().map_err(|e| {
                ExecError::session_failed(format!("failed to open exec channel: {}", e))
            })?;
            let mode = if merge {
                ExtendedData::Merge
            } else {
                ExtendedData::Ignore
            };
            channel
                .handle_extended_data(mode)
                .map_err(|e| ExecError::pipe_failed(format!("cannot route stderr: {}", e)))?;
            channel.exec(&cmd).map_err(|e| {
                ExecError::spawn_failed(format!("failed to start '{}': {}", cmd, e))
            })?;
            Ok(channel)
        })
        .await??;
        debug!("[remote:{}] started: {}", self.id, command);

        let session = self.session.clone();
        let streaming = self.streaming.clone();
        let ctx = self.ctx.clone();
        match consumer {
            None => {
                let output = self.output.clone();
                self.worker = Some(tokio::task::spawn_blocking(move || {
                    drain_and_wait(channel, session, streaming, output, ctx)
                }));
            }
            Some(consumer) => {
                let channel = tokio::task::spawn_blocking(move || {
                    feed_channel(channel, consumer, session, streaming, ctx)
                })
                .await??;
                self.channel = Some(channel);
            }
        }
        Ok(())
    }

    async fn wait(&mut self) -> ExecResult<()> {
        let status = if let Some(worker) = self.worker.take() {
            worker.await??
        } else if let Some(channel) = self.channel.take() {
            let session = self.session.clone();
            let streaming = self.streaming.clone();
            let ctx = self.ctx.clone();
            tokio::task::spawn_blocking(move || wait_channel(channel, session, streaming, ctx))
                .await??
        } else {
            return Err(ExecError::session_failed("no command has been started"));
        };
        debug!("[remote:{}] finished with status {}", self.id, status);

        match status {
            0 => Ok(()),
            code => Err(ExecError::non_zero_exit(code)),
        }
    }

    async fn close(&mut self) -> ExecResult<()> {
        // A worker still running here outlived a failed action; stop it and
        // let it close the channel before the connection is reused.
        self.ctx.cancel();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await? {
                debug!("[remote:{}] stopped: {}", self.id, e);
            }
        }
        if let Some(mut channel) = self.channel.take() {
            tokio::task::spawn_blocking(move || channel.close()).await??;
        }
        Ok(())
    }

    fn output(&self) -> String {
        strip_sudo_prompt(&self.output.text())
    }
}
