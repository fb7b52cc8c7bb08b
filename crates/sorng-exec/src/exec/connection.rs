//! Execution contexts.
//!
//! A [`Connection`] only knows how to open sessions and files on its own
//! side. Command execution and the copy family are layered on top once, in
//! [`ConnectionExt`], and are available on every connection.

use crate::exec::error::ExecResult;
use crate::exec::monitor::monitored_copy;
use crate::exec::session::Session;
use crate::exec::transfer;
use crate::exec::types::{ByteSink, ByteSource, ConnectionKind, FileMode};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use log::debug;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait Connection: Send + Sync {
    /// `host:port` this connection targets.
    fn address(&self) -> &str;

    fn host(&self) -> &str;

    fn kind(&self) -> ConnectionKind;

    /// Release the connection. Using it afterwards is a caller error.
    async fn close(&mut self) -> ExecResult<()>;

    async fn new_session(&self, ctx: &CancellationToken) -> ExecResult<Box<dyn Session>>;

    /// Open `path` on this connection's side for writing, creating missing
    /// parent directories and applying `mode`.
    async fn open_sink(&self, path: &str, mode: FileMode) -> ExecResult<ByteSink>;

    async fn open_source(&self, path: &str) -> ExecResult<ByteSource>;

    async fn file_size(&self, path: &str) -> ExecResult<u64>;
}

/// Execution and copy operations shared by every [`Connection`].
#[async_trait]
pub trait ConnectionExt: Connection {
    /// Open a session, hand it to `action`, then wait for the command.
    ///
    /// An `action` error is returned at once with the output captured so far;
    /// otherwise the result of waiting is returned. Errors carry the output.
    /// The session is closed on every path.
    async fn execute<F>(&self, ctx: &CancellationToken, action: F) -> ExecResult<String>
    where
        F: for<'s> FnOnce(&'s mut dyn Session) -> BoxFuture<'s, ExecResult<()>> + Send,
    {
        let mut session = self.new_session(ctx).await?;

        let acted = action(session.as_mut()).await;
        let outcome = match acted {
            Err(e) => Err(e.with_output(session.output())),
            Ok(()) => {
                let waited = session.wait().await;
                match waited {
                    Ok(()) => Ok(session.output()),
                    Err(e) => Err(e.with_output(session.output())),
                }
            }
        };

        if let Err(e) = session.close().await {
            debug!("closing session on {} failed: {}", self.address(), e);
        }
        outcome
    }

    /// Run one shell command and return its combined stdout and stderr.
    async fn execute_shell(&self, ctx: &CancellationToken, command: &str) -> ExecResult<String> {
        let command = command.to_string();
        self.execute(ctx, move |session| {
            async move { session.run(&command).await }.boxed()
        })
        .await
    }

    /// Write everything from `source` to `dest` on this connection's side.
    async fn copy_stream_to_remote(
        &self,
        ctx: &CancellationToken,
        source: ByteSource,
        dest: &str,
        mode: &str,
    ) -> ExecResult<u64> {
        let mode = FileMode::parse(mode)?;
        let sink = self.open_sink(dest, mode).await?;
        let copied = transfer::pump_blocking(ctx.clone(), source, sink).await?;
        debug!("copied {} bytes to {}:{}", copied, self.address(), dest);
        Ok(copied)
    }

    /// [`copy_stream_to_remote`](Self::copy_stream_to_remote) reporting the
    /// destination size on `progress`. The channel is closed on return.
    async fn copy_stream_to_remote_monitored(
        &self,
        ctx: &CancellationToken,
        source: ByteSource,
        dest: &str,
        mode: &str,
        progress: mpsc::Sender<u64>,
    ) -> ExecResult<u64> {
        let mode = FileMode::parse(mode)?;
        let sink = self.open_sink(dest, mode).await?;
        monitored_copy(ctx, source, sink, || self.file_size(dest), progress).await
    }

    async fn copy_local_file_to_remote(
        &self,
        ctx: &CancellationToken,
        source: &str,
        dest: &str,
        mode: &str,
    ) -> ExecResult<u64> {
        let reader = transfer::open_local_source(source)?;
        self.copy_stream_to_remote(ctx, reader, dest, mode).await
    }

    async fn copy_local_file_to_remote_monitored(
        &self,
        ctx: &CancellationToken,
        source: &str,
        dest: &str,
        mode: &str,
        progress: mpsc::Sender<u64>,
    ) -> ExecResult<u64> {
        let reader = transfer::open_local_source(source)?;
        self.copy_stream_to_remote_monitored(ctx, reader, dest, mode, progress)
            .await
    }

    /// Fetch `source` from this connection's side into the local file `dest`.
    async fn copy_remote_file_to_local(
        &self,
        ctx: &CancellationToken,
        source: &str,
        dest: &str,
        mode: &str,
    ) -> ExecResult<u64> {
        let mode = FileMode::parse(mode)?;
        let reader = self.open_source(source).await?;
        let sink = transfer::open_local_sink(dest, mode)?;
        transfer::pump_blocking(ctx.clone(), reader, sink).await
    }

    async fn copy_remote_file_to_local_monitored(
        &self,
        ctx: &CancellationToken,
        source: &str,
        dest: &str,
        mode: &str,
        progress: mpsc::Sender<u64>,
    ) -> ExecResult<u64> {
        let mode = FileMode::parse(mode)?;
        let reader = self.open_source(source).await?;
        let sink = transfer::open_local_sink(dest, mode)?;
        monitored_copy(
            ctx,
            reader,
            sink,
            || async move { transfer::local_file_size(dest) },
            progress,
        )
        .await
    }
}

impl<C: Connection + ?Sized> ConnectionExt for C {}
