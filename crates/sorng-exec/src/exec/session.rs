//! One command execution bound to a connection.
//!
//! A session starts exactly one command. `run*` returns once the command has
//! been started (and, with a line consumer, once stdout reached end of
//! stream); [`Session::wait`] is what blocks until the command exits.

use crate::exec::error::ExecResult;
use crate::exec::types::LineConsumer;
use async_trait::async_trait;
use std::sync::{Arc, Mutex as StdMutex};

#[async_trait]
pub trait Session: Send {
    /// Start `command`, capturing stdout and stderr into the output buffer.
    async fn run(&mut self, command: &str) -> ExecResult<()> {
        self.run_with_consumer(command, None).await
    }

    /// Start `command`. With a consumer, stdout lines go to the consumer
    /// instead of the output buffer and this call returns after the last line.
    async fn run_with_consumer(
        &mut self,
        command: &str,
        consumer: Option<LineConsumer>,
    ) -> ExecResult<()>;

    /// Block until the started command terminates.
    async fn wait(&mut self) -> ExecResult<()>;

    async fn close(&mut self) -> ExecResult<()>;

    /// Output captured so far.
    fn output(&self) -> String;
}

/// Shared, append-only byte buffer filled by output pumps.
#[derive(Clone, Default)]
pub(crate) struct OutputBuffer(Arc<StdMutex<Vec<u8>>>);

impl OutputBuffer {
    pub(crate) fn append(&self, bytes: &[u8]) {
        if let Ok(mut buf) = self.0.lock() {
            buf.extend_from_slice(bytes);
        }
    }

    pub(crate) fn text(&self) -> String {
        self.0
            .lock()
            .map(|buf| String::from_utf8_lossy(&buf).into_owned())
            .unwrap_or_default()
    }
}
