// ── Monitored copy ───────────────────────────────────────────────────────────
//
// The byte pump runs on the blocking pool while this task samples the
// destination size every MONITOR_INTERVAL. Samples sent on the progress
// channel never decrease. The sender is owned here, so the channel closes
// exactly once, when this function returns.

use crate::exec::error::ExecResult;
use crate::exec::transfer::pump_blocking;
use crate::exec::types::{ByteSink, ByteSource, MONITOR_INTERVAL};
use futures::FutureExt;
use log::{debug, warn};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Copy `source` into the already opened `sink`, reporting `probe()` on
/// `progress` while the copy runs.
///
/// On success one final sample with the destination's final size is sent
/// before the channel closes. On failure the copy error is returned and no
/// final sample is sent.
pub(crate) async fn monitored_copy<P, Fut>(
    ctx: &CancellationToken,
    source: ByteSource,
    sink: ByteSink,
    probe: P,
    progress: mpsc::Sender<u64>,
) -> ExecResult<u64>
where
    P: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = ExecResult<u64>> + Send,
{
    let stop = CancellationToken::new();

    let copy = async {
        let result = pump_blocking(ctx.clone(), source, sink).await;
        stop.cancel();
        result
    };
    let poll = AssertUnwindSafe(poll_sizes(&stop, &probe, &progress)).catch_unwind();

    let (copied, polled) = tokio::join!(copy, poll);
    let last = polled.unwrap_or_else(|_| {
        warn!("progress poller panicked; continuing without samples");
        0
    });
    let copied = copied?;

    let final_size = match probe().await {
        Ok(size) => size,
        Err(e) => {
            debug!("final size probe failed: {}", e);
            copied
        }
    };
    // Receiver may already be gone; the copy itself succeeded.
    let _ = progress.send(final_size.max(last)).await;
    Ok(copied)
}

/// Sample until `stop` fires or the receiver goes away. Returns the highest
/// size sent.
async fn poll_sizes<P, Fut>(
    stop: &CancellationToken,
    probe: &P,
    progress: &mpsc::Sender<u64>,
) -> u64
where
    P: Fn() -> Fut,
    Fut: Future<Output = ExecResult<u64>>,
{
    let mut ticker = interval_at(Instant::now() + MONITOR_INTERVAL, MONITOR_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let size = match probe().await {
            Ok(size) => size,
            Err(e) => {
                debug!("size probe missed: {}", e);
                continue;
            }
        };
        if size < last {
            continue;
        }
        last = size;

        match progress.try_send(size) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Closed(_)) => break,
        }
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::error::{ExecError, ExecErrorKind};
    use std::io::{self, Read, Write};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Reader that yields `total` bytes slowly, in small pieces.
    struct Trickle {
        remaining: usize,
        piece: usize,
        delay: Duration,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Ok(0);
            }
            std::thread::sleep(self.delay);
            let n = self.piece.min(self.remaining).min(buf.len());
            buf[..n].fill(7);
            self.remaining -= n;
            Ok(n)
        }
    }

    /// Sink that counts bytes into a shared counter, standing in for a file.
    struct Counting(Arc<AtomicU64>);

    impl Write for Counting {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.fetch_add(buf.len() as u64, Ordering::SeqCst);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    async fn collect(mut rx: mpsc::Receiver<u64>) -> Vec<u64> {
        let mut seen = Vec::new();
        while let Some(v) = rx.recv().await {
            seen.push(v);
        }
        seen
    }

    #[tokio::test]
    async fn test_samples_are_monotonic_and_end_at_final_size() {
        let written = Arc::new(AtomicU64::new(0));
        let source = Box::new(Trickle {
            remaining: 64 * 1024,
            piece: 4096,
            delay: Duration::from_millis(25),
        });
        let sink = Box::new(Counting(written.clone()));
        let (tx, rx) = mpsc::channel(64);
        let collector = tokio::spawn(collect(rx));

        let probe_counter = written.clone();
        let copied = monitored_copy(
            &CancellationToken::new(),
            source,
            sink,
            move || {
                let size = probe_counter.load(Ordering::SeqCst);
                async move { Ok(size) }
            },
            tx,
        )
        .await
        .unwrap();

        let samples = collector.await.unwrap();
        assert_eq!(copied, 64 * 1024);
        assert!(samples.len() >= 2, "expected intermediate samples, got {samples:?}");
        assert!(samples.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*samples.last().unwrap(), 64 * 1024);
    }

    #[tokio::test]
    async fn test_probe_errors_are_ignored() {
        let (tx, rx) = mpsc::channel(8);
        let collector = tokio::spawn(collect(rx));
        let copied = monitored_copy(
            &CancellationToken::new(),
            Box::new(io::Cursor::new(vec![1u8; 10])),
            Box::new(io::sink()),
            || async { Err::<u64, _>(ExecError::io("stat failed")) },
            tx,
        )
        .await
        .unwrap();

        assert_eq!(copied, 10);
        // final sample falls back to the byte count
        assert_eq!(collector.await.unwrap(), vec![10]);
    }

    #[tokio::test]
    async fn test_copy_error_propagates_and_closes_channel() {
        struct Failing;
        impl Read for Failing {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "device gone"))
            }
        }

        let (tx, rx) = mpsc::channel(8);
        let collector = tokio::spawn(collect(rx));
        let err = monitored_copy(
            &CancellationToken::new(),
            Box::new(Failing),
            Box::new(io::sink()),
            || async { Ok(0u64) },
            tx,
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind, ExecErrorKind::Io);
        assert!(collector.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_poller_panic_is_swallowed() {
        let (tx, rx) = mpsc::channel(8);
        let collector = tokio::spawn(collect(rx));
        let source = Box::new(Trickle {
            remaining: 1024,
            piece: 256,
            delay: Duration::from_millis(60),
        });
        let calls = Arc::new(AtomicU64::new(0));
        let probe_calls = calls.clone();

        let copied = monitored_copy(
            &CancellationToken::new(),
            source,
            Box::new(io::sink()),
            move || {
                let n = probe_calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        panic!("stat blew up");
                    }
                    Ok(1024u64)
                }
            },
            tx,
        )
        .await
        .unwrap();

        assert_eq!(copied, 1024);
        assert_eq!(collector.await.unwrap().last(), Some(&1024));
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_fail_copy() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let copied = monitored_copy(
            &CancellationToken::new(),
            Box::new(io::Cursor::new(vec![0u8; 100])),
            Box::new(io::sink()),
            || async { Ok(100u64) },
            tx,
        )
        .await
        .unwrap();
        assert_eq!(copied, 100);
    }
}
