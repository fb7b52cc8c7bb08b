//! Feed a synthetic transfer into the progress bar.
//!
//! cargo run --example progress_bar

use dualexec::ProgressBar;
use std::time::Duration;
use tokio::sync::mpsc;

const TOTAL: u64 = 8 * 1024 * 1024;
const STEP: u64 = 256 * 1024;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dualexec::logging::init("info");

    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        let mut done = 0;
        while done < TOTAL {
            done = (done + STEP).min(TOTAL);
            if tx.send(done).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(40)).await;
        }
    });

    let last = ProgressBar::stdout().drain(rx, TOTAL).await?;
    tracing::info!("reported {} of {} bytes", last, TOTAL);
    Ok(())
}
