//! Copy a file on this machine with a live progress bar.
//!
//! cargo run --example local_copy -- <source> <dest> [mode]

use dualexec::{local, CancellationToken, ConnectionExt, ExecResult, ProgressBar};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> ExecResult<()> {
    dualexec::logging::init("info");

    let mut args = std::env::args().skip(1);
    let (source, dest) = match (args.next(), args.next()) {
        (Some(s), Some(d)) => (s, d),
        _ => {
            eprintln!("usage: local_copy <source> <dest> [mode]");
            std::process::exit(2);
        }
    };
    let mode = args.next().unwrap_or_else(|| "0644".to_string());

    let total = std::fs::metadata(&source)?.len();
    let conn = local();
    let ctx = CancellationToken::new();

    let cancel = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let (tx, rx) = mpsc::channel(4);
    let mut bar = ProgressBar::stdout();
    let (copied, _) = tokio::join!(
        conn.copy_local_file_to_remote_monitored(&ctx, &source, &dest, &mode, tx),
        bar.drain(rx, total),
    );

    let copied = copied?;
    tracing::info!("copied {} bytes from {} to {}", copied, source, dest);
    Ok(())
}
