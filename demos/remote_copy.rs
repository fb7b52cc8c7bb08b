//! Upload a file over SSH with a progress bar, then list it remotely.
//!
//! cargo run --example remote_copy -- <user> <password> <host[:port]> <source> <dest>
//!
//! A host that resolves to this machine is served by a local connection.

use dualexec::{
    connect, shell_escape, CancellationToken, ConnectionExt, Credentials, DialConfig, ExecResult,
    ProgressBar,
};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> ExecResult<()> {
    dualexec::logging::init("info");

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() != 5 {
        eprintln!("usage: remote_copy <user> <password> <host[:port]> <source> <dest>");
        std::process::exit(2);
    }
    let credentials = Credentials::Password {
        username: args[0].clone(),
        password: args[1].clone(),
    };
    let (addr, source, dest) = (&args[2], &args[3], &args[4]);

    let config = match std::env::var("DUALEXEC_DIAL_CONFIG") {
        Ok(path) => DialConfig::from_json_file(path)?,
        Err(_) => DialConfig::default(),
    };

    let mut conn = connect(&credentials, addr, &config).await?;
    tracing::info!("connected to {} ({:?})", conn.address(), conn.kind());

    let ctx = CancellationToken::new();
    let total = std::fs::metadata(source)?.len();
    let (tx, rx) = mpsc::channel(4);
    let mut bar = ProgressBar::stdout();
    let (copied, _) = tokio::join!(
        conn.copy_local_file_to_remote_monitored(&ctx, source, dest, "0644", tx),
        bar.drain(rx, total),
    );
    tracing::info!("uploaded {} bytes", copied?);

    let listing = conn.execute_shell(&ctx, &format!("ls -l {}", shell_escape(dest))).await?;
    print!("{}", listing);

    conn.close().await
}
