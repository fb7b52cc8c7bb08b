use dualexec::*;
use std::io::Cursor;
use tokio::sync::mpsc;

async fn collect(mut rx: mpsc::Receiver<u64>) -> Vec<u64> {
    let mut seen = Vec::new();
    while let Some(v) = rx.recv().await {
        seen.push(v);
    }
    seen
}

#[tokio::test]
async fn test_stream_copy_with_mode() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("out/payload.bin");
    let data = vec![0x5a_u8; 300_000];

    let conn = local();
    let n = conn
        .copy_stream_to_remote(
            &CancellationToken::new(),
            Box::new(Cursor::new(data.clone())),
            dest.to_str().unwrap(),
            "0644",
        )
        .await
        .unwrap();

    assert_eq!(n, 300_000);
    assert_eq!(std::fs::metadata(&dest).unwrap().len(), 300_000);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}

#[tokio::test]
async fn test_monitored_copy_reports_final_size_and_closes() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("big.bin");
    let dest = dir.path().join("copy/big.bin");
    let data: Vec<u8> = (0..4_000_000u32).map(|i| (i % 253) as u8).collect();
    std::fs::write(&src, &data).unwrap();

    let (tx, rx) = mpsc::channel(16);
    let collector = tokio::spawn(collect(rx));

    let conn = local();
    let n = conn
        .copy_local_file_to_remote_monitored(
            &CancellationToken::new(),
            src.to_str().unwrap(),
            dest.to_str().unwrap(),
            "0600",
            tx,
        )
        .await
        .unwrap();

    // collector only finishes once the channel is closed
    let samples = collector.await.unwrap();
    assert_eq!(n, data.len() as u64);
    assert!(!samples.is_empty());
    assert!(samples.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*samples.last().unwrap(), data.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), data);
}

#[tokio::test]
async fn test_monitored_download_on_local_connection() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("remote-side.txt");
    let dest = dir.path().join("local-side.txt");
    std::fs::write(&src, b"hello over the wire").unwrap();

    let (tx, rx) = mpsc::channel(4);
    let mut bar = ProgressBar::new(Vec::new());
    let conn = local();
    let ctx = CancellationToken::new();
    let (copied, last) = tokio::join!(
        conn.copy_remote_file_to_local_monitored(
            &ctx,
            src.to_str().unwrap(),
            dest.to_str().unwrap(),
            "0644",
            tx,
        ),
        bar.drain(rx, 19),
    );

    assert_eq!(copied.unwrap(), 19);
    assert_eq!(last.unwrap(), 19);
    let rendered = String::from_utf8(bar.into_inner()).unwrap();
    assert!(rendered.contains("[100.00%]"));
    assert!(rendered.ends_with('\n'));
}

#[tokio::test]
async fn test_monitored_copy_error_closes_channel_without_samples() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, rx) = mpsc::channel(4);
    let collector = tokio::spawn(collect(rx));

    let conn = local();
    let err = conn
        .copy_local_file_to_remote_monitored(
            &CancellationToken::new(),
            dir.path().join("missing.bin").to_str().unwrap(),
            dir.path().join("dest.bin").to_str().unwrap(),
            "0644",
            tx,
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind, ExecErrorKind::Io);
    assert!(collector.await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_mode_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let conn = local();
    let err = conn
        .copy_stream_to_remote(
            &CancellationToken::new(),
            Box::new(Cursor::new(vec![1u8])),
            dir.path().join("x").to_str().unwrap(),
            "rw-r--r--",
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ExecErrorKind::InvalidMode);
}
