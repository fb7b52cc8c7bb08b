// ── Transfer engine – byte pump & local file endpoints ───────────────────────

use crate::exec::error::{ExecError, ExecResult};
use crate::exec::types::{ByteSink, ByteSource, FileMode, COPY_CHUNK_SIZE};
use log::debug;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Copy everything from `source` into `sink`, chunk by chunk.
///
/// The token is checked between chunks; a cancelled copy leaves whatever was
/// already written in place.
pub(crate) fn pump(
    ctx: &CancellationToken,
    mut source: impl Read,
    mut sink: impl Write,
) -> ExecResult<u64> {
    let mut buf = vec![0u8; COPY_CHUNK_SIZE];
    let mut transferred: u64 = 0;

    loop {
        if ctx.is_cancelled() {
            return Err(ExecError::cancelled(format!(
                "copy cancelled after {} bytes",
                transferred
            )));
        }

        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(ExecError::io(format!("read error: {}", e))),
        };

        sink.write_all(&buf[..n])
            .map_err(|e| ExecError::io(format!("write error: {}", e)))?;
        transferred += n as u64;
    }

    sink.flush()
        .map_err(|e| ExecError::io(format!("flush error: {}", e)))?;
    Ok(transferred)
}

/// [`pump`] on the blocking pool.
pub(crate) async fn pump_blocking(
    ctx: CancellationToken,
    source: ByteSource,
    sink: ByteSink,
) -> ExecResult<u64> {
    tokio::task::spawn_blocking(move || pump(&ctx, source, sink)).await?
}

/// Create the parent directory of `path` if it is missing.
pub(crate) fn ensure_local_parent(path: &Path) -> ExecResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            std::fs::create_dir_all(parent).map_err(|e| {
                ExecError::io(format!("cannot create directory '{}': {}", parent.display(), e))
            })
        }
        _ => Ok(()),
    }
}

/// Open a local destination for writing.
///
/// An existing file is reused as-is (opened without truncation); a missing
/// one is created. Permission bits are applied in both cases.
pub(crate) fn open_local_sink(path: &str, mode: FileMode) -> ExecResult<ByteSink> {
    let path = Path::new(path);
    ensure_local_parent(path)?;

    let mut options = OpenOptions::new();
    options.write(true).create(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode.permissions());
    }

    let file = options
        .open(path)
        .map_err(|e| ExecError::io(format!("cannot open '{}' for writing: {}", path.display(), e)))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(mode.permissions()))
            .map_err(|e| ExecError::io(format!("cannot chmod '{}': {}", path.display(), e)))?;
    }
    #[cfg(not(unix))]
    debug!("permission bits {} not applied to '{}' on this platform", mode, path.display());

    Ok(Box::new(file))
}

pub(crate) fn open_local_source(path: &str) -> ExecResult<ByteSource> {
    let file = std::fs::File::open(path)
        .map_err(|e| ExecError::io(format!("cannot open '{}': {}", path, e)))?;
    Ok(Box::new(file))
}

pub(crate) fn local_file_size(path: &str) -> ExecResult<u64> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| {
            debug!("stat '{}' failed: {}", path, e);
            ExecError::io(format!("cannot stat '{}': {}", path, e))
        })
}

/// Single-quote `s` for a POSIX shell, e.g. a path passed to `execute_shell`.
pub fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::error::ExecErrorKind;
    use std::io::Cursor;

    #[test]
    fn test_shell_escape() {
        assert_eq!(shell_escape("/tmp/a b"), "'/tmp/a b'");
        assert_eq!(shell_escape("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_pump_copies_everything() {
        let data: Vec<u8> = (0..(COPY_CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let mut out = Vec::new();
        let n = pump(&CancellationToken::new(), Cursor::new(data.clone()), &mut out).unwrap();
        assert_eq!(n, data.len() as u64);
        assert_eq!(out, data);
    }

    #[test]
    fn test_pump_honours_cancellation() {
        let ctx = CancellationToken::new();
        ctx.cancel();
        let err = pump(&ctx, Cursor::new(vec![1u8; 10]), Vec::new()).unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::Cancelled);
    }

    #[test]
    fn test_pump_reports_write_errors() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(ErrorKind::Other, "disk full"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let err = pump(&CancellationToken::new(), Cursor::new(vec![1u8; 4]), Broken).unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::Io);
        assert!(err.message.contains("disk full"));
    }

    #[test]
    fn test_open_local_sink_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a/b/c.txt");
        let mut sink = open_local_sink(dest.to_str().unwrap(), FileMode::new(0o600)).unwrap();
        sink.write_all(b"abc").unwrap();
        drop(sink);
        assert_eq!(std::fs::read(&dest).unwrap(), b"abc");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_open_local_sink_does_not_truncate() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("existing.txt");
        std::fs::write(&dest, b"0123456789").unwrap();

        let mut sink = open_local_sink(dest.to_str().unwrap(), FileMode::default()).unwrap();
        sink.write_all(b"abc").unwrap();
        drop(sink);

        assert_eq!(std::fs::read(&dest).unwrap(), b"abc3456789");
    }

    #[test]
    fn test_local_file_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, vec![0u8; 1234]).unwrap();
        assert_eq!(local_file_size(path.to_str().unwrap()).unwrap(), 1234);
        assert!(local_file_size(dir.path().join("missing").to_str().unwrap()).is_err());
    }

    #[test]
    fn test_open_local_source_missing() {
        let err = open_local_source("/nonexistent/source.bin").err().unwrap();
        assert_eq!(err.kind, ExecErrorKind::Io);
    }
}
