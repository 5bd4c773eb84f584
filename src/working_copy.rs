//! Disposable archive copies and the copy/append/truncate primitives.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use log::warn;

use crate::error::{RecoveryError, Result};

/// Bounded retry with fixed backoff for file operations.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn run<T>(&self, path: &Path, what: &str, mut op: impl FnMut() -> io::Result<T>) -> Result<T> {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => {
                    return Err(RecoveryError::TransientIo {
                        path: path.to_path_buf(),
                        attempts,
                        source: e,
                    });
                }
                Err(e) => {
                    if e.kind() == io::ErrorKind::PermissionDenied {
                        warn!("{} is locked, close it while the search runs", path.display());
                    }
                    warn!(
                        "Failed to {} {} ({}), retry {}/{} in {:?}",
                        what,
                        path.display(),
                        e,
                        attempt,
                        attempts - 1,
                        self.backoff
                    );
                    thread::sleep(self.backoff);
                    attempt += 1;
                }
            }
        }
    }
}

/// A private copy of the corrupted archive that candidates are appended to
/// and then cut back off.
#[derive(Debug)]
pub struct WorkingCopy {
    path: PathBuf,
    base_len: u64,
    retry: RetryPolicy,
}

impl WorkingCopy {
    pub fn create(source: &Path, dir: &Path, name: &str, retry: RetryPolicy) -> Result<Self> {
        let path = dir.join(name);
        retry.run(&path, "copy archive to", || fs::copy(source, &path))?;
        let base_len = fs::metadata(&path)?.len();
        Ok(Self {
            path,
            base_len,
            retry,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn base_len(&self) -> u64 {
        self.base_len
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub fn current_len(&self) -> Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    pub fn append(&self, bytes: &[u8]) -> Result<()> {
        // A failed attempt may have written part of `bytes`.
        self.retry.run(&self.path, "append candidate to", || {
            truncate_to(&self.path, self.base_len)?;
            append_bytes(&self.path, bytes)
        })
    }

    /// Cut the file back to the length it had when created.
    pub fn restore(&self) -> Result<()> {
        self.retry
            .run(&self.path, "truncate", || truncate_to(&self.path, self.base_len))
    }
}

pub fn append_bytes(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(bytes)?;
    file.flush()
}

pub fn truncate_to(path: &Path, len: u64) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(len)
}

/// Copy `source` to `dest` minus its last `bytes` bytes, returning what was cut.
pub fn truncate_copy(source: &Path, dest: &Path, bytes: u64, retry: RetryPolicy) -> Result<Vec<u8>> {
    let size = fs::metadata(source)?.len();
    if bytes > size {
        return Err(RecoveryError::Config(format!(
            "cannot remove {} bytes from a {} byte file",
            bytes, size
        )));
    }
    retry.run(dest, "copy archive to", || fs::copy(source, dest))?;
    let removed = retry.run(dest, "read tail of", || {
        let mut file = File::open(dest)?;
        file.seek(SeekFrom::Start(size - bytes))?;
        let mut tail = Vec::with_capacity(bytes as usize);
        file.read_to_end(&mut tail)?;
        Ok(tail)
    })?;
    retry.run(dest, "truncate", || truncate_to(dest, size - bytes))?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::tempdir;

    fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_append_and_restore() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("archive.bin");
        fs::write(&source, b"abcdef").unwrap();

        let copy = WorkingCopy::create(&source, dir.path(), "copy-0.bin", quick_retry()).unwrap();
        assert_eq!(copy.base_len(), 6);
        copy.append(&[0x0a, 0x3f]).unwrap();
        assert_eq!(fs::read(copy.path()).unwrap(), b"abcdef\x0a\x3f");
        copy.restore().unwrap();
        assert_eq!(fs::read(copy.path()).unwrap(), b"abcdef");
        assert_eq!(fs::read(&source).unwrap(), b"abcdef");
    }

    #[test]
    fn test_append_discards_partial_write() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("archive.bin");
        fs::write(&source, b"abcdef").unwrap();

        let copy = WorkingCopy::create(&source, dir.path(), "copy-0.bin", quick_retry()).unwrap();
        // Leftover from an interrupted append.
        append_bytes(copy.path(), &[0x0a]).unwrap();
        copy.append(&[0x0a, 0x3f]).unwrap();
        assert_eq!(fs::read(copy.path()).unwrap(), b"abcdef\x0a\x3f");
    }

    #[test]
    fn test_truncate_copy_returns_removed_tail() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("full.bin");
        let dest = dir.path().join("short.bin");
        fs::write(&source, b"0123456789").unwrap();

        let removed = truncate_copy(&source, &dest, 3, quick_retry()).unwrap();
        assert_eq!(removed, b"789");
        assert_eq!(fs::read(&dest).unwrap(), b"0123456");
        assert_eq!(fs::read(&source).unwrap(), b"0123456789");
    }

    #[test]
    fn test_truncate_copy_rejects_oversized_cut() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("tiny.bin");
        fs::write(&source, b"ab").unwrap();
        let result = truncate_copy(&source, &dir.path().join("out.bin"), 5, quick_retry());
        assert!(matches!(result, Err(RecoveryError::Config(_))));
    }

    #[test]
    fn test_retry_recovers_from_transient_failure() {
        let calls = Cell::new(0);
        let value = quick_retry()
            .run(Path::new("x"), "touch", || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"))
                } else {
                    Ok(42)
                }
            })
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_retry_budget_is_bounded() {
        let calls = Cell::new(0);
        let result: Result<()> = quick_retry().run(Path::new("x"), "touch", || {
            calls.set(calls.get() + 1);
            Err(io::Error::new(io::ErrorKind::Other, "still locked"))
        });
        assert!(matches!(
            result,
            Err(RecoveryError::TransientIo { attempts: 3, .. })
        ));
        assert_eq!(calls.get(), 3);
    }
}
