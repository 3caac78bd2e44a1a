//! Append-only replay log of failing test cases.
//!
//! Record format: `[length:4][crc:4][payload:N]`, little-endian throughout.
//!
//! - **length**: payload size in bytes (little-endian u32)
//! - **crc**: CRC32C of the payload for integrity verification
//! - **payload**: the encoded test-case schedule (see
//!   [`TestCase::encode`](crate::TestCase::encode))
//!
//! The log makes failures reproducible across builds: the harness writes
//! every failing schedule on the way down, and a later run pointed at the
//! file re-executes exactly those schedules.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::case::TestCase;
use crate::error::ReplayError;

/// Width of the length field.
const LENGTH_WIDTH: usize = 4;

/// Record header size: 4 (length) + 4 (crc).
const HEADER_WIDTH: usize = 8;

/// Maximum accepted payload size.
///
/// A valid payload is bounded by the step limit; anything near this bound
/// is a corrupted length field, rejected before allocating.
const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Buffered writer half of a replay log.
///
/// Writes are guarded by a mutex and buffered; call
/// [`close`](ReplayWriter::close) to flush. The runner keeps at most one
/// writer per run.
#[derive(Debug)]
pub struct ReplayWriter {
    path: PathBuf,
    inner: Mutex<BufWriter<File>>,
}

impl ReplayWriter {
    /// Create (or truncate) the log at `path`.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, ReplayError> {
        let path = path.into();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        debug!(path = %path.display(), "created replay log");
        Ok(Self {
            path,
            inner: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Path the log was created at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one test case as a framed, checksummed record.
    pub fn append(&self, case: &TestCase) -> Result<(), ReplayError> {
        let payload = case.encode();
        let crc = crc32c::crc32c(&payload);
        let mut header = [0u8; HEADER_WIDTH];
        header[..LENGTH_WIDTH].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        header[LENGTH_WIDTH..].copy_from_slice(&crc.to_le_bytes());

        let mut writer = lock(&self.inner);
        writer.write_all(&header)?;
        writer.write_all(&payload)?;
        Ok(())
    }

    /// Flush buffered records and close the log.
    pub fn close(self) -> Result<(), ReplayError> {
        let mut writer = self
            .inner
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writer.flush()?;
        Ok(())
    }
}

/// Reader half of a replay log.
///
/// Records are length-checked and CRC-verified on the way out; any
/// mismatch is reported as a corruption error rather than yielding a
/// damaged schedule.
#[derive(Debug)]
pub struct ReplayReader {
    path: PathBuf,
    inner: Mutex<BufReader<File>>,
}

impl ReplayReader {
    /// Open the log at `path` for reading.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ReplayError> {
        let path = path.into();
        let file = File::open(&path)?;
        Ok(Self {
            path,
            inner: Mutex::new(BufReader::new(file)),
        })
    }

    /// Path the log was opened at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the next recorded schedule.
    ///
    /// Returns `Ok(None)` at a clean end of file. A partial record, a
    /// checksum mismatch, or a malformed payload is an error.
    pub(crate) fn read(&self) -> Result<Option<Vec<i16>>, ReplayError> {
        let mut reader = lock(&self.inner);

        let mut header = [0u8; HEADER_WIDTH];
        let got = read_full(&mut *reader, &mut header)?;
        if got == 0 {
            return Ok(None);
        }
        if got < HEADER_WIDTH {
            return Err(ReplayError::Truncated {
                expected: HEADER_WIDTH,
                got,
            });
        }

        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if length as usize > MAX_PAYLOAD_SIZE {
            return Err(ReplayError::TooLarge {
                size: length,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let mut payload = vec![0u8; length as usize];
        let got = read_full(&mut *reader, &mut payload)?;
        if got < payload.len() {
            return Err(ReplayError::Truncated {
                expected: payload.len(),
                got,
            });
        }

        let actual = crc32c::crc32c(&payload);
        if actual != crc {
            return Err(ReplayError::ChecksumMismatch {
                expected: crc,
                actual,
            });
        }

        TestCase::decode(&payload).map(Some)
    }
}

/// Read until `buf` is full or the stream ends; returns the bytes read.
///
/// Unlike `read_exact` this distinguishes a clean end of file (zero bytes)
/// from a record cut short.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut read = 0;
    while read < buf.len() {
        match reader.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(read)
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
