// WindowWriter: persists one window per CSV file
//
// Files are created exclusively and never reopened. Names combine the
// label, a wall-clock stamp and the zero-padded sequence number:
// `<label>_<YYYYMMDD-HHMMSS>_<seq:03>.csv` under `<root>/<label>/`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use log::{debug, warn};

use crate::device::{Electrode, WindowRow};
use crate::error::CaptureError;

const STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
const MAX_NAME_ATTEMPTS: usize = 3;
const COLLISION_WAIT: Duration = Duration::from_millis(1500);
const COLLISION_POLL: Duration = Duration::from_millis(50);

/// Wall-clock source used for file name stamps
pub trait WallClock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

pub fn csv_header() -> String {
    let mut header = String::from("timestamp");
    for electrode in Electrode::ALL {
        header.push(',');
        header.push_str(electrode.name());
    }
    header
}

pub fn window_file_name(label: &str, stamp: &str, sequence: usize) -> String {
    format!("{}_{}_{:03}.csv", label, stamp, sequence)
}

pub struct WindowWriter {
    dir: PathBuf,
    label: String,
    clock: Arc<dyn WallClock>,
}

impl WindowWriter {
    pub fn new(output_root: impl AsRef<Path>, label: &str, clock: Arc<dyn WallClock>) -> Self {
        Self {
            dir: output_root.as_ref().join(label),
            label: label.to_string(),
            clock,
        }
    }

    /// Directory holding this label's windows
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist one window and return the created path.
    ///
    /// A name already on disk is never overwritten: the writer waits for
    /// the clock to move to a new second and tries again.
    pub fn write(&self, sequence: usize, rows: &[WindowRow]) -> Result<PathBuf, CaptureError> {
        fs::create_dir_all(&self.dir).map_err(|err| write_failed(&self.dir, err))?;

        let mut stamp = self.stamp();
        for _ in 0..MAX_NAME_ATTEMPTS {
            let path = self
                .dir
                .join(window_file_name(&self.label, &stamp, sequence));

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    if let Err(err) = write_rows(file, rows) {
                        return Err(discard_partial(&path, err));
                    }
                    debug!("[WindowWriter] Wrote {} rows to {:?}", rows.len(), path);
                    return Ok(path);
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    warn!("[WindowWriter] {:?} already exists, waiting for a new stamp", path);
                    stamp = self.next_stamp(&stamp);
                }
                Err(err) => return Err(write_failed(&path, err)),
            }
        }

        Err(CaptureError::WriteFailed {
            path: self.dir.display().to_string(),
            reason: format!("no unique name for sequence {:03}", sequence),
        })
    }

    fn stamp(&self) -> String {
        self.clock.now().format(STAMP_FORMAT).to_string()
    }

    fn next_stamp(&self, previous: &str) -> String {
        let deadline = Instant::now() + COLLISION_WAIT;
        loop {
            let stamp = self.stamp();
            if stamp != previous || Instant::now() >= deadline {
                return stamp;
            }
            thread::sleep(COLLISION_POLL);
        }
    }
}

fn write_rows(file: File, rows: &[WindowRow]) -> io::Result<()> {
    let mut out = BufWriter::new(file);
    writeln!(out, "{}", csv_header())?;
    for row in rows {
        write!(out, "{:.3}", row.timestamp)?;
        for value in row.values {
            write!(out, ",{:.6}", value)?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    out.get_ref().sync_all()
}

/// Remove a record whose write failed.
///
/// A short file that cannot be removed is reported as `PartialRecord`,
/// which ends the session instead of retrying the same sequence.
fn discard_partial(path: &Path, write_err: io::Error) -> CaptureError {
    match fs::remove_file(path) {
        Ok(()) => write_failed(path, write_err),
        Err(err) if err.kind() == io::ErrorKind::NotFound => write_failed(path, write_err),
        Err(err) => {
            warn!(
                "[WindowWriter] Could not remove incomplete {:?}: {}",
                path, err
            );
            CaptureError::PartialRecord {
                path: path.display().to_string(),
                reason: format!("{}; cleanup failed: {}", write_err, err),
            }
        }
    }
}

fn write_failed(path: &Path, err: io::Error) -> CaptureError {
    CaptureError::WriteFailed {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedClock, SteppingClock};

    fn rows(n: usize) -> Vec<WindowRow> {
        (0..n)
            .map(|i| WindowRow {
                timestamp: 1000.0 + i as f64 * 0.004,
                values: [1.0, -2.5, 0.1234567, 3.0],
            })
            .collect()
    }

    #[test]
    fn test_header_lists_electrodes() {
        assert_eq!(csv_header(), "timestamp,T3,T4,O1,O2");
    }

    #[test]
    fn test_file_name_pattern() {
        assert_eq!(
            window_file_name("green", "20240102-030405", 7),
            "green_20240102-030405_007.csv"
        );
    }

    #[test]
    fn test_write_formats_rows() {
        let dir = tempfile::tempdir().unwrap();
        let writer = WindowWriter::new(
            dir.path(),
            "red",
            Arc::new(FixedClock::at(2024, 1, 2, 3, 4, 5)),
        );

        let path = writer.write(0, &rows(2)).unwrap();

        assert_eq!(path, dir.path().join("red").join("red_20240102-030405_000.csv"));
        let contents = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "timestamp,T3,T4,O1,O2");
        assert_eq!(lines[1], "1000.000,1.000000,-2.500000,0.123457,3.000000");
        assert_eq!(lines[2], "1000.004,1.000000,-2.500000,0.123457,3.000000");
    }

    #[test]
    fn test_failed_write_removes_short_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red_20240102-030405_000.csv");
        fs::write(&path, "timestamp,T3").unwrap();

        let err = discard_partial(&path, io::Error::other("disk full"));

        assert!(matches!(err, CaptureError::WriteFailed { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_unremovable_record_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // A directory in the record's place cannot be removed as a file
        let path = dir.path().join("red_20240102-030405_000.csv");
        fs::create_dir(&path).unwrap();

        let err = discard_partial(&path, io::Error::other("disk full"));

        match &err {
            CaptureError::PartialRecord { reason, .. } => assert!(reason.contains("disk full")),
            other => panic!("Expected PartialRecord, got {:?}", other),
        }
        assert!(err.is_fatal());
    }

    #[test]
    fn test_collision_waits_for_new_stamp() {
        let dir = tempfile::tempdir().unwrap();
        let label_dir = dir.path().join("trash");
        fs::create_dir_all(&label_dir).unwrap();
        let taken = label_dir.join("trash_20240102-030405_000.csv");
        fs::write(&taken, "existing").unwrap();

        let writer = WindowWriter::new(
            dir.path(),
            "trash",
            Arc::new(SteppingClock::starting_at(2024, 1, 2, 3, 4, 5)),
        );
        let path = writer.write(0, &rows(1)).unwrap();

        assert_eq!(path, label_dir.join("trash_20240102-030406_000.csv"));
        assert_eq!(fs::read_to_string(taken).unwrap(), "existing");
    }
}
