//! CSV sample log used as the monitor's persistence sink.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use treadmill_core::error::PersistenceError;
use treadmill_core::telemetry::{PersistenceSink, Sample};

const HEADER: &str = "timestamp,speed_kmh,grade_percent";

/// Appends one `timestamp,speed,grade` row per sample.
///
/// A failed write drops the file handle; the next write reopens the file,
/// which is what the monitor's single retry relies on.
pub struct CsvSampleLog {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl CsvSampleLog {
    /// Opens (or creates) the log at `path`, writing the header to a new file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        let writer = Some(open_writer(&path)?);
        Ok(Self { path, writer })
    }

    fn write_row(&mut self, row: &str) -> Result<(), PersistenceError> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => {
                log::info!("reopening sample log {}", self.path.display());
                open_writer(&self.path)?
            }
        };
        let writer = self.writer.insert(writer);
        writeln!(writer, "{row}")?;
        writer.flush()?;
        Ok(())
    }
}

fn open_writer(path: &Path) -> Result<BufWriter<File>, PersistenceError> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let fresh = file.metadata()?.len() == 0;
    let mut writer = BufWriter::new(file);
    if fresh {
        writeln!(writer, "{HEADER}")?;
        writer.flush()?;
    }
    Ok(writer)
}

impl PersistenceSink for CsvSampleLog {
    fn record_sample(&mut self, sample: &Sample) -> Result<(), PersistenceError> {
        let timestamp = sample
            .timestamp
            .duration_since(UNIX_EPOCH)
            .map_err(|err| PersistenceError::Rejected(err.to_string()))?;
        let row = format!(
            "{}.{:03},{:.1},{:.1}",
            timestamp.as_secs(),
            timestamp.subsec_millis(),
            sample.speed,
            sample.grade
        );

        let result = self.write_row(&row);
        if result.is_err() {
            self.writer = None;
        }
        result
    }
}
