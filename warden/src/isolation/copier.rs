use std::fs::{File, FileTimes};
use std::io;
use std::path::Path;

/// Moves bytes from an original file into a sandbox copy.
///
/// The manager verifies every copy by checksum afterwards, so an
/// implementation only has to do the transfer.
pub trait FileCopier: Send + Sync + std::fmt::Debug {
    /// Copy `source` to `destination`, returning the number of bytes copied.
    fn copy(&self, source: &Path, destination: &Path) -> io::Result<u64>;
}

/// Copies with `std::fs::copy` (contents and permissions) and carries over
/// modification and access times.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileCopier;

impl FileCopier for StdFileCopier {
    fn copy(&self, source: &Path, destination: &Path) -> io::Result<u64> {
        let copied = std::fs::copy(source, destination)?;

        let metadata = std::fs::metadata(source)?;
        let mut times = FileTimes::new();
        if let Ok(modified) = metadata.modified() {
            times = times.set_modified(modified);
        }
        if let Ok(accessed) = metadata.accessed() {
            times = times.set_accessed(accessed);
        }
        if let Err(e) = File::open(destination).and_then(|f| f.set_times(times)) {
            tracing::debug!(
                destination = %destination.display(),
                error = %e,
                "Could not carry file times over to sandbox copy"
            );
        }

        Ok(copied)
    }
}
