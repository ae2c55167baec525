//! Disk lifecycle for one grab job.
//!
//! Each job gets a uniquely named working directory holding fetched segment
//! payloads and the concat list. The directory is removed only after a
//! successful handoff; on failure it stays behind for manual inspection.
//! Direct downloads stream into a `.part` name and rename into place when
//! complete.

use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Working directory for one job. Names are ASCII by construction so the
/// concat list they end up in never needs escaping.
#[derive(Debug)]
pub struct Workdir {
    root: PathBuf,
}

impl Workdir {
    /// Creates a fresh uniquely named directory under `root` (or the system
    /// temp dir). The directory is not auto-deleted; removal is an explicit
    /// decision made after a successful remux.
    pub fn create(root: Option<&Path>) -> Result<Self> {
        let base = match root {
            Some(p) => {
                fs::create_dir_all(p)
                    .with_context(|| format!("create work root {}", p.display()))?;
                p.to_path_buf()
            }
            None => env::temp_dir(),
        };
        let dir = tempfile::Builder::new()
            .prefix("dvr-")
            .tempdir_in(&base)
            .with_context(|| format!("create working directory under {}", base.display()))?;
        // Disarm auto-delete: failed jobs must leave their directory behind.
        let path = dir.path().to_path_buf();
        std::mem::forget(dir);
        Ok(Workdir { root: path })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Indexed payload filename, zero-padded so shell listings sort in
    /// stream order.
    pub fn segment_path(&self, index: usize) -> PathBuf {
        self.root.join(format!("seg_{index:05}.m4s"))
    }

    /// Location of the concat list consumed by the multiplexer.
    pub fn list_path(&self) -> PathBuf {
        self.root.join("concat.txt")
    }

    /// Deletes the directory and everything in it (successful handoff).
    pub fn remove(self) -> Result<()> {
        fs::remove_dir_all(&self.root)
            .with_context(|| format!("remove working directory {}", self.root.display()))
    }

    /// Gives up ownership, leaving the directory on disk.
    pub fn keep(self) -> PathBuf {
        self.root
    }
}

/// Path for the in-progress temp file: appends `.part` to the final path.
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Renames a completed `.part` file into its final place.
pub fn finalize(temp: &Path, final_path: &Path) -> Result<()> {
    fs::rename(temp, final_path).with_context(|| {
        format!(
            "rename {} to {}",
            temp.display(),
            final_path.display()
        )
    })
}
