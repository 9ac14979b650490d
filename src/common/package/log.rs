use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Append-only file that collects package manager output for one run.
///
/// The file is kept on disk after the run so it can be inspected; its path
/// is what gets reported to the operator.
#[derive(Debug)]
pub struct InstallLog {
    path: PathBuf,
    file: File,
}

impl InstallLog {
    /// Create a fresh, uniquely named log file in `dir`.
    pub fn create(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let named = tempfile::Builder::new()
            .prefix("reinstall-all-")
            .suffix(".log")
            .tempfile_in(dir)?;
        let (file, path) = named.keep().map_err(|e| e.error)?;
        Ok(Self { path, file })
    }

    /// Wrap an already open file, e.g. one that rejects writes.
    #[cfg(test)]
    pub(crate) fn from_file(path: PathBuf, file: File) -> Self {
        Self { path, file }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A handle child processes can write their output to.
    pub fn writer(&self) -> io::Result<File> {
        self.file.try_clone()
    }

    /// Append one line of our own, e.g. the command about to run.
    pub fn note(&self, line: &str) -> io::Result<()> {
        let mut file = &self.file;
        writeln!(file, "{}", line)?;
        file.flush()
    }
}
