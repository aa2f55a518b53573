//! Durable storage for generated key material.

use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
};

/// Persists key material outside the provider.
pub trait Sink: Send + Sync {
    /// Write `material` for the key pair `name`, returning where it was stored.
    fn persist(&self, name: &str, material: &str) -> io::Result<PathBuf>;
}

/// Writes `<name>.pem` into a directory.
///
/// Files are created exclusively (an existing key file is never overwritten) and, on
/// unix, readable only by the owner.
pub struct Directory {
    path: PathBuf,
}

impl Directory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for Directory {
    fn persist(&self, name: &str, material: &str) -> io::Result<PathBuf> {
        std::fs::create_dir_all(&self.path)?;
        let path = self.path.join(format!("{name}.pem"));
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path)?;
        file.write_all(material.as_bytes())?;
        file.sync_all()?;
        Ok(path)
    }
}
