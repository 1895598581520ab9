use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use walkdir::WalkDir;

use crate::error::{DeployError, DeployResult};
use crate::hash::content_hash;

/// A file from the local source tree, ready to be declared and uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    /// Deploy path, always rooted at `/`
    pub path: String,
    /// Hash of `payload`
    pub hash: String,
    /// Gzip-compressed file contents
    pub payload: Vec<u8>,
}

impl LocalEntry {
    /// Builds an entry from an already compressed payload.
    pub fn new(path: impl Into<String>, payload: Vec<u8>) -> Self {
        let hash = content_hash(&payload);
        Self {
            path: path.into(),
            hash,
            payload,
        }
    }

    /// Compresses raw file contents and builds the entry for them.
    pub fn from_contents(path: impl Into<String>, contents: &[u8]) -> std::io::Result<Self> {
        Ok(Self::new(path, gzip(contents)?))
    }

    /// Moves the entry under a remote namespace, `/a.html` becoming
    /// `/{prefix}/a.html`.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        let prefix = prefix.trim_matches('/');
        if !prefix.is_empty() {
            self.path = format!("/{}{}", prefix, self.path);
        }
        self
    }
}

/// Walks a source directory (or takes a single file) and turns every regular
/// file into a [`LocalEntry`].
#[derive(Debug)]
pub struct FileCollector {
    root: PathBuf,
}

impl FileCollector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Collects entries in file name order. Any unreadable file or directory
    /// fails the whole collection.
    pub fn collect(&self) -> DeployResult<Vec<LocalEntry>> {
        let metadata =
            std::fs::metadata(&self.root).map_err(|e| DeployError::io(&self.root, e))?;

        // A single file deploys under its own name
        if metadata.is_file() {
            let name = self.root.file_name().ok_or_else(|| {
                DeployError::Config(format!("{:?} has no file name", self.root))
            })?;
            let name = utf8_name(name, &self.root)?;
            return Ok(vec![self.load(&self.root, format!("/{}", name))?]);
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = self.deploy_path(entry.path())?;
            log::debug!("Collected {:?} as {}", entry.path(), path);
            entries.push(self.load(entry.path(), path)?);
        }
        Ok(entries)
    }

    fn load(&self, file: &Path, path: String) -> DeployResult<LocalEntry> {
        let data = std::fs::read(file).map_err(|e| DeployError::io(file, e))?;
        LocalEntry::from_contents(path, &data).map_err(|e| DeployError::io(file, e))
    }

    fn deploy_path(&self, file: &Path) -> DeployResult<String> {
        let relative = file.strip_prefix(&self.root).map_err(|_| {
            DeployError::Config(format!("{:?} is outside of {:?}", file, self.root))
        })?;
        let mut path = String::new();
        for component in relative.components() {
            path.push('/');
            path.push_str(utf8_name(component.as_os_str(), file)?);
        }
        Ok(path)
    }
}

// Deploy paths are UTF-8; a lossy conversion could map two files to one path
fn utf8_name<'a>(name: &'a OsStr, file: &Path) -> DeployResult<&'a str> {
    name.to_str()
        .ok_or_else(|| DeployError::Config(format!("{:?} is not a valid UTF-8 path", file)))
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
