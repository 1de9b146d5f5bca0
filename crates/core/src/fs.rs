use std::path::PathBuf;

use indexmap::IndexMap;

/// File access for `include`/`embed` statements. Reads are synchronous;
/// missing files surface as `None` and become diagnostics at the
/// statement that asked.
pub trait FileSystem {
    fn open(&self, name: &str) -> Option<File>;
}

#[derive(Debug, Clone)]
pub struct File {
    bytes: Vec<u8>,
}

impl File {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn read_binary(&self) -> &[u8] {
        &self.bytes
    }

    /// Newline-normalized lines, each re-terminated with `\n`, the form
    /// the scanner consumes for `include`.
    pub fn read_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.bytes)
            .split('\n')
            .map(|line| format!("{}\n", line.strip_suffix('\r').unwrap_or(line)))
            .collect()
    }
}

/// Reads relative to a root directory on the real file system.
#[derive(Debug, Default)]
pub struct StdFileSystem {
    root: PathBuf,
}

impl StdFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FileSystem for StdFileSystem {
    fn open(&self, name: &str) -> Option<File> {
        std::fs::read(self.root.join(name)).ok().map(File::new)
    }
}

/// In-memory file store for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: IndexMap<String, Vec<u8>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(name.into(), bytes.into());
    }
}

impl FileSystem for MemoryFileSystem {
    fn open(&self, name: &str) -> Option<File> {
        self.files.get(name).map(|bytes| File::new(bytes.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_newline_normalized() {
        let file = File::new(b"one\r\ntwo\nthree".to_vec());
        assert_eq!(file.read_lines(), vec!["one\n", "two\n", "three\n"]);
    }

    #[test]
    fn memory_files_round_trip() {
        let mut fs = MemoryFileSystem::new();
        fs.insert("tiles.bin", vec![1, 2, 3]);
        let file = fs.open("tiles.bin").expect("present");
        assert_eq!(file.read_binary(), &[1, 2, 3]);
        assert!(fs.open("absent.bin").is_none());
    }
}
