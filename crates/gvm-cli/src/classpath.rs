//! Class path entries
//!
//! A class path is a list of directories and `.jar`/`.zip` archives searched
//! in order; the first entry holding `name.class` wins. `dir/*` expands to
//! every archive directly inside `dir`. Entries that cannot be opened are
//! skipped with a warning.

use gvm_core::ClassSource;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Upper bound on the buffer reserved from an archive entry's declared size
const PREALLOCATE_LIMIT: u64 = 64 * 1024;

/// One searchable location
pub enum Entry {
    /// Classes stored as files below a root directory
    Directory(PathBuf),
    /// Classes stored in a zip archive
    Archive(ArchiveEntry),
}

impl Entry {
    fn read_class(&self, file_name: &str) -> io::Result<Option<Vec<u8>>> {
        match self {
            Entry::Directory(root) => match std::fs::read(root.join(file_name)) {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e),
            },
            Entry::Archive(archive) => archive.read(file_name),
        }
    }

    fn path(&self) -> &Path {
        match self {
            Entry::Directory(root) => root,
            Entry::Archive(archive) => &archive.path,
        }
    }
}

/// An opened `.jar` or `.zip` archive
pub struct ArchiveEntry {
    path: PathBuf,
    archive: Mutex<zip::ZipArchive<File>>,
}

impl ArchiveEntry {
    /// Open an archive and read its central directory
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        let archive = zip::ZipArchive::new(file)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Self {
            path,
            archive: Mutex::new(archive),
        })
    }

    fn read(&self, file_name: &str) -> io::Result<Option<Vec<u8>>> {
        let mut archive = self.archive.lock();
        let mut entry = match archive.by_name(file_name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
        };
        let mut bytes = Vec::with_capacity(entry.size().min(PREALLOCATE_LIMIT) as usize);
        entry.read_to_end(&mut bytes)?;
        Ok(Some(bytes))
    }
}

/// Ordered list of class path entries
#[derive(Default)]
pub struct ClassPath {
    entries: Vec<Entry>,
}

impl ClassPath {
    /// Parse a separator-delimited path list
    pub fn parse(list: &str) -> Self {
        let mut entries = Vec::new();
        for item in list.split(is_separator).filter(|item| !item.is_empty()) {
            match parse_entry(item) {
                Ok(mut parsed) => entries.append(&mut parsed),
                Err(e) => log::warn!("skipping class path entry {}: {}", item, e),
            }
        }
        Self { entries }
    }

    /// Entries in search order
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Whether no entry could be opened
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ClassSource for ClassPath {
    fn read_class(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        let file_name = format!("{}.class", name);
        for entry in &self.entries {
            if let Some(bytes) = entry.read_class(&file_name)? {
                log::debug!("loaded {} from {}", name, entry.path().display());
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }

    fn describe(&self) -> String {
        let paths: Vec<_> = self
            .entries()
            .iter()
            .map(|e| e.path().display().to_string())
            .collect();
        paths.join(if cfg!(windows) { ";" } else { ":" })
    }
}

fn is_separator(c: char) -> bool {
    c == ';' || (cfg!(not(windows)) && c == ':')
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("jar") || ext.eq_ignore_ascii_case("zip"))
}

fn parse_entry(item: &str) -> io::Result<Vec<Entry>> {
    if let Some(dir) = item.strip_suffix('*') {
        return expand_wildcard(Path::new(if dir.is_empty() { "." } else { dir }));
    }
    let path = Path::new(item);
    if is_archive(path) {
        return Ok(vec![Entry::Archive(ArchiveEntry::open(path)?)]);
    }
    if !path.is_dir() {
        return Err(io::Error::new(io::ErrorKind::NotFound, "not a directory"));
    }
    Ok(vec![Entry::Directory(path.to_path_buf())])
}

fn expand_wildcard(dir: &Path) -> io::Result<Vec<Entry>> {
    let mut archives = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_archive(&path) {
            archives.push(path);
        }
    }
    archives.sort();

    let mut entries = Vec::with_capacity(archives.len());
    for path in archives {
        match ArchiveEntry::open(&path) {
            Ok(archive) => entries.push(Entry::Archive(archive)),
            Err(e) => log::warn!("skipping archive {}: {}", path.display(), e),
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_jar(path: &Path, files: &[(&str, &[u8])]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        for (name, bytes) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_directory_entry() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg/Main.class"), b"main").unwrap();

        let classpath = ClassPath::parse(dir.path().to_str().unwrap());
        assert_eq!(classpath.read_class("pkg/Main").unwrap(), Some(b"main".to_vec()));
        assert_eq!(classpath.read_class("pkg/Other").unwrap(), None);
    }

    #[test]
    fn test_archive_entry() {
        let dir = TempDir::new().unwrap();
        let jar = dir.path().join("app.jar");
        write_jar(
            &jar,
            &[("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n"), ("a/B.class", b"b")],
        );

        let classpath = ClassPath::parse(jar.to_str().unwrap());
        assert_eq!(classpath.entries().len(), 1);
        assert_eq!(classpath.read_class("a/B").unwrap(), Some(b"b".to_vec()));
        assert_eq!(classpath.read_class("a/C").unwrap(), None);
    }

    #[test]
    fn test_archive_entry_larger_than_preallocation() {
        let dir = TempDir::new().unwrap();
        let jar = dir.path().join("big.jar");
        let big = vec![0x5A; PREALLOCATE_LIMIT as usize * 2 + 7];
        write_jar(&jar, &[("Big.class", big.as_slice())]);

        let classpath = ClassPath::parse(jar.to_str().unwrap());
        assert_eq!(classpath.read_class("Big").unwrap(), Some(big));
    }

    #[test]
    fn test_first_entry_wins() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        std::fs::write(first.path().join("Dup.class"), b"first").unwrap();
        std::fs::write(second.path().join("Dup.class"), b"second").unwrap();
        std::fs::write(second.path().join("Only.class"), b"only").unwrap();

        let list = format!("{};{}", first.path().display(), second.path().display());
        let classpath = ClassPath::parse(&list);
        assert_eq!(classpath.read_class("Dup").unwrap(), Some(b"first".to_vec()));
        assert_eq!(classpath.read_class("Only").unwrap(), Some(b"only".to_vec()));
    }

    #[test]
    fn test_wildcard_expands_archives() {
        let dir = TempDir::new().unwrap();
        write_jar(&dir.path().join("b.jar"), &[("X.class", b"from b")]);
        write_jar(&dir.path().join("a.zip"), &[("X.class", b"from a")]);
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let classpath = ClassPath::parse(&format!("{}/*", dir.path().display()));
        assert_eq!(classpath.entries().len(), 2);
        assert_eq!(classpath.read_class("X").unwrap(), Some(b"from a".to_vec()));
    }

    #[test]
    fn test_missing_entries_skipped() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.jar");
        let list = format!("{};{}", missing.display(), dir.path().display());

        let classpath = ClassPath::parse(&list);
        assert_eq!(classpath.entries().len(), 1);
        assert!(ClassPath::parse("").is_empty());
    }
}
