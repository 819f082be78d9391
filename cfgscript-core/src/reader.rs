//! Module resolution and content access

use crate::{CancellationToken, Error, Result};
use rustc_hash::FxHashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

/// Canonical identifier of a module, as produced by a [`Resolver`].
///
/// Two imports that resolve to equal paths are the same module, whatever
/// text was used to import them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModulePath(Arc<str>);

impl ModulePath {
    /// Wrap a resolved path
    pub fn new(path: impl Into<Arc<str>>) -> Self {
        Self(path.into())
    }

    /// The path as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModulePath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for ModulePath {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}

/// Maps the name in a `load(...)` statement to a [`ModulePath`].
pub trait Resolver: Send + Sync {
    /// Resolve `name` as imported from `from`.
    ///
    /// `from` is `None` when resolving the root module of a load. The result
    /// must be a pure function of `(name, from)` for the lifetime of a load.
    fn resolve(
        &self,
        cancel: &CancellationToken,
        name: &str,
        from: Option<&ModulePath>,
    ) -> Result<ModulePath>;
}

/// Reads the source of a resolved module.
pub trait ContentStore: Send + Sync {
    /// Read the raw bytes of the module at `path`
    fn read_file(&self, cancel: &CancellationToken, path: &ModulePath) -> Result<Vec<u8>>;
}

/// Check the parts of a module name every resolver rejects.
pub fn validate_module_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::resolve(name, "empty module name"));
    }
    if name.contains('\0') {
        return Err(Error::resolve(name, "invalid character in module name"));
    }
    // Module names always use '/', whatever the host separator is.
    if name.contains('\\') {
        return Err(Error::resolve(name, "invalid character in module name"));
    }
    Ok(())
}

/// Normalize a `/`-separated module name into path segments.
///
/// The name is treated as absolute: `.` segments are dropped and `..` never
/// climbs above the root.
pub fn clean_segments(name: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    for segment in name.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments
}

/// Resolves and reads modules from a directory on the local filesystem.
///
/// Nested imports are resolved as absolute paths under `root`; the root
/// module keeps the name it was loaded with.
#[derive(Debug, Clone)]
pub struct LocalFileReader {
    root: PathBuf,
}

impl LocalFileReader {
    /// Create a reader rooted at `root`. An empty root means the current directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory imports are confined to
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Resolver for LocalFileReader {
    fn resolve(
        &self,
        cancel: &CancellationToken,
        name: &str,
        from: Option<&ModulePath>,
    ) -> Result<ModulePath> {
        cancel.check()?;
        validate_module_name(name)?;

        if from.is_none() {
            return Ok(ModulePath::new(name));
        }

        let segments = clean_segments(name);
        if segments.is_empty() {
            return Err(Error::resolve(name, "module name refers to the root directory"));
        }

        let mut path = self.root.clone();
        for segment in segments {
            path.push(segment);
        }
        let resolved = ModulePath::new(path.to_string_lossy().into_owned());
        trace!("Resolved {:?} from {:?} to {}", name, from, resolved);
        Ok(resolved)
    }
}

impl ContentStore for LocalFileReader {
    fn read_file(&self, cancel: &CancellationToken, path: &ModulePath) -> Result<Vec<u8>> {
        cancel.check()?;
        std::fs::read(path.as_str()).map_err(|e| Error::fetch(path.clone(), e))
    }
}

/// An in-memory module tree, useful for embedding and tests.
///
/// Every name, including the root, resolves to a `/`-rooted path.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileReader {
    files: FxHashMap<String, Arc<[u8]>>,
}

impl MemoryFileReader {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a file
    pub fn with_file(mut self, name: &str, contents: impl AsRef<[u8]>) -> Self {
        self.insert(name, contents);
        self
    }

    /// Add (or replace) a file
    pub fn insert(&mut self, name: &str, contents: impl AsRef<[u8]>) {
        let key = format!("/{}", clean_segments(name).join("/"));
        self.files.insert(key, Arc::from(contents.as_ref()));
    }
}

impl Resolver for MemoryFileReader {
    fn resolve(
        &self,
        cancel: &CancellationToken,
        name: &str,
        _from: Option<&ModulePath>,
    ) -> Result<ModulePath> {
        cancel.check()?;
        validate_module_name(name)?;
        let segments = clean_segments(name);
        if segments.is_empty() {
            return Err(Error::resolve(name, "module name refers to the root directory"));
        }
        Ok(ModulePath::new(format!("/{}", segments.join("/"))))
    }
}

impl ContentStore for MemoryFileReader {
    fn read_file(&self, cancel: &CancellationToken, path: &ModulePath) -> Result<Vec<u8>> {
        cancel.check()?;
        self.files
            .get(path.as_str())
            .map(|contents| contents.to_vec())
            .ok_or_else(|| {
                Error::fetch(
                    path.clone(),
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no such module"),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    fn resolve(reader: &LocalFileReader, name: &str) -> Result<ModulePath> {
        let from = ModulePath::new("main.cfg");
        reader.resolve(&CancellationToken::new(), name, Some(&from))
    }

    #[test]
    fn test_root_module_keeps_its_name() {
        let reader = LocalFileReader::new("/configs");
        let path = reader
            .resolve(&CancellationToken::new(), "main.cfg", None)
            .unwrap();
        assert_eq!(path.as_str(), "main.cfg");
    }

    #[test]
    fn test_nested_names_are_absolute_under_root() {
        let reader = LocalFileReader::new("/configs");
        let a = resolve(&reader, "lib/util.cfg").unwrap();
        let b = resolve(&reader, "/lib/util.cfg").unwrap();
        let c = resolve(&reader, "./lib/../lib/util.cfg").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(Path::new(a.as_str()), Path::new("/configs/lib/util.cfg"));
    }

    #[test]
    fn test_parent_segments_cannot_escape_root() {
        let reader = LocalFileReader::new("/configs");
        let path = resolve(&reader, "../../etc/passwd").unwrap();
        assert_eq!(Path::new(path.as_str()), Path::new("/configs/etc/passwd"));
    }

    #[test]
    fn test_rejects_bad_names() {
        let reader = LocalFileReader::new("/configs");
        for name in ["", "evil\0name", "..\\windows\\path", "..", "/"] {
            let result = resolve(&reader, name);
            assert!(
                matches!(result, Err(Error::Resolve { .. })),
                "Should reject module name: {:?}",
                name
            );
        }
    }

    #[test]
    fn test_cancelled_resolve_fails() {
        let reader = LocalFileReader::new("/configs");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = reader.resolve(&cancel, "a.cfg", None);
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_read_file_surfaces_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let reader = LocalFileReader::new(temp_dir.path());
        let path = resolve(&reader, "missing.cfg").unwrap();

        match reader.read_file(&CancellationToken::new(), &path) {
            Err(Error::Fetch { path: failed, source }) => {
                assert_eq!(failed, path);
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected fetch error, got {:?}", other),
        }
    }

    #[test]
    fn test_read_file_returns_contents() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.cfg"), "x = 1\n").unwrap();
        let reader = LocalFileReader::new(temp_dir.path());
        let path = resolve(&reader, "a.cfg").unwrap();

        let contents = reader.read_file(&CancellationToken::new(), &path).unwrap();
        assert_eq!(contents, b"x = 1\n");
    }

    #[test]
    fn test_memory_reader() {
        let reader = MemoryFileReader::new().with_file("lib/a.cfg", "a = 1");
        let cancel = CancellationToken::new();
        let path = reader.resolve(&cancel, "./lib/a.cfg", None).unwrap();
        assert_eq!(path.as_str(), "/lib/a.cfg");
        assert_eq!(reader.read_file(&cancel, &path).unwrap(), b"a = 1");

        let missing = reader.resolve(&cancel, "b.cfg", Some(&path)).unwrap();
        assert!(matches!(
            reader.read_file(&cancel, &missing),
            Err(Error::Fetch { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_resolved_paths_stay_under_root(
            segments in proptest::collection::vec(
                prop_oneof![Just(".."), Just("."), Just("a"), Just("b"), Just("")],
                1..12,
            )
        ) {
            let reader = LocalFileReader::new("/root-dir");
            let name = segments.join("/");
            if let Ok(path) = resolve(&reader, &name) {
                prop_assert!(Path::new(path.as_str()).starts_with("/root-dir"));
                prop_assert!(!path.as_str().contains(".."));
            }
        }
    }
}
