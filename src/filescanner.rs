use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::containers::{self, Container};
use crate::fstools::{classify_file, DirEntryCategory};

pub struct FileScanner {
    pub recursive: bool,
    pub container: Container,
}

impl FileScanner {
    pub fn new(recursive: bool) -> Self {
        FileScanner { recursive, container: containers::SOURCE }
    }

    /// Candidate files under `paths`, sorted and without duplicates. Paths
    /// that do not exist or cannot be read contribute nothing.
    pub fn scan<P: AsRef<Path>>(&self, paths: &[P]) -> Vec<PathBuf> {
        let mut found = BTreeSet::new();
        for path in paths {
            self.scan_path(path.as_ref(), &mut found);
        }

        // the same file may be reachable through differently spelled arguments
        let mut seen = HashSet::new();
        found.into_iter()
            .filter(|p| seen.insert(fs::canonicalize(p).unwrap_or_else(|_| p.clone())))
            .collect()
    }

    fn scan_path(&self, path: &Path, found: &mut BTreeSet<PathBuf>) {
        match classify_file(path) {
            DirEntryCategory::RegularFile => {
                if Container::matches(self.container, path) {
                    found.insert(path.to_path_buf());
                }
            },
            DirEntryCategory::Directory => {
                let max_depth = if self.recursive { usize::MAX } else { 1 };
                let entries = WalkDir::new(path)
                    .min_depth(1)
                    .max_depth(max_depth)
                    .follow_links(true)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                    .filter(|e| Container::matches(self.container, e.path()));
                for entry in entries {
                    found.insert(entry.into_path());
                }
            },
            category => debug!("skipping {} ({:?})", path.display(), category),
        }
    }
}
