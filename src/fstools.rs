use std::fs;
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DirEntryCategory {
    DoesNotExist,
    RegularFile,
    Directory,
    Unknown,
}

/// Classify `path`, following symlinks.
pub fn classify_file(path: &Path) -> DirEntryCategory {
    match fs::metadata(path) {
        Ok(metadata) => {
            if metadata.is_file() {
                DirEntryCategory::RegularFile
            } else if metadata.is_dir() {
                DirEntryCategory::Directory
            } else {
                DirEntryCategory::Unknown
            }
        },
        Err(_) => DirEntryCategory::DoesNotExist,
    }
}

pub fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|m| m.len())
}

#[cfg(unix)]
pub fn is_writable(path: &Path) -> bool {
    use nix::unistd::{access, AccessFlags};

    access(path, AccessFlags::W_OK).is_ok()
}

#[cfg(not(unix))]
pub fn is_writable(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(metadata) => !metadata.permissions().readonly(),
        Err(_) => false,
    }
}

/// Bytes available to unprivileged users on the filesystem holding `path`.
#[cfg(unix)]
pub fn free_space(path: &Path) -> Option<u64> {
    let stat = nix::sys::statvfs::statvfs(path).ok()?;
    Some((stat.blocks_available() as u64).saturating_mul(stat.fragment_size() as u64))
}

#[cfg(not(unix))]
pub fn free_space(_path: &Path) -> Option<u64> {
    None
}
