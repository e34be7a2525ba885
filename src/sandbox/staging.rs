//! Archive construction for injecting files into a sandbox.
//!
//! Files reach the container only as tar archives extracted by the engine,
//! never through bind mounts. Every entry path is relative and free of `..`
//! components, so nothing can land outside the extraction directory.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tar::{Builder, EntryType, Header};
use tracing::debug;

use crate::error::{Result, SandboxError};

/// Mode for staged source files.
const FILE_MODE: u32 = 0o644;

/// An archive ready for upload, plus how many files it holds.
#[derive(Debug, Clone)]
pub struct StagedArchive {
    pub bytes: Vec<u8>,
    pub file_count: usize,
}

/// Normalise a relative path for use inside an archive.
///
/// `.` components are dropped; absolute paths, drive prefixes and `..`
/// components are rejected.
pub fn sanitize_relative(path: &Path) -> Result<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(SandboxError::UnsafePath(path.display().to_string()));
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(SandboxError::UnsafePath(path.display().to_string()));
    }
    Ok(clean)
}

fn append_bytes<W: std::io::Write>(
    builder: &mut Builder<W>,
    path: &Path,
    content: &[u8],
    mode: u32,
) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(content.len() as u64);
    header.set_mode(mode);
    header.set_mtime(0);
    builder.append_data(&mut header, path, content)?;
    Ok(())
}

/// Build an archive holding a single file called `name`.
pub fn archive_file(name: &str, content: &[u8]) -> Result<StagedArchive> {
    let path = sanitize_relative(Path::new(name))?;
    let mut builder = Builder::new(Vec::new());
    append_bytes(&mut builder, &path, content, FILE_MODE)?;
    Ok(StagedArchive {
        bytes: builder.into_inner()?,
        file_count: 1,
    })
}

/// Build an archive of every regular file below `host_dir`, keyed by its
/// path relative to `host_dir`. Symlinks and special files are skipped.
pub fn archive_directory(host_dir: &Path) -> Result<StagedArchive> {
    if host_dir.as_os_str().is_empty() || !host_dir.is_dir() {
        return Err(SandboxError::DirectoryNotFound(host_dir.to_path_buf()));
    }

    let mut builder = Builder::new(Vec::new());
    let mut file_count = 0;
    let mut pending = vec![host_dir.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir)?.collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            // file_type() does not follow symlinks.
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            if !file_type.is_file() {
                debug!(path = %path.display(), "skipping non-regular file");
                continue;
            }

            let relative = path
                .strip_prefix(host_dir)
                .map_err(|_| SandboxError::UnsafePath(path.display().to_string()))?;
            let relative = sanitize_relative(relative)?;
            let content = fs::read(&path)?;
            append_bytes(&mut builder, &relative, &content, file_mode(&entry.metadata()?))?;
            file_count += 1;
        }
    }

    Ok(StagedArchive {
        bytes: builder.into_inner()?,
        file_count,
    })
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn file_mode(_metadata: &fs::Metadata) -> u32 {
    FILE_MODE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn entries(archive: &StagedArchive) -> Vec<(String, Vec<u8>)> {
        let mut reader = tar::Archive::new(archive.bytes.as_slice());
        reader
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let path = entry.path().unwrap().display().to_string();
                let mut content = Vec::new();
                entry.read_to_end(&mut content).unwrap();
                (path, content)
            })
            .collect()
    }

    #[test]
    fn test_sanitize_relative() {
        assert_eq!(
            sanitize_relative(Path::new("./src/main.py")).unwrap(),
            PathBuf::from("src/main.py")
        );
        assert!(sanitize_relative(Path::new("../escape.py")).is_err());
        assert!(sanitize_relative(Path::new("a/../../b")).is_err());
        assert!(sanitize_relative(Path::new("/etc/passwd")).is_err());
        assert!(sanitize_relative(Path::new("")).is_err());
        assert!(sanitize_relative(Path::new(".")).is_err());
    }

    #[test]
    fn test_archive_file() {
        let archive = archive_file("sandbox-1.py", b"print('hi')").unwrap();
        assert_eq!(archive.file_count, 1);
        assert_eq!(
            entries(&archive),
            vec![("sandbox-1.py".to_string(), b"print('hi')".to_vec())]
        );
    }

    #[test]
    fn test_archive_file_rejects_traversal() {
        let err = archive_file("../../root/.bashrc", b"x").unwrap_err();
        assert!(matches!(err, SandboxError::UnsafePath(_)));
    }

    #[test]
    fn test_archive_directory_preserves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg/sub")).unwrap();
        fs::write(dir.path().join("data.csv"), "a,b\n").unwrap();
        fs::write(dir.path().join("pkg/sub/mod.py"), "X = 1\n").unwrap();

        let archive = archive_directory(dir.path()).unwrap();
        assert_eq!(archive.file_count, 2);

        let mut paths: Vec<String> = entries(&archive).into_iter().map(|(p, _)| p).collect();
        paths.sort();
        assert_eq!(paths, vec!["data.csv", "pkg/sub/mod.py"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_archive_directory_skips_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("real.txt"), "ok").unwrap();
        std::os::unix::fs::symlink("/etc/passwd", dir.path().join("passwd")).unwrap();

        let archive = archive_directory(dir.path()).unwrap();
        let names: Vec<String> = entries(&archive).into_iter().map(|(p, _)| p).collect();
        assert_eq!(names, vec!["real.txt"]);
    }

    #[test]
    fn test_archive_directory_missing() {
        let err = archive_directory(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, SandboxError::DirectoryNotFound(_)));

        let err = archive_directory(Path::new("")).unwrap_err();
        assert!(matches!(err, SandboxError::DirectoryNotFound(_)));
    }

    #[test]
    fn test_archive_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive_directory(dir.path()).unwrap();
        assert_eq!(archive.file_count, 0);
    }
}
