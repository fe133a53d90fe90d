//! Zipped data packages
//!
//! A zip package holds its descriptor at the top level or inside a single
//! directory. Archives are extracted to a temporary directory that lives as
//! long as the package does.

use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::PackageError;

/// An extracted archive and the descriptor found inside it
#[derive(Debug)]
pub struct ExtractedArchive {
    dir: TempDir,
    descriptor: PathBuf,
}

impl ExtractedArchive {
    /// Extraction root
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Path to the package descriptor
    pub fn descriptor(&self) -> &Path {
        &self.descriptor
    }
}

/// Whether `location` names a zip archive
pub fn is_zip(location: &str) -> bool {
    Path::new(location.split(|c: char| c == '?' || c == '#').next().unwrap_or(location))
        .extension()
        .map(|e| e.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

/// Extract `bytes` (read from `location`) and locate `default_filename`
pub fn extract(bytes: &[u8], location: &str, default_filename: &str) -> Result<ExtractedArchive, PackageError> {
    let archive_error = |source| PackageError::Archive {
        location: location.to_string(),
        source,
    };

    let dir = tempfile::Builder::new()
        .prefix("datapackage-")
        .tempdir()
        .map_err(|source| PackageError::Io {
            path: std::env::temp_dir().to_string_lossy().to_string(),
            source,
        })?;

    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(archive_error)?;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(archive_error)?;

        // Entries escaping the extraction root are skipped
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            warn!(entry = entry.name(), "skipping unsafe archive entry");
            continue;
        };
        let dest = dir.path().join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&dest).map_err(|source| io_error(&dest, source))?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
        }
        let mut file = fs::File::create(&dest).map_err(|source| io_error(&dest, source))?;
        io::copy(&mut entry, &mut file).map_err(|source| io_error(&dest, source))?;
    }

    let descriptor = find_descriptor(dir.path(), default_filename).ok_or_else(|| PackageError::MissingDescriptor {
        archive: location.to_string(),
        filename: default_filename.to_string(),
    })?;

    info!(archive = location, root = %dir.path().display(), "extracted package archive");
    Ok(ExtractedArchive { dir, descriptor })
}

/// Shallowest `filename` at most one directory below `root`
fn find_descriptor(root: &Path, filename: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && e.file_name() == filename)
        .filter(|e| !e.path().components().any(|c| c.as_os_str() == "__MACOSX"))
        .min_by_key(|e| e.depth())
        .map(|e| {
            debug!(descriptor = %e.path().display(), "found descriptor in archive");
            e.into_path()
        })
}

fn io_error(path: &Path, source: io::Error) -> PackageError {
    PackageError::Io {
        path: path.to_string_lossy().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_is_zip() {
        assert!(is_zip("package.zip"));
        assert!(is_zip("http://example.com/package.ZIP"));
        assert!(!is_zip("datapackage.json"));
    }

    #[test]
    fn test_extract_top_level_descriptor() {
        let bytes = zip_bytes(&[("datapackage.json", "{}"), ("data/test.csv", "a,b\n1,2\n")]);
        let extracted = extract(&bytes, "package.zip", "datapackage.json").unwrap();

        assert_eq!(extracted.descriptor(), extracted.root().join("datapackage.json"));
        assert!(extracted.root().join("data/test.csv").is_file());
    }

    #[test]
    fn test_extract_nested_descriptor() {
        let bytes = zip_bytes(&[("pkg/datapackage.json", "{}"), ("pkg/test.csv", "a\n")]);
        let extracted = extract(&bytes, "package.zip", "datapackage.json").unwrap();
        assert_eq!(extracted.descriptor(), extracted.root().join("pkg/datapackage.json"));
    }

    #[test]
    fn test_missing_descriptor() {
        let bytes = zip_bytes(&[("readme.txt", "nothing here")]);
        let err = extract(&bytes, "package.zip", "datapackage.json").unwrap_err();
        assert!(matches!(err, PackageError::MissingDescriptor { .. }));
    }

    #[test]
    fn test_not_a_zip() {
        let err = extract(b"plain text", "package.zip", "datapackage.json").unwrap_err();
        assert!(matches!(err, PackageError::Archive { .. }));
    }
}
