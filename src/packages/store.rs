use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zip::ZipArchive;

use super::{PackageError, Result};
use crate::humanize::ByteSize;

/// Metadata describing one registered package.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    /// Files containing the handler logic, in load order.
    #[serde(default)]
    pub handler_files: Vec<String>,
    /// Supporting files the handler logic depends on.
    #[serde(default)]
    pub dependency_files: Vec<String>,
}

/// On-disk package registry.
///
/// Layout under the root directory:
/// - `<name>.json`: package metadata
/// - `<name>/`: extracted archive contents
///
/// Registration for an existing name overwrites files in place but never
/// deletes the directory, so files referenced by a still-running handler
/// stay available until that handler is stopped. A store-wide `RwLock`
/// serializes extraction against in-flight `read_file` calls.
pub struct PackageStore {
    root: PathBuf,
    area: RwLock<()>,
    max_unpacked_bytes: u64,
}

impl PackageStore {
    /// Open the store, creating the root directory if needed.
    /// `max_unpacked` caps the total decompressed size of one package.
    pub fn open(root: impl Into<PathBuf>, max_unpacked: ByteSize) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        info!(root = %root.display(), "Package store opened");
        Ok(Self {
            root,
            area: RwLock::new(()),
            max_unpacked_bytes: max_unpacked.as_u64(),
        })
    }

    /// Persist metadata and extract the ZIP archive into the package's
    /// directory, overwriting same-name files.
    pub fn register(&self, info: &PackageInfo, archive_bytes: &[u8]) -> Result<()> {
        validate_name(&info.name)?;

        let mut archive = ZipArchive::new(Cursor::new(archive_bytes))
            .map_err(|e| PackageError::PackageCorrupt(e.to_string()))?;

        let package_dir = self.root.join(&info.name);

        // Reject traversal before touching the disk, so a bad archive
        // leaves no partial state behind.
        for index in 0..archive.len() {
            let entry = archive
                .by_index(index)
                .map_err(|e| PackageError::PackageCorrupt(e.to_string()))?;
            if entry.enclosed_name().is_none() {
                return Err(PackageError::UnsafePackagePath(entry.name().to_string()));
            }
        }

        let _guard = self.area.write().expect("package store lock poisoned");

        fs::create_dir_all(&package_dir)?;
        // Entry sizes declared in the central directory are untrusted, so
        // each file is streamed against a running budget instead of
        // allocated up front.
        let mut remaining = self.max_unpacked_bytes;
        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|e| PackageError::PackageCorrupt(e.to_string()))?;
            let relative = entry.enclosed_name().expect("entries validated above");
            let target = package_dir.join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = fs::File::create(&target)?;
            let copied = io::copy(
                &mut Read::take(&mut entry, remaining.saturating_add(1)),
                &mut file,
            )?;
            if copied > remaining {
                return Err(PackageError::PackageTooLarge(self.max_unpacked_bytes));
            }
            remaining -= copied;
            debug!(package = %info.name, file = %target.display(), "Extracted package file");
        }

        let metadata_path = self.metadata_path(&info.name);
        let json = serde_json::to_vec_pretty(info)
            .map_err(|e| PackageError::PackageCorrupt(e.to_string()))?;
        fs::write(metadata_path, json)?;

        info!(
            package = %info.name,
            version = %info.version,
            handler_files = info.handler_files.len(),
            dependency_files = info.dependency_files.len(),
            "Registered package"
        );
        Ok(())
    }

    /// Stored metadata for one package.
    pub fn info(&self, name: &str) -> Result<PackageInfo> {
        validate_name(name)?;
        let _guard = self.area.read().expect("package store lock poisoned");
        let bytes = fs::read(self.metadata_path(name))
            .map_err(|_| PackageError::NotFound(name.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| PackageError::PackageCorrupt(e.to_string()))
    }

    /// Metadata for every registered package, derived from the storage area.
    pub fn list_all(&self) -> Result<Vec<PackageInfo>> {
        let _guard = self.area.read().expect("package store lock poisoned");
        let mut packages = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path)?;
            match serde_json::from_slice::<PackageInfo>(&bytes) {
                Ok(info) => packages.push(info),
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "Skipping unreadable package metadata")
                }
            }
        }
        packages.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(packages)
    }

    /// Raw bytes of one file inside a package.
    pub fn read_file(&self, name: &str, relative_path: &str) -> Result<Vec<u8>> {
        validate_name(name)?;
        let relative = sanitize_relative(relative_path)?;
        let _guard = self.area.read().expect("package store lock poisoned");
        let path = self.root.join(name).join(relative);
        fs::read(&path).map_err(|_| PackageError::NotFound(format!("{name}/{relative_path}")))
    }

    fn metadata_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }
}

fn validate_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if ok && name != "." && name != ".." {
        Ok(())
    } else {
        Err(PackageError::InvalidPackageName(name.to_string()))
    }
}

/// Same traversal guard as for archive entries, applied to read paths.
fn sanitize_relative(relative: &str) -> Result<&Path> {
    let path = Path::new(relative);
    let safe = !relative.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(path)
    } else {
        Err(PackageError::UnsafePackagePath(relative.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn open_store(dir: &TempDir) -> PackageStore {
        PackageStore::open(dir.path(), ByteSize(1 << 20)).unwrap()
    }

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn sample_info(name: &str) -> PackageInfo {
        PackageInfo {
            name: name.to_string(),
            version: "1.0".to_string(),
            handler_files: vec!["handler.wasm".to_string()],
            dependency_files: vec!["data/config.json".to_string()],
        }
    }

    #[test]
    fn register_then_read_back() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let archive = build_zip(&[
            ("handler.wasm", b"wasm bytes".as_slice()),
            ("data/config.json", b"{}".as_slice()),
        ]);
        store.register(&sample_info("p1"), &archive).unwrap();

        let info = store.info("p1").unwrap();
        assert_eq!(info.version, "1.0");
        assert_eq!(store.read_file("p1", "handler.wasm").unwrap(), b"wasm bytes");
        assert_eq!(store.read_file("p1", "data/config.json").unwrap(), b"{}");
        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    #[test]
    fn reregister_overwrites_files() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store
            .register(&sample_info("p1"), &build_zip(&[("handler.wasm", b"v1".as_slice())]))
            .unwrap();
        store
            .register(&sample_info("p1"), &build_zip(&[("handler.wasm", b"v2".as_slice())]))
            .unwrap();

        assert_eq!(store.read_file("p1", "handler.wasm").unwrap(), b"v2");
        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    #[test]
    fn rejects_corrupt_archive() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let err = store.register(&sample_info("p1"), b"not a zip").unwrap_err();
        assert!(matches!(err, PackageError::PackageCorrupt(_)));
        assert!(matches!(store.info("p1").unwrap_err(), PackageError::NotFound(_)));
    }

    #[test]
    fn rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let archive = build_zip(&[("../escape.txt", b"oops".as_slice())]);
        let err = store.register(&sample_info("p1"), &archive).unwrap_err();
        assert!(matches!(err, PackageError::UnsafePackagePath(_)));

        // read_file applies the same guard
        store
            .register(&sample_info("p1"), &build_zip(&[("a.txt", b"ok".as_slice())]))
            .unwrap();
        assert!(matches!(
            store.read_file("p1", "../p1.json").unwrap_err(),
            PackageError::UnsafePackagePath(_)
        ));
    }

    #[test]
    fn unpacked_size_is_capped() {
        let dir = TempDir::new().unwrap();
        let store = PackageStore::open(dir.path(), ByteSize(16)).unwrap();

        let archive = build_zip(&[("big.bin", [0u8; 64].as_slice())]);
        let err = store.register(&sample_info("p1"), &archive).unwrap_err();
        assert!(matches!(err, PackageError::PackageTooLarge(16)));
        assert!(matches!(store.info("p1").unwrap_err(), PackageError::NotFound(_)));

        // The budget spans all entries, not each one individually
        let archive = build_zip(&[
            ("a.bin", [0u8; 10].as_slice()),
            ("b.bin", [0u8; 10].as_slice()),
        ]);
        let err = store.register(&sample_info("p2"), &archive).unwrap_err();
        assert!(matches!(err, PackageError::PackageTooLarge(16)));

        // At the limit exactly is fine
        let archive = build_zip(&[("a.bin", [0u8; 16].as_slice())]);
        store.register(&sample_info("p3"), &archive).unwrap();
        assert_eq!(store.read_file("p3", "a.bin").unwrap().len(), 16);
    }

    #[test]
    fn rejects_bad_names() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        for bad in ["", "..", "a/b", "a\\b"] {
            assert!(matches!(
                store.info(bad).unwrap_err(),
                PackageError::InvalidPackageName(_)
            ));
        }
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store
            .register(&sample_info("p1"), &build_zip(&[("a.txt", b"ok".as_slice())]))
            .unwrap();
        assert!(matches!(
            store.read_file("p1", "missing.txt").unwrap_err(),
            PackageError::NotFound(_)
        ));
        assert!(matches!(
            store.read_file("ghost", "a.txt").unwrap_err(),
            PackageError::NotFound(_)
        ));
    }
}
