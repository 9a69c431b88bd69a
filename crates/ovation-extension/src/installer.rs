//! Extension package installer.
//!
//! Uploaded extensions arrive as gzipped tarballs. The installer unpacks
//! into a staging directory **inside** the extensions directory (same
//! filesystem, so the final activation is an atomic rename), validates the
//! manifest, and only then moves the package into place. A package that
//! fails validation is rejected with the staging area removed — no partial
//! extension directory is ever left behind.

use std::fs;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ExtensionError, ExtensionResult};
use crate::manifest::{ExtensionManifest, MANIFEST_FILE};

/// A validated package sitting in the staging area, awaiting commit.
#[derive(Debug)]
pub struct StagedPackage {
    pub manifest: ExtensionManifest,
    /// Directory containing the manifest (staging root or its single
    /// top-level directory).
    root: PathBuf,
    staging_dir: PathBuf,
}

/// Unpacks and validates extension packages.
pub struct Installer {
    extensions_dir: PathBuf,
}

impl Installer {
    pub fn new(extensions_dir: PathBuf) -> Self {
        Self { extensions_dir }
    }

    /// Unpacks `bytes` into a fresh staging directory and validates the
    /// contained manifest. Nothing outside the staging directory is touched.
    pub fn stage(&self, bytes: &[u8]) -> ExtensionResult<StagedPackage> {
        fs::create_dir_all(&self.extensions_dir)?;
        let staging_dir = self
            .extensions_dir
            .join(format!(".staging-{}", Uuid::new_v4()));
        fs::create_dir_all(&staging_dir)?;

        match self.stage_inner(bytes, &staging_dir) {
            Ok(staged) => Ok(staged),
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir_all(&staging_dir) {
                    warn!(error = %cleanup, "Failed to clean staging directory");
                }
                Err(e)
            }
        }
    }

    fn stage_inner(&self, bytes: &[u8], staging_dir: &Path) -> ExtensionResult<StagedPackage> {
        unpack_archive(bytes, staging_dir)?;
        let root = locate_package_root(staging_dir)?;
        let manifest = ExtensionManifest::load(&root)
            .map_err(|e| ExtensionError::Upload(format!("invalid manifest in package: {e}")))?;

        let target = self.extensions_dir.join(&manifest.id);
        if target.exists() {
            return Err(ExtensionError::Upload(format!(
                "extension '{}' is already installed",
                manifest.id
            )));
        }

        Ok(StagedPackage {
            manifest,
            root,
            staging_dir: staging_dir.to_path_buf(),
        })
    }

    /// Moves a staged package into its final directory. Atomic on the
    /// extensions directory's filesystem.
    pub fn commit(&self, staged: StagedPackage) -> ExtensionResult<ExtensionManifest> {
        let target = self.extensions_dir.join(&staged.manifest.id);
        if target.exists() {
            self.discard(&staged);
            return Err(ExtensionError::Upload(format!(
                "extension '{}' is already installed",
                staged.manifest.id
            )));
        }
        fs::rename(&staged.root, &target)?;
        if staged.root != staged.staging_dir && staged.staging_dir.exists() {
            let _ = fs::remove_dir_all(&staged.staging_dir);
        }
        info!(extension = %staged.manifest.id, "Extension package installed");
        Ok(staged.manifest)
    }

    /// Removes a staged package without installing it.
    pub fn discard(&self, staged: &StagedPackage) {
        if let Err(e) = fs::remove_dir_all(&staged.staging_dir) {
            warn!(error = %e, "Failed to discard staged package");
        }
    }
}

/// Unpacks a gzipped tarball, rejecting absolute paths and `..` components
/// before anything is written.
fn unpack_archive(bytes: &[u8], dest: &Path) -> ExtensionResult<()> {
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let entries = archive
        .entries()
        .map_err(|e| ExtensionError::Upload(format!("not a valid tar.gz archive: {e}")))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| ExtensionError::Upload(format!("corrupt archive entry: {e}")))?;
        let path = entry
            .path()
            .map_err(|e| ExtensionError::Upload(format!("invalid entry path: {e}")))?
            .into_owned();

        for component in path.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(ExtensionError::Upload(format!(
                        "unsafe path in archive: '{}'",
                        path.display()
                    )));
                }
            }
        }

        entry
            .unpack_in(dest)
            .map_err(|e| ExtensionError::Upload(format!("failed to unpack archive: {e}")))?;
    }
    Ok(())
}

/// Finds the directory containing `manifest.json`: the staging root itself,
/// or its single top-level directory (the usual tarball layout).
fn locate_package_root(staging_dir: &Path) -> ExtensionResult<PathBuf> {
    if staging_dir.join(MANIFEST_FILE).exists() {
        return Ok(staging_dir.to_path_buf());
    }

    let mut dirs = Vec::new();
    for entry in fs::read_dir(staging_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    if let [single] = dirs.as_slice()
        && single.join(MANIFEST_FILE).exists()
    {
        return Ok(single.clone());
    }

    Err(ExtensionError::Upload(format!(
        "package does not contain a {MANIFEST_FILE}"
    )))
}

/// Builds a gzipped tarball from `(path, contents)` pairs. Test helper for
/// the installer and the management API.
pub fn build_package(files: &[(&str, &str)]) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::GzEncoder;

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .expect("in-memory tar append cannot fail");
    }
    let encoder = builder.into_inner().expect("in-memory tar finish");
    encoder.finish().expect("in-memory gzip finish")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_json(id: &str) -> String {
        format!(
            r#"{{"id": "{id}", "name": "Test", "version": "1.0.0", "entry": "test"}}"#
        )
    }

    fn no_leftovers(dir: &Path) -> bool {
        fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .all(|e| !e.file_name().to_string_lossy().starts_with(".staging-"))
            })
            .unwrap_or(true)
    }

    #[test]
    fn installs_a_valid_package() {
        let dir = tempfile::tempdir().unwrap();
        let installer = Installer::new(dir.path().to_path_buf());

        let bytes = build_package(&[
            ("manifest.json", &manifest_json("uploaded")),
            ("README.md", "hello"),
        ]);
        let staged = installer.stage(&bytes).unwrap();
        let manifest = installer.commit(staged).unwrap();

        assert_eq!(manifest.id, "uploaded");
        assert!(dir.path().join("uploaded").join(MANIFEST_FILE).exists());
        assert!(no_leftovers(dir.path()));
    }

    #[test]
    fn package_in_a_top_level_directory_installs() {
        let dir = tempfile::tempdir().unwrap();
        let installer = Installer::new(dir.path().to_path_buf());

        let bytes = build_package(&[("pkg/manifest.json", &manifest_json("nested"))]);
        let staged = installer.stage(&bytes).unwrap();
        installer.commit(staged).unwrap();
        assert!(dir.path().join("nested").join(MANIFEST_FILE).exists());
        assert!(no_leftovers(dir.path()));
    }

    #[test]
    fn missing_manifest_is_rejected_without_a_trace() {
        let dir = tempfile::tempdir().unwrap();
        let installer = Installer::new(dir.path().to_path_buf());

        let bytes = build_package(&[("README.md", "no manifest here")]);
        let err = installer.stage(&bytes).unwrap_err();
        assert!(matches!(err, ExtensionError::Upload(_)));

        // No extension directory and no staging residue.
        let children: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert!(children.is_empty());
    }

    #[test]
    fn invalid_manifest_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let installer = Installer::new(dir.path().to_path_buf());

        let bytes = build_package(&[("manifest.json", r#"{"id": "BAD ID"}"#)]);
        assert!(matches!(
            installer.stage(&bytes),
            Err(ExtensionError::Upload(_))
        ));
        assert!(no_leftovers(dir.path()));
    }

    #[test]
    fn duplicate_install_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let installer = Installer::new(dir.path().to_path_buf());

        let bytes = build_package(&[("manifest.json", &manifest_json("dup"))]);
        let staged = installer.stage(&bytes).unwrap();
        installer.commit(staged).unwrap();

        let err = installer.stage(&bytes).unwrap_err();
        assert!(matches!(err, ExtensionError::Upload(_)));
        assert!(no_leftovers(dir.path()));
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let installer = Installer::new(dir.path().to_path_buf());
        assert!(matches!(
            installer.stage(b"definitely not a tarball"),
            Err(ExtensionError::Upload(_))
        ));
        assert!(no_leftovers(dir.path()));
    }
}
