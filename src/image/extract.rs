//! Extractor: replay a walked manifest onto a host directory tree.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{ImageError, Result};
use crate::image::walk::{walk, Manifest};
use crate::vfs::{open_image, Filesystem};

/// Extract every path in an image into `dest_dir`.
///
/// `dest_dir` must already exist; callers own pre-flight checks. Stops on
/// the first error, leaving whatever was already extracted in place.
pub fn extract_image_files(image: &Path, dest_dir: &Path) -> Result<()> {
    let mut fs = open_image(image)?;
    let manifest = walk(fs.as_ref(), "/")?;
    replay_manifest(fs.as_mut(), &manifest, dest_dir)
}

/// Replay a manifest in order: directories are created as encountered
/// (non-recursively; the manifest's directories-first invariant supplies
/// the parents), files are copied byte for byte.
fn replay_manifest(fs: &mut dyn Filesystem, manifest: &Manifest, dest_dir: &Path) -> Result<()> {
    for entry in manifest {
        let host = host_path(dest_dir, &entry.path)?;
        if entry.is_dir {
            debug!("mkdir {}", host.display());
            fs::create_dir(&host).map_err(|e| ImageError::from_io(&host, e))?;
        } else {
            debug!("extract {}", host.display());
            let mut reader = fs.open_read(&entry.path)?;
            let mut file = fs::File::create(&host).map_err(|e| ImageError::from_io(&host, e))?;
            io::copy(&mut reader, &mut file).map_err(|e| ImageError::from_io(&host, e))?;
        }
    }
    Ok(())
}

/// Join an image path onto the destination directory, component by
/// component. Rock Ridge names come straight off the image, so traversal
/// components are rejected rather than trusted to stay inside `dest_dir`.
fn host_path(dest_dir: &Path, image_path: &str) -> Result<PathBuf> {
    let mut host = dest_dir.to_path_buf();
    for component in image_path.split('/').filter(|c| !c.is_empty()) {
        if component == "." || component == ".." || component.contains('\\') {
            return Err(ImageError::Io {
                path: image_path.to_string(),
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    "name would escape the extraction directory",
                ),
            });
        }
        host.push(component);
    }
    Ok(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::efi::build_efi_image;
    use crate::image::walk::ManifestEntry;
    use tempfile::TempDir;

    fn sample_image(temp: &TempDir) -> std::path::PathBuf {
        let boot = temp.path().join("bootx64.efi");
        fs::write(&boot, b"boot binary payload").unwrap();
        let extra = temp.path().join("startup.nsh");
        fs::write(&extra, b"echo hi").unwrap();
        let image = temp.path().join("efiboot.img");
        build_efi_image(&image, &boot, "BOOTX64.EFI", &[extra]).unwrap();
        image
    }

    #[test]
    fn test_extract_recreates_tree() {
        let temp = TempDir::new().unwrap();
        let image = sample_image(&temp);
        let dest = temp.path().join("out");
        fs::create_dir(&dest).unwrap();

        extract_image_files(&image, &dest).unwrap();

        assert!(dest.join("EFI").is_dir());
        assert!(dest.join("EFI/BOOT").is_dir());
        assert_eq!(
            fs::read(dest.join("EFI/BOOT/BOOTX64.EFI")).unwrap(),
            b"boot binary payload"
        );
        assert_eq!(fs::read(dest.join("startup.nsh")).unwrap(), b"echo hi");
    }

    #[test]
    fn test_reordered_manifest_fails() {
        // Directories listed after their children violate the manifest
        // invariant; replay must error rather than silently heal it.
        let temp = TempDir::new().unwrap();
        let image = sample_image(&temp);
        let dest = temp.path().join("out");
        fs::create_dir(&dest).unwrap();

        let manifest = vec![
            ManifestEntry {
                path: "/EFI/BOOT/BOOTX64.EFI".to_string(),
                is_dir: false,
            },
            ManifestEntry {
                path: "/EFI".to_string(),
                is_dir: true,
            },
        ];
        let mut fs_handle = open_image(&image).unwrap();
        let err = replay_manifest(fs_handle.as_mut(), &manifest, &dest).unwrap_err();
        assert!(matches!(err, ImageError::NotFound { .. }), "{err}");
    }

    #[test]
    fn test_traversal_names_are_rejected() {
        let temp = TempDir::new().unwrap();
        let image = sample_image(&temp);
        let dest = temp.path().join("out");
        fs::create_dir(&dest).unwrap();

        let manifest = vec![ManifestEntry {
            path: "/../escape.txt".to_string(),
            is_dir: false,
        }];
        let mut fs_handle = open_image(&image).unwrap();
        let err = replay_manifest(fs_handle.as_mut(), &manifest, &dest).unwrap_err();
        assert!(matches!(err, ImageError::Io { .. }), "{err}");
        assert!(!temp.path().join("escape.txt").exists());
    }

    #[test]
    fn test_extract_stops_on_first_error() {
        let temp = TempDir::new().unwrap();
        let image = sample_image(&temp);
        let dest = temp.path().join("missing-parent");
        // dest itself does not exist: the very first entry fails.
        let err = extract_image_files(&image, &dest).unwrap_err();
        assert!(matches!(err, ImageError::NotFound { .. }), "{err}");
        assert!(!dest.exists());
    }
}
