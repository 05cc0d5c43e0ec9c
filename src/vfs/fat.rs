//! FAT-backed disk images.
//!
//! Thin capability layer over the `fatfs` crate. Writes commit immediately,
//! so there is no finalize step; dropping the handle flushes and releases
//! the backing store.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use fatfs::{FatType, FormatVolumeOptions, FsOptions};
use log::debug;

use crate::error::{ImageError, Result};
use crate::vfs::{normalize, split_path, DirEntry, Filesystem};

/// A FAT filesystem bound to a regular-file backing store.
pub struct FatImage {
    path: PathBuf,
    fs: fatfs::FileSystem<fs::File>,
}

impl FatImage {
    /// Allocate a fixed-size backing store and format it as a FAT
    /// superfloppy (no partition table, filesystem at sector 0).
    ///
    /// The partially-written file is left on disk if formatting fails;
    /// callers own the cleanup policy.
    pub fn format(path: &Path, size_bytes: u64, label: &str) -> Result<Self> {
        debug!("formatting {} ({} bytes)", path.display(), size_bytes);
        let mut file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| ImageError::from_io(path, e))?;
        file.set_len(size_bytes)
            .map_err(|e| ImageError::from_io(path, e))?;

        // FAT12: a 1.44M superfloppy is far below the FAT32 cluster-count
        // minimum, and legacy firmware expects floppy geometry anyway.
        fatfs::format_volume(
            &mut file,
            FormatVolumeOptions::new()
                .fat_type(FatType::Fat12)
                .volume_label(pad_label(label)),
        )
        .map_err(|e| ImageError::from_io(path, e))?;

        let fs = fatfs::FileSystem::new(file, FsOptions::new())
            .map_err(|e| ImageError::from_io(path, e))?;
        Ok(FatImage {
            path: path.to_path_buf(),
            fs,
        })
    }

    /// Bind to an existing FAT image.
    pub fn open(path: &Path) -> Result<Self> {
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| ImageError::from_io(path, e))?;
        let fs = fatfs::FileSystem::new(file, FsOptions::new()).map_err(|e| {
            match e.kind() {
                // A backing file that parses as neither FAT nor ISO.
                std::io::ErrorKind::InvalidData | std::io::ErrorKind::InvalidInput => {
                    ImageError::UnsupportedFormat {
                        path: path.display().to_string(),
                    }
                }
                _ => ImageError::from_io(path, e),
            }
        })?;
        Ok(FatImage {
            path: path.to_path_buf(),
            fs,
        })
    }

    /// Flush all pending writes and release the backing store, surfacing
    /// any error that a plain drop would swallow.
    pub fn unmount(self) -> Result<()> {
        let path = self.path;
        self.fs
            .unmount()
            .map_err(|e| ImageError::from_io(&path, e))
    }
}

impl Filesystem for FatImage {
    fn mkdir(&mut self, path: &str) -> Result<()> {
        let (parent, name) = split_path(path)?;
        let root = self.fs.root_dir();
        let dir = if parent.is_empty() {
            root
        } else {
            root.open_dir(parent)
                .map_err(|e| ImageError::from_io(parent, e))?
        };
        // fatfs create_dir opens an existing directory instead of failing,
        // so the exists check has to happen here.
        if dir.open_dir(name).is_ok() || dir.open_file(name).is_ok() {
            return Err(ImageError::AlreadyExists {
                path: path.to_string(),
            });
        }
        dir.create_dir(name)
            .map_err(|e| ImageError::from_io(path, e))?;
        Ok(())
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let root = self.fs.root_dir();
        let norm = normalize(path);
        let dir = if norm.is_empty() {
            root
        } else {
            match root.open_dir(norm) {
                Ok(d) => d,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(ImageError::not_found(norm))
                }
                Err(_) if root.open_file(norm).is_ok() => {
                    return Err(ImageError::NotADirectory {
                        path: path.to_string(),
                    })
                }
                Err(e) => return Err(ImageError::from_io(norm, e)),
            }
        };
        let mut entries = Vec::new();
        for item in dir.iter() {
            let entry = item.map_err(|e| ImageError::from_io(path, e))?;
            entries.push(DirEntry {
                name: entry.file_name(),
                is_dir: entry.is_dir(),
                is_volume_label: entry
                    .attributes()
                    .contains(fatfs::FileAttributes::VOLUME_ID),
            });
        }
        Ok(entries)
    }

    fn open_read(&mut self, path: &str) -> Result<Box<dyn Read + '_>> {
        let norm = normalize(path);
        let file = self
            .fs
            .root_dir()
            .open_file(norm)
            .map_err(|e| ImageError::from_io(norm, e))?;
        Ok(Box::new(file))
    }

    fn create(&mut self, path: &str) -> Result<Box<dyn Write + '_>> {
        let norm = normalize(path);
        let mut file = self
            .fs
            .root_dir()
            .create_file(norm)
            .map_err(|e| ImageError::from_io(norm, e))?;
        // create_file opens an existing file untruncated; last write wins.
        file.truncate().map_err(|e| ImageError::from_io(norm, e))?;
        Ok(Box::new(file))
    }

    fn label(&self) -> Result<String> {
        Ok(self.fs.volume_label().trim_end().to_string())
    }
}

/// Pad a label to the 11-byte BPB field, truncating if necessary.
fn pad_label(label: &str) -> [u8; 11] {
    let mut padded = [b' '; 11];
    for (slot, byte) in padded.iter_mut().zip(label.bytes()) {
        *slot = byte;
    }
    padded
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEST_SIZE: u64 = 1440 * 1024;

    fn temp_image(name: &str) -> (TempDir, PathBuf) {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(name);
        (temp, path)
    }

    #[test]
    fn test_format_then_open_preserves_label() {
        let (_temp, path) = temp_image("floppy.img");
        let img = FatImage::format(&path, TEST_SIZE, "FDIMAGE").unwrap();
        img.unmount().unwrap();

        let img = FatImage::open(&path).unwrap();
        assert_eq!(img.label().unwrap(), "FDIMAGE");
    }

    #[test]
    fn test_mkdir_requires_parent() {
        let (_temp, path) = temp_image("floppy.img");
        let mut img = FatImage::format(&path, TEST_SIZE, "TEST").unwrap();

        let err = img.mkdir("/EFI/BOOT").unwrap_err();
        assert!(matches!(err, ImageError::NotFound { .. }), "{err}");

        img.mkdir("/EFI").unwrap();
        img.mkdir("/EFI/BOOT").unwrap();
    }

    #[test]
    fn test_mkdir_existing_fails() {
        let (_temp, path) = temp_image("floppy.img");
        let mut img = FatImage::format(&path, TEST_SIZE, "TEST").unwrap();

        img.mkdir("/EFI").unwrap();
        let err = img.mkdir("/EFI").unwrap_err();
        assert!(matches!(err, ImageError::AlreadyExists { .. }), "{err}");
    }

    #[test]
    fn test_file_round_trip() {
        let (_temp, path) = temp_image("floppy.img");
        let mut img = FatImage::format(&path, TEST_SIZE, "TEST").unwrap();

        let payload: Vec<u8> = (0u32..4096).map(|i| (i % 251) as u8).collect();
        {
            let mut out = img.create("/payload.bin").unwrap();
            out.write_all(&payload).unwrap();
            out.flush().unwrap();
        }

        let mut back = Vec::new();
        img.open_read("/payload.bin")
            .unwrap()
            .read_to_end(&mut back)
            .unwrap();
        assert_eq!(back.len(), payload.len());
        assert_eq!(back, payload);
    }

    #[test]
    fn test_open_read_missing_file() {
        let (_temp, path) = temp_image("floppy.img");
        let mut img = FatImage::format(&path, TEST_SIZE, "TEST").unwrap();
        // The Ok arm is an opaque reader, so take the error side directly.
        let err = img.open_read("/absent.txt").err().unwrap();
        assert!(matches!(err, ImageError::NotFound { .. }), "{err}");
    }

    #[test]
    fn test_read_dir_lists_entries() {
        let (_temp, path) = temp_image("floppy.img");
        let mut img = FatImage::format(&path, TEST_SIZE, "TEST").unwrap();
        img.mkdir("/EFI").unwrap();
        {
            let mut out = img.create("/readme.txt").unwrap();
            out.write_all(b"hello").unwrap();
            out.flush().unwrap();
        }

        let entries = img.read_dir("/").unwrap();
        let efi = entries.iter().find(|e| e.name == "EFI").unwrap();
        assert!(efi.is_dir);
        let readme = entries.iter().find(|e| e.name == "readme.txt").unwrap();
        assert!(!readme.is_dir);
    }
}
