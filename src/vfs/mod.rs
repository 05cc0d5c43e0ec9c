//! Virtual filesystem capability over disk images.
//!
//! Uniform mkdir/readdir/open/label operations over a disk image regardless
//! of the on-disk format. A [`Filesystem`] handle is bound to exactly one
//! backing store and is exclusively owned by the operation that opened it;
//! dropping the handle releases the store on every exit path.
//!
//! Formats that commit writes immediately (FAT) expose no finalize step.
//! Formats that stage a tree in memory and commit it in one pass (ISO9660)
//! implement [`Finalize`], discovered through [`Filesystem::finalizer`]
//! rather than a downcast so the assembler stays open to other containers.

pub mod fat;
pub mod iso;

use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{ImageError, Result};

pub use fat::FatImage;
pub use iso::{IsoReader, IsoWriter};

/// One entry of a directory listing: a bare name plus its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    /// Set when the format marks this entry as the volume-label
    /// placeholder rather than real content. A file merely named like
    /// the label is not flagged.
    pub is_volume_label: bool,
}

/// Which firmware a boot catalog entry targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootPlatform {
    Bios,
    Efi,
}

/// One El Torito boot entry: a no-emulation boot payload for one platform.
#[derive(Debug, Clone)]
pub struct BootEntry {
    pub platform: BootPlatform,
    /// Host path of the boot-file payload.
    pub boot_file: PathBuf,
    /// Patch an El Torito boot info table into the payload (BIOS only).
    pub boot_info_table: bool,
    /// Initial load size in 512-byte sectors (BIOS only). `None` means
    /// the payload's full size.
    pub load_sectors: Option<u16>,
}

/// Everything `finalize` needs to commit a staged ISO9660 tree.
///
/// Consumed once, at finalize time. The hybrid assembler always passes
/// exactly two entries, BIOS first and EFI second; an empty list produces
/// a non-bootable image.
#[derive(Debug, Clone)]
pub struct HybridBootConfig {
    pub boot_entries: Vec<BootEntry>,
    pub volume_id: String,
    pub rock_ridge: bool,
}

/// Format-specific commit step, implemented only by formats that stage
/// their tree before writing the final on-disk layout.
pub trait Finalize {
    fn finalize(&mut self, config: HybridBootConfig) -> Result<()>;
}

/// Operations the image-assembly core needs from any disk-image format.
pub trait Filesystem {
    /// Create one directory. Fails with `AlreadyExists` if it is already
    /// present and `NotFound` if its parent is missing.
    fn mkdir(&mut self, path: &str) -> Result<()>;

    /// Enumerate one directory. Entry order is whatever the format yields,
    /// but it must be deterministic for a given image.
    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>>;

    /// Open an existing file for reading.
    fn open_read(&mut self, path: &str) -> Result<Box<dyn Read + '_>>;

    /// Create a file (truncating any existing one) and open it for writing.
    fn create(&mut self, path: &str) -> Result<Box<dyn Write + '_>>;

    /// The image's volume label, trailing padding trimmed.
    fn label(&self) -> Result<String>;

    /// Capability query: `Some` only for formats that require a commit
    /// step after the tree is populated.
    fn finalizer(&mut self) -> Option<&mut dyn Finalize> {
        None
    }
}

/// Open an existing image, sniffing the format from its contents.
///
/// ISO9660 is recognized by the `CD001` standard identifier in the first
/// volume descriptor; anything else is handed to the FAT parser.
pub fn open_image(path: &Path) -> Result<Box<dyn Filesystem>> {
    if is_iso9660(path)? {
        Ok(Box::new(IsoReader::open(path)?))
    } else {
        Ok(Box::new(FatImage::open(path)?))
    }
}

/// Probe for the ISO9660 standard identifier at the first volume descriptor.
fn is_iso9660(path: &Path) -> Result<bool> {
    let mut file = fs::File::open(path).map_err(|e| ImageError::from_io(path, e))?;
    let mut magic = [0u8; 6];
    match file.seek(SeekFrom::Start(16 * iso::LOGICAL_BLOCK_SIZE as u64)) {
        Ok(_) => {}
        Err(e) => return Err(ImageError::from_io(path, e)),
    }
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(&magic[1..6] == b"CD001"),
        // Too small to hold a volume descriptor set: not an ISO.
        Err(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(ImageError::from_io(path, e)),
    }
}

/// Split an image path into its parent component and final name.
///
/// Accepts `/`-rooted and relative paths; an empty parent means the root
/// directory. Rejects paths that name the root itself.
pub(crate) fn split_path(path: &str) -> Result<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    let stripped = trimmed.trim_start_matches('/');
    if stripped.is_empty() {
        return Err(ImageError::IsADirectory {
            path: path.to_string(),
        });
    }
    match stripped.rsplit_once('/') {
        Some((parent, name)) => Ok((parent, name)),
        None => Ok(("", stripped)),
    }
}

/// Normalize an image path to its `/`-free component form.
pub(crate) fn normalize(path: &str) -> &str {
    path.trim_start_matches('/').trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_path_root_level_file() {
        let (parent, name) = split_path("/autoexec.ipxe").unwrap();
        assert_eq!(parent, "");
        assert_eq!(name, "autoexec.ipxe");
    }

    #[test]
    fn test_split_path_nested() {
        let (parent, name) = split_path("/EFI/BOOT/BOOTX64.EFI").unwrap();
        assert_eq!(parent, "EFI/BOOT");
        assert_eq!(name, "BOOTX64.EFI");
    }

    #[test]
    fn test_split_path_trailing_slash() {
        let (parent, name) = split_path("/EFI/BOOT/").unwrap();
        assert_eq!(parent, "EFI");
        assert_eq!(name, "BOOT");
    }

    #[test]
    fn test_split_path_rejects_root() {
        assert!(split_path("/").is_err());
        assert!(split_path("").is_err());
    }
}
