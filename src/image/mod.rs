//! Image assembly operations: the command-level surface of the crate.

pub mod efi;
pub mod extract;
pub mod hybrid;
pub mod info;
pub mod walk;

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use log::info;
use sha2::{Digest, Sha512};

use crate::error::{ImageError, Result};

pub use efi::{build_efi_image, EFI_IMAGE_SIZE};
pub use extract::extract_image_files;
pub use hybrid::build_hybrid_iso;
pub use info::{image_info, ImageInfo};
pub use walk::{list_image_files, Manifest, ManifestEntry};

/// Write a `sha512sum`-compatible checksum file next to `image`.
///
/// The digest file is `<image>.sha512` and names the image by its bare
/// file name, so verification works from the image's own directory.
pub fn write_image_checksum(image: &Path) -> Result<PathBuf> {
    let digest = sha512_file(image)?;
    let name = image
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ImageError::not_found(image))?;
    let mut checksum_path = image.as_os_str().to_owned();
    checksum_path.push(".sha512");
    let checksum_path = PathBuf::from(checksum_path);
    fs::write(&checksum_path, format!("{digest}  {name}\n"))
        .map_err(|e| ImageError::from_io(&checksum_path, e))?;
    info!("wrote {}", checksum_path.display());
    Ok(checksum_path)
}

fn sha512_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| ImageError::from_io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha512::new();
    let mut buf = [0u8; 1024 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(|e| ImageError::from_io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
