//! EFI system-partition image builder.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::{ImageError, Result};
use crate::vfs::{FatImage, Filesystem};

pub const KIB: u64 = 1024;

/// Legacy 1.44 MiB floppy geometry, kept for maximum BIOS/EFI firmware
/// compatibility when the image boots as a superfloppy.
pub const EFI_IMAGE_KIB: u64 = 1440;

/// Fixed size of every EFI system-partition image we produce.
pub const EFI_IMAGE_SIZE: u64 = EFI_IMAGE_KIB * KIB;

/// Conventional directory firmware searches for the boot binary.
pub const EFI_BOOT_DIR: &str = "/EFI/BOOT";

const EFI_VOLUME_LABEL: &str = "EFIBOOT";

/// Create a FAT-formatted EFI system-partition image.
///
/// Allocates a fresh fixed-size backing store at `image`, formats it,
/// places the boot binary at `/EFI/BOOT/<boot_name>`, and copies each
/// extra file into the image root under its own base name (duplicate base
/// names are not arbitrated; the last write wins). The first error aborts
/// the build and leaves the partial image on disk.
pub fn build_efi_image(
    image: &Path,
    boot_binary: &Path,
    boot_name: &str,
    extra_files: &[PathBuf],
) -> Result<()> {
    info!(
        "building EFI image {} (boot binary {})",
        image.display(),
        boot_binary.display()
    );
    let mut fat = FatImage::format(image, EFI_IMAGE_SIZE, EFI_VOLUME_LABEL)?;
    fat.mkdir("/EFI")?;
    fat.mkdir(EFI_BOOT_DIR)?;
    copy_host_file(&mut fat, boot_binary, &format!("{EFI_BOOT_DIR}/{boot_name}"))?;
    for extra in extra_files {
        let name = extra
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ImageError::not_found(extra))?;
        copy_host_file(&mut fat, extra, &format!("/{name}"))?;
    }
    fat.unmount()
}

/// Copy a host file into an image, verifying the byte count against the
/// source's stat size.
pub(crate) fn copy_host_file(fs: &mut dyn Filesystem, src: &Path, dest: &str) -> Result<()> {
    debug!("copy {} -> {}", src.display(), dest);
    let expected = fs::metadata(src)
        .map_err(|e| ImageError::from_io(src, e))?
        .len();
    let mut reader = fs::File::open(src).map_err(|e| ImageError::from_io(src, e))?;
    let mut writer = fs.create(dest)?;
    let copied = io::copy(&mut reader, &mut writer)
        .map_err(|e| ImageError::from_io(src, e))?;
    writer
        .flush()
        .map_err(|e| ImageError::from_io(src, e))?;
    drop(writer);
    if copied != expected {
        return Err(ImageError::SizeMismatch {
            path: src.display().to_string(),
            expected,
            actual: copied,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::walk::list_image_files;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_efi_image_contents() {
        let temp = TempDir::new().unwrap();
        let boot = temp.path().join("grubx64.efi");
        fs::write(&boot, b"grub payload").unwrap();
        let extra = temp.path().join("autoexec.ipxe");
        fs::write(&extra, b"#!ipxe\nchain http://boot\n").unwrap();
        let image = temp.path().join("efiboot.img");

        build_efi_image(&image, &boot, "BOOTX64.EFI", &[extra]).unwrap();

        assert_eq!(fs::metadata(&image).unwrap().len(), EFI_IMAGE_SIZE);

        let listed: Vec<String> = list_image_files(&image)
            .unwrap()
            .iter()
            .map(|e| e.to_string())
            .collect();
        assert_eq!(
            listed,
            vec![
                "/EFI/".to_string(),
                "/EFI/BOOT/".to_string(),
                "/EFI/BOOT/BOOTX64.EFI".to_string(),
                "/autoexec.ipxe".to_string(),
            ]
        );
    }

    #[test]
    fn test_missing_boot_binary_fails() {
        let temp = TempDir::new().unwrap();
        let image = temp.path().join("efiboot.img");
        let err =
            build_efi_image(&image, &temp.path().join("absent.efi"), "BOOTX64.EFI", &[])
                .unwrap_err();
        assert!(matches!(err, ImageError::NotFound { .. }), "{err}");
        // No rollback: the partial image stays on disk.
        assert!(image.exists());
    }

    #[test]
    fn test_extra_file_round_trip() {
        let temp = TempDir::new().unwrap();
        let boot = temp.path().join("bootx64.efi");
        fs::write(&boot, b"stub").unwrap();
        let payload: Vec<u8> = (0u32..300_000).map(|i| (i % 241) as u8).collect();
        let extra = temp.path().join("payload.bin");
        fs::write(&extra, &payload).unwrap();
        let image = temp.path().join("efiboot.img");

        build_efi_image(&image, &boot, "BOOTX64.EFI", &[extra]).unwrap();

        let mut fat = FatImage::open(&image).unwrap();
        let mut back = Vec::new();
        fat.open_read("/payload.bin")
            .unwrap()
            .read_to_end(&mut back)
            .unwrap();
        assert_eq!(back.len(), payload.len());
        assert_eq!(back, payload);
    }
}
