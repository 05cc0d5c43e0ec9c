//! Hybrid BIOS+EFI ISO assembler.
//!
//! Takes a stock bootable ISO (typically a network-boot ISO) and a
//! replacement boot-script payload, and produces a new ISO that boots the
//! same way on legacy BIOS and EFI firmware with the replacement script
//! substituted for the original.
//!
//! Three filesystem images are in play at once: the source ISO, the FAT
//! EFI system-partition image nested inside it, and the freshly rebuilt
//! EFI image that replaces it in the output. All intermediates live in a
//! workspace directory that is removed on every exit path.

use std::fs;
use std::io;
use std::path::Path;

use log::{debug, info};
use tempfile::TempDir;

use crate::error::{ImageError, Result};
use crate::image::efi::{build_efi_image, copy_host_file, EFI_BOOT_DIR};
use crate::image::info::image_info;
use crate::image::walk::{walk, Manifest, ManifestEntry};
use crate::vfs::{
    open_image, BootEntry, BootPlatform, Filesystem, HybridBootConfig, IsoWriter,
};

/// Boot script substituted into the output.
const AUTOEXEC_NAME: &str = "autoexec.ipxe";

/// BIOS stage-one loader, staged for the El Torito catalog.
const BIOS_LOADER_NAME: &str = "isolinux.bin";

/// The source's El Torito catalog; finalize regenerates it.
const BOOT_CATALOG_NAME: &str = "boot.catalog";

/// Initial load size for the BIOS loader, in 512-byte sectors.
const BIOS_LOAD_SECTORS: u16 = 4;

/// Slack added on top of the content estimate: descriptors, boot catalog,
/// path tables, directory extents, and rounding.
const SIZE_PAD_BYTES: u64 = 4 * 1024 * 1024;

/// Name of the rebuilt EFI system-partition image in the workspace.
const REBUILT_EFI_NAME: &str = "efiboot.img";

/// Build a dual-boot ISO from `source_iso`, substituting `autoexec` for
/// the source's boot script.
///
/// Any step's error aborts the pipeline immediately; the destination file
/// already created on disk is left behind, possibly incomplete.
pub fn build_hybrid_iso(dest: &Path, source_iso: &Path, autoexec: &Path) -> Result<()> {
    let workspace = TempDir::with_prefix("fdimage-ws-")
        .map_err(|e| ImageError::from_io(std::env::temp_dir(), e))?;
    info!(
        "building hybrid ISO {} from {} (workspace {})",
        dest.display(),
        source_iso.display(),
        workspace.path().display()
    );

    let autoexec_size = fs::metadata(autoexec)
        .map_err(|e| ImageError::from_io(autoexec, e))?
        .len();
    let source = image_info(source_iso)?;

    let mut src = open_image(source_iso)?;
    let manifest = walk(src.as_ref(), "/")?;

    // The nested EFI system-partition image inside the source ISO.
    let nested_path = find_embedded_efi_image(&manifest)?.path.clone();
    debug!("embedded EFI image: {nested_path}");
    let nested_host = workspace.path().join("embedded.img");
    copy_to_host(src.as_mut(), &nested_path, &nested_host)?;

    // Recover its boot binary, then rebuild the image around that binary
    // plus the replacement autoexec. The original nested image never
    // reaches the destination.
    let boot_name = {
        let mut nested = open_image(&nested_host)?;
        let boot_entry = walk(nested.as_ref(), "/")?
            .into_iter()
            .find(|e| !e.is_dir && e.path.starts_with(&format!("{EFI_BOOT_DIR}/")))
            .ok_or_else(|| ImageError::not_found(format!("{EFI_BOOT_DIR} in {nested_path}")))?;
        let name = boot_entry.name().to_string();
        copy_to_host(nested.as_mut(), &boot_entry.path, &workspace.path().join(&name))?;
        name
    };
    debug!("EFI boot binary: {boot_name}");
    let rebuilt_efi = workspace.path().join(REBUILT_EFI_NAME);
    build_efi_image(
        &rebuilt_efi,
        &workspace.path().join(&boot_name),
        &boot_name,
        &[autoexec.to_path_buf()],
    )?;

    // Conservative estimate: original content, room for old and new
    // autoexec payloads to coexist, plus fixed slack.
    let dest_size = source.size_bytes + 2 * autoexec_size + SIZE_PAD_BYTES;
    let mut dst: Box<dyn Filesystem> =
        Box::new(IsoWriter::create(dest, dest_size, &source.label)?);

    let staged_loader = workspace.path().join(BIOS_LOADER_NAME);
    let mut loader_staged = false;
    for entry in &manifest {
        if entry.is_dir {
            dst.mkdir(&entry.path)?;
            continue;
        }
        if entry.path == nested_path {
            // Supplied at finalize time by the rebuilt image instead.
            continue;
        }
        match entry.name() {
            AUTOEXEC_NAME => {
                debug!("substituting {}", entry.path);
                copy_host_file(dst.as_mut(), autoexec, &entry.path)?;
            }
            BIOS_LOADER_NAME => {
                copy_to_host(src.as_mut(), &entry.path, &staged_loader)?;
                loader_staged = true;
            }
            BOOT_CATALOG_NAME => {
                // Regenerated by finalize.
            }
            _ => copy_between(src.as_mut(), dst.as_mut(), &entry.path)?,
        }
    }
    if !loader_staged {
        return Err(ImageError::not_found(format!(
            "{BIOS_LOADER_NAME} in {}",
            source_iso.display()
        )));
    }

    let config = HybridBootConfig {
        boot_entries: vec![
            BootEntry {
                platform: BootPlatform::Bios,
                boot_file: staged_loader,
                boot_info_table: true,
                load_sectors: Some(BIOS_LOAD_SECTORS),
            },
            BootEntry {
                platform: BootPlatform::Efi,
                boot_file: rebuilt_efi,
                boot_info_table: false,
                load_sectors: None,
            },
        ],
        volume_id: source.label,
        rock_ridge: true,
    };
    match dst.finalizer() {
        Some(finalizer) => finalizer.finalize(config)?,
        None => {
            return Err(ImageError::UnsupportedFormat {
                path: dest.display().to_string(),
            })
        }
    }
    info!("hybrid ISO complete: {}", dest.display());
    Ok(())
    // workspace drops here, removing every intermediate
}

/// The first and only manifest path ending in `.img`. Zero or multiple
/// candidates are hard errors rather than a silent guess.
fn find_embedded_efi_image(manifest: &Manifest) -> Result<&ManifestEntry> {
    let mut candidates = manifest.iter().filter(|e| !e.is_dir && e.path.ends_with(".img"));
    let first = candidates.next().ok_or(ImageError::NoEfiImage)?;
    if let Some(second) = candidates.next() {
        return Err(ImageError::EfiImageAmbiguous {
            first: first.path.clone(),
            second: second.path.clone(),
        });
    }
    Ok(first)
}

/// Copy one file out of an image into a host file.
fn copy_to_host(fs: &mut dyn Filesystem, path: &str, host: &Path) -> Result<u64> {
    debug!("copy {} -> {}", path, host.display());
    let mut reader = fs.open_read(path)?;
    let mut file = fs::File::create(host).map_err(|e| ImageError::from_io(host, e))?;
    io::copy(&mut reader, &mut file).map_err(|e| ImageError::from_io(host, e))
}

/// Verbatim inter-image copy at the same path.
fn copy_between(src: &mut dyn Filesystem, dst: &mut dyn Filesystem, path: &str) -> Result<()> {
    debug!("copy {path}");
    let mut reader = src.open_read(path)?;
    let mut writer = dst.create(path)?;
    io::copy(&mut reader, &mut writer).map_err(|e| ImageError::Io {
        path: path.to_string(),
        source: e,
    })?;
    writer.flush().map_err(|e| ImageError::Io {
        path: path.to_string(),
        source: e,
    })?;
    Ok(())
}
