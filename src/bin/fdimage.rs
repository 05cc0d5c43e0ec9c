use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use fdimage::image::{
    build_efi_image, build_hybrid_iso, extract_image_files, image_info, list_image_files,
    write_image_checksum,
};

fn usage() -> &'static str {
    "Usage:\n  fdimage [-v|-vv] [--force] <command>\n\nCommands:\n  create IMAGE EFI_FILE EFI_NAME [EXTRA...]   build a FAT EFI boot image\n  hybrid DEST_ISO SOURCE_ISO AUTOEXEC         build a BIOS+EFI hybrid ISO\n  ls IMAGE                                    list image contents\n  extract IMAGE DEST_DIR                      copy image contents out\n  info IMAGE                                  print label and size"
}

fn main() -> Result<()> {
    let mut verbosity = 0usize;
    let mut force = false;
    let mut args: Vec<String> = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-v" => verbosity += 1,
            "-vv" => verbosity += 2,
            "--force" => force = true,
            "-h" | "--help" => {
                println!("{}", usage());
                return Ok(());
            }
            _ => args.push(arg),
        }
    }
    stderrlog::new()
        .module(module_path!())
        .module("fdimage")
        .verbosity(verbosity + 1)
        .init()
        .context("initializing logging")?;

    match args.as_slice() {
        [cmd, image, efi_file, efi_name, extra @ ..] if cmd == "create" => {
            let extras: Vec<PathBuf> = extra.iter().map(PathBuf::from).collect();
            create(Path::new(image), Path::new(efi_file), efi_name, &extras, force)
        }
        [cmd, dest, source, autoexec] if cmd == "hybrid" => {
            hybrid(Path::new(dest), Path::new(source), Path::new(autoexec), force)
        }
        [cmd, image] if cmd == "ls" => ls(Path::new(image)),
        [cmd, image, dest_dir] if cmd == "extract" => {
            extract(Path::new(image), Path::new(dest_dir))
        }
        [cmd, image] if cmd == "info" => info(Path::new(image)),
        _ => bail!(usage()),
    }
}

fn create(
    image: &Path,
    efi_file: &Path,
    efi_name: &str,
    extras: &[PathBuf],
    force: bool,
) -> Result<()> {
    clear_destination(image, force)?;
    build_efi_image(image, efi_file, efi_name, extras)
        .with_context(|| format!("building EFI image '{}'", image.display()))
}

fn hybrid(dest: &Path, source: &Path, autoexec: &Path, force: bool) -> Result<()> {
    clear_destination(dest, force)?;
    build_hybrid_iso(dest, source, autoexec)
        .with_context(|| format!("building hybrid ISO '{}'", dest.display()))?;
    write_image_checksum(dest)
        .with_context(|| format!("writing checksum for '{}'", dest.display()))?;
    Ok(())
}

fn ls(image: &Path) -> Result<()> {
    let manifest = list_image_files(image)
        .with_context(|| format!("listing '{}'", image.display()))?;
    for entry in manifest {
        println!("{entry}");
    }
    Ok(())
}

fn extract(image: &Path, dest_dir: &Path) -> Result<()> {
    extract_image_files(image, dest_dir)
        .with_context(|| format!("extracting '{}'", image.display()))
}

fn info(image: &Path) -> Result<()> {
    let info = image_info(image).with_context(|| format!("reading '{}'", image.display()))?;
    println!("label: {}", info.label);
    println!("size: {} bytes", info.size_bytes);
    Ok(())
}

/// Destination-exists guard shared by the build commands. `--force`
/// removes the stale image; otherwise it is an error.
fn clear_destination(path: &Path, force: bool) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    if !force {
        bail!("'{}' already exists (use --force to overwrite)", path.display());
    }
    fs::remove_file(path).with_context(|| format!("removing '{}'", path.display()))
}
