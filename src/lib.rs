//! Bootable disk image assembly.
//!
//! This crate builds the two images a PXE-style boot workflow needs: a
//! FAT-formatted EFI system-partition image carrying a boot binary and a
//! boot script, and a hybrid BIOS+EFI ISO9660 image produced by
//! transplanting a replacement boot script (and a rebuilt EFI image) into
//! a stock bootable ISO.
//!
//! # Architecture
//!
//! ```text
//! image (operations)
//!     │
//!     ├── efi      - build the FAT EFI system-partition image
//!     ├── hybrid   - rebuild a source ISO with substituted boot bits
//!     ├── walk     - recursive manifest of any image
//!     ├── extract  - copy an image's tree to a host directory
//!     └── info     - label and size
//!     │
//! vfs (formats, behind the Filesystem trait)
//!     │
//!     ├── fat      - read/write FAT12 via `fatfs`
//!     └── iso      - ISO9660 reader + staged writer with El Torito
//!                    boot catalog and Rock Ridge names
//! ```
//!
//! Operations never name a concrete format: they hold a
//! [`vfs::Filesystem`] obtained from [`vfs::open_image`], and discover
//! the ISO writer's commit step through [`vfs::Filesystem::finalizer`].
//!
//! # Example
//!
//! ```rust,ignore
//! use fdimage::image::{build_hybrid_iso, write_image_checksum};
//!
//! build_hybrid_iso("boot.iso".as_ref(), "netboot.iso".as_ref(), "autoexec.ipxe".as_ref())?;
//! write_image_checksum("boot.iso".as_ref())?;
//! ```

pub mod error;
pub mod image;
pub mod vfs;

pub use error::{ImageError, Result};
