//! El Torito boot catalog construction.
//!
//! The catalog is one 2048-byte sector: a validation entry, the initial
//! (default) entry for the first platform, then a section header plus
//! section entry for each additional platform. All of our entries use
//! no-emulation mode; firmware loads the payload straight from its extent.

use crate::vfs::BootPlatform;

/// Platform ID byte for the catalog.
fn platform_id(platform: BootPlatform) -> u8 {
    match platform {
        BootPlatform::Bios => 0x00, // 80x86
        BootPlatform::Efi => 0xEF,
    }
}

/// One boot image already placed in the output, ready to be cataloged.
#[derive(Debug, Clone, Copy)]
pub struct CatalogedImage {
    pub platform: BootPlatform,
    /// Extent of the payload, in 2048-byte blocks.
    pub load_rba: u32,
    /// Initial load size in 512-byte sectors.
    pub sector_count: u16,
}

/// Build the boot catalog sector.
///
/// The first image becomes the initial/default entry; the rest become
/// section entries. At least one image is required.
pub fn build_catalog(images: &[CatalogedImage]) -> [u8; 2048] {
    debug_assert!(!images.is_empty());
    let mut sector = [0u8; 2048];

    write_validation_entry(&mut sector[..32], images[0].platform);
    write_boot_entry(&mut sector[32..64], &images[0]);

    for (index, image) in images.iter().enumerate().skip(1) {
        let base = 64 + (index - 1) * 64;
        let last = index == images.len() - 1;
        write_section_header(&mut sector[base..base + 32], image.platform, last);
        write_boot_entry(&mut sector[base + 32..base + 64], image);
    }

    sector
}

/// Validation entry: header ID, platform, ID string, self-cancelling
/// checksum, and the 0x55AA key bytes.
fn write_validation_entry(entry: &mut [u8], platform: BootPlatform) {
    entry[0] = 0x01;
    entry[1] = platform_id(platform);
    entry[4..4 + 7].copy_from_slice(b"FDIMAGE");
    entry[30] = 0x55;
    entry[31] = 0xAA;

    // Checksum word makes the sum of all 16-bit words zero.
    let mut sum: u16 = 0;
    for pair in entry.chunks_exact(2) {
        sum = sum.wrapping_add(u16::from_le_bytes([pair[0], pair[1]]));
    }
    let checksum = 0u16.wrapping_sub(sum);
    entry[28..30].copy_from_slice(&checksum.to_le_bytes());
}

/// Initial or section entry: bootable, no emulation.
fn write_boot_entry(entry: &mut [u8], image: &CatalogedImage) {
    entry[0] = 0x88; // bootable
    entry[1] = 0x00; // no emulation
    entry[2..4].copy_from_slice(&0u16.to_le_bytes()); // load segment: default
    entry[4] = 0x00; // system type
    entry[6..8].copy_from_slice(&image.sector_count.to_le_bytes());
    entry[8..12].copy_from_slice(&image.load_rba.to_le_bytes());
}

/// Section header introducing the entries for one more platform.
fn write_section_header(header: &mut [u8], platform: BootPlatform, last: bool) {
    header[0] = if last { 0x91 } else { 0x90 };
    header[1] = platform_id(platform);
    header[2..4].copy_from_slice(&1u16.to_le_bytes()); // entries in section
}

/// Patch an El Torito boot info table into a BIOS boot payload.
///
/// isolinux and friends reserve bytes 8..64 for this table: the PVD
/// extent, the payload's own extent and length, and a checksum over the
/// payload from byte 64 on. Without the patch the loader cannot find the
/// filesystem it was booted from.
pub fn patch_boot_info_table(payload: &mut [u8], pvd_lba: u32, file_lba: u32) {
    if payload.len() < 64 {
        return;
    }
    let length = payload.len() as u32;
    let mut checksum: u32 = 0;
    let mut chunks = payload[64..].chunks_exact(4);
    for word in &mut chunks {
        checksum = checksum.wrapping_add(u32::from_le_bytes(word.try_into().unwrap()));
    }
    let remainder = chunks.remainder();
    if !remainder.is_empty() {
        let mut word = [0u8; 4];
        word[..remainder.len()].copy_from_slice(remainder);
        checksum = checksum.wrapping_add(u32::from_le_bytes(word));
    }

    payload[8..12].copy_from_slice(&pvd_lba.to_le_bytes());
    payload[12..16].copy_from_slice(&file_lba.to_le_bytes());
    payload[16..20].copy_from_slice(&length.to_le_bytes());
    payload[20..24].copy_from_slice(&checksum.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_entry_checksum_is_zero() {
        let catalog = build_catalog(&[CatalogedImage {
            platform: BootPlatform::Bios,
            load_rba: 100,
            sector_count: 4,
        }]);

        let mut sum: u16 = 0;
        for pair in catalog[..32].chunks_exact(2) {
            sum = sum.wrapping_add(u16::from_le_bytes([pair[0], pair[1]]));
        }
        assert_eq!(sum, 0);
        assert_eq!(catalog[30], 0x55);
        assert_eq!(catalog[31], 0xAA);
    }

    #[test]
    fn test_hybrid_catalog_layout() {
        let catalog = build_catalog(&[
            CatalogedImage {
                platform: BootPlatform::Bios,
                load_rba: 100,
                sector_count: 4,
            },
            CatalogedImage {
                platform: BootPlatform::Efi,
                load_rba: 200,
                sector_count: 2880,
            },
        ]);

        // Initial entry: bootable, no emulation, 4 sectors at block 100.
        assert_eq!(catalog[32], 0x88);
        assert_eq!(catalog[33], 0x00);
        assert_eq!(&catalog[38..40], &4u16.to_le_bytes());
        assert_eq!(&catalog[40..44], &100u32.to_le_bytes());

        // Final section header for the EFI platform.
        assert_eq!(catalog[64], 0x91);
        assert_eq!(catalog[65], 0xEF);

        // EFI section entry points at the rebuilt system partition image.
        assert_eq!(catalog[96], 0x88);
        assert_eq!(&catalog[102..104], &2880u16.to_le_bytes());
        assert_eq!(&catalog[104..108], &200u32.to_le_bytes());
    }

    #[test]
    fn test_boot_info_table_patch() {
        let mut payload = vec![0u8; 2048];
        payload[64] = 1;
        payload[2047] = 7;
        patch_boot_info_table(&mut payload, 16, 100);

        assert_eq!(&payload[8..12], &16u32.to_le_bytes());
        assert_eq!(&payload[12..16], &100u32.to_le_bytes());
        assert_eq!(&payload[16..20], &2048u32.to_le_bytes());
        let expected: u32 = 1 + (7u32 << 24);
        assert_eq!(&payload[20..24], &expected.to_le_bytes());
    }
}
