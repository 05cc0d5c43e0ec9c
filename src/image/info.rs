//! Info inspector: volume label and backing-store size.

use std::fs;
use std::path::Path;

use crate::error::{ImageError, Result};
use crate::vfs::open_image;

/// What `image_info` reports about an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub label: String,
    pub size_bytes: u64,
}

/// Report an image's trimmed volume label and host file size.
pub fn image_info(image: &Path) -> Result<ImageInfo> {
    let size_bytes = fs::metadata(image)
        .map_err(|e| ImageError::from_io(image, e))?
        .len();
    let fs = open_image(image)?;
    Ok(ImageInfo {
        label: fs.label()?.trim().to_string(),
        size_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::FatImage;
    use tempfile::TempDir;

    #[test]
    fn test_info_reports_label_and_size() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("floppy.img");
        FatImage::format(&path, 1440 * 1024, "NETBOOT")
            .unwrap()
            .unmount()
            .unwrap();

        let info = image_info(&path).unwrap();
        assert_eq!(info.label, "NETBOOT");
        assert_eq!(info.size_bytes, 1440 * 1024);
    }

    #[test]
    fn test_info_missing_image() {
        let temp = TempDir::new().unwrap();
        let err = image_info(&temp.path().join("nope.img")).unwrap_err();
        assert!(matches!(err, ImageError::NotFound { .. }), "{err}");
    }
}
