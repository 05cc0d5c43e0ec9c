//! ISO9660 directory records and Rock Ridge system-use entries.
//!
//! Multi-byte fields in volume descriptors and directory records are
//! "both-endian": the little-endian value immediately followed by the
//! big-endian value. Directory records are variable length, never cross a
//! sector boundary, and always have an even length.

use time::OffsetDateTime;

/// Fixed part of a directory record, up to the file identifier.
pub const RECORD_HEADER_LEN: usize = 33;

/// Directory flag bit in the file-flags byte.
pub const FLAG_DIRECTORY: u8 = 0x02;

/// Encode a 16-bit both-endian field.
pub fn u16_both(v: u16) -> [u8; 4] {
    let le = v.to_le_bytes();
    let be = v.to_be_bytes();
    [le[0], le[1], be[0], be[1]]
}

/// Encode a 32-bit both-endian field.
pub fn u32_both(v: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&v.to_le_bytes());
    out[4..].copy_from_slice(&v.to_be_bytes());
    out
}

/// Recording date and time: seven binary fields, offset from 1900.
pub fn recording_time(now: OffsetDateTime) -> [u8; 7] {
    [
        (now.year() - 1900).clamp(0, 255) as u8,
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        0, // GMT offset: unspecified
    ]
}

/// Map a file name onto the d-character identifier stored in the record.
///
/// Rock Ridge NM entries carry the real name, so the identifier only has
/// to be unique enough for non-Rock-Ridge readers: uppercase, restricted
/// alphabet, truncated, with the `;1` version suffix on files.
pub fn iso_identifier(name: &str, is_dir: bool) -> Vec<u8> {
    let mut id: Vec<u8> = name
        .bytes()
        .take(30)
        .map(|b| match b.to_ascii_uppercase() {
            c @ (b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'.') => c,
            _ => b'_',
        })
        .collect();
    if id.is_empty() {
        id.push(b'_');
    }
    if !is_dir {
        id.extend_from_slice(b";1");
    }
    id
}

/// Length one record will occupy, including identifier padding and the
/// system-use area, rounded up to an even number of bytes.
pub fn record_len(id_len: usize, susp_len: usize) -> usize {
    let mut len = RECORD_HEADER_LEN + id_len;
    if id_len % 2 == 0 {
        len += 1; // padding byte keeps the system-use area aligned
    }
    len += susp_len;
    if len % 2 != 0 {
        len += 1;
    }
    len
}

/// Encode one directory record into `out`.
pub fn encode_record(
    out: &mut Vec<u8>,
    id: &[u8],
    is_dir: bool,
    extent_lba: u32,
    data_len: u32,
    timestamp: &[u8; 7],
    susp: &[u8],
) {
    let total = record_len(id.len(), susp.len());
    debug_assert!(total <= 255, "directory record overflow");
    let start = out.len();
    out.push(total as u8);
    out.push(0); // extended attribute record length
    out.extend_from_slice(&u32_both(extent_lba));
    out.extend_from_slice(&u32_both(data_len));
    out.extend_from_slice(timestamp);
    out.push(if is_dir { FLAG_DIRECTORY } else { 0 });
    out.push(0); // file unit size
    out.push(0); // interleave gap
    out.extend_from_slice(&u16_both(1)); // volume sequence number
    out.push(id.len() as u8);
    out.extend_from_slice(id);
    if id.len() % 2 == 0 {
        out.push(0);
    }
    out.extend_from_slice(susp);
    while (out.len() - start) < total {
        out.push(0);
    }
}

/// A directory record decoded from an extent.
#[derive(Debug, Clone)]
pub struct DecodedRecord {
    /// Presented name: the Rock Ridge alternate name when present,
    /// otherwise the identifier with its version suffix stripped.
    /// Self and parent records decode to `.` and `..`.
    pub name: String,
    pub is_dir: bool,
    pub extent_lba: u32,
    pub data_len: u32,
    /// Bytes this record occupied, so the caller can advance its cursor.
    pub record_len: usize,
}

/// Decode the directory record starting at `data[0]`.
///
/// Returns `None` when the first byte is zero (end of the records in this
/// sector) or the record is malformed.
pub fn decode_record(data: &[u8]) -> Option<DecodedRecord> {
    if data.is_empty() || data[0] == 0 {
        return None;
    }
    let len = data[0] as usize;
    if len < RECORD_HEADER_LEN + 1 || len > data.len() {
        return None;
    }
    let record = &data[..len];
    let extent_lba = u32::from_le_bytes(record[2..6].try_into().ok()?);
    let data_len = u32::from_le_bytes(record[10..14].try_into().ok()?);
    let flags = record[25];
    let id_len = record[32] as usize;
    if RECORD_HEADER_LEN + id_len > len {
        return None;
    }
    let id = &record[RECORD_HEADER_LEN..RECORD_HEADER_LEN + id_len];

    let mut susp_off = RECORD_HEADER_LEN + id_len;
    if id_len % 2 == 0 {
        susp_off += 1;
    }
    let susp = record.get(susp_off..).unwrap_or(&[]);

    let name = match id {
        [0x00] => ".".to_string(),
        [0x01] => "..".to_string(),
        _ => alternate_name(susp).unwrap_or_else(|| identifier_name(id)),
    };

    Some(DecodedRecord {
        name,
        is_dir: flags & FLAG_DIRECTORY != 0,
        extent_lba,
        data_len,
        record_len: len,
    })
}

/// Strip the `;1` version suffix from a plain identifier.
fn identifier_name(id: &[u8]) -> String {
    let s = String::from_utf8_lossy(id);
    match s.split_once(';') {
        Some((base, _)) => base.to_string(),
        None => s.into_owned(),
    }
}

/// Scan a system-use area for Rock Ridge NM entries and assemble the
/// alternate name, honoring the continuation flag.
fn alternate_name(mut susp: &[u8]) -> Option<String> {
    let mut name = String::new();
    let mut found = false;
    while susp.len() >= 4 {
        let sig = &susp[..2];
        let len = susp[2] as usize;
        if len < 4 || len > susp.len() {
            break;
        }
        if sig == b"NM" && len >= 5 {
            let flags = susp[4];
            name.push_str(&String::from_utf8_lossy(&susp[5..len]));
            found = true;
            if flags & 0x01 == 0 {
                break; // no continuation
            }
        }
        susp = &susp[len..];
    }
    if found && !name.is_empty() {
        Some(name)
    } else {
        None
    }
}

/// Replace the tail of an identifier that collides with a sibling's by a
/// numeric tag, so readers that ignore Rock Ridge still see every record
/// under a distinct name. The tag goes before the version suffix on files.
pub fn disambiguate_identifier(id: &[u8], n: u32, is_dir: bool) -> Vec<u8> {
    let tag = format!("_{n}");
    let base = if is_dir {
        id
    } else {
        id.strip_suffix(b";1").unwrap_or(id)
    };
    let keep = base.len().min(30 - tag.len());
    let mut out = base[..keep].to_vec();
    out.extend_from_slice(tag.as_bytes());
    if !is_dir {
        out.extend_from_slice(b";1");
    }
    out
}

/// SUSP indicator entry, placed in the root directory's self record.
pub fn susp_sp() -> [u8; 7] {
    [b'S', b'P', 7, 1, 0xBE, 0xEF, 0]
}

/// Rock Ridge alternate-name entry carrying the real file name.
pub fn susp_nm(name: &str) -> Vec<u8> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(5 + bytes.len());
    out.extend_from_slice(&[b'N', b'M', (5 + bytes.len()) as u8, 1, 0]);
    out.extend_from_slice(bytes);
    out
}

/// Rock Ridge POSIX attributes entry (RRIP 1.10 layout, no serial).
pub fn susp_px(is_dir: bool) -> [u8; 36] {
    let mode: u32 = if is_dir { 0o040755 } else { 0o100644 };
    let links: u32 = if is_dir { 2 } else { 1 };
    let mut out = [0u8; 36];
    out[..4].copy_from_slice(&[b'P', b'X', 36, 1]);
    out[4..12].copy_from_slice(&u32_both(mode));
    out[12..20].copy_from_slice(&u32_both(links));
    out[20..28].copy_from_slice(&u32_both(0)); // uid
    out[28..36].copy_from_slice(&u32_both(0)); // gid
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_endian_encoding() {
        assert_eq!(u16_both(0x1234), [0x34, 0x12, 0x12, 0x34]);
        assert_eq!(
            u32_both(0x0102_0304),
            [0x04, 0x03, 0x02, 0x01, 0x01, 0x02, 0x03, 0x04]
        );
    }

    #[test]
    fn test_identifier_mangling() {
        assert_eq!(iso_identifier("readme.txt", false), b"README.TXT;1");
        assert_eq!(iso_identifier("EFI", true), b"EFI");
        assert_eq!(iso_identifier("name with space", false), b"NAME_WITH_SPACE;1");
    }

    #[test]
    fn test_identifier_disambiguation() {
        let id = iso_identifier("readme.txt", false);
        let second = disambiguate_identifier(&id, 2, false);
        assert_eq!(second, b"README.TXT_2;1");
        assert_ne!(second, id);

        let dir = disambiguate_identifier(&iso_identifier("EFI", true), 2, true);
        assert_eq!(dir, b"EFI_2");

        // Near the length cap the tag displaces tail characters.
        let long = iso_identifier("a-name-that-runs-the-full-length.x", false);
        let tagged = disambiguate_identifier(&long, 3, false);
        assert!(tagged.ends_with(b"_3;1"));
        assert!(tagged.len() <= 32);
    }

    #[test]
    fn test_record_round_trip_with_rock_ridge() {
        let mut susp = Vec::new();
        susp.extend_from_slice(&susp_nm("autoexec.ipxe"));
        susp.extend_from_slice(&susp_px(false));

        let id = iso_identifier("autoexec.ipxe", false);
        let stamp = recording_time(OffsetDateTime::UNIX_EPOCH);
        let mut buf = Vec::new();
        encode_record(&mut buf, &id, false, 40, 512, &stamp, &susp);

        assert_eq!(buf.len() % 2, 0);
        assert_eq!(buf[0] as usize, buf.len());

        let decoded = decode_record(&buf).unwrap();
        assert_eq!(decoded.name, "autoexec.ipxe");
        assert!(!decoded.is_dir);
        assert_eq!(decoded.extent_lba, 40);
        assert_eq!(decoded.data_len, 512);
        assert_eq!(decoded.record_len, buf.len());
    }

    #[test]
    fn test_decode_self_and_parent() {
        let stamp = recording_time(OffsetDateTime::UNIX_EPOCH);
        let mut buf = Vec::new();
        encode_record(&mut buf, &[0x00], true, 20, 2048, &stamp, &susp_sp());
        let parent_at = buf.len();
        encode_record(&mut buf, &[0x01], true, 20, 2048, &stamp, &[]);

        assert_eq!(decode_record(&buf).unwrap().name, ".");
        assert_eq!(decode_record(&buf[parent_at..]).unwrap().name, "..");
    }

    #[test]
    fn test_decode_stops_at_zero_byte() {
        assert!(decode_record(&[0u8; 64]).is_none());
        assert!(decode_record(&[]).is_none());
    }

    #[test]
    fn test_record_len_is_even_and_padded() {
        // Odd identifier, no pad byte.
        assert_eq!(record_len(3, 0), 36);
        // Even identifier gets the padding byte.
        assert_eq!(record_len(4, 0), 38);
        // Odd system-use areas round up.
        assert_eq!(record_len(3, 7), 44);
    }
}
