//! ISO9660 disk images.
//!
//! Two handles share this module. [`IsoReader`] binds to an existing image
//! and serves the walk/extract side: primary volume descriptor, directory
//! extents (Rock Ridge names honored), and file extents. [`IsoWriter`]
//! stages a filesystem tree in memory against a fixed-size backing store
//! and commits it in one pass when [`Finalize::finalize`] runs: volume
//! descriptors, El Torito boot catalog, path tables, directory extents
//! with Rock Ridge entries, file data, and the boot payload extents the
//! catalog points at.
//!
//! Boot payloads are deliberately not part of the directory tree; firmware
//! locates them through the catalog, so a tree entry would only duplicate
//! the bytes.

pub mod eltorito;
pub mod record;

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::debug;
use time::OffsetDateTime;

use crate::error::{ImageError, Result};
use crate::vfs::{normalize, split_path, DirEntry, Filesystem, Finalize, HybridBootConfig};
use eltorito::{build_catalog, patch_boot_info_table, CatalogedImage};
use record::{
    decode_record, disambiguate_identifier, encode_record, iso_identifier, record_len,
    recording_time, susp_nm, susp_px, susp_sp, u16_both, u32_both, DecodedRecord,
};

/// ISO9660 logical block size. Fixed; we neither read nor write images
/// with any other block size.
pub const LOGICAL_BLOCK_SIZE: usize = 2048;

/// Sector of the primary volume descriptor.
const PVD_LBA: u32 = 16;

fn sectors_for(bytes: u64) -> u64 {
    bytes.div_ceil(LOGICAL_BLOCK_SIZE as u64)
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Read-only handle over an existing ISO9660 image.
pub struct IsoReader {
    path: PathBuf,
    file: RefCell<fs::File>,
    label: String,
    root_lba: u32,
    root_len: u32,
}

impl IsoReader {
    /// Bind to an existing image, parsing its primary volume descriptor.
    pub fn open(path: &Path) -> Result<Self> {
        let file = fs::File::open(path).map_err(|e| ImageError::from_io(path, e))?;
        let reader = IsoReader {
            path: path.to_path_buf(),
            file: RefCell::new(file),
            label: String::new(),
            root_lba: 0,
            root_len: 0,
        };
        let pvd = reader.read_blocks(PVD_LBA, LOGICAL_BLOCK_SIZE as u32)?;
        if pvd[0] != 0x01 || &pvd[1..6] != b"CD001" {
            return Err(ImageError::UnsupportedFormat {
                path: path.display().to_string(),
            });
        }
        let block_size = u16::from_le_bytes([pvd[128], pvd[129]]);
        if block_size as usize != LOGICAL_BLOCK_SIZE {
            return Err(ImageError::UnsupportedFormat {
                path: path.display().to_string(),
            });
        }
        let label = String::from_utf8_lossy(&pvd[40..72]).trim_end().to_string();
        let root = decode_record(&pvd[156..190]).ok_or_else(|| ImageError::UnsupportedFormat {
            path: path.display().to_string(),
        })?;
        Ok(IsoReader {
            label,
            root_lba: root.extent_lba,
            root_len: root.data_len,
            ..reader
        })
    }

    fn read_blocks(&self, lba: u32, len: u32) -> Result<Vec<u8>> {
        let mut file = self.file.borrow_mut();
        file.seek(SeekFrom::Start(lba as u64 * LOGICAL_BLOCK_SIZE as u64))
            .map_err(|e| ImageError::from_io(&self.path, e))?;
        let mut data = vec![0u8; len as usize];
        file.read_exact(&mut data)
            .map_err(|e| ImageError::from_io(&self.path, e))?;
        Ok(data)
    }

    /// Decode every record in one directory extent. Records never cross a
    /// sector boundary; a zero length byte means the rest of the sector is
    /// unused.
    fn read_records(&self, lba: u32, len: u32) -> Result<Vec<DecodedRecord>> {
        let data = self.read_blocks(lba, sectors_for(len as u64) as u32 * LOGICAL_BLOCK_SIZE as u32)?;
        let data = &data[..len as usize];
        let mut records = Vec::new();
        let mut pos = 0;
        while pos < data.len() {
            match decode_record(&data[pos..]) {
                Some(rec) => {
                    pos += rec.record_len;
                    records.push(rec);
                }
                None => {
                    let next = (pos / LOGICAL_BLOCK_SIZE + 1) * LOGICAL_BLOCK_SIZE;
                    if next >= data.len() {
                        break;
                    }
                    pos = next;
                }
            }
        }
        Ok(records)
    }

    /// Resolve a path to its directory record, starting at the root.
    fn resolve(&self, path: &str) -> Result<DecodedRecord> {
        let mut current = DecodedRecord {
            name: "/".to_string(),
            is_dir: true,
            extent_lba: self.root_lba,
            data_len: self.root_len,
            record_len: 0,
        };
        for component in normalize(path).split('/').filter(|c| !c.is_empty()) {
            if !current.is_dir {
                return Err(ImageError::NotADirectory {
                    path: path.to_string(),
                });
            }
            let records = self.read_records(current.extent_lba, current.data_len)?;
            current = records
                .into_iter()
                .filter(|r| r.name != "." && r.name != "..")
                .find(|r| r.name == component)
                .ok_or_else(|| ImageError::not_found(path))?;
        }
        Ok(current)
    }
}

impl Filesystem for IsoReader {
    fn mkdir(&mut self, path: &str) -> Result<()> {
        Err(read_only(&self.path, path))
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let dir = self.resolve(path)?;
        if !dir.is_dir {
            return Err(ImageError::NotADirectory {
                path: path.to_string(),
            });
        }
        let records = self.read_records(dir.extent_lba, dir.data_len)?;
        Ok(records
            .into_iter()
            .map(|r| DirEntry {
                name: r.name,
                is_dir: r.is_dir,
                // ISO9660 keeps the label in the PVD, never in the tree.
                is_volume_label: false,
            })
            .collect())
    }

    fn open_read(&mut self, path: &str) -> Result<Box<dyn Read + '_>> {
        let entry = self.resolve(path)?;
        if entry.is_dir {
            return Err(ImageError::IsADirectory {
                path: path.to_string(),
            });
        }
        let padded = self.read_blocks(
            entry.extent_lba,
            sectors_for(entry.data_len as u64) as u32 * LOGICAL_BLOCK_SIZE as u32,
        )?;
        let mut data = padded;
        data.truncate(entry.data_len as usize);
        Ok(Box::new(Cursor::new(data)))
    }

    fn create(&mut self, path: &str) -> Result<Box<dyn Write + '_>> {
        Err(read_only(&self.path, path))
    }

    fn label(&self) -> Result<String> {
        Ok(self.label.clone())
    }
}

fn read_only(image: &Path, path: &str) -> ImageError {
    ImageError::Io {
        path: format!("{}:{}", image.display(), path),
        source: std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "ISO9660 images are opened read-only",
        ),
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// One node of the staged tree.
enum Node {
    Dir(BTreeMap<String, Node>),
    File(Vec<u8>),
}

/// Write handle that stages a tree in memory and commits it at finalize.
pub struct IsoWriter {
    path: PathBuf,
    file: fs::File,
    capacity_blocks: u64,
    label: String,
    root: BTreeMap<String, Node>,
}

impl IsoWriter {
    /// Allocate a fixed-size backing store for a new image.
    ///
    /// Nothing is written until `finalize`; until then the store is a hole
    /// of zeros. The partially-written image is left on disk if a later
    /// step fails.
    pub fn create(path: &Path, size_bytes: u64, label: &str) -> Result<Self> {
        debug!("allocating {} ({} bytes)", path.display(), size_bytes);
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| ImageError::from_io(path, e))?;
        file.set_len(size_bytes)
            .map_err(|e| ImageError::from_io(path, e))?;
        Ok(IsoWriter {
            path: path.to_path_buf(),
            file,
            capacity_blocks: size_bytes / LOGICAL_BLOCK_SIZE as u64,
            label: label.to_string(),
            root: BTreeMap::new(),
        })
    }

    fn resolve_dir(&self, path: &str) -> Result<&BTreeMap<String, Node>> {
        let mut dir = &self.root;
        for component in normalize(path).split('/').filter(|c| !c.is_empty()) {
            dir = match dir.get(component) {
                Some(Node::Dir(children)) => children,
                Some(Node::File(_)) => {
                    return Err(ImageError::NotADirectory {
                        path: path.to_string(),
                    })
                }
                None => return Err(ImageError::not_found(path)),
            };
        }
        Ok(dir)
    }

    fn resolve_dir_mut(&mut self, path: &str) -> Result<&mut BTreeMap<String, Node>> {
        let mut dir = &mut self.root;
        for component in normalize(path).split('/').filter(|c| !c.is_empty()) {
            dir = match dir.get_mut(component) {
                Some(Node::Dir(children)) => children,
                Some(Node::File(_)) => {
                    return Err(ImageError::NotADirectory {
                        path: path.to_string(),
                    })
                }
                None => return Err(ImageError::not_found(path)),
            };
        }
        Ok(dir)
    }

    fn write_block(&mut self, lba: u64, data: &[u8]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(lba * LOGICAL_BLOCK_SIZE as u64))
            .map_err(|e| ImageError::from_io(&self.path, e))?;
        self.file
            .write_all(data)
            .map_err(|e| ImageError::from_io(&self.path, e))?;
        Ok(())
    }
}

impl Filesystem for IsoWriter {
    fn mkdir(&mut self, path: &str) -> Result<()> {
        let (parent, name) = split_path(path)?;
        let dir = self.resolve_dir_mut(parent)?;
        if dir.contains_key(name) {
            return Err(ImageError::AlreadyExists {
                path: path.to_string(),
            });
        }
        dir.insert(name.to_string(), Node::Dir(BTreeMap::new()));
        Ok(())
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let dir = self.resolve_dir(path)?;
        Ok(dir
            .iter()
            .map(|(name, node)| DirEntry {
                name: name.clone(),
                is_dir: matches!(node, Node::Dir(_)),
                is_volume_label: false,
            })
            .collect())
    }

    fn open_read(&mut self, path: &str) -> Result<Box<dyn Read + '_>> {
        let (parent, name) = split_path(path)?;
        let dir = self.resolve_dir(parent)?;
        match dir.get(name) {
            Some(Node::File(data)) => Ok(Box::new(Cursor::new(data.as_slice()))),
            Some(Node::Dir(_)) => Err(ImageError::IsADirectory {
                path: path.to_string(),
            }),
            None => Err(ImageError::not_found(path)),
        }
    }

    fn create(&mut self, path: &str) -> Result<Box<dyn Write + '_>> {
        let (parent, name) = split_path(path)?;
        let dir = self.resolve_dir_mut(parent)?;
        match dir
            .entry(name.to_string())
            .or_insert_with(|| Node::File(Vec::new()))
        {
            Node::File(data) => {
                data.clear();
                Ok(Box::new(data))
            }
            Node::Dir(_) => Err(ImageError::IsADirectory {
                path: path.to_string(),
            }),
        }
    }

    fn label(&self) -> Result<String> {
        Ok(self.label.clone())
    }

    fn finalizer(&mut self) -> Option<&mut dyn Finalize> {
        Some(self)
    }
}

/// How one child appears in its parent's extent.
struct ChildSpec {
    name: String,
    is_dir: bool,
    lba: u32,
    len: u32,
}

/// One directory with its allocation, in preorder (root first).
struct PlannedDir {
    /// Joined path, "" for the root.
    path: String,
    parent: usize,
    lba: u32,
    len: u32,
}

impl Finalize for IsoWriter {
    /// Commit the staged tree: lay out descriptors, boot catalog, path
    /// tables, directory extents, file data, and boot payloads, then write
    /// them all.
    fn finalize(&mut self, config: HybridBootConfig) -> Result<()> {
        let now = recording_time(OffsetDateTime::now_utc());
        let rr = config.rock_ridge;
        let bootable = !config.boot_entries.is_empty();

        // Boot payloads come off the host, not the staged tree.
        let mut payloads: Vec<Vec<u8>> = Vec::new();
        for entry in &config.boot_entries {
            let data =
                fs::read(&entry.boot_file).map_err(|e| ImageError::from_io(&entry.boot_file, e))?;
            payloads.push(data);
        }

        // Descriptor area: PVD, boot record when bootable, terminator,
        // then the boot catalog.
        let mut next_lba: u64 = PVD_LBA as u64 + if bootable { 3 } else { 2 };
        let catalog_lba = if bootable {
            let lba = next_lba;
            next_lba += 1;
            lba
        } else {
            0
        };

        // Directory extents, preorder. Sizing runs the same encoder as the
        // final pass, with placeholder locations.
        let mut dirs: Vec<PlannedDir> = Vec::new();
        collect_dirs(&self.root, String::new(), 0, &mut dirs);
        let mut dir_sizes: Vec<u32> = Vec::new();
        for planned in &dirs {
            let children = child_specs_sized(tree_at(&self.root, &planned.path), planned.path.is_empty());
            let encoded = encode_dir_extent(
                (0, 0),
                (0, 0),
                &children,
                rr,
                planned.path.is_empty(),
                &now,
            );
            dir_sizes.push(encoded.len() as u32);
        }
        for (planned, len) in dirs.iter_mut().zip(&dir_sizes) {
            planned.lba = next_lba as u32;
            planned.len = *len;
            next_lba += sectors_for(*len as u64);
        }

        // Path tables, both byte orders.
        let table_l = encode_path_table(&dirs, false);
        let table_m = encode_path_table(&dirs, true);
        let table_l_lba = next_lba;
        next_lba += sectors_for(table_l.len() as u64);
        let table_m_lba = next_lba;
        next_lba += sectors_for(table_m.len() as u64);

        // File extents, preorder to match the directory pass.
        let mut files: BTreeMap<String, (u32, u32)> = BTreeMap::new();
        allocate_files(&self.root, String::new(), &mut next_lba, &mut files);

        // Boot payload extents last.
        let mut cataloged: Vec<CatalogedImage> = Vec::new();
        for (entry, payload) in config.boot_entries.iter().zip(&mut payloads) {
            let lba = next_lba as u32;
            next_lba += sectors_for(payload.len() as u64);
            if entry.boot_info_table {
                patch_boot_info_table(payload, PVD_LBA, lba);
            }
            let full_sectors = (payload.len() as u64).div_ceil(512).min(u16::MAX as u64) as u16;
            cataloged.push(CatalogedImage {
                platform: entry.platform,
                load_rba: lba,
                sector_count: entry.load_sectors.unwrap_or(full_sectors),
            });
        }

        if next_lba > self.capacity_blocks {
            return Err(ImageError::OutOfSpace {
                needed: next_lba,
                capacity: self.capacity_blocks,
            });
        }

        debug!(
            "finalizing {}: {} dirs, {} files, {} boot entries, {}/{} blocks",
            self.path.display(),
            dirs.len(),
            files.len(),
            cataloged.len(),
            next_lba,
            self.capacity_blocks
        );

        // Everything is placed; write it out.
        let pvd = encode_pvd(
            &config.volume_id,
            self.capacity_blocks as u32,
            table_l.len() as u32,
            table_l_lba as u32,
            table_m_lba as u32,
            dirs[0].lba,
            dirs[0].len,
            &now,
        );
        self.write_block(PVD_LBA as u64, &pvd)?;
        let mut vd_lba = PVD_LBA as u64 + 1;
        if bootable {
            self.write_block(vd_lba, &encode_boot_record(catalog_lba as u32))?;
            vd_lba += 1;
        }
        self.write_block(vd_lba, &encode_terminator())?;
        if bootable {
            self.write_block(catalog_lba, &build_catalog(&cataloged))?;
        }

        for (index, planned) in dirs.iter().enumerate() {
            let node = tree_at(&self.root, &planned.path);
            let children = child_specs(node, &planned.path, &dirs, &files);
            let parent = &dirs[planned.parent];
            let encoded = encode_dir_extent(
                (planned.lba, planned.len),
                (parent.lba, parent.len),
                &children,
                rr,
                index == 0,
                &now,
            );
            debug_assert_eq!(encoded.len() as u32, planned.len);
            self.write_block(planned.lba as u64, &encoded)?;
        }

        self.write_block(table_l_lba, &table_l)?;
        self.write_block(table_m_lba, &table_m)?;

        for (path, (lba, _)) in &files {
            let data = match tree_file_at(&self.root, path) {
                Some(data) => data,
                None => continue,
            };
            self.file
                .seek(SeekFrom::Start(*lba as u64 * LOGICAL_BLOCK_SIZE as u64))
                .map_err(|e| ImageError::from_io(&self.path, e))?;
            self.file
                .write_all(data)
                .map_err(|e| ImageError::from_io(&self.path, e))?;
        }

        for (image, payload) in cataloged.iter().zip(&payloads) {
            self.write_block(image.load_rba as u64, payload)?;
        }

        self.file
            .flush()
            .map_err(|e| ImageError::from_io(&self.path, e))?;
        Ok(())
    }
}

/// Preorder directory collection with parent indices.
fn collect_dirs(
    node: &BTreeMap<String, Node>,
    path: String,
    parent: usize,
    out: &mut Vec<PlannedDir>,
) {
    let index = out.len();
    out.push(PlannedDir {
        path: path.clone(),
        parent,
        lba: 0,
        len: 0,
    });
    for (name, child) in node {
        if let Node::Dir(children) = child {
            collect_dirs(children, join(&path, name), index, out);
        }
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}/{name}")
    }
}

fn tree_at<'a>(root: &'a BTreeMap<String, Node>, path: &str) -> &'a BTreeMap<String, Node> {
    let mut dir = root;
    for component in path.split('/').filter(|c| !c.is_empty()) {
        dir = match dir.get(component) {
            Some(Node::Dir(children)) => children,
            _ => unreachable!("planned directory disappeared: {path}"),
        };
    }
    dir
}

fn tree_file_at<'a>(root: &'a BTreeMap<String, Node>, path: &str) -> Option<&'a Vec<u8>> {
    let (parent, name) = path.rsplit_once('/').unwrap_or(("", path));
    let mut dir = root;
    for component in parent.split('/').filter(|c| !c.is_empty()) {
        dir = match dir.get(component) {
            Some(Node::Dir(children)) => children,
            _ => return None,
        };
    }
    match dir.get(name) {
        Some(Node::File(data)) => Some(data),
        _ => None,
    }
}

/// Children with placeholder locations, for the sizing pass.
fn child_specs_sized(node: &BTreeMap<String, Node>, _is_root: bool) -> Vec<ChildSpec> {
    node.iter()
        .map(|(name, child)| ChildSpec {
            name: name.clone(),
            is_dir: matches!(child, Node::Dir(_)),
            lba: 0,
            len: match child {
                Node::File(data) => data.len() as u32,
                Node::Dir(_) => 0,
            },
        })
        .collect()
}

/// Children with their final extents, for the write pass.
fn child_specs(
    node: &BTreeMap<String, Node>,
    path: &str,
    dirs: &[PlannedDir],
    files: &BTreeMap<String, (u32, u32)>,
) -> Vec<ChildSpec> {
    node.iter()
        .map(|(name, child)| {
            let joined = join(path, name);
            let (lba, len) = match child {
                Node::Dir(_) => {
                    let planned = dirs
                        .iter()
                        .find(|d| d.path == joined)
                        .expect("planned directory missing");
                    (planned.lba, planned.len)
                }
                Node::File(_) => files[&joined],
            };
            ChildSpec {
                name: name.clone(),
                is_dir: matches!(child, Node::Dir(_)),
                lba,
                len,
            }
        })
        .collect()
}

/// Assign file extents in preorder.
fn allocate_files(
    node: &BTreeMap<String, Node>,
    path: String,
    next_lba: &mut u64,
    out: &mut BTreeMap<String, (u32, u32)>,
) {
    for (name, child) in node {
        let joined = join(&path, name);
        match child {
            Node::File(data) => {
                out.insert(joined, (*next_lba as u32, data.len() as u32));
                *next_lba += sectors_for(data.len() as u64);
            }
            Node::Dir(children) => allocate_files(children, joined, next_lba, out),
        }
    }
}

/// Encode one directory's extent: self, parent, then each child, packed so
/// no record crosses a sector boundary, padded to whole sectors.
fn encode_dir_extent(
    this: (u32, u32),
    parent: (u32, u32),
    children: &[ChildSpec],
    rr: bool,
    is_root: bool,
    now: &[u8; 7],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(LOGICAL_BLOCK_SIZE);

    let mut self_susp = Vec::new();
    if rr && is_root {
        self_susp.extend_from_slice(&susp_sp());
    }
    if rr {
        self_susp.extend_from_slice(&susp_px(true));
    }
    push_packed(&mut out, &[0x00], true, this.0, this.1, now, &self_susp);

    let parent_susp = if rr { susp_px(true).to_vec() } else { Vec::new() };
    push_packed(&mut out, &[0x01], true, parent.0, parent.1, now, &parent_susp);

    // Case folding can collide sibling identifiers; tag the later ones so
    // non-Rock-Ridge readers still see distinct names. Children arrive in
    // tree order, so sizing and write passes tag identically.
    let mut seen: HashSet<Vec<u8>> = HashSet::with_capacity(children.len());
    for child in children {
        let mut id = iso_identifier(&child.name, child.is_dir);
        let mut tag = 1u32;
        while !seen.insert(id.clone()) {
            tag += 1;
            id = disambiguate_identifier(&iso_identifier(&child.name, child.is_dir), tag, child.is_dir);
        }
        let mut susp = Vec::new();
        if rr {
            // Leave the alternate name out rather than overflow the record.
            if record_len(id.len(), susp_nm(&child.name).len() + 36) <= 255 {
                susp.extend_from_slice(&susp_nm(&child.name));
            }
            susp.extend_from_slice(&susp_px(child.is_dir));
        }
        push_packed(&mut out, &id, child.is_dir, child.lba, child.len, now, &susp);
    }

    while out.len() % LOGICAL_BLOCK_SIZE != 0 {
        out.push(0);
    }
    out
}

/// Append a record, first padding to the next sector if it would straddle
/// the boundary.
fn push_packed(
    out: &mut Vec<u8>,
    id: &[u8],
    is_dir: bool,
    lba: u32,
    len: u32,
    now: &[u8; 7],
    susp: &[u8],
) {
    let record = record_len(id.len(), susp.len());
    let used = out.len() % LOGICAL_BLOCK_SIZE;
    if used + record > LOGICAL_BLOCK_SIZE {
        out.resize(out.len() + (LOGICAL_BLOCK_SIZE - used), 0);
    }
    encode_record(out, id, is_dir, lba, len, now, susp);
}

/// Path table covering every directory, breadth-first, in the requested
/// byte order.
fn encode_path_table(dirs: &[PlannedDir], big_endian: bool) -> Vec<u8> {
    // Breadth-first numbering: sort the preorder list by depth, stable, so
    // parents always precede children and numbering matches between passes.
    let mut order: Vec<usize> = (0..dirs.len()).collect();
    order.sort_by_key(|&i| depth(&dirs[i].path));
    let mut numbers = vec![0u16; dirs.len()];
    for (position, &index) in order.iter().enumerate() {
        numbers[index] = position as u16 + 1;
    }

    let mut out = Vec::new();
    for &index in &order {
        let planned = &dirs[index];
        let id: Vec<u8> = if planned.path.is_empty() {
            vec![0x00]
        } else {
            let name = planned.path.rsplit('/').next().unwrap_or(&planned.path);
            iso_identifier(name, true)
        };
        out.push(id.len() as u8);
        out.push(0);
        if big_endian {
            out.extend_from_slice(&planned.lba.to_be_bytes());
            out.extend_from_slice(&numbers[planned.parent].to_be_bytes());
        } else {
            out.extend_from_slice(&planned.lba.to_le_bytes());
            out.extend_from_slice(&numbers[planned.parent].to_le_bytes());
        }
        out.extend_from_slice(&id);
        if id.len() % 2 != 0 {
            out.push(0);
        }
    }
    out
}

fn depth(path: &str) -> usize {
    if path.is_empty() {
        0
    } else {
        path.matches('/').count() + 1
    }
}

/// Primary volume descriptor.
#[allow(clippy::too_many_arguments)]
fn encode_pvd(
    volume_id: &str,
    space_blocks: u32,
    path_table_len: u32,
    table_l_lba: u32,
    table_m_lba: u32,
    root_lba: u32,
    root_len: u32,
    now: &[u8; 7],
) -> Vec<u8> {
    let mut pvd = vec![0u8; LOGICAL_BLOCK_SIZE];
    pvd[0] = 0x01;
    pvd[1..6].copy_from_slice(b"CD001");
    pvd[6] = 0x01;
    fill_text(&mut pvd[8..40], "");
    fill_text(&mut pvd[40..72], volume_id);
    pvd[80..88].copy_from_slice(&u32_both(space_blocks));
    pvd[120..124].copy_from_slice(&u16_both(1)); // volume set size
    pvd[124..128].copy_from_slice(&u16_both(1)); // volume sequence number
    pvd[128..132].copy_from_slice(&u16_both(LOGICAL_BLOCK_SIZE as u16));
    pvd[132..140].copy_from_slice(&u32_both(path_table_len));
    pvd[140..144].copy_from_slice(&table_l_lba.to_le_bytes());
    pvd[148..152].copy_from_slice(&table_m_lba.to_be_bytes());

    let mut root_record = Vec::with_capacity(34);
    encode_record(&mut root_record, &[0x00], true, root_lba, root_len, now, &[]);
    pvd[156..156 + root_record.len()].copy_from_slice(&root_record);

    fill_text(&mut pvd[190..318], ""); // volume set identifier
    fill_text(&mut pvd[318..446], ""); // publisher
    fill_text(&mut pvd[446..574], "FDIMAGE"); // data preparer
    fill_text(&mut pvd[574..702], ""); // application
    fill_text(&mut pvd[702..739], ""); // copyright file
    fill_text(&mut pvd[739..776], ""); // abstract file
    fill_text(&mut pvd[776..813], ""); // bibliographic file
    for range in [813..830, 830..847, 847..864, 864..881] {
        unspecified_date(&mut pvd[range]);
    }
    pvd[881] = 0x01; // file structure version
    pvd
}

fn fill_text(field: &mut [u8], text: &str) {
    field.fill(b' ');
    for (slot, byte) in field.iter_mut().zip(text.bytes()) {
        *slot = byte.to_ascii_uppercase();
    }
}

fn unspecified_date(field: &mut [u8]) {
    field[..16].fill(b'0');
    field[16] = 0;
}

/// El Torito boot record volume descriptor.
fn encode_boot_record(catalog_lba: u32) -> Vec<u8> {
    let mut vd = vec![0u8; LOGICAL_BLOCK_SIZE];
    vd[0] = 0x00;
    vd[1..6].copy_from_slice(b"CD001");
    vd[6] = 0x01;
    let spec = b"EL TORITO SPECIFICATION";
    vd[7..7 + spec.len()].copy_from_slice(spec);
    vd[71..75].copy_from_slice(&catalog_lba.to_le_bytes());
    vd
}

/// Volume descriptor set terminator.
fn encode_terminator() -> Vec<u8> {
    let mut vd = vec![0u8; LOGICAL_BLOCK_SIZE];
    vd[0] = 0xFF;
    vd[1..6].copy_from_slice(b"CD001");
    vd[6] = 0x01;
    vd
}
