use bytemuck::{Pod, Zeroable};
use memmap2::{Mmap, MmapMut};
use serde::{Serialize, de::DeserializeOwned};
use std::{
    fs::{File, OpenOptions},
    path::Path,
};

const MAGIC: [u8; 4] = *b"RDB0";
const VERSION: u16 = 1;
const NAME_LEN: usize = 64;
use std::any::type_name;

use crate::error::RdbErr;

/// Simple, portable FNV-1a 64-bit hash of a string.
#[inline]
fn fnv1a64(s: &str) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325; // offset basis
    for &b in s.as_bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3); // FNV prime
    }
    h
}

/// A cross-device, cross-process “type hash”.
/// Stable as long as the type’s *name/path* doesn’t change.
fn portable_type_hash<T>() -> u32 {
    fnv1a64(type_name::<T>()) as u32
}

fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, RdbErr> {
    Ok(bincode::serialize(value)?)
}

fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, RdbErr> {
    Ok(bincode::deserialize(bytes)?)
}

//////////////////////////////////////////////////////////////////////////////
//////////////////////////////////////////////////////////////////////////////

#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod)]
struct Header {
    magic: [u8; 4],   // "RDB0"
    version: u16,     // 1
    reserved: u16,    // alignment / future flags
    entry_count: u32, // number of entries
}

#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod)]
pub struct Entry {
    pub type_tag: u32,         // portable_type_hash of the stored type
    pub reserved: u32,         // keeps `offset` 8-byte aligned without padding
    pub offset: u64,           // offset of the blob inside the data section
    pub len: u64,              // blob length
    pub name: [u8; NAME_LEN], // UTF-8, nul padded
}

impl Entry {
    fn name(&self) -> &str {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        std::str::from_utf8(&self.name[..end]).unwrap_or("")
    }

    fn matches(&self, name: &str) -> bool {
        self.name() == name
    }
}

/// Listing information for one entry of an RDB file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    pub name: String,
    pub offset: u64,
    pub len: u64,
    pub type_tag: u32,
}

impl From<&Entry> for EntryMeta {
    fn from(entry: &Entry) -> Self {
        Self {
            name: entry.name().to_string(),
            offset: entry.offset,
            len: entry.len,
            type_tag: entry.type_tag,
        }
    }
}

fn name64(s: &str) -> Result<[u8; NAME_LEN], RdbErr> {
    let bytes = s.as_bytes();
    if bytes.len() > NAME_LEN || bytes.contains(&0) {
        return Err(RdbErr::NameTooLong(s.to_string()));
    }

    let mut out = [0u8; NAME_LEN];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}

fn read_entries(map: &[u8]) -> Result<(Vec<Entry>, usize), RdbErr> {
    let header_sz = std::mem::size_of::<Header>();
    if map.len() < header_sz {
        return Err(RdbErr::TooSmall);
    }
    let hdr: Header = bytemuck::pod_read_unaligned(&map[..header_sz]);
    if hdr.magic != MAGIC || hdr.version != VERSION {
        return Err(RdbErr::BadHeader);
    }

    let entries_sz = (hdr.entry_count as usize) * std::mem::size_of::<Entry>();
    let need = header_sz + entries_sz;
    if map.len() < need {
        return Err(RdbErr::TooSmall);
    }

    // Allocate aligned Vec<Entry> and memcpy the bytes into it
    let mut entries = vec![Entry::zeroed(); hdr.entry_count as usize];
    let dst_bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut entries);
    dst_bytes.copy_from_slice(&map[header_sz..need]);

    let data_len = (map.len() - need) as u64;
    if entries
        .iter()
        .any(|e| e.offset.checked_add(e.len).is_none_or(|end| end > data_len))
    {
        return Err(RdbErr::TooSmall);
    }

    Ok((entries, need))
}

fn fetch_from<T: DeserializeOwned>(
    entries: &[Entry],
    data: &[u8],
    name: &str,
) -> Result<T, RdbErr> {
    let entry = entries
        .iter()
        .find(|e| e.matches(name))
        .ok_or_else(|| RdbErr::NotFound(name.to_string()))?;

    if entry.type_tag != portable_type_hash::<T>() {
        return Err(RdbErr::TypeMismatch(name.to_string()));
    }

    let data_start = entry.offset as usize;
    let data_end = data_start + entry.len as usize;
    from_bytes::<T>(&data[data_start..data_end])
}

/// Writable, in-memory RDB file.
pub struct RDBFile {
    entries: Vec<Entry>,
    data: Vec<u8>,
}

impl Default for RDBFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RDBFile {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Appends `obj` under `name`. An existing entry with the same name is
    /// replaced; its old bytes are left unreferenced in the data section.
    pub fn add<T: Serialize>(&mut self, name: &str, obj: &T) -> Result<(), RdbErr> {
        let nameb = name64(name)?;
        let bytes = to_bytes(obj)?;

        self.entries.retain(|e| !e.matches(name));
        self.entries.push(Entry {
            type_tag: portable_type_hash::<T>(),
            reserved: 0,
            offset: self.data.len() as u64,
            len: bytes.len() as u64,
            name: nameb,
        });

        self.data.extend_from_slice(&bytes);

        Ok(())
    }

    pub fn fetch<T: DeserializeOwned>(&self, name: &str) -> Result<T, RdbErr> {
        fetch_from(&self.entries, &self.data, name)
    }

    pub fn entries(&self) -> Vec<EntryMeta> {
        self.entries.iter().map(EntryMeta::from).collect()
    }

    /// Save using MmapMut for zero-copy struct writes.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RdbErr> {
        let hdr = Header {
            magic: MAGIC,
            version: VERSION,
            reserved: 0,
            entry_count: self.entries.len() as u32,
        };

        let hdr_bytes = bytemuck::bytes_of(&hdr);
        let ent_bytes = bytemuck::cast_slice::<Entry, u8>(&self.entries);

        let entries_start = hdr_bytes.len();
        let data_start = entries_start + ent_bytes.len();
        let total = data_start + self.data.len();

        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        f.set_len(total as u64)?; // extend file to final size

        // SAFETY: the file was just created/truncated by us and is not shared.
        let mut map = unsafe { MmapMut::map_mut(&f)? };

        map[..entries_start].copy_from_slice(hdr_bytes);
        map[entries_start..data_start].copy_from_slice(ent_bytes);
        map[data_start..total].copy_from_slice(&self.data);

        map.flush()?;

        Ok(())
    }

    /// Load by mmap and copy everything into an editable file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RdbErr> {
        let view = RDBView::load(path)?;
        Ok(Self {
            entries: view.entries,
            data: view.mmap[view.data_start..].to_vec(),
        })
    }
}

/// Read-only, memory-mapped view over an RDB file.
pub struct RDBView {
    entries: Vec<Entry>,
    mmap: Mmap,
    data_start: usize,
}

impl RDBView {
    pub fn fetch<T: DeserializeOwned>(&self, name: &str) -> Result<T, RdbErr> {
        fetch_from(&self.entries, &self.mmap[self.data_start..], name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.matches(name))
    }

    pub fn entries(&self) -> Vec<EntryMeta> {
        self.entries.iter().map(EntryMeta::from).collect()
    }

    /// Load by mmap, then copy the entry table out of the mapped bytes.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RdbErr> {
        let f = File::open(path)?;
        // SAFETY: the view is read-only; writers replace files via `save`.
        let map = unsafe { Mmap::map(&f)? };
        let (entries, data_start) = read_entries(&map)?;

        Ok(Self {
            entries,
            mmap: map,
            data_start,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct TempObject {
        data: Vec<u32>,
        name: Vec<String>,
    }

    #[derive(Serialize, Deserialize)]
    struct TempObject2 {
        data: Vec<String>,
        name: Vec<u32>,
    }

    fn sample(value: u32, label: &str, n: usize) -> TempObject {
        TempObject {
            data: vec![value; n],
            name: vec![label.to_string(); n],
        }
    }

    #[test]
    fn same_everywhere_for_same_type() {
        let a = portable_type_hash::<Result<i32, ()>>();
        let b = portable_type_hash::<Result<i32, ()>>();
        assert_eq!(a, b);
    }

    #[test]
    fn entry_table_has_no_padding() {
        assert_eq!(std::mem::size_of::<Header>(), 12);
        assert_eq!(std::mem::size_of::<Entry>(), 88);
    }

    #[test]
    fn test_rdb_read_write() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("read_write_multi.rdb");

        let mut rdb = RDBFile::new();
        rdb.add("obj/t.a.c.b", &sample(12, "walk", 32))
            .expect("Should be able to insert into an empty RDB");
        rdb.add("obj/t.a.c.c", &sample(34, "jump", 16))
            .expect("Should be able to insert a second entry into the RDB");

        let first = rdb
            .fetch::<TempObject>("obj/t.a.c.b")
            .expect("Should be able to read object just inserted.");
        assert_eq!(first, sample(12, "walk", 32));

        rdb.save(&path).expect("should be able to write multi entry file");

        let view = RDBView::load(&path).expect("Should be able to load multi entry file");
        let second = view
            .fetch::<TempObject>("obj/t.a.c.c")
            .expect("Should be able to read the second object via view");
        assert_eq!(second, sample(34, "jump", 16));

        let names: Vec<String> = view.entries().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["obj/t.a.c.b", "obj/t.a.c.c"]);
    }

    #[test]
    fn reload_and_replace_entry() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("replace.rdb");

        let mut rdb = RDBFile::new();
        rdb.add("walk", &sample(1, "old", 4)).expect("add");
        rdb.save(&path).expect("save");

        let mut reopened = RDBFile::load(&path).expect("load");
        reopened.add("walk", &sample(2, "new", 2)).expect("replace");
        assert_eq!(reopened.entries().len(), 1);
        reopened.save(&path).expect("save again");

        let view = RDBView::load(&path).expect("view");
        assert_eq!(
            view.fetch::<TempObject>("walk").expect("fetch"),
            sample(2, "new", 2)
        );
    }

    #[test]
    fn test_rdb_failures() {
        let mut rdb = RDBFile::new();

        assert!(matches!(
            rdb.fetch::<TempObject>("obj/t.a.c.b"),
            Err(RdbErr::NotFound(_))
        ));

        rdb.add("obj/t.a.c.b", &sample(12, "walk", 32))
            .expect("Should be able to insert into an empty RDB");

        // Prefixes and longer names must not match.
        assert!(rdb.fetch::<TempObject>("obj/t.a.c").is_err());
        assert!(rdb.fetch::<TempObject>("obj/t.a.c.bb").is_err());
        assert!(matches!(
            rdb.fetch::<TempObject2>("obj/t.a.c.b"),
            Err(RdbErr::TypeMismatch(_))
        ));

        let long = "x".repeat(65);
        assert!(matches!(
            rdb.add(&long, &sample(1, "a", 1)),
            Err(RdbErr::NameTooLong(_))
        ));
    }

    #[test]
    fn rejects_garbage_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let short = dir.path().join("short.rdb");
        std::fs::write(&short, b"RDB").expect("write");
        assert!(matches!(RDBView::load(&short), Err(RdbErr::TooSmall)));

        let bad = dir.path().join("bad.rdb");
        std::fs::write(&bad, [0u8; 32]).expect("write");
        assert!(matches!(RDBView::load(&bad), Err(RdbErr::BadHeader)));
    }
}
