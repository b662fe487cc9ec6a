//! Pack file reading through version 2 `.idx` indexes.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;

use super::object::{ObjectId, ObjectType};
use super::GitError;

const IDX_MAGIC: &[u8; 4] = b"\xfftOc";
/// Chains deeper than this are treated as corrupt
const MAX_DELTA_DEPTH: usize = 64;

/// Pack file object types (as per Git pack format)
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackObjectType {
    Commit = 1,
    Tree = 2,
    Blob = 3,
    Tag = 4,
    OfsDelta = 6,
    RefDelta = 7,
}

impl TryFrom<u8> for PackObjectType {
    type Error = GitError;

    fn try_from(value: u8) -> Result<Self, GitError> {
        match value {
            1 => Ok(PackObjectType::Commit),
            2 => Ok(PackObjectType::Tree),
            3 => Ok(PackObjectType::Blob),
            4 => Ok(PackObjectType::Tag),
            6 => Ok(PackObjectType::OfsDelta),
            7 => Ok(PackObjectType::RefDelta),
            _ => Err(GitError::Invalid(format!(
                "Unknown pack object type: {}",
                value
            ))),
        }
    }
}

impl PackObjectType {
    fn base_type(self) -> Option<ObjectType> {
        match self {
            PackObjectType::Commit => Some(ObjectType::Commit),
            PackObjectType::Tree => Some(ObjectType::Tree),
            PackObjectType::Blob => Some(ObjectType::Blob),
            PackObjectType::Tag => Some(ObjectType::Tag),
            PackObjectType::OfsDelta | PackObjectType::RefDelta => None,
        }
    }
}

/// In-memory copy of a version 2 pack index
#[derive(Debug)]
pub struct PackIndex {
    ids: Vec<ObjectId>,
    offsets: Vec<u64>,
}

impl PackIndex {
    pub fn parse(data: &[u8]) -> Result<Self, GitError> {
        let invalid = |msg: &str| GitError::Invalid(format!("pack index: {}", msg));
        if data.len() < 8 + 256 * 4 || &data[0..4] != IDX_MAGIC {
            return Err(invalid("bad header"));
        }
        if be_u32(&data[4..8]) != 2 {
            return Err(invalid("unsupported version"));
        }

        let count = be_u32(&data[8 + 255 * 4..8 + 256 * 4]) as usize;
        let ids_start = 8 + 256 * 4;
        let crc_start = ids_start + count * 20;
        let off_start = crc_start + count * 4;
        let large_start = off_start + count * 4;
        if data.len() < large_start + 40 {
            return Err(invalid("truncated"));
        }

        let ids = data[ids_start..crc_start]
            .chunks_exact(20)
            .filter_map(ObjectId::from_slice)
            .collect::<Vec<_>>();

        let mut offsets = Vec::with_capacity(count);
        for raw in data[off_start..large_start].chunks_exact(4) {
            let small = be_u32(raw);
            if small & 0x8000_0000 == 0 {
                offsets.push(small as u64);
            } else {
                let pos = large_start + (small & 0x7fff_ffff) as usize * 8;
                let bytes = data.get(pos..pos + 8).ok_or_else(|| invalid("bad large offset"))?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(bytes);
                offsets.push(u64::from_be_bytes(buf));
            }
        }

        Ok(Self { ids, offsets })
    }

    pub fn find(&self, id: &ObjectId) -> Option<u64> {
        self.ids.binary_search(id).ok().map(|i| self.offsets[i])
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

fn be_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

/// A `.pack` file together with its index
#[derive(Debug)]
pub struct PackFile {
    path: PathBuf,
    index: PackIndex,
}

impl PackFile {
    /// Open `pack-<hash>.idx` and the matching `.pack`
    pub fn open(idx_path: &Path) -> Result<Self, GitError> {
        let index = PackIndex::parse(&std::fs::read(idx_path)?)?;
        let path = idx_path.with_extension("pack");
        if !path.is_file() {
            return Err(GitError::Invalid(format!(
                "missing pack for {}",
                idx_path.display()
            )));
        }
        Ok(Self { path, index })
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.index.find(id).is_some()
    }

    /// Read and fully resolve an object stored in this pack.
    ///
    /// `resolve_external` is used for REF deltas whose base lives elsewhere.
    pub fn read(
        &self,
        id: &ObjectId,
        resolve_external: &dyn Fn(&ObjectId) -> Result<(ObjectType, Vec<u8>), GitError>,
    ) -> Result<Option<(ObjectType, Vec<u8>)>, GitError> {
        let Some(offset) = self.index.find(id) else {
            return Ok(None);
        };
        let mut file = BufReader::new(File::open(&self.path)?);
        self.read_at(&mut file, offset, resolve_external, 0).map(Some)
    }

    fn read_at(
        &self,
        file: &mut BufReader<File>,
        offset: u64,
        resolve_external: &dyn Fn(&ObjectId) -> Result<(ObjectType, Vec<u8>), GitError>,
        depth: usize,
    ) -> Result<(ObjectType, Vec<u8>), GitError> {
        if depth > MAX_DELTA_DEPTH {
            return Err(GitError::Invalid("delta chain too deep".to_string()));
        }

        file.seek(SeekFrom::Start(offset))?;
        let (kind, size) = read_entry_header(file)?;

        match kind {
            PackObjectType::OfsDelta => {
                let distance = read_ofs_distance(file)?;
                let base_offset = offset
                    .checked_sub(distance)
                    .ok_or_else(|| GitError::Invalid("delta base before pack start".to_string()))?;
                let delta = inflate(file, size)?;
                let (base_type, base) = self.read_at(file, base_offset, resolve_external, depth + 1)?;
                Ok((base_type, apply_delta(&base, &delta)?))
            }
            PackObjectType::RefDelta => {
                let mut raw = [0u8; 20];
                file.read_exact(&mut raw)?;
                let base_id = ObjectId::from_raw(raw);
                let delta = inflate(file, size)?;
                let (base_type, base) = match self.index.find(&base_id) {
                    Some(base_offset) => {
                        self.read_at(file, base_offset, resolve_external, depth + 1)?
                    }
                    None => resolve_external(&base_id)?,
                };
                Ok((base_type, apply_delta(&base, &delta)?))
            }
            other => {
                let object_type = other
                    .base_type()
                    .ok_or_else(|| GitError::Invalid("unexpected delta".to_string()))?;
                Ok((object_type, inflate(file, size)?))
            }
        }
    }
}

/// Type and inflated size: 1-bit continuation, 3-bit type, 4-bit size, then 7-bit groups
fn read_entry_header(r: &mut impl Read) -> Result<(PackObjectType, usize), GitError> {
    let mut byte = read_byte(r)?;
    let kind = PackObjectType::try_from((byte >> 4) & 0x07)?;
    let mut size = (byte & 0x0f) as usize;
    let mut shift = 4;
    while byte & 0x80 != 0 {
        byte = read_byte(r)?;
        size |= ((byte & 0x7f) as usize) << shift;
        shift += 7;
    }
    Ok((kind, size))
}

fn read_ofs_distance(r: &mut impl Read) -> Result<u64, GitError> {
    let mut byte = read_byte(r)?;
    let mut distance = (byte & 0x7f) as u64;
    while byte & 0x80 != 0 {
        byte = read_byte(r)?;
        distance = ((distance + 1) << 7) | (byte & 0x7f) as u64;
    }
    Ok(distance)
}

fn read_byte(r: &mut impl Read) -> Result<u8, GitError> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}

fn inflate(r: &mut impl Read, size: usize) -> Result<Vec<u8>, GitError> {
    let mut out = Vec::with_capacity(size);
    ZlibDecoder::new(r).read_to_end(&mut out)?;
    if out.len() != size {
        return Err(GitError::Invalid(format!(
            "inflated {} bytes, expected {}",
            out.len(),
            size
        )));
    }
    Ok(out)
}

fn read_varint(data: &[u8], pos: &mut usize) -> Result<usize, GitError> {
    let mut value = 0usize;
    let mut shift = 0;
    loop {
        let byte = *data
            .get(*pos)
            .ok_or_else(|| GitError::Invalid("truncated delta".to_string()))?;
        *pos += 1;
        value |= ((byte & 0x7f) as usize) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
}

/// Apply a git delta (copy/insert instruction stream) to `base`
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>, GitError> {
    let corrupt = || GitError::Invalid("corrupt delta".to_string());
    let mut pos = 0;
    let src_size = read_varint(delta, &mut pos)?;
    if src_size != base.len() {
        return Err(corrupt());
    }
    let dst_size = read_varint(delta, &mut pos)?;
    let mut out = Vec::with_capacity(dst_size);

    while pos < delta.len() {
        let cmd = delta[pos];
        pos += 1;
        if cmd & 0x80 != 0 {
            let mut offset = 0usize;
            let mut size = 0usize;
            for i in 0..4 {
                if cmd & (1 << i) != 0 {
                    offset |= (*delta.get(pos).ok_or_else(corrupt)? as usize) << (8 * i);
                    pos += 1;
                }
            }
            for i in 0..3 {
                if cmd & (0x10 << i) != 0 {
                    size |= (*delta.get(pos).ok_or_else(corrupt)? as usize) << (8 * i);
                    pos += 1;
                }
            }
            if size == 0 {
                size = 0x10000;
            }
            let chunk = base.get(offset..offset + size).ok_or_else(corrupt)?;
            out.extend_from_slice(chunk);
        } else if cmd != 0 {
            let n = cmd as usize;
            let chunk = delta.get(pos..pos + n).ok_or_else(corrupt)?;
            out.extend_from_slice(chunk);
            pos += n;
        } else {
            return Err(corrupt());
        }
    }

    if out.len() != dst_size {
        return Err(corrupt());
    }
    Ok(out)
}
