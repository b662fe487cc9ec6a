//! Git object identifiers and parsed object kinds.

use sha1::{Digest, Sha1};

use super::GitError;

/// A 20-byte object ID (SHA-1 hash) - Git standard format
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    /// Hash a full object (`"<type> <len>\0<content>"`) the way git does
    pub fn hash_object(object_type: ObjectType, data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(format!("{} {}\0", object_type.as_str(), data.len()));
        hasher.update(data);
        let mut id = [0u8; 20];
        id.copy_from_slice(&hasher.finalize());
        Self(id)
    }

    /// Create an ObjectId from raw 20 bytes (no hashing)
    pub fn from_raw(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 20] = bytes.try_into().ok()?;
        Some(Self(raw))
    }

    /// Parse a full 40-character hex id
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 40 {
            return None;
        }
        let mut id = [0u8; 20];
        hex::decode_to_slice(s, &mut id).ok()?;
        Some(Self(id))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl std::fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectId({})", &self.to_hex()[..8])
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Git object types
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Blob => "blob",
            ObjectType::Tree => "tree",
            ObjectType::Commit => "commit",
            ObjectType::Tag => "tag",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "blob" => Some(ObjectType::Blob),
            "tree" => Some(ObjectType::Tree),
            "commit" => Some(ObjectType::Commit),
            "tag" => Some(ObjectType::Tag),
            _ => None,
        }
    }
}

/// A parsed commit. Only the fields the web layer reads are kept.
#[derive(Clone, Debug)]
pub struct Commit {
    pub id: ObjectId,
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    /// Committer timestamp in seconds since the epoch
    pub committer_time: i64,
    pub message: String,
}

impl Commit {
    pub fn parse(id: ObjectId, data: &[u8]) -> Result<Self, GitError> {
        let text = String::from_utf8_lossy(data);
        let (headers, message) = text.split_once("\n\n").unwrap_or((&text, ""));

        let mut tree = None;
        let mut parents = Vec::new();
        let mut committer_time = 0;
        for line in headers.lines() {
            if let Some(rest) = line.strip_prefix("tree ") {
                tree = ObjectId::from_hex(rest.trim());
            } else if let Some(rest) = line.strip_prefix("parent ") {
                let parent = ObjectId::from_hex(rest.trim())
                    .ok_or_else(|| GitError::Invalid(format!("bad parent in commit {}", id)))?;
                parents.push(parent);
            } else if let Some(rest) = line.strip_prefix("committer ") {
                committer_time = parse_signature_time(rest).unwrap_or(0);
            }
        }

        let tree = tree.ok_or_else(|| GitError::Invalid(format!("commit {} has no tree", id)))?;
        Ok(Self {
            id,
            tree,
            parents,
            committer_time,
            message: message.to_string(),
        })
    }
}

/// `Name <email> 1700000000 +0100` -> 1700000000
fn parse_signature_time(sig: &str) -> Option<i64> {
    let after_email = &sig[sig.rfind('>')? + 1..];
    after_email.split_whitespace().next()?.parse().ok()
}

/// Target of an annotated tag
pub fn parse_tag_target(data: &[u8]) -> Option<ObjectId> {
    let text = std::str::from_utf8(data).ok()?;
    text.lines()
        .find_map(|line| line.strip_prefix("object "))
        .and_then(|hex| ObjectId::from_hex(hex.trim()))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryMode {
    Blob,
    Executable,
    Symlink,
    Tree,
    Commit,
}

impl EntryMode {
    fn from_octal(mode: u32) -> Option<Self> {
        match mode {
            0o100755 => Some(EntryMode::Executable),
            0o100644 | 0o100664 => Some(EntryMode::Blob),
            0o120000 => Some(EntryMode::Symlink),
            0o040000 => Some(EntryMode::Tree),
            0o160000 => Some(EntryMode::Commit),
            _ => None,
        }
    }
}

/// An entry in a tree object
#[derive(Clone, Debug)]
pub struct TreeEntry {
    pub name: String,
    pub mode: EntryMode,
    pub id: ObjectId,
}

impl TreeEntry {
    pub fn is_dir(&self) -> bool {
        self.mode == EntryMode::Tree
    }

    pub fn is_submodule(&self) -> bool {
        self.mode == EntryMode::Commit
    }
}

/// Parse a raw tree object: repeated `<octal mode> <name>\0<20 byte id>`
pub fn parse_tree(id: ObjectId, data: &[u8]) -> Result<Vec<TreeEntry>, GitError> {
    let invalid = || GitError::Invalid(format!("malformed tree {}", id));
    let mut entries = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        let space = rest.iter().position(|&b| b == b' ').ok_or_else(invalid)?;
        let mode = std::str::from_utf8(&rest[..space])
            .ok()
            .and_then(|m| u32::from_str_radix(m, 8).ok())
            .and_then(EntryMode::from_octal)
            .ok_or_else(invalid)?;
        rest = &rest[space + 1..];

        let nul = rest.iter().position(|&b| b == 0).ok_or_else(invalid)?;
        let name = String::from_utf8_lossy(&rest[..nul]).into_owned();
        rest = &rest[nul + 1..];

        if rest.len() < 20 {
            return Err(invalid());
        }
        let entry_id = ObjectId::from_slice(&rest[..20]).ok_or_else(invalid)?;
        rest = &rest[20..];

        entries.push(TreeEntry {
            name,
            mode,
            id: entry_id,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id() {
        // `git hash-object` of "hello world\n"
        let id = ObjectId::hash_object(ObjectType::Blob, b"hello world\n");
        assert_eq!(id.to_hex(), "3b18e512dba79e4c8300dd08aeb37f8e728b8dad");

        let parsed = ObjectId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, parsed);
        assert!(ObjectId::from_hex("3b18e5").is_none());
        assert!(ObjectId::from_hex(&"zz".repeat(20)).is_none());
    }

    #[test]
    fn test_parse_commit() {
        let tree = ObjectId::hash_object(ObjectType::Tree, b"");
        let parent = ObjectId::hash_object(ObjectType::Blob, b"p");
        let raw = format!(
            "tree {}\nparent {}\nauthor A <a@x> 1600000000 +0000\ncommitter C <c@x> 1700000000 +0200\n\nsubject\n",
            tree, parent
        );
        let id = ObjectId::hash_object(ObjectType::Commit, raw.as_bytes());
        let commit = Commit::parse(id, raw.as_bytes()).unwrap();
        assert_eq!(commit.tree, tree);
        assert_eq!(commit.parents, vec![parent]);
        assert_eq!(commit.committer_time, 1_700_000_000);
        assert_eq!(commit.message, "subject\n");
    }

    #[test]
    fn test_parse_tree() {
        let blob = ObjectId::hash_object(ObjectType::Blob, b"x");
        let mut raw = Vec::new();
        raw.extend_from_slice(b"100644 a.txt\0");
        raw.extend_from_slice(blob.as_bytes());
        raw.extend_from_slice(b"40000 dir\0");
        raw.extend_from_slice(blob.as_bytes());
        raw.extend_from_slice(b"160000 sub\0");
        raw.extend_from_slice(blob.as_bytes());

        let entries = parse_tree(blob, &raw).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].name, "a.txt");
        assert_eq!(entries[0].mode, EntryMode::Blob);
        assert!(entries[1].is_dir());
        assert!(entries[2].is_submodule());

        assert!(parse_tree(blob, b"100644 trunc\0abc").is_err());
    }
}
