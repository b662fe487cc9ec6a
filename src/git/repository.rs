//! Read-only access to a bare repository on disk.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use flate2::read::ZlibDecoder;

use super::object::{parse_tag_target, parse_tree, Commit, ObjectId, ObjectType, TreeEntry};
use super::pack::PackFile;
use super::GitError;

/// Which namespace a ref name in a URL belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefKind {
    Branch,
    Tag,
    Commit,
}

impl RefKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "branch" => Some(RefKind::Branch),
            "tag" => Some(RefKind::Tag),
            "commit" => Some(RefKind::Commit),
            _ => None,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            RefKind::Branch => "refs/heads/",
            RefKind::Tag => "refs/tags/",
            RefKind::Commit => "",
        }
    }
}

/// A blob together with the name it was reached by
#[derive(Clone, Debug)]
pub struct Blob {
    pub id: ObjectId,
    pub name: String,
    data: Bytes,
}

impl Blob {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Reader over the blob content; dropping it releases the content
    pub fn data_async(&self) -> std::io::Cursor<Bytes> {
        std::io::Cursor::new(self.data.clone())
    }
}

/// A bare git repository: loose objects, packs and refs
#[derive(Debug)]
pub struct Repository {
    path: PathBuf,
    packs: Vec<PackFile>,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self, GitError> {
        if !path.join("objects").is_dir() {
            return Err(GitError::NotExist(format!(
                "repository {}",
                path.display()
            )));
        }

        let mut packs = Vec::new();
        let pack_dir = path.join("objects").join("pack");
        if let Ok(dir) = fs::read_dir(&pack_dir) {
            for entry in dir.flatten() {
                let idx = entry.path();
                if idx.extension().and_then(|e| e.to_str()) == Some("idx") {
                    match PackFile::open(&idx) {
                        Ok(pack) => packs.push(pack),
                        Err(e) => tracing::warn!("skipping pack {}: {}", idx.display(), e),
                    }
                }
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            packs,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a raw object from loose storage or any pack
    pub fn read_object(&self, id: &ObjectId) -> Result<(ObjectType, Vec<u8>), GitError> {
        if let Some(object) = self.read_loose(id)? {
            return Ok(object);
        }
        let external = |base: &ObjectId| self.read_object(base);
        for pack in self.packs.iter().filter(|p| p.contains(id)) {
            if let Some(object) = pack.read(id, &external)? {
                return Ok(object);
            }
        }
        Err(GitError::NotExist(format!("object {}", id)))
    }

    pub fn has_object(&self, id: &ObjectId) -> bool {
        self.loose_path(id).is_file() || self.packs.iter().any(|p| p.contains(id))
    }

    fn loose_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.path.join("objects").join(&hex[..2]).join(&hex[2..])
    }

    fn read_loose(&self, id: &ObjectId) -> Result<Option<(ObjectType, Vec<u8>)>, GitError> {
        let compressed = match fs::read(self.loose_path(id)) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut raw = Vec::new();
        ZlibDecoder::new(&compressed[..]).read_to_end(&mut raw)?;

        let invalid = || GitError::Invalid(format!("loose object {}", id));
        let nul = raw.iter().position(|&b| b == 0).ok_or_else(invalid)?;
        let header = std::str::from_utf8(&raw[..nul]).map_err(|_| invalid())?;
        let (kind, size) = header.split_once(' ').ok_or_else(invalid)?;
        let kind = ObjectType::parse(kind).ok_or_else(invalid)?;
        let size: usize = size.parse().map_err(|_| invalid())?;

        let body = raw.split_off(nul + 1);
        if body.len() != size {
            return Err(invalid());
        }
        Ok(Some((kind, body)))
    }

    /// Resolve a fully qualified ref (`refs/heads/main`), following symbolic refs
    pub fn find_ref(&self, name: &str) -> Result<Option<ObjectId>, GitError> {
        let mut name = name.to_string();
        for _ in 0..5 {
            let loose = self.path.join(&name);
            // a prefix of the name can be a loose ref file, as `main` is for `main/README.md`
            if loose.is_file() {
                let content = fs::read_to_string(&loose)?;
                let content = content.trim();
                if let Some(target) = content.strip_prefix("ref: ") {
                    name = target.to_string();
                    continue;
                }
                return Ok(ObjectId::from_hex(content));
            }
            return self.find_packed_ref(&name);
        }
        Ok(None)
    }

    fn find_packed_ref(&self, name: &str) -> Result<Option<ObjectId>, GitError> {
        let packed = match fs::read_to_string(self.path.join("packed-refs")) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(packed
            .lines()
            .filter(|line| !line.starts_with('#') && !line.starts_with('^'))
            .filter_map(|line| line.split_once(' '))
            .find(|(_, ref_name)| *ref_name == name)
            .and_then(|(hex, _)| ObjectId::from_hex(hex)))
    }

    /// Resolve a branch, tag or commit id to the commit it names
    pub fn resolve_ref(&self, kind: RefKind, name: &str) -> Result<ObjectId, GitError> {
        let not_found = || GitError::NotExist(format!("{:?} {}", kind, name));
        if name.split('/').any(|p| p.is_empty() || p == "." || p == "..") {
            return Err(not_found());
        }

        let id = match kind {
            RefKind::Commit => ObjectId::from_hex(name).ok_or_else(not_found)?,
            _ => self
                .find_ref(&format!("{}{}", kind.prefix(), name))?
                .ok_or_else(not_found)?,
        };
        self.peel_to_commit(id)
    }

    fn peel_to_commit(&self, mut id: ObjectId) -> Result<ObjectId, GitError> {
        for _ in 0..10 {
            let (kind, data) = self.read_object(&id)?;
            match kind {
                ObjectType::Commit => return Ok(id),
                ObjectType::Tag => {
                    id = parse_tag_target(&data)
                        .ok_or_else(|| GitError::Invalid(format!("tag {}", id)))?;
                }
                _ => return Err(GitError::NotExist(format!("commit {}", id))),
            }
        }
        Err(GitError::Invalid(format!("tag chain at {}", id)))
    }

    /// Split `<ref>/<path>` where the ref name may itself contain `/`.
    ///
    /// The longest prefix naming an existing ref wins. Commit ids are always
    /// the first segment.
    pub fn resolve_ref_path(&self, kind: RefKind, rest: &str) -> Result<(ObjectId, String), GitError> {
        let rest = rest.trim_matches('/');
        let parts: Vec<&str> = rest.split('/').collect();

        if kind == RefKind::Commit {
            let id = self.resolve_ref(kind, parts[0])?;
            return Ok((id, parts[1..].join("/")));
        }

        for split in (1..=parts.len()).rev() {
            let name = parts[..split].join("/");
            match self.resolve_ref(kind, &name) {
                Ok(id) => return Ok((id, parts[split..].join("/"))),
                Err(e) if e.is_not_exist() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(GitError::NotExist(format!("{:?} in {}", kind, rest)))
    }

    pub fn get_commit(&self, id: &ObjectId) -> Result<Commit, GitError> {
        match self.read_object(id)? {
            (ObjectType::Commit, data) => Commit::parse(*id, &data),
            _ => Err(GitError::NotExist(format!("commit {}", id))),
        }
    }

    pub fn get_tree(&self, id: &ObjectId) -> Result<Vec<TreeEntry>, GitError> {
        match self.read_object(id)? {
            (ObjectType::Tree, data) => parse_tree(*id, &data),
            _ => Err(GitError::NotExist(format!("tree {}", id))),
        }
    }

    /// Look up `path` in the commit's tree. An empty path yields the root tree.
    pub fn get_tree_entry_by_path(&self, commit: &Commit, path: &str) -> Result<TreeEntry, GitError> {
        let path = path.trim_matches('/');
        let mut entry = TreeEntry {
            name: String::new(),
            mode: super::object::EntryMode::Tree,
            id: commit.tree,
        };
        if path.is_empty() {
            return Ok(entry);
        }

        for component in path.split('/') {
            if !entry.is_dir() {
                return Err(GitError::NotExist(format!("path {}", path)));
            }
            entry = self
                .get_tree(&entry.id)?
                .into_iter()
                .find(|e| e.name == component)
                .ok_or_else(|| GitError::NotExist(format!("path {}", path)))?;
        }
        Ok(entry)
    }

    /// Load a blob by id. Anything that is not a blob does not exist.
    pub fn get_blob(&self, id: &ObjectId) -> Result<Blob, GitError> {
        match self.read_object(id)? {
            (ObjectType::Blob, data) => Ok(Blob {
                id: *id,
                name: id.to_hex(),
                data: Bytes::from(data),
            }),
            _ => Err(GitError::NotExist(format!("blob {}", id))),
        }
    }

    /// Blob of a tree entry, carrying the entry name
    pub fn entry_blob(&self, entry: &TreeEntry) -> Result<Blob, GitError> {
        let mut blob = self.get_blob(&entry.id)?;
        blob.name = entry.name.clone();
        Ok(blob)
    }

    /// Number of commits reachable from `id`, including itself
    pub fn commits_count(&self, id: &ObjectId) -> Result<u64, GitError> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([*id]);
        while let Some(next) = queue.pop_front() {
            if !seen.insert(next) {
                continue;
            }
            queue.extend(self.get_commit(&next)?.parents);
        }
        Ok(seen.len() as u64)
    }

    fn entry_id_at(&self, commit: &Commit, path: &str) -> Result<Option<ObjectId>, GitError> {
        match self.get_tree_entry_by_path(commit, path) {
            Ok(entry) => Ok(Some(entry.id)),
            Err(e) if e.is_not_exist() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Most recent commit that changed `path`, walking from `start`.
    ///
    /// Follows a parent whose entry is identical; when no parent shares the
    /// entry, the current commit introduced it.
    pub fn last_commit_for_path(&self, start: &ObjectId, path: &str) -> Result<Commit, GitError> {
        let mut current = self.get_commit(start)?;
        let target = self.entry_id_at(&current, path)?;

        'walk: loop {
            for parent_id in current.parents.clone() {
                let parent = self.get_commit(&parent_id)?;
                if self.entry_id_at(&parent, path)? == target {
                    current = parent;
                    continue 'walk;
                }
            }
            return Ok(current);
        }
    }
}
