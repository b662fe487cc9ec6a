//! Writes real loose objects and refs so tests can read them back.

use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::object::{ObjectId, ObjectType};

pub struct TestRepo {
    path: PathBuf,
}

impl TestRepo {
    pub fn init(path: &Path) -> Self {
        for dir in ["objects/pack", "refs/heads", "refs/tags"] {
            std::fs::create_dir_all(path.join(dir)).unwrap();
        }
        std::fs::write(path.join("HEAD"), "ref: refs/heads/main\n").unwrap();
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn write_object(&self, object_type: ObjectType, data: &[u8]) -> ObjectId {
        let id = ObjectId::hash_object(object_type, data);
        let hex = id.to_hex();
        let dir = self.path.join("objects").join(&hex[..2]);
        std::fs::create_dir_all(&dir).unwrap();

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(format!("{} {}\0", object_type.as_str(), data.len()).as_bytes())
            .unwrap();
        encoder.write_all(data).unwrap();
        std::fs::write(dir.join(&hex[2..]), encoder.finish().unwrap()).unwrap();
        id
    }

    pub fn blob(&self, data: &[u8]) -> ObjectId {
        self.write_object(ObjectType::Blob, data)
    }

    /// Entries are `(name, id, octal mode)`, e.g. `("docs", tree, "40000")`
    pub fn tree(&self, entries: &[(&str, ObjectId, &str)]) -> ObjectId {
        let mut sorted = entries.to_vec();
        sorted.sort_by_key(|(name, _, _)| name.to_string());
        let mut raw = Vec::new();
        for (name, id, mode) in sorted {
            raw.extend_from_slice(format!("{} {}\0", mode, name).as_bytes());
            raw.extend_from_slice(id.as_bytes());
        }
        self.write_object(ObjectType::Tree, &raw)
    }

    pub fn commit(&self, tree: ObjectId, parents: &[ObjectId], time: i64) -> ObjectId {
        let mut raw = format!("tree {}\n", tree);
        for parent in parents {
            raw.push_str(&format!("parent {}\n", parent));
        }
        raw.push_str(&format!(
            "author Tester <tester@example.com> {time} +0000\ncommitter Tester <tester@example.com> {time} +0000\n\ncommit at {time}\n"
        ));
        self.write_object(ObjectType::Commit, raw.as_bytes())
    }

    pub fn annotated_tag(&self, name: &str, target: ObjectId) -> ObjectId {
        let raw = format!(
            "object {}\ntype commit\ntag {}\ntagger Tester <tester@example.com> 0 +0000\n\nrelease\n",
            target, name
        );
        self.write_object(ObjectType::Tag, raw.as_bytes())
    }

    pub fn set_ref(&self, name: &str, id: ObjectId) {
        let path = self.path.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, format!("{}\n", id)).unwrap();
    }

    pub fn set_packed_ref(&self, name: &str, id: ObjectId) {
        let path = self.path.join("packed-refs");
        let mut content = std::fs::read_to_string(&path)
            .unwrap_or_else(|_| "# pack-refs with: peeled fully-peeled sorted\n".to_string());
        content.push_str(&format!("{} {}\n", id, name));
        std::fs::write(path, content).unwrap();
    }
}
