//! Read/modify/write access to nested JSON documents on disk.
//!
//! Values inside a document are addressed with dotted key paths such as
//! `"network_details.broker.port"`. Every mutating call rewrites the whole
//! file; writes land in a sibling temporary file first and are renamed over
//! the target so a reader never observes a half-written document.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::Serialize;
use serde_json::{ser::PrettyFormatter, Map, Serializer, Value};
use tracing::debug;

use crate::{Result, StageError};

/// A parsed config file: string keys mapped to arbitrary JSON values.
pub type Document = Map<String, Value>;

/// Handle on a single JSON config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Parses the file. A missing file is [`StageError::NotFound`], a file
    /// that is not a JSON object is [`StageError::Parse`].
    pub fn read(&self) -> Result<Document> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StageError::not_found(
                    "config file",
                    self.path.display().to_string(),
                ));
            }
            Err(err) => return Err(err.into()),
        };

        serde_json::from_str(&contents).map_err(|source| StageError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Like [`ConfigStore::read`], but an absent file yields `seed()` instead
    /// of an error. Malformed files still fail.
    pub fn read_or_else(&self, seed: impl FnOnce() -> Document) -> Result<Document> {
        match self.read() {
            Err(StageError::NotFound { .. }) => {
                debug!(path = %self.path.display(), "config file absent, using seed document");
                Ok(seed())
            }
            other => other,
        }
    }

    /// Serializes `doc` with four-space indentation and replaces the file.
    pub fn write(&self, doc: &Document) -> Result<()> {
        let bytes = to_pretty_json(doc)?;
        let tmp = self.temp_path();
        fs::write(&tmp, &bytes)?;
        if let Err(err) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }

        debug!(path = %self.path.display(), bytes = bytes.len(), "wrote config");
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Value> {
        let doc = self.read()?;
        lookup(&doc, key).cloned()
    }

    /// Assigns `value` at `key`, creating intermediate mappings, then rewrites
    /// the file.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut doc = self.read()?;
        insert(&mut doc, key, value)?;
        self.write(&doc)
    }

    /// Removes `key` and rewrites the file, returning the removed value.
    pub fn delete(&self, key: &str) -> Result<Value> {
        let mut doc = self.read()?;
        let removed = remove(&mut doc, key)?;
        self.write(&doc)?;
        Ok(removed)
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config".to_string());
        self.path.with_file_name(format!(".{name}.tmp"))
    }
}

/// Serializes any value the way config files are laid out on disk.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    Ok(out)
}

/// Resolves a dotted key path inside an in-memory document.
pub fn lookup<'a>(doc: &'a Document, key: &str) -> Result<&'a Value> {
    let (last, parents) = split_key(key)?;

    let mut current = doc;
    for segment in parents {
        current = match current.get(segment) {
            Some(Value::Object(map)) => map,
            _ => return Err(StageError::KeyNotFound(key.to_string())),
        };
    }

    current
        .get(last)
        .ok_or_else(|| StageError::KeyNotFound(key.to_string()))
}

/// Writes `value` at a dotted key path, creating missing parents. Returns the
/// value previously stored there, if any.
pub fn insert(doc: &mut Document, key: &str, value: Value) -> Result<Option<Value>> {
    let (last, parents) = split_key(key)?;

    let mut current = doc;
    for (depth, segment) in parents.iter().enumerate() {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match entry {
            Value::Object(map) => map,
            _ => return Err(StageError::NotAMapping(parents[..=depth].join("."))),
        };
    }

    Ok(current.insert(last.to_string(), value))
}

/// Removes the value at a dotted key path.
pub fn remove(doc: &mut Document, key: &str) -> Result<Value> {
    let (last, parents) = split_key(key)?;

    let mut current = doc;
    for segment in parents {
        current = match current.get_mut(segment) {
            Some(Value::Object(map)) => map,
            _ => return Err(StageError::KeyNotFound(key.to_string())),
        };
    }

    current
        .remove(last)
        .ok_or_else(|| StageError::KeyNotFound(key.to_string()))
}

fn split_key(key: &str) -> Result<(&str, Vec<&str>)> {
    let mut segments: Vec<&str> = key.split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(StageError::InvalidKeyPath(key.to_string()));
    }
    let last = segments
        .pop()
        .ok_or_else(|| StageError::InvalidKeyPath(key.to_string()))?;
    Ok((last, segments))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn store_with(dir: &TempDir, contents: &str) -> ConfigStore {
        let path = dir.path().join("config.json");
        fs::write(&path, contents).unwrap();
        ConfigStore::new(path)
    }

    #[test]
    fn set_then_get_returns_value() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, "{}");

        store.set("mqtt.broker.port", json!(1883)).unwrap();
        store.set("name", json!("opening night")).unwrap();

        assert_eq!(store.get("mqtt.broker.port").unwrap(), json!(1883));
        assert_eq!(store.get("name").unwrap(), json!("opening night"));
        assert_eq!(store.get("mqtt").unwrap(), json!({"broker": {"port": 1883}}));
    }

    #[test]
    fn delete_then_get_is_key_not_found() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, r#"{"a": {"b": 1, "c": 2}}"#);

        assert_eq!(store.delete("a.b").unwrap(), json!(1));

        let err = store.get("a.b").unwrap_err();
        assert!(matches!(err, StageError::KeyNotFound(ref key) if key == "a.b"));
        assert_eq!(store.get("a.c").unwrap(), json!(2));
    }

    #[test]
    fn delete_through_missing_parent_fails() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, r#"{"a": {}}"#);

        assert!(matches!(
            store.delete("x.y").unwrap_err(),
            StageError::KeyNotFound(_)
        ));
        assert!(matches!(
            store.delete("a.missing").unwrap_err(),
            StageError::KeyNotFound(_)
        ));
    }

    #[test]
    fn missing_file_and_malformed_file_are_distinct() {
        let dir = TempDir::new().unwrap();
        let missing = ConfigStore::new(dir.path().join("absent.json"));
        assert!(missing.read().unwrap_err().is_not_found());
        assert!(missing.get("a").unwrap_err().is_not_found());

        let broken = store_with(&dir, "{ not json");
        assert!(matches!(broken.read().unwrap_err(), StageError::Parse { .. }));

        let seeded = missing
            .read_or_else(|| {
                let mut doc = Document::new();
                doc.insert("songs".into(), json!([]));
                doc
            })
            .unwrap();
        assert_eq!(seeded.get("songs"), Some(&json!([])));
    }

    #[test]
    fn set_refuses_to_walk_through_scalars() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, r#"{"a": {"b": 5}}"#);

        let err = store.set("a.b.c", json!(true)).unwrap_err();
        assert!(matches!(err, StageError::NotAMapping(ref key) if key == "a.b"));
        assert_eq!(store.get("a.b").unwrap(), json!(5));
    }

    #[test]
    fn rejects_empty_segments() {
        let mut doc = Document::new();
        for key in ["", "a..b", ".a", "a."] {
            assert!(matches!(
                insert(&mut doc, key, json!(1)).unwrap_err(),
                StageError::InvalidKeyPath(_)
            ));
        }
    }

    #[test]
    fn writes_four_space_indentation_without_leftovers() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join("song_config.json"));
        let mut doc = Document::new();
        doc.insert("props".into(), json!({"p1": {"id": "p1"}}));

        store.write(&doc).unwrap();

        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("\n    \"props\": {\n        \"p1\""));
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(store.read().unwrap(), doc);
    }
}
