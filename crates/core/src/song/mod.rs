use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::{ConfigStore, Document, Prop, Result, StageError};

/// File holding song-level settings and the embedded prop table.
pub const SONG_CONFIG_FILE: &str = "song_config.json";

const PROPS_KEY: &str = "props";

/// One song of a performance. Lives in `<workspace>/<name>/` and persists its
/// props under the `props` key of [`SONG_CONFIG_FILE`].
#[derive(Debug, Clone)]
pub struct Song {
    name: String,
    workspace: PathBuf,
    config: Document,
    props: BTreeMap<String, Prop>,
}

impl Song {
    /// Creates a transient song. `workspace` is the owning performance's root.
    pub fn new(workspace: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            workspace: workspace.into(),
            config: Document::new(),
            props: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn directory(&self) -> PathBuf {
        self.workspace.join(&self.name)
    }

    pub fn config_path(&self) -> PathBuf {
        self.directory().join(SONG_CONFIG_FILE)
    }

    /// Song-level settings, including the `props` mirror after a save.
    pub fn config(&self) -> &Document {
        &self.config
    }

    pub fn props(&self) -> &BTreeMap<String, Prop> {
        &self.props
    }

    pub fn prop_ids(&self) -> impl Iterator<Item = &str> {
        self.props.keys().map(String::as_str)
    }

    /// Reads the song's config file and rebuilds the prop table from it.
    ///
    /// An absent file is an empty song. A file without a `props` key fails
    /// with [`StageError::MissingField`].
    pub fn load_config(&mut self) -> Result<()> {
        let config = self.store().read_or_else(seed_document)?;

        let entries = match config.get(PROPS_KEY) {
            Some(Value::Object(entries)) => entries,
            Some(_) => {
                return Err(StageError::InvalidField {
                    field: PROPS_KEY.into(),
                    expected: "a mapping",
                })
            }
            None => return Err(StageError::MissingField(PROPS_KEY.into())),
        };

        let mut props = BTreeMap::new();
        for (prop_id, data) in entries {
            let mut prop = Prop::new(prop_id.clone());
            prop.load_from_mapping(data)?;
            props.insert(prop_id.clone(), prop);
        }

        info!(song = %self.name, props = props.len(), "loaded song");
        self.props = props;
        self.config = config;
        Ok(())
    }

    /// Mirrors the prop table into `config["props"]` and writes the file.
    pub fn save_config(&mut self) -> Result<()> {
        let props: Map<String, Value> = self
            .props
            .values()
            .map(|prop| (prop.id.clone(), prop.to_mapping()))
            .collect();
        self.config.insert(PROPS_KEY.into(), Value::Object(props));

        self.store().write(&self.config)?;
        debug!(song = %self.name, "saved song config");
        Ok(())
    }

    /// Inserts `prop`, replacing any prop with the same id, and saves.
    pub fn add_prop(&mut self, prop: Prop) -> Result<()> {
        debug!(song = %self.name, prop = %prop.id, "adding prop");
        self.props.insert(prop.id.clone(), prop);
        self.save_config()
    }

    /// Reloads an existing prop from `data` and saves. If `data` carries a
    /// different id the prop is re-keyed under it.
    pub fn edit_prop(&mut self, prop_id: &str, data: &Value) -> Result<()> {
        let prop = self
            .props
            .get_mut(prop_id)
            .ok_or_else(|| StageError::not_found("prop", prop_id))?;
        prop.load_from_mapping(data)?;

        if prop.id != prop_id {
            if let Some(prop) = self.props.remove(prop_id) {
                debug!(song = %self.name, from = prop_id, to = %prop.id, "re-keying prop");
                self.props.insert(prop.id.clone(), prop);
            }
        }
        self.save_config()
    }

    pub fn remove_prop(&mut self, prop_id: &str) -> Result<Prop> {
        let prop = self
            .props
            .remove(prop_id)
            .ok_or_else(|| StageError::not_found("prop", prop_id))?;
        self.save_config()?;
        Ok(prop)
    }

    pub fn get_prop(&self, prop_id: &str) -> Result<&Prop> {
        self.props
            .get(prop_id)
            .ok_or_else(|| StageError::not_found("prop", prop_id))
    }

    /// Merges top-level song settings from `data` and saves. A `props` key in
    /// `data` is ignored; props change only through the prop operations.
    pub fn edit_config(&mut self, data: Document) -> Result<()> {
        for (key, value) in data {
            if key != PROPS_KEY {
                self.config.insert(key, value);
            }
        }
        self.save_config()
    }

    fn store(&self) -> ConfigStore {
        ConfigStore::new(self.config_path())
    }
}

fn seed_document() -> Document {
    let mut doc = Document::new();
    doc.insert(PROPS_KEY.into(), Value::Object(Map::new()));
    doc
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn song_in(dir: &TempDir, name: &str) -> Song {
        fs::create_dir_all(dir.path().join(name)).unwrap();
        Song::new(dir.path(), name)
    }

    fn on_disk(song: &Song) -> Value {
        serde_json::from_str(&fs::read_to_string(song.config_path()).unwrap()).unwrap()
    }

    #[test]
    fn missing_file_loads_as_empty_song() {
        let dir = TempDir::new().unwrap();
        let mut song = song_in(&dir, "song1");

        song.load_config().unwrap();

        assert!(song.props().is_empty());
        assert!(!song.config_path().exists());
    }

    #[test]
    fn file_without_props_key_is_missing_field() {
        let dir = TempDir::new().unwrap();
        let mut song = song_in(&dir, "song1");
        fs::write(song.config_path(), r#"{"tempo": 120}"#).unwrap();

        let err = song.load_config().unwrap_err();
        assert!(matches!(err, StageError::MissingField(ref f) if f == "props"));
    }

    #[test]
    fn add_get_remove_prop() {
        let dir = TempDir::new().unwrap();
        let mut song = song_in(&dir, "song1");

        song.add_prop(Prop::new("p1")).unwrap();
        assert_eq!(song.get_prop("p1").unwrap().id, "p1");
        assert_eq!(on_disk(&song)["props"]["p1"]["id"], json!("p1"));

        song.remove_prop("p1").unwrap();
        assert!(song.get_prop("p1").unwrap_err().is_not_found());
        assert_eq!(on_disk(&song)["props"], json!({}));
        assert!(song.remove_prop("p1").unwrap_err().is_not_found());
    }

    #[test]
    fn add_prop_overwrites_same_id() {
        let dir = TempDir::new().unwrap();
        let mut song = song_in(&dir, "song1");

        song.add_prop(Prop::new("p1")).unwrap();
        let mut replacement = Prop::new("p1");
        replacement
            .sensor_settings
            .insert("axis".into(), json!("x"));
        song.add_prop(replacement).unwrap();

        assert_eq!(song.props().len(), 1);
        assert_eq!(
            song.get_prop("p1").unwrap().sensor_settings.get("axis"),
            Some(&json!("x"))
        );
    }

    #[test]
    fn edit_missing_prop_does_not_touch_file() {
        let dir = TempDir::new().unwrap();
        let mut song = song_in(&dir, "song1");
        song.add_prop(Prop::new("p1")).unwrap();
        let before = fs::read_to_string(song.config_path()).unwrap();

        let err = song
            .edit_prop(
                "missing",
                &json!({"id": "missing", "network_details": {}, "sensor_settings": {}}),
            )
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(fs::read_to_string(song.config_path()).unwrap(), before);
    }

    #[test]
    fn edit_prop_persists_and_rekeys() {
        let dir = TempDir::new().unwrap();
        let mut song = song_in(&dir, "song1");
        song.add_prop(Prop::new("p1")).unwrap();

        song.edit_prop(
            "p1",
            &json!({"id": "p1", "network_details": {"port": 1883}, "sensor_settings": {}}),
        )
        .unwrap();
        assert_eq!(on_disk(&song)["props"]["p1"]["network_details"]["port"], json!(1883));

        song.edit_prop(
            "p1",
            &json!({"id": "wand", "network_details": {}, "sensor_settings": {}}),
        )
        .unwrap();
        assert!(song.get_prop("p1").is_err());
        assert_eq!(song.prop_ids().collect::<Vec<_>>(), vec!["wand"]);
        assert_eq!(on_disk(&song)["props"], json!({"wand": {
            "id": "wand", "network_details": {}, "sensor_settings": {}
        }}));
    }

    #[test]
    fn edit_config_keeps_props_authoritative() {
        let dir = TempDir::new().unwrap();
        let mut song = song_in(&dir, "song1");
        song.add_prop(Prop::new("p1")).unwrap();

        let mut data = Document::new();
        data.insert("tempo".into(), json!(96));
        data.insert("props".into(), json!({}));
        song.edit_config(data).unwrap();

        let disk = on_disk(&song);
        assert_eq!(disk["tempo"], json!(96));
        assert_eq!(disk["props"]["p1"]["id"], json!("p1"));
    }

    #[test]
    fn save_then_fresh_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let mut song = song_in(&dir, "song1");
        let mut network = Map::new();
        network.insert("ip".into(), json!("192.168.1.20"));
        song.add_prop(Prop::with_settings("drum", network, Map::new()))
            .unwrap();
        song.add_prop(Prop::new("light")).unwrap();

        let mut fresh = Song::new(dir.path(), "song1");
        fresh.load_config().unwrap();

        assert_eq!(fresh.props(), song.props());
    }
}
