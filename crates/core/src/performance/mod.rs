use std::{
    collections::BTreeMap,
    fs, io,
    path::{Component, Path, PathBuf},
};

use serde_json::Value;
use tracing::{debug, info};

use crate::{fsutil, ConfigStore, Document, Result, Song, StageError, SONG_CONFIG_FILE};

/// Manifest file at the root of a performance workspace.
pub const PERFORMANCE_CONFIG_FILE: &str = "performance_config.json";

const SONGS_KEY: &str = "songs";

/// A performance workspace: a manifest listing song names plus one
/// subdirectory per song. Owns every [`Song`] loaded from it.
#[derive(Debug, Clone)]
pub struct Performance {
    workspace: PathBuf,
    config: Document,
    songs: BTreeMap<String, Song>,
}

impl Performance {
    /// Creates a transient performance rooted at `workspace`. Nothing is read
    /// until [`Performance::load_config`] / [`Performance::load_songs`].
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            config: Document::new(),
            songs: BTreeMap::new(),
        }
    }

    /// Loads the manifest and every song directory under `workspace`.
    pub fn open(workspace: impl Into<PathBuf>) -> Result<Self> {
        let mut performance = Self::new(workspace);
        performance.load_config()?;
        performance.load_songs()?;
        Ok(performance)
    }

    /// Prepares `workspace` for use: creates the directory and writes an
    /// empty manifest unless one already exists, then opens it.
    pub fn init(workspace: impl Into<PathBuf>) -> Result<Self> {
        let workspace = workspace.into();
        fsutil::create_directory(&workspace)?;

        let store = ConfigStore::new(workspace.join(PERFORMANCE_CONFIG_FILE));
        if !store.exists() {
            store.write(&seed_document())?;
            info!(workspace = %workspace.display(), "initialized performance workspace");
        }

        Self::open(workspace)
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn config_path(&self) -> PathBuf {
        self.workspace.join(PERFORMANCE_CONFIG_FILE)
    }

    pub fn config(&self) -> &Document {
        &self.config
    }

    pub fn songs(&self) -> &BTreeMap<String, Song> {
        &self.songs
    }

    pub fn song(&self, name: &str) -> Result<&Song> {
        self.songs
            .get(name)
            .ok_or_else(|| StageError::not_found("song", name))
    }

    pub fn song_mut(&mut self, name: &str) -> Result<&mut Song> {
        self.songs
            .get_mut(name)
            .ok_or_else(|| StageError::not_found("song", name))
    }

    /// Song names in manifest order.
    pub fn song_names(&self) -> Result<Vec<String>> {
        Ok(self
            .manifest_songs()?
            .iter()
            .filter_map(|name| name.as_str().map(str::to_string))
            .collect())
    }

    /// Reads the manifest. An absent file is an empty manifest.
    pub fn load_config(&mut self) -> Result<()> {
        self.config = self.store().read_or_else(seed_document)?;
        Ok(())
    }

    pub fn save_config(&self) -> Result<()> {
        self.store().write(&self.config)?;
        debug!(workspace = %self.workspace.display(), "saved performance config");
        Ok(())
    }

    /// Appends `song_name` to the manifest unless already listed, then saves.
    ///
    /// The manifest must already carry a `songs` sequence; otherwise this
    /// fails with [`StageError::KeyNotFound`].
    pub fn update_song_in_performance_config(&mut self, song_name: &str) -> Result<()> {
        let songs = match self.config.get_mut(SONGS_KEY) {
            Some(Value::Array(songs)) => songs,
            Some(_) => {
                return Err(StageError::InvalidField {
                    field: SONGS_KEY.into(),
                    expected: "a sequence",
                })
            }
            None => return Err(StageError::KeyNotFound(SONGS_KEY.into())),
        };

        if !songs.iter().any(|name| name.as_str() == Some(song_name)) {
            songs.push(Value::String(song_name.to_string()));
        }
        self.save_config()
    }

    /// Materializes a [`Song`] for every immediate subdirectory of the
    /// workspace.
    pub fn load_songs(&mut self) -> Result<()> {
        for name in fsutil::list_subdirectories(&self.workspace)? {
            let mut song = Song::new(&self.workspace, name.clone());
            song.load_config()?;
            self.songs.insert(name, song);
        }

        info!(
            workspace = %self.workspace.display(),
            songs = self.songs.len(),
            "loaded songs"
        );
        Ok(())
    }

    /// Creates `<workspace>/<name>/`, registers an empty song, records it in
    /// the manifest and writes its config. Fails if the directory exists.
    pub fn create_song(&mut self, name: &str) -> Result<&mut Song> {
        validate_song_name(name)?;

        fs::create_dir(self.workspace.join(name))?;
        self.songs
            .insert(name.to_string(), Song::new(&self.workspace, name));
        self.update_song_in_performance_config(name)?;

        let song = self.song_mut(name)?;
        song.save_config()?;
        info!(song = name, "created song");
        Ok(song)
    }

    /// Merges top-level settings into a song's config and saves it.
    pub fn edit_song_config(&mut self, name: &str, data: Document) -> Result<()> {
        self.song_mut(name)?.edit_config(data)
    }

    /// Drops a song from the manifest, deletes its config file and then
    /// removes its directory.
    ///
    /// A song whose directory holds anything besides its config file is left
    /// alone and fails with [`StageError::DirectoryNotEmpty`], so it cannot
    /// reappear on the next [`Performance::load_songs`]. Removing the emptied
    /// directory is best-effort and only logged on failure.
    pub fn remove_song(&mut self, name: &str) -> Result<Song> {
        let directory = self.song(name)?.directory();
        if directory.is_dir() {
            let leftovers: Vec<String> = fsutil::list_directory(&directory)?
                .into_iter()
                .filter(|entry| entry != SONG_CONFIG_FILE)
                .collect();
            if !leftovers.is_empty() {
                return Err(StageError::DirectoryNotEmpty {
                    path: directory,
                    entries: leftovers,
                });
            }
        }

        let song = self
            .songs
            .remove(name)
            .ok_or_else(|| StageError::not_found("song", name))?;

        if let Some(Value::Array(songs)) = self.config.get_mut(SONGS_KEY) {
            songs.retain(|entry| entry.as_str() != Some(name));
        }
        self.save_config()?;

        match fs::remove_file(song.config_path()) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        fsutil::delete_directory(&song.directory());

        info!(song = name, "removed song");
        Ok(song)
    }

    fn manifest_songs(&self) -> Result<&Vec<Value>> {
        match self.config.get(SONGS_KEY) {
            Some(Value::Array(songs)) => Ok(songs),
            Some(_) => Err(StageError::InvalidField {
                field: SONGS_KEY.into(),
                expected: "a sequence",
            }),
            None => Err(StageError::KeyNotFound(SONGS_KEY.into())),
        }
    }

    fn store(&self) -> ConfigStore {
        ConfigStore::new(self.config_path())
    }
}

fn seed_document() -> Document {
    let mut doc = Document::new();
    doc.insert(SONGS_KEY.into(), Value::Array(Vec::new()));
    doc
}

fn validate_song_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(StageError::InvalidField {
            field: format!("song name `{name}`"),
            expected: "a single directory name",
        }),
    }
}
