use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ConfigStore, CueAction, Result, StageError};

/// Top-level configuration structure for the hub process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Root of the performance workspace.
    pub workspace: PathBuf,
    pub broker: BrokerConfig,
    /// Cue id to action table used by the router.
    pub cues: BTreeMap<String, CueAction>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            broker: BrokerConfig::default(),
            cues: BTreeMap::new(),
        }
    }
}

impl HubConfig {
    /// Reads a JSON config file. Keys left out fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let doc = ConfigStore::new(path).read()?;
        serde_json::from_value(Value::Object(doc)).map_err(|source| StageError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

/// Connection settings for the message broker.
///
/// Only `topic` is acted on today: the hub reads messages through a
/// [`crate::Transport`] and no transport opens a broker connection yet, so
/// `host`, `port` and `client_id` are carried for reporting only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// Topic filter the hub subscribes to.
    pub topic: String,
    pub client_id: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            topic: "stagehub/cues".to_string(),
            client_id: "stagehub".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hub.json");
        fs::write(
            &path,
            r#"{
                "broker": {"host": "10.0.0.2"},
                "cues": {"bass": {"kind": "audio", "track": "bass.wav", "volume": 0.5}}
            }"#,
        )
        .unwrap();

        let config = HubConfig::load(&path).unwrap();

        assert_eq!(config.broker.host, "10.0.0.2");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.workspace, PathBuf::from("."));
        assert_eq!(
            config.cues.get("bass"),
            Some(&CueAction::Audio {
                track: "bass.wav".into(),
                volume: 0.5
            })
        );
    }

    #[test]
    fn missing_and_invalid_files_fail() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("absent.json");
        assert!(HubConfig::load(&missing).unwrap_err().is_not_found());

        let invalid = dir.path().join("hub.json");
        fs::write(&invalid, r#"{"broker": {"port": "not a number"}}"#).unwrap();
        assert!(matches!(
            HubConfig::load(&invalid).unwrap_err(),
            StageError::Parse { .. }
        ));

        assert_eq!(HubConfig::load_or_default(None).unwrap().broker.port, 1883);
    }
}
