//! Core library for the stagehub performance installation.
//!
//! A performance workspace is a directory holding a manifest
//! (`performance_config.json`) and one subdirectory per song, each with its
//! own `song_config.json` embedding the song's props. The entity types in
//! this crate load that tree, edit it in memory and write every change back
//! immediately. The [`hub`] module routes broker messages to cue handlers.

pub mod config;
pub mod error;
pub mod fsutil;
pub mod hub;
pub mod performance;
pub mod prop;
pub mod song;
pub mod store;

pub use config::{BrokerConfig, HubConfig};
pub use error::{Result, StageError};
pub use hub::{
    ChannelTransport, CueAction, CueHandler, CueRouter, Hub, LineTransport, Message, Transport,
};
pub use performance::{Performance, PERFORMANCE_CONFIG_FILE};
pub use prop::Prop;
pub use song::{Song, SONG_CONFIG_FILE};
pub use store::{ConfigStore, Document};
