use std::{io, path::PathBuf};

use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use stagehub_core::{
    ConfigStore, CueAction, CueHandler, CueRouter, Hub, HubConfig, LineTransport, Performance,
    Prop, StageError,
};
use tracing_subscriber::EnvFilter;

fn main() -> stagehub_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let workspace = cli.workspace;

    match cli.command {
        Commands::Init => {
            let performance = Performance::init(&workspace)?;
            tracing::info!(workspace = %performance.workspace().display(), "workspace ready");
            Ok(())
        }
        Commands::Song { command } => run_song(workspace, command),
        Commands::Prop { command } => run_prop(workspace, command),
        Commands::Config { command } => run_config(workspace, command),
        Commands::Hub { config } => run_hub(workspace, config),
    }
}

fn run_song(workspace: PathBuf, command: SongCommand) -> stagehub_core::Result<()> {
    let mut performance = Performance::open(&workspace)?;

    match command {
        SongCommand::List => {
            for (name, song) in performance.songs() {
                println!("{name}\t{} props", song.props().len());
            }
        }
        SongCommand::Create { name } => {
            performance.create_song(&name)?;
        }
        SongCommand::Remove { name } => {
            performance.remove_song(&name)?;
        }
        SongCommand::Set { name, key, value } => {
            let mut data = Map::new();
            data.insert(key, parse_value(&value));
            performance.edit_song_config(&name, data)?;
        }
    }
    Ok(())
}

fn run_prop(workspace: PathBuf, command: PropCommand) -> stagehub_core::Result<()> {
    let mut performance = Performance::open(&workspace)?;

    match command {
        PropCommand::List { song } => {
            for id in performance.song(&song)?.prop_ids() {
                println!("{id}");
            }
        }
        PropCommand::Show { song, id } => {
            let prop = performance.song(&song)?.get_prop(&id)?;
            println!("{}", serde_json::to_string_pretty(&prop.to_mapping())?);
        }
        PropCommand::Add {
            song,
            id,
            network,
            sensor,
        } => {
            let network = parse_mapping("network", network.as_deref())?;
            let sensor = parse_mapping("sensor", sensor.as_deref())?;
            performance
                .song_mut(&song)?
                .add_prop(Prop::with_settings(id, network, sensor))?;
        }
        PropCommand::Edit { song, id, data } => {
            let data: Value = serde_json::from_str(&data)?;
            performance.song_mut(&song)?.edit_prop(&id, &data)?;
        }
        PropCommand::Remove { song, id } => {
            performance.song_mut(&song)?.remove_prop(&id)?;
        }
    }
    Ok(())
}

fn run_config(workspace: PathBuf, command: ConfigCommand) -> stagehub_core::Result<()> {
    match command {
        ConfigCommand::Get { file, key } => {
            let value = ConfigStore::new(workspace.join(file)).get(&key)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        ConfigCommand::Set { file, key, value } => {
            ConfigStore::new(workspace.join(file)).set(&key, parse_value(&value))?;
        }
        ConfigCommand::Delete { file, key } => {
            ConfigStore::new(workspace.join(file)).delete(&key)?;
        }
    }
    Ok(())
}

fn run_hub(workspace: PathBuf, config: Option<PathBuf>) -> stagehub_core::Result<()> {
    let mut config = HubConfig::load_or_default(config.as_deref())?;
    if config.workspace == PathBuf::from(".") {
        config.workspace = workspace;
    }

    let performance = Performance::open(&config.workspace)?;
    tracing::info!(
        broker = %config.broker.host,
        port = config.broker.port,
        songs = performance.songs().len(),
        "starting hub"
    );

    let transport = LineTransport::new(io::stdin().lock());
    let mut hub = Hub::new(transport, config.broker.topic, CueRouter::new(config.cues));
    hub.add_handler(Box::new(AudioCues));
    hub.add_handler(Box::new(VisualCues));

    let triggered = hub.run()?;
    tracing::info!(triggered, "hub stopped");
    Ok(())
}

/// Stand-in for the audio backend: reports audio cues.
struct AudioCues;

impl CueHandler for AudioCues {
    fn handle(&mut self, cue: &str, action: &CueAction) -> stagehub_core::Result<()> {
        match action {
            CueAction::Audio { track, volume } => {
                tracing::info!(cue, track = %track, volume, "play audio")
            }
            CueAction::Stop => tracing::info!(cue, "stop audio"),
            CueAction::Visual { .. } => {}
        }
        Ok(())
    }
}

/// Stand-in for the visual backend: reports visual cues.
struct VisualCues;

impl CueHandler for VisualCues {
    fn handle(&mut self, cue: &str, action: &CueAction) -> stagehub_core::Result<()> {
        match action {
            CueAction::Visual { effect } => tracing::info!(cue, effect = %effect, "show visual"),
            CueAction::Stop => tracing::info!(cue, "clear visuals"),
            CueAction::Audio { .. } => {}
        }
        Ok(())
    }
}

/// Accepts any JSON literal; anything else is taken as a plain string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_mapping(field: &str, raw: Option<&str>) -> stagehub_core::Result<Map<String, Value>> {
    match raw.map(|raw| serde_json::from_str::<Value>(raw)).transpose()? {
        None => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(StageError::InvalidField {
            field: field.to_string(),
            expected: "a JSON object",
        }),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Performance workspace and cue hub", long_about = None)]
struct Cli {
    /// Root directory of the performance workspace.
    #[arg(short, long, global = true, default_value = ".")]
    workspace: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the workspace directory and an empty performance manifest.
    Init,
    /// Manage songs in the workspace.
    Song {
        #[command(subcommand)]
        command: SongCommand,
    },
    /// Manage the props of a song.
    Prop {
        #[command(subcommand)]
        command: PropCommand,
    },
    /// Read or edit any config file with dotted key paths.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Dispatch `<topic> <payload>` lines from stdin to cue handlers.
    Hub {
        /// Hub configuration file (broker, topic, cue table).
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum SongCommand {
    List,
    Create {
        name: String,
    },
    Remove {
        name: String,
    },
    /// Set a top-level song setting.
    Set {
        name: String,
        key: String,
        value: String,
    },
}

#[derive(Subcommand, Debug)]
enum PropCommand {
    List {
        song: String,
    },
    Show {
        song: String,
        id: String,
    },
    Add {
        song: String,
        id: String,
        /// Network details as a JSON object.
        #[arg(long)]
        network: Option<String>,
        /// Sensor settings as a JSON object.
        #[arg(long)]
        sensor: Option<String>,
    },
    /// Replace a prop from a full JSON mapping.
    Edit {
        song: String,
        id: String,
        data: String,
    },
    Remove {
        song: String,
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Get {
        /// Path relative to the workspace.
        file: PathBuf,
        key: String,
    },
    Set {
        file: PathBuf,
        key: String,
        value: String,
    },
    Delete {
        file: PathBuf,
        key: String,
    },
}
