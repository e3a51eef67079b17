//! Message-to-cue dispatch for the hub process.
//!
//! The hub owns exactly one [`Transport`] (the broker connection, or any
//! stand-in for it) and a set of [`CueHandler`]s. Each inbound message is
//! resolved to a cue id, looked up in the [`CueRouter`] and handed to every
//! handler. Audio playback and visuals live behind the handler trait.

use std::{collections::BTreeMap, io::BufRead};

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{Result, StageError};

/// A single message received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: String,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// What a cue does once triggered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CueAction {
    Audio {
        track: String,
        #[serde(default = "full_volume")]
        volume: f32,
    },
    Visual {
        effect: String,
    },
    /// Silence audio and clear visuals.
    Stop,
}

fn full_volume() -> f32 {
    1.0
}

/// Receives triggered cues. Implemented by the audio and visual backends.
pub trait CueHandler {
    fn handle(&mut self, cue: &str, action: &CueAction) -> Result<()>;
}

/// Source of broker messages.
pub trait Transport {
    fn subscribe(&mut self, topic: &str) -> Result<()>;

    /// Blocks for the next message. `None` means the connection is closed.
    fn next_message(&mut self) -> Result<Option<Message>>;
}

/// Maps cue ids carried in message payloads to actions.
#[derive(Debug, Clone, Default)]
pub struct CueRouter {
    cues: BTreeMap<String, CueAction>,
}

impl CueRouter {
    pub fn new(cues: BTreeMap<String, CueAction>) -> Self {
        Self { cues }
    }

    pub fn insert(&mut self, cue: impl Into<String>, action: CueAction) {
        self.cues.insert(cue.into(), action);
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Resolves a message to `(cue id, action)`. Payloads are either a bare
    /// cue id or a JSON object with a `"cue"` string.
    pub fn resolve(&self, message: &Message) -> Option<(String, &CueAction)> {
        let cue = cue_id(&message.payload)?;
        match self.cues.get(&cue) {
            Some(action) => Some((cue, action)),
            None => {
                warn!(cue = %cue, topic = %message.topic, "unknown cue");
                None
            }
        }
    }
}

fn cue_id(payload: &str) -> Option<String> {
    let payload = payload.trim();
    if payload.is_empty() {
        return None;
    }
    if payload.starts_with('{') {
        return match serde_json::from_str::<Value>(payload) {
            Ok(value) => value
                .get("cue")
                .and_then(Value::as_str)
                .map(str::to_string),
            Err(err) => {
                warn!(error = %err, "malformed cue payload");
                None
            }
        };
    }
    Some(payload.to_string())
}

/// MQTT-style topic filter match supporting `+` and a trailing `#`.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// The hub runtime: one injected transport, one router, many handlers.
pub struct Hub<T: Transport> {
    transport: T,
    topic: String,
    router: CueRouter,
    handlers: Vec<Box<dyn CueHandler>>,
}

impl<T: Transport> Hub<T> {
    pub fn new(transport: T, topic: impl Into<String>, router: CueRouter) -> Self {
        Self {
            transport,
            topic: topic.into(),
            router,
            handlers: Vec::new(),
        }
    }

    pub fn add_handler(&mut self, handler: Box<dyn CueHandler>) {
        self.handlers.push(handler);
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Routes one message. Returns whether a cue was triggered. Every handler
    /// sees the cue even when an earlier one fails; the first failure is
    /// returned afterwards.
    pub fn dispatch(&mut self, message: &Message) -> Result<bool> {
        let (triggered, failure) = self.deliver(message);
        match failure {
            Some(err) => Err(err),
            None => Ok(triggered),
        }
    }

    /// Subscribes and dispatches until the transport closes. Handler failures
    /// are logged and do not stop the loop. Returns the number of cues at
    /// least one handler accepted.
    pub fn run(&mut self) -> Result<usize> {
        self.transport.subscribe(&self.topic)?;
        info!(topic = %self.topic, cues = self.router.len(), "hub listening");

        let mut triggered = 0;
        while let Some(message) = self.transport.next_message()? {
            let (accepted, failure) = self.deliver(&message);
            if accepted {
                triggered += 1;
            }
            if let Some(err) = failure {
                warn!(error = %err, topic = %message.topic, "cue handler failed");
            }
        }

        info!(triggered, "hub transport closed");
        Ok(triggered)
    }

    fn deliver(&mut self, message: &Message) -> (bool, Option<StageError>) {
        if !topic_matches(&self.topic, &message.topic) {
            debug!(topic = %message.topic, "ignoring message on foreign topic");
            return (false, None);
        }

        let Some((cue, action)) = self.router.resolve(message) else {
            return (false, None);
        };

        debug!(cue = %cue, ?action, "dispatching cue");
        let mut accepted = self.handlers.is_empty();
        let mut failure = None;
        for handler in &mut self.handlers {
            match handler.handle(&cue, action) {
                Ok(()) => accepted = true,
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
        }
        (accepted, failure)
    }
}

/// In-process transport fed through a channel.
#[derive(Debug)]
pub struct ChannelTransport {
    receiver: Receiver<Message>,
    subscriptions: Vec<String>,
}

impl ChannelTransport {
    /// Returns the sending half alongside the transport. Dropping every
    /// sender closes the transport.
    pub fn channel() -> (Sender<Message>, Self) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (
            sender,
            Self {
                receiver,
                subscriptions: Vec::new(),
            },
        )
    }

    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }
}

impl Transport for ChannelTransport {
    fn subscribe(&mut self, topic: &str) -> Result<()> {
        self.subscriptions.push(topic.to_string());
        Ok(())
    }

    fn next_message(&mut self) -> Result<Option<Message>> {
        Ok(self.receiver.recv().ok())
    }
}

/// Transport reading `<topic> <payload>` lines, e.g. from stdin or a
/// captured broker log. Blank lines and lines starting with `#` are skipped.
#[derive(Debug)]
pub struct LineTransport<R> {
    reader: R,
}

impl<R: BufRead> LineTransport<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> Transport for LineTransport<R> {
    fn subscribe(&mut self, _topic: &str) -> Result<()> {
        Ok(())
    }

    fn next_message(&mut self) -> Result<Option<Message>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let (topic, payload) = trimmed.split_once(char::is_whitespace).unwrap_or((trimmed, ""));
            return Ok(Some(Message::new(topic, payload.trim())));
        }
    }
}
