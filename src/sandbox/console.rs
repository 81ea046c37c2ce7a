use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Warn,
    Error,
    Info,
}

impl ConsoleLevel {
    pub fn parse(level: &str) -> Option<Self> {
        match level {
            "log" => Some(ConsoleLevel::Log),
            "warn" => Some(ConsoleLevel::Warn),
            "error" => Some(ConsoleLevel::Error),
            "info" => Some(ConsoleLevel::Info),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsoleMessage {
    pub id: u64,
    pub level: ConsoleLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Messages captured during the current run, in arrival order.
#[derive(Debug, Default, Clone)]
pub struct ConsoleLog {
    messages: Vec<ConsoleMessage>,
    next_id: u64,
}

impl ConsoleLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empties the log and restarts ids at 0.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.next_id = 0;
    }

    pub fn push(&mut self, level: ConsoleLevel, message: impl Into<String>) -> &ConsoleMessage {
        let id = self.next_id;
        self.next_id += 1;
        self.messages.push(ConsoleMessage {
            id,
            level,
            message: message.into(),
            timestamp: Utc::now(),
        });
        &self.messages[self.messages.len() - 1]
    }

    /// Accepts a message posted by the executed document. Anything that is not
    /// `{type: "console", level: <known>, message: <string>}` is dropped.
    pub fn relay(&mut self, value: &Value) -> Option<&ConsoleMessage> {
        let Some((level, message)) = parse_console_message(value) else {
            debug!("Ignoring message that is not a console event");
            return None;
        };
        Some(self.push(level, message))
    }

    pub fn messages(&self) -> &[ConsoleMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

fn parse_console_message(value: &Value) -> Option<(ConsoleLevel, String)> {
    let object = value.as_object()?;
    if object.get("type")?.as_str()? != "console" {
        return None;
    }
    let level = ConsoleLevel::parse(object.get("level")?.as_str()?)?;
    let message = object.get("message")?.as_str()?.to_string();
    Some((level, message))
}
