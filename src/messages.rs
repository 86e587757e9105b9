//! One-shot user-facing notices carried in the session until the next rendered page.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Success,
    Warning,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Success => "success",
            Level::Warning => "warning",
            Level::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub level: Level,
    pub text: String,
    /// Free-form tags a template can filter on (the login page shows `login` errors inline).
    #[serde(default)]
    pub extra_tags: String,
}

impl Message {
    pub fn new(level: Level, text: impl Into<String>) -> Self {
        Self { level, text: text.into(), extra_tags: String::new() }
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.extra_tags = tags.into();
        self
    }

    /// CSS class list used by the page templates.
    pub fn tags(&self) -> String {
        if self.extra_tags.is_empty() {
            self.level.as_str().to_string()
        } else {
            format!("{} {}", self.extra_tags, self.level.as_str())
        }
    }
}

/// Queue of pending messages. Draining empties it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Messages(Vec<Message>);

impl Messages {
    pub fn add(&mut self, msg: Message) { self.0.push(msg); }
    pub fn info(&mut self, text: impl Into<String>) { self.add(Message::new(Level::Info, text)); }
    pub fn success(&mut self, text: impl Into<String>) { self.add(Message::new(Level::Success, text)); }
    pub fn error(&mut self, text: impl Into<String>) { self.add(Message::new(Level::Error, text)); }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn iter(&self) -> impl Iterator<Item = &Message> { self.0.iter() }

    pub fn drain(&mut self) -> Vec<Message> { std::mem::take(&mut self.0) }
}
