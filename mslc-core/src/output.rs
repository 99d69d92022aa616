//! Compile diagnostics.
//!
//! Messages are plain records accumulated in the order they are produced so
//! callers can inspect them at convenient boundaries instead of unwinding.
//! A message flagged `continued` annotates the message right before it, for
//! example pointing at the other declaration of a duplicated name.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub level: Level,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub continued: bool,
    pub text: String,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let level = match self.level {
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
        };
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.file, self.line, self.column, level, self.text
        )
    }
}

#[derive(Debug, Default, Clone)]
pub struct Output {
    messages: Vec<Message>,
}

impl Output {
    pub fn new() -> Output {
        Default::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn add_message(
        &mut self,
        level: Level,
        file: &str,
        line: u32,
        column: u32,
        continued: bool,
        text: impl Into<String>,
    ) {
        self.messages.push(Message {
            level,
            file: file.to_owned(),
            line,
            column,
            continued,
            text: text.into(),
        });
    }

    pub fn error(&mut self, file: &str, line: u32, column: u32, text: impl Into<String>) {
        self.add_message(Level::Error, file, line, column, false, text);
    }

    /// Continuation of the immediately preceding message.
    pub fn note(&mut self, file: &str, line: u32, column: u32, text: impl Into<String>) {
        self.add_message(Level::Error, file, line, column, true, text);
    }

    pub fn error_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|x| x.level == Level::Error && !x.continued)
            .count()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
