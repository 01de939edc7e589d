//! Output boundary: where inbound text goes.
//!
//! The sink displays result text and forwards it to a speech engine; the
//! engine itself is a black box that accepts UTF-8 text and a locale tag.

use std::process::{Command, Stdio};

/// Consumer of inbound text and connection status.
pub trait OutputSink: Send + Sync {
    /// Result text from the peer; displayed and spoken.
    fn deliver(&self, text: &str);

    /// Human-readable connection status line.
    fn status(&self, text: &str);

    /// User-visible error.
    fn error(&self, text: &str);
}

/// Black-box speech synthesis accepting UTF-8 text.
pub trait SpeechEngine: Send + Sync {
    fn speak(&self, text: &str, locale: &str);
}

/// Discards speech. Used when no synthesizer command is configured.
pub struct NullSpeech;

impl SpeechEngine for NullSpeech {
    fn speak(&self, text: &str, _locale: &str) {
        tracing::debug!("speech disabled, dropping {} chars", text.len());
    }
}

/// Speaks by spawning an external synthesizer, e.g. `espeak-ng` or `say`.
///
/// The command is invoked as `<program> -v <locale> <text>` and never waited
/// on; synthesis latency must not stall the session.
pub struct CommandSpeech {
    program: String,
}

impl CommandSpeech {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl SpeechEngine for CommandSpeech {
    fn speak(&self, text: &str, locale: &str) {
        let spawned = Command::new(&self.program)
            .arg("-v")
            .arg(locale)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        if let Err(e) = spawned {
            tracing::warn!("speech command {} failed: {e}", self.program);
        }
    }
}

/// Prints to the terminal and forwards result text to the speech engine.
pub struct ConsoleSink {
    speech: Box<dyn SpeechEngine>,
    locale: String,
}

impl ConsoleSink {
    pub fn new(speech: Box<dyn SpeechEngine>, locale: String) -> Self {
        Self { speech, locale }
    }
}

impl OutputSink for ConsoleSink {
    fn deliver(&self, text: &str) {
        println!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), text);
        self.speech.speak(text, &self.locale);
    }

    fn status(&self, text: &str) {
        println!("-- {text}");
    }

    fn error(&self, text: &str) {
        eprintln!("❌ {text}");
    }
}

/// Records everything it receives, for assertions.
#[cfg(test)]
pub(crate) struct RecordingSink {
    pub(crate) delivered: std::sync::Mutex<Vec<String>>,
    pub(crate) statuses: std::sync::Mutex<Vec<String>>,
    pub(crate) errors: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingSink {
    pub(crate) fn new() -> Self {
        Self {
            delivered: std::sync::Mutex::new(Vec::new()),
            statuses: std::sync::Mutex::new(Vec::new()),
            errors: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[cfg(test)]
impl OutputSink for RecordingSink {
    fn deliver(&self, text: &str) {
        self.delivered.lock().unwrap().push(text.to_string());
    }

    fn status(&self, text: &str) {
        self.statuses.lock().unwrap().push(text.to_string());
    }

    fn error(&self, text: &str) {
        self.errors.lock().unwrap().push(text.to_string());
    }
}
