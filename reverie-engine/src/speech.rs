//! Spoken narration.
//!
//! Speech runs in the background and never blocks a turn.  Starting a new
//! utterance cancels the one still playing, and every failure is logged
//! and swallowed: audio is never allowed to break the game.

use std::future::Future;
use std::io;
use std::process::Stdio;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use reverie_core::config::AudioConfig;

/// Something that can say a line of text.
pub trait SpeechSink: Send + Sync + 'static {
    /// Speak `text`, resolving when playback is done.
    fn speak(&self, text: String) -> impl Future<Output = io::Result<()>> + Send;
}

/// Pipes narration to an external program (`say`, `espeak`, ...).
///
/// The child is killed when the speaking task is aborted.
#[derive(Debug, Clone)]
pub struct CommandSpeechSink {
    program: String,
    voice: Option<String>,
}

impl CommandSpeechSink {
    /// Build from the audio config.
    #[must_use]
    pub fn from_config(config: &AudioConfig) -> Self {
        Self {
            program: config.command.clone(),
            voice: config.voice.clone(),
        }
    }

    fn command(&self, text: &str) -> Command {
        let mut command = Command::new(&self.program);
        if let Some(voice) = &self.voice {
            command.arg("-v").arg(voice);
        }
        command
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

impl SpeechSink for CommandSpeechSink {
    async fn speak(&self, text: String) -> io::Result<()> {
        let status = self.command(&text).status().await?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!("{} exited with {status}", self.program)))
        }
    }
}

/// Logs what would have been said.  Used when audio is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSpeechSink;

impl SpeechSink for TracingSpeechSink {
    async fn speak(&self, text: String) -> io::Result<()> {
        debug!(chars = text.len(), "speech (muted)");
        Ok(())
    }
}

/// Runs one utterance at a time on the tokio runtime.
#[derive(Debug)]
pub struct SpeechDispatcher<K> {
    sink: Arc<K>,
    current: Mutex<Option<JoinHandle<()>>>,
}

impl<K: SpeechSink> SpeechDispatcher<K> {
    /// Wrap a sink.
    #[must_use]
    pub fn new(sink: K) -> Self {
        Self {
            sink: Arc::new(sink),
            current: Mutex::new(None),
        }
    }

    /// Start speaking `text`, cancelling anything still playing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, text: impl Into<String>) {
        let text = text.into();
        if text.trim().is_empty() {
            return;
        }
        let sink = Arc::clone(&self.sink);
        let task = tokio::spawn(async move {
            if let Err(e) = sink.speak(text).await {
                warn!(error = %e, "speech failed");
            }
        });
        if let Some(previous) = self.current.lock().replace(task) {
            previous.abort();
        }
    }

    /// Stop whatever is playing.
    pub fn cancel(&self) {
        if let Some(task) = self.current.lock().take() {
            task.abort();
        }
    }

    /// Whether an utterance is still playing.
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.current.lock().as_ref().is_some_and(|t| !t.is_finished())
    }

    /// The sink.
    #[must_use]
    pub fn sink(&self) -> &K {
        &self.sink
    }
}

impl<K> Drop for SpeechDispatcher<K> {
    fn drop(&mut self) {
        if let Some(task) = self.current.get_mut().take() {
            task.abort();
        }
    }
}
