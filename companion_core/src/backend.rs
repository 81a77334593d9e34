//! The generation backend contract.
//!
//! The backend is a black box: it takes a prompt string plus sampling parameters and hands
//! back a stream of text fragments. Weights, inference and transport live on the other side.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::BackendError;

/// Sampling parameters forwarded verbatim to the backend.
///
/// The core never validates or interprets these. Documented ranges:
/// temperature `0.1..=1.5`, repetition penalty `1.0..=1.5`, min-p `0.0..=1.0`, top-k `0..=100`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub temperature: f32,
    pub repetition_penalty: f32,
    pub min_p: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub stop: Vec<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 1.1,
            repetition_penalty: 1.1,
            min_p: 0.05,
            top_k: 40,
            top_p: 0.95,
            max_tokens: 512,
            stop: vec!["<|eot_id|>".to_string(), "User:".to_string()],
        }
    }
}

/// A model that turns a prompt into streamed text.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Start generating.
    ///
    /// Fails fast with [`BackendError::Unavailable`] or [`BackendError::ModelLoadFailure`]
    /// when nothing can be produced at all.
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Box<dyn FragmentStream>, BackendError>;
}

/// Pull side of a running generation.
#[async_trait]
pub trait FragmentStream: Send {
    /// Next text fragment. `None` means the backend finished normally.
    async fn next(&mut self) -> Option<Result<String, BackendError>>;
}

/// A [`FragmentStream`] fed by a tokio channel.
///
/// Backends that produce tokens on a worker task push into the sender half.
pub struct ChannelFragmentStream {
    rx: mpsc::Receiver<Result<String, BackendError>>,
}

impl ChannelFragmentStream {
    pub fn new(rx: mpsc::Receiver<Result<String, BackendError>>) -> Self {
        Self { rx }
    }

    /// Create a matched sender + stream pair.
    pub fn pair(buffer: usize) -> (mpsc::Sender<Result<String, BackendError>>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx })
    }
}

#[async_trait]
impl FragmentStream for ChannelFragmentStream {
    async fn next(&mut self) -> Option<Result<String, BackendError>> {
        self.rx.recv().await
    }
}

/// A [`FragmentStream`] over fragments that are already in memory.
pub struct ReplayFragmentStream {
    fragments: std::collections::VecDeque<Result<String, BackendError>>,
}

impl ReplayFragmentStream {
    pub fn new(fragments: impl IntoIterator<Item = Result<String, BackendError>>) -> Self {
        Self {
            fragments: fragments.into_iter().collect(),
        }
    }

    /// Replay plain text fragments with no failures.
    pub fn from_text<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(fragments.into_iter().map(|f| Ok(f.into())))
    }
}

#[async_trait]
impl FragmentStream for ReplayFragmentStream {
    async fn next(&mut self) -> Option<Result<String, BackendError>> {
        self.fragments.pop_front()
    }
}
