//! Collaborator contracts: the segmented-stream decoder and the playback element.
//!
//! The controller only talks to these traits. Embedders bridge them to the
//! real decoder library and media element; [`crate::simulated`] provides
//! scripted implementations for tests.

use async_trait::async_trait;
use common::{ErrorType, Result};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::stream_config::StreamConfig;

/// Shared handle to a loaded decoder module.
pub type DecoderHandle = Arc<dyn DecoderModule>;

/// Fetches the decoder module. Invoked at most once per process through
/// [`crate::preload::PreloadCache`].
#[async_trait]
pub trait DecoderModuleLoader: Send + Sync {
    async fn load(&self) -> Result<DecoderHandle>;
}

pub trait DecoderModule: Send + Sync {
    fn is_supported(&self) -> bool;

    fn create(&self, config: &StreamConfig) -> Result<Box<dyn Decoder>>;
}

/// One decoder instance, owned exclusively by a single controller session.
///
/// Implementations must not call back into the controller synchronously;
/// progress is reported through the channel returned by [`Decoder::take_events`].
pub trait Decoder: Send {
    fn load_source(&mut self, url: &str);

    fn attach_media(&mut self, element: Arc<dyn MediaElement>);

    fn start_load(&mut self);

    fn recover_media_error(&mut self);

    fn destroy(&mut self);

    /// Hands over the event stream. Returns `None` after the first call.
    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<DecoderEvent>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecoderEvent {
    ManifestParsed { levels: usize },
    FragmentBuffered,
    /// Playback buffer ran dry
    BufferEmpty,
    Error(DecoderFault),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderFaultKind {
    Network,
    Media,
    Mux,
    Other,
}

/// Tagged decoder error
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderFault {
    pub fatal: bool,
    pub kind: DecoderFaultKind,
    pub details: String,
    /// HTTP status of the failed request, for network faults
    pub response_code: Option<u16>,
}

impl DecoderFault {
    pub fn fatal(kind: DecoderFaultKind, details: impl Into<String>) -> Self {
        Self {
            fatal: true,
            kind,
            details: details.into(),
            response_code: None,
        }
    }

    pub fn non_fatal(kind: DecoderFaultKind, details: impl Into<String>) -> Self {
        Self {
            fatal: false,
            kind,
            details: details.into(),
            response_code: None,
        }
    }

    pub fn with_response_code(mut self, code: u16) -> Self {
        self.response_code = Some(code);
        self
    }

    /// Maps the decoder's fault taxonomy onto the player's.
    ///
    /// Client errors (4xx) from the relay will not go away by retrying and are
    /// classified as server faults.
    pub fn error_type(&self) -> ErrorType {
        match self.kind {
            DecoderFaultKind::Network => match self.response_code {
                Some(400..=499) => ErrorType::Server,
                _ => ErrorType::Network,
            },
            DecoderFaultKind::Media | DecoderFaultKind::Mux => ErrorType::Media,
            DecoderFaultKind::Other => ErrorType::Unknown,
        }
    }
}

impl fmt::Display for DecoderFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.details)?;
        if let Some(code) = self.response_code {
            write!(f, " (HTTP {})", code)?;
        }
        Ok(())
    }
}

/// Events raised by the playback element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    Waiting,
    Playing,
    CanPlay,
    Error { message: String },
}

#[async_trait]
pub trait MediaElement: Send + Sync {
    async fn play(&self) -> Result<()>;

    fn pause(&self);

    fn set_src(&self, src: Option<&str>);

    fn load(&self);

    /// Registers a listener. Dropping the receiver removes it.
    fn subscribe(&self) -> broadcast::Receiver<MediaEvent>;
}
