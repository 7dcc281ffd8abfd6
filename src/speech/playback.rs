//! Speech playback adapter
//!
//! Wraps the external text-to-speech engine behind a channel-based worker.
//! At most one utterance plays at a time: a new `speak` supersedes anything
//! queued or in flight, and `cancel` stops playback immediately. Preemption
//! is tracked with an epoch counter shared between the handle and the
//! worker; an utterance whose epoch is no longer current is cancelled.

use crate::{ParleyError, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Cancellation token for one utterance
///
/// The utterance is cancelled once the shared epoch moves past the value it
/// was issued under.
#[derive(Clone)]
pub struct CancelToken {
    epoch: Arc<AtomicU64>,
    issued: u64,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.epoch.load(Ordering::SeqCst) != self.issued
    }
}

/// Text-to-speech seam
///
/// `speak` blocks until playback completes or the token is cancelled.
/// Implementations should poll the token at whatever granularity the engine
/// allows; returning after cancellation is fine, the worker reports the
/// utterance as interrupted rather than complete.
pub trait SpeechSynthesizer: Send {
    fn speak(&mut self, text: &str, cancel: &CancelToken) -> Result<()>;
}

/// Commands accepted by the playback worker
#[derive(Debug, Clone)]
pub enum PlaybackCommand {
    /// Play one utterance
    Speak {
        text: String,
        request_id: Uuid,
        generation: u64,
        epoch: u64,
    },
    /// Shutdown the worker
    Shutdown,
}

/// Events emitted by the playback worker
#[derive(Debug, Clone)]
pub enum PlaybackEvent {
    /// Playback has begun
    Started { request_id: Uuid, generation: u64 },
    /// Playback ran to completion
    Complete { request_id: Uuid, generation: u64 },
    /// Playback was preempted by a newer speak or a cancel (not an error)
    Interrupted { request_id: Uuid, generation: u64 },
    /// Synthesis or playback failed
    Error {
        error: String,
        request_id: Uuid,
        generation: u64,
    },
    /// Worker has shut down
    Shutdown,
}

/// Handle for the playback worker
pub struct PlaybackAdapter {
    command_tx: Sender<PlaybackCommand>,
    event_rx: Receiver<PlaybackEvent>,
    epoch: Arc<AtomicU64>,
}

impl PlaybackAdapter {
    /// Create an adapter/worker pair around a synthesizer
    pub fn new(
        synthesizer: Box<dyn SpeechSynthesizer>,
        buffer_size: usize,
    ) -> (Self, PlaybackWorker) {
        let (command_tx, command_rx) = bounded(buffer_size);
        let (event_tx, event_rx) = bounded(buffer_size);
        let epoch = Arc::new(AtomicU64::new(0));

        let adapter = Self {
            command_tx,
            event_rx,
            epoch: Arc::clone(&epoch),
        };

        let worker = PlaybackWorker {
            synthesizer,
            command_rx,
            event_tx,
            epoch,
        };

        (adapter, worker)
    }

    /// Play one utterance, cancelling any prior one first
    pub fn speak(&self, text: String, request_id: Uuid, generation: u64) -> Result<()> {
        // Bumping the epoch cancels whatever is queued or in flight
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.command_tx
            .send(PlaybackCommand::Speak {
                text,
                request_id,
                generation,
                epoch,
            })
            .map_err(|e| ParleyError::ChannelError(format!("Failed to send speak: {}", e)))
    }

    /// Stop in-flight playback immediately (idempotent)
    pub fn cancel(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Request worker shutdown
    pub fn shutdown(&self) -> Result<()> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.command_tx
            .send(PlaybackCommand::Shutdown)
            .map_err(|e| ParleyError::ChannelError(format!("Failed to send shutdown: {}", e)))
    }

    /// Get a receiver for events
    pub fn event_receiver(&self) -> Receiver<PlaybackEvent> {
        self.event_rx.clone()
    }
}

/// Worker that plays utterances in a dedicated thread
pub struct PlaybackWorker {
    synthesizer: Box<dyn SpeechSynthesizer>,
    command_rx: Receiver<PlaybackCommand>,
    event_tx: Sender<PlaybackEvent>,
    epoch: Arc<AtomicU64>,
}

impl PlaybackWorker {
    /// Start the worker thread
    pub fn start(self) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("speech-playback".into())
            .spawn(move || self.run())
            .map_err(|e| ParleyError::ChannelError(format!("Failed to spawn worker: {}", e)))
    }

    fn run(mut self) {
        info!("Playback worker starting");

        loop {
            match self.command_rx.recv() {
                Ok(PlaybackCommand::Speak {
                    text,
                    request_id,
                    generation,
                    epoch,
                }) => {
                    let token = CancelToken {
                        epoch: Arc::clone(&self.epoch),
                        issued: epoch,
                    };

                    if token.is_cancelled() {
                        debug!(%request_id, "utterance superseded before playback");
                        let _ = self.event_tx.send(PlaybackEvent::Interrupted {
                            request_id,
                            generation,
                        });
                        continue;
                    }

                    let _ = self.event_tx.send(PlaybackEvent::Started {
                        request_id,
                        generation,
                    });
                    debug!(%request_id, chars = text.len(), "playback started");

                    let result = self.synthesizer.speak(&text, &token);

                    let event = if token.is_cancelled() {
                        debug!(%request_id, "playback interrupted");
                        PlaybackEvent::Interrupted {
                            request_id,
                            generation,
                        }
                    } else {
                        match result {
                            Ok(()) => {
                                debug!(%request_id, "playback complete");
                                PlaybackEvent::Complete {
                                    request_id,
                                    generation,
                                }
                            }
                            Err(e) => {
                                warn!(%request_id, error = %e, "playback failed");
                                PlaybackEvent::Error {
                                    error: e.to_string(),
                                    request_id,
                                    generation,
                                }
                            }
                        }
                    };

                    if self.event_tx.send(event).is_err() {
                        error!("Playback event channel disconnected");
                        break;
                    }
                }

                Ok(PlaybackCommand::Shutdown) => {
                    info!("Playback worker shutting down");
                    let _ = self.event_tx.send(PlaybackEvent::Shutdown);
                    break;
                }

                Err(e) => {
                    error!("Command channel error: {}", e);
                    break;
                }
            }
        }

        info!("Playback worker stopped");
    }
}

#[derive(Serialize)]
struct SpeakRequest<'a> {
    text: &'a str,
}

/// Synthesizer backed by an external speech service
///
/// One `POST {base_url}/speak` per utterance; the service holds the request
/// open until playback finishes, so the blocking call doubles as the
/// completion signal.
pub struct HttpSynthesizer {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpSynthesizer {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            // Generous ceiling for long answers
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ParleyError::ConfigError(format!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

impl SpeechSynthesizer for HttpSynthesizer {
    fn speak(&mut self, text: &str, _cancel: &CancelToken) -> Result<()> {
        let url = format!("{}/speak", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&SpeakRequest { text })
            .send()
            .map_err(|e| ParleyError::PlaybackError(format!("Speak request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ParleyError::PlaybackError(format!(
                "Speech service returned {}",
                status
            )));
        }

        Ok(())
    }
}

/// Synthesizer for hosts without a speech engine: completes immediately
///
/// Answers still flow through the Speaking state so the session machine
/// behaves identically with and without audio.
pub struct NullSynthesizer;

impl SpeechSynthesizer for NullSynthesizer {
    fn speak(&mut self, _text: &str, _cancel: &CancelToken) -> Result<()> {
        Ok(())
    }
}
