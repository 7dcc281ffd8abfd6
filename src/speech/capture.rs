//! Speech capture adapter
//!
//! Wraps the external speech-recognition engine behind a channel-based
//! worker: one `Listen` command yields exactly one finalized transcript,
//! a silence notification, or an error (single-shot, non-continuous).
//! Feature detection happens once at construction; when no engine is
//! configured the adapter is a permanent no-op and every `Listen` is
//! ignored.
//!
//! Events are tagged with the session generation they were issued under so
//! the coordinator can discard results that arrive after a stop.

use crate::{ParleyError, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Outcome of one listening session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenOutcome {
    /// A finalized transcript
    Transcript(String),
    /// The session ended without speech
    Silence,
}

/// One-shot speech recognition seam
///
/// `listen` blocks until the engine finalizes a transcript, detects silence,
/// or fails. Implementations should poll `cancelled` where they can; a
/// cancelled listen may still return normally, in which case the worker
/// discards the result.
pub trait SpeechRecognizer: Send {
    fn listen(&mut self, cancelled: &AtomicBool) -> Result<ListenOutcome>;
}

/// Commands accepted by the capture worker
#[derive(Debug, Clone)]
pub enum CaptureCommand {
    /// Begin one listening session under the given generation
    Listen { generation: u64 },
    /// Shutdown the worker
    Shutdown,
}

/// Events emitted by the capture worker
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// The microphone is live
    Started { generation: u64 },
    /// One finalized transcript
    Transcript { text: String, generation: u64 },
    /// The session ended without speech
    Silence { generation: u64 },
    /// Recognition failed mid-session
    Error { error: String, generation: u64 },
    /// Worker has shut down
    Shutdown,
}

/// Handle for the capture worker
///
/// `stop()` raises a shared flag that aborts the in-flight listen; results
/// that slip through anyway are discarded by the worker or, failing that,
/// by the coordinator's generation check.
pub struct CaptureAdapter {
    command_tx: Sender<CaptureCommand>,
    event_rx: Receiver<CaptureEvent>,
    // Keeps the event channel connected when no worker exists, so readers
    // block instead of seeing a disconnect
    _event_tx: Option<Sender<CaptureEvent>>,
    stop_flag: Arc<AtomicBool>,
    available: bool,
}

impl CaptureAdapter {
    /// Create an adapter/worker pair around a recognizer
    pub fn new(
        recognizer: Box<dyn SpeechRecognizer>,
        buffer_size: usize,
    ) -> (Self, CaptureWorker) {
        let (command_tx, command_rx) = bounded(buffer_size);
        let (event_tx, event_rx) = bounded(buffer_size);
        let stop_flag = Arc::new(AtomicBool::new(false));

        let adapter = Self {
            command_tx,
            event_rx,
            _event_tx: None,
            stop_flag: Arc::clone(&stop_flag),
            available: true,
        };

        let worker = CaptureWorker {
            recognizer,
            command_rx,
            event_tx,
            stop_flag,
        };

        (adapter, worker)
    }

    /// Permanent no-op adapter for hosts without a speech engine
    ///
    /// Commands go nowhere and no events are ever emitted.
    pub fn unavailable() -> Self {
        let (command_tx, _command_rx) = bounded(1);
        let (event_tx, event_rx) = bounded(1);
        Self {
            command_tx,
            event_rx,
            _event_tx: Some(event_tx),
            stop_flag: Arc::new(AtomicBool::new(false)),
            available: false,
        }
    }

    /// Whether a speech engine is present
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Begin one listening session
    pub fn listen(&self, generation: u64) -> Result<()> {
        if !self.available {
            return Err(ParleyError::CaptureUnavailable);
        }
        self.stop_flag.store(false, Ordering::SeqCst);
        self.command_tx
            .send(CaptureCommand::Listen { generation })
            .map_err(|e| ParleyError::ChannelError(format!("Failed to send listen: {}", e)))
    }

    /// Abort any in-flight listening session (idempotent)
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    /// Request worker shutdown
    pub fn shutdown(&self) -> Result<()> {
        if !self.available {
            return Ok(());
        }
        self.stop_flag.store(true, Ordering::SeqCst);
        self.command_tx
            .send(CaptureCommand::Shutdown)
            .map_err(|e| ParleyError::ChannelError(format!("Failed to send shutdown: {}", e)))
    }

    /// Get a receiver for events
    pub fn event_receiver(&self) -> Receiver<CaptureEvent> {
        self.event_rx.clone()
    }
}

/// Worker that runs listening sessions in a dedicated thread
pub struct CaptureWorker {
    recognizer: Box<dyn SpeechRecognizer>,
    command_rx: Receiver<CaptureCommand>,
    event_tx: Sender<CaptureEvent>,
    stop_flag: Arc<AtomicBool>,
}

impl CaptureWorker {
    /// Start the worker thread
    pub fn start(self) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("speech-capture".into())
            .spawn(move || self.run())
            .map_err(|e| ParleyError::ChannelError(format!("Failed to spawn worker: {}", e)))
    }

    fn run(mut self) {
        info!("Capture worker starting");

        loop {
            match self.command_rx.recv() {
                Ok(CaptureCommand::Listen { generation }) => {
                    if self.stop_flag.load(Ordering::SeqCst) {
                        debug!(generation, "listen arrived after stop, ignoring");
                        continue;
                    }

                    let _ = self.event_tx.send(CaptureEvent::Started { generation });
                    debug!(generation, "listening");

                    let outcome = self.recognizer.listen(&self.stop_flag);

                    if self.stop_flag.load(Ordering::SeqCst) {
                        debug!(generation, "listen was stopped, discarding result");
                        continue;
                    }

                    let event = match outcome {
                        Ok(ListenOutcome::Transcript(text)) => {
                            debug!(generation, transcript = %text, "transcript finalized");
                            CaptureEvent::Transcript { text, generation }
                        }
                        Ok(ListenOutcome::Silence) => {
                            debug!(generation, "no speech detected");
                            CaptureEvent::Silence { generation }
                        }
                        Err(e) => {
                            warn!(generation, error = %e, "recognition failed");
                            CaptureEvent::Error {
                                error: e.to_string(),
                                generation,
                            }
                        }
                    };

                    if self.event_tx.send(event).is_err() {
                        error!("Capture event channel disconnected");
                        break;
                    }
                }

                Ok(CaptureCommand::Shutdown) => {
                    info!("Capture worker shutting down");
                    let _ = self.event_tx.send(CaptureEvent::Shutdown);
                    break;
                }

                Err(e) => {
                    error!("Command channel error: {}", e);
                    break;
                }
            }
        }

        info!("Capture worker stopped");
    }
}

#[derive(Serialize)]
struct ListenRequest {
    timeout_secs: u64,
}

#[derive(Deserialize)]
struct ListenResponse {
    transcript: Option<String>,
}

/// Recognizer backed by an external speech service
///
/// One `POST {base_url}/listen` per session; the service holds the request
/// open until it finalizes a transcript or gives up on silence.
pub struct HttpRecognizer {
    client: reqwest::blocking::Client,
    base_url: String,
    listen_timeout_secs: u64,
}

impl HttpRecognizer {
    pub fn new(base_url: impl Into<String>, listen_timeout_secs: u64) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            // Margin over the service-side listen window
            .timeout(Duration::from_secs(listen_timeout_secs + 5))
            .build()
            .map_err(|e| ParleyError::ConfigError(format!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            listen_timeout_secs,
        })
    }
}

impl SpeechRecognizer for HttpRecognizer {
    fn listen(&mut self, _cancelled: &AtomicBool) -> Result<ListenOutcome> {
        let url = format!("{}/listen", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&ListenRequest {
                timeout_secs: self.listen_timeout_secs,
            })
            .send()
            .map_err(|e| ParleyError::CaptureError(format!("Listen request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ParleyError::CaptureError(format!(
                "Speech service returned {}",
                status
            )));
        }

        let result: ListenResponse = response
            .json()
            .map_err(|e| ParleyError::CaptureError(format!("Invalid transcript payload: {}", e)))?;

        match result.transcript {
            Some(text) if !text.trim().is_empty() => Ok(ListenOutcome::Transcript(text)),
            _ => Ok(ListenOutcome::Silence),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Recognizer that replays a fixed script of outcomes
    struct ScriptedRecognizer {
        script: Vec<Result<ListenOutcome>>,
    }

    impl SpeechRecognizer for ScriptedRecognizer {
        fn listen(&mut self, _cancelled: &AtomicBool) -> Result<ListenOutcome> {
            if self.script.is_empty() {
                Ok(ListenOutcome::Silence)
            } else {
                self.script.remove(0)
            }
        }
    }

    #[test]
    fn test_listen_emits_started_then_transcript() {
        let (adapter, worker) = CaptureAdapter::new(
            Box::new(ScriptedRecognizer {
                script: vec![Ok(ListenOutcome::Transcript("hello".into()))],
            }),
            10,
        );
        let events = adapter.event_receiver();
        let handle = worker.start().unwrap();

        adapter.listen(1).unwrap();

        assert!(matches!(
            events.recv().unwrap(),
            CaptureEvent::Started { generation: 1 }
        ));
        match events.recv().unwrap() {
            CaptureEvent::Transcript { text, generation } => {
                assert_eq!(text, "hello");
                assert_eq!(generation, 1);
            }
            other => panic!("Expected transcript, got {:?}", other),
        }

        adapter.shutdown().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_silence_event() {
        let (adapter, worker) = CaptureAdapter::new(
            Box::new(ScriptedRecognizer {
                script: vec![Ok(ListenOutcome::Silence)],
            }),
            10,
        );
        let events = adapter.event_receiver();
        let handle = worker.start().unwrap();

        adapter.listen(2).unwrap();

        assert!(matches!(
            events.recv().unwrap(),
            CaptureEvent::Started { generation: 2 }
        ));
        assert!(matches!(
            events.recv().unwrap(),
            CaptureEvent::Silence { generation: 2 }
        ));

        adapter.shutdown().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_recognition_error_is_reported() {
        let (adapter, worker) = CaptureAdapter::new(
            Box::new(ScriptedRecognizer {
                script: vec![Err(ParleyError::CaptureError("mic gone".into()))],
            }),
            10,
        );
        let events = adapter.event_receiver();
        let handle = worker.start().unwrap();

        adapter.listen(1).unwrap();

        assert!(matches!(events.recv().unwrap(), CaptureEvent::Started { .. }));
        match events.recv().unwrap() {
            CaptureEvent::Error { error, generation } => {
                assert!(error.contains("mic gone"));
                assert_eq!(generation, 1);
            }
            other => panic!("Expected error, got {:?}", other),
        }

        adapter.shutdown().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_stop_discards_pending_listen() {
        let (adapter, worker) = CaptureAdapter::new(
            Box::new(ScriptedRecognizer {
                script: vec![Ok(ListenOutcome::Transcript("too late".into()))],
            }),
            10,
        );
        let events = adapter.event_receiver();

        // Queue a listen, then stop before the worker runs it
        adapter.listen(1).unwrap();
        adapter.stop();

        let handle = worker.start().unwrap();
        adapter.shutdown().unwrap();

        // Only the shutdown event comes through
        assert!(matches!(events.recv().unwrap(), CaptureEvent::Shutdown));
        handle.join().unwrap();
    }

    #[test]
    fn test_unavailable_adapter_is_permanent_no_op() {
        let adapter = CaptureAdapter::unavailable();
        assert!(!adapter.is_available());
        assert!(matches!(
            adapter.listen(1),
            Err(ParleyError::CaptureUnavailable)
        ));
        // Stop and shutdown are harmless
        adapter.stop();
        adapter.shutdown().unwrap();
    }
}
