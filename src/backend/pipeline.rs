//! Ask pipeline for dispatching questions off the coordinator thread
//!
//! Channel-based worker in the same shape as the capture and playback
//! adapters: commands in, events out, one worker thread with its own tokio
//! runtime for the HTTP calls. The pipeline never drops or retries; every
//! ask yields exactly one answer event (possibly the fallback answer), and
//! stale-answer suppression is the coordinator's job via the generation tag.

use crate::backend::client::BackendClient;
use crate::{ParleyError, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tokio::runtime::Runtime;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Commands accepted by the ask pipeline
#[derive(Debug, Clone)]
pub enum AskCommand {
    /// Dispatch one question to the backend
    Ask {
        /// Project whose documents back the answer
        project_id: i64,
        /// The user's question
        question: String,
        /// Unique request ID for tracking
        request_id: Uuid,
        /// Session generation this ask belongs to
        generation: u64,
    },

    /// Shutdown the pipeline
    Shutdown,
}

/// Events emitted by the ask pipeline
#[derive(Debug, Clone)]
pub enum AskEvent {
    /// The backend's answer (or the fallback answer on failure)
    Answer {
        /// Answer text
        text: String,
        /// Request ID this answer belongs to
        request_id: Uuid,
        /// Session generation the ask was issued under
        generation: u64,
    },

    /// Pipeline has shut down
    Shutdown,
}

/// Ask pipeline with channel-based communication
pub struct AskPipeline {
    client: BackendClient,
    command_tx: Sender<AskCommand>,
    command_rx: Receiver<AskCommand>,
    event_tx: Sender<AskEvent>,
    event_rx: Receiver<AskEvent>,
}

impl AskPipeline {
    /// Create a new ask pipeline
    pub fn new(client: BackendClient, buffer_size: usize) -> Self {
        let (command_tx, command_rx) = bounded(buffer_size);
        let (event_tx, event_rx) = bounded(buffer_size);

        Self {
            client,
            command_tx,
            command_rx,
            event_tx,
            event_rx,
        }
    }

    /// Get a sender for commands
    pub fn command_sender(&self) -> Sender<AskCommand> {
        self.command_tx.clone()
    }

    /// Get a receiver for events
    pub fn event_receiver(&self) -> Receiver<AskEvent> {
        self.event_rx.clone()
    }

    /// Start the pipeline worker thread
    pub fn start_worker(self) -> Result<JoinHandle<()>> {
        let client = self.client;
        let command_rx = self.command_rx;
        let event_tx = self.event_tx;

        let handle = thread::Builder::new()
            .name("ask-pipeline".into())
            .spawn(move || {
                info!("Ask pipeline worker starting");

                let runtime = match Runtime::new() {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!("Failed to create tokio runtime: {}", e);
                        let _ = event_tx.send(AskEvent::Shutdown);
                        return;
                    }
                };

                loop {
                    match command_rx.recv() {
                        Ok(AskCommand::Ask {
                            project_id,
                            question,
                            request_id,
                            generation,
                        }) => {
                            debug!(%request_id, generation, "processing ask");

                            // ask() substitutes the fallback answer internally,
                            // so every request resolves to exactly one event
                            let text = runtime.block_on(client.ask(project_id, &question));

                            if event_tx
                                .send(AskEvent::Answer {
                                    text,
                                    request_id,
                                    generation,
                                })
                                .is_err()
                            {
                                error!("Answer channel disconnected");
                                break;
                            }
                        }

                        Ok(AskCommand::Shutdown) => {
                            info!("Ask pipeline worker shutting down");
                            let _ = event_tx.send(AskEvent::Shutdown);
                            break;
                        }

                        Err(e) => {
                            error!("Command channel error: {}", e);
                            break;
                        }
                    }
                }

                info!("Ask pipeline worker stopped");
            })
            .map_err(|e| ParleyError::ChannelError(format!("Failed to spawn worker: {}", e)))?;

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::client::FALLBACK_ANSWER;

    fn unreachable_client() -> BackendClient {
        BackendClient::new("http://192.0.2.1:1", 1).unwrap()
    }

    #[test]
    fn test_pipeline_creation() {
        let pipeline = AskPipeline::new(unreachable_client(), 10);
        let _cmd_tx = pipeline.command_sender();
        let _event_rx = pipeline.event_receiver();
    }

    #[test]
    fn test_failed_ask_yields_fallback_event() {
        let pipeline = AskPipeline::new(unreachable_client(), 10);
        let command_tx = pipeline.command_sender();
        let event_rx = pipeline.event_receiver();
        let handle = pipeline.start_worker().unwrap();

        let request_id = Uuid::new_v4();
        command_tx
            .send(AskCommand::Ask {
                project_id: 1,
                question: "what is the timeline".to_string(),
                request_id,
                generation: 7,
            })
            .unwrap();

        match event_rx.recv().unwrap() {
            AskEvent::Answer {
                text,
                request_id: id,
                generation,
            } => {
                assert_eq!(text, FALLBACK_ANSWER);
                assert_eq!(id, request_id);
                assert_eq!(generation, 7);
            }
            AskEvent::Shutdown => panic!("Expected Answer event"),
        }

        command_tx.send(AskCommand::Shutdown).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_shutdown() {
        let pipeline = AskPipeline::new(unreachable_client(), 10);
        let command_tx = pipeline.command_sender();
        let event_rx = pipeline.event_receiver();
        let handle = pipeline.start_worker().unwrap();

        command_tx.send(AskCommand::Shutdown).unwrap();
        assert!(matches!(event_rx.recv().unwrap(), AskEvent::Shutdown));
        handle.join().unwrap();
    }
}
