//! Parley - Voice-driven project assistant
//!
//! Main entry point. Runs the session coordinator and drives it from
//! stdin so the controller can be exercised without a frontend:
//!
//! - `/start`, `/stop` control the voice session
//! - `/show`, `/hide` simulate host visibility changes
//! - `/video <name>` reports a watched-video change
//! - `/reset` clears the conversation
//! - `/quit` shuts everything down
//! - any other line is sent as a typed question

use anyhow::Result;
use crossbeam_channel::{unbounded, TryRecvError};
use parley::session::{Coordinator, SessionEvent};
use parley::SessionConfig;
use std::io::BufRead;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Parley voice controller");

    // Optional config file path as the first argument, then env overrides
    let config = match std::env::args().nth(1) {
        Some(path) => SessionConfig::from_file(path)?,
        None => SessionConfig::default(),
    }
    .apply_env();

    let (coordinator, handle) = Coordinator::new(config)?;
    let mut worker_handles = coordinator.start()?;

    for message in handle.chat().all() {
        println!("[{}] {}", message.sender, message.content);
    }
    for question in parley::chat::SUGGESTED_QUESTIONS {
        println!("[suggested] {}", question);
    }

    // Read stdin on a separate thread so the main loop stays free to
    // print events as they arrive. The thread is not joined: it may sit in
    // a blocking read when the session shuts down.
    let (line_tx, line_rx) = unbounded::<String>();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line).is_err() {
                break;
            }
        }
        // EOF counts as quit
        let _ = line_tx.send("/quit".to_string());
    });

    let mut shutdown_sent = false;
    loop {
        match line_rx.try_recv() {
            Ok(line) => {
                let line = line.trim();
                match line {
                    "" => {}
                    "/start" => handle.start()?,
                    "/stop" => handle.stop()?,
                    "/show" => handle.set_visibility(true)?,
                    "/hide" => handle.set_visibility(false)?,
                    "/reset" => handle.reset_conversation()?,
                    "/quit" => handle.shutdown()?,
                    _ => {
                        if let Some(name) = line.strip_prefix("/video ") {
                            handle.video_changed(name, name, None)?;
                        } else {
                            handle.send_text(line.to_string())?;
                        }
                    }
                }
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                if !shutdown_sent {
                    handle.shutdown()?;
                    shutdown_sent = true;
                }
            }
        }

        // Drain pending session events
        while let Some(event) = handle.try_recv_event() {
            match event {
                SessionEvent::StateChanged => {
                    info!(state = %handle.state().voice_state(), "state changed");
                }
                SessionEvent::Message(message) => {
                    println!("[{}] {}", message.sender, message.content);
                }
                SessionEvent::Navigate(direction) => {
                    println!("[navigate] {:?}", direction);
                }
                SessionEvent::Error(error) => {
                    warn!("Session error: {}", error);
                    eprintln!("error: {}", error);
                }
                SessionEvent::Shutdown => {
                    info!("Session shut down");
                    for worker in worker_handles.drain(..) {
                        let _ = worker.join();
                    }
                    return Ok(());
                }
            }
        }

        std::thread::sleep(Duration::from_millis(10));
    }
}
