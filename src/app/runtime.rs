use super::{MapeoApp, ShutdownReason};
use crate::error::{EventBusError, MapeoError, Result};
use crate::events::{EventFilter, EventReceiver, MapeoEvent};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{info, warn};

type SharedSender = Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>;

async fn send_shutdown(sender: &SharedSender, reason: ShutdownReason) {
    if let Some(sender) = sender.lock().await.take() {
        let _ = sender.send(reason);
    }
}

impl MapeoApp {
    /// Run until a signal, a quit request or the configured duration ends the run
    pub async fn run(&mut self) -> Result<i32> {
        info!("mapeo is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| MapeoError::system("Shutdown sender already taken"))?;
        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| MapeoError::system("Shutdown receiver already taken"))?;
        let shutdown_sender: SharedSender = Arc::new(Mutex::new(Some(shutdown_sender)));

        self.setup_signal_handlers(&shutdown_sender);
        self.watch_shutdown_requests(&shutdown_sender);
        if let Some(limit) = self.options.duration {
            let sender = Arc::clone(&shutdown_sender);
            let token = self.cancellation_token.clone();
            self.background_tasks.push(tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(limit) => {
                        info!("Run duration of {:?} elapsed", limit);
                        send_shutdown(&sender, ShutdownReason::DurationElapsed).await;
                    }
                }
            }));
        }

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| MapeoError::system("Shutdown channel closed unexpectedly"))?;
        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown(&shutdown_reason).await?;
        info!("mapeo shutdown complete");
        Ok(exit_code)
    }

    fn setup_signal_handlers(&mut self, shutdown_sender: &SharedSender) {
        #[cfg(unix)]
        {
            let sender = Arc::clone(shutdown_sender);
            self.background_tasks.push(tokio::spawn(async move {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        if sigterm.recv().await.is_some() {
                            info!("Received SIGTERM signal");
                            send_shutdown(&sender, ShutdownReason::Signal("SIGTERM".to_string()))
                                .await;
                        }
                    }
                    Err(e) => warn!("Failed to register SIGTERM handler: {}", e),
                }
            }));
        }

        let sender = Arc::clone(shutdown_sender);
        self.background_tasks.push(tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                send_shutdown(&sender, ShutdownReason::Signal("SIGINT".to_string())).await;
            }
        }));
    }

    /// Turn `ShutdownRequested` events (the keyboard's quit key) into a shutdown
    fn watch_shutdown_requests(&mut self, shutdown_sender: &SharedSender) {
        let mut receiver = EventReceiver::new(
            self.event_bus.subscribe(),
            EventFilter::EventTypes(vec!["shutdown_requested"]),
            "shutdown_watch",
        );
        let sender = Arc::clone(shutdown_sender);
        let token = self.cancellation_token.clone();

        self.background_tasks.push(tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = receiver.recv() => event,
                };
                match event {
                    Ok(MapeoEvent::ShutdownRequested { reason, .. }) => {
                        info!("Shutdown requested: {}", reason);
                        send_shutdown(&sender, ShutdownReason::UserRequest).await;
                        break;
                    }
                    Ok(_) | Err(EventBusError::Lagged { .. }) => {}
                    Err(EventBusError::ChannelClosed) => break,
                }
            }
        }));
    }
}
