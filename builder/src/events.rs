//! Build event stream

use dib_models::BuildEvent;
use tokio::sync::mpsc;

/// Sends build progress to an optional consumer, and mirrors it to `tracing`.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<BuildEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<BuildEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub async fn info(&self, message: String) {
        tracing::info!("{message}");
        self.send(BuildEvent::Info(message)).await;
    }
    pub async fn debug(&self, message: String) {
        tracing::debug!("{message}");
        self.send(BuildEvent::Debug(message)).await;
    }
    pub async fn stdout(&self, line: String) {
        tracing::debug!(target: "dib::output", "{line}");
        self.send(BuildEvent::Stdout(line)).await;
    }
    pub async fn stderr(&self, line: String) {
        tracing::debug!(target: "dib::output", "{line}");
        self.send(BuildEvent::Stderr(line)).await;
    }
    pub async fn error(&self, message: String) {
        tracing::error!("{message}");
        self.send(BuildEvent::Error(message)).await;
    }

    async fn send(&self, event: BuildEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event).await;
        }
    }
}
