use crate::models::{PipelineProcess, ProcessSummary};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// Events of one organization run, delivered in stage order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ProgressEvent {
    Progress(PipelineProcess),
    #[serde(rename_all = "camelCase")]
    Completed {
        process_id: String,
        organized_text: String,
        summary: ProcessSummary,
    },
    #[serde(rename_all = "camelCase")]
    Error { process_id: String, message: String },
    #[serde(rename_all = "camelCase")]
    Cancelled { process_id: String },
}

impl ProgressEvent {
    pub fn process_id(&self) -> &str {
        match self {
            ProgressEvent::Progress(process) => &process.id,
            ProgressEvent::Completed { process_id, .. }
            | ProgressEvent::Error { process_id, .. }
            | ProgressEvent::Cancelled { process_id } => process_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Progress(_))
    }
}

/// Sending half handed to a running pipeline. A sink without a subscriber drops events.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    sender: Option<UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    pub fn channel() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: ProgressEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        if let Err(error) = sender.send(event) {
            debug!(process_id = %error.0.process_id(), "progress subscriber is gone, event dropped");
        }
    }
}
