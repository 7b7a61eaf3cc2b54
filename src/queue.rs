//! Outbound queue boundary for asynchronous catalog fetches.
//!
//! The transport mechanics live outside this core; the classify step only
//! needs to hand newly discovered catalog numbers to a publisher.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Message published per newly discovered catalog number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OclcFetchMessage {
    #[serde(rename = "oclcNo")]
    pub oclc_no: String,
}

pub trait QueuePublisher: Send + Sync {
    fn publish(&self, message: &OclcFetchMessage) -> Result<()>;
}

/// Publisher that only logs the outgoing message; used when no queue
/// transport is wired up (dry runs, the CLI).
pub struct LogPublisher;

impl QueuePublisher for LogPublisher {
    fn publish(&self, message: &OclcFetchMessage) -> Result<()> {
        info!(message = %serde_json::to_string(message)?, "outbound catalog fetch");
        Ok(())
    }
}

/// In-memory publisher collecting messages for assertions.
pub struct CollectingPublisher {
    messages: std::sync::Mutex<Vec<OclcFetchMessage>>,
}

impl CollectingPublisher {
    pub fn new() -> Self {
        Self {
            messages: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn messages(&self) -> Vec<OclcFetchMessage> {
        self.messages.lock().unwrap().clone()
    }
}

impl Default for CollectingPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl QueuePublisher for CollectingPublisher {
    fn publish(&self, message: &OclcFetchMessage) -> Result<()> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}
