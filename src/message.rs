use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Clonable cancellation signal attached to an inbound message.
///
/// Storage row operations check it during the handling phase; rollback
/// ignores it so an open transaction is never left dangling on the
/// connection.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Inbound message context handed to the coordinator by the transport
/// layer.
///
/// The transport redelivers at least once; the coordinator only requires
/// an extractable message id, a cancellation signal, and pass-through
/// access for the downstream handler.
pub trait MessageContext: Send + Sync {
    /// Unique message identifier from the transport envelope. `None` is a
    /// caller contract violation and fails the invocation immediately.
    fn message_id(&self) -> Option<&str>;

    /// Cancellation signal for the handling phase.
    fn cancellation(&self) -> &CancellationToken;

    /// Transport headers, passed through untouched for the handler.
    fn headers(&self) -> &HashMap<String, String>;

    /// Raw message body, passed through untouched for the handler.
    fn body(&self) -> &[u8];
}

/// Plain message context built by transports or tests.
#[derive(Clone, Debug, Default)]
pub struct ReceivedMessage {
    message_id: Option<String>,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    cancellation: CancellationToken,
}

impl ReceivedMessage {
    pub fn new(message_id: impl Into<String>) -> Self {
        ReceivedMessage {
            message_id: Some(message_id.into()),
            ..ReceivedMessage::default()
        }
    }

    /// A message whose envelope carries no id. Processing it is a usage
    /// error; this exists so transports and tests can express the case.
    pub fn without_message_id() -> Self {
        ReceivedMessage::default()
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

impl MessageContext for ReceivedMessage {
    fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    fn body(&self) -> &[u8] {
        &self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_starts_live() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn clones_share_the_signal() {
        let token = CancellationToken::new();
        let other = token.clone();
        other.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn builder_assembles_the_context() {
        let message = ReceivedMessage::new("m1")
            .with_header("content-type", "application/json")
            .with_body(br#"{"n":1}"#.to_vec());

        assert_eq!(message.message_id(), Some("m1"));
        assert_eq!(
            message.headers().get("content-type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(message.body(), br#"{"n":1}"#);
    }

    #[test]
    fn missing_id_is_expressible() {
        assert_eq!(ReceivedMessage::without_message_id().message_id(), None);
    }
}
