//! Assistant reply source.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::conversations::config::ReplyConfig;
use crate::conversations::errors::ConversationResult;
use crate::conversations::ids::ConversationId;

/// Boxed future type for responder calls.
pub type ReplyFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Produces assistant content for a user message.
pub trait Responder: Send + Sync {
    /// Reply to `user_content` posted in `conversation_id`.
    ///
    /// # Errors
    /// Returns an error if no reply can be produced.
    fn reply<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        user_content: &'a str,
    ) -> ReplyFuture<'a, ConversationResult<String>>;
}

/// Fixed reply after a fixed delay.
#[derive(Clone, Debug)]
pub struct StubResponder {
    delay: Duration,
    content: String,
}

impl StubResponder {
    /// Build from explicit values.
    #[must_use]
    pub fn new(delay: Duration, content: impl Into<String>) -> Self {
        Self {
            delay,
            content: content.into(),
        }
    }

    /// Build from configuration.
    #[must_use]
    pub fn from_config(config: &ReplyConfig) -> Self {
        Self::new(config.delay(), config.content.clone())
    }
}

impl Default for StubResponder {
    fn default() -> Self {
        Self::from_config(&ReplyConfig::default())
    }
}

impl Responder for StubResponder {
    fn reply<'a>(
        &'a self,
        _conversation_id: &'a ConversationId,
        _user_content: &'a str,
    ) -> ReplyFuture<'a, ConversationResult<String>> {
        Box::pin(async move {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(self.content.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_stub_waits_then_replies() {
        let stub = StubResponder::default();
        let started = tokio::time::Instant::now();
        let reply = stub.reply(&ConversationId::new(), "hi").await.unwrap();
        assert_eq!(
            reply,
            "I'll help you with that. Let me process your request..."
        );
        assert!(started.elapsed() >= Duration::from_millis(1000));
    }
}
