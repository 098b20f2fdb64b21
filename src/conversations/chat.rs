//! One user/assistant exchange driven through the store.

use crate::conversations::errors::{ConversationError, ConversationResult};
use crate::conversations::ids::ConversationId;
use crate::conversations::responder::Responder;
use crate::conversations::store::{ConversationStore, PersistOutcome};
use crate::conversations::types::{Message, Role};

/// Messages recorded by [`send_message`].
#[derive(Clone, Debug)]
pub struct ChatTurn {
    /// Conversation that received both messages.
    pub conversation_id: ConversationId,
    /// Whether the conversation was created for this turn.
    pub created: bool,
    /// The user's message.
    pub user: Message,
    /// The assistant's reply.
    pub assistant: Message,
    /// Persistence outcome of the last write in the turn.
    pub persistence: PersistOutcome,
}

/// Send `content` as the user and append the assistant's reply.
///
/// Creates a conversation first when none is selected. Blank content is
/// rejected before anything is created. The reply is appended
/// to the conversation captured before waiting on the responder, not to
/// whatever is current once it answers.
///
/// # Errors
/// Returns an error if the user message is rejected, the responder fails,
/// or the conversation disappeared before the reply arrived.
pub async fn send_message(
    store: &mut ConversationStore,
    responder: &dyn Responder,
    content: &str,
) -> ConversationResult<ChatTurn> {
    if content.trim().is_empty() {
        return Err(ConversationError::InvalidMessage(
            "user message must not be empty".to_string(),
        ));
    }

    let (conversation_id, created) = match store.current_conversation_id() {
        Some(id) => (id.clone(), false),
        None => (store.create_conversation().await.value, true),
    };

    let user = store.compose(Role::User, content);
    store.add_message(&conversation_id, user.clone()).await?;

    let reply = responder.reply(&conversation_id, content).await?;
    let assistant = store.compose(Role::Assistant, reply);
    let committed = store
        .add_message(&conversation_id, assistant.clone())
        .await?;

    Ok(ChatTurn {
        conversation_id,
        created,
        user,
        assistant,
        persistence: committed.persistence,
    })
}
