pub mod telegram;
pub mod update;

use update::ChatKind;

/// A text message pulled out of a webhook update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Chat to reply into
    pub chat_id: i64,
    /// Kind of chat the message came from
    pub chat_kind: ChatKind,
    /// The message text (or media caption), never blank
    pub text: String,
}
