//! Telegram webhook payloads.
//!
//! Only the fields the relay reads are modelled; everything else in the
//! update is ignored during deserialization.

use serde::Deserialize;

use super::IncomingMessage;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub update_id: Option<i64>,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub edited_message: Option<Message>,
    #[serde(default)]
    pub channel_post: Option<Message>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub chat: Option<Chat>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: ChatKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Message {
    /// Text if present, otherwise the media caption. Blank values count as absent.
    fn body(&self) -> Option<&str> {
        [self.text.as_deref(), self.caption.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
    }

    fn to_incoming(&self) -> Option<IncomingMessage> {
        let chat = self.chat.as_ref()?;
        let text = self.body()?;
        Some(IncomingMessage {
            chat_id: chat.id,
            chat_kind: chat.kind,
            text: text.to_string(),
        })
    }
}

impl Update {
    /// Normalizes the update into a chat id and text.
    ///
    /// Subtypes are checked in order `message`, `edited_message`,
    /// `channel_post`; the first one with a chat and some text wins. Returns
    /// `None` for updates without text (stickers, joins, polls and so on).
    pub fn extract(&self) -> Option<IncomingMessage> {
        [&self.message, &self.edited_message, &self.channel_post]
            .into_iter()
            .flatten()
            .find_map(Message::to_incoming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Update {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_plain_private_message() {
        let update = parse(json!({
            "update_id": 1,
            "message": {
                "message_id": 5,
                "from": {"id": 42, "is_bot": false, "first_name": "Ann"},
                "chat": {"id": 42, "type": "private", "first_name": "Ann"},
                "date": 1700000000,
                "text": "hello"
            }
        }));
        let incoming = update.extract().unwrap();
        assert_eq!(incoming.chat_id, 42);
        assert_eq!(incoming.chat_kind, ChatKind::Private);
        assert_eq!(incoming.text, "hello");
    }

    #[test]
    fn test_message_takes_precedence_over_channel_post() {
        let update = parse(json!({
            "message": {"chat": {"id": 1, "type": "private"}, "text": "from message"},
            "channel_post": {"chat": {"id": 2, "type": "channel"}, "text": "from channel"}
        }));
        let incoming = update.extract().unwrap();
        assert_eq!(incoming.chat_id, 1);
        assert_eq!(incoming.text, "from message");
    }

    #[test]
    fn test_edited_message_before_channel_post() {
        let update = parse(json!({
            "edited_message": {"chat": {"id": 3, "type": "group"}, "text": "edited"},
            "channel_post": {"chat": {"id": 2, "type": "channel"}, "text": "post"}
        }));
        let incoming = update.extract().unwrap();
        assert_eq!(incoming.chat_id, 3);
        assert_eq!(incoming.chat_kind, ChatKind::Group);
    }

    #[test]
    fn test_caption_used_when_text_missing() {
        let update = parse(json!({
            "message": {
                "chat": {"id": 7, "type": "private"},
                "photo": [{"file_id": "abc"}],
                "caption": "look at this"
            }
        }));
        assert_eq!(update.extract().unwrap().text, "look at this");
    }

    #[test]
    fn test_blank_text_falls_back_to_next_subtype() {
        let update = parse(json!({
            "message": {"chat": {"id": 1, "type": "private"}, "text": "   "},
            "channel_post": {"chat": {"id": 9, "type": "channel"}, "text": "post"}
        }));
        let incoming = update.extract().unwrap();
        assert_eq!(incoming.chat_id, 9);
        assert_eq!(incoming.chat_kind, ChatKind::Channel);
    }

    #[test]
    fn test_no_content_cases() {
        // Sticker without caption
        let sticker = parse(json!({
            "message": {"chat": {"id": 1, "type": "private"}, "sticker": {"file_id": "x"}}
        }));
        assert!(sticker.extract().is_none());

        // Membership event
        let member = parse(json!({
            "my_chat_member": {"chat": {"id": 1, "type": "group"}}
        }));
        assert!(member.extract().is_none());

        // Message without chat
        let no_chat = parse(json!({"message": {"text": "orphan"}}));
        assert!(no_chat.extract().is_none());

        assert!(parse(json!({})).extract().is_none());
    }

    #[test]
    fn test_unknown_chat_type() {
        let update = parse(json!({
            "message": {"chat": {"id": 1, "type": "forum"}, "text": "hi"}
        }));
        assert_eq!(update.extract().unwrap().chat_kind, ChatKind::Unknown);
    }
}
