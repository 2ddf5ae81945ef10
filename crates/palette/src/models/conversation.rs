use super::message::Message;
use super::role::Role;

/// The turns of a single chat session, oldest first.
///
/// Turns can only be appended; nothing reorders or removes them once recorded.
/// The conversation lives in process memory and is gone when the session ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a conversation from `(user, assistant)` exchanges, the history shape most chat UIs keep
    pub fn from_pairs<I, U, A>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (U, A)>,
        U: Into<String>,
        A: Into<String>,
    {
        let mut conversation = Self::new();
        for (user, assistant) in pairs {
            conversation.record_exchange(user, assistant);
        }
        conversation
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append a completed exchange: the user's prompt followed by the assistant's reply
    pub fn record_exchange<U: Into<String>, A: Into<String>>(&mut self, prompt: U, reply: A) {
        self.push(Message::user().with_text(prompt));
        self.push(Message::assistant().with_text(reply));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_role(&self) -> Option<Role> {
        self.messages.last().map(|message| message.role)
    }

    /// The history followed by a new user turn, leaving the conversation itself untouched
    pub fn with_prompt(&self, prompt: &str) -> Vec<Message> {
        let mut messages = self.messages.clone();
        messages.push(Message::user().with_text(prompt));
        messages
    }
}

impl FromIterator<Message> for Conversation {
    fn from_iter<T: IntoIterator<Item = Message>>(iter: T) -> Self {
        Self {
            messages: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turns_keep_chronological_order() {
        let mut conversation = Conversation::new();
        conversation.record_exchange("first", "one");
        conversation.record_exchange("second", "two");
        conversation.push(Message::user().with_text("third"));

        let texts: Vec<String> = conversation.messages().iter().map(Message::text).collect();
        assert_eq!(texts, vec!["first", "one", "second", "two", "third"]);

        let roles: Vec<Role> = conversation.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(conversation.last_role(), Some(Role::User));
    }

    #[test]
    fn test_from_pairs() {
        let conversation = Conversation::from_pairs(vec![("hi", "hello"), ("how are you?", "fine")]);
        assert_eq!(conversation.len(), 4);
        assert_eq!(conversation.messages()[2].text(), "how are you?");
        assert_eq!(conversation.messages()[3].role, Role::Assistant);
    }

    #[test]
    fn test_with_prompt_does_not_mutate_history() {
        let conversation = Conversation::from_pairs(vec![("hi", "hello")]);
        let messages = conversation.with_prompt("next");

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].role, Role::User);
        assert_eq!(messages[2].text(), "next");
        assert_eq!(conversation.len(), 2);
    }

    #[test]
    fn test_empty_conversation() {
        let conversation = Conversation::new();
        assert!(conversation.is_empty());
        assert_eq!(conversation.last_role(), None);
        assert_eq!(conversation.with_prompt("only").len(), 1);
    }
}
