use std::collections::{HashMap, HashSet};

use crate::api::models::{Message, MessageState};

/// Per-conversation message lists in client-observed order.
#[derive(Debug, Default)]
pub struct MessageStore {
    lists: HashMap<String, Vec<Message>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces one conversation's list. Other conversations are untouched.
    pub fn set_conversation_messages(&mut self, conversation_id: &str, messages: Vec<Message>) {
        self.lists.insert(conversation_id.to_string(), messages);
    }

    /// Installs a history page. Local entries the page does not contain, pending
    /// sends and messages that arrived while the page was in flight, stay after it
    /// in their existing order.
    pub fn load_history(&mut self, conversation_id: &str, page: Vec<Message>) {
        let local = self.lists.remove(conversation_id).unwrap_or_default();
        let paged: HashSet<String> = page.iter().filter_map(|m| m.id().map(str::to_string)).collect();
        self.set_conversation_messages(conversation_id, page);
        for message in local {
            if message.id().is_none_or(|id| !paged.contains(id)) {
                self.append_local(conversation_id, message);
            }
        }
    }

    /// Appends to the end of the list, creating it when the conversation is unknown.
    /// A canonical message whose id is already present overwrites that entry instead.
    pub fn append_local(&mut self, conversation_id: &str, message: Message) {
        let list = self.lists.entry(conversation_id.to_string()).or_default();
        if let Some(id) = message.id() {
            if let Some(pos) = list.iter().position(|m| m.id() == Some(id)) {
                list[pos] = message;
                return;
            }
        }
        list.push(message);
    }

    /// Swaps the optimistic entry carrying `temp_id` for `message` at the same index.
    /// Falls back to [`append_local`](Self::append_local) when no such entry exists.
    pub fn replace_by_temp_id(&mut self, conversation_id: &str, temp_id: &str, message: Message) {
        let list = self.lists.entry(conversation_id.to_string()).or_default();
        let Some(pos) = list.iter().position(|m| m.temp_id() == Some(temp_id)) else {
            self.append_local(conversation_id, message);
            return;
        };
        if let Some(id) = message.id() {
            let id = id.to_string();
            list[pos] = message;
            let mut index = 0;
            list.retain(|m| {
                let keep = index == pos || m.id() != Some(id.as_str());
                index += 1;
                keep
            });
        } else {
            list[pos] = message;
        }
    }

    /// Flips a `Sending` entry to `Failed`. Returns whether an entry changed.
    pub fn mark_failed(&mut self, conversation_id: &str, temp_id: &str) -> bool {
        let Some(list) = self.lists.get_mut(conversation_id) else {
            return false;
        };
        let target = list
            .iter_mut()
            .find(|m| matches!(&m.state, MessageState::Sending { temp_id: t } if t == temp_id));
        match target {
            Some(message) => {
                message.state = MessageState::Failed { temp_id: temp_id.to_string() };
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self, conversation_id: &str) {
        self.lists.remove(conversation_id);
    }

    pub fn get(&self, conversation_id: &str) -> &[Message] {
        self.lists.get(conversation_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.lists.contains_key(conversation_id)
    }

    pub(crate) fn clear_all(&mut self) {
        self.lists.clear();
    }
}
