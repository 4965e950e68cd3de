use std::collections::HashMap;

use crate::api::models::Conversation;

/// Conversation metadata keyed by id, kept in the order entries were first seen.
#[derive(Debug, Default)]
pub struct ConversationStore {
    entries: Vec<Conversation>,
    index: HashMap<String, usize>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total replacement. A repeated id overwrites the earlier entry in place.
    pub fn replace_all(&mut self, list: Vec<Conversation>) {
        self.clear();
        for conversation in list {
            self.upsert(conversation);
        }
    }

    /// Overwrites the whole entry when the id is known, appends otherwise.
    /// Returns `true` when the conversation was new.
    pub fn upsert(&mut self, conversation: Conversation) -> bool {
        match self.index.get(&conversation.id) {
            Some(&pos) => {
                self.entries[pos] = conversation;
                false
            }
            None => {
                self.index.insert(conversation.id.clone(), self.entries.len());
                self.entries.push(conversation);
                true
            }
        }
    }

    pub fn get_by_id(&self, id: &str) -> Option<&Conversation> {
        self.index.get(id).map(|&pos| &self.entries[pos])
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.index.get(id).map(|&pos| &mut self.entries[pos])
    }

    pub fn get_all(&self) -> &[Conversation] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv(id: &str, unread: u32) -> Conversation {
        let mut c = Conversation::new(id);
        c.unread_count = unread;
        c
    }

    #[test]
    fn upsert_never_duplicates_ids() {
        let mut store = ConversationStore::new();
        for (id, unread) in [("a", 1), ("b", 0), ("a", 3), ("c", 0), ("b", 7), ("a", 0)] {
            store.upsert(conv(id, unread));
        }
        assert_eq!(store.len(), 3);
        let ids: Vec<_> = store.get_all().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(store.get_by_id("b").unwrap().unread_count, 7);
    }

    #[test]
    fn upsert_overwrites_instead_of_merging() {
        let mut store = ConversationStore::new();
        let mut first = conv("a", 2);
        first.last_message_preview = Some("old".into());
        store.upsert(first);
        store.upsert(conv("a", 0));
        assert_eq!(store.get_by_id("a").unwrap().last_message_preview, None);
    }

    #[test]
    fn same_update_twice_is_idempotent() {
        let mut store = ConversationStore::new();
        store.upsert(conv("x", 0));
        let update = conv("a", 4);
        assert!(store.upsert(update.clone()));
        let once: Vec<_> = store.get_all().to_vec();
        assert!(!store.upsert(update));
        assert_eq!(store.get_all(), once.as_slice());
    }

    #[test]
    fn replace_all_is_total_and_ordered() {
        let mut store = ConversationStore::new();
        store.upsert(conv("old", 0));
        store.replace_all(vec![conv("b", 0), conv("a", 0), conv("b", 5)]);
        let ids: Vec<_> = store.get_all().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
        assert_eq!(store.get_by_id("b").unwrap().unread_count, 5);
        assert!(store.get_by_id("old").is_none());
    }
}
