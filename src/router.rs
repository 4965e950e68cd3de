//! Routes named push events to handlers.
//!
//! Handlers are kept in an explicit list per event name. Whoever attaches a
//! handler holds its [`SubscriptionId`] and detaches it on teardown, so the
//! same handler never ends up registered twice across reconnects.

use std::collections::HashMap;

use log::{debug, warn};

use crate::api::events::{IncomingEvent, ServerEvent, STORE_EVENTS};
use crate::error::Result;
use crate::store::{ChatState, ChatUpdate};

pub type Handler = Box<dyn Fn(&mut ChatState, &IncomingEvent) -> Result<Option<ChatUpdate>> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct EventRouter {
    next_id: u64,
    handlers: HashMap<String, Vec<(SubscriptionId, Handler)>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&mut ChatState, &IncomingEvent) -> Result<Option<ChatUpdate>> + Send + 'static,
    {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.handlers
            .entry(event.to_string())
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    pub fn off(&mut self, id: SubscriptionId) -> bool {
        let mut removed = false;
        self.handlers.retain(|_, list| {
            let before = list.len();
            list.retain(|(sub, _)| *sub != id);
            removed |= list.len() != before;
            !list.is_empty()
        });
        removed
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    pub fn subscriptions(&self, event: &str) -> usize {
        self.handlers.get(event).map_or(0, Vec::len)
    }

    /// Subscribes the store reducers to the five store events.
    pub fn attach_store_handlers(&mut self) -> Vec<SubscriptionId> {
        STORE_EVENTS
            .iter()
            .map(|name| {
                self.on(name, |state, frame| {
                    Ok(ServerEvent::decode(frame)?.map(|event| state.apply(event)))
                })
            })
            .collect()
    }

    /// Runs every handler subscribed to the frame's name, in registration order.
    /// A handler that fails is logged and skipped; the others still run.
    pub fn dispatch(&self, state: &mut ChatState, frame: &IncomingEvent) -> Vec<ChatUpdate> {
        let Some(list) = self.handlers.get(&frame.event) else {
            debug!("no handler for event {}", frame.event);
            return Vec::new();
        };
        let mut updates = Vec::new();
        for (id, handler) in list {
            match handler(state, frame) {
                Ok(Some(update)) => updates.push(update),
                Ok(None) => {}
                Err(e) => warn!("dropping {} event (subscription {:?}): {}", frame.event, id, e),
            }
        }
        updates
    }
}
