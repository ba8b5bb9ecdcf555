//! Change notification for stores.

use std::fmt;

pub type SubscriptionId = u64;

type Listener<S> = Box<dyn Fn(&S) + Send + Sync>;

/// Listener registry owned by a store. Listeners run synchronously, in
/// subscription order, after every state change.
pub struct Subscribers<S> {
    next_id: SubscriptionId,
    listeners: Vec<(SubscriptionId, Listener<S>)>,
}

impl<S> Subscribers<S> {
    pub fn new() -> Self {
        Self { next_id: 1, listeners: Vec::new() }
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: Fn(&S) + Send + Sync + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn notify(&self, state: &S) {
        for (_, listener) in &self.listeners {
            listener(state);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<S> Default for Subscribers<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for Subscribers<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
