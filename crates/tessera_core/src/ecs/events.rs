//! # World Events
//!
//! Synchronous subscriber lists for world lifecycle events.
//!
//! Handlers receive the world mutably, so the list is taken out of the world
//! while it is being dispatched. Subscriptions added during dispatch are kept
//! but only see later events; unsubscribing during dispatch takes effect once
//! the dispatch finishes. Once a list is closed at world teardown, handlers
//! taken out for a dispatch still in progress are dropped when it ends.

use super::entity::Entity;
use super::world::World;

/// Token returned by a subscription, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// Called after an entity has been destroyed.
pub type EntityDestroyedHandler = Box<dyn FnMut(&mut World, Entity)>;

/// Called once while the world is being torn down.
pub type WorldDestroyedHandler = Box<dyn FnMut(&mut World)>;

/// Called when the world is reset, before system groups are reset.
pub type ResetHook = Box<dyn FnMut(&mut World)>;

pub(crate) struct HandlerList<H> {
    next_id: u64,
    handlers: Vec<(Subscription, H)>,
    cancelled: Vec<Subscription>,
    dispatching: bool,
    closed: bool,
}

impl<H> Default for HandlerList<H> {
    fn default() -> Self {
        Self {
            next_id: 0,
            handlers: Vec::new(),
            cancelled: Vec::new(),
            dispatching: false,
            closed: false,
        }
    }
}

impl<H> HandlerList<H> {
    pub(crate) fn subscribe(&mut self, handler: H) -> Subscription {
        let subscription = Subscription(self.next_id);
        self.next_id += 1;
        if !self.closed {
            self.handlers.push((subscription, handler));
        }
        subscription
    }

    pub(crate) fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        if let Some(pos) = self.handlers.iter().position(|(s, _)| *s == subscription) {
            self.handlers.remove(pos);
            return true;
        }
        if self.dispatching && subscription.0 < self.next_id {
            self.cancelled.push(subscription);
            return true;
        }
        false
    }

    /// Checks whether a handler taken out for dispatch was unsubscribed meanwhile.
    pub(crate) fn is_cancelled(&self, subscription: Subscription) -> bool {
        self.cancelled.contains(&subscription)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub(crate) fn is_dispatching(&self) -> bool {
        self.dispatching
    }

    /// Takes the handlers out for dispatch.
    pub(crate) fn begin_dispatch(&mut self) -> Vec<(Subscription, H)> {
        self.dispatching = true;
        std::mem::take(&mut self.handlers)
    }

    /// Puts dispatched handlers back ahead of any added meanwhile.
    pub(crate) fn end_dispatch(&mut self, taken: Vec<(Subscription, H)>) {
        self.dispatching = false;
        if self.closed {
            return;
        }
        let added = std::mem::replace(&mut self.handlers, taken);
        self.handlers.extend(added);
        if !self.cancelled.is_empty() {
            let cancelled = std::mem::take(&mut self.cancelled);
            self.handlers.retain(|(s, _)| !cancelled.contains(s));
        }
    }

    /// Drops every handler and refuses new ones.
    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.handlers.clear();
        self.cancelled.clear();
    }
}
