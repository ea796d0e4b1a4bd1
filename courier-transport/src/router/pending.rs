//! Pending-token table: token → expectation for outstanding requests.
//!
//! The table is the only shared mutable state in the router. Every state
//! change (insert, resolve, expire, abandon, close) happens as a single
//! critical section on one `Mutex`, and whichever operation removes an entry
//! owns its continuation. Continuations run after the lock is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use courier_core::{CorrelationToken, Envelope};
use tokio::sync::oneshot;

use crate::error::ReplyError;

/// Identifies one registration. Tokens may be reused once their request
/// leaves the table; ids never are.
pub(crate) type EntryId = u64;

/// Value handed to a pending request's continuation.
pub type ReplyResult = Result<Envelope, ReplyError>;

/// Callback continuation, invoked at most once.
pub(crate) type ReplyCallback = Box<dyn FnOnce(ReplyResult) + Send + 'static>;

/// What to do with the reply once the entry leaves the table.
pub(crate) enum Continuation {
    /// A [`PendingReply`](super::PendingReply) is (or was) waiting on this slot.
    Slot(oneshot::Sender<ReplyResult>),
    /// Caller-supplied callback.
    Callback(ReplyCallback),
}

impl Continuation {
    fn fire(self, token: &CorrelationToken, result: ReplyResult) {
        match self {
            Continuation::Slot(sender) => {
                if sender.send(result).is_err() {
                    tracing::debug!(token = %token, "reply slot dropped before delivery");
                }
            }
            Continuation::Callback(callback) => callback(result),
        }
    }
}

pub(crate) struct PendingEntry {
    pub(crate) continuation: Continuation,
    pub(crate) message_type: String,
    pub(crate) deadline: Duration,
}

/// Why an insert was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InsertError {
    Occupied,
    Full,
    Closed,
}

/// Counters for the lifetime of a router.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingStats {
    /// Requests registered.
    pub registered: u64,
    /// Requests matched by an inbound reply.
    pub resolved: u64,
    /// Requests whose deadline passed.
    pub expired: u64,
    /// Requests deregistered by their caller.
    pub abandoned: u64,
    /// Requests failed by shutdown.
    pub closed: u64,
}

#[derive(Default)]
struct TableState {
    entries: HashMap<CorrelationToken, (EntryId, PendingEntry)>,
    next_id: EntryId,
    closed: bool,
}

impl TableState {
    /// Remove `token` if it is still the registration `id` (any
    /// registration when `id` is `None`).
    fn remove(&mut self, token: &CorrelationToken, id: Option<EntryId>) -> Option<PendingEntry> {
        match self.entries.get(token) {
            Some((current, _)) if id.is_none() || id == Some(*current) => {
                self.entries.remove(token).map(|(_, entry)| entry)
            }
            _ => None,
        }
    }
}

#[derive(Default)]
pub(crate) struct PendingTable {
    state: Mutex<TableState>,
    registered: AtomicU64,
    resolved: AtomicU64,
    expired: AtomicU64,
    abandoned: AtomicU64,
    closed: AtomicU64,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        // Every mutation is one map operation, so a panic elsewhere cannot
        // leave the map half-updated.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `token`, returning the id of this registration. Fails
    /// without side effects if the token is taken, the table is full, or
    /// the table is closed.
    pub(crate) fn insert(
        &self,
        token: CorrelationToken,
        entry: PendingEntry,
        limit: usize,
    ) -> Result<EntryId, (InsertError, PendingEntry)> {
        let mut state = self.lock();
        if state.closed {
            return Err((InsertError::Closed, entry));
        }
        if state.entries.contains_key(&token) {
            return Err((InsertError::Occupied, entry));
        }
        if state.entries.len() >= limit {
            return Err((InsertError::Full, entry));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.entries.insert(token, (id, entry));
        drop(state);

        self.registered.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    /// Hand `envelope` to the entry registered under its token.
    ///
    /// Gives the envelope back when nothing is pending for it.
    pub(crate) fn resolve(&self, envelope: Envelope) -> Result<(), Envelope> {
        let entry = self.lock().remove(envelope.correlation_token(), None);
        let Some(entry) = entry else {
            return Err(envelope);
        };

        self.resolved.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            token = %envelope.correlation_token(),
            request_type = %entry.message_type,
            reply_type = %envelope.message_type(),
            "pending request resolved"
        );
        let token = envelope.correlation_token().clone();
        entry.continuation.fire(&token, Ok(envelope));
        Ok(())
    }

    /// Expire registration `id` of `token`, signaling `Timeout`. Returns
    /// false if that registration was already gone (resolved, abandoned or
    /// expired by someone else), even if the token has been reused since.
    pub(crate) fn expire(&self, token: &CorrelationToken, id: EntryId) -> bool {
        let entry = self.lock().remove(token, Some(id));
        let Some(entry) = entry else {
            return false;
        };

        self.expired.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            token = %token,
            message_type = %entry.message_type,
            "pending request timed out"
        );
        entry.continuation.fire(token, Err(ReplyError::Timeout));
        true
    }

    /// Expire every entry whose deadline is at or before `now`.
    pub(crate) fn expire_overdue(&self, now: Duration) -> usize {
        let overdue: Vec<(CorrelationToken, PendingEntry)> = {
            let mut state = self.lock();
            let tokens: Vec<CorrelationToken> = state
                .entries
                .iter()
                .filter(|(_, (_, entry))| entry.deadline <= now)
                .map(|(token, _)| token.clone())
                .collect();
            tokens
                .into_iter()
                .filter_map(|token| state.remove(&token, None).map(|entry| (token, entry)))
                .collect()
        };

        let count = overdue.len();
        self.expired.fetch_add(count as u64, Ordering::Relaxed);
        for (token, entry) in overdue {
            tracing::warn!(
                token = %token,
                message_type = %entry.message_type,
                "pending request timed out"
            );
            entry.continuation.fire(&token, Err(ReplyError::Timeout));
        }
        count
    }

    /// Deregister `token` without invoking its continuation. With `id`, only
    /// that registration is removed.
    pub(crate) fn abandon(&self, token: &CorrelationToken, id: Option<EntryId>) -> bool {
        let removed = self.lock().remove(token, id).is_some();
        if removed {
            self.abandoned.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(token = %token, "pending request abandoned");
        }
        removed
    }

    /// Close the table and fail every entry with `RouterClosed`.
    pub(crate) fn close(&self) -> usize {
        let drained: Vec<(CorrelationToken, PendingEntry)> = {
            let mut state = self.lock();
            state.closed = true;
            state
                .entries
                .drain()
                .map(|(token, (_, entry))| (token, entry))
                .collect()
        };

        let count = drained.len();
        self.closed.fetch_add(count as u64, Ordering::Relaxed);
        for (token, entry) in drained {
            entry.continuation.fire(&token, Err(ReplyError::RouterClosed));
        }
        count
    }

    pub(crate) fn contains(&self, token: &CorrelationToken) -> bool {
        self.lock().entries.contains_key(token)
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub(crate) fn stats(&self) -> PendingStats {
        PendingStats {
            registered: self.registered.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            closed: self.closed.load(Ordering::Relaxed),
        }
    }
}
