//! PendingReply: caller-side handle for a registered request.
//!
//! Returned by [`RequestBuilder::register`](super::RequestBuilder::register)
//! together with the outbound envelope. Awaiting [`PendingReply::wait`]
//! yields the matching reply, or `Timeout` once the request's deadline has
//! passed. Dropping the handle deregisters the request.

use std::sync::Arc;
use std::time::Duration;

use courier_core::{CorrelationToken, Envelope, TimeProvider, TokioTimeProvider};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use super::pending::{EntryId, PendingTable, ReplyResult};
use crate::error::ReplyError;

/// Handle for one outstanding request.
#[must_use = "dropping a PendingReply deregisters the request"]
pub struct PendingReply<T: TimeProvider = TokioTimeProvider> {
    token: CorrelationToken,
    id: EntryId,
    deadline: Duration,
    receiver: oneshot::Receiver<ReplyResult>,
    table: Arc<PendingTable>,
    time: T,
    settled: bool,
}

impl<T: TimeProvider> PendingReply<T> {
    pub(crate) fn new(
        token: CorrelationToken,
        id: EntryId,
        deadline: Duration,
        receiver: oneshot::Receiver<ReplyResult>,
        table: Arc<PendingTable>,
        time: T,
    ) -> Self {
        Self {
            token,
            id,
            deadline,
            receiver,
            table,
            time,
            settled: false,
        }
    }

    /// Token the reply must carry.
    pub fn token(&self) -> &CorrelationToken {
        &self.token
    }

    /// Deadline, on the router's time provider clock.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Wait for the reply.
    ///
    /// Resolves with the reply envelope, or with `Timeout` if the deadline
    /// passes first. When a reply and the deadline race, whichever removes
    /// the entry from the table decides the outcome.
    pub async fn wait(mut self) -> Result<Envelope, ReplyError> {
        let remaining = self.deadline.saturating_sub(self.time.now());
        let result = match self.time.timeout(remaining, &mut self.receiver).await {
            Ok(delivered) => delivered.unwrap_or(Err(ReplyError::Abandoned)),
            Err(_) => {
                if self.table.expire(&self.token, self.id) {
                    Err(ReplyError::Timeout)
                } else {
                    // Lost the race: the remover is about to deliver.
                    (&mut self.receiver)
                        .await
                        .unwrap_or(Err(ReplyError::Abandoned))
                }
            }
        };
        self.settled = true;
        result
    }

    /// Deregister the request without waiting. Returns false if it had
    /// already been resolved, expired or closed; a later request reusing
    /// the token is left alone.
    pub fn abandon(mut self) -> bool {
        self.settled = true;
        self.table.abandon(&self.token, Some(self.id))
    }
}

impl<T: TimeProvider> Drop for PendingReply<T> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        // An empty, open slot means the entry is still in the table.
        if matches!(self.receiver.try_recv(), Err(TryRecvError::Empty)) {
            self.table.abandon(&self.token, Some(self.id));
        }
    }
}

impl<T: TimeProvider> std::fmt::Debug for PendingReply<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingReply")
            .field("token", &self.token)
            .field("deadline", &self.deadline)
            .field("settled", &self.settled)
            .finish()
    }
}
