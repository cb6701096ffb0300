use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::RequestError;
use crate::method::Method;
use crate::wire::ResponseBody;

/// Payload of an accepted response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// `data` of a JSON response (`Null` when absent).
    Json(Value),
    /// Body of a binary response.
    Binary(ResponseBody),
}

/// Outcome delivered to a waiting caller.
pub type Outcome = Result<Response, RequestError>;

struct PendingRequest {
    method: Method,
    tx: oneshot::Sender<Outcome>,
}

/// Assigns request ids and correlates responses with waiting callers.
///
/// Ids are 32-bit and wrap from `u32::MAX` back to 1; 0 is never issued.
/// Uniqueness is only required among pending requests.
pub struct RequestTracker {
    next_id: u32,
    pending: HashMap<u32, PendingRequest>,
    closed: bool,
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestTracker {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            pending: HashMap::new(),
            closed: false,
        }
    }

    /// Advance the id counter and return the new id.
    pub fn next_id(&mut self) -> u32 {
        self.next_id = if self.next_id < u32::MAX {
            self.next_id + 1
        } else {
            1
        };
        self.next_id
    }

    /// Store a pending request and return the receiver its outcome arrives on.
    ///
    /// Fails with [`RequestError::ChannelClosed`] once [`reject_all`](Self::reject_all)
    /// has run.
    pub fn register(
        &mut self,
        id: u32,
        method: Method,
    ) -> Result<oneshot::Receiver<Outcome>, RequestError> {
        if self.closed {
            return Err(RequestError::ChannelClosed);
        }
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, PendingRequest { method, tx });
        Ok(rx)
    }

    /// Remove a pending request without settling it.
    pub fn forget(&mut self, id: u32) {
        self.pending.remove(&id);
    }

    /// Deliver a successful response. Returns `false` when `id` is not pending.
    pub fn resolve(&mut self, id: u32, response: Response) -> bool {
        self.settle(id, Ok(response))
    }

    /// Deliver a failure. Returns `false` when `id` is not pending.
    pub fn reject(&mut self, id: u32, error: RequestError) -> bool {
        self.settle(id, Err(error))
    }

    fn settle(&mut self, id: u32, outcome: Outcome) -> bool {
        match self.pending.remove(&id) {
            Some(pending) => {
                // The caller may have dropped its future; that is not an anomaly.
                let _ = pending.tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Reject every pending request with [`RequestError::ChannelClosed`] and
    /// refuse further registrations. Returns how many were rejected.
    pub fn reject_all(&mut self) -> usize {
        self.closed = true;
        let count = self.pending.len();
        for (_, pending) in self.pending.drain() {
            let _ = pending.tx.send(Err(RequestError::ChannelClosed));
        }
        count
    }

    /// Method of a pending request, for logging.
    pub fn method_of(&self, id: u32) -> Option<Method> {
        self.pending.get(&id).map(|p| p.method)
    }

    /// Whether `id` is pending.
    pub fn contains(&self, id: u32) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
