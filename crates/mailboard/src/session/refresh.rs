//! Single-flight refresh coordination
//!
//! The first caller to need a refresh becomes the leader and performs the
//! network call. Everyone arriving while it is outstanding is queued with a
//! reply channel. When the leader settles, the in-flight flag is cleared
//! and the queue drained under one lock, and every waiter receives the same
//! outcome.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::http::{ApiError, ApiRequest};

/// Why a refresh cycle failed
#[derive(Debug, Clone, thiserror::Error)]
pub enum RefreshError {
    #[error("Session refresh failed: {0}")]
    Request(Box<ApiError>),
    #[error("Refresh response did not contain an access token")]
    MissingToken,
    #[error("Refresh was abandoned before it settled")]
    Abandoned,
}

impl From<ApiError> for RefreshError {
    fn from(err: ApiError) -> Self {
        RefreshError::Request(Box::new(err))
    }
}

/// What a waiter receives when the refresh succeeds
#[derive(Debug, Clone)]
pub struct Replay {
    /// The new access token
    pub token: String,
    /// The queued request, stamped with the new token
    pub request: Option<ApiRequest>,
}

type Outcome = Result<Replay, RefreshError>;

struct Entry {
    request: Option<ApiRequest>,
    reply: Sender<Outcome>,
}

#[derive(Default)]
struct State {
    in_flight: bool,
    queue: Vec<Entry>,
}

/// The caller's role in the current refresh cycle
pub enum Turn {
    /// No refresh was outstanding: the caller must perform it and `settle`
    Lead,
    /// A refresh is outstanding: wait for its outcome
    Wait(Waiter),
}

/// Handle for a queued caller
pub struct Waiter {
    rx: Receiver<Outcome>,
}

impl Waiter {
    /// Block until the outstanding refresh settles
    pub fn wait(self) -> Outcome {
        self.rx.recv().unwrap_or(Err(RefreshError::Abandoned))
    }
}

/// Guarantees at most one refresh in flight
#[derive(Default)]
pub struct RefreshCoordinator {
    state: Mutex<State>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the current refresh cycle, or start one
    ///
    /// `request` is the call that hit the 401, if any; it is handed back
    /// stamped with the new token.
    pub fn begin(&self, request: Option<ApiRequest>) -> Turn {
        let mut state = self.lock();
        if state.in_flight {
            let (reply, rx) = mpsc::channel();
            state.queue.push(Entry { request, reply });
            Turn::Wait(Waiter { rx })
        } else {
            state.in_flight = true;
            Turn::Lead
        }
    }

    /// Settle the outstanding refresh and wake every queued caller
    ///
    /// Returns the number of callers woken.
    pub fn settle(&self, outcome: &Result<String, RefreshError>) -> usize {
        let queue = {
            let mut state = self.lock();
            state.in_flight = false;
            std::mem::take(&mut state.queue)
        };

        let woken = queue.len();
        for entry in queue {
            let reply = match outcome {
                Ok(token) => Ok(Replay {
                    token: token.clone(),
                    request: entry.request.map(|mut request| {
                        request.set_bearer(token);
                        request
                    }),
                }),
                Err(err) => Err(err.clone()),
            };
            // A waiter that went away no longer needs the outcome
            let _ = entry.reply.send(reply);
        }
        woken
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock().in_flight
    }

    /// Number of callers waiting on the outstanding refresh
    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_caller_leads() {
        let coordinator = RefreshCoordinator::new();
        assert!(matches!(coordinator.begin(None), Turn::Lead));
        assert!(coordinator.is_refreshing());
        assert!(matches!(coordinator.begin(None), Turn::Wait(_)));
        assert_eq!(coordinator.queued(), 1);
    }

    #[test]
    fn test_settle_success_stamps_queued_requests() {
        let coordinator = RefreshCoordinator::new();
        let Turn::Lead = coordinator.begin(None) else {
            panic!("expected to lead");
        };
        let Turn::Wait(waiter) = coordinator.begin(Some(ApiRequest::get("/mail/mailboxes")))
        else {
            panic!("expected to wait");
        };

        assert_eq!(coordinator.settle(&Ok("fresh".to_string())), 1);
        assert!(!coordinator.is_refreshing());
        assert_eq!(coordinator.queued(), 0);

        let replay = waiter.wait().unwrap();
        assert_eq!(replay.token, "fresh");
        assert_eq!(replay.request.unwrap().bearer_token(), Some("fresh"));
    }

    #[test]
    fn test_settle_failure_reaches_every_waiter() {
        let coordinator = RefreshCoordinator::new();
        let _lead = coordinator.begin(None);
        let waiters: Vec<_> = (0..3)
            .map(|_| match coordinator.begin(None) {
                Turn::Wait(w) => w,
                Turn::Lead => panic!("only one leader per cycle"),
            })
            .collect();

        assert_eq!(coordinator.settle(&Err(RefreshError::MissingToken)), 3);
        for waiter in waiters {
            assert!(matches!(waiter.wait(), Err(RefreshError::MissingToken)));
        }
    }

    #[test]
    fn test_new_cycle_after_settle() {
        let coordinator = RefreshCoordinator::new();
        let _lead = coordinator.begin(None);
        coordinator.settle(&Ok("t1".to_string()));
        assert!(matches!(coordinator.begin(None), Turn::Lead));
    }
}
