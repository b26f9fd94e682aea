//! Poll-by-identifier store for answers that arrive long after the ask.
//!
//! The receive phase can hold the link for the whole wait window, so it runs
//! on a blocking worker. Callers get a ticket id back immediately and poll it.

use crate::ecr::packet::{Ask, Response};
use crate::ecr::terminal::SharedTerminal;
use crate::ecr::transport::EcrTransport;
use crate::error::TeliumError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AnswerStatus {
    /// Receive phase still running.
    Waiting,
    Answered { response: Response },
    /// Wait window elapsed without an ENQ from the terminal.
    NoAnswer,
    /// The answer was unusable. `response` is kept when the terminal sent
    /// valid data but broke the closing handshake.
    Failed {
        error: String,
        response: Option<Response>,
    },
}

impl AnswerStatus {
    pub fn is_settled(&self) -> bool {
        !matches!(self, AnswerStatus::Waiting)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Uuid,
    pub ask: Ask,
    pub status: AnswerStatus,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

type TicketMap = Arc<Mutex<HashMap<Uuid, Ticket>>>;

fn lock<V>(m: &Mutex<V>) -> MutexGuard<'_, V> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Cheap to clone; clones share the same tickets.
#[derive(Clone, Default)]
pub struct PendingAnswers {
    tickets: TicketMap,
    workers: Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>,
}

impl PendingAnswers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start waiting for the answer to `ask` on `terminal`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn watch<T>(&self, terminal: SharedTerminal<T>, ask: Ask) -> Uuid
    where
        T: EcrTransport + 'static,
    {
        let id = Uuid::new_v4();
        lock(&self.tickets).insert(
            id,
            Ticket {
                id,
                ask: ask.clone(),
                status: AnswerStatus::Waiting,
                created_at: Utc::now(),
                settled_at: None,
            },
        );
        info!(%id, amount = %ask.amount, "Waiting for terminal answer");

        let tickets = Arc::clone(&self.tickets);
        let worker = tokio::task::spawn_blocking(move || {
            let outcome = lock(&terminal).verify(&ask);
            let status = match outcome {
                Ok(Some(response)) => AnswerStatus::Answered { response },
                Ok(None) => AnswerStatus::NoAnswer,
                Err(e) => {
                    warn!(%id, "Terminal answer failed: {e}");
                    let error = e.to_string();
                    let response = match e {
                        TeliumError::MissingTerminator(response) => Some(*response),
                        _ => None,
                    };
                    AnswerStatus::Failed { error, response }
                }
            };
            settle(&tickets, id, status);
        });
        lock(&self.workers).insert(id, worker);
        id
    }

    pub fn status(&self, id: Uuid) -> Option<AnswerStatus> {
        lock(&self.tickets).get(&id).map(|t| t.status.clone())
    }

    pub fn ticket(&self, id: Uuid) -> Option<Ticket> {
        lock(&self.tickets).get(&id).cloned()
    }

    /// Remove a settled ticket and return its outcome. Tickets still
    /// waiting stay in place and yield `None`, as do unknown ids.
    pub fn take(&self, id: Uuid) -> Option<AnswerStatus> {
        let mut tickets = lock(&self.tickets);
        if !tickets.get(&id)?.status.is_settled() {
            return None;
        }
        lock(&self.workers).remove(&id);
        tickets.remove(&id).map(|t| t.status)
    }

    /// Wait for the worker behind `id` to finish, then report its status.
    pub async fn wait(&self, id: Uuid) -> Option<AnswerStatus> {
        let worker = lock(&self.workers).remove(&id);
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(%id, "Answer worker did not complete: {e}");
                settle(
                    &self.tickets,
                    id,
                    AnswerStatus::Failed {
                        error: e.to_string(),
                        response: None,
                    },
                );
            }
        }
        self.status(id)
    }

    /// Ids of tickets still waiting.
    pub fn waiting(&self) -> Vec<Uuid> {
        lock(&self.tickets)
            .values()
            .filter(|t| !t.status.is_settled())
            .map(|t| t.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.tickets).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn settle(tickets: &Mutex<HashMap<Uuid, Ticket>>, id: Uuid, status: AnswerStatus) {
    let mut tickets = lock(tickets);
    match tickets.get_mut(&id) {
        Some(ticket) => {
            debug!(%id, ?status, "Ticket settled");
            ticket.status = status;
            ticket.settled_at = Some(Utc::now());
        }
        None => debug!(%id, "Ticket dropped before it settled"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
