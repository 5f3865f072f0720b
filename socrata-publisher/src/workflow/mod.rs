//! Ticketed long-running operations.
//!
//! Scans, imports, copies and publishes all follow the same protocol: submit a
//! request, and while the server answers 202 (optionally with a ticket id),
//! wait one interval and re-issue the request as a GET carrying the
//! accumulated parameters plus the latest ticket. A 200 completes the
//! operation; any other status fails it.
//!
//! Every wait races a [`CancellationToken`] and is bounded by the
//! [`PollPolicy`] deadline.

pub mod imports;
pub mod publication;

use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, SocrataError};
use crate::response::{Outcome, classify};
use crate::transport::{Params, Request, Transport};

/// Query parameter carrying the ticket of a pending job.
pub const TICKET_PARAM: &str = "ticket";

/// How often to poll and how long to keep trying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Total polling budget. `None` means no limit.
    pub timeout: Option<Duration>,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout: Some(timeout),
        }
    }

    /// Poll until the server finishes, however long that takes.
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
        }
    }
}

/// Tracks the waits of a single polling loop.
#[derive(Debug)]
pub struct Waiter<'a> {
    policy: &'a PollPolicy,
    cancel: &'a CancellationToken,
    started: Instant,
    waits: u32,
}

impl<'a> Waiter<'a> {
    pub fn new(policy: &'a PollPolicy, cancel: &'a CancellationToken) -> Self {
        Self {
            policy,
            cancel,
            started: Instant::now(),
            waits: 0,
        }
    }

    /// Number of completed waits.
    pub fn waits(&self) -> u32 {
        self.waits
    }

    /// Sleep one interval, unless cancelled.
    ///
    /// The sleep never runs past the deadline: the last wait is cut short and
    /// reports [`SocrataError::TimedOut`].
    pub async fn wait(&mut self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(SocrataError::Cancelled);
        }

        let pause = match self.remaining() {
            Some(remaining) if remaining.is_zero() => return Err(self.timed_out()),
            Some(remaining) => self.policy.interval.min(remaining),
            None => self.policy.interval,
        };

        tokio::select! {
            _ = self.cancel.cancelled() => return Err(SocrataError::Cancelled),
            _ = tokio::time::sleep(pause) => {}
        }
        self.waits += 1;

        match self.remaining() {
            Some(remaining) if remaining.is_zero() => Err(self.timed_out()),
            _ => Ok(()),
        }
    }

    /// Time left before the deadline; `None` without one.
    fn remaining(&self) -> Option<Duration> {
        self.policy
            .timeout
            .map(|timeout| timeout.saturating_sub(self.started.elapsed()))
    }

    fn timed_out(&self) -> SocrataError {
        SocrataError::TimedOut {
            waited_secs: self.started.elapsed().as_secs(),
        }
    }
}

/// Result of a ticketed operation that reached a 200.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completed {
    pub body: String,
    /// How many times the loop waited before the server finished.
    pub waits: u32,
}

/// Drives one ticketed operation to completion.
pub struct TicketPoller<'a> {
    transport: &'a dyn Transport,
    policy: PollPolicy,
    cancel: CancellationToken,
}

impl<'a> TicketPoller<'a> {
    pub fn new(transport: &'a dyn Transport, policy: PollPolicy, cancel: CancellationToken) -> Self {
        Self {
            transport,
            policy,
            cancel,
        }
    }

    /// Send `submit`, then poll `endpoint` with `params` while the server answers 202.
    pub async fn run(&self, submit: Request, endpoint: &str, mut params: Params) -> Result<Completed> {
        info!(method = %submit.method, url = %submit.url, "Submitting ticketed operation");

        let mut response = self.transport.execute(&submit).await?;
        let mut waiter = Waiter::new(&self.policy, &self.cancel);

        loop {
            match classify(response) {
                Outcome::Complete(body) => {
                    info!(url = %endpoint, waits = waiter.waits(), "Ticketed operation completed");
                    return Ok(Completed {
                        body,
                        waits: waiter.waits(),
                    });
                }
                Outcome::Failed(err) => {
                    warn!(url = %endpoint, error = %err, "Ticketed operation failed");
                    return Err(err);
                }
                Outcome::Pending(body) => {
                    if let Some(ticket) = extract_ticket(&body) {
                        params.set(TICKET_PARAM, ticket);
                    }
                    waiter.wait().await?;
                    debug!(
                        url = %endpoint,
                        ticket = params.get(TICKET_PARAM).unwrap_or(""),
                        attempt = waiter.waits(),
                        "Polling pending operation"
                    );
                    response = self
                        .transport
                        .execute(&Request::get(endpoint, params.clone()))
                        .await?;
                }
            }
        }
    }
}

/// The ticket id of a pending response, if its body is an object with a
/// string or numeric `ticket`.
pub fn extract_ticket(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get(TICKET_PARAM)? {
        Value::String(ticket) => Some(ticket.clone()),
        Value::Number(ticket) => Some(ticket.to_string()),
        _ => None,
    }
}
