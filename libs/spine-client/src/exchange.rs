//! Send → poll state machine.
//!
//! The transport never polls on its own. An [`Exchange`] holds where a
//! request has got to and advances one network call at a time; the caller
//! decides how long to wait between polls through a [`PollPolicy`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::envelope::OutboundMessage;
use crate::error::{Error, Result};
use crate::transport::{SpineTransport, TerminalResponse, TransportResponse};

/// Decides the wait before the next poll. `None` abandons the exchange.
pub trait PollPolicy: Send + Sync {
    /// `attempt` counts polls already made; `elapsed` is time since the send.
    fn next_delay(&self, attempt: u32, elapsed: Duration) -> Option<Duration>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeState {
    /// Not yet sent.
    Sent,
    Pending { polling_url: String },
    Terminal(TerminalResponse),
}

pub struct Exchange {
    transport: Arc<dyn SpineTransport>,
    message: Option<OutboundMessage>,
    state: ExchangeState,
    polls: u32,
}

impl Exchange {
    pub fn new(transport: Arc<dyn SpineTransport>, message: OutboundMessage) -> Self {
        Self {
            transport,
            message: Some(message),
            state: ExchangeState::Sent,
            polls: 0,
        }
    }

    /// Picks up a request that was sent elsewhere and is already pending.
    pub fn resume(transport: Arc<dyn SpineTransport>, polling_url: impl Into<String>) -> Self {
        Self {
            transport,
            message: None,
            state: ExchangeState::Pending {
                polling_url: polling_url.into(),
            },
            polls: 0,
        }
    }

    pub fn state(&self) -> &ExchangeState {
        &self.state
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Makes exactly one network call (send or poll) unless already terminal.
    pub async fn advance(&mut self) -> Result<&ExchangeState> {
        let response = match &self.state {
            ExchangeState::Terminal(_) => return Ok(&self.state),
            ExchangeState::Sent => match &self.message {
                Some(message) => self.transport.send(message).await?,
                None => {
                    return Err(Error::ClassificationAmbiguity(
                        "exchange has neither a message nor a polling URL".to_string(),
                    ))
                }
            },
            ExchangeState::Pending { polling_url } => {
                self.polls += 1;
                self.transport.poll(polling_url).await?
            }
        };

        self.state = match response {
            TransportResponse::Terminal(terminal) => ExchangeState::Terminal(terminal),
            TransportResponse::Pollable { polling_url, .. } => {
                tracing::debug!(%polling_url, polls = self.polls, "Spine request pending");
                ExchangeState::Pending { polling_url }
            }
        };
        Ok(&self.state)
    }

    /// Advances until terminal, sleeping between polls as the policy says.
    /// A resumed exchange polls once straight away before consulting the
    /// policy.
    pub async fn run_to_completion(mut self, policy: &dyn PollPolicy) -> Result<TerminalResponse> {
        let started = Instant::now();
        let mut wait = self.message.is_some() || self.polls > 0;
        loop {
            if !wait {
                wait = true;
            } else if let ExchangeState::Pending { .. } = self.state {
                let elapsed = started.elapsed();
                match policy.next_delay(self.polls, elapsed) {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => {
                        tracing::warn!(attempts = self.polls, ?elapsed, "Abandoning Spine polling");
                        return Err(Error::PollingAbandoned {
                            attempts: self.polls,
                            elapsed,
                        });
                    }
                }
            }

            if let ExchangeState::Terminal(terminal) = self.advance().await? {
                return Ok(terminal.clone());
            }
        }
    }
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("state", &self.state)
            .field("polls", &self.polls)
            .finish_non_exhaustive()
    }
}
