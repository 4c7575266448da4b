//! Batch consumer loop.
//!
//! One iteration:
//! 1. receive a batch (or a single probe message while the breaker is open)
//! 2. register every message with the lease renewer
//! 3. run all messages concurrently through the retrying handler
//! 4. settle each message according to its outcome
//! 5. feed the outcomes to the circuit breaker
//!
//! Batches are strictly sequential; the breaker only ever sees complete batches.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::app::breaker::{BreakerState, CircuitBreaker, count_failures};
use crate::app::lease::{LeaseGuard, LeaseRenewer};
use crate::app::retry::RetryingHandler;
use crate::config::ProcessingOptions;
use crate::domain::{DroverError, Message, MessageId, Outcome, TransportError};
use crate::observability::MESSAGES_SETTLED;
use crate::ports::{MessageHandler, MessageSource};

/// Reason attached to messages the handler rejected.
pub const DEAD_LETTER_REASON: &str = "message rejected by handler";

/// How the messages of an iteration were received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiveMode {
    /// Breaker closed: up to `max_messages_per_batch` messages.
    Batch,
    /// Breaker open: at most one message, after the open sleep.
    Probe,
}

/// What happened in one iteration of the loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IterationReport {
    pub mode: ReceiveMode,
    pub outcomes: Vec<(MessageId, Outcome)>,
    /// Breaker state after the iteration.
    pub breaker: BreakerState,
}

impl IterationReport {
    pub fn received(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// `Retry` outcomes in this iteration.
    pub fn failures(&self) -> usize {
        let outcomes: Vec<Outcome> = self.outcomes.iter().map(|(_, o)| *o).collect();
        count_failures(&outcomes)
    }

    pub fn outcome_of(&self, id: &MessageId) -> Option<Outcome> {
        self.outcomes
            .iter()
            .find(|(message_id, _)| message_id == id)
            .map(|(_, outcome)| *outcome)
    }
}

pub struct Consumer {
    source: Arc<dyn MessageSource>,
    handler: RetryingHandler,
    renewer: LeaseRenewer,
    breaker: CircuitBreaker,
    options: ProcessingOptions,
}

impl Consumer {
    pub fn new(
        source: Arc<dyn MessageSource>,
        handler: Arc<dyn MessageHandler>,
        options: ProcessingOptions,
    ) -> Self {
        Self {
            handler: RetryingHandler::from_options(handler, &options),
            renewer: LeaseRenewer::from_options(Arc::clone(&source), &options),
            breaker: CircuitBreaker::from_options(&options),
            source,
            options,
        }
    }

    pub fn options(&self) -> &ProcessingOptions {
        &self.options
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Messages whose lease is currently being renewed.
    pub fn in_flight_leases(&self) -> usize {
        self.renewer.in_flight()
    }

    /// Run until `shutdown` turns true (or its sender is dropped), or a
    /// transport error occurs. The source is closed on every exit path.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), DroverError> {
        info!(
            max_messages_per_batch = self.options.max_messages_per_batch(),
            max_failures_per_batch = self.options.max_failures_per_batch(),
            max_retry_attempts = self.options.max_retry_attempts(),
            "consumer started"
        );

        let result = self.run_until_shutdown(&mut shutdown).await;

        self.renewer.shutdown();
        let closed = self.source.close().await;

        if let Err(err) = &result {
            error!(error = %err, "consumer stopped on transport error");
        }
        result?;
        closed?;
        info!("consumer stopped");
        Ok(())
    }

    /// Receive and settle a single batch (or probe).
    pub async fn run_once(&mut self) -> Result<IterationReport, DroverError> {
        let (mode, messages) = self.receive().await?;
        Ok(self.settle(mode, messages).await?)
    }

    async fn run_until_shutdown(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), TransportError> {
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            // Receive (and the open-breaker sleep) may wait; settling never races shutdown.
            let (mode, messages) = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                    continue;
                }
                received = self.receive() => received?,
            };

            self.settle(mode, messages).await?;
        }
    }

    async fn receive(&self) -> Result<(ReceiveMode, Vec<Message>), TransportError> {
        let max_wait = self.options.max_wait_time();
        if self.breaker.is_open() {
            tokio::time::sleep(self.breaker.open_sleep()).await;
            info!("circuit breaker half-open, receiving probe message");
            let messages = self.source.receive_batch(1, max_wait).await?;
            return Ok((ReceiveMode::Probe, messages));
        }

        let messages = self
            .source
            .receive_batch(self.options.max_messages_per_batch(), max_wait)
            .await?;
        Ok((ReceiveMode::Batch, messages))
    }

    async fn settle(
        &mut self,
        mode: ReceiveMode,
        messages: Vec<Message>,
    ) -> Result<IterationReport, TransportError> {
        let guards: Vec<LeaseGuard> = messages.iter().map(|m| self.renewer.register(m)).collect();

        let results = join_all(
            messages
                .iter()
                .zip(guards)
                .map(|(message, guard)| self.process_one(message, guard)),
        )
        .await;

        let mut outcomes = Vec::with_capacity(messages.len());
        let mut first_error = None;
        for (message, result) in messages.iter().zip(results) {
            match result {
                Ok(outcome) => outcomes.push((message.id().clone(), outcome)),
                Err(err) => {
                    error!(message_id = %message.id(), error = %err, "failed to settle message");
                    first_error.get_or_insert(err);
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        let plain: Vec<Outcome> = outcomes.iter().map(|(_, o)| *o).collect();
        let breaker = match mode {
            ReceiveMode::Batch => self.breaker.record_batch(&plain),
            ReceiveMode::Probe => self.breaker.record_probe(plain.first().copied()),
        };

        let report = IterationReport {
            mode,
            outcomes,
            breaker,
        };
        if report.is_empty() {
            debug!(?mode, "no messages received");
        } else {
            info!(
                ?mode,
                received = report.received(),
                failures = report.failures(),
                ?breaker,
                "batch processed"
            );
        }
        Ok(report)
    }

    async fn process_one(
        &self,
        message: &Message,
        guard: LeaseGuard,
    ) -> Result<Outcome, TransportError> {
        let outcome = self.handler.handle(message).await;

        let settled = match outcome {
            Outcome::Success => self.source.acknowledge(message).await,
            Outcome::Retry => self.source.abandon(message).await,
            Outcome::Drop => self.source.dead_letter(message, DEAD_LETTER_REASON).await,
        };
        guard.release();
        settled?;

        metrics::counter!(MESSAGES_SETTLED, "outcome" => outcome.as_str()).increment(1);
        info!(
            message_id = %message.id(),
            delivery_count = message.delivery_count(),
            %outcome,
            "message settled"
        );
        Ok(outcome)
    }
}
