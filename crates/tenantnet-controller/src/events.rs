//! Namespace event dispatch
//!
//! Events are consumed one at a time, so events for the same namespace never
//! overlap. A failed event goes to the back of the queue and is redelivered
//! up to `max_redeliveries` times. Events that arrive meanwhile, including
//! later ones for the same namespace, are handled before the retry; every
//! handler is idempotent, so the final state does not depend on that order.

use crate::controller::TenantNetworkController;
use crate::model::Namespace;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{error, warn};

/// Namespace lifecycle event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceEvent {
    Added(Namespace),
    Updated { old: Namespace, new: Namespace },
    Deleted(Namespace),
}

impl NamespaceEvent {
    /// Namespace the event is about
    pub fn namespace(&self) -> &str {
        match self {
            Self::Added(ns) | Self::Deleted(ns) => &ns.name,
            Self::Updated { new, .. } => &new.name,
        }
    }
}

/// Outcome counters for one dispatcher run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Events that reconciled successfully
    pub processed: u64,
    /// Failed attempts that were requeued
    pub redelivered: u64,
    /// Events given up on after the last redelivery
    pub dropped: u64,
}

/// Serial consumer feeding the reconciler
pub struct EventDispatcher {
    controller: Arc<TenantNetworkController>,
    max_redeliveries: u32,
    redelivery_delay: Duration,
}

impl EventDispatcher {
    pub fn new(controller: Arc<TenantNetworkController>, max_redeliveries: u32) -> Self {
        Self {
            controller,
            max_redeliveries,
            redelivery_delay: Duration::from_millis(500),
        }
    }

    /// Pause before a redelivered event is handled again
    pub fn with_redelivery_delay(mut self, delay: Duration) -> Self {
        self.redelivery_delay = delay;
        self
    }

    /// Consume events until every sender is dropped and the queue is drained
    pub async fn run(&self, mut events: mpsc::Receiver<NamespaceEvent>) -> DispatchStats {
        let mut stats = DispatchStats::default();
        let mut requeued: VecDeque<(NamespaceEvent, u32)> = VecDeque::new();
        let mut closed = false;

        loop {
            let next = if closed {
                requeued.pop_front()
            } else {
                match events.try_recv() {
                    Ok(event) => Some((event, 0)),
                    Err(TryRecvError::Disconnected) => {
                        closed = true;
                        requeued.pop_front()
                    }
                    Err(TryRecvError::Empty) => match requeued.pop_front() {
                        Some(item) => Some(item),
                        None => match events.recv().await {
                            Some(event) => Some((event, 0)),
                            None => {
                                closed = true;
                                None
                            }
                        },
                    },
                }
            };

            let Some((event, attempt)) = next else {
                if closed && requeued.is_empty() {
                    break;
                }
                continue;
            };

            if attempt > 0 {
                if self.redelivery_delay.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    tokio::time::sleep(self.redelivery_delay).await;
                }
            }

            match self.controller.handle(&event).await {
                Ok(()) => stats.processed += 1,
                Err(e) if attempt < self.max_redeliveries => {
                    warn!(
                        "Reconcile of namespace {} failed (attempt {}): {}, requeueing",
                        event.namespace(),
                        attempt + 1,
                        e
                    );
                    stats.redelivered += 1;
                    requeued.push_back((event, attempt + 1));
                }
                Err(e) => {
                    error!(
                        "Giving up on namespace {} after {} attempts: {}",
                        event.namespace(),
                        attempt + 1,
                        e
                    );
                    stats.dropped += 1;
                }
            }
        }

        stats
    }
}
