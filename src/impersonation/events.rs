//! Impersonation lifecycle events.
//!
//! Events are fire-and-forget: the [`Impersonator`](super::Impersonator)
//! dispatches them after a transition has completed and only logs a failed
//! delivery. A sink can never undo a start or a stop.

use crate::error::{ImpersonationError, Result};
use crate::traits::principal::SharedPrincipal;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Types of impersonation events.
#[derive(Debug, Clone)]
pub enum ImpersonationEvent {
    /// An episode started; `impersonated` is now the active principal.
    Started {
        impersonator: SharedPrincipal,
        impersonated: SharedPrincipal,
        guard_name: String,
    },
    /// An episode ended and `impersonator` is active again.
    Stopped {
        impersonator: SharedPrincipal,
        impersonated: SharedPrincipal,
        guard_name: String,
    },
}

impl ImpersonationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "impersonation.started",
            Self::Stopped { .. } => "impersonation.stopped",
        }
    }

    pub fn impersonator(&self) -> &SharedPrincipal {
        match self {
            Self::Started { impersonator, .. } | Self::Stopped { impersonator, .. } => impersonator,
        }
    }

    pub fn impersonated(&self) -> &SharedPrincipal {
        match self {
            Self::Started { impersonated, .. } | Self::Stopped { impersonated, .. } => impersonated,
        }
    }

    pub fn guard_name(&self) -> &str {
        match self {
            Self::Started { guard_name, .. } | Self::Stopped { guard_name, .. } => guard_name,
        }
    }
}

/// Receiver of impersonation events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn dispatch(&self, event: ImpersonationEvent) -> Result<()>;
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn dispatch(&self, _event: ImpersonationEvent) -> Result<()> {
        Ok(())
    }
}

/// Sink that publishes events on a tokio broadcast channel.
///
/// # Example
///
/// ```rust,ignore
/// let sink = BroadcastEventSink::new(64);
/// let mut events = sink.subscribe();
/// let impersonator = impersonator.with_events(Arc::new(sink));
///
/// tokio::spawn(async move {
///     while let Ok(event) = events.recv().await {
///         audit_log.record(event.name(), event.impersonator().id()).await;
///     }
/// });
/// ```
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<ImpersonationEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ImpersonationEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventSink for BroadcastEventSink {
    async fn dispatch(&self, event: ImpersonationEvent) -> Result<()> {
        self.sender
            .send(event)
            .map(|_| ())
            .map_err(|_| ImpersonationError::collaborator("No subscribers for impersonation events"))
    }
}
