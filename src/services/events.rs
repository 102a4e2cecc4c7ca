//! Event system for planner mutations
//!
//! Events are emitted after a transaction commits. They are notifications
//! only: derived GIS state is already consistent by the time a listener sees
//! the event, and nothing downstream of the bus writes to the database.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Planner events emitted by services
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerEvent {
    // Asset events
    AssetCreated {
        id: String,
        phase_id: String,
    },
    AssetUpdated {
        id: String,
        phase_id: String,
    },
    AssetDeleted {
        id: String,
        phase_id: String,
    },

    // Phase events
    PhaseCreated {
        id: String,
        project_id: String,
    },
    PhaseDeleted {
        id: String,
        project_id: String,
    },

    // Derived GIS state
    PhaseGisRecomputed {
        phase_id: String,
        zones: usize,
        districts: usize,
    },
    PhaseGisCleared {
        phase_id: String,
    },

    // Scoring
    ScoresUpdated {
        project_id: String,
    },
    WeightsUpdated,
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    /// Handle an event
    fn on_event(&self, event: &PlannerEvent);
}

/// Event bus for broadcasting planner events
pub struct EventBus {
    sender: broadcast::Sender<PlannerEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new event bus with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: PlannerEvent) {
        trace!(event = ?event, "Emitting planner event");
        // no subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PlannerEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &PlannerEvent) {
        match event {
            PlannerEvent::AssetCreated { id, phase_id }
            | PlannerEvent::AssetUpdated { id, phase_id }
            | PlannerEvent::AssetDeleted { id, phase_id } => {
                debug!(asset = %id, phase_id = %phase_id, "Asset mutated");
            }
            PlannerEvent::PhaseDeleted { id, project_id } => {
                info!(phase_id = %id, project_id = %project_id, "Phase deleted");
            }
            PlannerEvent::PhaseGisRecomputed { phase_id, zones, districts } => {
                debug!(phase_id = %phase_id, zones, districts, "Phase GIS recomputed");
            }
            PlannerEvent::PhaseGisCleared { phase_id } => {
                debug!(phase_id = %phase_id, "Phase GIS cleared");
            }
            _ => {
                trace!(event = ?event, "Planner event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
