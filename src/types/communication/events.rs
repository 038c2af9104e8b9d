use serde::{Deserialize, Serialize};

use super::channel::{Channel, Delivery, Receiver, Sender};
use crate::types::{Message, NodeId, Phase, RoundOutcome};

/// Outbound notification for UI collaborators. Never consumed back by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    PhaseUpdate { round: u64, phase: Phase },
    NewRound { round: u64 },
    MessageDelivered { message: Message },
    RoundCompleted { outcome: RoundOutcome },
    ConnectedNodes { nodes: Vec<NodeId> },
}

/// Fan-out of session events to every live subscriber
#[derive(Default)]
pub struct EventHub {
    subscribers: Vec<Sender<SessionEvent>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber with its own bounded buffer
    pub fn subscribe(&mut self, buffer_size: usize) -> Receiver<SessionEvent> {
        let (sender, receiver) = Channel::new(buffer_size).split();
        self.subscribers.push(sender);
        receiver
    }

    /// Publish to all subscribers. Full buffers drop the event, closed subscribers are forgotten.
    pub fn publish(&mut self, event: SessionEvent) {
        if self.subscribers.is_empty() {
            return;
        }
        self.subscribers.retain(|subscriber| match subscriber.notify(event.clone()) {
            Delivery::Queued => true,
            Delivery::Dropped => {
                tracing::warn!("Subscriber buffer full, dropping {} notification", event_name(&event));
                true
            }
            Delivery::Closed => false,
        });
    }
}

fn event_name(event: &SessionEvent) -> &'static str {
    match event {
        SessionEvent::PhaseUpdate { .. } => "phase_update",
        SessionEvent::NewRound { .. } => "new_round",
        SessionEvent::MessageDelivered { .. } => "message_delivered",
        SessionEvent::RoundCompleted { .. } => "round_completed",
        SessionEvent::ConnectedNodes { .. } => "connected_nodes",
    }
}
