//! Broadcast fan-out.
//!
//! Serializes an event once and queues the frame on every recipient's
//! outbound handle. Delivery is best-effort: a closed recipient, or one
//! whose queue is full, is skipped and never fails the broadcast.

use std::sync::Arc;

use crew_core::event::Event;
use tracing::{debug, error};

use crate::registry::{ConnectionRegistry, Frame, Outbound};

/// Serialize an event into a shareable frame.
pub fn encode(event: &Event) -> Option<Frame> {
    match event.to_json() {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            error!("Failed to serialize {} event: {e}", event.kind());
            None
        }
    }
}

/// Send an event to a single connection.
pub fn send_to(outbound: &Outbound, event: &Event) -> bool {
    encode(event).is_some_and(|frame| outbound.send(frame))
}

/// Deliver `event` to every open connection except `exclude`.
///
/// Returns how many recipients accepted the frame.
pub fn broadcast(registry: &ConnectionRegistry, event: &Event, exclude: Option<&str>) -> usize {
    let Some(frame) = encode(event) else {
        return 0;
    };

    let recipients = registry.recipients(exclude);
    let mut delivered = 0;
    for (session_id, outbound) in &recipients {
        if outbound.send(frame.clone()) {
            delivered += 1;
        } else {
            debug!("Dropped {} for session {session_id}", event.kind());
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crew_core::roster::Roster;
    use serde_json::Value;
    use tokio::sync::mpsc::Receiver;

    fn drain(rx: &mut Receiver<Frame>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(serde_json::from_str(&frame).unwrap());
        }
        out
    }

    fn pong(timestamp: u64) -> Event {
        Event::Pong { timestamp }
    }

    #[test]
    fn reaches_everyone_without_exclusion() {
        let mut registry = ConnectionRegistry::new();
        let (a, mut rx_a) = Outbound::channel();
        let (b, mut rx_b) = Outbound::channel();
        registry.register("a", a).unwrap();
        registry.register("b", b).unwrap();

        assert_eq!(broadcast(&registry, &pong(1), None), 2);
        assert_eq!(drain(&mut rx_a).len(), 1);
        assert_eq!(drain(&mut rx_b).len(), 1);
    }

    #[test]
    fn excluded_session_gets_nothing() {
        let mut registry = ConnectionRegistry::new();
        let (a, mut rx_a) = Outbound::channel();
        let (b, mut rx_b) = Outbound::channel();
        registry.register("a", a).unwrap();
        registry.register("b", b).unwrap();

        assert_eq!(broadcast(&registry, &pong(1), Some("a")), 1);
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b).len(), 1);
    }

    #[test]
    fn closed_recipient_does_not_stop_delivery() {
        let mut registry = ConnectionRegistry::new();
        let (a, rx_a) = Outbound::channel();
        let (b, mut rx_b) = Outbound::channel();
        registry.register("a", a).unwrap();
        registry.register("b", b).unwrap();
        drop(rx_a);

        assert_eq!(broadcast(&registry, &pong(1), None), 1);
        assert_eq!(drain(&mut rx_b).len(), 1);
    }

    #[test]
    fn backed_up_recipient_is_skipped() {
        let mut registry = ConnectionRegistry::new();
        let (slow, mut rx_slow) = Outbound::with_capacity(1);
        let (b, mut rx_b) = Outbound::channel();
        registry.register("slow", slow).unwrap();
        registry.register("b", b).unwrap();

        assert_eq!(broadcast(&registry, &pong(1), None), 2);
        assert_eq!(broadcast(&registry, &pong(2), None), 1);

        let stamps: Vec<u64> = drain(&mut rx_b)
            .iter()
            .map(|v| v["timestamp"].as_u64().unwrap())
            .collect();
        assert_eq!(stamps, [1, 2]);
        let slow_frames = drain(&mut rx_slow);
        assert_eq!(slow_frames.len(), 1);
        assert_eq!(slow_frames[0]["timestamp"], 1);
    }

    #[test]
    fn preserves_call_order() {
        let roster = Roster::crew();
        let mut registry = ConnectionRegistry::new();
        let (a, mut rx_a) = Outbound::channel();
        registry.register("a", a).unwrap();
        registry.identify("a", "emmy", &roster).unwrap();

        for ts in 0..10 {
            broadcast(&registry, &pong(ts), None);
        }
        let stamps: Vec<u64> = drain(&mut rx_a)
            .iter()
            .map(|v| v["timestamp"].as_u64().unwrap())
            .collect();
        assert_eq!(stamps, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn send_to_reports_closed_transport() {
        let (out, rx) = Outbound::channel();
        assert!(send_to(&out, &pong(1)));
        drop(rx);
        assert!(!send_to(&out, &pong(2)));
    }
}
