//! Broadcast of packets that no listener claims.
//!
//! Radio telegrams, events and responses have dedicated routes. Everything
//! else the gateway sends (remote management, smart ack commands, radio
//! messages, unknown packet types) is published here for whoever subscribes.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::protocol::{Packet, PacketType};

/// Default number of packets buffered per subscriber.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 64;

/// A subscription to unrouted packets.
pub struct Subscription {
    receiver: broadcast::Receiver<Packet>,
    filter: PacketFilter,
}

impl Subscription {
    /// Receives the next packet matching the subscription filter.
    ///
    /// Returns `None` once the dispatcher is gone.
    pub async fn recv(&mut self) -> Option<Packet> {
        loop {
            match self.receiver.recv().await {
                Ok(packet) if self.filter.matches(&packet) => return Some(packet),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("subscriber lagged, {} packets skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Subscription filter by packet type.
#[derive(Debug, Clone, Default)]
pub struct PacketFilter {
    /// Accepted packet types; `None` accepts everything.
    pub packet_types: Option<Vec<PacketType>>,
}

impl PacketFilter {
    /// Creates a filter for specific packet types.
    #[must_use]
    pub const fn packet_types(types: Vec<PacketType>) -> Self {
        Self {
            packet_types: Some(types),
        }
    }

    /// Checks if a packet matches this filter.
    #[must_use]
    pub fn matches(&self, packet: &Packet) -> bool {
        self.packet_types
            .as_ref()
            .is_none_or(|types| types.contains(&packet.packet_type()))
    }
}

/// Publishes unrouted packets to subscribers.
#[derive(Clone)]
pub struct PacketDispatcher {
    sender: broadcast::Sender<Packet>,
}

impl PacketDispatcher {
    /// Creates a dispatcher buffering `capacity` packets per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes a packet to all subscribers.
    pub fn dispatch(&self, packet: Packet) {
        // No subscribers is fine.
        let _ = self.sender.send(packet);
    }

    /// Subscribes to packets, optionally restricted by `filter`.
    #[must_use]
    pub fn subscribe(&self, filter: Option<PacketFilter>) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            filter: filter.unwrap_or_default(),
        }
    }

    /// Waits for a packet matching the filter with timeout.
    ///
    /// Returns `None` if the timeout expires or the dispatcher is gone.
    pub async fn wait_for(&self, filter: PacketFilter, timeout: Duration) -> Option<Packet> {
        let mut subscription = self.subscribe(Some(filter));
        tokio::time::timeout(timeout, subscription.recv())
            .await
            .ok()
            .flatten()
    }
}

impl Default for PacketDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIPTION_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RawPacket;

    fn remote_management() -> Packet {
        Packet::Other(RawPacket::new(PacketType::RemoteManagement, vec![0x06, 0x06], Vec::new()))
    }

    fn smart_ack() -> Packet {
        Packet::Other(RawPacket::new(PacketType::SmartAckCommand, vec![0x02], Vec::new()))
    }

    #[tokio::test]
    async fn test_packet_dispatch() {
        let dispatcher = PacketDispatcher::new(16);
        let mut sub = dispatcher.subscribe(None);

        dispatcher.dispatch(remote_management());

        let packet = tokio::time::timeout(Duration::from_millis(100), sub.recv())
            .await
            .unwrap();
        assert_eq!(packet, Some(remote_management()));
    }

    #[tokio::test]
    async fn test_subscription_filter() {
        let dispatcher = PacketDispatcher::new(16);
        let mut sub =
            dispatcher.subscribe(Some(PacketFilter::packet_types(vec![PacketType::SmartAckCommand])));

        dispatcher.dispatch(remote_management());
        dispatcher.dispatch(smart_ack());

        assert_eq!(sub.recv().await, Some(smart_ack()));
    }

    #[tokio::test]
    async fn test_closed_dispatcher() {
        let dispatcher = PacketDispatcher::new(4);
        let mut sub = dispatcher.subscribe(None);
        drop(dispatcher);
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_timeout() {
        let dispatcher = PacketDispatcher::default();
        let filter = PacketFilter::packet_types(vec![PacketType::RadioMessage]);
        assert_eq!(dispatcher.wait_for(filter, Duration::from_millis(50)).await, None);
    }

    #[test]
    fn test_filter_matches() {
        assert!(PacketFilter::default().matches(&remote_management()));
        let filter = PacketFilter::packet_types(vec![PacketType::RemoteManagement]);
        assert!(filter.matches(&remote_management()));
        assert!(!filter.matches(&smart_ack()));
    }
}
