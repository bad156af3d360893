//! # Notification Bus
//!
//! Typed broadcast channel for cross-component notifications. Publishers
//! never block; slow subscribers lose the oldest messages and are told how
//! many they missed.

use greentrace_chain::{Address, U256};
use tokio::sync::broadcast;

/// Default number of buffered notifications per subscriber.
pub const DEFAULT_CAPACITY: usize = 64;

/// An NFT was burned somewhere in the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssetRetired {
    /// The burned token.
    pub asset_id: U256,
    /// Last known owner, if the publisher knows it.
    pub owner: Option<Address>,
}

/// Broadcast bus for one notification type.
#[derive(Clone, Debug)]
pub struct NotificationBus<T> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone + Send + 'static> NotificationBus<T> {
    /// Creates a bus buffering `capacity` notifications per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Sends a notification to every current subscriber.
    ///
    /// # Returns
    ///
    /// Number of subscribers reached (0 if nobody listens).
    pub fn publish(&self, notification: T) -> usize {
        self.sender.send(notification).unwrap_or(0)
    }

    /// Opens a new subscription. Only notifications published afterwards are received.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    /// Number of open subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone + Send + 'static> Default for NotificationBus<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn test_publish_without_subscribers() {
        let bus = NotificationBus::<AssetRetired>::default();
        let reached = bus.publish(AssetRetired {
            asset_id: U256::from(1),
            owner: None,
        });
        assert_eq!(reached, 0);
    }

    #[test]
    fn test_every_subscriber_receives() {
        let bus = NotificationBus::new(4);
        let mut first = bus.subscribe();
        let mut second = bus.clone().subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let note = AssetRetired {
            asset_id: U256::from(5),
            owner: Some(Address::repeat_byte(1)),
        };
        assert_eq!(bus.publish(note), 2);
        assert_eq!(first.try_recv().unwrap(), note);
        assert_eq!(second.try_recv().unwrap(), note);
        assert!(matches!(first.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_slow_subscriber_lags() {
        let bus = NotificationBus::new(1);
        let mut slow = bus.subscribe();
        bus.publish(1u8);
        bus.publish(2u8);
        assert!(matches!(slow.try_recv(), Err(TryRecvError::Lagged(1))));
        assert_eq!(slow.try_recv().unwrap(), 2);
    }
}
