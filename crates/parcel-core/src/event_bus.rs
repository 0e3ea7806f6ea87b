//! Broadcast event bus for workflow events.

use parcel_types::WorkflowEvent;
use tokio::sync::broadcast;

/// Broadcasts [`WorkflowEvent`]s to any number of subscribers.
///
/// Subscribers only see events published after they subscribed; slow
/// subscribers lose the oldest events once `capacity` is exceeded.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event to all current subscribers.
	///
	/// Fails only when nobody is subscribed.
	pub fn publish(
		&self,
		event: WorkflowEvent,
	) -> Result<(), broadcast::error::SendError<WorkflowEvent>> {
		self.sender.send(event)?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_subscribers_receive_published_events() {
		let bus = EventBus::new(8);
		let mut first = bus.subscribe();
		let mut second = bus.clone().subscribe();

		bus.publish(WorkflowEvent::OrderCanceled {
			order_id: "a".into(),
		})
		.unwrap();

		assert_eq!(first.recv().await.unwrap().order_id(), "a");
		assert_eq!(second.recv().await.unwrap().order_id(), "a");
	}

	#[test]
	fn test_publish_without_subscribers_fails() {
		let bus = EventBus::new(8);
		assert!(bus
			.publish(WorkflowEvent::OrderCanceled {
				order_id: "a".into()
			})
			.is_err());
	}
}
