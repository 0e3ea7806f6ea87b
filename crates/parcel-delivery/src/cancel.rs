//! Cancellation signal for confirmation waits and retry pauses.
//!
//! A [`CancelHandle`] owns a watch channel; every [`CancelSignal`] cloned from
//! it resolves once the handle fires. Dropping the handle without firing it
//! leaves the signals pending forever.

use tokio::sync::watch;

/// Creates a connected handle/signal pair.
pub fn cancellation() -> (CancelHandle, CancelSignal) {
	let (sender, receiver) = watch::channel(false);
	(
		CancelHandle { sender },
		CancelSignal {
			receiver: Some(receiver),
		},
	)
}

/// Fires cancellation for every signal derived from it.
#[derive(Debug)]
pub struct CancelHandle {
	sender: watch::Sender<bool>,
}

impl CancelHandle {
	pub fn cancel(&self) {
		// send_replace succeeds even with no live receivers
		self.sender.send_replace(true);
	}

	/// Derives another signal bound to this handle.
	pub fn signal(&self) -> CancelSignal {
		CancelSignal {
			receiver: Some(self.sender.subscribe()),
		}
	}
}

/// Observes a [`CancelHandle`].
#[derive(Debug, Clone)]
pub struct CancelSignal {
	receiver: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
	/// A signal that never fires.
	pub fn never() -> Self {
		Self { receiver: None }
	}

	pub fn is_cancelled(&self) -> bool {
		self.receiver
			.as_ref()
			.is_some_and(|receiver| *receiver.borrow())
	}

	/// Resolves once cancellation has been requested.
	pub async fn cancelled(&self) {
		let Some(receiver) = &self.receiver else {
			return std::future::pending().await;
		};

		let mut receiver = receiver.clone();
		if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
			// Handle dropped without cancelling
			std::future::pending::<()>().await;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[tokio::test(start_paused = true)]
	async fn test_signal_resolves_after_cancel() {
		let (handle, signal) = cancellation();
		assert!(!signal.is_cancelled());

		let waiter = tokio::spawn({
			let signal = signal.clone();
			async move { signal.cancelled().await }
		});
		tokio::time::sleep(Duration::from_secs(1)).await;
		handle.cancel();

		waiter.await.unwrap();
		assert!(signal.is_cancelled());
		assert!(handle.signal().is_cancelled());
	}

	#[tokio::test(start_paused = true)]
	async fn test_never_and_dropped_handle_stay_pending() {
		let never = CancelSignal::never();
		let timed_out = tokio::time::timeout(Duration::from_secs(5), never.cancelled()).await;
		assert!(timed_out.is_err());

		let (handle, signal) = cancellation();
		drop(handle);
		let timed_out = tokio::time::timeout(Duration::from_secs(5), signal.cancelled()).await;
		assert!(timed_out.is_err());
		assert!(!signal.is_cancelled());
	}
}
