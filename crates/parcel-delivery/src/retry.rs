//! Bounded retry policy.
//!
//! One policy type covers every retrying operation: the token id lookup after
//! a mint and the mint submission itself. A policy has a maximum number of
//! attempts, a pause between attempts that is either fixed or grows
//! exponentially, and is given a predicate deciding which errors are worth
//! another attempt.

use crate::{CancelSignal, DeliveryError};
use backoff::backoff::{Backoff, Constant};
use backoff::ExponentialBackoff;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// How the pause between attempts evolves.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
	/// The same pause before every retry.
	Fixed,
	/// The pause is multiplied after every retry, up to `max_interval`.
	Exponential { multiplier: f64, max_interval: Duration },
}

/// A bounded retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
	/// Total attempts including the first one. Zero behaves like one.
	pub max_attempts: u32,
	/// Pause before the first retry.
	pub interval: Duration,
	pub strategy: RetryStrategy,
}

impl RetryPolicy {
	pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
		Self {
			max_attempts,
			interval,
			strategy: RetryStrategy::Fixed,
		}
	}

	pub fn exponential(
		max_attempts: u32,
		interval: Duration,
		multiplier: f64,
		max_interval: Duration,
	) -> Self {
		Self {
			max_attempts,
			interval,
			strategy: RetryStrategy::Exponential {
				multiplier,
				max_interval,
			},
		}
	}

	/// A policy that never retries.
	pub fn none() -> Self {
		Self::fixed(1, Duration::ZERO)
	}

	fn backoff(&self) -> Box<dyn Backoff + Send> {
		match &self.strategy {
			RetryStrategy::Fixed => Box::new(Constant::new(self.interval)),
			RetryStrategy::Exponential {
				multiplier,
				max_interval,
			} => Box::new(ExponentialBackoff {
				current_interval: self.interval,
				initial_interval: self.interval,
				randomization_factor: 0.0,
				multiplier: *multiplier,
				max_interval: *max_interval,
				max_elapsed_time: None,
				..ExponentialBackoff::default()
			}),
		}
	}

	/// Runs `operation` until it succeeds, fails with an error `retryable`
	/// rejects, or the attempts are exhausted.
	///
	/// The last error is returned when attempts run out. Pauses end early
	/// with [`DeliveryError::Cancelled`] when `cancel` fires.
	pub async fn run<T, E, F, Fut, P>(
		&self,
		operation_name: &str,
		cancel: &CancelSignal,
		retryable: P,
		mut operation: F,
	) -> Result<T, E>
	where
		E: Display + From<DeliveryError>,
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, E>>,
		P: Fn(&E) -> bool,
	{
		let max_attempts = self.max_attempts.max(1);
		let mut backoff = self.backoff();
		let mut attempt = 1;

		loop {
			let error = match operation().await {
				Ok(value) => return Ok(value),
				Err(error) => error,
			};

			if attempt >= max_attempts || !retryable(&error) {
				if attempt > 1 {
					tracing::warn!(
						operation = operation_name,
						attempts = attempt,
						error = %error,
						"Giving up"
					);
				}
				return Err(error);
			}

			let delay = backoff.next_backoff().unwrap_or(self.interval);
			tracing::warn!(
				operation = operation_name,
				attempt,
				max_attempts,
				?delay,
				error = %error,
				"Attempt failed, retrying"
			);

			tokio::select! {
				_ = tokio::time::sleep(delay) => {}
				_ = cancel.cancelled() => return Err(DeliveryError::Cancelled.into()),
			}
			attempt += 1;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cancellation;
	use std::sync::atomic::{AtomicU32, Ordering};
	use tokio::time::Instant;

	fn flaky(failures: u32, counter: &AtomicU32) -> Result<u32, DeliveryError> {
		let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
		if attempt <= failures {
			Err(DeliveryError::Connectivity(format!("attempt {}", attempt)))
		} else {
			Ok(attempt)
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_fixed_policy_retries_until_success() {
		let counter = AtomicU32::new(0);
		let policy = RetryPolicy::fixed(5, Duration::from_secs(2));
		let start = Instant::now();

		let result = policy
			.run("lookup", &CancelSignal::never(), |_: &DeliveryError| true, || async {
				flaky(3, &counter)
			})
			.await;

		assert_eq!(result.unwrap(), 4);
		assert_eq!(start.elapsed(), Duration::from_secs(6));
	}

	#[tokio::test(start_paused = true)]
	async fn test_attempts_are_bounded() {
		let counter = AtomicU32::new(0);
		let policy = RetryPolicy::fixed(5, Duration::from_secs(2));
		let start = Instant::now();

		let err = policy
			.run("lookup", &CancelSignal::never(), |_: &DeliveryError| true, || async {
				flaky(u32::MAX, &counter)
			})
			.await
			.unwrap_err();

		assert_eq!(counter.load(Ordering::SeqCst), 5);
		assert!(err.to_string().contains("attempt 5"));
		// Four pauses between five attempts
		assert_eq!(start.elapsed(), Duration::from_secs(8));
	}

	#[tokio::test(start_paused = true)]
	async fn test_non_retryable_error_stops_immediately() {
		let counter = AtomicU32::new(0);
		let policy = RetryPolicy::fixed(5, Duration::from_secs(2));

		let err = policy
			.run(
				"mint",
				&CancelSignal::never(),
				DeliveryError::is_retryable,
				|| async {
					counter.fetch_add(1, Ordering::SeqCst);
					Err::<(), _>(DeliveryError::Timeout {
						hash: Default::default(),
						waited_seconds: 30,
					})
				},
			)
			.await
			.unwrap_err();

		assert!(matches!(err, DeliveryError::Timeout { .. }));
		assert_eq!(counter.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_exponential_pauses_grow_and_cap() {
		let counter = AtomicU32::new(0);
		let policy =
			RetryPolicy::exponential(5, Duration::from_secs(1), 2.0, Duration::from_secs(3));
		let start = Instant::now();

		let result = policy
			.run("mint", &CancelSignal::never(), |_: &DeliveryError| true, || async {
				flaky(4, &counter)
			})
			.await;

		assert_eq!(result.unwrap(), 5);
		// 1 + 2 + 3 + 3, give or take timer rounding
		let elapsed = start.elapsed();
		assert!(elapsed >= Duration::from_secs(9));
		assert!(elapsed < Duration::from_millis(9_100));
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancel_interrupts_pause() {
		let counter = AtomicU32::new(0);
		let policy = RetryPolicy::fixed(5, Duration::from_secs(10));
		let (handle, signal) = cancellation();

		let canceller = tokio::spawn(async move {
			tokio::time::sleep(Duration::from_secs(3)).await;
			handle.cancel();
		});

		let start = Instant::now();
		let err = policy
			.run("lookup", &signal, |_: &DeliveryError| true, || async {
				flaky(u32::MAX, &counter)
			})
			.await
			.unwrap_err();
		canceller.await.unwrap();

		assert!(matches!(err, DeliveryError::Cancelled));
		assert_eq!(start.elapsed(), Duration::from_secs(3));
		assert_eq!(counter.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_zero_attempts_runs_once() {
		let counter = AtomicU32::new(0);
		let policy = RetryPolicy::fixed(0, Duration::from_secs(1));
		let _ = policy
			.run("lookup", &CancelSignal::never(), |_: &DeliveryError| true, || async {
				flaky(u32::MAX, &counter)
			})
			.await;
		assert_eq!(counter.load(Ordering::SeqCst), 1);
	}
}
