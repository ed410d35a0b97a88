use std::time::Duration;

use tokio::{sync::Mutex, time::Instant};

/// Minimum-interval limiter for one provider. Callers awaiting a slot are
/// serialized by the mutex, so concurrent chunks never burst past the
/// configured rate.
pub struct RateLimiter {
	min_interval: Duration,
	last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
	pub fn from_rpm(rpm: u32) -> Self {
		let min_interval = if rpm == 0 {
			Duration::ZERO
		} else {
			Duration::from_secs_f64(60. / f64::from(rpm))
		};

		Self { min_interval, last_call: Mutex::new(None) }
	}

	/// Sleeps until the minimum interval since the previous call has elapsed,
	/// then claims the slot.
	pub async fn wait_for_slot(&self) {
		let mut last_call = self.last_call.lock().await;

		if let Some(previous) = *last_call {
			let ready_at = previous + self.min_interval;
			let now = Instant::now();

			if ready_at > now {
				tokio::time::sleep(ready_at - now).await;
			}
		}

		*last_call = Some(Instant::now());
	}
}
