//! Bounded retry policies with fixed or exponential backoff.
//!
//! Retry loops in the broker are explicit `loop`s driven by an [`AttemptBudget`]; the
//! policy only decides how many attempts are allowed and how long to wait between them.

// crates.io
use rand::Rng;
// self
use crate::_prelude::*;

/// Upper bound applied to server-supplied Retry-After hints.
pub const MAX_RETRY_AFTER: Duration = Duration::seconds(30);

/// Delay schedule between attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
	/// Same delay after every failed attempt.
	Fixed(Duration),
	/// `base`, then doubling after each failed attempt, capped at `max`.
	Exponential {
		/// Delay after the first failed attempt.
		base: Duration,
		/// Ceiling for any single delay.
		max: Duration,
	},
}

/// Attempt ceiling plus backoff schedule for one retry loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Total attempts allowed, including the first one. Values below 1 are treated as 1.
	pub max_attempts: u32,
	/// Delay schedule between attempts.
	pub backoff: Backoff,
	/// Upper bound of the uniform random jitter added to each delay.
	pub jitter: Duration,
}
impl RetryPolicy {
	/// Default attempt ceiling shared by token and upstream loops.
	pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

	/// Creates a policy with no jitter.
	pub const fn new(max_attempts: u32, backoff: Backoff) -> Self {
		Self { max_attempts, backoff, jitter: Duration::ZERO }
	}

	/// Token exchange defaults: 3 attempts, 2s doubling.
	pub const fn token() -> Self {
		Self::new(
			Self::DEFAULT_MAX_ATTEMPTS,
			Backoff::Exponential { base: Duration::seconds(2), max: Duration::seconds(30) },
		)
	}

	/// Reporting API defaults: 3 attempts, fixed 1s.
	pub const fn upstream() -> Self {
		Self::new(Self::DEFAULT_MAX_ATTEMPTS, Backoff::Fixed(Duration::seconds(1)))
	}

	/// Retries immediately; handy for tests.
	pub const fn immediate(max_attempts: u32) -> Self {
		Self::new(max_attempts, Backoff::Fixed(Duration::ZERO))
	}

	/// Overrides the attempt ceiling.
	pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
		self.max_attempts = max_attempts;

		self
	}

	/// Overrides the jitter bound.
	pub fn with_jitter(mut self, jitter: Duration) -> Self {
		self.jitter = if jitter.is_negative() { Duration::ZERO } else { jitter };

		self
	}

	/// Starts a fresh attempt budget for one retry loop.
	pub fn budget(&self) -> AttemptBudget {
		AttemptBudget { used: 0, max: self.max_attempts.max(1) }
	}

	/// Delay to wait after `attempt` (1-based) failed.
	///
	/// A server hint wins when it is longer than the scheduled delay, capped at
	/// [`MAX_RETRY_AFTER`].
	pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
		let scheduled = match self.backoff {
			Backoff::Fixed(delay) => delay,
			Backoff::Exponential { base, max } => {
				let exponent = attempt.saturating_sub(1).min(30);
				let factor = 1_i32 << exponent;

				base.checked_mul(factor).map_or(max, |delay| delay.min(max))
			},
		};
		let scheduled = match hint {
			Some(hint) if hint > scheduled => hint.min(MAX_RETRY_AFTER),
			_ => scheduled,
		};

		scheduled.max(Duration::ZERO) + self.sample_jitter()
	}

	fn sample_jitter(&self) -> Duration {
		let bound = self.jitter.whole_milliseconds();

		if bound <= 0 {
			return Duration::ZERO;
		}

		let bound = i64::try_from(bound).unwrap_or(i64::MAX);

		Duration::milliseconds(rand::rng().random_range(0..=bound))
	}
}

/// Counts attempts against a fixed ceiling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttemptBudget {
	used: u32,
	max: u32,
}
impl AttemptBudget {
	/// Records the start of a new attempt and returns its 1-based number.
	pub fn begin(&mut self) -> u32 {
		self.used = self.used.saturating_add(1);

		self.used
	}

	/// Attempts started so far.
	pub fn used(&self) -> u32 {
		self.used
	}

	/// Returns `true` once no further attempt may start.
	pub fn exhausted(&self) -> bool {
		self.used >= self.max
	}
}

/// Suspends the current task for `delay`; non-positive delays return immediately.
pub async fn pause(delay: Duration) {
	if delay.is_positive() {
		tokio::time::sleep(delay.unsigned_abs()).await;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn exponential_backoff_doubles_and_caps() {
		let policy = RetryPolicy::token();

		assert_eq!(policy.delay_for(1, None), Duration::seconds(2));
		assert_eq!(policy.delay_for(2, None), Duration::seconds(4));
		assert_eq!(policy.delay_for(3, None), Duration::seconds(8));
		assert_eq!(policy.delay_for(40, None), Duration::seconds(30));
	}

	#[test]
	fn fixed_backoff_respects_longer_hints_up_to_cap() {
		let policy = RetryPolicy::upstream();

		assert_eq!(policy.delay_for(1, None), Duration::seconds(1));
		assert_eq!(policy.delay_for(2, Some(Duration::milliseconds(10))), Duration::seconds(1));
		assert_eq!(policy.delay_for(1, Some(Duration::seconds(5))), Duration::seconds(5));
		assert_eq!(policy.delay_for(1, Some(Duration::hours(1))), MAX_RETRY_AFTER);
	}

	#[test]
	fn jitter_stays_within_bound() {
		let policy = RetryPolicy::upstream().with_jitter(Duration::milliseconds(250));

		for attempt in 1..=20 {
			let delay = policy.delay_for(attempt, None);

			assert!(delay >= Duration::seconds(1));
			assert!(delay <= Duration::milliseconds(1_250));
		}
	}

	#[test]
	fn budget_enforces_ceiling() {
		let mut budget = RetryPolicy::immediate(3).budget();

		assert_eq!(budget.begin(), 1);
		assert!(!budget.exhausted());
		assert_eq!(budget.begin(), 2);
		assert_eq!(budget.begin(), 3);
		assert!(budget.exhausted());

		let mut zero = RetryPolicy::immediate(0).budget();

		assert_eq!(zero.begin(), 1);
		assert!(zero.exhausted(), "A zero ceiling still allows exactly one attempt.");
	}
}
