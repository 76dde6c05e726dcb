//! Observability helpers for broker operations.
//!
//! # Feature Flags
//!
//! - Spans named `report_broker.op` carry the `op` (operation) and `stage` (call site)
//!   fields and are always emitted through `tracing`.
//! - Enable `metrics` to increment the `report_broker_op_total` counter for every
//!   attempt/success/failure/cache hit/cache miss, labeled by `op` + `outcome`.

mod counter;
mod span;

pub use counter::*;
pub use span::*;

// self
use crate::_prelude::*;

/// Operations observed by the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// Client-credentials exchange against the identity endpoint.
	TokenFetch,
	/// Authenticated GET against the reporting API.
	UpstreamGet,
	/// Cache-aside report read.
	ReportFetch,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::TokenFetch => "token_fetch",
			OpKind::UpstreamGet => "upstream_get",
			OpKind::ReportFetch => "report_fetch",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation (one per attempt for retried operations).
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// Served from cache.
	CacheHit,
	/// Cache had no live entry.
	CacheMiss,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
			OpOutcome::CacheHit => "cache_hit",
			OpOutcome::CacheMiss => "cache_miss",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
