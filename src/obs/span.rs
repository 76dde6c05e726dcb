// crates.io
use tracing::instrument::Instrumented;
// self
use crate::{_prelude::*, obs::OpKind};

/// A span builder used by broker operations.
#[derive(Clone, Debug)]
pub struct OpSpan {
	span: tracing::Span,
}
impl OpSpan {
	/// Creates a new span tagged with the provided operation + stage.
	pub fn new(kind: OpKind, stage: &'static str) -> Self {
		Self { span: tracing::info_span!("report_broker.op", op = kind.as_str(), stage) }
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		// Scoped so `OpSpan` values don't resolve `.instrument` to the blanket trait method.
		use tracing::Instrument;

		fut.instrument(self.span.clone())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = OpSpan::new(OpKind::TokenFetch, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);

		let value = OpSpan::new(OpKind::ReportFetch, "by_value").instrument(async { 7 }).await;

		assert_eq!(value, 7);
	}
}
