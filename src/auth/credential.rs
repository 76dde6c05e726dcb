//! Bearer credential and client-credential models.

// self
use crate::{_prelude::*, auth::secret::TokenSecret};

/// Default buffer subtracted from a credential's expiry to absorb remote clock skew.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::seconds(60);

/// Short-lived bearer token plus the instant it stops being accepted.
///
/// Credentials are replaced wholesale on renewal and never partially mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credential {
	/// Bearer token value; callers must avoid logging it.
	pub token: TokenSecret,
	/// Instant the token was obtained.
	pub issued_at: OffsetDateTime,
	/// Instant the identity provider stops accepting the token.
	pub expires_at: OffsetDateTime,
}
impl Credential {
	/// Creates a credential valid from `issued_at` for `lifetime`.
	pub fn new(token: impl Into<String>, issued_at: OffsetDateTime, lifetime: Duration) -> Self {
		Self { token: TokenSecret::new(token), issued_at, expires_at: issued_at + lifetime }
	}

	/// Returns `true` when the token can be handed out at `now`.
	///
	/// A token within `safety_margin` of its expiry counts as already expired.
	pub fn is_fresh_at(&self, now: OffsetDateTime, safety_margin: Duration) -> bool {
		!self.token.is_blank() && self.expires_at - now > safety_margin
	}

	/// Remaining lifetime at `now`, clamped at zero.
	pub fn remaining_at(&self, now: OffsetDateTime) -> Duration {
		(self.expires_at - now).max(Duration::ZERO)
	}
}

/// Client id/secret pair exchanged for bearer tokens.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
	/// Client identifier issued by the ERP.
	pub client_id: String,
	/// Client secret; redacted in formatting.
	pub client_secret: TokenSecret,
}
impl ClientCredentials {
	/// Creates a new credential pair.
	pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
		Self { client_id: client_id.into(), client_secret: TokenSecret::new(client_secret) }
	}
}
impl Debug for ClientCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientCredentials")
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.finish()
	}
}
