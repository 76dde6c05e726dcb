//! Flat, immutable report rows.

// self
use crate::_prelude::*;

/// One normalized upstream report row: a flat mapping of field name to JSON value.
///
/// Records are built once by a [`RecordNormalizer`](crate::report::RecordNormalizer) and
/// never mutated afterwards.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportRecord(BTreeMap<String, JsonValue>);
impl ReportRecord {
	/// Raw value of `field`.
	pub fn get(&self, field: &str) -> Option<&JsonValue> {
		self.0.get(field)
	}

	/// String value of `field`; `None` when absent or not a string.
	pub fn text(&self, field: &str) -> Option<&str> {
		self.get(field)?.as_str()
	}

	/// Numeric value of `field`; `None` when absent or not a number.
	pub fn amount(&self, field: &str) -> Option<f64> {
		self.get(field)?.as_f64()
	}

	/// Boolean value of `field`; `None` when absent or not a boolean.
	pub fn flag(&self, field: &str) -> Option<bool> {
		self.get(field)?.as_bool()
	}

	/// Returns `true` when `field` is present.
	pub fn contains(&self, field: &str) -> bool {
		self.0.contains_key(field)
	}

	/// Fields in name order.
	pub fn fields(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
		self.0.iter().map(|(name, value)| (name.as_str(), value))
	}

	/// Number of fields.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when the record has no fields.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Consumes the record and returns its fields.
	pub fn into_inner(self) -> BTreeMap<String, JsonValue> {
		self.0
	}
}
impl<K> FromIterator<(K, JsonValue)> for ReportRecord
where
	K: Into<String>,
{
	fn from_iter<I>(iter: I) -> Self
	where
		I: IntoIterator<Item = (K, JsonValue)>,
	{
		Self(iter.into_iter().map(|(name, value)| (name.into(), value)).collect())
	}
}
impl From<JsonMap<String, JsonValue>> for ReportRecord {
	fn from(map: JsonMap<String, JsonValue>) -> Self {
		map.into_iter().collect()
	}
}
