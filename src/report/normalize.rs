//! Upstream row shaping with explicit field-name precedence.
//!
//! The ERP is inconsistent about casing (`codigo` vs `Codigo`) and sends numbers as
//! strings. A [`FieldRule`] lists the source names it accepts in priority order; the first
//! one that is present, non-null, and not an empty string wins.

// self
use crate::{_prelude::*, report::ReportRecord};

/// Converts one upstream row into a [`ReportRecord`].
pub trait RecordNormalizer
where
	Self: Send + Sync,
{
	/// Shapes `row` into a record.
	fn normalize(&self, row: &JsonMap<String, JsonValue>) -> ReportRecord;
}

/// Normalizes a whole payload.
///
/// Anything other than a JSON array yields an empty list; non-object rows are skipped.
pub fn normalize_payload(normalizer: &dyn RecordNormalizer, payload: &JsonValue) -> Vec<ReportRecord> {
	let Some(rows) = payload.as_array() else {
		tracing::warn!("upstream payload is not an array; treating as empty");

		return Vec::new();
	};
	let records = rows
		.iter()
		.filter_map(JsonValue::as_object)
		.map(|row| normalizer.normalize(row))
		.collect::<Vec<_>>();

	if records.len() != rows.len() {
		tracing::debug!(skipped = rows.len() - records.len(), "skipped non-object rows");
	}

	records
}

/// Keeps rows exactly as the upstream sent them.
#[derive(Clone, Copy, Debug, Default)]
pub struct Passthrough;
impl RecordNormalizer for Passthrough {
	fn normalize(&self, row: &JsonMap<String, JsonValue>) -> ReportRecord {
		row.clone().into()
	}
}

/// How a source value is coerced into the target field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
	/// String; numbers and booleans are rendered. Defaults to `""`.
	Text,
	/// Number; numeric strings are parsed. Defaults to `0`.
	Amount,
	/// Boolean; accepts `true`/`false`, `1`/`0`, and `si`/`no` style strings. Defaults to `false`.
	Flag,
	/// `MM-YYYY` taken from a `DD-MM-YYYY` date. Defaults to `""`.
	MonthOf,
}

/// Maps a prioritized list of upstream field names onto one record field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldRule {
	/// Record field to populate.
	pub target: String,
	/// Upstream names, highest priority first.
	pub sources: Vec<String>,
	/// Coercion applied to the chosen value.
	pub kind: FieldKind,
	/// When `true`, the field is omitted instead of defaulted if no source matches.
	pub optional: bool,
}
impl FieldRule {
	/// Creates a required rule.
	pub fn new<I, S>(target: impl Into<String>, kind: FieldKind, sources: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			target: target.into(),
			sources: sources.into_iter().map(Into::into).collect(),
			kind,
			optional: false,
		}
	}

	/// Shorthand for a [`FieldKind::Text`] rule.
	pub fn text<I, S>(target: impl Into<String>, sources: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self::new(target, FieldKind::Text, sources)
	}

	/// Shorthand for a [`FieldKind::Amount`] rule.
	pub fn amount<I, S>(target: impl Into<String>, sources: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self::new(target, FieldKind::Amount, sources)
	}

	/// Shorthand for a [`FieldKind::Flag`] rule.
	pub fn flag<I, S>(target: impl Into<String>, sources: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self::new(target, FieldKind::Flag, sources)
	}

	/// Marks the rule optional.
	pub fn optional(mut self) -> Self {
		self.optional = true;

		self
	}

	fn pick<'a>(&self, row: &'a JsonMap<String, JsonValue>) -> Option<&'a JsonValue> {
		self.sources.iter().filter_map(|source| row.get(source)).find(|value| is_meaningful(value))
	}

	fn apply(&self, row: &JsonMap<String, JsonValue>) -> Option<JsonValue> {
		let picked = self.pick(row);

		if picked.is_none() && self.optional {
			return None;
		}

		Some(match self.kind {
			FieldKind::Text => JsonValue::String(picked.map(render_text).unwrap_or_default()),
			FieldKind::Amount => number(picked.and_then(parse_amount).unwrap_or(0.)),
			FieldKind::Flag => JsonValue::Bool(picked.and_then(parse_flag).unwrap_or(false)),
			FieldKind::MonthOf =>
				JsonValue::String(picked.and_then(JsonValue::as_str).map(month_of).unwrap_or_default()),
		})
	}
}

/// Rule-driven normalizer. Fields not covered by a rule are dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldNormalizer {
	rules: Vec<FieldRule>,
}
impl FieldNormalizer {
	/// Creates a normalizer from `rules`, applied in order.
	pub fn new(rules: impl IntoIterator<Item = FieldRule>) -> Self {
		Self { rules: rules.into_iter().collect() }
	}

	/// Appends a rule.
	pub fn with_rule(mut self, rule: FieldRule) -> Self {
		self.rules.push(rule);

		self
	}

	/// Configured rules.
	pub fn rules(&self) -> &[FieldRule] {
		&self.rules
	}

	/// Invoice lines of the `ANAFACTURACION` report, including the derived `month`.
	pub fn invoices() -> Self {
		Self::new([
			FieldRule::text("transaction_id", ["TRANSACCIONID"]),
			FieldRule::text("date", ["FECHA"]),
			FieldRule::new("month", FieldKind::MonthOf, ["FECHA"]),
			FieldRule::text("customer", ["CLIENTE"]),
			FieldRule::text("seller", ["VENDEDOR"]),
			FieldRule::text("product", ["PRODUCTO"]),
			FieldRule::amount("total", ["TOTAL"]),
			FieldRule::amount("gross_total", ["TOTALBRUTO"]),
			FieldRule::amount("concepts_total", ["TOTALCONCEPTOS"]),
			FieldRule::amount("quantity", ["CANTIDAD"]),
			FieldRule::text("status", ["ESTADO"]),
			FieldRule::text("payment_terms", ["CONDICIONPAGO"]),
			FieldRule::text("currency", ["MONEDA"]),
			FieldRule::amount("pending_amount", ["IMPORTENETOPENDIENTE"]),
			FieldRule::text("voucher", ["COMPROBANTE"]),
			FieldRule::text("description", ["DESCRIPCION"]),
			FieldRule::text("contract_number", ["NUMEROCONTRATO"]),
			FieldRule::text("company", ["EMPRESA"]),
		])
	}

	/// Customer master data.
	pub fn customers() -> Self {
		Self::new([
			FieldRule::text("code", ["codigo", "Codigo"]),
			FieldRule::text("name", ["nombre", "Nombre"]),
			FieldRule::text("legal_name", ["razonSocial", "RazonSocial"]).optional(),
			FieldRule::flag("active", ["activo", "Activo"]).optional(),
		])
	}

	/// Product master data.
	pub fn products() -> Self {
		Self::new([
			FieldRule::text("code", ["codigo", "Codigo"]),
			FieldRule::text("name", ["nombre", "Nombre"]),
			FieldRule::text("description", ["descripcion", "Descripcion"]).optional(),
			FieldRule::amount("price", ["precio", "Precio"]).optional(),
			FieldRule::flag("active", ["activo", "Activo"]).optional(),
		])
	}
}
impl RecordNormalizer for FieldNormalizer {
	fn normalize(&self, row: &JsonMap<String, JsonValue>) -> ReportRecord {
		self.rules.iter().filter_map(|rule| rule.apply(row).map(|value| (rule.target.clone(), value))).collect()
	}
}

fn is_meaningful(value: &JsonValue) -> bool {
	match value {
		JsonValue::Null => false,
		JsonValue::String(text) => !text.is_empty(),
		_ => true,
	}
}

fn render_text(value: &JsonValue) -> String {
	match value {
		JsonValue::String(text) => text.clone(),
		other => other.to_string(),
	}
}

fn parse_amount(value: &JsonValue) -> Option<f64> {
	let amount = match value {
		JsonValue::Number(number) => number.as_f64()?,
		JsonValue::String(text) => text.trim().parse().ok()?,
		_ => return None,
	};

	amount.is_finite().then_some(amount)
}

fn parse_flag(value: &JsonValue) -> Option<bool> {
	match value {
		JsonValue::Bool(flag) => Some(*flag),
		JsonValue::Number(number) => number.as_f64().map(|n| n != 0.),
		JsonValue::String(text) => match text.trim().to_ascii_lowercase().as_str() {
			"true" | "1" | "si" | "s" | "yes" | "y" => Some(true),
			"false" | "0" | "no" | "n" => Some(false),
			_ => None,
		},
		_ => None,
	}
}

fn month_of(date: &str) -> String {
	let parts = date.trim().split('-').collect::<Vec<_>>();

	match parts.as_slice() {
		[_, month, year] => format!("{month}-{year}"),
		_ => String::new(),
	}
}

fn number(value: f64) -> JsonValue {
	serde_json::Number::from_f64(value).map_or(JsonValue::from(0), JsonValue::Number)
}
