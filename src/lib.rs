//! Authenticated ERP reporting client: single-flight bearer-token lifecycle, bounded
//! retries against the reporting API, and a cache-aside report repository that never
//! lets concurrent readers stampede the upstream.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod broker;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod flight;
pub mod http;
pub mod id;
pub mod obs;
pub mod report;
pub mod retry;
pub mod upstream;

pub use broker::ReportBroker;
pub use error::{Error, ErrorKind, Result};

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::Hash,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::{Map as JsonMap, Value as JsonValue};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::Result;
}

pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
