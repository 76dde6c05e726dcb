//! Report definitions, record normalization, and the cache-aside repository.

pub mod definition;
pub mod normalize;
pub mod record;
pub mod repository;

pub use definition::*;
pub use normalize::*;
pub use record::*;
pub use repository::*;
