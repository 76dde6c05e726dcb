//! Bearer-credential models, the identity-endpoint fetcher, and the single-flight store.

pub mod credential;
pub mod fetcher;
pub mod secret;
pub mod store;

pub use credential::*;
pub use fetcher::*;
pub use secret::*;
pub use store::*;
