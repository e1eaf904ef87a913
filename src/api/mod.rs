//! REST API module.
//!
//! Read-only handlers over the registry store. Successful responses are the
//! bare payload; failures use the [`crate::errors::ErrorResponse`] body.

mod companies;
mod export;

pub use companies::*;
pub use export::*;

/// Response type for handlers.
pub type ApiResult<T> = Result<T, crate::errors::AppError>;

/// Upper bound for the `limit` query parameter.
pub const MAX_PAGE_LIMIT: u32 = 100;
