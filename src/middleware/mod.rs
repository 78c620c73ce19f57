//! HTTP middleware: error formatting, request logging, rate limiting,
//! origin trust.

pub mod error;
pub mod logging;
pub mod origin;
pub mod rate_limit;

pub use error::{get_request_id_from_headers, ErrorResponse};
pub use logging::{request_logging_middleware, UuidRequestId};
pub use origin::is_trusted_origin;
pub use rate_limit::{RateExceeded, RateLimiter};
