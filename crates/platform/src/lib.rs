//! # Burrow Platform
//!
//! Core platform types shared by the Burrow crates.
//!
//! This crate provides:
//! - Unified error types (`BurrowError`, `BurrowResult`)
//! - The trace observer interface (`TraceObserver`, `TraceRecord`)
//!
//! # Examples
//!
//! ```
//! use burrow_platform::{BurrowError, BurrowResult};
//!
//! fn example_function() -> BurrowResult<String> {
//!     Ok("Hello, Burrow!".to_string())
//! }
//!
//! # fn main() -> BurrowResult<()> {
//! let result = example_function()?;
//! assert_eq!(result, "Hello, Burrow!");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod error;
pub mod traits;

pub use error::{BurrowError, BurrowResult};
pub use traits::{
    CollectingObserver, Direction, NullObserver, TraceLevel, TraceObserver, TraceRecord,
};

/// Platform version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
