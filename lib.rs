//! Fakebind - function substitution for whitebox tests.
//!
//! Fakebind lets a test replace the behavior of a free function, an
//! associated function or a method with a stand-in closure for the duration
//! of a scope, without touching the function's body. Wrapped functions are
//! compiled into two deterministically named symbols: the real body and a
//! trampoline that dispatches to the installed stand-in, if any.
//!
//! ```ignore
//! #[fakebind::wrap_function]
//! pub fn square(x: i32) -> i32 {
//!     x * x
//! }
//!
//! let _fake = fakebind::fake!(square, |x| x * x * x);
//! assert_eq!(square(4), 64);
//! ```
//!
//! # Modules
//!
//! - [`identity`] - Function identity and qualifiers
//! - [`signature`] - Textual signatures for the symbol-renaming tool
//! - [`registry`] - Identity to slot mapping
//! - [`slot`] - Per-thread stand-in storage and trampoline dispatch
//! - [`fake`] - Scoped overrides
//! - [`recording`] - Call recording for verification
//! - [`export`] - Signature export
//! - [`symbols`] - Link-time registration records
//!
//! # Error Handling
//!
//! Fallible operations return the consolidated [`Error`] type.

pub mod export;
pub mod fake;
pub mod identity;
pub mod recording;
pub mod registry;
pub mod signature;
pub mod slot;
pub mod symbols;

#[doc(hidden)]
pub use linkme;

/// Consolidated error type for all Fakebind operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("wrapped function with the given key not found: {key}")]
    NotWrapped { key: String },

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("fake for {function} released out of order (slot depth {expected}, fake depth {found})")]
    OutOfOrderRelease {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, Error>;

pub use fake::Fake;
pub use identity::{FnPointer, FunctionId, FunctionKey, FunctionRef, Qualifiers, TypeDescriptor};
pub use recording::{ActualInvocationsSource, Invocation, MockingContext, Recorder, Recording};
pub use registry::Registry;
pub use signature::FunctionSignature;
pub use slot::{Slot, trampoline};
pub use symbols::{Registration, SymbolNames, WRAPPED_FUNCTIONS, Wrapped};

pub use macros::{fake, fake_any, wrap_function, wrap_impl, wrapper};
