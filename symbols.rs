//! Registration records for wrapped functions.
//!
//! Every `#[wrap_function]` (and every `#[wrap]` method inside a
//! `#[wrap_impl]` block) emits one [`Registration`] into the
//! [`WRAPPED_FUNCTIONS`] distributed slice. The linker assembles the slice,
//! so registration needs no runtime initialization order.

use std::rc::Rc;

use linkme::distributed_slice;

use crate::identity::{FunctionKey, Qualifiers};
use crate::recording::Recorder;
use crate::signature::FunctionSignature;

/// Prefix of the symbol holding a wrapped function's original body.
pub const REAL_PREFIX: &str = "__fakebind_real_";

/// Prefix of the symbol holding a wrapped function's trampoline.
pub const WRAPPER_PREFIX: &str = "__fakebind_wrap_";

/// Suffix shared by both symbols.
pub const POSTFIX: &str = "__end__";

/// Static description of one wrapped function.
///
/// Fields are public so generated code can build it in a `static`.
pub struct Registration {
    pub alias: &'static str,
    /// Declared name, scoped by the declaring module.
    pub name: &'static str,
    pub qualifiers: Qualifiers,
    pub key: fn() -> FunctionKey,
    pub signature: fn(&str, Qualifiers) -> FunctionSignature,
}

impl Registration {
    pub fn key(&self) -> FunctionKey {
        (self.key)()
    }

    pub fn signature(&self) -> FunctionSignature {
        (self.signature)(self.name, self.qualifiers).with_alias(self.alias)
    }

    pub fn symbols(&self) -> SymbolNames {
        SymbolNames::for_alias(self.alias)
    }
}

/// Distributed slice of all wrapped functions linked into the binary.
#[distributed_slice]
pub static WRAPPED_FUNCTIONS: [&'static Registration] = [..];

/// Look up a registration by alias.
pub fn find(alias: &str) -> Option<&'static Registration> {
    WRAPPED_FUNCTIONS
        .iter()
        .find(|registration| registration.alias == alias)
        .copied()
}

/// The pair of symbols emitted for one alias.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolNames {
    pub real: String,
    pub trampoline: String,
}

impl SymbolNames {
    pub fn for_alias(alias: &str) -> Self {
        Self {
            real: format!("{REAL_PREFIX}{alias}{POSTFIX}"),
            trampoline: format!("{WRAPPER_PREFIX}{alias}{POSTFIX}"),
        }
    }
}

/// Implemented by the marker type generated for every wrapped function.
///
/// The marker is the function's identity token and its typed handle: fakes
/// and recorders are requested through it. Not meant to be implemented by
/// hand outside of tests.
pub trait Wrapped: Copy + 'static {
    /// Stand-in type, e.g. `dyn Fn(&mut Counter, i32) -> i32`. Methods take
    /// the receiver as the first argument.
    type StandIn: ?Sized + 'static;

    /// Unqualified function pointer type with the same shape as `StandIn`.
    type Pointer: ?Sized + 'static;

    fn registration() -> &'static Registration;

    /// Wrap `inner` so that every call is recorded into `recorder` first.
    fn record(recorder: Rc<Recorder>, inner: Box<Self::StandIn>) -> Box<Self::StandIn>;
}
