//! Substitution slots.
//!
//! A [`Slot`] is the registry's handle for one identity. The stand-in it
//! currently holds lives in thread-local storage, so every thread sees only
//! the fakes it installed itself. Each thread keeps a nesting depth per slot
//! to check that fakes are released in reverse order of installation.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{error, trace};

use crate::identity::{FunctionId, FunctionKey};
use crate::symbols::Wrapped;
use crate::{Error, Result};

/// Type-erased stand-in. Always an `Rc<Box<W::StandIn>>` for the marker `W`
/// named by the slot's key.
pub(crate) type StandIn = Rc<dyn Any>;

#[derive(Default)]
struct Entry {
    current: Option<StandIn>,
    depth: usize,
}

thread_local! {
    static STAND_INS: RefCell<HashMap<FunctionKey, Entry>> = RefCell::new(HashMap::new());
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Slot {
    id: FunctionId,
    key: FunctionKey,
}

impl Slot {
    pub(crate) fn new(id: FunctionId, key: FunctionKey) -> Self {
        Self { id, key }
    }

    pub fn id(&self) -> FunctionId {
        self.id
    }

    pub fn key(&self) -> FunctionKey {
        self.key
    }

    /// Whether a stand-in is installed on the calling thread.
    pub fn is_active(&self) -> bool {
        STAND_INS
            .try_with(|table| {
                table
                    .borrow()
                    .get(&self.key)
                    .is_some_and(|entry| entry.current.is_some())
            })
            .unwrap_or(false)
    }

    /// Number of live fakes for this slot on the calling thread.
    pub fn depth(&self) -> usize {
        STAND_INS
            .try_with(|table| table.borrow().get(&self.key).map_or(0, |entry| entry.depth))
            .unwrap_or(0)
    }

    /// Install `stand_in`, returning the one it replaced and the new depth.
    pub(crate) fn push(&self, stand_in: StandIn) -> (Option<StandIn>, usize) {
        STAND_INS.with(|table| {
            let mut table = table.borrow_mut();
            let entry = table.entry(self.key).or_default();
            entry.depth += 1;
            let previous = entry.current.replace(stand_in);
            trace!("{}: installed stand-in at depth {}", self.key, entry.depth);
            (previous, entry.depth)
        })
    }

    /// Put `previous` back, provided the fake at `depth` is the innermost one.
    pub(crate) fn pop(&self, previous: Option<StandIn>, depth: usize) -> Result<()> {
        let outcome = STAND_INS.try_with(|table| {
            let mut table = table.borrow_mut();
            let entry = table.entry(self.key).or_default();
            if entry.depth != depth {
                return Err(Error::OutOfOrderRelease {
                    function: self.key.to_string(),
                    expected: entry.depth,
                    found: depth,
                });
            }
            entry.depth -= 1;
            trace!("{}: restored stand-in, depth now {}", self.key, entry.depth);
            Ok(std::mem::replace(&mut entry.current, previous))
        });
        match outcome {
            // The released stand-in is dropped here, outside the borrow.
            Ok(released) => released.map(drop),
            // Thread-local storage is already torn down: nothing left to restore.
            Err(_) => Ok(()),
        }
    }
}

/// Stand-in currently installed for the wrapped function `W` on this thread.
///
/// Called by every generated trampoline. The returned handle keeps the
/// stand-in alive for the duration of the call even if the fake that
/// installed it is released from inside the call.
pub fn trampoline<W: Wrapped>() -> Option<Rc<Box<W::StandIn>>> {
    let key = FunctionKey::of::<W>();
    let current = STAND_INS
        .try_with(|table| table.borrow().get(&key).and_then(|entry| entry.current.clone()))
        .ok()
        .flatten()?;
    match current.downcast::<Box<W::StandIn>>() {
        Ok(stand_in) => {
            trace!("{key}: dispatching to stand-in");
            Some(stand_in)
        }
        Err(_) => {
            error!("{key}: stand-in has an unexpected type, calling the real function");
            None
        }
    }
}
