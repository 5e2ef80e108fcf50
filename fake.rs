//! Scoped overrides.

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::thread;

use tracing::{error, trace};

use crate::Result;
use crate::identity::FunctionKey;
use crate::registry::Registry;
use crate::slot::{Slot, StandIn};
use crate::symbols::Wrapped;

/// Guard that keeps a stand-in installed for the wrapped function `W`.
///
/// Dropping the guard puts back whatever the slot held before installation.
/// Guards for one function must be dropped in reverse order of creation;
/// violating that panics with [`Error::OutOfOrderRelease`](crate::Error).
///
/// Stand-ins are stored per thread. A `Fake` is bound to the thread that
/// created it, and only calls made on that thread reach the stand-in: a
/// wrapped function called from a thread spawned by the code under test
/// runs its real body.
#[must_use = "the stand-in is removed as soon as the fake is dropped"]
pub struct Fake<W: Wrapped> {
    slot: Slot,
    previous: Option<StandIn>,
    depth: usize,
    _marker: PhantomData<(W, Rc<()>)>,
}

impl<W: Wrapped> Fake<W> {
    /// Install `stand_in` for `wrapper`.
    ///
    /// # Panics
    ///
    /// If `W` is missing from the global registry, which only happens when
    /// its registration was not linked into the binary.
    pub fn install(wrapper: W, stand_in: Box<W::StandIn>) -> Self {
        match Self::try_install(wrapper, stand_in) {
            Ok(fake) => fake,
            Err(err) => panic!("{err}"),
        }
    }

    pub fn try_install(wrapper: W, stand_in: Box<W::StandIn>) -> Result<Self> {
        Self::install_in(Registry::global(), wrapper, stand_in)
    }

    /// Install through an explicit registry instead of the global one.
    pub fn install_in(registry: &Registry, _wrapper: W, stand_in: Box<W::StandIn>) -> Result<Self> {
        let slot = registry.lookup(&FunctionKey::of::<W>())?;
        let (previous, depth) = slot.push(Rc::new(stand_in));
        trace!("{}: fake installed", W::registration().name);
        Ok(Fake {
            slot,
            previous,
            depth,
            _marker: PhantomData,
        })
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    /// Nesting depth of this fake; the first live fake of a slot is 1.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl<W: Wrapped> Drop for Fake<W> {
    fn drop(&mut self) {
        let previous = self.previous.take();
        match self.slot.pop(previous, self.depth) {
            Ok(()) => trace!("{}: fake released", W::registration().name),
            Err(err) if thread::panicking() => error!("{err}"),
            Err(err) => panic!("{err}"),
        }
    }
}

impl<W: Wrapped> fmt::Debug for Fake<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fake")
            .field("function", &W::registration().name)
            .field("slot", &self.slot.id())
            .field("depth", &self.depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::identity::Qualifiers;
    use crate::recording::Recorder;
    use crate::signature::extract_function;
    use crate::slot::trampoline;
    use crate::symbols::Registration;

    // Hand-written equivalent of what `#[wrap_function]` generates, minus
    // the slice entry, so these tests can use a private registry.
    #[derive(Clone, Copy)]
    struct Double;

    static DOUBLE: Registration = Registration {
        alias: "fake_tests_alias_0_double",
        name: "fake_tests::double",
        qualifiers: Qualifiers::NONE,
        key: FunctionKey::of::<Double>,
        signature: extract_function::<fn(i32) -> i32>,
    };

    impl Wrapped for Double {
        type StandIn = dyn Fn(i32) -> i32;
        type Pointer = fn(i32) -> i32;

        fn registration() -> &'static Registration {
            &DOUBLE
        }

        fn record(recorder: Rc<Recorder>, inner: Box<Self::StandIn>) -> Box<Self::StandIn> {
            Box::new(move |x: i32| {
                recorder.record(vec![format!("{x:?}")]);
                inner(x)
            })
        }
    }

    fn double(x: i32) -> i32 {
        match trampoline::<Double>() {
            Some(stand_in) => (**stand_in)(x),
            None => x * 2,
        }
    }

    fn registry() -> Registry {
        Registry::from_registrations([&DOUBLE])
    }

    #[test]
    fn test_install_and_release() {
        let registry = registry();
        assert_eq!(double(4), 8);
        {
            let fake = Fake::install_in(&registry, Double, Box::new(|x: i32| x + 1)).unwrap();
            assert_eq!(fake.depth(), 1);
            assert!(fake.slot().is_active());
            assert_eq!(double(4), 5);
        }
        assert_eq!(double(4), 8);
    }

    #[test]
    fn test_nested_fakes_restore_in_order() {
        let registry = registry();
        let outer = Fake::install_in(&registry, Double, Box::new(|_: i32| 1)).unwrap();
        let inner = Fake::install_in(&registry, Double, Box::new(|_: i32| 2)).unwrap();
        assert_eq!(double(0), 2);
        drop(inner);
        assert_eq!(double(0), 1);
        drop(outer);
        assert_eq!(double(3), 6);
    }

    #[test]
    #[should_panic(expected = "released out of order")]
    fn test_out_of_order_release_panics() {
        let registry = registry();
        let outer = Fake::install_in(&registry, Double, Box::new(|_: i32| 1)).unwrap();
        let _inner = Fake::install_in(&registry, Double, Box::new(|_: i32| 2)).unwrap();
        drop(outer);
    }

    #[test]
    fn test_unregistered_function() {
        let err = Fake::install_in(&Registry::new(), Double, Box::new(|x: i32| x)).unwrap_err();
        assert!(matches!(err, Error::NotWrapped { .. }));
    }

    #[test]
    fn test_stand_in_outlives_release_during_call() {
        use std::cell::RefCell;

        thread_local! {
            static HELD: RefCell<Option<Fake<Double>>> = const { RefCell::new(None) };
        }

        let registry = registry();
        let fake = Fake::install_in(
            &registry,
            Double,
            Box::new(|x: i32| {
                // Releasing the fake from inside its own stand-in is fine.
                HELD.with(|held| held.borrow_mut().take());
                x - 1
            }),
        )
        .unwrap();
        HELD.with(|held| *held.borrow_mut() = Some(fake));
        assert_eq!(double(10), 9);
        assert_eq!(double(10), 20);
    }
}
