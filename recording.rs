//! Call recording.
//!
//! A [`Recording`] wraps stand-ins so that each intercepted call is logged
//! as an [`Invocation`] before the stand-in runs. Invocations are kept per
//! wrapped function in a [`Recorder`]; one sequence counter is shared by all
//! recorders of a recording, so invocations of different functions can be
//! put back into call order.
//!
//! Arguments are captured as text rather than kept by reference, so a
//! recording holds no borrows and can outlive the values it saw. Types
//! implementing `Debug` are printed with it, everything else as a
//! `<type name>` placeholder. Checks on recorded arguments therefore compare
//! strings, not the original values.

use std::any::type_name;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use tracing::trace;

use crate::fake::Fake;
use crate::identity::FunctionKey;
use crate::registry::Registry;
use crate::symbols::Wrapped;
use crate::{Error, Result};

/// One recorded call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    ordinal: u64,
    key: FunctionKey,
    method: Rc<str>,
    arguments: Vec<String>,
}

impl Invocation {
    /// Position of the call within its recording, starting at 0.
    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    pub fn key(&self) -> FunctionKey {
        self.key
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Argument text in call order. For methods the receiver comes first.
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.method, self.arguments.join(", "))
    }
}

/// Anything that can report the calls it has seen.
pub trait ActualInvocationsSource {
    /// Append every recorded invocation to `into`.
    fn actual_invocations(&self, into: &mut Vec<Rc<Invocation>>);
}

/// Invocations of one wrapped function.
pub struct Recorder {
    key: FunctionKey,
    method: Rc<str>,
    sequence: Rc<Cell<u64>>,
    invocations: RefCell<Vec<Rc<Invocation>>>,
}

impl Recorder {
    fn new(key: FunctionKey, method: &str, sequence: Rc<Cell<u64>>) -> Self {
        Self {
            key,
            method: Rc::from(method),
            sequence,
            invocations: RefCell::new(Vec::new()),
        }
    }

    pub fn record(&self, arguments: Vec<String>) -> Rc<Invocation> {
        let ordinal = self.sequence.get();
        self.sequence.set(ordinal + 1);
        let invocation = Rc::new(Invocation {
            ordinal,
            key: self.key,
            method: self.method.clone(),
            arguments,
        });
        trace!("recorded {invocation}");
        self.invocations.borrow_mut().push(invocation.clone());
        invocation
    }

    pub fn key(&self) -> FunctionKey {
        self.key
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn invocations(&self) -> Vec<Rc<Invocation>> {
        self.invocations.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.invocations.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.invocations.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.invocations.borrow_mut().clear();
    }
}

impl ActualInvocationsSource for Recorder {
    fn actual_invocations(&self, into: &mut Vec<Rc<Invocation>>) {
        into.extend(self.invocations.borrow().iter().cloned());
    }
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("method", &self.method)
            .field("invocations", &self.len())
            .finish()
    }
}

#[derive(Default)]
struct Recorders {
    by_key: HashMap<FunctionKey, Rc<Recorder>>,
    order: Vec<Rc<Recorder>>,
}

/// Shared handle to a set of recorders. Clones refer to the same recording.
#[derive(Clone, Default)]
pub struct Recording {
    recorders: Rc<RefCell<Recorders>>,
    sequence: Rc<Cell<u64>>,
}

impl Recording {
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorder for `W`, created on first request.
    pub fn recorder<W: Wrapped>(&self, _wrapper: W) -> Rc<Recorder> {
        let key = FunctionKey::of::<W>();
        if let Some(recorder) = self.recorders.borrow().by_key.get(&key) {
            return recorder.clone();
        }
        let signature = W::registration().signature();
        let recorder = Rc::new(Recorder::new(key, signature.name(), self.sequence.clone()));
        let mut recorders = self.recorders.borrow_mut();
        recorders.by_key.insert(key, recorder.clone());
        recorders.order.push(recorder.clone());
        recorder
    }

    /// Install `stand_in` for `wrapper`, recording every call first.
    pub fn fake<W: Wrapped>(&self, wrapper: W, stand_in: Box<W::StandIn>) -> Fake<W> {
        Fake::install(wrapper, W::record(self.recorder(wrapper), stand_in))
    }

    pub fn fake_in<W: Wrapped>(
        &self,
        registry: &Registry,
        wrapper: W,
        stand_in: Box<W::StandIn>,
    ) -> Result<Fake<W>> {
        Fake::install_in(registry, wrapper, W::record(self.recorder(wrapper), stand_in))
    }

    /// Verification context for `wrapper`.
    pub fn stub<W: Wrapped>(&self, wrapper: W) -> MockingContext<W> {
        MockingContext {
            recorder: self.recorder(wrapper),
            recording: self.clone(),
            _marker: PhantomData,
        }
    }

    /// Every recorded invocation, in call order.
    pub fn all_actual_invocations(&self) -> Vec<Rc<Invocation>> {
        let mut all = Vec::new();
        self.actual_invocations(&mut all);
        all.sort_by_key(|invocation| invocation.ordinal);
        all
    }

    /// Forget recorded invocations. Recorders stay attached to their fakes.
    pub fn clear(&self) {
        for recorder in &self.recorders.borrow().order {
            recorder.clear();
        }
    }
}

impl ActualInvocationsSource for Recording {
    fn actual_invocations(&self, into: &mut Vec<Rc<Invocation>>) {
        for recorder in &self.recorders.borrow().order {
            recorder.actual_invocations(into);
        }
    }
}

impl fmt::Debug for Recording {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.recorders.borrow().order.iter()).finish()
    }
}

/// Per-function view of a [`Recording`].
pub struct MockingContext<W: Wrapped> {
    recorder: Rc<Recorder>,
    recording: Recording,
    _marker: PhantomData<W>,
}

impl<W: Wrapped> MockingContext<W> {
    pub fn method_name(&self) -> &str {
        self.recorder.method()
    }

    pub fn invocations(&self) -> Vec<Rc<Invocation>> {
        self.recorder.invocations()
    }

    pub fn len(&self) -> usize {
        self.recorder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorder.is_empty()
    }

    pub fn scan(&self, mut scanner: impl FnMut(&Invocation)) {
        for invocation in self.recorder.invocations() {
            scanner(&invocation);
        }
    }

    /// The recording this context reads from.
    pub fn involved_recording(&self) -> &Recording {
        &self.recording
    }

    /// Original callables cannot be handed out: the real function is only
    /// reachable through its own symbol.
    pub fn original_method(&self) -> Result<Box<W::StandIn>> {
        Err(Error::Unsupported(
            "the original function cannot be obtained through a recording",
        ))
    }
}

impl<W: Wrapped> ActualInvocationsSource for MockingContext<W> {
    fn actual_invocations(&self, into: &mut Vec<Rc<Invocation>>) {
        self.recorder.actual_invocations(into);
    }
}

#[doc(hidden)]
pub struct Argument<'a, T: ?Sized>(pub &'a T);

#[doc(hidden)]
pub trait DescribeDebug {
    fn describe(&self) -> String;
}

impl<T: fmt::Debug + ?Sized> DescribeDebug for Argument<'_, T> {
    fn describe(&self) -> String {
        format!("{:?}", self.0)
    }
}

#[doc(hidden)]
pub trait DescribeOpaque {
    fn describe(&self) -> String;
}

impl<T: ?Sized> DescribeOpaque for &Argument<'_, T> {
    fn describe(&self) -> String {
        format!("<{}>", type_name::<T>())
    }
}

/// Describe an argument for recording: `Debug` output when available, the
/// type name otherwise. Used by generated code.
#[doc(hidden)]
#[macro_export]
macro_rules! __describe {
    ($value:expr) => {{
        #[allow(unused_imports)]
        use $crate::recording::{DescribeDebug as _, DescribeOpaque as _};
        (&$crate::recording::Argument(&$value)).describe()
    }};
}
