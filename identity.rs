//! Function identity resolution.
//!
//! A wrapped function is identified by a [`FunctionKey`]: the compiler-unique
//! marker type generated for it (the token) paired with a descriptor of its
//! unqualified function-pointer type. Qualifiers never take part in the key,
//! so every qualified form of one function resolves to the same identity and
//! shares one slot.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{BitOr, BitOrAssign};

use crate::symbols::Wrapped;

/// Qualifier decorations of a wrapped function.
///
/// Bit values are part of the registration format emitted by the
/// `#[wrap_function]` macro and must stay stable.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Qualifiers(u32);

impl Qualifiers {
    pub const NONE: Qualifiers = Qualifiers(0);
    pub const CONST: Qualifiers = Qualifiers(1);
    pub const VOLATILE: Qualifiers = Qualifiers(2);
    pub const NOEXCEPT: Qualifiers = Qualifiers(4);
    pub const LV_REF: Qualifiers = Qualifiers(8);
    pub const RV_REF: Qualifiers = Qualifiers(16);
    pub const CONST_REF: Qualifiers = Qualifiers(32);

    const ALL: [(Qualifiers, &'static str, &'static str); 6] = [
        (Qualifiers::CONST, "const", "K"),
        (Qualifiers::VOLATILE, "volatile", "V"),
        (Qualifiers::NOEXCEPT, "noexcept", "Do"),
        (Qualifiers::LV_REF, "&", "R"),
        (Qualifiers::RV_REF, "&&", "O"),
        (Qualifiers::CONST_REF, "const &", "KR"),
    ];

    /// Unknown bits are dropped.
    pub const fn from_bits(bits: u32) -> Self {
        Qualifiers(bits & 0x3f)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Qualifiers) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Qualifiers) -> Self {
        Qualifiers(self.0 | other.0)
    }

    /// Render the qualifier set as text.
    ///
    /// The readable form separates qualifiers with spaces (`const noexcept`).
    /// The mangled form concatenates Itanium-style codes, volatile before
    /// const and reference qualifiers last (`VKR`).
    pub fn to_text(self, mangled: bool) -> String {
        if !mangled {
            let parts: Vec<&str> = Self::ALL
                .iter()
                .filter(|(q, _, _)| self.contains(*q))
                .map(|(_, text, _)| *text)
                .collect();
            return parts.join(" ");
        }
        let mut out = String::new();
        for q in [
            Qualifiers::VOLATILE,
            Qualifiers::CONST,
            Qualifiers::CONST_REF,
            Qualifiers::LV_REF,
            Qualifiers::RV_REF,
            Qualifiers::NOEXCEPT,
        ] {
            if self.contains(q) {
                if let Some((_, _, code)) = Self::ALL.iter().find(|(known, _, _)| *known == q) {
                    out.push_str(code);
                }
            }
        }
        out
    }
}

impl BitOr for Qualifiers {
    type Output = Qualifiers;

    fn bitor(self, rhs: Qualifiers) -> Qualifiers {
        self.union(rhs)
    }
}

impl BitOrAssign for Qualifiers {
    fn bitor_assign(&mut self, rhs: Qualifiers) {
        *self = self.union(rhs);
    }
}

impl fmt::Display for Qualifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text(false))
    }
}

impl fmt::Debug for Qualifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Qualifiers({:#x}: {:?})", self.0, self.to_text(false))
    }
}

/// Runtime description of a type: its `TypeId` plus the compiler's name
/// for it. Equality and hashing only look at the id.
#[derive(Clone, Copy)]
pub struct TypeDescriptor {
    id: TypeId,
    name: &'static str,
}

impl TypeDescriptor {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Function pointer types that can name a wrapped function, together with
/// the plain `fn` type they normalize to.
///
/// `extern "C"` functions cannot unwind, which is reported as
/// [`Qualifiers::NOEXCEPT`]. Unsafety is not a qualifier: it is stripped
/// without leaving a trace.
///
/// Only pointers whose parameters carry no lifetimes are covered. A pointer
/// taking a borrow, such as `fn(&str)`, is higher-ranked and matches none of
/// the impls; build its [`FunctionRef`] with [`FunctionRef::new`] and
/// [`TypeDescriptor::of`] on the plain pointer type instead.
pub trait FnPointer: Copy + 'static {
    /// The unqualified `fn(..) -> R` pointer type.
    type Base: 'static;

    const QUALIFIERS: Qualifiers;
}

macro_rules! impl_fn_pointer {
    ($($arg:ident),*) => {
        impl<R: 'static, $($arg: 'static),*> FnPointer for fn($($arg),*) -> R {
            type Base = fn($($arg),*) -> R;
            const QUALIFIERS: Qualifiers = Qualifiers::NONE;
        }

        impl<R: 'static, $($arg: 'static),*> FnPointer for unsafe fn($($arg),*) -> R {
            type Base = fn($($arg),*) -> R;
            const QUALIFIERS: Qualifiers = Qualifiers::NONE;
        }

        impl<R: 'static, $($arg: 'static),*> FnPointer for extern "C" fn($($arg),*) -> R {
            type Base = fn($($arg),*) -> R;
            const QUALIFIERS: Qualifiers = Qualifiers::NOEXCEPT;
        }

        impl<R: 'static, $($arg: 'static),*> FnPointer for unsafe extern "C" fn($($arg),*) -> R {
            type Base = fn($($arg),*) -> R;
            const QUALIFIERS: Qualifiers = Qualifiers::NOEXCEPT;
        }
    };
}

impl_fn_pointer!();
impl_fn_pointer!(A);
impl_fn_pointer!(A, B);
impl_fn_pointer!(A, B, C);
impl_fn_pointer!(A, B, C, D);
impl_fn_pointer!(A, B, C, D, E);
impl_fn_pointer!(A, B, C, D, E, F);
impl_fn_pointer!(A, B, C, D, E, F, G);
impl_fn_pointer!(A, B, C, D, E, F, G, H);

/// A possibly qualified reference to a function, before normalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FunctionRef {
    token: TypeDescriptor,
    pointer: TypeDescriptor,
    qualifiers: Qualifiers,
}

impl FunctionRef {
    pub fn new(token: TypeDescriptor, pointer: TypeDescriptor, qualifiers: Qualifiers) -> Self {
        Self {
            token,
            pointer,
            qualifiers,
        }
    }

    /// Reference to a wrapped function through its generated marker, with
    /// the qualifiers declared at its registration site.
    pub fn of<W: Wrapped>() -> Self {
        Self::new(
            TypeDescriptor::of::<W>(),
            TypeDescriptor::of::<W::Pointer>(),
            W::registration().qualifiers,
        )
    }

    /// Reference through a qualified pointer type `P`. The pointer is
    /// normalized to its plain `fn` form and its implied qualifiers are kept.
    pub fn with_pointer<T: ?Sized + 'static, P: FnPointer>() -> Self {
        Self::new(
            TypeDescriptor::of::<T>(),
            TypeDescriptor::of::<P::Base>(),
            P::QUALIFIERS,
        )
    }

    pub fn qualifiers(&self) -> Qualifiers {
        self.qualifiers
    }

    pub fn with_qualifiers(mut self, qualifiers: Qualifiers) -> Self {
        self.qualifiers |= qualifiers;
        self
    }
}

/// Identity of one wrapped function.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionKey {
    token: TypeDescriptor,
    signature: TypeDescriptor,
}

impl FunctionKey {
    /// Canonicalize a reference: the qualifiers are stripped from the key
    /// and handed back alongside it.
    pub fn resolve(reference: &FunctionRef) -> (FunctionKey, Qualifiers) {
        let key = FunctionKey {
            token: reference.token,
            signature: reference.pointer,
        };
        (key, reference.qualifiers)
    }

    pub fn of<W: Wrapped>() -> FunctionKey {
        FunctionKey {
            token: TypeDescriptor::of::<W>(),
            signature: TypeDescriptor::of::<W::Pointer>(),
        }
    }

    pub fn token(&self) -> TypeDescriptor {
        self.token
    }

    pub fn signature(&self) -> TypeDescriptor {
        self.signature
    }
}

impl fmt::Display for FunctionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} as {}", self.token.name, self.signature.name)
    }
}

impl fmt::Debug for FunctionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FunctionKey({self})")
    }
}

/// Monotonic number assigned by a registry, in registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionId(pub(crate) u32);

impl FunctionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
