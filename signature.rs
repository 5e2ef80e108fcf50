//! Signature extraction.
//!
//! The external symbol-renaming tool locates wrapped functions by their
//! textual signature, so the text has to use the names the compiler itself
//! uses (`alloc::string::String`, not whatever alias the source spelled).
//! Everything here is derived from [`std::any::type_name`] of the
//! instantiated function-pointer type, never from the source tokens.

use std::any::type_name;
use std::fmt;

use tracing::warn;

use crate::identity::Qualifiers;

/// Components of a wrapped function's prototype, plus its alias.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionSignature {
    return_type: String,
    name: String,
    params: String,
    qualifiers: Qualifiers,
    alias: String,
}

impl FunctionSignature {
    pub fn new(
        return_type: impl Into<String>,
        name: impl Into<String>,
        params: impl Into<String>,
        qualifiers: Qualifiers,
    ) -> Self {
        Self {
            return_type: return_type.into(),
            name: name.into(),
            params: params.into(),
            qualifiers,
            alias: String::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn return_type(&self) -> &str {
        &self.return_type
    }

    /// Fully scoped function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parenthesized parameter list, e.g. `(&str, u8)`.
    pub fn params(&self) -> &str {
        &self.params
    }

    pub fn qualifiers(&self) -> Qualifiers {
        self.qualifiers
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl fmt::Display for FunctionSignature {
    /// `<return-type> <scoped-name><parameter-list> <qualifier-text>`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}{} {}",
            self.return_type, self.name, self.params, self.qualifiers
        )
    }
}

/// Extract the signature of a free function (or an associated function
/// whose scope is already part of `name`). `P` is the unqualified function
/// pointer type, e.g. `fn(i32) -> i32`.
pub fn extract_function<P: ?Sized + 'static>(name: &str, qualifiers: Qualifiers) -> FunctionSignature {
    let description = strip_lifetimes(type_name::<P>());
    let (return_type, params) = match split_fn_type(&description) {
        Some((params, return_type)) => (return_type.to_owned(), params.to_owned()),
        None => {
            warn!("cannot parse function type {description:?}, using raw description");
            ("_".to_owned(), description.clone())
        }
    };
    FunctionSignature::new(return_type, name, params, qualifiers)
}

/// Extract the signature of a method or associated function of `T`.
///
/// The scope in `name` is only a hint: everything up to the last `::` is
/// replaced with the type name of `T`, which is what the compiler uses for
/// the symbol. `P` describes the parameters without the receiver.
pub fn extract_method<T: ?Sized + 'static, P: ?Sized + 'static>(
    name: &str,
    qualifiers: Qualifiers,
) -> FunctionSignature {
    let method = match name.rfind("::") {
        Some(pos) => &name[pos + 2..],
        None => name,
    };
    let scoped = format!("{}::{}", type_name::<T>(), method);
    extract_function::<P>(&scoped, qualifiers)
}

/// Drop `for<..>` binders and lifetimes from a type name, so `for<'a>
/// fn(&'a str, Cow<'a, str>)` reads `fn(&str, Cow<str>)`. The compiler's
/// placeholder spelling for elided lifetimes is not stable across releases.
fn strip_lifetimes(description: &str) -> String {
    let mut out = String::with_capacity(description.len());
    let mut rest = description;
    while let Some(c) = rest.chars().next() {
        let at_word_start = !out.ends_with(|p: char| p.is_alphanumeric() || p == '_');
        if at_word_start && rest.starts_with("for<") {
            match rest.find('>') {
                Some(end) => rest = rest[end + 1..].trim_start(),
                None => {
                    out.push_str(rest);
                    break;
                }
            }
            continue;
        }
        if c != '\'' {
            out.push(c);
            rest = &rest[c.len_utf8()..];
            continue;
        }
        let name_len = rest[1..]
            .find(|n: char| !(n.is_alphanumeric() || n == '_'))
            .unwrap_or(rest.len() - 1);
        rest = &rest[1 + name_len..];
        if out.ends_with(" + ") {
            out.truncate(out.len() - 3);
        } else if let Some(after) = rest.strip_prefix(", ") {
            rest = after;
        } else if let Some(after) = rest.strip_prefix(',') {
            rest = after;
        } else if let Some(after) = rest.strip_prefix('>') {
            if out.ends_with('<') {
                out.pop();
                rest = after;
            } else if out.ends_with(", ") {
                out.truncate(out.len() - 2);
            }
        } else if let Some(after) = rest.strip_prefix(' ') {
            rest = after;
        }
    }
    out
}

/// Split `fn(A, B) -> R` (optionally prefixed with `for<..>`, `unsafe` or
/// an ABI) into its parenthesized parameter list and return type.
fn split_fn_type(description: &str) -> Option<(&str, &str)> {
    let start = description.find("fn(")? + 2;
    let mut depth = 0usize;
    let mut end = None;
    for (offset, c) in description[start..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    end = Some(start + offset + 1);
                    break;
                }
            }
            _ => {}
        }
    }
    let end = end?;
    let params = &description[start..end];
    let rest = description[end..].trim();
    let return_type = match rest.strip_prefix("->") {
        Some(ret) => ret.trim(),
        None if rest.is_empty() => "()",
        None => return None,
    };
    Some((params, return_type))
}
