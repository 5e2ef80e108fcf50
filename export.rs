//! Signature export for the symbol-renaming tool.
//!
//! One line per registered signature, in registration order:
//!
//! ```text
//! <alias>\t<real symbol>\t<trampoline symbol>\t<signature>
//! ```

use std::io::Write;

use tracing::debug;

use crate::Result;
use crate::registry::Registry;
use crate::symbols::SymbolNames;

pub fn write_signatures<W: Write>(registry: &Registry, mut writer: W) -> Result<()> {
    for signature in registry.signatures() {
        let symbols = SymbolNames::for_alias(signature.alias());
        writeln!(
            writer,
            "{}\t{}\t{}\t{}",
            signature.alias(),
            symbols.real,
            symbols.trampoline,
            signature
        )?;
    }
    writer.flush()?;
    debug!("exported {} signatures", registry.signatures().len());
    Ok(())
}

pub fn render(registry: &Registry) -> String {
    let mut out = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_signatures(registry, &mut out);
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::identity::{FunctionKey, FunctionRef};
    use crate::signature::extract_function;

    struct Square;
    struct Halve;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        let (key, q) = FunctionKey::resolve(&FunctionRef::with_pointer::<Square, fn(i32) -> i32>());
        registry.register(key, extract_function::<fn(i32) -> i32>("demo::square", q), "demo_alias_0_square");
        let (key, q) =
            FunctionKey::resolve(&FunctionRef::with_pointer::<Halve, extern "C" fn(f64) -> f64>());
        registry.register(key, extract_function::<fn(f64) -> f64>("demo::halve", q), "demo_alias_1_halve");
        registry
    }

    #[test]
    fn test_render_lines() {
        let text = render(&registry());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "demo_alias_0_square\t__fakebind_real_demo_alias_0_square__end__\t\
                 __fakebind_wrap_demo_alias_0_square__end__\ti32 demo::square(i32) ",
                "demo_alias_1_halve\t__fakebind_real_demo_alias_1_halve__end__\t\
                 __fakebind_wrap_demo_alias_1_halve__end__\tf64 demo::halve(f64) noexcept",
            ]
        );
    }

    #[test]
    fn test_empty_registry() {
        assert_eq!(render(&Registry::new()), "");
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_writer_failure() {
        let err = write_signatures(&registry(), Broken).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
