mod common;

use std::collections::HashSet;

use fakebind::{
    FunctionKey, Registry, SymbolNames, WRAPPED_FUNCTIONS, Wrapped, export, symbols, wrap_function,
};

#[wrap_function]
fn alpha(x: u8) -> u8 {
    x
}

#[wrap_function(namespace = "custom-space")]
fn beta() -> bool {
    true
}

#[wrap_function(alias = "registry_export_gamma")]
fn gamma(text: String) -> usize {
    text.len()
}

#[wrap_function(qualifiers(noexcept, const_ref))]
fn delta(value: i16) -> i16 {
    value
}

#[test]
fn test_alias_generation() {
    common::setup_logging();
    let alpha = alpha::registration().alias;
    assert!(alpha.starts_with("registry_export_alias_"), "{alpha}");
    assert!(alpha.ends_with("_alpha"), "{alpha}");

    let beta = beta::registration().alias;
    assert!(beta.starts_with("custom_space_alias_"), "{beta}");
    assert!(beta.ends_with("_beta"), "{beta}");

    assert_eq!(gamma::registration().alias, "registry_export_gamma");
}

#[test]
fn test_aliases_are_unique() {
    let aliases: HashSet<&str> = WRAPPED_FUNCTIONS.iter().map(|registration| registration.alias).collect();
    assert_eq!(aliases.len(), WRAPPED_FUNCTIONS.len());
    assert_eq!(WRAPPED_FUNCTIONS.len(), 4);
}

#[test]
fn test_find_by_alias() {
    let registration = symbols::find("registry_export_gamma").unwrap();
    assert_eq!(registration.key(), FunctionKey::of::<gamma>());
    assert_eq!(registration.name, "registry_export::gamma");
    assert_eq!(
        registration.symbols(),
        SymbolNames {
            real: "__fakebind_real_registry_export_gamma__end__".to_owned(),
            trampoline: "__fakebind_wrap_registry_export_gamma__end__".to_owned(),
        }
    );
}

#[test]
fn test_global_registry_has_one_slot_per_function() {
    let registry = Registry::global();
    assert_eq!(registry.len(), WRAPPED_FUNCTIONS.len());
    assert_eq!(registry.signatures().len(), WRAPPED_FUNCTIONS.len());
    for registration in WRAPPED_FUNCTIONS {
        assert!(registry.contains(&registration.key()), "{}", registration.alias);
    }
    let ids: HashSet<usize> = registry.slots().map(|slot| slot.id().index()).collect();
    assert_eq!(ids.len(), registry.len());
}

#[test]
fn test_duplicate_registration_shares_slot() {
    let gamma = gamma::registration();
    let registry = Registry::from_registrations([gamma, gamma]);
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.signatures().len(), 2);
}

#[test]
fn test_qualifiers_in_signature() {
    let signature = delta::registration().signature();
    assert_eq!(
        signature.to_string(),
        "i16 registry_export::delta(i16) noexcept const &"
    );
}

#[test]
fn test_export_lines() {
    let registry = Registry::global();
    let text = export::render(registry);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), registry.signatures().len());

    for (line, signature) in lines.iter().zip(registry.signatures()) {
        assert!(line.starts_with(&format!("{}\t", signature.alias())), "{line}");
    }
    assert!(lines.contains(
        &"registry_export_gamma\t__fakebind_real_registry_export_gamma__end__\t\
          __fakebind_wrap_registry_export_gamma__end__\t\
          usize registry_export::gamma(alloc::string::String) "
    ));

    let mut buffer = Vec::new();
    export::write_signatures(registry, &mut buffer).unwrap();
    assert_eq!(String::from_utf8(buffer).unwrap(), text);
}
