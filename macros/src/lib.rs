use std::sync::atomic::{AtomicUsize, Ordering};

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::meta::ParseNestedMeta;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::visit::Visit;
use syn::visit_mut::VisitMut;
use syn::{
    Attribute, Expr, FnArg, Ident, ImplItem, ImplItemFn, ItemFn, ItemImpl, LitStr, Meta, Pat,
    PatIdent, Path, Receiver, ReturnType, Signature, Token, Type, TypeImplTrait, Visibility,
    parse_macro_input, parse_quote,
};

const REAL_PREFIX: &str = "__fakebind_real_";
const WRAP_PREFIX: &str = "__fakebind_wrap_";
const POSTFIX: &str = "__end__";

/// Compile-time override of the wrapping namespace.
const NAMESPACE_VAR: &str = "FAKEBIND_WRAP_NAMESPACE";

const CONST: u32 = 1;
const NOEXCEPT: u32 = 4;
const RV_REF: u32 = 16;

const QUALIFIERS: [(&str, u32); 6] = [
    ("constant", CONST),
    ("volatile", 2),
    ("noexcept", NOEXCEPT),
    ("lvalue", 8),
    ("rvalue", RV_REF),
    ("const_ref", 32),
];

/// Per-crate alias counter. One proc-macro instance serves one crate.
static ALIAS_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Makes a free function substitutable from tests.
///
/// This attribute macro:
/// 1. Moves the body into `__fakebind_real_<name>`, exported as
///    `__fakebind_real_<alias>__end__`
/// 2. Emits a trampoline under the original name, exported as
///    `__fakebind_wrap_<alias>__end__`, which calls the installed stand-in
///    if there is one and the real body otherwise
/// 3. Emits a marker type with the function's name and registers it in
///    `fakebind::WRAPPED_FUNCTIONS`
///
/// # Options
///
/// - `namespace = "..."` overrides the alias namespace (default: the
///   `FAKEBIND_WRAP_NAMESPACE` variable at compile time, then the crate name)
/// - `alias = "..."` sets the alias verbatim
/// - `qualifiers(constant, volatile, noexcept, lvalue, rvalue, const_ref)`
///   adds qualifiers to the exported signature
///
/// # Example
///
/// ```ignore
/// #[wrap_function]
/// pub fn square(x: i32) -> i32 {
///     x * x
/// }
/// ```
///
/// Expands to:
///
/// ```ignore
/// #[inline(never)]
/// #[unsafe(export_name = "__fakebind_real_demo_alias_0_square__end__")]
/// fn __fakebind_real_square(x: i32) -> i32 {
///     x * x
/// }
///
/// #[inline(never)]
/// #[unsafe(export_name = "__fakebind_wrap_demo_alias_0_square__end__")]
/// pub fn square(x: i32) -> i32 {
///     match ::fakebind::trampoline::<square>() {
///         Some(stand_in) => (**stand_in)(x),
///         None => __fakebind_real_square(x),
///     }
/// }
///
/// pub struct square {}
///
/// impl ::fakebind::Wrapped for square { /* ... */ }
///
/// #[linkme::distributed_slice(::fakebind::symbols::WRAPPED_FUNCTIONS)]
/// static __FAKEBIND_ENTRY_SQUARE: &::fakebind::Registration = &__FAKEBIND_REGISTRATION_SQUARE;
/// ```
#[proc_macro_attribute]
pub fn wrap_function(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut options = WrapOptions::default();
    let parser = syn::meta::parser(|meta| options.parse(meta));
    parse_macro_input!(attr with parser);
    let input = parse_macro_input!(item as ItemFn);

    expand_function(options, input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Makes methods and associated functions of an inherent `impl` block
/// substitutable. Only items marked `#[wrap]` (which accepts the same
/// options as `#[wrap_function]`) are wrapped.
///
/// The marker of `Type::method` is reachable as the associated constant
/// `Type::__fakebind_method`; the [`wrapper!`] macro spells that for you.
///
/// # Example
///
/// ```ignore
/// #[wrap_impl]
/// impl Counter {
///     #[wrap]
///     pub fn next(&mut self) -> u32 {
///         self.count += 1;
///         self.count
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn wrap_impl(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        let attr = TokenStream2::from(attr);
        return syn::Error::new_spanned(attr, "#[wrap_impl] takes no options; put them on #[wrap]")
            .into_compile_error()
            .into();
    }
    let input = parse_macro_input!(item as ItemImpl);

    expand_impl(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// The marker of a wrapped function: `wrapper!(square)` or
/// `wrapper!(Counter::next)`.
///
/// A path whose second-to-last segment is `Self` or starts with an
/// uppercase letter is taken as a method of that type.
#[proc_macro]
pub fn wrapper(input: TokenStream) -> TokenStream {
    let path = parse_macro_input!(input as Path);
    marker_expr(&path).into()
}

/// Install a stand-in: `let _fake = fake!(square, |x| x + 1);`
///
/// Methods receive the receiver as the first argument.
#[proc_macro]
pub fn fake(input: TokenStream) -> TokenStream {
    let FakeInput { path, stand_in } = parse_macro_input!(input as FakeInput);
    let marker = marker_expr(&path);
    quote!(#marker.fake(#stand_in)).into()
}

/// Install a stand-in for a method that ignores the receiver.
#[proc_macro]
pub fn fake_any(input: TokenStream) -> TokenStream {
    let FakeInput { path, stand_in } = parse_macro_input!(input as FakeInput);
    let marker = marker_expr(&path);
    quote!(#marker.fake_any(#stand_in)).into()
}

struct FakeInput {
    path: Path,
    stand_in: Expr,
}

impl Parse for FakeInput {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let path = input.parse()?;
        input.parse::<Token![,]>()?;
        let stand_in = input.parse()?;
        input.parse::<Option<Token![,]>>()?;
        Ok(FakeInput { path, stand_in })
    }
}

fn marker_expr(path: &Path) -> TokenStream2 {
    let segments: Vec<&Ident> = path.segments.iter().map(|segment| &segment.ident).collect();
    let is_method = match segments.len().checked_sub(2).map(|owner| segments[owner].to_string()) {
        Some(owner) => owner == "Self" || owner.starts_with(|c: char| c.is_ascii_uppercase()),
        None => false,
    };
    if is_method {
        let mut path = path.clone();
        if let Some(last) = path.segments.last_mut() {
            last.ident = format_ident!("__fakebind_{}", last.ident);
        }
        quote!((#path))
    } else {
        quote!((#path {}))
    }
}

#[derive(Default)]
struct WrapOptions {
    namespace: Option<String>,
    alias: Option<String>,
    qualifiers: u32,
}

impl WrapOptions {
    fn parse(&mut self, meta: ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("namespace") {
            let value: LitStr = meta.value()?.parse()?;
            self.namespace = Some(value.value());
        } else if meta.path.is_ident("alias") {
            let value: LitStr = meta.value()?.parse()?;
            self.alias = Some(value.value());
        } else if meta.path.is_ident("qualifiers") {
            meta.parse_nested_meta(|qualifier| {
                let bit = QUALIFIERS
                    .iter()
                    .find(|(name, _)| qualifier.path.is_ident(*name))
                    .map(|(_, bit)| *bit)
                    .ok_or_else(|| {
                        qualifier.error(
                            "unknown qualifier, expected one of: \
                             constant, volatile, noexcept, lvalue, rvalue, const_ref",
                        )
                    })?;
                self.qualifiers |= bit;
                Ok(())
            })?;
        } else {
            return Err(meta.error("unsupported option, expected `namespace`, `alias` or `qualifiers`"));
        }
        Ok(())
    }

    fn alias(&self, name: &str) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        let n = ALIAS_COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("{}_alias_{n}_{name}", namespace(self.namespace.as_deref()))
    }
}

fn namespace(explicit: Option<&str>) -> String {
    let raw = match explicit {
        Some(namespace) => namespace.to_owned(),
        None => std::env::var(NAMESPACE_VAR)
            .ok()
            .filter(|namespace| !namespace.is_empty())
            .or_else(|| std::env::var("CARGO_CRATE_NAME").ok())
            .unwrap_or_else(|| "fakebind".to_owned()),
    };
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

struct Symbols {
    real: String,
    wrap: String,
}

impl Symbols {
    fn new(alias: &str) -> Self {
        Self {
            real: format!("{REAL_PREFIX}{alias}{POSTFIX}"),
            wrap: format!("{WRAP_PREFIX}{alias}{POSTFIX}"),
        }
    }
}

fn check_signature(sig: &Signature) -> syn::Result<()> {
    if let Some(token) = &sig.asyncness {
        return Err(syn::Error::new_spanned(token, "async functions cannot be wrapped"));
    }
    if let Some(token) = &sig.constness {
        return Err(syn::Error::new_spanned(token, "const functions cannot be wrapped"));
    }
    if let Some(variadic) = &sig.variadic {
        return Err(syn::Error::new_spanned(variadic, "variadic functions cannot be wrapped"));
    }
    if !sig.generics.params.is_empty() || sig.generics.where_clause.is_some() {
        return Err(syn::Error::new_spanned(
            &sig.generics,
            "generic functions cannot be wrapped",
        ));
    }
    let mut finder = ImplTraitFinder(None);
    for input in &sig.inputs {
        finder.visit_fn_arg(input);
    }
    finder.visit_return_type(&sig.output);
    if let Some(span) = finder.0 {
        return Err(syn::Error::new(span, "`impl Trait` cannot be used in a wrapped function"));
    }
    Ok(())
}

fn check_attrs(attrs: &[Attribute]) -> syn::Result<()> {
    for attr in attrs {
        let path = attr.path();
        if path.is_ident("inline") || path.is_ident("no_mangle") || path.is_ident("export_name") {
            return Err(syn::Error::new_spanned(
                attr,
                "wrapped functions control their own inlining and symbol names",
            ));
        }
    }
    Ok(())
}

struct ImplTraitFinder(Option<Span>);

impl<'ast> Visit<'ast> for ImplTraitFinder {
    fn visit_type_impl_trait(&mut self, node: &'ast TypeImplTrait) {
        if self.0.is_none() {
            self.0 = Some(node.impl_token.span);
        }
    }
}

struct ReplaceSelf<'a>(&'a Type);

impl VisitMut for ReplaceSelf<'_> {
    fn visit_type_mut(&mut self, ty: &mut Type) {
        if let Type::Path(path) = ty {
            if path.qself.is_none() && path.path.is_ident("Self") {
                *ty = self.0.clone();
                return;
            }
        }
        syn::visit_mut::visit_type_mut(self, ty);
    }
}

fn replace_self(ty: &Type, self_ty: &Type) -> Type {
    let mut ty = ty.clone();
    ReplaceSelf(self_ty).visit_type_mut(&mut ty);
    ty
}

fn cfg_attrs(attrs: &[Attribute]) -> Vec<&Attribute> {
    attrs.iter().filter(|attr| attr.path().is_ident("cfg")).collect()
}

/// `extern "C"` and friends cannot unwind.
fn abi_qualifiers(sig: &Signature) -> u32 {
    let Some(abi) = &sig.abi else {
        return 0;
    };
    let name = abi.name.as_ref().map_or_else(|| "C".to_owned(), LitStr::value);
    if name == "Rust" || name.ends_with("-unwind") { 0 } else { NOEXCEPT }
}

fn receiver_qualifiers(receiver: &Receiver) -> u32 {
    match (&receiver.reference, &receiver.mutability, &receiver.colon_token) {
        (Some(_), None, _) => CONST,
        (None, _, None) => RV_REF,
        _ => 0,
    }
}

struct Argument {
    ident: Ident,
    ty: Type,
}

/// Arguments after the receiver. Destructuring patterns get generated names.
fn typed_arguments(sig: &Signature) -> Vec<Argument> {
    sig.inputs
        .iter()
        .filter_map(|input| match input {
            FnArg::Typed(pat) => Some(pat),
            FnArg::Receiver(_) => None,
        })
        .enumerate()
        .map(|(index, pat)| {
            let ident = match &*pat.pat {
                Pat::Ident(PatIdent {
                    ident,
                    by_ref: None,
                    subpat: None,
                    ..
                }) => ident.clone(),
                _ => format_ident!("__fakebind_arg{index}"),
            };
            Argument {
                ident,
                ty: (*pat.ty).clone(),
            }
        })
        .collect()
}

/// The trampoline's parameter list: plain identifiers, no `mut`.
fn plain_inputs(sig: &Signature, args: &[Argument]) -> Punctuated<FnArg, Token![,]> {
    let mut inputs = Punctuated::new();
    if let Some(receiver) = sig.receiver() {
        let mut receiver = receiver.clone();
        if receiver.reference.is_none() {
            receiver.mutability = None;
        }
        inputs.push(FnArg::Receiver(receiver));
    }
    for Argument { ident, ty } in args {
        inputs.push(parse_quote!(#ident: #ty));
    }
    inputs
}

/// Everything emitted next to a wrapped function: the marker type, its
/// `Wrapped` impl and fake constructors, and the registration.
struct Wrapping<'a> {
    marker: Ident,
    vis: &'a Visibility,
    cfgs: Vec<&'a Attribute>,
    alias: String,
    /// Declared name, appended to `module_path!()`.
    name_parts: Vec<String>,
    qualifiers: u32,
    /// Receiver type with `Self` resolved, for methods.
    receiver: Option<Type>,
    args: Vec<Argument>,
    output: ReturnType,
    /// Declaring type, for methods and associated functions.
    self_ty: Option<&'a Type>,
}

impl Wrapping<'_> {
    fn expand(&self) -> TokenStream2 {
        let Wrapping {
            marker,
            vis,
            cfgs,
            alias,
            name_parts,
            qualifiers,
            output,
            ..
        } = self;

        let recorder = format_ident!("__fakebind_recorder");
        let inner = format_ident!("__fakebind_inner");
        let stand_in = format_ident!("__fakebind_stand_in");
        let receiver = format_ident!("__fakebind_receiver");

        let arg_idents: Vec<&Ident> = self.args.iter().map(|arg| &arg.ident).collect();
        let arg_tys: Vec<&Type> = self.args.iter().map(|arg| &arg.ty).collect();
        let all_tys: Vec<&Type> = self.receiver.iter().chain(arg_tys.iter().copied()).collect();
        let all_idents: Vec<&Ident> = self
            .receiver
            .iter()
            .map(|_| &receiver)
            .chain(arg_idents.iter().copied())
            .collect();

        let suffix = static_suffix(alias);
        let registration = format_ident!("__FAKEBIND_REGISTRATION_{suffix}");
        let entry = format_ident!("__FAKEBIND_ENTRY_{suffix}");
        let extract = match self.self_ty {
            Some(self_ty) => quote! {
                ::fakebind::signature::extract_method::<#self_ty, fn(#(#arg_tys),*) #output>
            },
            None => quote! {
                ::fakebind::signature::extract_function::<fn(#(#arg_tys),*) #output>
            },
        };
        let stand_in_ty = quote!(dyn ::core::ops::Fn(#(#all_tys),*) #output);

        let receiver_agnostic = self.receiver.as_ref().map(|_| {
            quote! {
                /// Like `fake`, but the stand-in does not see the receiver.
                pub fn fake_any<G>(self, #stand_in: G) -> ::fakebind::Fake<Self>
                where
                    G: ::core::ops::Fn(#(#arg_tys),*) #output,
                    G: 'static,
                {
                    ::fakebind::Fake::install(self, Self::__ignore_receiver(#stand_in))
                }

                pub fn fake_any_recorded<G>(
                    self,
                    recording: &::fakebind::Recording,
                    #stand_in: G,
                ) -> ::fakebind::Fake<Self>
                where
                    G: ::core::ops::Fn(#(#arg_tys),*) #output,
                    G: 'static,
                {
                    recording.fake(self, Self::__ignore_receiver(#stand_in))
                }

                fn __ignore_receiver<G>(#stand_in: G) -> ::std::boxed::Box<#stand_in_ty>
                where
                    G: ::core::ops::Fn(#(#arg_tys),*) #output,
                    G: 'static,
                {
                    ::std::boxed::Box::new(move |_, #(#arg_idents),*| #stand_in(#(#arg_idents),*))
                }
            }
        });

        quote! {
            #(#cfgs)*
            #[doc(hidden)]
            #[allow(non_camel_case_types, dead_code)]
            #[derive(Clone, Copy, Debug)]
            #vis struct #marker {}

            #(#cfgs)*
            impl ::fakebind::Wrapped for #marker {
                type StandIn = #stand_in_ty;
                type Pointer = fn(#(#all_tys),*) #output;

                fn registration() -> &'static ::fakebind::Registration {
                    &#registration
                }

                fn record(
                    #recorder: ::std::rc::Rc<::fakebind::Recorder>,
                    #inner: ::std::boxed::Box<Self::StandIn>,
                ) -> ::std::boxed::Box<Self::StandIn> {
                    let recorded: ::std::boxed::Box<#stand_in_ty> =
                        ::std::boxed::Box::new(move |#(#all_idents),*| {
                            #recorder.record(::std::vec![#(::fakebind::__describe!(#all_idents)),*]);
                            #inner(#(#all_idents),*)
                        });
                    recorded
                }
            }

            #(#cfgs)*
            #[allow(dead_code)]
            impl #marker {
                /// Replace the function with `stand_in` until the returned
                /// guard is dropped.
                pub fn fake<G>(self, #stand_in: G) -> ::fakebind::Fake<Self>
                where
                    G: ::core::ops::Fn(#(#all_tys),*) #output,
                    G: 'static,
                {
                    let #stand_in: ::std::boxed::Box<#stand_in_ty> = ::std::boxed::Box::new(#stand_in);
                    ::fakebind::Fake::install(self, #stand_in)
                }

                pub fn try_fake<G>(self, #stand_in: G) -> ::fakebind::Result<::fakebind::Fake<Self>>
                where
                    G: ::core::ops::Fn(#(#all_tys),*) #output,
                    G: 'static,
                {
                    let #stand_in: ::std::boxed::Box<#stand_in_ty> = ::std::boxed::Box::new(#stand_in);
                    ::fakebind::Fake::try_install(self, #stand_in)
                }

                /// Like `fake`, recording every call into `recording`.
                pub fn fake_recorded<G>(
                    self,
                    recording: &::fakebind::Recording,
                    #stand_in: G,
                ) -> ::fakebind::Fake<Self>
                where
                    G: ::core::ops::Fn(#(#all_tys),*) #output,
                    G: 'static,
                {
                    let #stand_in: ::std::boxed::Box<#stand_in_ty> = ::std::boxed::Box::new(#stand_in);
                    recording.fake(self, #stand_in)
                }

                #receiver_agnostic
            }

            #(#cfgs)*
            #[doc(hidden)]
            static #registration: ::fakebind::Registration = ::fakebind::Registration {
                alias: #alias,
                name: ::core::concat!(::core::module_path!() #(, "::", #name_parts)*),
                qualifiers: ::fakebind::Qualifiers::from_bits(#qualifiers),
                key: ::fakebind::FunctionKey::of::<#marker>,
                signature: #extract,
            };

            #(#cfgs)*
            #[doc(hidden)]
            #[::fakebind::linkme::distributed_slice(::fakebind::symbols::WRAPPED_FUNCTIONS)]
            #[linkme(crate = ::fakebind::linkme)]
            static #entry: &::fakebind::Registration = &#registration;
        }
    }
}

/// Statics are named after the alias, which is unique per crate.
fn static_suffix(alias: &str) -> String {
    alias
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

fn expand_function(options: WrapOptions, item: ItemFn) -> syn::Result<TokenStream2> {
    check_signature(&item.sig)?;
    check_attrs(&item.attrs)?;
    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = &item;

    let name = &sig.ident;
    if sig.receiver().is_some() {
        return Err(syn::Error::new_spanned(
            name,
            "methods are wrapped with #[wrap] inside a #[wrap_impl] block",
        ));
    }
    let alias = options.alias(&name.to_string());
    let symbols = Symbols::new(&alias);
    let real = format_ident!("{REAL_PREFIX}{name}");
    let args = typed_arguments(sig);
    let idents: Vec<&Ident> = args.iter().map(|arg| &arg.ident).collect();

    let mut real_sig = sig.clone();
    real_sig.ident = real.clone();
    let mut wrap_sig = sig.clone();
    wrap_sig.inputs = plain_inputs(sig, &args);

    let real_call = if sig.unsafety.is_some() {
        quote!(unsafe { #real(#(#idents),*) })
    } else {
        quote!(#real(#(#idents),*))
    };
    let real_symbol = &symbols.real;
    let wrap_symbol = &symbols.wrap;
    let cfgs = cfg_attrs(attrs);

    let trampoline = quote! {
        #(#cfgs)*
        #[doc(hidden)]
        #[inline(never)]
        #[unsafe(export_name = #real_symbol)]
        #real_sig #block

        #(#attrs)*
        #[inline(never)]
        #[unsafe(export_name = #wrap_symbol)]
        #vis #wrap_sig {
            match ::fakebind::trampoline::<#name>() {
                ::core::option::Option::Some(__fakebind_stand_in) => (**__fakebind_stand_in)(#(#idents),*),
                ::core::option::Option::None => #real_call,
            }
        }
    };

    let support = Wrapping {
        marker: name.clone(),
        vis,
        cfgs,
        name_parts: vec![name.to_string()],
        qualifiers: options.qualifiers | abi_qualifiers(sig),
        receiver: None,
        output: sig.output.clone(),
        self_ty: None,
        alias,
        args,
    }
    .expand();

    Ok(quote! {
        #trampoline
        #support
    })
}

fn expand_impl(mut item: ItemImpl) -> syn::Result<TokenStream2> {
    if let Some((_, path, _)) = &item.trait_ {
        return Err(syn::Error::new_spanned(
            path,
            "#[wrap_impl] only supports inherent impl blocks",
        ));
    }
    if !item.generics.params.is_empty() || item.generics.where_clause.is_some() {
        return Err(syn::Error::new_spanned(
            &item.generics,
            "generic impl blocks cannot be wrapped",
        ));
    }
    let self_ty = (*item.self_ty).clone();
    let type_name = match &self_ty {
        Type::Path(path) if path.qself.is_none() => {
            path.path.segments.last().map(|segment| segment.ident.clone())
        }
        _ => None,
    }
    .ok_or_else(|| syn::Error::new_spanned(&self_ty, "unsupported self type for #[wrap_impl]"))?;

    let mut support = Vec::new();
    let mut items = Vec::with_capacity(item.items.len());
    for impl_item in std::mem::take(&mut item.items) {
        match impl_item {
            ImplItem::Fn(method) if method.attrs.iter().any(|attr| attr.path().is_ident("wrap")) => {
                items.extend(expand_method(&self_ty, &type_name, method, &mut support)?);
            }
            other => items.push(other),
        }
    }
    item.items = items;

    Ok(quote! {
        #item
        #(#support)*
    })
}

fn expand_method(
    self_ty: &Type,
    type_name: &Ident,
    mut method: ImplItemFn,
    support: &mut Vec<TokenStream2>,
) -> syn::Result<Vec<ImplItem>> {
    let mut options = WrapOptions::default();
    let mut wrap_attrs = Vec::new();
    method.attrs.retain(|attr| {
        let is_wrap = attr.path().is_ident("wrap");
        if is_wrap {
            wrap_attrs.push(attr.clone());
        }
        !is_wrap
    });
    for attr in &wrap_attrs {
        if let Meta::List(_) = attr.meta {
            attr.parse_nested_meta(|meta| options.parse(meta))?;
        }
    }
    check_signature(&method.sig)?;
    check_attrs(&method.attrs)?;

    let ImplItemFn {
        attrs,
        vis,
        sig,
        block,
        ..
    } = &method;
    let name = &sig.ident;
    let alias = options.alias(&format!("{type_name}_{name}"));
    let symbols = Symbols::new(&alias);
    let marker = format_ident!("__fakebind_{}_{}", type_name, name);
    let constant = format_ident!("__fakebind_{}", name);
    let real = format_ident!("{REAL_PREFIX}{name}");

    let receiver = sig.receiver();
    let args = typed_arguments(sig);
    let mut call_args: Vec<TokenStream2> = Vec::with_capacity(args.len() + 1);
    if receiver.is_some() {
        call_args.push(quote!(self));
    }
    call_args.extend(args.iter().map(|arg| {
        let ident = &arg.ident;
        quote!(#ident)
    }));

    let mut real_sig = sig.clone();
    real_sig.ident = real.clone();
    let mut wrap_sig = sig.clone();
    wrap_sig.inputs = plain_inputs(sig, &args);

    let real_call = if sig.unsafety.is_some() {
        quote!(unsafe { Self::#real(#(#call_args),*) })
    } else {
        quote!(Self::#real(#(#call_args),*))
    };
    let real_symbol = &symbols.real;
    let wrap_symbol = &symbols.wrap;
    let cfgs = cfg_attrs(attrs);

    let mut qualifiers = options.qualifiers | abi_qualifiers(sig);
    if let Some(receiver) = receiver {
        qualifiers |= receiver_qualifiers(receiver);
    }
    let mut output = sig.output.clone();
    ReplaceSelf(self_ty).visit_return_type_mut(&mut output);

    support.push(
        Wrapping {
            marker: marker.clone(),
            vis,
            cfgs: cfgs.clone(),
            alias,
            name_parts: vec![type_name.to_string(), name.to_string()],
            qualifiers,
            receiver: receiver.map(|receiver| replace_self(&receiver.ty, self_ty)),
            args: args
                .iter()
                .map(|arg| Argument {
                    ident: arg.ident.clone(),
                    ty: replace_self(&arg.ty, self_ty),
                })
                .collect(),
            output,
            self_ty: Some(self_ty),
        }
        .expand(),
    );

    let real_item: ImplItem = parse_quote! {
        #(#cfgs)*
        #[doc(hidden)]
        #[inline(never)]
        #[unsafe(export_name = #real_symbol)]
        #real_sig #block
    };
    let wrap_item: ImplItem = parse_quote! {
        #(#attrs)*
        #[inline(never)]
        #[unsafe(export_name = #wrap_symbol)]
        #vis #wrap_sig {
            match ::fakebind::trampoline::<#marker>() {
                ::core::option::Option::Some(__fakebind_stand_in) => (**__fakebind_stand_in)(#(#call_args),*),
                ::core::option::Option::None => #real_call,
            }
        }
    };
    let const_item: ImplItem = parse_quote! {
        #(#cfgs)*
        #[doc(hidden)]
        #[allow(non_upper_case_globals)]
        #vis const #constant: #marker = #marker {};
    };
    Ok(vec![real_item, wrap_item, const_item])
}
