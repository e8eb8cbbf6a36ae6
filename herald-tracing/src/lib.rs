//! `#[traced]` attribute used across the herald crates.
//!
//! Wraps a function so that entering and leaving it emits `trace!` events,
//! optionally with the elapsed time, and optionally forwards arguments to
//! `#[tracing::instrument]`. The expansion names `tracing` unqualified, so the
//! calling module must have it in scope (`use herald_common::tracing;`).

extern crate proc_macro;

use proc_macro2::TokenStream;
use quote::quote;
use syn::{ItemFn, LitStr, meta::ParseNestedMeta, parse::Parser, parse_quote};

/// Unit the elapsed time is reported in.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
enum Precision {
    #[default]
    Nanos,
    Micros,
    Millis,
    Seconds,
}

impl Precision {
    fn from_unit(unit: &LitStr) -> syn::Result<Self> {
        match unit.value().as_str() {
            "ns" | "nanos" => Ok(Self::Nanos),
            "us" | "micros" => Ok(Self::Micros),
            "ms" | "millis" => Ok(Self::Millis),
            "s" | "secs" => Ok(Self::Seconds),
            other => Err(syn::Error::new(
                unit.span(),
                format!("unknown precision `{other}`, expected one of ns, us, ms, s"),
            )),
        }
    }

    /// Expression rendering the `Duration` bound to `elapsed`.
    fn render(self) -> TokenStream {
        match self {
            Self::Nanos => quote!(format!("{} ns", elapsed.as_nanos())),
            Self::Micros => quote!(format!("{} us", elapsed.as_micros())),
            Self::Millis => quote!(format!("{} ms", elapsed.as_millis())),
            Self::Seconds => quote!(format!("{} s", elapsed.as_secs())),
        }
    }
}

#[derive(Debug, Default)]
struct Attributes {
    timing: Option<Precision>,
    instrument: Option<TokenStream>,
}

impl Attributes {
    /// Accepts `timing`, `timing(precision = "..")`, `instrument` and
    /// `instrument(..)`, each at most once.
    fn parse(&mut self, meta: &ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("timing") {
            if self.timing.is_some() {
                return Err(meta.error("`timing` given twice"));
            }

            let mut precision = Precision::default();
            if meta.input.peek(syn::token::Paren) {
                meta.parse_nested_meta(|inner| {
                    if inner.path.is_ident("precision") {
                        precision = Precision::from_unit(&inner.value()?.parse()?)?;
                        Ok(())
                    } else {
                        Err(inner.error("expected `precision`"))
                    }
                })?;
            }
            self.timing = Some(precision);
            Ok(())
        } else if meta.path.is_ident("instrument") {
            if self.instrument.is_some() {
                return Err(meta.error("`instrument` given twice"));
            }

            let arguments = if meta.input.peek(syn::token::Paren) {
                let content;
                syn::parenthesized!(content in meta.input);
                content.parse()?
            } else {
                TokenStream::new()
            };
            self.instrument = Some(arguments);
            Ok(())
        } else {
            Err(meta.error("expected `timing` or `instrument`"))
        }
    }
}

fn expand(attributes: Attributes, mut item_fn: ItemFn) -> TokenStream {
    if let Some(arguments) = attributes.instrument {
        item_fn
            .attrs
            .push(parse_quote!(#[tracing::instrument(#arguments)]));
    }

    let name = item_fn.sig.ident.to_string();
    let on_exit = match attributes.timing {
        None => quote!(tracing::trace!("Leaving {}", self.name);),
        Some(precision) => {
            let render = precision.render();
            quote! {
                let elapsed = self.started.elapsed();
                tracing::trace!("Leaving {} after {}", self.name, #render);
            }
        }
    };

    let guard: syn::Stmt = parse_quote! {
        let __traced = {
            struct TracedCall {
                name: &'static str,
                started: std::time::Instant,
            }

            impl std::ops::Drop for TracedCall {
                fn drop(&mut self) {
                    #on_exit
                }
            }

            tracing::trace!("Entering {}", #name);
            TracedCall {
                name: #name,
                started: std::time::Instant::now(),
            }
        };
    };
    item_fn.block.stmts.insert(0, guard);

    quote!(#item_fn)
}

/// Adds `tracing::trace!` events when an attributed function is entered and
/// when it returns, however it returns.
///
/// ```ignore
/// use herald_common::tracing;
///
/// #[traced(instrument(level = tracing::Level::TRACE, skip_all, fields(id = notification.identifier())), timing(precision = "ms"))]
/// pub async fn send(&self, notification: &Notification) -> Result<Response> { ... }
/// ```
///
/// Unknown arguments and unknown precisions are compile errors.
#[proc_macro_attribute]
pub fn traced(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let mut attributes = Attributes::default();
    let parser = syn::meta::parser(|meta| attributes.parse(&meta));
    if let Err(err) = parser.parse(args) {
        return err.to_compile_error().into();
    }

    match syn::parse::<ItemFn>(item) {
        Ok(item_fn) => expand(attributes, item_fn).into(),
        Err(err) => err.to_compile_error().into(),
    }
}
