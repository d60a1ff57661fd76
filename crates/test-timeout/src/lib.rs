//! `#[tokio_timeout_test]`: async tests on a current-thread runtime with a
//! hard wall-clock limit, optionally starting with the tokio clock paused.
//!
//! ```ignore
//! #[tokio_timeout_test(ms = 500, paused)]
//! async fn debounce_window_restarts() { /* ... */ }
//! ```
//!
//! Arguments: `secs = N` or `ms = N` (default 10 seconds) and `paused`.
//! `paused` needs tokio's `test-util` feature in the consuming crate.

use proc_macro::TokenStream;
use quote::quote;
use syn::parse::Parser;
use syn::punctuated::Punctuated;
use syn::{parse_macro_input, Attribute, Expr, ExprLit, ItemFn, Lit, Meta, Token};

struct TestArgs {
    timeout_ms: u64,
    paused: bool,
}

impl Default for TestArgs {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            paused: false,
        }
    }
}

fn parse_args(attr: TokenStream) -> syn::Result<TestArgs> {
    let mut args = TestArgs::default();
    if attr.is_empty() {
        return Ok(args);
    }
    let metas = Punctuated::<Meta, Token![,]>::parse_terminated.parse(attr)?;
    for meta in metas {
        match &meta {
            Meta::Path(path) if path.is_ident("paused") => args.paused = true,
            Meta::NameValue(nv) if nv.path.is_ident("secs") || nv.path.is_ident("ms") => {
                let value = match &nv.value {
                    Expr::Lit(ExprLit {
                        lit: Lit::Int(int), ..
                    }) => int.base10_parse::<u64>()?,
                    other => {
                        return Err(syn::Error::new_spanned(other, "expected an integer literal"))
                    }
                };
                if value == 0 {
                    return Err(syn::Error::new_spanned(&nv.value, "timeout must be greater than zero"));
                }
                args.timeout_ms = if nv.path.is_ident("secs") {
                    value.saturating_mul(1_000)
                } else {
                    value
                };
            }
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "expected `secs = N`, `ms = N` or `paused`",
                ))
            }
        }
    }
    Ok(args)
}

#[proc_macro_attribute]
pub fn tokio_timeout_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = match parse_args(attr) {
        Ok(args) => args,
        Err(err) => return err.to_compile_error().into(),
    };

    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if sig.asyncness.is_none() {
        return syn::Error::new_spanned(
            &sig.ident,
            "tokio_timeout_test can only be applied to async functions",
        )
        .to_compile_error()
        .into();
    }

    sig.asyncness = None;

    let filtered_attrs: Vec<Attribute> = attrs
        .into_iter()
        .filter(|attr| !is_tokio_test_attribute(attr))
        .collect();

    let timeout_ms = args.timeout_ms;
    let pause_clock = if args.paused {
        quote! { builder.start_paused(true); }
    } else {
        quote! {}
    };

    TokenStream::from(quote! {
        #[test]
        #(#filtered_attrs)*
        #vis #sig {
            let timeout_duration = std::time::Duration::from_millis(#timeout_ms);
            let (sender, receiver) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    let mut builder = tokio::runtime::Builder::new_current_thread();
                    builder.enable_all();
                    #pause_clock
                    let runtime = builder.build().expect("failed to build Tokio runtime");
                    runtime.block_on(async {
                        tokio::time::timeout(timeout_duration, async move #block)
                            .await
                            .expect("test timed out");
                    });
                }));
                let _ = sender.send(result);
            });
            match receiver.recv_timeout(timeout_duration + std::time::Duration::from_secs(1)) {
                Ok(Ok(_)) => {}
                Ok(Err(payload)) => std::panic::resume_unwind(payload),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => panic!("test timed out"),
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    panic!("test thread failed before reporting result")
                }
            }
        }
    })
}

fn is_tokio_test_attribute(attr: &Attribute) -> bool {
    let mut segments = attr.path().segments.iter();
    matches!(
        (segments.next(), segments.next(), segments.next()),
        (Some(first), Some(second), None)
            if first.ident == "tokio" && second.ident == "test"
    )
}
