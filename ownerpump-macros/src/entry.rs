use proc_macro2::TokenStream;
use quote::{quote, quote_spanned};
use syn::parse::Parser;
use syn::{ItemFn, ReturnType};

use crate::parse::{Config, Flavor, PanicPolicy, is_test_attribute, with_error};

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Entry {
    Main,
    Test,
}

impl Entry {
    fn name(self) -> &'static str {
        match self {
            Entry::Main => "ownerpump::main",
            Entry::Test => "ownerpump::test",
        }
    }
}

/// Rewrite `async fn f() -> T { body }` into a plain `fn f() -> T` that hands
/// `body` to a fresh `Runner`.
pub(crate) fn expand(entry: Entry, args: TokenStream, item: TokenStream) -> TokenStream {
    let input: ItemFn = match syn::parse2(item.clone()) {
        Ok(input) => input,
        Err(e) => return with_error(item, e),
    };

    let config = validate(entry, &input).and_then(|()| {
        let mut config = Config::default();
        syn::meta::parser(|meta| config.parse_arg(meta)).parse2(args)?;
        Ok(config)
    });

    // On error, still emit the rewritten function so the rest of the crate
    // keeps type checking next to the diagnostic.
    match config {
        Ok(config) => rewrite(entry, input, &config),
        Err(e) => with_error(rewrite(entry, input, &Config::default()), e),
    }
}

fn validate(entry: Entry, input: &ItemFn) -> syn::Result<()> {
    let sig = &input.sig;

    if sig.asyncness.is_none() {
        let msg = format!("#[{}] requires an `async fn`", entry.name());
        return Err(syn::Error::new_spanned(sig.fn_token, msg));
    }

    if !sig.inputs.is_empty() {
        let msg = format!("#[{}] functions cannot accept arguments", entry.name());
        return Err(syn::Error::new_spanned(&sig.inputs, msg));
    }

    if entry == Entry::Test {
        if let Some(attr) = input.attrs.iter().find(|attr| is_test_attribute(attr)) {
            let msg = "#[test] is already generated by #[ownerpump::test], remove this one";
            return Err(syn::Error::new_spanned(attr, msg));
        }
    }

    Ok(())
}

fn rewrite(entry: Entry, mut input: ItemFn, config: &Config) -> TokenStream {
    input.sig.asyncness = None;

    // Inner attributes of the body end up in front of the generated fn.
    for attr in &mut input.attrs {
        attr.style = syn::AttrStyle::Outer;
    }

    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = input;

    // Type errors on the function output point at the end of the body.
    let span = block.brace_token.span.close();

    let mut runner = match config.flavor.unwrap_or_default() {
        Flavor::Blocking => quote! { ownerpump::runtime::Builder::new_blocking() },
        Flavor::PostOnly => quote! { ownerpump::runtime::Builder::new_post_only() },
    };

    if let Some(policy) = config.on_callback_panic {
        let policy = match policy {
            PanicPolicy::Propagate => quote! { Propagate },
            PanicPolicy::Collect => quote! { Collect },
        };
        runner = quote! {
            #runner.on_callback_panic(ownerpump::runtime::OnCallbackPanic::#policy)
        };
    }

    // Computations are shipped through the context queue, hence `Send`. Tests
    // box theirs so every test shares one `Runner::block_on` instantiation.
    let computation = match entry {
        Entry::Main => quote! {
            let computation = async move #block;
        },
        Entry::Test => {
            let output = match &sig.output {
                ReturnType::Default => quote! { () },
                ReturnType::Type(_, ty) => quote! { #ty },
            };
            quote! {
                let computation: ::core::pin::Pin<::std::boxed::Box<
                    dyn ::core::future::Future<Output = #output> + ::core::marker::Send
                >> = ::std::boxed::Box::pin(async move #block);
            }
        }
    };

    let test_attr = match entry {
        Entry::Main => quote! {},
        Entry::Test => quote! { #[::core::prelude::v1::test] },
    };

    let run = quote_spanned! {span=>
        #[allow(clippy::expect_used, clippy::needless_return)]
        {
            return #runner
                .try_build()
                .expect("failed to build the ownerpump runner")
                .block_on(computation)
                .unwrap_or_else(|e| e.resume());
        }
    };

    quote! {
        #(#attrs)*
        #test_attr
        #vis #sig {
            #computation
            #run
        }
    }
}
