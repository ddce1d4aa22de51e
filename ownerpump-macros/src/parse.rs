use proc_macro2::TokenStream;
use syn::meta::ParseNestedMeta;
use syn::{Attribute, LitStr};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum Flavor {
    #[default]
    Blocking,
    PostOnly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PanicPolicy {
    Propagate,
    Collect,
}

/// Arguments accepted between the attribute parentheses.
#[derive(Debug, Default)]
pub(crate) struct Config {
    pub(crate) flavor: Option<Flavor>,
    pub(crate) on_callback_panic: Option<PanicPolicy>,
}

impl Config {
    /// Consume one `name = "value"` argument.
    pub(crate) fn parse_arg(&mut self, meta: ParseNestedMeta<'_>) -> syn::Result<()> {
        if meta.path.is_ident("flavor") {
            let lit: LitStr = meta.value()?.parse()?;
            let flavor = match lit.value().as_str() {
                "blocking" => Flavor::Blocking,
                "post_only" => Flavor::PostOnly,
                other => {
                    return Err(syn::Error::new(
                        lit.span(),
                        format!("unknown flavor `{other}`, expected `blocking` or `post_only`"),
                    ));
                }
            };
            set_once(&mut self.flavor, flavor, &meta, "flavor")
        } else if meta.path.is_ident("on_callback_panic") {
            let lit: LitStr = meta.value()?.parse()?;
            let policy = match lit.value().as_str() {
                "propagate" => PanicPolicy::Propagate,
                "collect" => PanicPolicy::Collect,
                other => {
                    return Err(syn::Error::new(
                        lit.span(),
                        format!("unknown policy `{other}`, expected `propagate` or `collect`"),
                    ));
                }
            };
            set_once(&mut self.on_callback_panic, policy, &meta, "on_callback_panic")
        } else {
            Err(meta.error("unknown attribute, expected `flavor` or `on_callback_panic`"))
        }
    }
}

fn set_once<T>(
    slot: &mut Option<T>,
    value: T,
    meta: &ParseNestedMeta<'_>,
    name: &str,
) -> syn::Result<()> {
    if slot.replace(value).is_some() {
        return Err(meta.error(format!("`{name}` set multiple times")));
    }
    Ok(())
}

/// `#[test]`, `#[core::prelude::v1::test]` or `#[std::prelude::rust_2024::test]`.
pub(crate) fn is_test_attribute(attr: &Attribute) -> bool {
    let syn::Meta::Path(path) = &attr.meta else {
        return false;
    };

    let segments: Vec<String> = path.segments.iter().map(|s| s.ident.to_string()).collect();
    match segments.as_slice() {
        [only] => path.leading_colon.is_none() && only == "test",
        [root, prelude, _edition, last] => {
            (root == "core" || root == "std") && prelude == "prelude" && last == "test"
        }
        _ => false,
    }
}

/// Append `error` to `tokens`, so the item still expands next to the
/// diagnostic.
pub(crate) fn with_error(mut tokens: TokenStream, error: syn::Error) -> TokenStream {
    tokens.extend(error.into_compile_error());
    tokens
}
