#![allow(unreachable_pub)]
#![allow(clippy::needless_pass_by_value)]

//! # Macros
//!
//! Procedural macros shared by the workspace crates.
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! evd-derive.workspace = true
//! thiserror.workspace = true
//! ```
//!
//! The expansion refers to `::thiserror`, so consumers must depend on it directly.

mod error;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Attribute macro for defining error enums.
///
/// Transforms a plain enum into a `thiserror` error type wired into the workspace conventions.
///
/// # Features
///
/// * **Automatic Derives**: Injects `#[derive(Debug, thiserror::Error)]` unless already present.
/// * **Context Support**: Generates a companion `...Ext` trait that adds `.context()`
///   to any `Result` that can be converted into this error type.
/// * **Standard Conversions**: Implements `From<T>` for variants containing a `source` field
///   (or a field marked `#[source]`/`#[from]`), enabling `?` on upstream errors.
/// * **Internal Fallback**: Provides `From<&'static str>` and `From<String>` if an `Internal`
///   variant is present.
///
/// # Requirements
///
/// 1. The macro must be applied to an **enum**.
/// 2. Variants that support context must include a `context: Option<Cow<'static, str>>` field.
/// 3. Variants wrapping external errors must also carry a `context` field.
/// 4. Variants are either named-field or unit variants. Unit variants serve as markers and
///    take no context; tuple variants are rejected.
///
/// # Example
///
/// ```rust,ignore
/// use evd_derive::evd_error;
/// use std::borrow::Cow;
///
/// #[evd_error]
/// pub enum LoaderError {
///     #[error("IO error{}: {source}", format_context(context))]
///     Io { source: std::io::Error, context: Option<Cow<'static, str>> },
///
///     #[error("Nothing to load")]
///     Empty,
///
///     #[error("Internal fault{}: {message}", format_context(context))]
///     Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
/// }
///
/// fn read(path: &str) -> Result<String, LoaderError> {
///     std::fs::read_to_string(path).context("Reading manifest")
/// }
/// ```
#[proc_macro_attribute]
pub fn evd_error(_args: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    error::expand(input).into()
}
