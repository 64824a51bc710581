//! Method signature parsing.
//!
//! Turns one member's source text into a [`MethodSignature`]: markers,
//! receiver, named parameters with normalized type text, and the inspected
//! return shape. Both extractors share this parser.

use std::sync::LazyLock;

use quote::ToTokens;
use regex::Regex;
use syn::meta::ParseNestedMeta;
use syn::{Attribute, FnArg, LitStr, Meta, Pat, ReturnType, TraitItemFn};

use crate::config::GeneratorConfig;
use crate::model::{AuthorizeOperation, OperationKind, ReturnShape};

/// Matches `bool`, `Result<bool>`, `anyhow::Result<bool>`, `Result<bool,E>`.
static SUCCESS_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:[A-Za-z_]\w*::)*Result<)?bool(?:>|,.+>)?$").expect("valid regex")
});

/// Locates the output type argument of a future-returning signature.
static FUTURE_OUTPUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:Future<Output=|BoxFuture<(?:'\w+,)?)").expect("valid regex")
});

/// Markers found in a `#[factory(..)]` attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactoryMarkers {
    pub kinds: Vec<OperationKind>,
    pub remote: bool,
    /// Typed callable shape name given as `execute = "name"`.
    pub callable: Option<String>,
    pub unknown: Vec<String>,
}

/// Markers found in an `#[authorize(..)]` attribute on a policy method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizeMarkers {
    pub operations: AuthorizeOperation,
    pub remote: bool,
    pub unknown: Vec<String>,
}

/// One named parameter, before role classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawParam {
    pub name: String,
    pub ty: String,
    pub injected: bool,
}

/// Parsed member signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub name: String,
    pub factory: Option<FactoryMarkers>,
    pub authorize: Option<AuthorizeMarkers>,
    pub has_receiver: bool,
    pub params: Vec<RawParam>,
    pub shape: ReturnShape,
}

/// Parses one member's source text.
///
/// A trailing `;` is added when the text ends without a body.
///
/// # Errors
///
/// Returns a message when the text is not a method signature, a parameter
/// pattern is not a plain identifier, or a marker argument is malformed.
pub fn parse_signature(text: &str, config: &GeneratorConfig) -> Result<MethodSignature, String> {
    let mut src = text.trim().to_string();
    if !src.ends_with(';') && !src.ends_with('}') {
        src.push(';');
    }
    let item: TraitItemFn = syn::parse_str(&src).map_err(|e| e.to_string())?;

    let mut factory = None;
    let mut authorize = None;
    for attr in &item.attrs {
        if attr.path().is_ident(&config.factory_marker) {
            factory = Some(parse_factory_markers(attr).map_err(|e| e.to_string())?);
        } else if attr.path().is_ident(&config.authorize_marker) {
            authorize = Some(parse_authorize_markers(attr).map_err(|e| e.to_string())?);
        }
    }

    let mut has_receiver = false;
    let mut params = Vec::new();
    for (position, input) in item.sig.inputs.iter().enumerate() {
        match input {
            FnArg::Receiver(_) => has_receiver = true,
            FnArg::Typed(pt) => {
                let name = match pt.pat.as_ref() {
                    Pat::Ident(ident) => ident.ident.to_string(),
                    Pat::Wild(_) => format!("arg{position}"),
                    other => {
                        return Err(format!(
                            "parameter `{}` is not a plain identifier",
                            other.to_token_stream()
                        ))
                    }
                };
                let ty = normalize_type(&pt.ty.to_token_stream().to_string());
                let injected = pt.attrs.iter().any(|a| a.path().is_ident(&config.service_marker))
                    || is_passthrough(&ty, config);
                params.push(RawParam { name, ty, injected });
            }
        }
    }

    let return_type = match &item.sig.output {
        ReturnType::Default => None,
        ReturnType::Type(_, ty) => Some(normalize_type(&ty.to_token_stream().to_string())),
    };
    let shape = inspect_return(item.sig.asyncness.is_some(), return_type.as_deref());

    Ok(MethodSignature {
        name: item.sig.ident.to_string(),
        factory,
        authorize,
        has_receiver,
        params,
        shape,
    })
}

fn parse_factory_markers(attr: &Attribute) -> syn::Result<FactoryMarkers> {
    let mut markers = FactoryMarkers::default();
    if matches!(attr.meta, Meta::Path(_)) {
        // Bare `#[factory]` on a method names no kind.
        markers.unknown.push(String::new());
        return Ok(markers);
    }
    attr.parse_nested_meta(|meta| {
        let name = meta_name(&meta);
        if name == "remote" {
            markers.remote = true;
        } else if let Some(kind) = OperationKind::from_marker(&name) {
            if kind == OperationKind::Execute && meta.input.peek(syn::Token![=]) {
                let callable: LitStr = meta.value()?.parse()?;
                markers.callable = Some(callable.value());
            }
            markers.kinds.push(kind);
        } else {
            skip_marker_value(&meta)?;
            markers.unknown.push(name);
        }
        Ok(())
    })?;
    Ok(markers)
}

fn parse_authorize_markers(attr: &Attribute) -> syn::Result<AuthorizeMarkers> {
    let mut markers = AuthorizeMarkers::default();
    if matches!(attr.meta, Meta::Path(_)) {
        return Ok(markers);
    }
    attr.parse_nested_meta(|meta| {
        let name = meta_name(&meta);
        if name == "remote" {
            markers.remote = true;
        } else if let Some(flag) = AuthorizeOperation::from_marker(&name) {
            markers.operations |= flag;
        } else {
            skip_marker_value(&meta)?;
            markers.unknown.push(name);
        }
        Ok(())
    })?;
    Ok(markers)
}

fn meta_name(meta: &ParseNestedMeta<'_>) -> String {
    normalize_type(&meta.path.to_token_stream().to_string())
}

// Consume `= value` or `(..)` after an unknown marker so parsing can go on.
fn skip_marker_value(meta: &ParseNestedMeta<'_>) -> syn::Result<()> {
    if meta.input.peek(syn::Token![=]) {
        let _: syn::Expr = meta.value()?.parse()?;
    } else if meta.input.peek(syn::token::Paren) {
        meta.parse_nested_meta(|inner| skip_marker_value(&inner))?;
    }
    Ok(())
}

fn is_passthrough(ty: &str, config: &GeneratorConfig) -> bool {
    let base = strip_references(ty);
    let last = base.rsplit("::").next().unwrap_or(base);
    config.passthrough_types.iter().any(|t| t == last)
}

/// Derives the return shape from the declared return type text.
#[must_use]
pub fn inspect_return(is_async: bool, return_type: Option<&str>) -> ReturnShape {
    let Some(ty) = return_type else {
        return ReturnShape::from_parts(is_async, false);
    };
    match future_output(ty) {
        Some(output) => ReturnShape::from_parts(true, SUCCESS_TYPE.is_match(output)),
        None => ReturnShape::from_parts(is_async, SUCCESS_TYPE.is_match(ty)),
    }
}

/// Output type of `impl Future<Output = T>`, `Pin<Box<dyn Future<Output = T>>>`
/// or `BoxFuture<'a, T>`, if `ty` is one of those.
fn future_output(ty: &str) -> Option<&str> {
    let found = FUTURE_OUTPUT.find(ty)?;
    let start = found.end();
    let mut depth = 0usize;
    for (offset, ch) in ty[start..].char_indices() {
        match ch {
            '<' => depth += 1,
            '>' if depth == 0 => return Some(&ty[start..start + offset]),
            '>' => depth -= 1,
            '+' if depth == 0 => return Some(&ty[start..start + offset]),
            _ => {}
        }
    }
    None
}

/// Collapses token-stream spacing: a space survives only between two word
/// characters, so `Arc < dyn Repo >` becomes `Arc<dyn Repo>`.
#[must_use]
pub fn normalize_type(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && out.chars().last().is_some_and(is_word) && is_word(ch) {
            out.push(' ');
        }
        pending_space = false;
        out.push(ch);
    }
    out
}

/// Strips leading `&`, lifetimes and `mut` from normalized type text.
#[must_use]
pub fn strip_references(ty: &str) -> &str {
    let mut rest = ty.trim();
    loop {
        if let Some(r) = rest.strip_prefix('&') {
            rest = r.trim_start();
        } else if rest.starts_with('\'') {
            rest = rest.split_once(' ').map_or("", |(_, r)| r);
        } else if let Some(r) = rest.strip_prefix("mut ") {
            rest = r;
        } else {
            return rest;
        }
    }
}

fn is_word(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}
