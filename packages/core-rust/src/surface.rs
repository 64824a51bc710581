//! Declared surfaces: the explicit registration table the pipeline reads.
//!
//! A [`TypeSurface`] records everything attribute reflection would otherwise
//! provide: the type's name, its single base type, its policy association,
//! its factory and save-state markers, and the source text of each method
//! signature (attributes included). Surfaces come from three places:
//!
//! - the builder methods on [`TypeSurface`],
//! - a trait declaration parsed with `syn` ([`TypeSurface::parse`]), where the
//!   supertrait is the base type and trait attributes are type markers,
//! - JSON, via `serde`.
//!
//! Method text is kept unparsed until extraction so that a malformed member
//! only costs that member, not the whole type.

use quote::ToTokens;
use serde::{Deserialize, Serialize};
use syn::{Attribute, ItemTrait, TraitItem, TypeParamBound};

use crate::config::GeneratorConfig;
use crate::error::SurfaceError;

/// Declared surface of one domain or policy type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeSurface {
    pub name: String,
    /// Name of the base type, resolved through the catalog.
    pub base: Option<String>,
    /// Policy surface associations. At most one is honored.
    pub authorize: Vec<String>,
    /// The type gets a factory.
    pub factory: bool,
    /// The type tracks `is_new` / `is_deleted`.
    pub save_state: bool,
    /// Method signature source text, one entry per method.
    pub methods: Vec<String>,
}

impl TypeSurface {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Marks the type as a factory type.
    #[must_use]
    pub fn factory(mut self) -> Self {
        self.factory = true;
        self
    }

    #[must_use]
    pub fn extends(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    #[must_use]
    pub fn authorized_by(mut self, policy: impl Into<String>) -> Self {
        self.authorize.push(policy.into());
        self
    }

    #[must_use]
    pub fn tracks_save_state(mut self) -> Self {
        self.save_state = true;
        self
    }

    /// Adds one method signature, e.g.
    /// `#[factory(fetch)] async fn fetch(&mut self, id: i64) -> bool`.
    #[must_use]
    pub fn method(mut self, signature: impl Into<String>) -> Self {
        self.methods.push(signature.into());
        self
    }

    /// Parses a single trait declaration using the default marker names.
    pub fn parse(src: &str) -> Result<Self, SurfaceError> {
        Self::parse_with(src, &GeneratorConfig::default())
    }

    /// Parses a single trait declaration.
    pub fn parse_with(src: &str, config: &GeneratorConfig) -> Result<Self, SurfaceError> {
        let item: ItemTrait = syn::parse_str(src).map_err(|e| SurfaceError::Syntax {
            message: e.to_string(),
        })?;
        Self::from_trait(&item, config)
    }

    /// Parses every trait declaration in a source file. Other items are
    /// ignored.
    pub fn parse_file(src: &str, config: &GeneratorConfig) -> Result<Vec<Self>, SurfaceError> {
        let file: syn::File = syn::parse_str(src).map_err(|e| SurfaceError::Syntax {
            message: e.to_string(),
        })?;
        file.items
            .iter()
            .filter_map(|item| match item {
                syn::Item::Trait(item) => Some(Self::from_trait(item, config)),
                _ => None,
            })
            .collect()
    }

    fn from_trait(item: &ItemTrait, config: &GeneratorConfig) -> Result<Self, SurfaceError> {
        let name = item.ident.to_string();

        let mut bases = item.supertraits.iter().filter_map(|bound| match bound {
            TypeParamBound::Trait(t) => t.path.segments.last().map(|s| s.ident.to_string()),
            _ => None,
        });
        let base = bases.next();
        if bases.next().is_some() {
            return Err(SurfaceError::MultipleBases { name });
        }

        let mut surface = Self {
            name,
            base,
            ..Self::default()
        };

        for attr in &item.attrs {
            apply_type_attribute(&mut surface, attr, config)?;
        }

        surface.methods = item
            .items
            .iter()
            .filter_map(|member| match member {
                TraitItem::Fn(f) => Some(f.to_token_stream().to_string()),
                _ => None,
            })
            .collect();

        Ok(surface)
    }
}

fn apply_type_attribute(
    surface: &mut TypeSurface,
    attr: &Attribute,
    config: &GeneratorConfig,
) -> Result<(), SurfaceError> {
    let path = attr.path();
    if path.is_ident(&config.factory_marker) {
        surface.factory = true;
    } else if path.is_ident(&config.save_state_marker) {
        surface.save_state = true;
    } else if path.is_ident(&config.authorize_marker) {
        let policy: syn::Path = attr.parse_args().map_err(|e| SurfaceError::Marker {
            name: surface.name.clone(),
            message: e.to_string(),
        })?;
        if let Some(segment) = policy.segments.last() {
            surface.authorize.push(segment.ident.to_string());
        }
    }
    Ok(())
}
