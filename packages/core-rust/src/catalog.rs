use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::GeneratorConfig;
use crate::error::{GenerationError, SurfaceError};
use crate::surface::TypeSurface;

/// All declared surfaces known to one generation pass, keyed by type name.
///
/// Uses `BTreeMap` so iteration, and therefore generation output, is
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    types: BTreeMap<String, TypeSurface>,
}

/// Resolved inheritance chain of one type: the type itself first, then its
/// base, then the base's base.
#[derive(Debug)]
pub struct BaseChain<'a> {
    pub members: Vec<&'a TypeSurface>,
    /// Base name that could not be found; the chain stops before it.
    pub unresolved: Option<String>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a surface. Returns the replaced surface, if any.
    pub fn insert(&mut self, surface: TypeSurface) -> Option<TypeSurface> {
        self.types.insert(surface.name.clone(), surface)
    }

    /// Builder-style [`insert`](Catalog::insert).
    #[must_use]
    pub fn with(mut self, surface: TypeSurface) -> Self {
        self.insert(surface);
        self
    }

    /// Parses every trait declaration in `src` and adds it.
    pub fn extend_from_source(
        &mut self,
        src: &str,
        config: &GeneratorConfig,
    ) -> Result<usize, SurfaceError> {
        let surfaces = TypeSurface::parse_file(src, config)?;
        let count = surfaces.len();
        for surface in surfaces {
            self.insert(surface);
        }
        Ok(count)
    }

    /// Adds the surfaces of a JSON array of [`TypeSurface`] objects.
    ///
    /// # Errors
    ///
    /// - `SurfaceError::Json` if the text is not such an array
    /// - `SurfaceError::InvalidName` if a type, base or policy name is not a
    ///   Rust identifier; nothing is added then
    pub fn extend_from_json(&mut self, json: &str) -> Result<usize, SurfaceError> {
        let surfaces: Vec<TypeSurface> =
            serde_json::from_str(json).map_err(|e| SurfaceError::Json {
                message: e.to_string(),
            })?;
        for surface in &surfaces {
            check_names(surface)?;
        }
        let count = surfaces.len();
        for surface in surfaces {
            self.insert(surface);
        }
        Ok(count)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TypeSurface> {
        self.types.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeSurface> {
        self.types.values()
    }

    /// Names of all types carrying the factory marker, in name order.
    pub fn factory_types(&self) -> impl Iterator<Item = &str> {
        self.types
            .values()
            .filter(|s| s.factory)
            .map(|s| s.name.as_str())
    }

    /// Resolves the inheritance chain of `name`.
    ///
    /// # Errors
    ///
    /// - `GenerationError::UnknownType` if `name` itself is not declared
    /// - `GenerationError::CyclicBase` if a base refers back into the chain
    pub fn chain(&self, name: &str) -> Result<BaseChain<'_>, GenerationError> {
        let root = self.get(name).ok_or_else(|| GenerationError::UnknownType {
            name: name.to_string(),
        })?;

        let mut members = vec![root];
        let mut next = root.base.as_deref();
        while let Some(base) = next {
            if members.iter().any(|m| m.name == base) {
                let mut chain: Vec<String> = members.iter().map(|m| m.name.clone()).collect();
                chain.push(base.to_string());
                return Err(GenerationError::CyclicBase {
                    name: name.to_string(),
                    chain,
                });
            }
            let Some(surface) = self.get(base) else {
                return Ok(BaseChain {
                    members,
                    unresolved: Some(base.to_string()),
                });
            };
            members.push(surface);
            next = surface.base.as_deref();
        }

        Ok(BaseChain {
            members,
            unresolved: None,
        })
    }
}

/// Names read from JSON end up as identifiers in rendered source.
fn check_names(surface: &TypeSurface) -> Result<(), SurfaceError> {
    let names = std::iter::once(&surface.name)
        .chain(&surface.base)
        .chain(&surface.authorize);
    for name in names {
        if syn::parse_str::<syn::Ident>(name).is_err() {
            return Err(SurfaceError::InvalidName { name: name.clone() });
        }
    }
    Ok(())
}
