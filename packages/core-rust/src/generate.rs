//! Generation pipeline driver.

use rayon::prelude::*;

use crate::bind::bind;
use crate::catalog::Catalog;
use crate::config::GeneratorConfig;
use crate::diagnostics::Diagnostics;
use crate::error::GenerationError;
use crate::extract::{extract_authorizations, extract_operations};
use crate::naming::resolve_names;
use crate::plan::FactoryPlan;
use crate::synth::synthesize;

/// Outcome of generating one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedFactory {
    Ready(FactoryPlan),
    /// The type could not be reasoned about; nothing is emitted for it.
    Inert {
        type_name: String,
        error: GenerationError,
    },
}

impl GeneratedFactory {
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Ready(plan) => &plan.type_name,
            Self::Inert { type_name, .. } => type_name,
        }
    }

    #[must_use]
    pub fn plan(&self) -> Option<&FactoryPlan> {
        match self {
            Self::Ready(plan) => Some(plan),
            Self::Inert { .. } => None,
        }
    }

    #[must_use]
    pub fn into_plan(self) -> Option<FactoryPlan> {
        match self {
            Self::Ready(plan) => Some(plan),
            Self::Inert { .. } => None,
        }
    }

    #[must_use]
    pub fn is_inert(&self) -> bool {
        matches!(self, Self::Inert { .. })
    }
}

/// Runs extraction, binding, synthesis, naming and planning.
#[derive(Debug, Clone, Default)]
pub struct Generator {
    config: GeneratorConfig,
}

impl Generator {
    #[must_use]
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Generates the factory plan of one type.
    ///
    /// Problems the pass can work around end up on the plan's diagnostics;
    /// only an undeclared type or a cyclic base chain makes it inert.
    #[must_use]
    pub fn generate(&self, catalog: &Catalog, type_name: &str) -> GeneratedFactory {
        let chain = match catalog.chain(type_name) {
            Ok(chain) => chain,
            Err(error) => {
                tracing::warn!(type_name = type_name, error = %error, "type is inert");
                return GeneratedFactory::Inert {
                    type_name: type_name.to_string(),
                    error,
                };
            }
        };

        let mut diags = Diagnostics::new();
        let operations = extract_operations(&chain, &self.config, &mut diags);
        let authorizations = extract_authorizations(catalog, &chain, &self.config, &mut diags);
        let save_state = chain.members.iter().any(|s| s.save_state);

        let bound = bind(operations, &authorizations);
        let mut specs = synthesize(type_name, bound, &mut diags);
        resolve_names(&mut specs, &self.config);

        let plan = FactoryPlan::build(type_name, save_state, &specs, authorizations, diags);
        tracing::debug!(
            type_name = type_name,
            methods = plan.methods.len(),
            dispatch = plan.dispatch.len(),
            diagnostics = plan.diagnostics.len(),
            "generated factory plan"
        );
        GeneratedFactory::Ready(plan)
    }

    /// Generates every factory type of the catalog, in name order.
    #[must_use]
    pub fn generate_all(&self, catalog: &Catalog) -> Vec<GeneratedFactory> {
        let names: Vec<&str> = catalog.factory_types().collect();
        names
            .par_iter()
            .map(|name| self.generate(catalog, name))
            .collect()
    }
}
