//! Deterministic name resolution for synthesized factory methods.

use std::collections::HashSet;

use crate::config::GeneratorConfig;
use crate::synth::FactoryMethodSpec;

/// Pool of names already taken on one factory.
#[derive(Debug, Default)]
pub struct NamePool {
    used: HashSet<String>,
}

impl NamePool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `base`, or `base` followed by the smallest positive integer
    /// that is still free.
    pub fn claim(&mut self, base: &str) -> String {
        if self.used.insert(base.to_string()) {
            return base.to_string();
        }
        let mut n = 1usize;
        loop {
            let candidate = format!("{base}{n}");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Assigns every spec its final name.
///
/// Reads, writes and saves are named first, fewest parameters first, ties
/// broken by discovery order with saves after every read and write. Probes
/// and the non-throwing save variants follow, derived from the names just
/// resolved.
pub fn resolve_names(specs: &mut [FactoryMethodSpec], config: &GeneratorConfig) {
    let mut pool = NamePool::new();

    let mut primary: Vec<usize> = specs
        .iter()
        .enumerate()
        .filter(|(_, s)| !matches!(s, FactoryMethodSpec::Can(_)))
        .map(|(i, _)| i)
        .collect();
    primary.sort_by_key(|&i| {
        let spec = &specs[i];
        (
            spec.param_count(),
            matches!(spec, FactoryMethodSpec::Save(_)),
            spec.order(),
        )
    });

    for i in primary {
        let base = match &specs[i] {
            FactoryMethodSpec::Save(_) => config.save_name.clone(),
            other => other.base_name().to_string(),
        };
        let name = pool.claim(&base);
        specs[i].set_name(name);
    }

    for i in 0..specs.len() {
        if let FactoryMethodSpec::Can(probe) = &specs[i] {
            let base = format!("{}{}", config.probe_prefix, specs[probe.wraps].name());
            let name = pool.claim(&base);
            specs[i].set_name(name);
        }
    }

    for spec in specs.iter_mut() {
        if let FactoryMethodSpec::Save(save) = spec {
            if save.gated {
                let base = format!("{}{}", config.try_prefix, save.name);
                save.try_name = Some(pool.claim(&base));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_appends_smallest_free_suffix() {
        let mut pool = NamePool::new();
        assert_eq!(pool.claim("create"), "create");
        assert_eq!(pool.claim("create1"), "create1");
        assert_eq!(pool.claim("create"), "create2");
        assert_eq!(pool.claim("fetch"), "fetch");
    }
}
