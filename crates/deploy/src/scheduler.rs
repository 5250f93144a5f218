//! Dependency ordering of deployment units.
//!
//! The scheduler works in waves: every pass takes, in declaration order, each
//! remaining unit whose dependencies have all been placed by earlier passes.
//! Repeated runs over the same unit set therefore always produce the same
//! order, which keeps logs and ledger writes reproducible.

use std::collections::HashSet;

use crate::{DeployError, Unit, UnitSet};

/// Orders a [`UnitSet`] so that every unit comes after its dependencies.
pub struct Scheduler<'a> {
    units: &'a UnitSet,
}

impl<'a> Scheduler<'a> {
    pub fn new(units: &'a UnitSet) -> Self {
        Self { units }
    }

    /// Check that names are usable and unique, and that every referenced unit exists.
    pub fn validate(&self) -> Result<(), DeployError> {
        let mut seen = HashSet::new();
        for unit in self.units.iter() {
            check_name(&unit.name)?;
            if !seen.insert(unit.name.as_str()) {
                return Err(DeployError::invalid(&unit.name, "unit is declared twice"));
            }
        }

        for unit in self.units.iter() {
            if let Some(missing) = unit
                .effective_dependencies()
                .into_iter()
                .find(|dep| !self.units.contains(dep))
            {
                return Err(DeployError::MissingDependency {
                    unit: unit.name.clone(),
                    dependency: missing.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Group units into waves. Units in a wave only depend on earlier waves.
    pub fn waves(&self) -> Result<Vec<Vec<&'a Unit>>, DeployError> {
        self.validate()?;

        let mut done: HashSet<&str> = HashSet::new();
        let mut remaining: Vec<&'a Unit> = self.units.iter().collect();
        let mut waves = Vec::new();

        while !remaining.is_empty() {
            let (ready, blocked): (Vec<&'a Unit>, Vec<&'a Unit>) =
                remaining.into_iter().partition(|unit| {
                    unit.effective_dependencies()
                        .iter()
                        .all(|dep| done.contains(dep))
                });

            if ready.is_empty() {
                return Err(DeployError::DependencyCycle {
                    units: blocked.iter().map(|unit| unit.name.clone()).collect(),
                });
            }

            done.extend(ready.iter().map(|unit| unit.name.as_str()));
            tracing::trace!(
                wave = waves.len(),
                units = ?ready.iter().map(|unit| &unit.name).collect::<Vec<_>>(),
                "Scheduled wave"
            );
            waves.push(ready);
            remaining = blocked;
        }

        Ok(waves)
    }

    /// Execution order: the waves, flattened.
    pub fn order(&self) -> Result<Vec<&'a Unit>, DeployError> {
        Ok(self.waves()?.into_iter().flatten().collect())
    }

    /// Restrict the unit set to the units carrying any of `tags`, plus all of
    /// their transitive dependencies. An empty tag list selects everything.
    pub fn select(&self, tags: &[String]) -> Result<UnitSet, DeployError> {
        self.validate()?;

        if tags.is_empty() {
            return Ok(self.units.clone());
        }

        let mut selected: HashSet<&str> = HashSet::new();
        let mut pending: Vec<&str> = Vec::new();

        for tag in tags {
            let tagged: Vec<&str> = self
                .units
                .iter()
                .filter(|unit| unit.has_tag(tag))
                .map(|unit| unit.name.as_str())
                .collect();
            if tagged.is_empty() {
                return Err(DeployError::UnknownTag { tag: tag.clone() });
            }
            pending.extend(tagged);
        }

        while let Some(name) = pending.pop() {
            if !selected.insert(name) {
                continue;
            }
            if let Some(unit) = self.units.find(name) {
                pending.extend(unit.effective_dependencies());
            }
        }

        Ok(self
            .units
            .iter()
            .filter(|unit| selected.contains(unit.name.as_str()))
            .cloned()
            .collect::<Vec<_>>()
            .into())
    }
}

/// Unit names become ledger file names, next to the ledger's own dot files.
fn check_name(name: &str) -> Result<(), DeployError> {
    if name.is_empty() {
        return Err(DeployError::invalid(name, "unit name is empty"));
    }
    if name.starts_with('.') {
        return Err(DeployError::invalid(name, "unit name must not start with `.`"));
    }
    if name.chars().any(|c| matches!(c, '/' | '\\' | '\0')) {
        return Err(DeployError::invalid(
            name,
            "unit name must not contain path separators",
        ));
    }
    Ok(())
}
