use std::collections::HashMap;

use sps_types::{
    payload::{DataType, Metric},
    MetricId,
};

use crate::error::AliasError;

fn compound_name(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}/{name}"),
        None => name.to_string(),
    }
}

/// A bidirectional metric name to alias map for one originator (an edge node or a device).
///
/// Names and aliases form a bijection. Aliases are only valid for one birth generation so the
/// registry is reset on every birth.
///
/// Metrics nested inside template instances are registered under a compound `parent/child`
/// name and receive their own alias.
#[derive(Debug, Default, Clone)]
pub struct AliasRegistry {
    by_name: HashMap<String, u64>,
    by_alias: HashMap<u64, String>,
    types: HashMap<String, DataType>,
    base: u64,
    next_alias: u64,
}

impl AliasRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next unused alias for `name`.
    ///
    /// If `name` already has an alias it is kept and only the declared type is updated.
    pub fn assign_new(&mut self, name: &str, datatype: Option<DataType>) -> u64 {
        self.set_type(name, datatype);
        if let Some(alias) = self.by_name.get(name) {
            return *alias;
        }
        while self.by_alias.contains_key(&self.next_alias) {
            self.next_alias += 1;
        }
        let alias = self.next_alias;
        self.next_alias += 1;
        self.by_name.insert(name.to_string(), alias);
        self.by_alias.insert(alias, name.to_string());
        alias
    }

    /// Record an alias chosen by the peer, replacing any existing alias for `name`.
    pub fn assign_explicit(
        &mut self,
        name: &str,
        alias: u64,
        datatype: Option<DataType>,
    ) -> Result<(), AliasError> {
        if let Some(existing) = self.by_alias.get(&alias) {
            if existing != name {
                return Err(AliasError::AliasConflict {
                    alias,
                    name: name.to_string(),
                    existing: existing.clone(),
                });
            }
        }
        if let Some(previous) = self.by_name.insert(name.to_string(), alias) {
            if previous != alias {
                self.by_alias.remove(&previous);
            }
        }
        self.by_alias.insert(alias, name.to_string());
        self.set_type(name, datatype);
        Ok(())
    }

    fn set_type(&mut self, name: &str, datatype: Option<DataType>) {
        if let Some(datatype) = datatype {
            self.types.insert(name.to_string(), datatype);
        }
    }

    pub fn resolve_alias(&self, alias: u64) -> Option<&str> {
        self.by_alias.get(&alias).map(String::as_str)
    }

    pub fn resolve_name(&self, name: &str) -> Option<u64> {
        self.by_name.get(name).copied()
    }

    pub fn type_of(&self, id: &MetricId) -> Option<DataType> {
        let name = match id {
            MetricId::Name(name) => name.as_str(),
            MetricId::Alias(alias) => self.resolve_alias(*alias)?,
        };
        self.types.get(name).copied()
    }

    /// Clear all mappings. The allocator restarts from 0.
    pub fn reset(&mut self) {
        self.reset_with_base(0)
    }

    /// Clear all mappings, restarting the allocator at `base`.
    ///
    /// Lets an edge node keep aliases unique across itself and its devices.
    pub fn reset_with_base(&mut self, base: u64) {
        self.by_name.clear();
        self.by_alias.clear();
        self.types.clear();
        self.base = base;
        self.next_alias = base;
    }

    /// The alias the allocator will consider next
    pub fn next_alias(&self) -> u64 {
        self.next_alias
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Allocate aliases for every metric of an outbound birth, stamping them onto the metrics.
    pub fn assign_birth_metrics(&mut self, metrics: &mut [Metric]) -> Result<(), AliasError> {
        self.assign_recursive(None, metrics)
    }

    fn assign_recursive(
        &mut self,
        prefix: Option<&str>,
        metrics: &mut [Metric],
    ) -> Result<(), AliasError> {
        for metric in metrics {
            let name = match &metric.name {
                Some(name) => compound_name(prefix, name),
                None => return Err(AliasError::Unidentified),
            };
            let alias = self.assign_new(&name, metric.data_type());
            metric.alias = Some(alias);
            if let Some(members) = metric.template_members_mut() {
                self.assign_recursive(Some(&name), members)?;
            }
        }
        Ok(())
    }

    /// Record the aliases carried by the metrics of an inbound birth.
    pub fn record_birth_metrics(&mut self, metrics: &[Metric]) -> Result<(), AliasError> {
        self.record_recursive(None, metrics)
    }

    fn record_recursive(
        &mut self,
        prefix: Option<&str>,
        metrics: &[Metric],
    ) -> Result<(), AliasError> {
        for metric in metrics {
            let name = match &metric.name {
                Some(name) => compound_name(prefix, name),
                None => return Err(AliasError::Unidentified),
            };
            match metric.alias {
                Some(alias) => self.assign_explicit(&name, alias, metric.data_type())?,
                None => self.set_type(&name, metric.data_type()),
            }
            if let Some(members) = metric.template_members() {
                self.record_recursive(Some(&name), members)?;
            }
        }
        Ok(())
    }

    /// Replace names with aliases on outbound data metrics. Metrics without a registered alias keep their name.
    pub fn compress(&self, metrics: &mut [Metric]) {
        for metric in metrics {
            let alias = match metric.name.as_deref().and_then(|n| self.resolve_name(n)) {
                Some(alias) => alias,
                None => continue,
            };
            metric.alias = Some(alias);
            metric.name = None;
        }
    }

    /// Fill in the names of inbound metrics that only carry an alias.
    pub fn resolve_metrics(&self, metrics: &mut [Metric]) -> Result<(), AliasError> {
        self.resolve_recursive(None, metrics)
    }

    fn resolve_recursive(
        &self,
        prefix: Option<&str>,
        metrics: &mut [Metric],
    ) -> Result<(), AliasError> {
        for metric in metrics {
            if metric.name.is_none() {
                let alias = metric.alias.ok_or(AliasError::Unidentified)?;
                let full_name = self
                    .resolve_alias(alias)
                    .ok_or(AliasError::UnknownAlias(alias))?;
                let name = match prefix {
                    Some(prefix) => full_name
                        .strip_prefix(prefix)
                        .and_then(|n| n.strip_prefix('/'))
                        .unwrap_or(full_name),
                    None => full_name,
                };
                metric.name = Some(name.to_string());
            }
            let full_name = metric.name.as_deref().map(|n| compound_name(prefix, n));
            if let (Some(full_name), Some(members)) = (full_name, metric.template_members_mut()) {
                self.resolve_recursive(Some(&full_name), members)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use sps_types::payload::{Template, Value};

    use super::*;

    fn named(name: &str) -> Metric {
        let mut metric = Metric::new();
        metric
            .set_name(name.into())
            .set_datatype(DataType::Int32)
            .set_value(Value::IntValue(0));
        metric
    }

    fn template(name: &str, members: Vec<Metric>) -> Metric {
        let mut metric = Metric::new();
        metric
            .set_name(name.into())
            .set_datatype(DataType::Template)
            .set_value(Value::TemplateValue(Template {
                metrics: members,
                template_ref: Some("Type".into()),
                is_definition: Some(false),
                ..Default::default()
            }));
        metric
    }

    #[test]
    fn assign_new_is_monotonic() {
        let mut registry = AliasRegistry::new();
        assert_eq!(registry.assign_new("T1", Some(DataType::Int32)), 0);
        assert_eq!(registry.assign_new("T2", None), 1);
        assert_eq!(registry.assign_new("T1", Some(DataType::Int64)), 0);
        assert_eq!(registry.resolve_alias(1), Some("T2"));
        assert_eq!(registry.resolve_name("T1"), Some(0));
        assert_eq!(
            registry.type_of(&MetricId::Alias(0)),
            Some(DataType::Int64)
        );
        assert_eq!(registry.type_of(&MetricId::Name("T2".into())), None);
    }

    #[test]
    fn assign_new_skips_explicit_aliases() {
        let mut registry = AliasRegistry::new();
        registry.assign_explicit("A", 0, None).unwrap();
        assert_eq!(registry.assign_new("B", None), 1);
    }

    #[test]
    fn explicit_overwrites_name_mapping() {
        let mut registry = AliasRegistry::new();
        registry.assign_explicit("A", 4, None).unwrap();
        registry.assign_explicit("A", 7, None).unwrap();
        assert_eq!(registry.resolve_name("A"), Some(7));
        assert_eq!(registry.resolve_alias(4), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn explicit_conflict_keeps_bijection() {
        let mut registry = AliasRegistry::new();
        registry.assign_explicit("A", 1, None).unwrap();
        assert!(matches!(
            registry.assign_explicit("B", 1, None),
            Err(AliasError::AliasConflict { alias: 1, .. })
        ));
        assert_eq!(registry.resolve_alias(1), Some("A"));
        assert_eq!(registry.resolve_name("B"), None);
    }

    #[test]
    fn reset_clears_everything() {
        let mut registry = AliasRegistry::new();
        registry.assign_new("T1", Some(DataType::Boolean));
        registry.assign_new("T2", None);
        registry.reset();
        assert!(registry.is_empty());
        assert_eq!(registry.resolve_name("T1"), None);
        assert_eq!(registry.type_of(&MetricId::Name("T1".into())), None);
        assert_eq!(registry.assign_new("T2", None), 0);
    }

    #[test]
    fn reset_with_base() {
        let mut registry = AliasRegistry::new();
        registry.reset_with_base(10);
        assert_eq!(registry.assign_new("A", None), 10);
        assert_eq!(registry.next_alias(), 11);
    }

    #[test]
    fn nested_templates_get_their_own_aliases() {
        let inner = template("Inner", vec![named("Temp")]);
        let mut metrics = vec![named("Flat"), template("Motor", vec![named("Speed"), inner])];

        let mut registry = AliasRegistry::new();
        registry.assign_birth_metrics(&mut metrics).unwrap();

        let names = ["Flat", "Motor", "Motor/Speed", "Motor/Inner", "Motor/Inner/Temp"];
        let mut aliases: Vec<u64> = names
            .iter()
            .map(|n| registry.resolve_name(n).unwrap())
            .collect();
        aliases.dedup();
        assert_eq!(aliases, vec![0, 1, 2, 3, 4]);
        assert_eq!(metrics[1].alias, Some(1));
        let members = metrics[1].template_members().unwrap();
        assert_eq!(members[0].alias, Some(2));
        assert_eq!(
            registry.type_of(&MetricId::Name("Motor".into())),
            Some(DataType::Template)
        );
    }

    #[test]
    fn record_and_resolve_nested() {
        let mut speed = named("Speed");
        speed.set_alias(11);
        let mut motor = template("Motor", vec![speed]);
        motor.set_alias(10);
        let mut registry = AliasRegistry::new();
        registry.record_birth_metrics(&[motor]).unwrap();
        assert_eq!(registry.resolve_alias(11), Some("Motor/Speed"));

        let mut data_member = Metric::new();
        data_member.set_alias(11).set_value(Value::IntValue(3));
        let mut data = Metric::new();
        data.set_alias(10).set_value(Value::TemplateValue(Template {
            metrics: vec![data_member],
            ..Default::default()
        }));
        let mut metrics = vec![data];
        registry.resolve_metrics(&mut metrics).unwrap();
        assert_eq!(metrics[0].name.as_deref(), Some("Motor"));
        assert_eq!(
            metrics[0].template_members().unwrap()[0].name.as_deref(),
            Some("Speed")
        );
    }

    #[test]
    fn duplicate_alias_in_birth_is_rejected() {
        let mut a = named("A");
        a.set_alias(1);
        let mut b = named("B");
        b.set_alias(1);
        let mut registry = AliasRegistry::new();
        assert!(matches!(
            registry.record_birth_metrics(&[a, b]),
            Err(AliasError::AliasConflict { .. })
        ));
    }

    #[test]
    fn unknown_alias_fails_resolution() {
        let registry = AliasRegistry::new();
        let mut metric = Metric::new();
        metric.set_alias(5);
        assert_eq!(
            registry.resolve_metrics(&mut [metric]),
            Err(AliasError::UnknownAlias(5))
        );
    }

    #[test]
    fn compress_replaces_known_names() {
        let mut registry = AliasRegistry::new();
        registry.assign_new("A", None);
        let mut metrics = vec![named("A"), named("B")];
        registry.compress(&mut metrics);
        assert_eq!(metrics[0].alias, Some(0));
        assert_eq!(metrics[0].name, None);
        assert_eq!(metrics[1].name.as_deref(), Some("B"));
    }
}
