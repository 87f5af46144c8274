// =============================================================================
// Group Partitioner
// =============================================================================
//
// Splits a dataset into named subgroups. A group is described by a rule: a
// name plus a conjunction of (attribute = value) selectors, e.g.
//
//     GroupRule::new("Black women")
//         .with("race", "Black")
//         .with("gender", "F")
//
// Rules are applied independently, so they may overlap in membership. A rule
// that matches nothing yields an empty sub-dataset: that is not an error here.
// The fitter reports it later as a convergence failure for that group.
//
// =============================================================================

use crate::error::{MultiGroupError, Result};

use super::{Dataset, Record, Value};

/// One `attribute = value` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    pub attribute: String,
    pub value: Value,
}

impl Selector {
    pub fn new(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        record.get(&self.attribute).unwrap_or(&Value::Missing) == &self.value
    }
}

/// A named group: rows matching every selector.
///
/// A rule without selectors selects the whole dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRule {
    pub name: String,
    pub selectors: Vec<Selector>,
}

impl GroupRule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selectors: Vec::new(),
        }
    }

    /// Add an `attribute = value` condition.
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.selectors.push(Selector::new(attribute, value));
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.selectors.iter().all(|s| s.matches(record))
    }
}

/// Named sub-datasets in rule order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    groups: Vec<(String, Dataset)>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Dataset> {
        self.groups.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Dataset)> {
        self.groups.iter().map(|(n, d)| (n.as_str(), d))
    }

    pub(crate) fn groups(&self) -> &[(String, Dataset)] {
        &self.groups
    }
}

impl IntoIterator for Partition {
    type Item = (String, Dataset);
    type IntoIter = std::vec::IntoIter<(String, Dataset)>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.into_iter()
    }
}

/// Apply each rule to `data`, producing one sub-dataset per rule.
///
/// Fails if two rules share a name or a selector names an unknown column.
pub fn partition(data: &Dataset, rules: &[GroupRule]) -> Result<Partition> {
    let mut groups: Vec<(String, Dataset)> = Vec::with_capacity(rules.len());

    for rule in rules {
        if groups.iter().any(|(name, _)| name == &rule.name) {
            return Err(MultiGroupError::DuplicateLabel(rule.name.clone()));
        }
        if let Some(sel) = rule.selectors.iter().find(|s| !data.has_column(&s.attribute)) {
            return Err(MultiGroupError::InvalidValue(format!(
                "group '{}' selects on unknown variable '{}'",
                rule.name, sel.attribute
            )));
        }
        groups.push((rule.name.clone(), data.filter(|r| rule.matches(r))));
    }

    Ok(Partition { groups })
}

/// One group per observed combination of `attributes`.
///
/// Groups appear in first-appearance order and are named like
/// `"race=Black, gender=F"`. Rows missing any of the attributes belong to no
/// group.
pub fn partition_by(data: &Dataset, attributes: &[&str]) -> Result<Partition> {
    if attributes.is_empty() {
        return Err(MultiGroupError::EmptyInput(
            "partition_by needs at least one attribute".to_string(),
        ));
    }
    if let Some(unknown) = attributes.iter().find(|a| !data.has_column(a)) {
        return Err(MultiGroupError::InvalidValue(format!("unknown variable '{unknown}'")));
    }

    let mut rules: Vec<GroupRule> = Vec::new();
    for record in data.records() {
        let combo: Option<Vec<&Value>> = attributes
            .iter()
            .map(|a| record.get(*a).filter(|v| !v.is_missing()))
            .collect();
        let Some(combo) = combo else { continue };

        let name = attributes
            .iter()
            .zip(&combo)
            .map(|(a, v)| format!("{a}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        if rules.iter().any(|r| r.name == name) {
            continue;
        }
        let rule = attributes
            .iter()
            .zip(combo)
            .fold(GroupRule::new(name), |rule, (a, v)| rule.with(*a, v.clone()));
        rules.push(rule);
    }

    partition(data, &rules)
}
