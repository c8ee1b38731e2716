use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::{
    attributes::{get_path, to_hash_value},
    Attributes, Condition, TryParse,
};

/// Saved groups of a configuration, keyed by group id.
pub type SavedGroups = HashMap<String, TryParse<SavedGroup>>;

/// A reusable, named targeting rule referenced by id from feature rules.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum SavedGroup {
    /// Unit belongs to the group if the stored condition matches.
    Condition {
        /// Condition evaluated against the unit's attributes.
        condition: Condition,
    },
    /// Unit belongs to the group if the value of `attribute_key` is one of `values`.
    List {
        /// Attribute holding the unit identifier (e.g., `id` or `email`).
        attribute_key: String,
        /// Group members.
        #[serde(default)]
        values: Vec<Value>,
    },
}

impl SavedGroup {
    fn contains(&self, attributes: &Attributes, saved_groups: &SavedGroups) -> bool {
        match self {
            SavedGroup::Condition { condition } => condition.eval(attributes, saved_groups),
            SavedGroup::List {
                attribute_key,
                values,
            } => get_path(attributes, attribute_key)
                .is_some_and(|actual| list_contains(values, actual)),
        }
    }
}

/// How the groups of a [`SavedGroupTargeting`] entry combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Unit must be in every group.
    All,
    /// Unit must be in at least one group.
    Any,
    /// Unit must be in none of the groups.
    None,
}

/// Saved-group requirement attached to a rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedGroupTargeting {
    #[allow(missing_docs)]
    pub match_type: MatchType,
    /// Saved group ids.
    pub ids: Vec<String>,
}

impl SavedGroupTargeting {
    /// Evaluate this targeting entry. Referencing an unknown (or unparseable) group fails the entry
    /// regardless of match type.
    pub(crate) fn eval(&self, attributes: &Attributes, saved_groups: &SavedGroups) -> bool {
        let mut memberships = Vec::with_capacity(self.ids.len());
        for id in &self.ids {
            let Some(group) = saved_groups.get(id).and_then(TryParse::parsed) else {
                log::warn!(target: "feature_rules", saved_group = id.as_str(); "rule references unknown saved group");
                return false;
            };
            memberships.push(group.contains(attributes, saved_groups));
        }

        match self.match_type {
            MatchType::All => memberships.iter().all(|&m| m),
            MatchType::Any => memberships.iter().any(|&m| m),
            MatchType::None => !memberships.iter().any(|&m| m),
        }
    }
}

/// Evaluate all targeting entries of a rule (logical AND).
pub(crate) fn eval_targeting(
    targeting: &[SavedGroupTargeting],
    attributes: &Attributes,
    saved_groups: &SavedGroups,
) -> bool {
    targeting
        .iter()
        .all(|entry| entry.eval(attributes, saved_groups))
}

/// List-group membership. Values compare by their string form, so `42` matches `"42"`. Array
/// attributes match if any element is a member.
pub(crate) fn list_contains(values: &[Value], actual: &Value) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(|item| list_contains(values, item)),
        _ => {
            let Some(actual) = to_hash_value(actual) else {
                return false;
            };
            values
                .iter()
                .any(|v| to_hash_value(v).is_some_and(|v| v == actual))
        }
    }
}
