//! Dietary preferences as received from callers, and their normalized form.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Diet used when the caller supplies none.
pub const DEFAULT_DIET: &str = "No Preference";
/// Goal used when the caller supplies none.
pub const DEFAULT_GOAL: &str = "Eat Healthier";
/// Portion size used when the caller supplies none.
pub const DEFAULT_PORTION: &str = "medium";

/// Preferences exactly as a caller sent them. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceInput {
    #[serde(default)]
    pub diet: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub portion: Option<String>,
    #[serde(default)]
    pub allergens: Vec<String>,
}

impl PreferenceInput {
    /// Apply defaults and canonicalize.
    ///
    /// String fields are trimmed and blank values count as missing.
    /// Allergens are trimmed, empties dropped, and deduplicated; their order
    /// is irrelevant.
    pub fn normalize(&self) -> Preferences {
        Preferences {
            diet: text_or(&self.diet, DEFAULT_DIET),
            goal: text_or(&self.goal, DEFAULT_GOAL),
            country: self
                .country
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_owned),
            portion: text_or(&self.portion, DEFAULT_PORTION),
            allergens: self
                .allergens
                .iter()
                .map(|a| a.trim())
                .filter(|a| !a.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }
}

fn text_or(value: &Option<String>, default: &str) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_owned()
}

/// A normalized preference set: defaults applied, whitespace trimmed,
/// allergens held as a sorted set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub diet: String,
    pub goal: String,
    pub country: Option<String>,
    pub portion: String,
    pub allergens: BTreeSet<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        PreferenceInput::default().normalize()
    }
}

impl From<&Preferences> for PreferenceInput {
    fn from(p: &Preferences) -> Self {
        Self {
            diet: Some(p.diet.clone()),
            goal: Some(p.goal.clone()),
            country: p.country.clone(),
            portion: Some(p.portion.clone()),
            allergens: p.allergens.iter().cloned().collect(),
        }
    }
}
