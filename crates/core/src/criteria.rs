//! Named criteria presets and override resolution.

use std::collections::BTreeMap;

use crate::constants::{DEFAULT_CRITERIA_SET_ID, ENGINE_VERSION};
use crate::error::{CoreError, Result};
use crate::types::{UsageCriteria, UsageCriteriaInput, UsageCriteriaParams};

/// A named set of default thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriteriaPreset {
    /// Identifier, e.g. `airdrop/basic@1`.
    pub criteria_set_id: String,
    /// Thresholds of the preset.
    pub params: UsageCriteriaParams,
}

/// Registry of presets keyed by `criteria_set_id`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CriteriaPresets {
    presets: BTreeMap<String, CriteriaPreset>,
}

impl CriteriaPresets {
    /// Presets shipped with engine `v1`.
    pub fn builtin() -> Self {
        let mut presets = Self::default();
        presets.insert(CriteriaPreset {
            criteria_set_id: DEFAULT_CRITERIA_SET_ID.to_string(),
            params: UsageCriteriaParams {
                min_days_active: 7,
                min_tx_count: 10,
                min_unique_contracts: 3,
            },
        });
        presets
    }

    /// Add or replace a preset.
    pub fn insert(&mut self, preset: CriteriaPreset) {
        self.presets.insert(preset.criteria_set_id.clone(), preset);
    }

    /// Look up a preset by id.
    pub fn get(&self, criteria_set_id: &str) -> Option<&CriteriaPreset> {
        self.presets.get(criteria_set_id)
    }

    /// Merge the named preset with caller overrides.
    ///
    /// An unknown preset is not an error by itself: overrides may still
    /// supply every parameter. A parameter found in neither place is.
    pub fn resolve(&self, input: Option<&UsageCriteriaInput>) -> Result<UsageCriteria> {
        let criteria_set_id = input
            .and_then(|c| c.criteria_set_id.as_deref())
            .unwrap_or(DEFAULT_CRITERIA_SET_ID)
            .to_string();
        let base = self.get(&criteria_set_id).map(|p| p.params);
        let overrides = input.map(|c| c.params).unwrap_or_default();

        let resolve = |value: Option<i64>, fallback: Option<u64>, label: &'static str| {
            match (value, fallback) {
                (Some(v), _) => u64::try_from(v).map_err(|_| CoreError::NegativeValue(label)),
                (None, Some(v)) => Ok(v),
                (None, None) => Err(CoreError::UnresolvedCriteria(label)),
            }
        };

        Ok(UsageCriteria {
            criteria_set_id,
            engine_version: ENGINE_VERSION.to_string(),
            params: UsageCriteriaParams {
                min_days_active: resolve(
                    overrides.min_days_active,
                    base.map(|p| p.min_days_active),
                    "min_days_active",
                )?,
                min_tx_count: resolve(
                    overrides.min_tx_count,
                    base.map(|p| p.min_tx_count),
                    "min_tx_count",
                )?,
                min_unique_contracts: resolve(
                    overrides.min_unique_contracts,
                    base.map(|p| p.min_unique_contracts),
                    "min_unique_contracts",
                )?,
            },
        })
    }
}
