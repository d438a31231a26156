//! Campaign lookup for the evaluation service.

use std::collections::HashMap;

use alloy::primitives::Address;
use anyhow::{bail, Result};

use crate::config::CampaignConfig;

/// Tag marking a target as a plain ERC-20 token.
pub const ERC20_TAG: &str = "erc20";

/// Contract a campaign measures activity against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignTarget {
    /// Contract address.
    pub address: Address,
    /// Lowercased, trimmed tags.
    pub tags: Vec<String>,
}

impl CampaignTarget {
    /// Whether the target carries `tag` (case-insensitive).
    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.trim().to_ascii_lowercase();
        self.tags.iter().any(|t| *t == tag)
    }
}

/// A configured campaign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Campaign {
    /// Campaign id.
    pub id: String,
    /// Chain key the campaign's targets live on.
    pub chain: String,
    /// Criteria preset used by default.
    pub criteria_set_id: String,
    /// Measured contracts.
    pub targets: Vec<CampaignTarget>,
}

impl Campaign {
    /// Distinct target addresses in configuration order.
    pub fn target_addresses(&self) -> Vec<Address> {
        let mut out: Vec<Address> = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            if !out.contains(&target.address) {
                out.push(target.address);
            }
        }
        out
    }

    /// Whether every address in `addresses` is a target tagged `tag`.
    pub fn all_tagged(&self, addresses: &[Address], tag: &str) -> bool {
        addresses.iter().all(|address| {
            self.targets
                .iter()
                .any(|t| t.address == *address && t.has_tag(tag))
        })
    }
}

impl From<&CampaignConfig> for Campaign {
    fn from(config: &CampaignConfig) -> Self {
        Self {
            id: config.id.trim().to_string(),
            chain: config.chain.trim().to_string(),
            criteria_set_id: config.criteria_set_id.trim().to_string(),
            targets: config
                .targets
                .iter()
                .map(|t| CampaignTarget {
                    address: t.address,
                    tags: t
                        .tags
                        .iter()
                        .map(|tag| tag.trim().to_ascii_lowercase())
                        .filter(|tag| !tag.is_empty())
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Campaigns indexed by id.
#[derive(Debug, Clone, Default)]
pub struct CampaignRegistry {
    campaigns: HashMap<String, Campaign>,
}

impl CampaignRegistry {
    /// Build from configuration. Duplicate ids are rejected.
    pub fn from_config(configs: &[CampaignConfig]) -> Result<Self> {
        let mut registry = Self::default();
        for config in configs {
            registry.insert(Campaign::from(config))?;
        }
        Ok(registry)
    }

    /// Register a campaign.
    pub fn insert(&mut self, campaign: Campaign) -> Result<()> {
        if campaign.id.is_empty() {
            bail!("Campaign id must not be empty");
        }
        if self.campaigns.contains_key(&campaign.id) {
            bail!("Duplicate campaign id '{}'", campaign.id);
        }
        self.campaigns.insert(campaign.id.clone(), campaign);
        Ok(())
    }

    /// Look up by id; surrounding whitespace is ignored.
    pub fn get(&self, id: &str) -> Option<&Campaign> {
        self.campaigns.get(id.trim())
    }

    /// All campaigns, sorted by id.
    pub fn list(&self) -> Vec<&Campaign> {
        let mut all: Vec<&Campaign> = self.campaigns.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Number of campaigns.
    pub fn len(&self) -> usize {
        self.campaigns.len()
    }

    /// True if no campaign is configured.
    pub fn is_empty(&self) -> bool {
        self.campaigns.is_empty()
    }
}
