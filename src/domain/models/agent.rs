//! Agent identity and cached record types.
//!
//! Agents are identified across networks by a [`GlobalId`] of the form
//! `<chainPrefix>[:<chainId>]:<rawId>`. Data sources hand over validated
//! [`AgentRecord`]s; the store stamps them with an expiry and returns
//! [`CachedAgent`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::errors::{DomainError, DomainResult};

/// Longest agent name accepted at the adapter boundary, in characters.
pub const MAX_NAME_CHARS: usize = 256;

/// Network family an agent belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainPrefix {
    Sol,
    Evm,
    Sui,
    Aptos,
    Near,
}

impl ChainPrefix {
    pub const ALL: [Self; 5] = [Self::Sol, Self::Evm, Self::Sui, Self::Aptos, Self::Near];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sol => "sol",
            Self::Evm => "evm",
            Self::Sui => "sui",
            Self::Aptos => "aptos",
            Self::Near => "near",
        }
    }

    /// EVM networks share one registry contract shape, so ids carry the chain id.
    pub fn requires_chain_id(&self) -> bool {
        matches!(self, Self::Evm)
    }
}

impl fmt::Display for ChainPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainPrefix {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sol" => Ok(Self::Sol),
            "evm" => Ok(Self::Evm),
            "sui" => Ok(Self::Sui),
            "aptos" => Ok(Self::Aptos),
            "near" => Ok(Self::Near),
            _ => Err(DomainError::UnknownChainPrefix(s.to_string())),
        }
    }
}

/// Chain-prefixed, globally unique agent identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GlobalId {
    chain_prefix: ChainPrefix,
    chain_id: Option<u64>,
    raw_id: String,
}

impl GlobalId {
    /// Build an id from its parts, enforcing the chain-id rule for the prefix.
    pub fn new(
        chain_prefix: ChainPrefix,
        chain_id: Option<u64>,
        raw_id: impl Into<String>,
    ) -> DomainResult<Self> {
        let raw_id = raw_id.into();
        let invalid = |reason: &str| DomainError::InvalidGlobalId {
            id: format!("{}:{}", chain_prefix, raw_id),
            reason: reason.to_string(),
        };

        if raw_id.trim().is_empty() {
            return Err(invalid("raw id is empty"));
        }
        match (chain_prefix.requires_chain_id(), chain_id) {
            (true, None) => return Err(invalid("chain id is required for this prefix")),
            (false, Some(_)) => return Err(invalid("chain id is not allowed for this prefix")),
            _ => {}
        }

        Ok(Self {
            chain_prefix,
            chain_id,
            raw_id,
        })
    }

    pub fn chain_prefix(&self) -> ChainPrefix {
        self.chain_prefix
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.chain_id
    }

    pub fn raw_id(&self) -> &str {
        &self.raw_id
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.chain_id {
            Some(chain_id) => write!(f, "{}:{}:{}", self.chain_prefix, chain_id, self.raw_id),
            None => write!(f, "{}:{}", self.chain_prefix, self.raw_id),
        }
    }
}

impl FromStr for GlobalId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| DomainError::InvalidGlobalId {
            id: s.to_string(),
            reason: reason.to_string(),
        };

        let (prefix, rest) = s.split_once(':').ok_or_else(|| invalid("missing ':' separator"))?;
        let chain_prefix: ChainPrefix = prefix.parse()?;

        if chain_prefix.requires_chain_id() {
            let (chain_id, raw_id) = rest
                .split_once(':')
                .ok_or_else(|| invalid("expected <prefix>:<chainId>:<rawId>"))?;
            let chain_id = chain_id
                .parse::<u64>()
                .map_err(|_| invalid("chain id must be numeric"))?;
            Self::new(chain_prefix, Some(chain_id), raw_id)
        } else {
            Self::new(chain_prefix, None, rest)
        }
    }
}

impl TryFrom<String> for GlobalId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GlobalId> for String {
    fn from(id: GlobalId) -> Self {
        id.to_string()
    }
}

/// A validated agent record as delivered by a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: GlobalId,
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub trust_tier: Option<u8>,
    #[serde(default)]
    pub quality_score: Option<f64>,
}

impl AgentRecord {
    pub fn new(id: GlobalId, name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            owner: owner.into(),
            trust_tier: None,
            quality_score: None,
        }
    }

    pub fn with_trust_tier(mut self, tier: u8) -> Self {
        self.trust_tier = Some(tier);
        self
    }

    pub fn with_quality_score(mut self, score: f64) -> Self {
        self.quality_score = Some(score);
        self
    }

    pub fn chain_prefix(&self) -> ChainPrefix {
        self.id.chain_prefix()
    }

    pub fn raw_id(&self) -> &str {
        self.id.raw_id()
    }

    /// Check the record before it crosses into the cache.
    pub fn validate(&self) -> DomainResult<()> {
        let invalid = |reason: &str| DomainError::InvalidRecord {
            id: self.id.to_string(),
            reason: reason.to_string(),
        };

        if self.owner.trim().is_empty() {
            return Err(invalid("owner is empty"));
        }
        if self.name.chars().count() > MAX_NAME_CHARS {
            return Err(invalid("name is too long"));
        }
        if let Some(score) = self.quality_score {
            if !score.is_finite() {
                return Err(invalid("quality score is not finite"));
            }
        }
        Ok(())
    }
}

/// The unit of storage: a slim agent record plus its absolute expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAgent {
    pub global_id: String,
    pub chain_prefix: ChainPrefix,
    pub raw_id: String,
    pub name: String,
    pub owner: String,
    pub trust_tier: Option<u8>,
    pub quality_score: Option<f64>,
    pub expires_at: DateTime<Utc>,
}

impl CachedAgent {
    pub fn from_record(record: &AgentRecord, expires_at: DateTime<Utc>) -> Self {
        Self {
            global_id: record.id.to_string(),
            chain_prefix: record.chain_prefix(),
            raw_id: record.raw_id().to_string(),
            name: record.name.clone(),
            owner: record.owner.clone(),
            trust_tier: record.trust_tier,
            quality_score: record.quality_score,
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
