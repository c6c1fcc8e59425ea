//! Protocol registry
//!
//! The fixed roster of protocols the dashboard compares. Each canonical
//! protocol maps to the upstream identifiers DeFiLlama knows it by (version
//! variants and sub-products), plus the chain it is grouped under. The
//! registry is built once at startup and never mutated; its ordering
//! (grouped by chain, then alphabetical) is what determines chart legend and
//! axis ordering downstream.

use serde::{Deserialize, Serialize};

use crate::errors::ProcessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Chain {
    Ethereum,
    Solana,
}

/// The four upstream metrics the pipeline compares. A closed set so a typo
/// cannot silently create a new, uncompared metric bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Tvl,
    Fees,
    Revenue,
    MarketCap,
}

impl Metric {
    pub const ALL: [Metric; 4] = [Metric::Tvl, Metric::Fees, Metric::Revenue, Metric::MarketCap];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Tvl => "tvl",
            Metric::Fees => "fees",
            Metric::Revenue => "revenue",
            Metric::MarketCap => "market_cap",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Metric {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tvl" => Ok(Metric::Tvl),
            "fees" => Ok(Metric::Fees),
            "revenue" => Ok(Metric::Revenue),
            "market_cap" => Ok(Metric::MarketCap),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolSpec {
    pub canonical_name: String,
    pub chain: Chain,
    /// Upstream identifiers to merge into one canonical series
    /// (e.g. aave, aave-v2, aave-v3). Never empty.
    pub upstream_ids: Vec<String>,
}

impl ProtocolSpec {
    pub fn new(canonical_name: &str, chain: Chain, upstream_ids: &[&str]) -> Self {
        Self {
            canonical_name: canonical_name.to_string(),
            chain,
            upstream_ids: upstream_ids.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProtocolRegistry {
    specs: Vec<ProtocolSpec>,
}

impl ProtocolRegistry {
    /// Build a registry, validating invariants and fixing the ordering:
    /// grouped by chain (Ethereum first), alphabetical within a chain.
    pub fn new(mut specs: Vec<ProtocolSpec>) -> Result<Self, ProcessError> {
        for spec in &specs {
            if spec.upstream_ids.is_empty() {
                return Err(ProcessError::InvalidSpec(format!(
                    "{} has no upstream ids",
                    spec.canonical_name
                )));
            }
        }

        specs.sort_by(|a, b| {
            a.chain
                .cmp(&b.chain)
                .then_with(|| a.canonical_name.cmp(&b.canonical_name))
        });

        if let Some(pair) = specs
            .windows(2)
            .find(|w| w[0].canonical_name == w[1].canonical_name)
        {
            return Err(ProcessError::InvalidSpec(format!(
                "duplicate canonical name: {}",
                pair[0].canonical_name
            )));
        }

        Ok(Self { specs })
    }

    pub fn resolve(&self, canonical_name: &str) -> Result<&ProtocolSpec, ProcessError> {
        self.specs
            .iter()
            .find(|s| s.canonical_name == canonical_name)
            .ok_or_else(|| ProcessError::UnknownProtocol(canonical_name.to_string()))
    }

    /// All specs in the documented, deterministic order.
    pub fn all_specs(&self) -> &[ProtocolSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl Default for ProtocolRegistry {
    /// The production roster tracked by the dashboard.
    fn default() -> Self {
        Self::new(vec![
            ProtocolSpec::new("aave", Chain::Ethereum, &["aave", "aave-v2", "aave-v3"]),
            ProtocolSpec::new(
                "compound",
                Chain::Ethereum,
                &["compound-finance", "compound-v1", "compound-v2", "compound-v3"],
            ),
            ProtocolSpec::new("fluid", Chain::Ethereum, &["fluid", "fluid-lending"]),
            ProtocolSpec::new("lido", Chain::Ethereum, &["lido"]),
            ProtocolSpec::new("makerdao", Chain::Ethereum, &["maker", "makerdao"]),
            ProtocolSpec::new("jupiter", Chain::Solana, &["jupiter", "jupiter-aggregator"]),
        ])
        .expect("default registry is valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_resolves_known_protocols() {
        let registry = ProtocolRegistry::default();
        let aave = registry.resolve("aave").unwrap();
        assert_eq!(aave.chain, Chain::Ethereum);
        assert_eq!(aave.upstream_ids.len(), 3);
    }

    #[test]
    fn unknown_protocol_is_an_error() {
        let registry = ProtocolRegistry::default();
        let err = registry.resolve("sonic").unwrap_err();
        assert!(matches!(err, ProcessError::UnknownProtocol(name) if name == "sonic"));
    }

    #[test]
    fn ordering_is_chain_then_alphabetical() {
        // Deliberately scrambled input; the registry must impose the order.
        let registry = ProtocolRegistry::new(vec![
            ProtocolSpec::new("jupiter", Chain::Solana, &["jupiter"]),
            ProtocolSpec::new("lido", Chain::Ethereum, &["lido"]),
            ProtocolSpec::new("aave", Chain::Ethereum, &["aave"]),
        ])
        .unwrap();

        let names: Vec<&str> = registry
            .all_specs()
            .iter()
            .map(|s| s.canonical_name.as_str())
            .collect();
        assert_eq!(names, vec!["aave", "lido", "jupiter"]);
    }

    #[test]
    fn empty_upstream_ids_rejected() {
        let err = ProtocolRegistry::new(vec![ProtocolSpec::new("aave", Chain::Ethereum, &[])])
            .unwrap_err();
        assert!(matches!(err, ProcessError::InvalidSpec(_)));
    }

    #[test]
    fn duplicate_canonical_name_rejected() {
        let err = ProtocolRegistry::new(vec![
            ProtocolSpec::new("aave", Chain::Ethereum, &["aave"]),
            ProtocolSpec::new("aave", Chain::Ethereum, &["aave-v2"]),
        ])
        .unwrap_err();
        assert!(matches!(err, ProcessError::InvalidSpec(_)));
    }

    #[test]
    fn metric_keys_are_stable() {
        assert_eq!(Metric::MarketCap.as_str(), "market_cap");
        let json = serde_json::to_string(&Metric::MarketCap).unwrap();
        assert_eq!(json, "\"market_cap\"");
    }
}
