use crate::config::Settings;
use crate::domain::opportunity::Opportunity;
use crate::ingest::{DefiLlamaSource, OpportunitySource, StellarHorizonSource};
use anyhow::Result;
use std::time::Duration;

/// Concatenates several sources in order.
///
/// A member that fails is logged and skipped. The fetch only fails when every member
/// failed, with the last member's error.
pub struct CombinedSource {
    members: Vec<Box<dyn OpportunitySource>>,
}

impl CombinedSource {
    pub fn new(members: Vec<Box<dyn OpportunitySource>>) -> Self {
        Self { members }
    }

    /// DefiLlama followed by native Stellar DEX pools.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(vec![
            Box::new(DefiLlamaSource::from_settings(settings)?),
            Box::new(StellarHorizonSource::from_settings(settings)?),
        ]))
    }

    pub fn member_names(&self) -> Vec<&'static str> {
        self.members.iter().map(|m| m.source_name()).collect()
    }
}

#[async_trait::async_trait]
impl OpportunitySource for CombinedSource {
    fn source_name(&self) -> &'static str {
        "combined"
    }

    async fn fetch_opportunities(&self, chains: Option<&[String]>) -> Result<Vec<Opportunity>> {
        let mut out = Vec::new();
        let mut last_err = None;
        let mut succeeded = 0usize;

        for member in &self.members {
            match member.fetch_opportunities(chains).await {
                Ok(mut opportunities) => {
                    tracing::debug!(source = member.source_name(), count = opportunities.len(), "source fetched");
                    succeeded += 1;
                    out.append(&mut opportunities);
                }
                Err(err) => {
                    tracing::warn!(
                        source = member.source_name(),
                        error = %format!("{err:#}"),
                        "source fetch failed; continuing without it"
                    );
                    last_err = Some(err);
                }
            }
        }

        match last_err {
            Some(err) if succeeded == 0 => Err(err),
            _ => Ok(out),
        }
    }

    async fn data_age(&self, chains: Option<&[String]>) -> Duration {
        let mut oldest = Duration::ZERO;
        for member in &self.members {
            oldest = oldest.max(member.data_age(chains).await);
        }
        oldest
    }
}
