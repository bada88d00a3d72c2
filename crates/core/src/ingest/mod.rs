pub mod cache;
pub mod combined;
pub mod defillama;
pub mod stellar;
pub mod types;

use crate::domain::opportunity::Opportunity;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use cache::CachedSource;
pub use combined::CombinedSource;
pub use defillama::DefiLlamaSource;
pub use stellar::StellarHorizonSource;

/// Market data feed producing scored opportunities.
#[async_trait::async_trait]
pub trait OpportunitySource: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// `chains` narrows the result case-insensitively; `None` or empty means every chain.
    async fn fetch_opportunities(
        &self,
        chains: Option<&[String]>,
    ) -> anyhow::Result<Vec<Opportunity>>;

    /// How old the data served for `chains` is. Uncached sources always serve live data.
    async fn data_age(&self, _chains: Option<&[String]>) -> Duration {
        Duration::ZERO
    }
}

#[async_trait::async_trait]
impl<T: OpportunitySource + ?Sized> OpportunitySource for Arc<T> {
    fn source_name(&self) -> &'static str {
        (**self).source_name()
    }

    async fn fetch_opportunities(
        &self,
        chains: Option<&[String]>,
    ) -> anyhow::Result<Vec<Opportunity>> {
        (**self).fetch_opportunities(chains).await
    }

    async fn data_age(&self, chains: Option<&[String]>) -> Duration {
        (**self).data_age(chains).await
    }
}

/// Runs `op` up to `attempts` times, sleeping 1s, 2s, 4s.. between failures.
pub(crate) async fn with_retries<T, F, Fut>(
    source: &'static str,
    attempts: u32,
    mut op: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(err) => {
                if attempt >= attempts {
                    return Err(err);
                }
                let backoff = Duration::from_secs(1 << (attempt - 1));
                tracing::warn!(source, attempt, ?backoff, error = %err, "fetch failed; retrying");
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
