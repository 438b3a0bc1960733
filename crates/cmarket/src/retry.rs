//! Endpoint failover for RPC calls: every endpoint is tried once per round,
//! and the caller only sleeps after a whole round has failed.

use std::{future::Future, time::Duration};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Full passes over the endpoint list.
    pub rounds: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random jitter added to each sleep.
    pub jitter_max_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::for_rounds(3)
    }
}

impl BackoffConfig {
    /// Bounded so that a tool call with every endpoint down still answers in
    /// a few seconds.
    pub fn for_rounds(rounds: usize) -> Self {
        Self {
            rounds: rounds.max(1),
            base_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(3),
            jitter_max_ms: 200,
        }
    }

    /// Sleep after failed round `round` (0-based): `base * 2^round`, capped, plus jitter.
    pub fn delay_after(&self, round: usize) -> Duration {
        let exp = u32::try_from(round).unwrap_or(u32::MAX).min(16);
        let scaled = self
            .base_delay
            .saturating_mul(1_u32.checked_shl(exp).unwrap_or(u32::MAX));
        scaled.min(self.max_delay) + Duration::from_millis(self.jitter())
    }

    fn jitter(&self) -> u64 {
        if cfg!(test) || self.jitter_max_ms == 0 {
            return 0;
        }
        rand::random::<u64>() % self.jitter_max_ms.saturating_add(1)
    }
}

/// Run `op` against each endpoint in order until one succeeds.
///
/// The final error is the last endpoint's, wrapped with `label`.
pub async fn try_endpoints<E, T, Fut>(
    endpoints: &[E],
    cfg: &BackoffConfig,
    mut op: impl FnMut(&E) -> Fut + Send,
    label: &'static str,
) -> eyre::Result<T>
where
    E: Sync,
    Fut: Future<Output = eyre::Result<T>> + Send,
{
    if endpoints.is_empty() {
        eyre::bail!("{label}: no rpc endpoints configured");
    }
    let rounds = cfg.rounds.max(1);
    let mut last: Option<eyre::Report> = None;

    for round in 0..rounds {
        for (idx, ep) in endpoints.iter().enumerate() {
            match op(ep).await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    debug!(label, round, endpoint = idx, error = %format!("{e:#}"), "rpc attempt failed");
                    last = Some(e);
                }
            }
        }
        if round.saturating_add(1) < rounds {
            tokio::time::sleep(cfg.delay_after(round)).await;
        }
    }

    Err(last
        .unwrap_or_else(|| eyre::eyre!("no attempt made"))
        .wrap_err(label))
}
