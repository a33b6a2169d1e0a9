//! Durability-aware timeout selection.

use std::time::Duration;

use crate::core::{DurabilityLevel, PersistTo};
use crate::env::config::TimeoutConfig;
use crate::options::DurabilityOptions;

/// Picks the effective timeout of a write.
///
/// An explicit user timeout always wins. Otherwise writes that block on
/// persistence, through a synchronous durability level or observe-based
/// polling, get the durable budget and everything else the base budget.
pub fn resolve_timeout(
    user_timeout: Option<Duration>,
    durability_level: Option<DurabilityLevel>,
    persist_to: PersistTo,
    base_kv_timeout: Duration,
    durable_kv_timeout: Duration,
) -> Duration {
    if let Some(timeout) = user_timeout {
        return timeout;
    }

    let synchronous_durability = durability_level.is_some_and(|level| level.requires_persistence());
    let polling_durability = persist_to != PersistTo::None;

    if synchronous_durability || polling_durability {
        durable_kv_timeout
    } else {
        base_kv_timeout
    }
}

/// [`resolve_timeout`] applied to a write's options and the environment budgets.
pub fn decide_kv_timeout(opts: &impl DurabilityOptions, config: &TimeoutConfig) -> Duration {
    let durability = opts.durability_requirement();
    resolve_timeout(
        opts.common().timeout,
        durability.level(),
        durability.persist_to(),
        config.kv_timeout,
        config.kv_durable_timeout,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Durability, ReplicateTo};
    use crate::options::{RemoveOptions, UpsertOptions};

    const BASE: Duration = Duration::from_secs(2);
    const DURABLE: Duration = Duration::from_secs(10);

    #[test]
    fn synchronous_levels_use_durable_budget() {
        assert_eq!(
            resolve_timeout(
                None,
                Some(DurabilityLevel::MajorityAndPersistToActive),
                PersistTo::None,
                BASE,
                DURABLE
            ),
            DURABLE
        );
        assert_eq!(
            resolve_timeout(
                None,
                Some(DurabilityLevel::PersistToMajority),
                PersistTo::None,
                BASE,
                DURABLE
            ),
            DURABLE
        );
    }

    #[test]
    fn majority_alone_keeps_base_budget() {
        assert_eq!(
            resolve_timeout(None, Some(DurabilityLevel::Majority), PersistTo::None, BASE, DURABLE),
            BASE
        );
        assert_eq!(resolve_timeout(None, None, PersistTo::None, BASE, DURABLE), BASE);
    }

    #[test]
    fn polling_uses_durable_budget() {
        assert_eq!(resolve_timeout(None, None, PersistTo::One, BASE, DURABLE), DURABLE);
    }

    #[test]
    fn user_timeout_wins() {
        let user = Duration::from_secs(5);
        assert_eq!(
            resolve_timeout(
                Some(user),
                Some(DurabilityLevel::PersistToMajority),
                PersistTo::Four,
                BASE,
                DURABLE
            ),
            user
        );
    }

    #[test]
    fn options_feed_the_resolver() {
        let config = TimeoutConfig::new()
            .kv_timeout(BASE)
            .kv_durable_timeout(DURABLE);

        let upsert = UpsertOptions::new().durability(Durability::Observe {
            persist_to: PersistTo::Active,
            replicate_to: ReplicateTo::None,
        });
        assert_eq!(decide_kv_timeout(&upsert, &config), DURABLE);

        let remove = RemoveOptions::new().durability(Durability::Level(DurabilityLevel::Majority));
        assert_eq!(decide_kv_timeout(&remove, &config), BASE);
    }
}
