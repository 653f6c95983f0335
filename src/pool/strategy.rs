//! Pure selection strategies (§4.4). Kept free of I/O and shared state so
//! each strategy's behavior (P-LB, P-LB-W, P-LU, P-RL) is directly testable.

use rand::Rng;

use crate::db::Account;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    RoundRobin,
    WeightedRoundRobin,
    LeastUsed,
    Random,
}

impl From<crate::config::LoadBalanceStrategy> for Strategy {
    fn from(value: crate::config::LoadBalanceStrategy) -> Self {
        match value {
            crate::config::LoadBalanceStrategy::RoundRobin => Strategy::RoundRobin,
            crate::config::LoadBalanceStrategy::WeightedRoundRobin => Strategy::WeightedRoundRobin,
            crate::config::LoadBalanceStrategy::LeastUsed => Strategy::LeastUsed,
            crate::config::LoadBalanceStrategy::Random => Strategy::Random,
        }
    }
}

/// Picks the next eligible account. `cursor` is a per-(channel,strategy)
/// monotonic counter the caller threads through for round-robin fairness;
/// it is irrelevant to `LeastUsed` and `Random`.
pub fn select(strategy: Strategy, candidates: &[Account], cursor: u64) -> Option<usize> {
    if candidates.is_empty() {
        return None;
    }
    match strategy {
        Strategy::RoundRobin => Some((cursor as usize) % candidates.len()),
        Strategy::WeightedRoundRobin => select_weighted(candidates, cursor),
        Strategy::LeastUsed => select_least_used(candidates),
        Strategy::Random => Some(rand::rng().random_range(0..candidates.len())),
    }
}

/// Deterministic weighted round robin: walks a cumulative-weight cycle of
/// length `sum(weight)` indexed by `cursor`, so heavier accounts are chosen
/// proportionally more often without any randomness (P-LB-W).
fn select_weighted(candidates: &[Account], cursor: u64) -> Option<usize> {
    let total_weight: u64 = candidates.iter().map(|a| u64::from(a.weight.max(1))).sum();
    if total_weight == 0 {
        return Some(0);
    }
    let mut point = cursor % total_weight;
    for (idx, account) in candidates.iter().enumerate() {
        let w = u64::from(account.weight.max(1));
        if point < w {
            return Some(idx);
        }
        point -= w;
    }
    Some(candidates.len() - 1)
}

fn select_least_used(candidates: &[Account]) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .min_by_key(|(_, a)| a.request_count)
        .map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ChannelType, Extension};
    use chrono::Utc;

    fn account(id: &str, weight: u32, request_count: u64) -> Account {
        let now = Utc::now();
        Account {
            id: id.into(),
            channel: ChannelType::Gemini,
            label: id.into(),
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            access_token: None,
            token_expires_at: None,
            extension: Extension::default(),
            model_mappings: Vec::new(),
            enabled: true,
            weight,
            rate_limit_per_hour: 20,
            cooldown_until: None,
            last_used_at: None,
            request_count,
            success_count: 0,
            error_count: 0,
            error_streak: 0,
            last_refresh_status: None,
            last_refresh_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn round_robin_cycles_by_cursor() {
        let candidates = vec![account("a", 50, 0), account("b", 50, 0), account("c", 50, 0)];
        assert_eq!(select(Strategy::RoundRobin, &candidates, 0), Some(0));
        assert_eq!(select(Strategy::RoundRobin, &candidates, 1), Some(1));
        assert_eq!(select(Strategy::RoundRobin, &candidates, 3), Some(0));
    }

    #[test]
    fn weighted_round_robin_favors_heavier_accounts() {
        let candidates = vec![account("a", 90, 0), account("b", 10, 0)];
        let mut a_count = 0;
        let mut b_count = 0;
        for cursor in 0..100 {
            match select(Strategy::WeightedRoundRobin, &candidates, cursor) {
                Some(0) => a_count += 1,
                Some(1) => b_count += 1,
                _ => unreachable!(),
            }
        }
        assert!(a_count > b_count * 5);
    }

    #[test]
    fn least_used_picks_lowest_request_count() {
        let candidates = vec![account("a", 50, 40), account("b", 50, 5), account("c", 50, 10)];
        assert_eq!(select(Strategy::LeastUsed, &candidates, 0), Some(1));
    }

    #[test]
    fn empty_candidates_returns_none() {
        assert_eq!(select(Strategy::RoundRobin, &[], 0), None);
    }
}
