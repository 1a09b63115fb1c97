//! Job distribution across alive members

use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::debug;

use crate::jobs::job::Job;

/// Computes a new assignment ledger from the full job set, the alive member
/// set, and the current ledger
///
/// Invoked only by the elected leader. Implementations must be pure: no state
/// of their own, same inputs give the same ledger.
pub trait JobDistributor: Send + Sync {
    /// `alive_members` must be non-empty; the result is undefined otherwise.
    fn distribute(
        &self,
        all_jobs: &HashMap<String, Job>,
        alive_members: &[String],
        current: &HashMap<String, Vec<String>>,
    ) -> HashMap<String, Vec<String>>;
}

/// Even distribution with minimal churn
///
/// Alive members keep the jobs they hold (in stable order) up to
/// `ceil(total / alive_count)`; the overflow and everything unassigned,
/// including jobs held by members no longer alive, is pooled and handed to
/// under-filled members in sorted order. Members present in the current
/// ledger but no longer alive are rewritten with an empty list.
#[derive(Debug, Default, Clone, Copy)]
pub struct BalancedDistributor;

impl JobDistributor for BalancedDistributor {
    fn distribute(
        &self,
        all_jobs: &HashMap<String, Job>,
        alive_members: &[String],
        current: &HashMap<String, Vec<String>>,
    ) -> HashMap<String, Vec<String>> {
        debug_assert!(!alive_members.is_empty(), "distribute requires at least one alive member");

        let mut pool: BTreeSet<String> = all_jobs.keys().cloned().collect();
        let mut ledger: HashMap<String, Vec<String>> = HashMap::new();

        // Alive members keep what they hold, minus ids whose job record is
        // gone; everything they keep leaves the pool.
        for member_id in alive_members {
            let held: Vec<String> = current
                .get(member_id)
                .map(|ids| {
                    ids.iter()
                        .filter(|id| all_jobs.contains_key(*id))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();

            for id in &held {
                pool.remove(id);
            }
            ledger.insert(member_id.clone(), held);
        }

        if alive_members.is_empty() {
            return ledger;
        }

        let avg = all_jobs.len().div_ceil(alive_members.len());

        // Over-filled members return their tail to the pool, keeping their
        // first `avg` entries in stable order.
        for member_id in alive_members {
            if let Some(held) = ledger.get_mut(member_id) {
                if held.len() > avg {
                    pool.extend(held.split_off(avg));
                }
            }
        }

        debug!(
            "Distributing {} jobs across {} members (avg {}, pool {})",
            all_jobs.len(),
            alive_members.len(),
            avg,
            pool.len()
        );

        // Under-filled members draw from the pool until full or the pool is
        // exhausted.
        let mut pool: VecDeque<String> = pool.into_iter().collect();
        for member_id in alive_members {
            if let Some(held) = ledger.get_mut(member_id) {
                while held.len() < avg {
                    match pool.pop_front() {
                        Some(id) => held.push(id),
                        None => break,
                    }
                }
            }
        }

        // Members with a ledger entry but no longer alive hold nothing.
        for member_id in current.keys() {
            ledger.entry(member_id.clone()).or_default();
        }

        ledger
    }
}
