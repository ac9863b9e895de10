//! Overlap policy decision.
//!
//! Pure: the loop feeds in the observed live-instance count and executes
//! whatever action comes back against the store.

use crate::domain::models::OverlapPolicy;

/// What the scheduler loop should do for one due firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapAction {
    /// Decline the firing; advance `next_run_at` only.
    DoNothingAdvance,
    /// Materialize a new instance.
    Materialize,
    /// Skip out the live instances, then materialize.
    ReplaceThenMaterialize,
}

/// Decide the action for a due schedule given its live-instance count.
pub fn decide(policy: OverlapPolicy, live_instances: u64, max_instances: u32) -> OverlapAction {
    let at_capacity = live_instances >= u64::from(max_instances);
    match policy {
        OverlapPolicy::Skip if at_capacity => OverlapAction::DoNothingAdvance,
        OverlapPolicy::Replace if at_capacity => OverlapAction::ReplaceThenMaterialize,
        // Queue always materializes; the executor serializes execution.
        OverlapPolicy::Skip | OverlapPolicy::Queue | OverlapPolicy::Replace => {
            OverlapAction::Materialize
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_below_capacity_materializes() {
        assert_eq!(decide(OverlapPolicy::Skip, 0, 1), OverlapAction::Materialize);
        assert_eq!(decide(OverlapPolicy::Skip, 2, 3), OverlapAction::Materialize);
    }

    #[test]
    fn skip_at_capacity_only_advances() {
        assert_eq!(decide(OverlapPolicy::Skip, 1, 1), OverlapAction::DoNothingAdvance);
        assert_eq!(decide(OverlapPolicy::Skip, 5, 3), OverlapAction::DoNothingAdvance);
    }

    #[test]
    fn queue_ignores_capacity() {
        assert_eq!(decide(OverlapPolicy::Queue, 0, 1), OverlapAction::Materialize);
        assert_eq!(decide(OverlapPolicy::Queue, 10, 1), OverlapAction::Materialize);
    }

    #[test]
    fn replace_at_capacity_replaces_first() {
        assert_eq!(
            decide(OverlapPolicy::Replace, 1, 1),
            OverlapAction::ReplaceThenMaterialize
        );
        assert_eq!(decide(OverlapPolicy::Replace, 0, 1), OverlapAction::Materialize);
    }
}
