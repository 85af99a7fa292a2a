//! Target scoring for placement decisions.
//!
//! A target's score is its declared priority divided by its load:
//! `priority / (assigned_instances + 1)` in integer arithmetic. A busy
//! high-priority target is overtaken by a lightly loaded lower-priority one
//! once enough instances pile up on it.

use std::cmp::Ordering;

use tenantgrid_state::{ObjectRef, Target};

/// Scored placement result for a single target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetScore {
    pub target: ObjectRef,
    pub score: i64,
    pub priority: i64,
    pub assigned: usize,
}

/// Score a single target.
pub fn score_target(target: &Target) -> TargetScore {
    let assigned = target.assigned_count();
    let divisor = i64::try_from(assigned).unwrap_or(i64::MAX - 1) + 1;
    TargetScore {
        target: target.metadata.key(),
        score: target.spec.priority / divisor,
        priority: target.spec.priority,
        assigned,
    }
}

/// Score all targets and return them best first.
///
/// Equal scores are ordered by `{namespace}/{name}` so the winner does not
/// depend on the order the pool was listed in.
pub fn rank_targets<'a>(targets: &[&'a Target]) -> Vec<(TargetScore, &'a Target)> {
    let mut scored: Vec<(TargetScore, &Target)> =
        targets.iter().map(|t| (score_target(t), *t)).collect();
    scored.sort_by(|(a, _), (b, _)| compare(a, b));
    scored
}

fn compare(a: &TargetScore, b: &TargetScore) -> Ordering {
    b.score.cmp(&a.score).then_with(|| a.target.cmp(&b.target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenantgrid_state::{ObjectMeta, TargetSpec, TargetStatus};

    fn make_target(name: &str, priority: i64, instances: usize) -> Target {
        Target {
            metadata: ObjectMeta::new("targets", name),
            spec: TargetSpec {
                priority,
                visible: true,
                ..Default::default()
            },
            status: TargetStatus {
                assigned_instances: (0..instances)
                    .map(|i| ObjectRef::new("tenant01", format!("inst-{i}")))
                    .collect(),
                ..Default::default()
            },
        }
    }

    fn names(ranked: &[(TargetScore, &Target)]) -> Vec<String> {
        ranked
            .iter()
            .map(|(s, _)| s.target.name.clone())
            .collect()
    }

    #[test]
    fn score_is_priority_over_load() {
        assert_eq!(score_target(&make_target("a", 30, 0)).score, 30);
        assert_eq!(score_target(&make_target("a", 30, 1)).score, 15);
        // Integer division.
        assert_eq!(score_target(&make_target("c", 10, 2)).score, 3);
        assert_eq!(score_target(&make_target("z", 0, 5)).score, 0);
    }

    #[test]
    fn ranks_by_score_descending() {
        let a = make_target("a", 30, 0);
        let b = make_target("b", 20, 0);
        let c = make_target("c", 10, 2);

        let ranked = rank_targets(&[&c, &a, &b]);
        assert_eq!(names(&ranked), vec!["a", "b", "c"]);
        let scores: Vec<i64> = ranked.iter().map(|(s, _)| s.score).collect();
        assert_eq!(scores, vec![30, 20, 3]);
    }

    #[test]
    fn loaded_high_priority_target_falls_behind() {
        let a = make_target("a", 30, 1);
        let b = make_target("b", 20, 0);
        let c = make_target("c", 10, 2);

        let ranked = rank_targets(&[&a, &b, &c]);
        assert_eq!(names(&ranked), vec!["b", "a", "c"]);
        assert_eq!(ranked[1].0.score, 15);
    }

    #[test]
    fn ties_break_by_name_regardless_of_input_order() {
        let x = make_target("x", 10, 0);
        let y = make_target("y", 20, 1);

        assert_eq!(names(&rank_targets(&[&x, &y])), vec!["x", "y"]);
        assert_eq!(names(&rank_targets(&[&y, &x])), vec!["x", "y"]);
    }

    #[test]
    fn empty_pool_ranks_nothing() {
        assert!(rank_targets(&[]).is_empty());
    }
}
