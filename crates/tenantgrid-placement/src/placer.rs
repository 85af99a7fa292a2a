//! Placement engine — picks the target a deployment's instance runs on.
//!
//! Two paths feed the same final selection:
//! 1. Manual rules: the highest-priority applicable [`SchedulingRule`]s name
//!    the candidate targets explicitly.
//! 2. Automatic: without an applicable rule every unrestricted target is a
//!    candidate.
//!
//! [`select_target`] then filters candidates by visibility, region and
//! target labels and
//! returns the best ranked one. Selection is read-only; recording the
//! assignment on the target is the caller's job.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use tenantgrid_state::{Deployment, ObjectRef, SchedulingRule, Target};

use crate::error::{PlacementError, PlacementResult};
use crate::scorer::rank_targets;
use crate::selector::rule_applies;

/// Pick the best visible target from `pool` for `deployment`.
pub fn select_target(deployment: &Deployment, pool: &[Target]) -> PlacementResult<Target> {
    let region = deployment.spec.region.as_deref();
    let eligible: Vec<&Target> = pool
        .iter()
        .filter(|t| t.spec.visible)
        .filter(|t| match region {
            Some(wanted) => t.spec.region.as_deref() == Some(wanted),
            None => true,
        })
        .filter(|t| carries_labels(t, &deployment.spec.target_labels))
        .collect();

    let ranked = rank_targets(&eligible);
    let Some((best, target)) = ranked.first() else {
        debug!(
            deployment = %deployment.metadata.key(),
            pool = pool.len(),
            "no eligible target"
        );
        return Err(PlacementError::NoCapacity);
    };

    debug!(
        deployment = %deployment.metadata.key(),
        target = %best.target,
        score = best.score,
        candidates = ranked.len(),
        "selected target"
    );
    Ok((*target).clone())
}

fn carries_labels(target: &Target, wanted: &BTreeMap<String, String>) -> bool {
    wanted
        .iter()
        .all(|(k, v)| target.metadata.labels.get(k) == Some(v))
}

/// Resolve the candidate pool for `deployment` from the manual rules.
///
/// Only the highest priority among applicable rules counts; rules sharing
/// that priority contribute all their targets. If no rule applies, the
/// candidates are all unrestricted targets. Rule references are resolved
/// against `pool` with duplicates and unknown targets dropped.
pub fn candidate_targets(
    deployment: &Deployment,
    rules: &[SchedulingRule],
    pool: &[Target],
) -> Vec<Target> {
    let mut best_priority: Option<i64> = None;
    let mut refs: Vec<&ObjectRef> = Vec::new();

    for rule in rules {
        if best_priority.is_some_and(|best| rule.priority < best) {
            continue;
        }
        if !rule_applies(rule, deployment) {
            continue;
        }
        if best_priority.is_some_and(|best| rule.priority == best) {
            refs.extend(&rule.targets);
        } else {
            best_priority = Some(rule.priority);
            refs = rule.targets.iter().collect();
        }
    }

    let Some(priority) = best_priority else {
        return pool.iter().filter(|t| !t.spec.restricted).cloned().collect();
    };

    let mut seen = HashSet::new();
    let candidates: Vec<Target> = refs
        .into_iter()
        .filter(|r| seen.insert(*r))
        .filter_map(|r| pool.iter().find(|t| t.metadata.key() == *r))
        .cloned()
        .collect();
    debug!(
        deployment = %deployment.metadata.key(),
        rule_priority = priority,
        candidates = candidates.len(),
        "scheduling rules matched"
    );
    candidates
}

/// Apply the manual rules, then pick a target from the resulting pool.
pub fn find_target(
    deployment: &Deployment,
    rules: &[SchedulingRule],
    pool: &[Target],
) -> PlacementResult<Target> {
    let candidates = candidate_targets(deployment, rules, pool);
    select_target(deployment, &candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenantgrid_state::{
        DeploymentSpec, ObjectMeta, Selector, TargetSpec, TargetStatus,
    };

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

    fn test_deployment(tenant_id: &str) -> Deployment {
        Deployment {
            metadata: ObjectMeta::new(tenant_id, "dev"),
            spec: DeploymentSpec {
                tenant_id: tenant_id.into(),
                purpose: "dev".into(),
                ..Default::default()
            },
            status: Default::default(),
        }
    }

    fn rule(priority: i64, targets: &[&str], selectors: Vec<Selector>) -> SchedulingRule {
        SchedulingRule {
            priority,
            targets: targets
                .iter()
                .map(|n| ObjectRef::new("targets", *n))
                .collect(),
            selectors,
        }
    }

    fn target_ref(name: &str) -> ObjectRef {
        ObjectRef::new("targets", name)
    }

    // ── select_target ──────────────────────────────────────────────

    #[test]
    fn picks_highest_score() {
        let pool = vec![
            make_target("a", 30, 0),
            make_target("b", 20, 0),
            make_target("c", 10, 2),
        ];
        let chosen = select_target(&test_deployment("tenant01"), &pool).unwrap();
        assert_eq!(chosen.metadata.name, "a");
    }

    #[test]
    fn assignment_shifts_next_pick() {
        let pool = vec![
            make_target("a", 30, 1),
            make_target("b", 20, 0),
            make_target("c", 10, 2),
        ];
        let chosen = select_target(&test_deployment("tenant01"), &pool).unwrap();
        assert_eq!(chosen.metadata.name, "b");
    }

    #[test]
    fn never_returns_invisible_target() {
        let mut hidden = make_target("a", 100, 0);
        hidden.spec.visible = false;
        let pool = vec![hidden, make_target("b", 1, 10)];

        let chosen = select_target(&test_deployment("tenant01"), &pool).unwrap();
        assert_eq!(chosen.metadata.name, "b");
    }

    #[test]
    fn region_hint_filters_exactly() {
        let mut eu = make_target("eu", 10, 0);
        eu.spec.region = Some("eu".into());
        let mut us = make_target("us", 50, 0);
        us.spec.region = Some("us".into());
        let unlabelled = make_target("none", 90, 0);
        let pool = vec![eu, us, unlabelled];

        let mut dep = test_deployment("tenant01");
        dep.spec.region = Some("eu".into());
        let chosen = select_target(&dep, &pool).unwrap();
        assert_eq!(chosen.metadata.name, "eu");

        dep.spec.region = Some("ap".into());
        assert_eq!(select_target(&dep, &pool), Err(PlacementError::NoCapacity));
    }

    #[test]
    fn label_hint_filters_exactly() {
        let mut gpu = make_target("gpu", 10, 0);
        gpu.metadata.labels.insert("hardware".into(), "gpu".into());
        gpu.metadata.labels.insert("tier".into(), "gold".into());
        let mut cpu = make_target("cpu", 50, 0);
        cpu.metadata.labels.insert("hardware".into(), "cpu".into());
        let unlabelled = make_target("none", 90, 0);
        let pool = vec![gpu, cpu, unlabelled];

        let mut dep = test_deployment("tenant01");
        assert_eq!(select_target(&dep, &pool).unwrap().metadata.name, "none");

        dep.spec.target_labels.insert("hardware".into(), "gpu".into());
        assert_eq!(select_target(&dep, &pool).unwrap().metadata.name, "gpu");

        dep.spec.target_labels.insert("tier".into(), "silver".into());
        assert_eq!(select_target(&dep, &pool), Err(PlacementError::NoCapacity));
    }

    #[test]
    fn empty_pool_is_no_capacity() {
        let err = select_target(&test_deployment("tenant01"), &[]).unwrap_err();
        assert_eq!(err, PlacementError::NoCapacity);
        assert_eq!(err.to_string(), "no target with remaining capacity available");
    }

    // ── candidate_targets ──────────────────────────────────────────

    #[test]
    fn no_rules_means_unrestricted_targets() {
        let mut restricted = make_target("r", 100, 0);
        restricted.spec.restricted = true;
        let pool = vec![restricted, make_target("open", 1, 0)];

        let candidates = candidate_targets(&test_deployment("tenant01"), &[], &pool);
        let names: Vec<_> = candidates.iter().map(|t| t.metadata.name.as_str()).collect();
        assert_eq!(names, vec!["open"]);
    }

    #[test]
    fn matching_rule_reaches_restricted_target() {
        let mut restricted = make_target("r", 1, 0);
        restricted.spec.restricted = true;
        let pool = vec![restricted, make_target("open", 100, 0)];
        let rules = vec![rule(1, &["r"], vec![Selector::tenant("tenant01")])];

        let chosen = find_target(&test_deployment("tenant01"), &rules, &pool).unwrap();
        assert_eq!(chosen.metadata.name, "r");

        // Another tenant falls back to automatic placement.
        let chosen = find_target(&test_deployment("tenant02"), &rules, &pool).unwrap();
        assert_eq!(chosen.metadata.name, "open");
    }

    #[test]
    fn highest_priority_rule_wins_and_ties_merge() {
        let pool = vec![
            make_target("low", 100, 0),
            make_target("high-1", 10, 0),
            make_target("high-2", 20, 0),
        ];
        let rules = vec![
            rule(1, &["low"], vec![]),
            rule(5, &["high-1"], vec![Selector::tenant("tenant01")]),
            rule(5, &["high-2", "high-1"], vec![]),
            rule(9, &["low"], vec![Selector::tenant("someone-else")]),
        ];

        let candidates = candidate_targets(&test_deployment("tenant01"), &rules, &pool);
        let names: Vec<_> = candidates.iter().map(|t| t.metadata.name.as_str()).collect();
        assert_eq!(names, vec!["high-1", "high-2"]);

        let chosen = find_target(&test_deployment("tenant01"), &rules, &pool).unwrap();
        assert_eq!(chosen.metadata.key(), target_ref("high-2"));
    }

    #[test]
    fn only_fully_matching_rules_apply() {
        let pool = vec![
            make_target("config1", 1, 0),
            make_target("config2", 1, 0),
            make_target("config3", 1, 0),
        ];
        let mut dep = test_deployment("tenant01");
        dep.metadata.labels.insert("key1".into(), "value1".into());

        let rules = vec![
            rule(
                4,
                &["config1"],
                vec![Selector::tenant("tenant02"), Selector::label("key1", "value1")],
            ),
            rule(
                4,
                &["config2"],
                vec![Selector::tenant("tenant01"), Selector::label("key1", "value1")],
            ),
            rule(
                4,
                &["config3"],
                vec![Selector::tenant("tenant01"), Selector::label("key1", "value2")],
            ),
        ];

        let candidates = candidate_targets(&dep, &rules, &pool);
        let names: Vec<_> = candidates.iter().map(|t| t.metadata.name.as_str()).collect();
        assert_eq!(names, vec!["config2"]);
        assert_eq!(find_target(&dep, &rules, &pool).unwrap().metadata.name, "config2");
    }

    #[test]
    fn unknown_rule_targets_are_dropped() {
        let pool = vec![make_target("a", 10, 0)];
        let rules = vec![rule(1, &["ghost"], vec![])];

        assert!(candidate_targets(&test_deployment("tenant01"), &rules, &pool).is_empty());
        assert_eq!(
            find_target(&test_deployment("tenant01"), &rules, &pool),
            Err(PlacementError::NoCapacity)
        );
    }

    #[test]
    fn rule_targets_still_need_visibility() {
        let mut hidden = make_target("hidden", 10, 0);
        hidden.spec.visible = false;
        let pool = vec![hidden];
        let rules = vec![rule(1, &["hidden"], vec![])];

        assert_eq!(
            find_target(&test_deployment("tenant01"), &rules, &pool),
            Err(PlacementError::NoCapacity)
        );
    }
}
