//! Selector engine for manual scheduling rules.
//!
//! Validation works on the wire form ([`RawSelector`]), where any number of
//! the five variant fields can be set, and reports every malformed node by
//! its field path. Only a tree without errors is converted into the closed
//! [`Selector`] enum, which is what gets stored and evaluated.

use tenantgrid_state::{
    Deployment, ErrorList, FieldError, FieldPath, RawSchedulingRule, RawSelector,
    RawTargetScheduling, SchedulingRule, Selector, TargetScheduling, TargetSchedulingSpec,
};

// ── Validation ─────────────────────────────────────────────────────

/// Validate one selector node and, recursively, its children.
pub fn validate_selector(selector: &RawSelector, path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();

    let populated = [
        selector.match_tenant.is_some(),
        selector.match_label.is_some(),
        selector.and.is_some(),
        selector.or.is_some(),
        selector.not.is_some(),
    ]
    .into_iter()
    .filter(|set| *set)
    .count();
    if populated != 1 {
        errs.push(FieldError::invalid(
            path,
            format!("{populated} selectors set"),
            "exactly one of matchTenant, matchLabel, and, or, not must be set",
        ));
        return errs;
    }

    if let Some(tenant) = &selector.match_tenant {
        if tenant.id.is_empty() {
            errs.push(FieldError::required(
                &path.child("matchTenant").child("id"),
                "tenant id may not be empty",
            ));
        }
    }
    if let Some(label) = &selector.match_label {
        let label_path = path.child("matchLabel");
        if label.name.is_empty() {
            errs.push(FieldError::required(
                &label_path.child("name"),
                "label name may not be empty",
            ));
        }
        if label.value.is_empty() {
            errs.push(FieldError::required(
                &label_path.child("value"),
                "label value may not be empty",
            ));
        }
    }
    if let Some(children) = &selector.and {
        let and_path = path.child("and");
        for (i, child) in children.iter().enumerate() {
            errs.extend(validate_selector(child, &and_path.index(i)));
        }
    }
    if let Some(children) = &selector.or {
        let or_path = path.child("or");
        for (i, child) in children.iter().enumerate() {
            errs.extend(validate_selector(child, &or_path.index(i)));
        }
    }
    if let Some(child) = &selector.not {
        errs.extend(validate_selector(child, &path.child("not")));
    }

    errs
}

/// Validate a scheduling rule: non-negative priority, at least one target
/// reference with name and namespace, and well-formed selectors.
pub fn validate_scheduling_rule(rule: &RawSchedulingRule, path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();

    if rule.priority < 0 {
        errs.push(FieldError::invalid(
            &path.child("priority"),
            rule.priority,
            "priority must be an integer >= 0",
        ));
    }

    let targets_path = path.child("targets");
    if rule.targets.is_empty() {
        errs.push(FieldError::required(
            &targets_path,
            "at least one target reference is required",
        ));
    }
    for (i, target) in rule.targets.iter().enumerate() {
        let target_path = targets_path.index(i);
        if target.name.is_empty() {
            errs.push(FieldError::required(
                &target_path.child("name"),
                "name may not be empty",
            ));
        }
        if target.namespace.is_empty() {
            errs.push(FieldError::required(
                &target_path.child("namespace"),
                "namespace may not be empty",
            ));
        }
    }

    let selectors_path = path.child("selectors");
    for (i, selector) in rule.selectors.iter().enumerate() {
        errs.extend(validate_selector(selector, &selectors_path.index(i)));
    }

    errs
}

/// Validate a whole scheduling document and convert it to its stored form.
///
/// Any nested error rejects the whole document.
pub fn validate_target_scheduling(doc: &RawTargetScheduling) -> Result<TargetScheduling, ErrorList> {
    let mut errs = ErrorList::new();
    let meta_path = FieldPath::new("metadata");
    if doc.metadata.name.is_empty() {
        errs.push(FieldError::required(&meta_path.child("name"), "name may not be empty"));
    }

    let rules_path = FieldPath::new("spec").child("rules");
    for (i, rule) in doc.spec.rules.iter().enumerate() {
        errs.extend(validate_scheduling_rule(rule, &rules_path.index(i)));
    }
    errs.into_result()?;

    let mut rules = Vec::with_capacity(doc.spec.rules.len());
    for rule in &doc.spec.rules {
        let selectors = rule
            .selectors
            .iter()
            .map(to_selector)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                let mut errs = ErrorList::new();
                errs.push(FieldError::invalid(&rules_path, "selector", "malformed selector"));
                errs
            })?;
        rules.push(SchedulingRule {
            priority: rule.priority,
            targets: rule.targets.clone(),
            selectors,
        });
    }

    Ok(TargetScheduling {
        metadata: doc.metadata.clone(),
        spec: TargetSchedulingSpec { rules },
        status: (),
    })
}

/// Convert a validated wire selector into the closed enum.
///
/// Returns `None` when a node does not have exactly one variant set.
pub fn to_selector(raw: &RawSelector) -> Option<Selector> {
    match raw {
        RawSelector {
            match_tenant: Some(tenant),
            match_label: None,
            and: None,
            or: None,
            not: None,
        } => Some(Selector::tenant(tenant.id.clone())),
        RawSelector {
            match_tenant: None,
            match_label: Some(label),
            and: None,
            or: None,
            not: None,
        } => Some(Selector::label(label.name.clone(), label.value.clone())),
        RawSelector {
            match_tenant: None,
            match_label: None,
            and: Some(children),
            or: None,
            not: None,
        } => children.iter().map(to_selector).collect::<Option<_>>().map(Selector::And),
        RawSelector {
            match_tenant: None,
            match_label: None,
            and: None,
            or: Some(children),
            not: None,
        } => children.iter().map(to_selector).collect::<Option<_>>().map(Selector::Or),
        RawSelector {
            match_tenant: None,
            match_label: None,
            and: None,
            or: None,
            not: Some(child),
        } => to_selector(child).map(Selector::negate),
        _ => None,
    }
}

// ── Evaluation ─────────────────────────────────────────────────────

/// Evaluate a selector against a deployment.
pub fn evaluate(selector: &Selector, deployment: &Deployment) -> bool {
    match selector {
        Selector::MatchTenant { id } => deployment.spec.tenant_id == *id,
        Selector::MatchLabel { name, value } => {
            deployment.metadata.has_label_with_value(name, value)
        }
        Selector::And(children) => children.iter().all(|c| evaluate(c, deployment)),
        Selector::Or(children) => children.iter().any(|c| evaluate(c, deployment)),
        Selector::Not(child) => !evaluate(child, deployment),
    }
}

/// A rule applies when every one of its selectors matches. A rule without
/// selectors applies to every deployment.
pub fn rule_applies(rule: &SchedulingRule, deployment: &Deployment) -> bool {
    rule.selectors.iter().all(|s| evaluate(s, deployment))
}
