//! [`Admit`] implementations for each user-writable kind.

use tenantgrid_state::{
    Configuration, Deployment, ErrorList, FieldError, FieldPath, Instance, Namespace,
    Registration, SUPPORTED_DEPLOYERS, Target,
};

use crate::admit::Admit;
use crate::shared::*;

fn default_deployers(config: &mut Configuration) {
    if config.deployers.is_empty() {
        config.deployers = SUPPORTED_DEPLOYERS.iter().map(|d| d.to_string()).collect();
    }
}

// ── Namespace ──────────────────────────────────────────────────────

impl Admit for Namespace {
    fn validate(&self) -> ErrorList {
        validate_object_meta(&self.metadata, false, &FieldPath::new("metadata"))
    }
}

// ── Target ─────────────────────────────────────────────────────────

impl Admit for Target {
    fn apply_defaults(&mut self) {
        if self.spec.secret_ref.namespace.is_empty() {
            self.spec.secret_ref.namespace = self.metadata.namespace.clone();
        }
    }

    fn validate(&self) -> ErrorList {
        let mut errs = validate_object_meta(&self.metadata, true, &FieldPath::new("metadata"));
        let spec = FieldPath::new("spec");

        if self.spec.priority < 0 {
            errs.push(FieldError::invalid(
                &spec.child("priority"),
                self.spec.priority,
                "priority must be an integer >= 0",
            ));
        }
        if self.spec.region.as_deref().is_some_and(str::is_empty) {
            errs.push(FieldError::required(
                &spec.child("region"),
                "region may not be empty when set",
            ));
        }
        if self.spec.ingress_domain.is_empty() {
            errs.push(FieldError::required(
                &spec.child("ingressDomain"),
                "ingressDomain may not be empty",
            ));
        }
        errs.extend(validate_secret_reference(
            &self.spec.secret_ref,
            &spec.child("secretRef"),
        ));
        errs
    }
}

// ── Deployment ─────────────────────────────────────────────────────

impl Admit for Deployment {
    fn apply_defaults(&mut self) {
        default_deployers(&mut self.spec.configuration);
    }

    fn validate(&self) -> ErrorList {
        let mut errs = validate_object_meta(&self.metadata, true, &FieldPath::new("metadata"));
        let spec = FieldPath::new("spec");
        errs.extend(validate_fixed_length(&self.spec.tenant_id, &spec.child("tenantId")));
        errs.extend(validate_target_labels(
            &self.spec.target_labels,
            &spec.child("targetLabels"),
        ));
        errs.extend(validate_workload(
            &self.spec.purpose,
            &self.spec.configuration,
            self.spec.high_availability.as_ref(),
            self.spec.data_plane.as_ref(),
            &spec,
        ));
        errs
    }

    fn validate_update(&self, old: &Self) -> ErrorList {
        let spec = FieldPath::new("spec");
        let mut errs = ErrorList::new();
        if self.spec.tenant_id != old.spec.tenant_id {
            errs.push(FieldError::forbidden(&spec.child("tenantId"), "is immutable"));
        }
        errs.extend(validate_workload_update(
            self.spec.high_availability.as_ref(),
            old.spec.high_availability.as_ref(),
            self.spec.data_plane.as_ref(),
            old.spec.data_plane.as_ref(),
            &spec,
        ));
        errs
    }
}

// ── Instance ───────────────────────────────────────────────────────

impl Admit for Instance {
    fn apply_defaults(&mut self) {
        default_deployers(&mut self.spec.configuration);
    }

    fn validate(&self) -> ErrorList {
        let mut errs = validate_object_meta(&self.metadata, true, &FieldPath::new("metadata"));
        let spec = FieldPath::new("spec");
        errs.extend(validate_object_reference(
            &self.spec.target_ref,
            &spec.child("targetRef"),
        ));
        errs.extend(validate_fixed_length(&self.spec.tenant_id, &spec.child("tenantId")));
        errs.extend(validate_fixed_length(&self.spec.id, &spec.child("id")));

        if self.spec.data_plane.is_some() && self.spec.high_availability.is_some() {
            errs.push(FieldError::forbidden(
                &spec.child("dataPlane"),
                "dataPlane can't be used in combination with highAvailability",
            ));
        }
        if let Some(ha) = &self.spec.high_availability {
            errs.extend(validate_high_availability(ha, &spec.child("highAvailability")));
        }
        if let Some(dp) = &self.spec.data_plane {
            errs.extend(validate_data_plane(dp, &spec.child("dataPlane")));
        }
        errs.extend(validate_configuration(
            &self.spec.configuration,
            &spec.child("configuration"),
        ));
        errs
    }

    fn validate_update(&self, old: &Self) -> ErrorList {
        let spec = FieldPath::new("spec");
        let mut errs = ErrorList::new();
        if self.spec.tenant_id != old.spec.tenant_id {
            errs.push(FieldError::forbidden(&spec.child("tenantId"), "is immutable"));
        }
        if self.spec.id != old.spec.id {
            errs.push(FieldError::forbidden(&spec.child("id"), "is immutable"));
        }
        if self.spec.target_ref != old.spec.target_ref {
            errs.push(FieldError::forbidden(&spec.child("targetRef"), "is immutable"));
        }
        errs.extend(validate_workload_update(
            self.spec.high_availability.as_ref(),
            old.spec.high_availability.as_ref(),
            self.spec.data_plane.as_ref(),
            old.spec.data_plane.as_ref(),
            &spec,
        ));
        errs
    }
}

// ── Registration ───────────────────────────────────────────────────

impl Admit for Registration {
    fn apply_defaults(&mut self) {
        default_deployers(&mut self.spec.configuration);
    }

    /// The namespace doubles as the tenant id, so it carries the tenant id
    /// length rule.
    fn validate(&self) -> ErrorList {
        let meta = FieldPath::new("metadata");
        let mut errs = validate_object_meta(&self.metadata, true, &meta);
        if !self.metadata.namespace.is_empty() {
            errs.extend(validate_fixed_length(
                &self.metadata.namespace,
                &meta.child("namespace"),
            ));
        }
        let spec = FieldPath::new("spec");
        errs.extend(validate_target_labels(
            &self.spec.target_labels,
            &spec.child("targetLabels"),
        ));
        errs.extend(validate_workload(
            &self.spec.purpose,
            &self.spec.configuration,
            self.spec.high_availability.as_ref(),
            self.spec.data_plane.as_ref(),
            &spec,
        ));
        errs
    }

    fn validate_update(&self, old: &Self) -> ErrorList {
        validate_workload_update(
            self.spec.high_availability.as_ref(),
            old.spec.high_availability.as_ref(),
            self.spec.data_plane.as_ref(),
            old.spec.data_plane.as_ref(),
            &FieldPath::new("spec"),
        )
    }
}
