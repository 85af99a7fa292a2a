//! Field validators shared by several kinds.

use std::collections::BTreeMap;

use tenantgrid_state::{
    Configuration, DataPlane, ErrorList, FAILURE_TOLERANCES, FieldError, FieldPath,
    HighAvailability, ID_LENGTH, ObjectMeta, ObjectRef, SUPPORTED_DEPLOYERS, SecretReference,
};

const MAX_NAME_LENGTH: usize = 63;

/// Names must be DNS labels: lowercase alphanumerics and `-`, starting and
/// ending alphanumeric, at most 63 characters. An empty name is allowed when
/// `generateName` is set.
pub fn validate_object_meta(meta: &ObjectMeta, namespaced: bool, path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();

    let name_path = path.child("name");
    if meta.name.is_empty() {
        if meta.generate_name.is_empty() {
            errs.push(FieldError::required(&name_path, "name or generateName is required"));
        }
    } else if !is_dns_label(&meta.name) {
        errs.push(FieldError::invalid(
            &name_path,
            &meta.name,
            "must consist of lower case alphanumeric characters or '-', start and end with an alphanumeric character, and be at most 63 characters",
        ));
    }

    let ns_path = path.child("namespace");
    if namespaced && meta.namespace.is_empty() {
        errs.push(FieldError::required(&ns_path, "namespace may not be empty"));
    } else if !namespaced && !meta.namespace.is_empty() {
        errs.push(FieldError::forbidden(&ns_path, "not allowed on this type"));
    }

    errs
}

pub fn is_dns_label(value: &str) -> bool {
    let bytes = value.as_bytes();
    let alnum = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    !bytes.is_empty()
        && bytes.len() <= MAX_NAME_LENGTH
        && bytes.first().is_some_and(alnum)
        && bytes.last().is_some_and(alnum)
        && bytes.iter().all(|b| alnum(b) || *b == b'-')
}

/// Target label hints need a key; values may be empty.
pub fn validate_target_labels(labels: &BTreeMap<String, String>, path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();
    if labels.keys().any(|k| k.is_empty()) {
        errs.push(FieldError::invalid(path, "\"\"", "label keys may not be empty"));
    }
    errs
}

pub fn validate_fixed_length(value: &str, path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();
    if value.chars().count() != ID_LENGTH {
        errs.push(FieldError::invalid(
            path,
            value,
            format!("must be exactly of size {ID_LENGTH}"),
        ));
    }
    errs
}

pub fn validate_object_reference(reference: &ObjectRef, path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();
    if reference.name.is_empty() {
        errs.push(FieldError::required(&path.child("name"), "name may not be empty"));
    }
    if reference.namespace.is_empty() {
        errs.push(FieldError::required(
            &path.child("namespace"),
            "namespace may not be empty",
        ));
    }
    errs
}

pub fn validate_secret_reference(reference: &SecretReference, path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();
    if reference.key.is_empty() {
        errs.push(FieldError::required(&path.child("key"), "key may not be empty"));
    }
    errs.extend(validate_object_reference(
        &ObjectRef::new(reference.namespace.clone(), reference.name.clone()),
        path,
    ));
    errs
}

pub fn validate_configuration(config: &Configuration, path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();
    let deployers_path = path.child("deployers");
    for (i, deployer) in config.deployers.iter().enumerate() {
        if !SUPPORTED_DEPLOYERS.contains(&deployer.as_str()) {
            errs.push(FieldError::not_supported(
                &deployers_path.index(i),
                deployer,
                &SUPPORTED_DEPLOYERS,
            ));
        }
    }
    errs
}

pub fn validate_high_availability(ha: &HighAvailability, path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();
    let tolerance = ha.control_plane_failure_tolerance.as_str();
    if !FAILURE_TOLERANCES.contains(&tolerance) {
        errs.push(FieldError::invalid(
            &path.child("controlPlaneFailureTolerance"),
            tolerance,
            "allowed values: \"zone\", \"node\"",
        ));
    }
    errs
}

/// An external data plane needs either an inline kubeconfig or a secret
/// reference pointing at one.
pub fn validate_data_plane(data_plane: &DataPlane, path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();
    match (&data_plane.secret_ref, data_plane.kubeconfig.is_empty()) {
        (_, false) => {}
        (Some(secret_ref), true) => {
            errs.extend(validate_secret_reference(secret_ref, &path.child("secretRef")));
        }
        (None, true) => errs.push(FieldError::required(
            path,
            "either kubeconfig or secretRef must be set",
        )),
    }
    errs
}

/// Checks common to every spec that describes a tenant workload.
pub fn validate_workload(
    purpose: &str,
    configuration: &Configuration,
    high_availability: Option<&HighAvailability>,
    data_plane: Option<&DataPlane>,
    path: &FieldPath,
) -> ErrorList {
    let mut errs = ErrorList::new();

    if purpose.is_empty() {
        errs.push(FieldError::required(&path.child("purpose"), "purpose may not be empty"));
    }

    if data_plane.is_some() && high_availability.is_some() {
        errs.push(FieldError::forbidden(
            &path.child("dataPlane"),
            "dataPlane can't be used in combination with highAvailability",
        ));
    }
    if let Some(ha) = high_availability {
        errs.extend(validate_high_availability(ha, &path.child("highAvailability")));
    }
    if let Some(dp) = data_plane {
        errs.extend(validate_data_plane(dp, &path.child("dataPlane")));
    }

    errs.extend(validate_configuration(configuration, &path.child("configuration")));
    errs
}

/// Update checks common to every workload spec.
pub fn validate_workload_update(
    high_availability: Option<&HighAvailability>,
    old_high_availability: Option<&HighAvailability>,
    data_plane: Option<&DataPlane>,
    old_data_plane: Option<&DataPlane>,
    path: &FieldPath,
) -> ErrorList {
    let mut errs = ErrorList::new();

    if let (Some(new), Some(old)) = (high_availability, old_high_availability) {
        if new.control_plane_failure_tolerance != old.control_plane_failure_tolerance {
            errs.push(FieldError::forbidden(
                &path
                    .child("highAvailability")
                    .child("controlPlaneFailureTolerance"),
                "is immutable",
            ));
        }
    }

    if data_plane.is_some() != old_data_plane.is_some() {
        errs.push(FieldError::forbidden(
            &path.child("dataPlane"),
            "can't switch from external data plane to internal or vice versa",
        ));
    }

    errs
}
