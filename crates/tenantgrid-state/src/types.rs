//! Resource kinds persisted in the object store.
//!
//! Every kind is a `{ metadata, spec, status }` triple serialized as
//! camelCase JSON. The [`Object`] impls at the bottom bind each kind to its
//! redb table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::meta::{Object, ObjectMeta, ObjectRef};
use crate::tables::*;

/// Deployer plugins a deployment may request.
pub const SUPPORTED_DEPLOYERS: [&str; 3] = ["manifest", "helm", "container"];

/// Allowed control plane failure tolerance values.
pub const FAILURE_TOLERANCES: [&str; 2] = ["zone", "node"];

/// Length of tenant identifiers and instance ids.
pub const ID_LENGTH: usize = 8;

/// Reference to a key inside a secret. Treated as an opaque pointer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SecretReference {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub key: String,
}

/// Last reconcile failure recorded on an object's status.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub operation: String,
    pub reason: String,
    pub message: String,
    pub last_transition_time: u64,
    pub last_update_time: u64,
}

impl ErrorRecord {
    /// Build the next error record from the previous one.
    ///
    /// The transition time only moves when the failing operation changes.
    pub fn next(
        previous: Option<&ErrorRecord>,
        operation: &str,
        reason: &str,
        message: &str,
        now: u64,
    ) -> ErrorRecord {
        let last_transition_time = match previous {
            Some(prev) if prev.operation == operation => prev.last_transition_time,
            _ => now,
        };
        ErrorRecord {
            operation: operation.to_string(),
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time,
            last_update_time: now,
        }
    }
}

// ── Shared spec blocks ─────────────────────────────────────────────

/// Deployer plugin selection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub deployers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighAvailability {
    pub control_plane_failure_tolerance: String,
}

/// An externally provided data plane, given inline or through a secret.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPlane {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretReference>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kubeconfig: String,
}

/// Whether a deployment runs its own data plane or uses an external one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataPlaneType {
    #[default]
    Internal,
    External,
}

impl DataPlaneType {
    pub fn of(data_plane: Option<&DataPlane>) -> Self {
        if data_plane.is_some() {
            DataPlaneType::External
        } else {
            DataPlaneType::Internal
        }
    }
}

// ── Namespace ──────────────────────────────────────────────────────

/// Cluster scoped tenant namespace.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Namespace {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: (),
    #[serde(default)]
    pub status: (),
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::new("", name),
            ..Default::default()
        }
    }
}

// ── Target ─────────────────────────────────────────────────────────

/// A backing cluster that can host instances.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Target {
    pub metadata: ObjectMeta,
    pub spec: TargetSpec,
    #[serde(default)]
    pub status: TargetStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSpec {
    /// Higher is preferred. Never negative on admitted targets.
    pub priority: i64,
    /// Only visible targets take new work.
    #[serde(default)]
    pub visible: bool,
    /// Restricted targets are only reachable through a scheduling rule.
    #[serde(default)]
    pub restricted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub secret_ref: SecretReference,
    #[serde(default)]
    pub ingress_domain: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetStatus {
    /// Instances currently hosted. Only the capacity bookkeeping writes this.
    #[serde(default)]
    pub assigned_instances: Vec<ObjectRef>,
    /// Free slots out of the nominal capacity. Informational; placement
    /// scores on `assignedInstances`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<i64>,
}

impl Target {
    pub fn assigned_count(&self) -> usize {
        self.status.assigned_instances.len()
    }

    pub fn is_assigned(&self, instance: &ObjectRef) -> bool {
        self.status.assigned_instances.contains(instance)
    }
}

// ── Deployment ─────────────────────────────────────────────────────

/// Internal request for one tenant instance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Deployment {
    pub metadata: ObjectMeta,
    pub spec: DeploymentSpec,
    #[serde(default)]
    pub status: DeploymentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    pub tenant_id: String,
    pub purpose: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Labels a target must carry, with equal values, to be chosen
    /// automatically.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub target_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub configuration: Configuration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_availability: Option<HighAvailability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_plane: Option<DataPlane>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_ref: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorRecord>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phase: String,
    #[serde(default)]
    pub data_plane_type: DataPlaneType,
}

// ── Instance ───────────────────────────────────────────────────────

/// Runtime unit scheduled onto a target. One per deployment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Instance {
    pub metadata: ObjectMeta,
    pub spec: InstanceSpec,
    #[serde(default)]
    pub status: InstanceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    pub tenant_id: String,
    pub id: String,
    pub target_ref: ObjectRef,
    #[serde(default)]
    pub configuration: Configuration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_availability: Option<HighAvailability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_plane: Option<DataPlane>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorRecord>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub admin_kubeconfig: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_kubeconfig: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phase: String,
}

// ── Registration ───────────────────────────────────────────────────

/// Tenant-facing request. Its namespace is the tenant id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Registration {
    pub metadata: ObjectMeta,
    pub spec: RegistrationSpec,
    #[serde(default)]
    pub status: RegistrationStatus,
}

/// Deployment spec fields a tenant may set. The tenant id is implied.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationSpec {
    pub purpose: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub target_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub configuration: Configuration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_availability: Option<HighAvailability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_plane: Option<DataPlane>,
}

impl RegistrationSpec {
    pub fn to_deployment_spec(&self, tenant_id: &str) -> DeploymentSpec {
        DeploymentSpec {
            tenant_id: tenant_id.to_string(),
            purpose: self.purpose.clone(),
            region: self.region.clone(),
            target_labels: self.target_labels.clone(),
            configuration: self.configuration.clone(),
            high_availability: self.high_availability.clone(),
            data_plane: self.data_plane.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationStatus {
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_ref: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorRecord>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_kubeconfig: String,
}

// ── Target scheduling ──────────────────────────────────────────────

/// Manual scheduling rules that pre-empt automatic placement.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TargetScheduling {
    pub metadata: ObjectMeta,
    pub spec: TargetSchedulingSpec,
    #[serde(default)]
    pub status: (),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TargetSchedulingSpec {
    #[serde(default)]
    pub rules: Vec<SchedulingRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingRule {
    pub priority: i64,
    pub targets: Vec<ObjectRef>,
    #[serde(default)]
    pub selectors: Vec<Selector>,
}

/// Boolean predicate over deployment attributes.
///
/// Exactly one variant per node, so a well-formed tree is the only kind
/// that can be constructed. Serializes to the same shape as
/// [`RawSelector`] for valid trees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Selector {
    MatchTenant { id: String },
    MatchLabel { name: String, value: String },
    And(Vec<Selector>),
    Or(Vec<Selector>),
    Not(Box<Selector>),
}

impl Selector {
    pub fn tenant(id: impl Into<String>) -> Self {
        Selector::MatchTenant { id: id.into() }
    }

    pub fn label(name: impl Into<String>, value: impl Into<String>) -> Self {
        Selector::MatchLabel {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn negate(inner: Selector) -> Self {
        Selector::Not(Box::new(inner))
    }
}

/// User-authored scheduling document, before admission.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawTargetScheduling {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: RawTargetSchedulingSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawTargetSchedulingSpec {
    #[serde(default)]
    pub rules: Vec<RawSchedulingRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawSchedulingRule {
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub targets: Vec<ObjectRef>,
    #[serde(default)]
    pub selectors: Vec<RawSelector>,
}

/// Wire form of a selector node: five optional fields of which exactly
/// one must be set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_tenant: Option<RawTenantMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_label: Option<RawLabelMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub and: Option<Vec<RawSelector>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub or: Option<Vec<RawSelector>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not: Option<Box<RawSelector>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawTenantMatch {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawLabelMatch {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
}

// ── Object bindings ────────────────────────────────────────────────

macro_rules! impl_object {
    ($ty:ty, $kind:literal, $table:expr, $spec:ty, $status:ty) => {
        impl Object for $ty {
            const KIND: &'static str = $kind;
            const TABLE: redb::TableDefinition<'static, &'static str, &'static [u8]> = $table;

            type Spec = $spec;
            type Status = $status;

            fn meta(&self) -> &ObjectMeta {
                &self.metadata
            }

            fn meta_mut(&mut self) -> &mut ObjectMeta {
                &mut self.metadata
            }

            fn spec(&self) -> &Self::Spec {
                &self.spec
            }

            fn status(&self) -> &Self::Status {
                &self.status
            }

            fn status_mut(&mut self) -> &mut Self::Status {
                &mut self.status
            }
        }
    };
}

impl_object!(Namespace, "Namespace", NAMESPACES, (), ());
impl_object!(Target, "Target", TARGETS, TargetSpec, TargetStatus);
impl_object!(Deployment, "Deployment", DEPLOYMENTS, DeploymentSpec, DeploymentStatus);
impl_object!(Instance, "Instance", INSTANCES, InstanceSpec, InstanceStatus);
impl_object!(Registration, "Registration", REGISTRATIONS, RegistrationSpec, RegistrationStatus);
impl_object!(TargetScheduling, "TargetScheduling", SCHEDULINGS, TargetSchedulingSpec, ());
