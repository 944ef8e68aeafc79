//! Document envelope & codec.
//!
//! Every item in the `Resources` container shares a common envelope
//! (`id`, `partitionKey`, `resourceType`, `_etag`, `_ts`, `ttl`) wrapping a
//! payload that, historically, has been written two ways: inlined at the
//! top level alongside the envelope, or nested under a `properties` key.
//! The codec reads either layout and always writes the nested one.
use crate::defaults::{ClusterDefaultableFields, NodePoolDefaultableFields, ProvisioningState};
use crate::error::{StoreError, StoreResult};
use crate::id::ResourceId;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

/// ARM resource type tags this crate understands.
pub const RESOURCE_TYPE_CLUSTER: &str = "microsoft.redhatopenshift/hcpopenshiftclusters";
pub const RESOURCE_TYPE_NODE_POOL: &str = "microsoft.redhatopenshift/hcpopenshiftclusters/nodepools";
pub const RESOURCE_TYPE_EXTERNAL_AUTH: &str =
    "microsoft.redhatopenshift/hcpopenshiftclusters/externalauths";
pub const RESOURCE_TYPE_OPERATION_STATUS: &str = "microsoft.redhatopenshift/hcpoperationstatuses";
pub const RESOURCE_TYPE_SUBSCRIPTION: &str = "microsoft.resources/subscriptions";

fn type_matches(declared: &str, expected: &[&str]) -> bool {
    expected.iter().any(|e| e.eq_ignore_ascii_case(declared))
}

fn type_mismatch(declared: &str, expected: &[&str]) -> StoreError {
    StoreError::InvalidType {
        expected: expected.join(" | "),
        found: declared.to_string(),
    }
}

/// Fields common to every envelope, independent of the payload layout.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeMeta {
    pub id: String,
    pub partition_key: String,
    pub resource_type: String,
    pub etag: Option<String>,
    pub ts: Option<i64>,
    pub ttl: Option<i64>,
}

/// Splits a raw stored JSON object into its envelope metadata and payload
/// object, tolerating both the inline and the properties-nested legacy
/// layouts.
fn split_envelope(raw: &Value) -> StoreResult<(EnvelopeMeta, Map<String, Value>)> {
    let obj = raw
        .as_object()
        .ok_or_else(|| StoreError::transport("document root is not a JSON object", None))?;

    let meta = EnvelopeMeta {
        id: str_field(obj, "id").unwrap_or_default(),
        partition_key: str_field(obj, "partitionKey").unwrap_or_default(),
        resource_type: str_field(obj, "resourceType").unwrap_or_default(),
        etag: str_field(obj, "_etag"),
        ts: obj.get("_ts").and_then(Value::as_i64),
        ttl: obj.get("ttl").and_then(Value::as_i64),
    };

    let payload = match obj.get("properties").and_then(Value::as_object) {
        Some(nested) => nested.clone(),
        None => {
            let mut inline = obj.clone();
            for envelope_key in ["id", "partitionKey", "resourceType", "_etag", "_ts", "ttl"] {
                inline.remove(envelope_key);
            }
            inline
        }
    };

    Ok((meta, payload))
}

fn str_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Assembles the canonical on-write layout: envelope fields at the top
/// level, payload nested under `properties`.
fn join_envelope(meta: &EnvelopeMeta, payload: Map<String, Value>) -> Value {
    let mut obj = Map::new();
    obj.insert("id".to_string(), Value::String(meta.id.clone()));
    obj.insert(
        "partitionKey".to_string(),
        Value::String(meta.partition_key.clone()),
    );
    obj.insert(
        "resourceType".to_string(),
        Value::String(meta.resource_type.clone()),
    );
    if let Some(etag) = &meta.etag {
        obj.insert("_etag".to_string(), Value::String(etag.clone()));
    }
    if let Some(ts) = meta.ts {
        obj.insert("_ts".to_string(), Value::from(ts));
    }
    if let Some(ttl) = meta.ttl {
        obj.insert("ttl".to_string(), Value::from(ttl));
    }
    obj.insert("properties".to_string(), Value::Object(payload));
    Value::Object(obj)
}

/// A field allow-list applied to an opaque JSON blob before it is
/// persisted. `None` allows every
/// field through unchanged; `Some(set)` keeps only the named top-level
/// keys, dropping everything else — including fields a newer writer added
/// that this binary doesn't know about, so an older reader is never
/// poisoned by them.
#[derive(Debug, Clone)]
pub struct FieldFilter {
    allowed: Option<HashSet<&'static str>>,
}

impl FieldFilter {
    pub fn allow(fields: &[&'static str]) -> Self {
        FieldFilter {
            allowed: Some(fields.iter().copied().collect()),
        }
    }

    /// The "remove everything" diagnostic filter.
    pub fn strip_all() -> Self {
        FieldFilter {
            allowed: Some(HashSet::new()),
        }
    }

    pub fn apply(&self, value: &Value) -> Value {
        match (&self.allowed, value) {
            (Some(allowed), Value::Object(obj)) => {
                let filtered: Map<String, Value> = obj
                    .iter()
                    .filter(|(k, _)| allowed.contains(k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Value::Object(filtered)
            }
            (None, v) => v.clone(),
            (Some(_), v) => v.clone(),
        }
    }
}

const CLUSTER_INTERNAL_STATE_FIELDS: &[&str] = &[
    "networkType",
    "api",
    "outboundType",
    "imageRegistry",
    "etcd",
    "version",
    "dns",
    "console",
    "platform",
];

const NODE_POOL_INTERNAL_STATE_FIELDS: &[&str] =
    &["version", "platform", "autoRepair", "autoScaling", "replicas", "labels", "taints"];

const EXTERNAL_AUTH_INTERNAL_STATE_FIELDS: &[&str] =
    &["issuer", "clients", "claim", "condition"];

/// Strips unknown fields from a cluster's opaque internal-state blob by
/// round-tripping through the known field set.
pub fn filter_cluster_internal_state(raw: &Value) -> Value {
    FieldFilter::allow(CLUSTER_INTERNAL_STATE_FIELDS).apply(raw)
}

pub fn filter_node_pool_internal_state(raw: &Value) -> Value {
    FieldFilter::allow(NODE_POOL_INTERNAL_STATE_FIELDS).apply(raw)
}

pub fn filter_external_auth_internal_state(raw: &Value) -> Value {
    FieldFilter::allow(EXTERNAL_AUTH_INTERNAL_STATE_FIELDS).apply(raw)
}

/// Managed identity block. User-assigned identity *values* are never
/// persisted — only the map's keys — and are re-hydrated at read time by
/// an external collaborator this crate does not implement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub identity_type: String,
    pub user_assigned_identity_keys: Vec<String>,
}

impl Identity {
    fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".to_string(), Value::String(self.identity_type.clone()));
        let mut uai = Map::new();
        for key in &self.user_assigned_identity_keys {
            uai.insert(key.clone(), Value::Null);
        }
        obj.insert("userAssignedIdentities".to_string(), Value::Object(uai));
        Value::Object(obj)
    }

    fn from_json(value: &Value) -> Self {
        let obj = match value.as_object() {
            Some(o) => o,
            None => return Identity::default(),
        };
        let identity_type = str_field(obj, "type").unwrap_or_default();
        let user_assigned_identity_keys = obj
            .get("userAssignedIdentities")
            .and_then(Value::as_object)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        Identity {
            identity_type,
            user_assigned_identity_keys,
        }
    }
}

/// A tracked resource document: cluster, node pool, or external-auth
/// object. `internal_state` carries the type-specific,
/// otherwise-opaque payload.
#[derive(Debug, Clone)]
pub struct ResourceDocument {
    pub resource_id: ResourceId,
    pub internal_id: String,
    pub active_operation_id: String,
    pub provisioning_state: ProvisioningState,
    pub identity: Identity,
    pub system_data: Value,
    pub tags: BTreeMap<String, String>,
    pub internal_state: Value,
    pub location: String,
    pub etag: Option<String>,
    pub ts: Option<i64>,
}

impl ResourceDocument {
    /// Decodes a raw stored document, applying read-side defaults and
    /// checking the envelope's `resourceType` against `expected_types`
    /// case-insensitively.
    pub fn decode(raw: &Value, expected_types: &[&str]) -> StoreResult<Self> {
        let (meta, payload) = split_envelope(raw)?;
        if !type_matches(&meta.resource_type, expected_types) {
            return Err(type_mismatch(&meta.resource_type, expected_types));
        }

        let resource_id_str = str_field(&payload, "resourceId").ok_or_else(|| {
            StoreError::InvalidType {
                expected: "resourceId field present".to_string(),
                found: "missing".to_string(),
            }
        })?;
        let resource_id = ResourceId::parse(&resource_id_str)?;

        let provisioning_state = payload
            .get("provisioningState")
            .and_then(Value::as_str)
            .and_then(parse_provisioning_state)
            .unwrap_or(ProvisioningState::Accepted);

        let tags = payload
            .get("tags")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        let mut internal_state = payload
            .get("internalState")
            .cloned()
            .unwrap_or(Value::Object(Map::new()));
        apply_read_side_defaults(&meta.resource_type, &mut internal_state);

        Ok(ResourceDocument {
            resource_id,
            internal_id: str_field(&payload, "internalId").unwrap_or_default(),
            active_operation_id: str_field(&payload, "activeOperationId").unwrap_or_default(),
            provisioning_state,
            identity: payload
                .get("identity")
                .map(Identity::from_json)
                .unwrap_or_default(),
            system_data: payload.get("systemData").cloned().unwrap_or(Value::Null),
            tags,
            internal_state,
            location: str_field(&payload, "location").unwrap_or_default(),
            etag: meta.etag,
            ts: meta.ts,
        })
    }

    /// Encodes into the canonical on-write layout. `resource_type` must be
    /// one of the constants above; it is stored lowercase.
    pub fn encode(&self, resource_type: &str) -> Value {
        let internal_state = match resource_type {
            RESOURCE_TYPE_NODE_POOL => filter_node_pool_internal_state(&self.internal_state),
            RESOURCE_TYPE_EXTERNAL_AUTH => {
                filter_external_auth_internal_state(&self.internal_state)
            }
            _ => filter_cluster_internal_state(&self.internal_state),
        };

        let mut tags = Map::new();
        for (k, v) in &self.tags {
            tags.insert(k.clone(), Value::String(v.clone()));
        }

        let mut payload = Map::new();
        payload.insert(
            "resourceId".to_string(),
            Value::String(self.resource_id.to_string()),
        );
        payload.insert(
            "internalId".to_string(),
            Value::String(self.internal_id.clone()),
        );
        payload.insert(
            "activeOperationId".to_string(),
            Value::String(self.active_operation_id.clone()),
        );
        payload.insert(
            "provisioningState".to_string(),
            Value::String(provisioning_state_str(self.provisioning_state).to_string()),
        );
        payload.insert("identity".to_string(), self.identity.to_json());
        payload.insert("systemData".to_string(), self.system_data.clone());
        payload.insert("tags".to_string(), Value::Object(tags));
        payload.insert("internalState".to_string(), internal_state);
        payload.insert("location".to_string(), Value::String(self.location.clone()));

        let meta = EnvelopeMeta {
            id: self.resource_id.cosmos_id(),
            partition_key: self.resource_id.partition_key(),
            resource_type: resource_type.to_string(),
            etag: self.etag.clone(),
            ts: self.ts,
            ttl: None,
        };
        join_envelope(&meta, payload)
    }
}

fn apply_read_side_defaults(resource_type: &str, internal_state: &mut Value) {
    let obj = match internal_state.as_object_mut() {
        Some(o) => o,
        None => return,
    };
    if resource_type.eq_ignore_ascii_case(RESOURCE_TYPE_NODE_POOL) {
        let mut fields = NodePoolDefaultableFields {
            os_disk_storage_account_type: obj
                .get("osDiskStorageAccountType")
                .and_then(Value::as_str)
                .and_then(parse_os_disk_type),
        };
        fields.apply_defaults();
        if let Some(t) = fields.os_disk_storage_account_type {
            obj.insert(
                "osDiskStorageAccountType".to_string(),
                Value::String(os_disk_type_str(t).to_string()),
            );
        }
    } else if resource_type.eq_ignore_ascii_case(RESOURCE_TYPE_CLUSTER) {
        let mut fields = ClusterDefaultableFields {
            network_type: obj
                .get("networkType")
                .and_then(Value::as_str)
                .and_then(parse_network_type),
            api_visibility: obj
                .get("api")
                .and_then(Value::as_object)
                .and_then(|a| a.get("visibility"))
                .and_then(Value::as_str)
                .and_then(parse_visibility),
            outbound_type: obj
                .get("outboundType")
                .and_then(Value::as_str)
                .and_then(parse_outbound_type),
            image_registry_state: obj
                .get("imageRegistry")
                .and_then(Value::as_object)
                .and_then(|a| a.get("state"))
                .and_then(Value::as_str)
                .and_then(parse_image_registry_state),
            etcd_key_management_mode: obj
                .get("etcd")
                .and_then(Value::as_object)
                .and_then(|e| e.get("dataEncryption"))
                .and_then(Value::as_object)
                .and_then(|d| d.get("keyManagementMode"))
                .and_then(Value::as_str)
                .and_then(parse_key_management_mode),
        };
        fields.apply_defaults();

        if let Some(nt) = fields.network_type {
            obj.insert(
                "networkType".to_string(),
                Value::String(network_type_str(nt).to_string()),
            );
        }
        if let Some(vis) = fields.api_visibility {
            let api = obj.entry("api").or_insert_with(|| Value::Object(Map::new()));
            if let Some(api_obj) = api.as_object_mut() {
                api_obj.insert(
                    "visibility".to_string(),
                    Value::String(visibility_str(vis).to_string()),
                );
            }
        }
        if let Some(ot) = fields.outbound_type {
            obj.insert(
                "outboundType".to_string(),
                Value::String(outbound_type_str(ot).to_string()),
            );
        }
        if let Some(irs) = fields.image_registry_state {
            let registry = obj
                .entry("imageRegistry")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(r) = registry.as_object_mut() {
                r.insert(
                    "state".to_string(),
                    Value::String(image_registry_state_str(irs).to_string()),
                );
            }
        }
        if let Some(kmm) = fields.etcd_key_management_mode {
            let etcd = obj.entry("etcd").or_insert_with(|| Value::Object(Map::new()));
            if let Some(e) = etcd.as_object_mut() {
                let enc = e
                    .entry("dataEncryption")
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Some(enc_obj) = enc.as_object_mut() {
                    enc_obj.insert(
                        "keyManagementMode".to_string(),
                        Value::String(key_management_mode_str(kmm).to_string()),
                    );
                }
            }
        }
    }
}

fn parse_network_type(s: &str) -> Option<crate::defaults::NetworkType> {
    use crate::defaults::NetworkType::*;
    match s {
        "OVNKubernetes" => Some(OVNKubernetes),
        "Other" => Some(Other),
        _ => None,
    }
}

fn network_type_str(t: crate::defaults::NetworkType) -> &'static str {
    use crate::defaults::NetworkType::*;
    match t {
        OVNKubernetes => "OVNKubernetes",
        Other => "Other",
    }
}

fn parse_visibility(s: &str) -> Option<crate::defaults::Visibility> {
    use crate::defaults::Visibility::*;
    match s {
        "Public" => Some(Public),
        "Private" => Some(Private),
        _ => None,
    }
}

fn visibility_str(v: crate::defaults::Visibility) -> &'static str {
    use crate::defaults::Visibility::*;
    match v {
        Public => "Public",
        Private => "Private",
    }
}

fn parse_outbound_type(s: &str) -> Option<crate::defaults::OutboundType> {
    use crate::defaults::OutboundType::*;
    match s {
        "LoadBalancer" => Some(LoadBalancer),
        "UserDefinedRouting" => Some(UserDefinedRouting),
        _ => None,
    }
}

fn outbound_type_str(t: crate::defaults::OutboundType) -> &'static str {
    use crate::defaults::OutboundType::*;
    match t {
        LoadBalancer => "LoadBalancer",
        UserDefinedRouting => "UserDefinedRouting",
    }
}

fn parse_image_registry_state(s: &str) -> Option<crate::defaults::ImageRegistryState> {
    use crate::defaults::ImageRegistryState::*;
    match s {
        "Enabled" => Some(Enabled),
        "Disabled" => Some(Disabled),
        _ => None,
    }
}

fn image_registry_state_str(s: crate::defaults::ImageRegistryState) -> &'static str {
    use crate::defaults::ImageRegistryState::*;
    match s {
        Enabled => "Enabled",
        Disabled => "Disabled",
    }
}

fn parse_key_management_mode(s: &str) -> Option<crate::defaults::KeyManagementMode> {
    use crate::defaults::KeyManagementMode::*;
    match s {
        "PlatformManaged" => Some(PlatformManaged),
        "CustomerManaged" => Some(CustomerManaged),
        _ => None,
    }
}

fn key_management_mode_str(m: crate::defaults::KeyManagementMode) -> &'static str {
    use crate::defaults::KeyManagementMode::*;
    match m {
        PlatformManaged => "PlatformManaged",
        CustomerManaged => "CustomerManaged",
    }
}

fn parse_os_disk_type(s: &str) -> Option<crate::defaults::OsDiskStorageAccountType> {
    use crate::defaults::OsDiskStorageAccountType::*;
    match s {
        "Premium_LRS" => Some(PremiumLRS),
        "Standard_LRS" => Some(StandardLRS),
        "StandardSSD_LRS" => Some(StandardSSDLRS),
        _ => None,
    }
}

fn os_disk_type_str(t: crate::defaults::OsDiskStorageAccountType) -> &'static str {
    use crate::defaults::OsDiskStorageAccountType::*;
    match t {
        PremiumLRS => "Premium_LRS",
        StandardLRS => "Standard_LRS",
        StandardSSDLRS => "StandardSSD_LRS",
    }
}

fn parse_provisioning_state(s: &str) -> Option<ProvisioningState> {
    use ProvisioningState::*;
    Some(match s {
        "Accepted" => Accepted,
        "Provisioning" => Provisioning,
        "Updating" => Updating,
        "Deleting" => Deleting,
        "Succeeded" => Succeeded,
        "Failed" => Failed,
        "Canceled" => Canceled,
        _ => return None,
    })
}

fn provisioning_state_str(s: ProvisioningState) -> &'static str {
    use ProvisioningState::*;
    match s {
        Accepted => "Accepted",
        Provisioning => "Provisioning",
        Updating => "Updating",
        Deleting => "Deleting",
        Succeeded => "Succeeded",
        Failed => "Failed",
        Canceled => "Canceled",
    }
}

/// The kind of mutation an operation document represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationRequest {
    Create,
    Update,
    Delete,
    RequestCredential,
    RevokeCredentials,
}

impl OperationRequest {
    fn as_str(self) -> &'static str {
        match self {
            OperationRequest::Create => "Create",
            OperationRequest::Update => "Update",
            OperationRequest::Delete => "Delete",
            OperationRequest::RequestCredential => "RequestCredential",
            OperationRequest::RevokeCredentials => "RevokeCredentials",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "Create" => OperationRequest::Create,
            "Update" => OperationRequest::Update,
            "Delete" => OperationRequest::Delete,
            "RequestCredential" => OperationRequest::RequestCredential,
            "RevokeCredentials" => OperationRequest::RevokeCredentials,
            _ => return None,
        })
    }
}

/// ARM cloud-error body, present iff an operation's status is a terminal
/// failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudError {
    pub code: String,
    pub message: String,
}

/// The persisted record of a single asynchronous mutation.
#[derive(Debug, Clone)]
pub struct OperationDocument {
    pub operation_id: ResourceId,
    pub external_id: String,
    pub internal_id: String,
    pub request: OperationRequest,
    pub tenant_id: String,
    pub client_id: String,
    pub client_request_id: String,
    pub correlation_request_id: String,
    pub notification_uri: Option<String>,
    pub status: ProvisioningState,
    pub error: Option<CloudError>,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub last_transition_time: chrono::DateTime<chrono::Utc>,
    pub etag: Option<String>,
    pub ts: Option<i64>,
}

impl OperationDocument {
    pub fn decode(raw: &Value) -> StoreResult<Self> {
        let (meta, payload) = split_envelope(raw)?;
        if !type_matches(&meta.resource_type, &[RESOURCE_TYPE_OPERATION_STATUS]) {
            return Err(type_mismatch(
                &meta.resource_type,
                &[RESOURCE_TYPE_OPERATION_STATUS],
            ));
        }
        let operation_id_str = str_field(&payload, "operationId").unwrap_or_else(|| meta.id.clone());
        let operation_id = ResourceId::parse(&operation_id_str)?;
        let request = str_field(&payload, "request")
            .as_deref()
            .and_then(OperationRequest::parse)
            .unwrap_or(OperationRequest::Update);
        let status = payload
            .get("status")
            .and_then(Value::as_str)
            .and_then(parse_provisioning_state)
            .unwrap_or(ProvisioningState::Accepted);
        let error = payload.get("error").and_then(Value::as_object).map(|e| CloudError {
            code: str_field(e, "code").unwrap_or_default(),
            message: str_field(e, "message").unwrap_or_default(),
        });
        let start_time = parse_time(&payload, "startTime");
        let last_transition_time = parse_time(&payload, "lastTransitionTime");

        Ok(OperationDocument {
            operation_id,
            external_id: str_field(&payload, "externalId").unwrap_or_default(),
            internal_id: str_field(&payload, "internalId").unwrap_or_default(),
            request,
            tenant_id: str_field(&payload, "tenantId").unwrap_or_default(),
            client_id: str_field(&payload, "clientId").unwrap_or_default(),
            client_request_id: str_field(&payload, "clientRequestId").unwrap_or_default(),
            correlation_request_id: str_field(&payload, "correlationRequestId").unwrap_or_default(),
            notification_uri: str_field(&payload, "notificationUri"),
            status,
            error,
            start_time,
            last_transition_time,
            etag: meta.etag,
            ts: meta.ts,
        })
    }

    pub fn encode(&self) -> Value {
        let mut payload = Map::new();
        payload.insert(
            "operationId".to_string(),
            Value::String(self.operation_id.to_string()),
        );
        payload.insert("externalId".to_string(), Value::String(self.external_id.clone()));
        payload.insert("internalId".to_string(), Value::String(self.internal_id.clone()));
        payload.insert("request".to_string(), Value::String(self.request.as_str().to_string()));
        payload.insert("tenantId".to_string(), Value::String(self.tenant_id.clone()));
        payload.insert("clientId".to_string(), Value::String(self.client_id.clone()));
        payload.insert(
            "clientRequestId".to_string(),
            Value::String(self.client_request_id.clone()),
        );
        payload.insert(
            "correlationRequestId".to_string(),
            Value::String(self.correlation_request_id.clone()),
        );
        if let Some(uri) = &self.notification_uri {
            payload.insert("notificationUri".to_string(), Value::String(uri.clone()));
        }
        payload.insert(
            "status".to_string(),
            Value::String(provisioning_state_str(self.status).to_string()),
        );
        if let Some(err) = &self.error {
            let mut e = Map::new();
            e.insert("code".to_string(), Value::String(err.code.clone()));
            e.insert("message".to_string(), Value::String(err.message.clone()));
            payload.insert("error".to_string(), Value::Object(e));
        }
        payload.insert(
            "startTime".to_string(),
            Value::String(self.start_time.to_rfc3339()),
        );
        payload.insert(
            "lastTransitionTime".to_string(),
            Value::String(self.last_transition_time.to_rfc3339()),
        );

        let meta = EnvelopeMeta {
            id: self.operation_id.cosmos_id(),
            partition_key: self.operation_id.partition_key(),
            resource_type: RESOURCE_TYPE_OPERATION_STATUS.to_string(),
            etag: self.etag.clone(),
            ts: self.ts,
            ttl: Some(crate::config::OPERATION_TTL_SECONDS),
        };
        join_envelope(&meta, payload)
    }
}

fn parse_time(payload: &Map<String, Value>, key: &str) -> chrono::DateTime<chrono::Utc> {
    str_field(payload, key)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|| chrono::DateTime::from_timestamp(0, 0).unwrap())
}

/// ARM subscription registration.
#[derive(Debug, Clone)]
pub struct SubscriptionDocument {
    pub subscription_id: String,
    pub state: String,
    pub tenant_id: String,
    pub registered_features: Vec<String>,
    pub last_updated: Option<i64>,
    pub etag: Option<String>,
}

impl SubscriptionDocument {
    pub fn decode(raw: &Value) -> StoreResult<Self> {
        let (meta, payload) = split_envelope(raw)?;
        if !type_matches(&meta.resource_type, &[RESOURCE_TYPE_SUBSCRIPTION]) {
            return Err(type_mismatch(&meta.resource_type, &[RESOURCE_TYPE_SUBSCRIPTION]));
        }
        let registered_features = payload
            .get("registeredFeatures")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        Ok(SubscriptionDocument {
            subscription_id: meta.id.clone(),
            state: str_field(&payload, "state").unwrap_or_else(|| "Registered".to_string()),
            tenant_id: str_field(&payload, "tenantId").unwrap_or_default(),
            registered_features,
            last_updated: meta.ts,
            etag: meta.etag,
        })
    }

    pub fn encode(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("state".to_string(), Value::String(self.state.clone()));
        payload.insert("tenantId".to_string(), Value::String(self.tenant_id.clone()));
        payload.insert(
            "registeredFeatures".to_string(),
            Value::Array(
                self.registered_features
                    .iter()
                    .map(|f| Value::String(f.clone()))
                    .collect(),
            ),
        );
        let id_lower = self.subscription_id.to_lowercase();
        let meta = EnvelopeMeta {
            id: id_lower.clone(),
            partition_key: id_lower,
            resource_type: RESOURCE_TYPE_SUBSCRIPTION.to_string(),
            etag: self.etag.clone(),
            ts: self.last_updated,
            ttl: None,
        };
        join_envelope(&meta, payload)
    }
}

/// A global distributed lock.
#[derive(Debug, Clone)]
pub struct LockDocument {
    pub id: String,
    pub owner: String,
    pub ttl_seconds: i64,
    pub etag: Option<String>,
    pub ts: Option<i64>,
}

impl LockDocument {
    pub fn decode(raw: &Value) -> StoreResult<Self> {
        let (meta, payload) = split_envelope(raw)?;
        Ok(LockDocument {
            id: meta.id.clone(),
            owner: str_field(&payload, "owner").unwrap_or_default(),
            ttl_seconds: meta.ttl.unwrap_or(60),
            etag: meta.etag,
            ts: meta.ts,
        })
    }

    pub fn encode(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("owner".to_string(), Value::String(self.owner.clone()));
        let id_lower = self.id.to_lowercase();
        let meta = EnvelopeMeta {
            id: id_lower.clone(),
            partition_key: id_lower,
            resource_type: "lock".to_string(),
            etag: self.etag.clone(),
            ts: self.ts,
            ttl: Some(self.ttl_seconds),
        };
        join_envelope(&meta, payload)
    }
}

/// Per-cluster billing lifecycle marker. Deletion is
/// recorded by setting `deletion_time`, never by removing the document.
#[derive(Debug, Clone)]
pub struct BillingDocument {
    pub resource_id: ResourceId,
    pub subscription_id: String,
    pub tenant_id: String,
    pub managed_resource_group: String,
    pub creation_time: chrono::DateTime<chrono::Utc>,
    pub deletion_time: Option<chrono::DateTime<chrono::Utc>>,
    pub etag: Option<String>,
    pub ts: Option<i64>,
}

impl BillingDocument {
    pub fn decode(raw: &Value) -> StoreResult<Self> {
        let (meta, payload) = split_envelope(raw)?;
        let resource_id_str =
            str_field(&payload, "resourceId").unwrap_or_else(|| meta.id.clone());
        let resource_id = ResourceId::parse(&resource_id_str)?;
        Ok(BillingDocument {
            resource_id,
            subscription_id: str_field(&payload, "subscriptionId").unwrap_or_default(),
            tenant_id: str_field(&payload, "tenantId").unwrap_or_default(),
            managed_resource_group: str_field(&payload, "managedResourceGroup").unwrap_or_default(),
            creation_time: parse_time(&payload, "creationTime"),
            deletion_time: str_field(&payload, "deletionTime")
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc)),
            etag: meta.etag,
            ts: meta.ts,
        })
    }

    pub fn encode(&self) -> Value {
        let mut payload = Map::new();
        payload.insert(
            "resourceId".to_string(),
            Value::String(self.resource_id.to_string()),
        );
        payload.insert(
            "subscriptionId".to_string(),
            Value::String(self.subscription_id.clone()),
        );
        payload.insert("tenantId".to_string(), Value::String(self.tenant_id.clone()));
        payload.insert(
            "managedResourceGroup".to_string(),
            Value::String(self.managed_resource_group.clone()),
        );
        payload.insert(
            "creationTime".to_string(),
            Value::String(self.creation_time.to_rfc3339()),
        );
        if let Some(dt) = self.deletion_time {
            payload.insert("deletionTime".to_string(), Value::String(dt.to_rfc3339()));
        }
        let meta = EnvelopeMeta {
            id: self.resource_id.cosmos_id(),
            partition_key: self.resource_id.partition_key(),
            resource_type: "billing".to_string(),
            etag: self.etag.clone(),
            ts: self.ts,
            ttl: None,
        };
        join_envelope(&meta, payload)
    }
}
