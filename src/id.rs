//! Identifier model: parse, canonicalize, and round-trip ARM
//! resource identifiers; derive partition keys and document IDs.
//!
//! ARM identifiers have the form
//! `/subscriptions/{sub}/resourceGroups/{rg}/providers/{ns}/{type}/{name}[/{type2}/{name2}…]`.
//! Operation-status identifiers are subscription-scoped (no resource group)
//! and intentionally omit the `locations/{loc}` segment real ARM uses for
//! async operations, so a plain provider-namespace parse already classifies
//! them correctly.
use crate::error::{StoreError, StoreResult};
use std::fmt;

const SUBSCRIPTIONS: &str = "subscriptions";
const RESOURCE_GROUPS: &str = "resourcegroups";
const PROVIDERS: &str = "providers";

/// A single type/name pair in a resource's type chain, e.g.
/// `(hcpOpenShiftClusters, mycluster)` or `(nodePools, pool1)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TypeNamePair {
    type_name: String,
    name: String,
}

/// A parsed ARM resource identifier.
///
/// Every segment is stored in the exact case it was parsed from, so the
/// same value can render both the canonical lowercase document ID (via
/// [`ResourceId::cosmos_id`]) and the original-case string ARM expects back
/// in a response (via [`ResourceId::to_string`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    subscription_id: String,
    resource_group: Option<String>,
    provider_namespace: String,
    chain: Vec<TypeNamePair>,
}

impl ResourceId {
    /// `ParseResourceID`: accepts any case.
    pub fn parse(input: &str) -> StoreResult<Self> {
        let trimmed = input.trim().trim_start_matches('/').trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(parse_err(input, "empty resource id"));
        }
        let tokens: Vec<&str> = trimmed.split('/').collect();
        let mut idx = 0;

        let next = |idx: &mut usize| -> Option<&str> {
            let tok = tokens.get(*idx).copied();
            *idx += 1;
            tok
        };

        let kw = next(&mut idx).ok_or_else(|| parse_err(input, "missing 'subscriptions'"))?;
        if !kw.eq_ignore_ascii_case(SUBSCRIPTIONS) {
            return Err(parse_err(input, "expected 'subscriptions' segment"));
        }
        let subscription_id = next(&mut idx)
            .ok_or_else(|| parse_err(input, "missing subscription id"))?
            .to_string();
        if subscription_id.is_empty() {
            return Err(parse_err(input, "empty subscription id"));
        }

        let mut resource_group = None;
        // Peek: an optional resourceGroups/{rg} pair before providers.
        if let Some(tok) = tokens.get(idx) {
            if tok.eq_ignore_ascii_case(RESOURCE_GROUPS) {
                idx += 1;
                let rg = next(&mut idx)
                    .ok_or_else(|| parse_err(input, "missing resource group name"))?;
                if rg.is_empty() {
                    return Err(parse_err(input, "empty resource group name"));
                }
                resource_group = Some(rg.to_string());
            }
        }

        let kw = next(&mut idx).ok_or_else(|| parse_err(input, "missing 'providers'"))?;
        if !kw.eq_ignore_ascii_case(PROVIDERS) {
            return Err(parse_err(input, "expected 'providers' segment"));
        }
        let provider_namespace = next(&mut idx)
            .ok_or_else(|| parse_err(input, "missing provider namespace"))?
            .to_string();
        if provider_namespace.is_empty() {
            return Err(parse_err(input, "empty provider namespace"));
        }

        let remaining = &tokens[idx..];
        if remaining.is_empty() || remaining.len() % 2 != 0 {
            return Err(parse_err(
                input,
                "type/name segments must come in pairs and at least one pair is required",
            ));
        }

        let mut chain = Vec::with_capacity(remaining.len() / 2);
        for pair in remaining.chunks(2) {
            let type_name = pair[0].to_string();
            let name = pair[1].to_string();
            if type_name.is_empty() || name.is_empty() {
                return Err(parse_err(input, "empty type or name segment"));
            }
            chain.push(TypeNamePair { type_name, name });
        }

        Ok(ResourceId {
            subscription_id,
            resource_group,
            provider_namespace,
            chain,
        })
    }

    /// Construct a subscription-scoped operation-status identifier.
    pub fn new_operation(
        subscription_id: impl Into<String>,
        provider_namespace: impl Into<String>,
        operation_status_type_name: impl Into<String>,
        operation_name: impl Into<String>,
    ) -> Self {
        ResourceId {
            subscription_id: subscription_id.into(),
            resource_group: None,
            provider_namespace: provider_namespace.into(),
            chain: vec![TypeNamePair {
                type_name: operation_status_type_name.into(),
                name: operation_name.into(),
            }],
        }
    }

    /// Build a direct child of this resource by appending a `/type/name`
    /// pair to the canonical path, never by re-parsing a user string.
    pub fn child(&self, type_name: impl Into<String>, name: impl Into<String>) -> Self {
        let mut chain = self.chain.clone();
        chain.push(TypeNamePair {
            type_name: type_name.into(),
            name: name.into(),
        });
        ResourceId {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
            provider_namespace: self.provider_namespace.clone(),
            chain,
        }
    }

    /// The immediate parent resource id, or `None` if this is a top-level
    /// (resource-group- or subscription-scoped) resource.
    pub fn parent(&self) -> Option<Self> {
        if self.chain.len() <= 1 {
            return None;
        }
        let mut chain = self.chain.clone();
        chain.pop();
        Some(ResourceId {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
            provider_namespace: self.provider_namespace.clone(),
            chain,
        })
    }

    /// `true` if `self` is a direct or transitive descendant of `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &ResourceId) -> bool {
        self.to_canonical_string()
            .starts_with(&format!("{}/", ancestor.to_canonical_string()))
    }

    /// `true` if `self` is a direct child of `ancestor` (one type/name pair
    /// deeper), used by the "direct descendants only" list mode.
    pub fn is_direct_child_of(&self, ancestor: &ResourceId) -> bool {
        self.is_descendant_of(ancestor) && self.chain.len() == ancestor.chain.len() + 1
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn resource_group(&self) -> Option<&str> {
        self.resource_group.as_deref()
    }

    pub fn provider_namespace(&self) -> &str {
        &self.provider_namespace
    }

    /// The name of the leaf resource (last pair in the chain).
    pub fn name(&self) -> &str {
        &self.chain.last().expect("chain is never empty").name
    }

    /// The leaf type name only (e.g. `nodePools`), not the full chain.
    pub fn leaf_type_name(&self) -> &str {
        &self.chain.last().expect("chain is never empty").type_name
    }

    /// The envelope `resourceType` value: `namespace/type1/type2/...`,
    /// lowercased.
    pub fn resource_type(&self) -> String {
        let mut s = self.provider_namespace.to_lowercase();
        for pair in &self.chain {
            s.push('/');
            s.push_str(&pair.type_name.to_lowercase());
        }
        s
    }

    /// `ResourceIDToCosmosID`: the lowercase canonical path used as the
    /// document `id`.
    pub fn to_canonical_string(&self) -> String {
        self.render(true)
    }

    /// The partition key for this resource: `lowercase(subscriptionID)`.
    pub fn partition_key(&self) -> String {
        self.subscription_id.to_lowercase()
    }

    /// `cosmos_id` is an alias for [`ResourceId::to_canonical_string`],
    /// named to match the Cosmos-facing vocabulary used elsewhere in this
    /// crate.
    pub fn cosmos_id(&self) -> String {
        self.to_canonical_string()
    }

    fn render(&self, lower: bool) -> String {
        let mut out = String::from("/subscriptions/");
        push(&mut out, &self.subscription_id, lower);
        if let Some(rg) = &self.resource_group {
            out.push_str("/resourceGroups/");
            push(&mut out, rg, lower);
        }
        out.push_str("/providers/");
        push(&mut out, &self.provider_namespace, lower);
        for pair in &self.chain {
            out.push('/');
            push(&mut out, &pair.type_name, lower);
            out.push('/');
            push(&mut out, &pair.name, lower);
        }
        out
    }
}

fn push(out: &mut String, segment: &str, lower: bool) {
    if lower {
        out.push_str(&segment.to_lowercase());
    } else {
        out.push_str(segment);
    }
}

impl fmt::Display for ResourceId {
    /// Renders the identifier preserving the case it was parsed with, so
    /// ARM responses echo back the case the caller (or the last writer)
    /// used.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(false))
    }
}

/// Parses a canonical cosmos id back into an equivalent resource id.
/// This is just [`ResourceId::parse`] under the name ARM callers expect.
pub fn cosmos_id_to_resource_id(cosmos_id: &str) -> StoreResult<ResourceId> {
    ResourceId::parse(cosmos_id)
}

fn parse_err(id: &str, reason: &str) -> StoreError {
    StoreError::InvalidResourceId {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLUSTER_ID: &str =
        "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/RG/providers/Microsoft.RedHatOpenShift/hcpOpenShiftClusters/C";

    #[test]
    fn parses_resource_group_scoped_id() {
        let r = ResourceId::parse(CLUSTER_ID).unwrap();
        assert_eq!(r.subscription_id(), "00000000-0000-0000-0000-000000000000");
        assert_eq!(r.resource_group(), Some("RG"));
        assert_eq!(r.provider_namespace(), "Microsoft.RedHatOpenShift");
        assert_eq!(r.name(), "C");
        assert_eq!(r.leaf_type_name(), "hcpOpenShiftClusters");
    }

    #[test]
    fn canonical_string_is_lowercase() {
        let r = ResourceId::parse(CLUSTER_ID).unwrap();
        assert_eq!(
            r.to_canonical_string(),
            "/subscriptions/00000000-0000-0000-0000-000000000000/resourcegroups/rg/providers/microsoft.redhatopenshift/hcpopenshiftclusters/c"
        );
    }

    #[test]
    fn display_preserves_original_case() {
        let r = ResourceId::parse(CLUSTER_ID).unwrap();
        assert_eq!(r.to_string(), CLUSTER_ID);
    }

    #[test]
    fn case_insensitive_parse_round_trips_equivalently() {
        let lower = ResourceId::parse(&CLUSTER_ID.to_lowercase()).unwrap();
        let upper = ResourceId::parse(&CLUSTER_ID.to_uppercase()).unwrap();
        let mixed = ResourceId::parse(CLUSTER_ID).unwrap();
        assert_eq!(lower.to_canonical_string(), upper.to_canonical_string());
        assert_eq!(lower.to_canonical_string(), mixed.to_canonical_string());
    }

    #[test]
    fn child_appends_without_reparsing() {
        let parent = ResourceId::parse(CLUSTER_ID).unwrap();
        let child = parent.child("nodePools", "pool1");
        assert_eq!(
            child.to_canonical_string(),
            format!("{}/nodepools/pool1", parent.to_canonical_string())
        );
        assert_eq!(child.parent().unwrap(), parent);
    }

    #[test]
    fn is_descendant_and_direct_child() {
        let cluster = ResourceId::parse(CLUSTER_ID).unwrap();
        let pool = cluster.child("nodePools", "pool1");
        let rg = ResourceId::parse(
            "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/RG/providers/Microsoft.RedHatOpenShift/hcpOpenShiftClusters/other",
        )
        .unwrap();

        assert!(pool.is_descendant_of(&cluster));
        assert!(pool.is_direct_child_of(&cluster));
        assert!(!rg.is_descendant_of(&cluster));
    }

    #[test]
    fn operation_ids_have_no_resource_group() {
        let op = ResourceId::new_operation(
            "00000000-0000-0000-0000-000000000000",
            "Microsoft.RedHatOpenShift",
            "hcpOperationStatuses",
            "5f1b0e1a-aaaa-bbbb-cccc-0123456789ab",
        );
        assert_eq!(op.resource_group(), None);
        assert_eq!(
            op.resource_type(),
            "microsoft.redhatopenshift/hcpoperationstatuses"
        );
        // round trips through parse/render
        let parsed = ResourceId::parse(&op.to_canonical_string()).unwrap();
        assert_eq!(parsed, op);
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(ResourceId::parse("").is_err());
        assert!(ResourceId::parse("/subscriptions").is_err());
        assert!(ResourceId::parse("/subscriptions/sub/providers").is_err());
        assert!(ResourceId::parse("/subscriptions/sub/providers/ns/type").is_err());
        assert!(ResourceId::parse("/subscriptions/sub/providers/ns/type/name/extra").is_err());
    }

    #[test]
    fn cosmos_id_to_resource_id_is_left_inverse() {
        let r = ResourceId::parse(CLUSTER_ID).unwrap();
        let cosmos_id = r.cosmos_id();
        let recovered = cosmos_id_to_resource_id(&cosmos_id).unwrap();
        assert_eq!(recovered.to_canonical_string(), r.to_canonical_string());
    }
}
