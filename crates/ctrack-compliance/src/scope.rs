//! Scope resolution and navigation
//!
//! A scope is an opaque `(kind, id)` pointer into the hierarchy, carried in
//! the URL query string as `scope`, `id` and optionally `label`. Resolution
//! is a linear depth-first walk in capability-centre order; scope ids carry
//! no parent references, so the ancestor chain is rebuilt from the roots.
//!
//! If two nodes at one level share an id, the first one in walk order wins.

use crate::hierarchy::{Hierarchy, NodeRef};
use ctrack_common::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::form_urlencoded;

/// Query parameter holding the scope kind
pub const SCOPE_PARAM: &str = "scope";
/// Query parameter holding the node id
pub const ID_PARAM: &str = "id";
/// Query parameter holding the display label
pub const LABEL_PARAM: &str = "label";

/// Scope errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("no {kind} with id {id} in the current hierarchy")]
    NotFound { kind: ScopeKind, id: NodeId },

    #[error("unknown scope kind: {0}")]
    UnknownKind(String),
}

/// Hierarchy level a scope points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScopeKind {
    #[serde(rename = "cc")]
    CapabilityCentre,
    #[serde(rename = "framework")]
    Framework,
    #[serde(rename = "product")]
    Product,
    #[serde(rename = "system")]
    System,
}

impl ScopeKind {
    /// URL value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CapabilityCentre => "cc",
            Self::Framework => "framework",
            Self::Product => "product",
            Self::System => "system",
        }
    }

    /// Level one step down, if any
    pub fn child(&self) -> Option<ScopeKind> {
        match self {
            Self::CapabilityCentre => Some(Self::Framework),
            Self::Framework => Some(Self::Product),
            Self::Product => Some(Self::System),
            Self::System => None,
        }
    }

    /// Level one step up, if any
    pub fn parent(&self) -> Option<ScopeKind> {
        match self {
            Self::CapabilityCentre => None,
            Self::Framework => Some(Self::CapabilityCentre),
            Self::Product => Some(Self::Framework),
            Self::System => Some(Self::Product),
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeKind {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cc" => Ok(Self::CapabilityCentre),
            "framework" => Ok(Self::Framework),
            "product" => Ok(Self::Product),
            "system" => Ok(Self::System),
            other => Err(ScopeError::UnknownKind(other.to_string())),
        }
    }
}

/// Pointer to one hierarchy node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeRef {
    pub kind: ScopeKind,
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ScopeRef {
    pub fn new(kind: ScopeKind, id: NodeId) -> Self {
        Self { kind, id, label: None }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Same node, ignoring the label
    pub fn same_node(&self, other: &ScopeRef) -> bool {
        self.kind == other.kind && self.id == other.id
    }
}

/// Navigation scope: the global view or one node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Scope {
    #[default]
    Root,
    Node(ScopeRef),
}

impl Scope {
    pub fn node(kind: ScopeKind, id: NodeId) -> Self {
        Self::Node(ScopeRef::new(kind, id))
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Self::Root)
    }

    pub fn target(&self) -> Option<&ScopeRef> {
        match self {
            Self::Root => None,
            Self::Node(r) => Some(r),
        }
    }

    /// Encode as query parameters; the root view encodes to nothing
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        match self {
            Self::Root => Vec::new(),
            Self::Node(r) => {
                let mut pairs = vec![
                    (SCOPE_PARAM.to_string(), r.kind.as_str().to_string()),
                    (ID_PARAM.to_string(), r.id.to_string()),
                ];
                if let Some(label) = &r.label {
                    pairs.push((LABEL_PARAM.to_string(), label.clone()));
                }
                pairs
            }
        }
    }

    /// Decode from query parameters
    ///
    /// A missing or unknown `scope`, or a missing/blank `id`, decodes to
    /// the root view. Unrelated parameters are ignored.
    pub fn from_query_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut kind = None;
        let mut id = None;
        let mut label = None;
        for (key, value) in pairs {
            match key.as_ref() {
                SCOPE_PARAM => kind = Some(value.as_ref().to_string()),
                ID_PARAM => id = Some(value.as_ref().to_string()),
                LABEL_PARAM => label = Some(value.as_ref().to_string()),
                _ => {}
            }
        }

        let kind = match kind.map(|k| k.parse::<ScopeKind>()) {
            Some(Ok(kind)) => kind,
            Some(Err(e)) => {
                tracing::debug!(error = %e, "ignoring scope parameter");
                return Self::Root;
            }
            None => return Self::Root,
        };
        let Some(Ok(id)) = id.map(NodeId::new) else {
            return Self::Root;
        };

        Self::Node(ScopeRef { kind, id, label })
    }

    /// Encode as an `application/x-www-form-urlencoded` query string
    pub fn to_query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.to_query_pairs())
            .finish()
    }

    /// Decode from a query string, with or without the leading `?`
    pub fn from_query_string(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self::from_query_pairs(form_urlencoded::parse(query.as_bytes()))
    }
}

/// A resolved scope: the node plus its ancestor chain
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<'h> {
    pub node: NodeRef<'h>,
    /// Root-first: `[cc]`, `[cc, framework]` or `[cc, framework, product]`
    pub ancestors: Vec<ScopeRef>,
}

impl<'h> Resolution<'h> {
    /// Scope for the resolved node, labelled with its name
    pub fn scope(&self) -> ScopeRef {
        self.node.scope()
    }

    /// Ancestors followed by the node itself
    pub fn breadcrumb(&self) -> Vec<ScopeRef> {
        let mut crumbs = self.ancestors.clone();
        crumbs.push(self.scope());
        crumbs
    }

    /// Container one level up; the root view for capability centres
    pub fn parent(&self) -> Scope {
        self.ancestors
            .last()
            .cloned()
            .map(Scope::Node)
            .unwrap_or(Scope::Root)
    }
}

/// Locate a node of the given kind and rebuild its ancestor path
pub fn resolve<'h>(
    kind: ScopeKind,
    id: &NodeId,
    hierarchy: &'h Hierarchy,
) -> Result<Resolution<'h>, ScopeError> {
    let not_found = || ScopeError::NotFound { kind, id: id.clone() };

    for cc in &hierarchy.capability_centres {
        let cc_ref = NodeRef::CapabilityCentre(cc);
        if kind == ScopeKind::CapabilityCentre {
            if &cc.id == id {
                return Ok(Resolution { node: cc_ref, ancestors: Vec::new() });
            }
            continue;
        }

        for fw in &cc.frameworks {
            let fw_ref = NodeRef::Framework(fw);
            if kind == ScopeKind::Framework {
                if &fw.id == id {
                    return Ok(Resolution { node: fw_ref, ancestors: vec![cc_ref.scope()] });
                }
                continue;
            }

            for product in &fw.products {
                let product_ref = NodeRef::Product(product);
                if kind == ScopeKind::Product {
                    if &product.id == id {
                        return Ok(Resolution {
                            node: product_ref,
                            ancestors: vec![cc_ref.scope(), fw_ref.scope()],
                        });
                    }
                    continue;
                }

                if let Some(system) = product.systems.iter().find(|s| &s.id == id) {
                    return Ok(Resolution {
                        node: NodeRef::System(system),
                        ancestors: vec![cc_ref.scope(), fw_ref.scope(), product_ref.scope()],
                    });
                }
            }
        }
    }

    Err(not_found())
}

/// Resolve a [`Scope`]; the root view resolves to `None`
pub fn resolve_scope<'h>(
    scope: &Scope,
    hierarchy: &'h Hierarchy,
) -> Result<Option<Resolution<'h>>, ScopeError> {
    match scope {
        Scope::Root => Ok(None),
        Scope::Node(r) => resolve(r.kind, &r.id, hierarchy).map(Some),
    }
}

/// Normalize a scope against a snapshot: unknown ids fall back to root
pub fn resolve_or_root(scope: &Scope, hierarchy: &Hierarchy) -> Scope {
    match resolve_scope(scope, hierarchy) {
        Ok(Some(resolution)) => Scope::Node(resolution.scope()),
        Ok(None) => Scope::Root,
        Err(e) => {
            tracing::debug!(error = %e, "scope not in snapshot, showing root view");
            Scope::Root
        }
    }
}

/// Drill-down/back navigation state
///
/// The scope names the container whose children are listed: `Root` lists
/// capability centres, a `framework` scope lists that framework's
/// products, and so on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Navigator {
    current: Scope,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a URL query string
    pub fn from_query_string(query: &str) -> Self {
        Self { current: Scope::from_query_string(query) }
    }

    pub fn current(&self) -> &Scope {
        &self.current
    }

    /// Move into a child; sets exactly the given kind and id
    pub fn drill_into(&mut self, child: ScopeRef) -> &Scope {
        self.current = Scope::Node(child);
        &self.current
    }

    /// Move to the parent container of the level currently displayed
    ///
    /// Back from a product's systems listing shows that product's
    /// framework, never the capability centre. Unresolvable scopes fall
    /// back to the root view.
    pub fn back(&mut self, hierarchy: &Hierarchy) -> &Scope {
        self.current = match resolve_scope(&self.current, hierarchy) {
            Ok(Some(resolution)) => resolution.parent(),
            Ok(None) => Scope::Root,
            Err(e) => {
                tracing::debug!(error = %e, "navigating back from an unknown scope");
                Scope::Root
            }
        };
        &self.current
    }

    /// Jump to the global view
    pub fn reset(&mut self) -> &Scope {
        self.current = Scope::Root;
        &self.current
    }

    /// Ancestors plus the current node; empty at the root or when stale
    pub fn breadcrumb(&self, hierarchy: &Hierarchy) -> Vec<ScopeRef> {
        match resolve_scope(&self.current, hierarchy) {
            Ok(Some(resolution)) => resolution.breadcrumb(),
            _ => Vec::new(),
        }
    }

    /// Current scope as a query string
    pub fn to_query_string(&self) -> String {
        self.current.to_query_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::fixtures::*;

    #[test]
    fn test_resolve_product_ancestors() {
        let h = sample();
        let res = resolve(ScopeKind::Product, &id("p2"), &h).unwrap();
        assert_eq!(res.node.name(), "Product p2");
        let path: Vec<_> = res.ancestors.iter().map(|a| (a.kind, a.id.as_str())).collect();
        assert_eq!(
            path,
            vec![(ScopeKind::CapabilityCentre, "c1"), (ScopeKind::Framework, "f1")]
        );
    }

    #[test]
    fn test_resolve_system_and_framework_paths() {
        let h = sample();
        let sys = resolve(ScopeKind::System, &id("s4"), &h).unwrap();
        let ids: Vec<_> = sys.ancestors.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "f3", "p4"]);

        let fw = resolve(ScopeKind::Framework, &id("f2"), &h).unwrap();
        assert_eq!(fw.ancestors.len(), 1);
        assert_eq!(fw.ancestors[0].label.as_deref(), Some("Centre c1"));

        let cc = resolve(ScopeKind::CapabilityCentre, &id("c2"), &h).unwrap();
        assert!(cc.ancestors.is_empty());
        assert_eq!(cc.parent(), Scope::Root);
    }

    #[test]
    fn test_resolve_wrong_level_is_not_found() {
        let h = sample();
        let err = resolve(ScopeKind::Framework, &id("p1"), &h).unwrap_err();
        assert_eq!(err, ScopeError::NotFound { kind: ScopeKind::Framework, id: id("p1") });
        assert!(resolve(ScopeKind::System, &id("missing"), &h).is_err());
    }

    #[test]
    fn test_duplicate_ids_resolve_to_first_match() {
        let mut h = sample();
        h.capability_centres[1].frameworks[0].products[0].id = id("p1");
        let res = resolve(ScopeKind::Product, &id("p1"), &h).unwrap();
        assert_eq!(res.ancestors[0].id.as_str(), "c1");
    }

    #[test]
    fn test_query_round_trip_with_label() {
        let scope = Scope::Node(
            ScopeRef::new(ScopeKind::Product, id("p 1&2")).with_label("Gateway / EU"),
        );
        let query = scope.to_query_string();
        assert_eq!(Scope::from_query_string(&query), scope);
        assert_eq!(Scope::from_query_string(&format!("?{query}")), scope);
    }

    #[test]
    fn test_query_decoding_falls_back_to_root() {
        assert_eq!(Scope::from_query_string(""), Scope::Root);
        assert_eq!(Scope::from_query_string("scope=galaxy&id=1"), Scope::Root);
        assert_eq!(Scope::from_query_string("scope=product"), Scope::Root);
        assert_eq!(Scope::from_query_string("scope=product&id="), Scope::Root);
        assert_eq!(Scope::Root.to_query_string(), "");
        assert_eq!(
            Scope::from_query_string("tab=gaps&scope=cc&id=c1"),
            Scope::node(ScopeKind::CapabilityCentre, id("c1"))
        );
    }

    #[test]
    fn test_every_node_survives_query_round_trip_and_resolution() {
        let mut h = sample();
        h.capability_centres.push(centre(
            "cc/ü 9",
            vec![framework("fw&x=1", vec![product("p?#%", vec![system("s +1"), system("s;2,3")])])],
        ));

        let mut stack = h.roots();
        let mut visited = 0;
        while let Some(node) = stack.pop() {
            let labelled = Scope::Node(node.scope());
            let decoded = Scope::from_query_string(&labelled.to_query_string());
            assert_eq!(decoded, labelled);
            assert_eq!(resolve_or_root(&decoded, &h), labelled);

            let bare = Scope::node(node.kind(), node.id().clone());
            let decoded = Scope::from_query_string(&bare.to_query_string());
            assert_eq!(decoded, bare);
            assert_eq!(resolve_or_root(&decoded, &h), labelled);

            stack.extend(node.children());
            visited += 1;
        }
        // 3 centres, 4 frameworks, 5 products, 6 systems
        assert_eq!(visited, 18);
    }

    #[test]
    fn test_resolve_or_root() {
        let h = sample();
        let stale = Scope::node(ScopeKind::System, id("gone"));
        assert_eq!(resolve_or_root(&stale, &h), Scope::Root);
        let live = Scope::node(ScopeKind::System, id("s1"));
        match resolve_or_root(&live, &h) {
            Scope::Node(r) => assert_eq!(r.label.as_deref(), Some("System s1")),
            Scope::Root => panic!("expected a node scope"),
        }
    }

    #[test]
    fn test_back_goes_to_parent_container() {
        let h = sample();
        let mut nav = Navigator::new();
        nav.drill_into(ScopeRef::new(ScopeKind::CapabilityCentre, id("c1")));
        nav.drill_into(ScopeRef::new(ScopeKind::Framework, id("f1")));
        nav.drill_into(ScopeRef::new(ScopeKind::Product, id("p1")));

        let back = nav.back(&h).clone();
        assert_eq!(back.target().map(|r| (r.kind, r.id.as_str())), Some((ScopeKind::Framework, "f1")));
        nav.back(&h);
        assert_eq!(
            nav.current().target().map(|r| r.kind),
            Some(ScopeKind::CapabilityCentre)
        );
        assert_eq!(nav.back(&h), &Scope::Root);
        assert_eq!(nav.back(&h), &Scope::Root);
    }

    #[test]
    fn test_back_from_system_and_stale_scope() {
        let h = sample();
        let mut nav = Navigator::from_query_string("scope=system&id=s3");
        assert_eq!(nav.breadcrumb(&h).len(), 4);
        nav.back(&h);
        assert_eq!(nav.current().target().map(|r| r.id.as_str()), Some("p2"));

        let mut stale = Navigator::from_query_string("scope=product&id=ghost");
        assert!(stale.breadcrumb(&h).is_empty());
        assert_eq!(stale.back(&h), &Scope::Root);
    }

    #[test]
    fn test_drill_into_replaces_scope_exactly() {
        let mut nav = Navigator::new();
        nav.drill_into(ScopeRef::new(ScopeKind::Product, id("p4")));
        assert_eq!(nav.to_query_string(), "scope=product&id=p4");
        nav.reset();
        assert!(nav.current().is_root());
    }
}
