//! Organizational hierarchy snapshot
//!
//! Capability Centre -> Framework -> Product -> System, as delivered by the
//! backend in one nested document. Children keep the backend's order.

use crate::scope::{ScopeKind, ScopeRef};
use ctrack_common::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Whole hierarchy snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hierarchy {
    #[serde(default)]
    pub capability_centres: Vec<CapabilityCentre>,
}

/// Top-level organizational grouping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityCentre {
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    pub frameworks: Vec<Framework>,
}

/// Business-domain portfolio inside a capability centre
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Framework {
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    pub products: Vec<Product>,
}

/// Tracked application or service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    pub systems: Vec<System>,
}

/// Deployable component; assessments are recorded against systems
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct System {
    pub id: NodeId,
    pub name: String,
}

/// Borrowed reference to any hierarchy node
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeRef<'h> {
    CapabilityCentre(&'h CapabilityCentre),
    Framework(&'h Framework),
    Product(&'h Product),
    System(&'h System),
}

impl<'h> NodeRef<'h> {
    /// Node level
    pub fn kind(&self) -> ScopeKind {
        match self {
            Self::CapabilityCentre(_) => ScopeKind::CapabilityCentre,
            Self::Framework(_) => ScopeKind::Framework,
            Self::Product(_) => ScopeKind::Product,
            Self::System(_) => ScopeKind::System,
        }
    }

    pub fn id(&self) -> &'h NodeId {
        match self {
            Self::CapabilityCentre(n) => &n.id,
            Self::Framework(n) => &n.id,
            Self::Product(n) => &n.id,
            Self::System(n) => &n.id,
        }
    }

    pub fn name(&self) -> &'h str {
        match self {
            Self::CapabilityCentre(n) => &n.name,
            Self::Framework(n) => &n.name,
            Self::Product(n) => &n.name,
            Self::System(n) => &n.name,
        }
    }

    /// Scope pointing at this node, labelled with its name
    pub fn scope(&self) -> ScopeRef {
        ScopeRef::new(self.kind(), self.id().clone()).with_label(self.name())
    }

    /// Direct children, in backend order
    pub fn children(&self) -> Vec<NodeRef<'h>> {
        match self {
            Self::CapabilityCentre(cc) => cc.frameworks.iter().map(NodeRef::Framework).collect(),
            Self::Framework(fw) => fw.products.iter().map(NodeRef::Product).collect(),
            Self::Product(p) => p.systems.iter().map(NodeRef::System).collect(),
            Self::System(_) => Vec::new(),
        }
    }

    /// Every system at or below this node
    pub fn systems(&self) -> Vec<&'h System> {
        match self {
            Self::CapabilityCentre(cc) => cc
                .frameworks
                .iter()
                .flat_map(|fw| fw.products.iter())
                .flat_map(|p| p.systems.iter())
                .collect(),
            Self::Framework(fw) => fw.products.iter().flat_map(|p| p.systems.iter()).collect(),
            Self::Product(p) => p.systems.iter().collect(),
            Self::System(s) => vec![*s],
        }
    }
}

impl Hierarchy {
    /// Root nodes
    pub fn roots(&self) -> Vec<NodeRef<'_>> {
        self.capability_centres.iter().map(NodeRef::CapabilityCentre).collect()
    }

    /// Every system in the forest, depth-first
    pub fn systems(&self) -> Vec<&System> {
        self.capability_centres
            .iter()
            .flat_map(|cc| NodeRef::CapabilityCentre(cc).systems())
            .collect()
    }

    /// True when the snapshot holds no capability centres
    pub fn is_empty(&self) -> bool {
        self.capability_centres.is_empty()
    }

    /// Report ids that occur more than once at the same level
    ///
    /// Duplicates are not rejected; resolution returns the first match in
    /// depth-first order.
    pub fn validate(&self) -> Vec<DuplicateNode> {
        let mut seen: HashSet<(ScopeKind, &NodeId)> = HashSet::new();
        let mut duplicates = Vec::new();
        let mut stack: Vec<NodeRef<'_>> = self.roots().into_iter().rev().collect();

        while let Some(node) = stack.pop() {
            if !seen.insert((node.kind(), node.id())) {
                duplicates.push(DuplicateNode {
                    kind: node.kind(),
                    id: node.id().clone(),
                });
            }
            stack.extend(node.children().into_iter().rev());
        }

        if !duplicates.is_empty() {
            tracing::warn!(count = duplicates.len(), "hierarchy snapshot contains duplicate ids");
        }
        duplicates
    }
}

/// Id seen more than once at one level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateNode {
    pub kind: ScopeKind,
    pub id: NodeId,
}
