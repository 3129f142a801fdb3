//! Compliance Aggregator
//!
//! Bottom-up roll-up of assessment statuses over the hierarchy. A parent's
//! score is computed from the union of its descendant systems' assessments,
//! never as an average of child scores, so systems with sparse coverage do
//! not skew it.
//!
//! ```text
//! score = round(100 * (compliant + 0.5 * partial) / assessed)
//! assessed = total - not_assessed - not_applicable      (score 0 if 0)
//! ```

use crate::catalog::{ControlCatalog, Function};
use crate::hierarchy::{Hierarchy, NodeRef};
use crate::ledger::Assessment;
use crate::scope::{resolve, Scope, ScopeError, ScopeKind, ScopeRef};
use crate::status::ComplianceStatus;
use ctrack_common::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::AddAssign;

/// Per-status counts for a set of assessments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceCounts {
    pub compliant: usize,
    pub partially_compliant: usize,
    pub non_compliant: usize,
    pub not_assessed: usize,
    pub not_applicable: usize,
}

impl ComplianceCounts {
    /// Count one status
    pub fn record(&mut self, status: ComplianceStatus) {
        match status {
            ComplianceStatus::Implemented => self.compliant += 1,
            ComplianceStatus::PartiallyImplemented => self.partially_compliant += 1,
            ComplianceStatus::NotImplemented => self.non_compliant += 1,
            ComplianceStatus::NotAssessed => self.not_assessed += 1,
            ComplianceStatus::NotApplicable => self.not_applicable += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.compliant + self.partially_compliant + self.non_compliant + self.not_assessed + self.not_applicable
    }

    /// Denominator of the score
    pub fn assessed(&self) -> usize {
        self.compliant + self.partially_compliant + self.non_compliant
    }

    /// Score in 0..=100, rounded half up; 0 when nothing is assessed
    pub fn score(&self) -> u8 {
        let assessed = self.assessed();
        if assessed == 0 {
            return 0;
        }
        // round(100 * (2c + p) / 2a) == floor((200c + 100p + a) / 2a)
        let numerator = 200 * self.compliant + 100 * self.partially_compliant + assessed;
        (numerator / (2 * assessed)) as u8
    }

    pub fn summary(&self) -> ComplianceSummary {
        ComplianceSummary {
            counts: *self,
            total: self.total(),
            compliance_score: self.score(),
        }
    }
}

impl AddAssign for ComplianceCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.compliant += rhs.compliant;
        self.partially_compliant += rhs.partially_compliant;
        self.non_compliant += rhs.non_compliant;
        self.not_assessed += rhs.not_assessed;
        self.not_applicable += rhs.not_applicable;
    }
}

/// Count a batch of statuses
pub fn summarize<I>(statuses: I) -> ComplianceCounts
where
    I: IntoIterator<Item = ComplianceStatus>,
{
    let mut counts = ComplianceCounts::default();
    for status in statuses {
        counts.record(status);
    }
    counts
}

/// Counts plus the derived total and score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceSummary {
    #[serde(flatten)]
    pub counts: ComplianceCounts,
    pub total: usize,
    pub compliance_score: u8,
}

/// Summary of one child in a listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildSummary {
    pub scope: ScopeRef,
    pub summary: ComplianceSummary,
}

/// Summary of one function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSummary {
    pub function: Function,
    pub summary: ComplianceSummary,
}

/// Precomputed summaries for the whole forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollupTree {
    pub overall: ComplianceSummary,
    pub capability_centres: Vec<RollupNode>,
}

/// One node of a [`RollupTree`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollupNode {
    pub scope: ScopeRef,
    pub summary: ComplianceSummary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RollupNode>,
}

impl RollupTree {
    /// Depth-first lookup of a node's entry
    pub fn find(&self, target: &ScopeRef) -> Option<&RollupNode> {
        let mut stack: Vec<&RollupNode> = self.capability_centres.iter().rev().collect();
        while let Some(node) = stack.pop() {
            if node.scope.same_node(target) {
                return Some(node);
            }
            stack.extend(node.children.iter().rev());
        }
        None
    }
}

/// Roll-up over one hierarchy snapshot and one assessment snapshot
///
/// Assessments for systems that are not in the hierarchy are ignored.
pub struct Aggregator<'a> {
    hierarchy: &'a Hierarchy,
    by_system: HashMap<&'a NodeId, Vec<&'a Assessment>>,
}

impl<'a> Aggregator<'a> {
    pub fn new(hierarchy: &'a Hierarchy, assessments: &'a [Assessment]) -> Self {
        let mut by_system: HashMap<&NodeId, Vec<&Assessment>> = HashMap::new();
        for assessment in assessments {
            by_system.entry(&assessment.system_id).or_default().push(assessment);
        }
        Self { hierarchy, by_system }
    }

    pub fn hierarchy(&self) -> &'a Hierarchy {
        self.hierarchy
    }

    /// Assessments of every system at or below `node`
    pub fn assessments_under(&self, node: NodeRef<'a>) -> Vec<&'a Assessment> {
        node.systems()
            .into_iter()
            .flat_map(|system| self.by_system.get(&system.id).into_iter().flatten().copied())
            .collect()
    }

    /// Counts over the union of descendant assessments
    pub fn counts_for(&self, node: NodeRef<'a>) -> ComplianceCounts {
        summarize(self.assessments_under(node).into_iter().map(|a| a.status))
    }

    pub fn summary_for(&self, node: NodeRef<'a>) -> ComplianceSummary {
        self.counts_for(node).summary()
    }

    pub fn summary_for_system(&self, id: &NodeId) -> Result<ComplianceSummary, ScopeError> {
        self.summary_for_scope(&Scope::node(ScopeKind::System, id.clone()))
    }

    pub fn summary_for_product(&self, id: &NodeId) -> Result<ComplianceSummary, ScopeError> {
        self.summary_for_scope(&Scope::node(ScopeKind::Product, id.clone()))
    }

    pub fn summary_for_framework(&self, id: &NodeId) -> Result<ComplianceSummary, ScopeError> {
        self.summary_for_scope(&Scope::node(ScopeKind::Framework, id.clone()))
    }

    pub fn summary_for_capability_centre(&self, id: &NodeId) -> Result<ComplianceSummary, ScopeError> {
        self.summary_for_scope(&Scope::node(ScopeKind::CapabilityCentre, id.clone()))
    }

    /// Summary for a scope; the root view covers the whole forest
    pub fn summary_for_scope(&self, scope: &Scope) -> Result<ComplianceSummary, ScopeError> {
        Ok(self.counts_for_scope(scope)?.summary())
    }

    fn counts_for_scope(&self, scope: &Scope) -> Result<ComplianceCounts, ScopeError> {
        match scope {
            Scope::Root => {
                let mut counts = ComplianceCounts::default();
                for root in self.hierarchy.roots() {
                    counts += self.counts_for(root);
                }
                Ok(counts)
            }
            Scope::Node(r) => {
                let resolution = resolve(r.kind, &r.id, self.hierarchy)?;
                Ok(self.counts_for(resolution.node))
            }
        }
    }

    /// Summaries for the children listed under a scope
    pub fn children_of(&self, scope: &Scope) -> Result<Vec<ChildSummary>, ScopeError> {
        let children = match scope {
            Scope::Root => self.hierarchy.roots(),
            Scope::Node(r) => resolve(r.kind, &r.id, self.hierarchy)?.node.children(),
        };
        Ok(children
            .into_iter()
            .map(|child| ChildSummary {
                scope: child.scope(),
                summary: self.summary_for(child),
            })
            .collect())
    }

    /// Assessments in scope; the root view covers the whole forest
    pub fn assessments_in_scope(&self, scope: &Scope) -> Result<Vec<&'a Assessment>, ScopeError> {
        Ok(match scope {
            Scope::Root => self
                .hierarchy
                .roots()
                .into_iter()
                .flat_map(|root| self.assessments_under(root))
                .collect(),
            Scope::Node(r) => self.assessments_under(resolve(r.kind, &r.id, self.hierarchy)?.node),
        })
    }

    /// Counts per function, in canonical order, for assessments in scope
    ///
    /// The function comes from the catalog entry, or from the control code
    /// for controls the catalog does not list. Functions with no
    /// assessments are listed with zero counts.
    pub fn function_breakdown(
        &self,
        scope: &Scope,
        catalog: &ControlCatalog,
    ) -> Result<Vec<FunctionSummary>, ScopeError> {
        let assessments = self.assessments_in_scope(scope)?;

        let mut per_function: BTreeMap<Function, ComplianceCounts> =
            Function::CANONICAL_ORDER.into_iter().map(|f| (f, ComplianceCounts::default())).collect();
        for assessment in assessments {
            let function = match catalog.get(&assessment.control_id) {
                Some(control) => Ok(control.function),
                None => Function::of(&assessment.control_id),
            };
            match function {
                Ok(function) => per_function.entry(function).or_default().record(assessment.status),
                Err(e) => tracing::debug!(control = %assessment.control_id, error = %e, "unbucketed assessment"),
            }
        }

        Ok(per_function
            .into_iter()
            .map(|(function, counts)| FunctionSummary { function, summary: counts.summary() })
            .collect())
    }

    /// Summaries for every node, computed in one bottom-up pass
    pub fn rollup(&self) -> RollupTree {
        let mut overall = ComplianceCounts::default();
        let capability_centres = self
            .hierarchy
            .roots()
            .into_iter()
            .map(|root| {
                let (node, counts) = self.rollup_node(root);
                overall += counts;
                node
            })
            .collect();

        RollupTree {
            overall: overall.summary(),
            capability_centres,
        }
    }

    fn rollup_node(&self, node: NodeRef<'a>) -> (RollupNode, ComplianceCounts) {
        let (children, counts) = match node {
            NodeRef::System(system) => {
                let counts = summarize(
                    self.by_system
                        .get(&system.id)
                        .into_iter()
                        .flatten()
                        .map(|a| a.status),
                );
                (Vec::new(), counts)
            }
            _ => {
                let mut counts = ComplianceCounts::default();
                let children = node
                    .children()
                    .into_iter()
                    .map(|child| {
                        let (rolled, child_counts) = self.rollup_node(child);
                        counts += child_counts;
                        rolled
                    })
                    .collect();
                (children, counts)
            }
        };

        (
            RollupNode {
                scope: node.scope(),
                summary: counts.summary(),
                children,
            },
            counts,
        )
    }
}
