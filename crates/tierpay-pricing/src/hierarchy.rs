use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tierpay_core::{Capabilities, NodeId, NodeStatus, PlanId, Role};

use crate::error::PricingError;

/// A user acting as one tier of the reseller hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub id: NodeId,
    pub role: Role,
    /// Back-reference to the parent tier. Never owns the parent.
    #[serde(default)]
    pub parent: Option<NodeId>,
    #[serde(default)]
    pub status: NodeStatus,
    /// Explicit plan; `None` means the default plan for the role.
    #[serde(default)]
    pub plan_id: Option<PlanId>,
    #[serde(default)]
    pub capabilities: Capabilities,
}

impl HierarchyNode {
    pub fn new(id: impl Into<NodeId>, role: Role, parent: Option<NodeId>) -> Self {
        Self {
            id: id.into(),
            role,
            parent,
            status: NodeStatus::Active,
            plan_id: None,
            capabilities: Capabilities::NONE,
        }
    }

    pub fn with_plan(mut self, plan: impl Into<PlanId>) -> Self {
        self.plan_id = Some(plan.into());
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Arena of hierarchy nodes.
///
/// Parent links are kept both as ids (on the node) and as arena indices, so
/// ancestor walks never chase references and are bounded by the number of roles.
#[derive(Debug, Clone, Default)]
pub struct HierarchyTable {
    nodes: Vec<HierarchyNode>,
    parents: Vec<Option<usize>>,
    index: HashMap<NodeId, usize>,
}

impl HierarchyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HierarchyNode> {
        self.nodes.iter()
    }

    pub fn get(&self, id: &NodeId) -> Option<&HierarchyNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn require(&self, id: &NodeId) -> Result<&HierarchyNode, PricingError> {
        self.get(id).ok_or_else(|| PricingError::UnknownNode(id.clone()))
    }

    fn require_index(&self, id: &NodeId) -> Result<usize, PricingError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| PricingError::UnknownNode(id.clone()))
    }

    /// Add a node. Platform nodes are roots; every other role needs an
    /// existing parent of strictly smaller rank.
    pub fn register(&mut self, node: HierarchyNode) -> Result<(), PricingError> {
        if self.index.contains_key(&node.id) {
            return Err(PricingError::DuplicateNode(node.id));
        }

        let parent_idx = match (&node.parent, node.role) {
            (None, Role::Platform) => None,
            (Some(_), Role::Platform) => {
                return Err(PricingError::HierarchyViolation(format!(
                    "platform node {} cannot have a parent",
                    node.id
                )));
            }
            (None, role) => {
                return Err(PricingError::HierarchyViolation(format!(
                    "{role} node {} needs a parent",
                    node.id
                )));
            }
            (Some(parent), role) => {
                let idx = self.require_index(parent)?;
                let parent_role = self.nodes[idx].role;
                if !parent_role.can_parent(role) {
                    return Err(PricingError::HierarchyViolation(format!(
                        "{parent_role} {parent} cannot parent {role} {}",
                        node.id
                    )));
                }
                Some(idx)
            }
        };

        tracing::debug!(node = %node.id, role = %node.role, "registered hierarchy node");
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        self.parents.push(parent_idx);
        Ok(())
    }

    /// Move a node under a new parent, rejecting rank violations and cycles.
    pub fn reparent(&mut self, id: &NodeId, new_parent: &NodeId) -> Result<(), PricingError> {
        let idx = self.require_index(id)?;
        let parent_idx = self.require_index(new_parent)?;

        if idx == parent_idx || self.is_descendant(id, new_parent)? {
            return Err(PricingError::HierarchyViolation(format!(
                "moving {id} under {new_parent} would create a cycle"
            )));
        }
        let role = self.nodes[idx].role;
        let parent_role = self.nodes[parent_idx].role;
        if !parent_role.can_parent(role) {
            return Err(PricingError::HierarchyViolation(format!(
                "{parent_role} {new_parent} cannot parent {role} {id}"
            )));
        }

        self.nodes[idx].parent = Some(new_parent.clone());
        self.parents[idx] = Some(parent_idx);
        tracing::info!(node = %id, parent = %new_parent, "node reparented");
        Ok(())
    }

    pub(crate) fn get_mut(&mut self, id: &NodeId) -> Result<&mut HierarchyNode, PricingError> {
        let idx = self.require_index(id)?;
        Ok(&mut self.nodes[idx])
    }

    /// The chain from `id` up to its root, inclusive on both ends.
    pub fn ancestors(&self, id: &NodeId) -> Result<Vec<&HierarchyNode>, PricingError> {
        let mut current = Some(self.require_index(id)?);
        let mut chain = Vec::with_capacity(Role::COUNT);

        while let Some(idx) = current {
            if chain.len() == Role::COUNT {
                return Err(PricingError::HierarchyViolation(format!(
                    "ancestor chain of {id} exceeds {} tiers",
                    Role::COUNT
                )));
            }
            chain.push(&self.nodes[idx]);
            current = self.parents[idx];
        }

        Ok(chain)
    }

    /// Whether `node` sits strictly below `ancestor`.
    pub fn is_descendant(&self, ancestor: &NodeId, node: &NodeId) -> Result<bool, PricingError> {
        self.require_index(ancestor)?;
        let chain = self.ancestors(node)?;
        Ok(chain.iter().skip(1).any(|n| &n.id == ancestor))
    }

    pub fn root_of(&self, id: &NodeId) -> Result<&HierarchyNode, PricingError> {
        let chain = self.ancestors(id)?;
        chain
            .last()
            .copied()
            .ok_or_else(|| PricingError::UnknownNode(id.clone()))
    }

    pub fn children(&self, id: &NodeId) -> Vec<&HierarchyNode> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        self.parents
            .iter()
            .enumerate()
            .filter(|(_, p)| **p == Some(idx))
            .map(|(i, _)| &self.nodes[i])
            .collect()
    }
}
