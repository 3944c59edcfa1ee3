use crate::error::{Result, RoomSonicError};
use crate::math::{Mat4, Quat, Vec3};
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Local transform of a scene node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            scale: Vec3::ONE,
        }
    }

    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Local +Z rotated into the parent frame.
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Receives world matrices as the graph recomputes them.
pub trait WorldMatrixHook {
    /// Called once for every hooked node whose world matrix was just recomputed.
    fn world_matrix_updated(&mut self, node: NodeId, world: &Mat4);
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    id: NodeId,
    pub name: String,
    local: Transform,
    world_matrix: Mat4,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    dirty: bool,
}

impl SceneNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn local_transform(&self) -> &Transform {
        &self.local
    }

    /// World matrix as of the last recomputation.
    pub fn world_matrix(&self) -> Mat4 {
        self.world_matrix
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// A minimal transform hierarchy with cached world matrices.
///
/// Changing a node's local transform marks it dirty; the next
/// [`update_world_matrices`](Self::update_world_matrices) recomputes the dirty
/// subtrees and reports every hooked node it touched.
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: HashMap<NodeId, SceneNode>,
    roots: Vec<NodeId>,
    hooked: HashSet<NodeId>,
    next_id: u64,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: impl Into<String>) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.nodes.insert(
            id,
            SceneNode {
                id,
                name: name.into(),
                local: Transform::IDENTITY,
                world_matrix: Mat4::IDENTITY,
                parent: None,
                children: Vec::new(),
                dirty: true,
            },
        );
        self.roots.push(id);
        id
    }

    pub fn add_child(&mut self, parent: NodeId, name: impl Into<String>) -> Result<NodeId> {
        if !self.nodes.contains_key(&parent) {
            return Err(RoomSonicError::UnknownNode(parent));
        }
        let id = self.add_node(name);
        self.set_parent(id, Some(parent))?;
        Ok(id)
    }

    /// Removes a node, unregisters its hook and turns its children into roots.
    pub fn remove_node(&mut self, id: NodeId) -> Result<SceneNode> {
        let node = self
            .nodes
            .remove(&id)
            .ok_or(RoomSonicError::UnknownNode(id))?;
        self.hooked.remove(&id);

        if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|c| *c != id);
        }
        self.roots.retain(|r| *r != id);

        for child in &node.children {
            if let Some(child_node) = self.nodes.get_mut(child) {
                child_node.parent = None;
                child_node.dirty = true;
                self.roots.push(*child);
            }
        }
        Ok(node)
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn world_matrix(&self, id: NodeId) -> Option<Mat4> {
        self.nodes.get(&id).map(|n| n.world_matrix)
    }

    pub fn set_local_transform(&mut self, id: NodeId, transform: Transform) -> Result<()> {
        let node = self.node_mut(id)?;
        node.local = transform;
        node.dirty = true;
        Ok(())
    }

    pub fn set_position(&mut self, id: NodeId, position: Vec3) -> Result<()> {
        let node = self.node_mut(id)?;
        node.local.position = position;
        node.dirty = true;
        Ok(())
    }

    pub fn set_rotation(&mut self, id: NodeId, rotation: Quat) -> Result<()> {
        let node = self.node_mut(id)?;
        node.local.rotation = rotation;
        node.dirty = true;
        Ok(())
    }

    /// Re-parents `child`; `None` makes it a root.
    pub fn set_parent(&mut self, child: NodeId, parent: Option<NodeId>) -> Result<()> {
        if !self.nodes.contains_key(&child) {
            return Err(RoomSonicError::UnknownNode(child));
        }
        if let Some(parent) = parent {
            if !self.nodes.contains_key(&parent) {
                return Err(RoomSonicError::UnknownNode(parent));
            }
            if parent == child || self.is_ancestor(child, parent) {
                return Err(RoomSonicError::Scene(format!(
                    "Parenting {} under {} would create a cycle",
                    child, parent
                )));
            }
        }

        let old_parent = self.nodes.get(&child).and_then(|n| n.parent);
        if let Some(old) = old_parent.and_then(|p| self.nodes.get_mut(&p)) {
            old.children.retain(|c| *c != child);
        }
        self.roots.retain(|r| *r != child);

        match parent.and_then(|p| self.nodes.get_mut(&p)) {
            Some(parent_node) => parent_node.children.push(child),
            None => self.roots.push(child),
        }

        let node = self.node_mut(child)?;
        node.parent = parent;
        node.dirty = true;
        Ok(())
    }

    /// True when `ancestor` is on the parent chain of `node`.
    fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.nodes.get(&node).and_then(|n| n.parent);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    pub fn register_hook(&mut self, id: NodeId) -> Result<()> {
        if !self.nodes.contains_key(&id) {
            return Err(RoomSonicError::UnknownNode(id));
        }
        self.hooked.insert(id);
        Ok(())
    }

    /// Returns false when the node had no hook.
    pub fn unregister_hook(&mut self, id: NodeId) -> bool {
        self.hooked.remove(&id)
    }

    pub fn is_hooked(&self, id: NodeId) -> bool {
        self.hooked.contains(&id)
    }

    /// Recomputes the world matrix of every dirty node and its descendants.
    ///
    /// Returns the number of nodes recomputed.
    pub fn update_world_matrices(&mut self, hook: &mut dyn WorldMatrixHook) -> usize {
        let mut stack: Vec<(NodeId, Mat4, bool)> = self
            .roots
            .iter()
            .rev()
            .map(|&root| (root, Mat4::IDENTITY, false))
            .collect();
        let mut recomputed = 0;

        while let Some((id, parent_world, parent_changed)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };

            let changed = parent_changed || node.dirty;
            if changed {
                node.world_matrix = parent_world * node.local.local_matrix();
                node.dirty = false;
                recomputed += 1;
                if self.hooked.contains(&id) {
                    hook.world_matrix_updated(id, &node.world_matrix);
                }
            }

            let world = node.world_matrix;
            stack.extend(node.children.iter().rev().map(|&c| (c, world, changed)));
        }
        recomputed
    }

    /// Recomputes one node and its descendants right away, for hosts that move
    /// objects while no frame is being rendered.
    pub fn force_update(&mut self, id: NodeId, hook: &mut dyn WorldMatrixHook) -> Result<()> {
        if !self.nodes.contains_key(&id) {
            return Err(RoomSonicError::UnknownNode(id));
        }

        // walk up the parent chain from the local transforms, the cached
        // matrices of dirty ancestors are stale
        let mut parent_world = Mat4::IDENTITY;
        let mut chain = Vec::new();
        let mut current = self.nodes.get(&id).and_then(|n| n.parent);
        while let Some(ancestor) = current {
            chain.push(ancestor);
            current = self.nodes.get(&ancestor).and_then(|n| n.parent);
        }
        for ancestor in chain.iter().rev() {
            if let Some(node) = self.nodes.get(ancestor) {
                parent_world *= node.local.local_matrix();
            }
        }

        let mut stack = vec![(id, parent_world)];
        while let Some((node_id, parent_world)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&node_id) else {
                continue;
            };
            node.world_matrix = parent_world * node.local.local_matrix();
            node.dirty = false;
            if self.hooked.contains(&node_id) {
                hook.world_matrix_updated(node_id, &node.world_matrix);
            }
            let world = node.world_matrix;
            stack.extend(node.children.iter().map(|&c| (c, world)));
        }
        Ok(())
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut SceneNode> {
        self.nodes
            .get_mut(&id)
            .ok_or(RoomSonicError::UnknownNode(id))
    }
}
