use super::{NodeId, SceneGraph};
use crate::emitter::EmitterId;
use crate::error::Result;
use std::collections::HashMap;

/// What a bound node drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingTarget {
    Emitter(EmitterId),
    Listener,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingState {
    #[default]
    Detached,
    Attached,
}

/// Couples a scene node to an engine object through the node's world-matrix hook.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneBinding {
    node: NodeId,
    target: BindingTarget,
    state: BindingState,
}

impl SceneBinding {
    pub fn new(node: NodeId, target: BindingTarget) -> Self {
        Self {
            node,
            target,
            state: BindingState::Detached,
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn target(&self) -> BindingTarget {
        self.target
    }

    pub fn state(&self) -> BindingState {
        self.state
    }

    pub fn is_attached(&self) -> bool {
        self.state == BindingState::Attached
    }

    /// Registers the hook on the node.
    pub fn attach(&mut self, graph: &mut SceneGraph) -> Result<()> {
        graph.register_hook(self.node)?;
        self.state = BindingState::Attached;
        Ok(())
    }

    /// Unregisters the hook; later updates for this node are dropped.
    pub fn detach(&mut self, graph: &mut SceneGraph) {
        graph.unregister_hook(self.node);
        self.state = BindingState::Detached;
    }
}

/// The bindings owned by one engine, keyed by node.
#[derive(Debug, Default)]
pub struct SceneBindings {
    by_node: HashMap<NodeId, SceneBinding>,
}

impl SceneBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `node` to `target`, replacing any earlier binding of the node.
    pub fn attach(
        &mut self,
        graph: &mut SceneGraph,
        node: NodeId,
        target: BindingTarget,
    ) -> Result<()> {
        let mut binding = SceneBinding::new(node, target);
        binding.attach(graph)?;
        if let Some(previous) = self.by_node.insert(node, binding) {
            log::debug!(
                "{} rebound from {:?} to {:?}",
                node,
                previous.target(),
                target
            );
        }
        Ok(())
    }

    pub fn detach(&mut self, graph: &mut SceneGraph, node: NodeId) -> Option<SceneBinding> {
        let mut binding = self.by_node.remove(&node)?;
        binding.detach(graph);
        Some(binding)
    }

    /// Drops every binding driving `target` without touching the graph and
    /// returns the nodes whose hooks are still registered there.
    pub fn forget_target(&mut self, target: BindingTarget) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .by_node
            .values()
            .filter(|b| b.target() == target)
            .map(SceneBinding::node)
            .collect();
        nodes.sort_by_key(|node| node.0);
        for node in &nodes {
            self.by_node.remove(node);
        }
        nodes
    }

    /// Detaches every binding driving `target`, unregistering their hooks.
    pub fn detach_target(&mut self, graph: &mut SceneGraph, target: BindingTarget) -> usize {
        let nodes = self.forget_target(target);
        for &node in &nodes {
            graph.unregister_hook(node);
        }
        nodes.len()
    }

    /// The attached target of `node`, if any.
    pub fn target_of(&self, node: NodeId) -> Option<BindingTarget> {
        self.by_node
            .get(&node)
            .filter(|b| b.is_attached())
            .map(SceneBinding::target)
    }

    pub fn get(&self, node: NodeId) -> Option<&SceneBinding> {
        self.by_node.get(&node)
    }

    pub fn len(&self) -> usize {
        self.by_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }
}
