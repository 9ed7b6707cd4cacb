//! Network topology tracking.
//!
//! The network is a spanning tree rooted at this server. Every other node
//! records the direct connection it is reached through, so routing a line
//! toward any server is a single lookup and a split is a subtree removal.

use std::collections::HashMap;

use slirc_wire::casemap::irc_to_lower;
use slirc_wire::wildcard_match;
use thiserror::Error;

use super::link::ConnId;

/// Arena index of a server node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// A server in the tree.
#[derive(Debug, Clone)]
pub struct ServerNode {
    pub name: String,
    pub description: String,
    pub version: String,
    pub user_count: usize,
    /// Next time a PING is owed to this peer. Direct peers only.
    pub ping_due: i64,
    pub ping_answered: bool,
    pub missed_pings: u8,
    /// Route toward this server. `None` only for the root.
    pub conn: Option<ConnId>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl ServerNode {
    fn new(name: &str, description: &str, conn: Option<ConnId>, parent: Option<NodeId>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            version: String::new(),
            user_count: 0,
            ping_due: 0,
            ping_answered: true,
            missed_pings: 0,
            conn,
            parent,
            children: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("server {name} already exists on server {parent}")]
    Duplicate { name: String, parent: String },
    #[error("parent node does not exist")]
    UnknownParent,
}

/// Spanning tree of every server currently linked.
#[derive(Debug, Clone)]
pub struct Topology {
    nodes: HashMap<NodeId, ServerNode>,
    by_name: HashMap<String, NodeId>,
    root: NodeId,
    next_id: usize,
}

impl Topology {
    /// A tree holding only this server.
    pub fn new(name: &str, description: &str, version: &str) -> Self {
        let root = NodeId(0);
        let mut node = ServerNode::new(name, description, None, None);
        node.version = version.to_string();
        let mut nodes = HashMap::new();
        nodes.insert(root, node);
        let mut by_name = HashMap::new();
        by_name.insert(irc_to_lower(name), root);
        Self {
            nodes,
            by_name,
            root,
            next_id: 1,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&ServerNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut ServerNode> {
        self.nodes.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Attach a new server below `parent`, reached through `conn`.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: &str,
        description: &str,
        conn: ConnId,
    ) -> Result<NodeId, TopologyError> {
        if let Some(existing) = self.find_by_name(name) {
            let parent = self
                .get(existing)
                .and_then(|n| n.parent)
                .and_then(|p| self.get(p))
                .map(|p| p.name.clone())
                .unwrap_or_default();
            return Err(TopologyError::Duplicate {
                name: name.to_string(),
                parent,
            });
        }
        if !self.nodes.contains_key(&parent) {
            return Err(TopologyError::UnknownParent);
        }

        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes
            .insert(id, ServerNode::new(name, description, Some(conn), Some(parent)));
        self.by_name.insert(irc_to_lower(name), id);
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.push(id);
        }
        Ok(id)
    }

    /// Detach `id` and everything below it, children before parents.
    ///
    /// The root cannot be removed; asking for it returns nothing.
    pub fn remove_subtree(&mut self, id: NodeId) -> Vec<ServerNode> {
        if id == self.root || !self.nodes.contains_key(&id) {
            return Vec::new();
        }
        let order = self.post_order(id);

        if let Some(parent) = self.nodes.get(&id).and_then(|n| n.parent)
            && let Some(p) = self.nodes.get_mut(&parent)
        {
            p.children.retain(|c| *c != id);
        }

        let mut removed = Vec::with_capacity(order.len());
        for node_id in order {
            if let Some(node) = self.nodes.remove(&node_id) {
                self.by_name.remove(&irc_to_lower(&node.name));
                removed.push(node);
            }
        }
        removed
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(&irc_to_lower(name)).copied()
    }

    /// Exact name first, then the first glob match in tree order.
    pub fn find_by_mask(&self, mask: &str) -> Option<NodeId> {
        if let Some(id) = self.find_by_name(mask) {
            return Some(id);
        }
        self.walk()
            .into_iter()
            .map(|(id, _)| id)
            .find(|id| self.get(*id).is_some_and(|n| wildcard_match(mask, &n.name)))
    }

    /// The direct connection leading toward `name`.
    pub fn best_route_to(&self, name: &str) -> Option<ConnId> {
        self.find_by_name(name)
            .and_then(|id| self.get(id))
            .and_then(|n| n.conn)
    }

    /// Distance from the root.
    pub fn hops(&self, id: NodeId) -> usize {
        let mut hops = 0;
        let mut cursor = self.get(id).and_then(|n| n.parent);
        while let Some(p) = cursor {
            hops += 1;
            cursor = self.get(p).and_then(|n| n.parent);
        }
        hops
    }

    /// Nodes directly attached to us.
    pub fn direct_peers(&self) -> Vec<NodeId> {
        self.get(self.root)
            .map(|r| r.children.clone())
            .unwrap_or_default()
    }

    /// Node below the root whose connection owns `conn`.
    pub fn peer_for_conn(&self, conn: ConnId) -> Option<NodeId> {
        self.direct_peers()
            .into_iter()
            .find(|id| self.get(*id).is_some_and(|n| n.conn == Some(conn)))
    }

    /// Every node below `id`, excluding `id` itself, pre-order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self
            .get(id)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Some(node) = self.get(next) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// `id` and its subtree, children before parents.
    pub fn post_order(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![(id, false)];
        while let Some((next, expanded)) = stack.pop() {
            if expanded {
                out.push(next);
                continue;
            }
            stack.push((next, true));
            if let Some(node) = self.get(next) {
                stack.extend(node.children.iter().rev().map(|c| (*c, false)));
            }
        }
        out
    }

    /// Whole tree pre-order from the root, with depth.
    pub fn walk(&self) -> Vec<(NodeId, usize)> {
        let mut out = Vec::new();
        let mut stack = vec![(self.root, 0)];
        while let Some((id, depth)) = stack.pop() {
            out.push((id, depth));
            if let Some(node) = self.get(id) {
                stack.extend(node.children.iter().rev().map(|c| (*c, depth + 1)));
            }
        }
        out
    }

    /// Total users over all nodes.
    pub fn user_total(&self) -> usize {
        self.nodes.values().map(|n| n.user_count).sum()
    }

    /// Check the structural guarantees: one root, unique names, every
    /// non-root node reachable with a route equal to its top-level ancestor's.
    pub fn check_invariants(&self) -> Result<(), String> {
        let walked = self.walk();
        if walked.len() != self.nodes.len() {
            return Err(format!(
                "{} nodes stored but {} reachable from the root",
                self.nodes.len(),
                walked.len()
            ));
        }
        if self.by_name.len() != self.nodes.len() {
            return Err("name index out of step with nodes".into());
        }
        for (id, depth) in walked {
            let Some(node) = self.get(id) else {
                return Err(format!("dangling child {id:?}"));
            };
            if id == self.root {
                if node.conn.is_some() || node.parent.is_some() {
                    return Err("root has a route or parent".into());
                }
                continue;
            }
            let Some(conn) = node.conn else {
                return Err(format!("{} has no route", node.name));
            };
            let mut top = id;
            while let Some(p) = self.get(top).and_then(|n| n.parent) {
                if p == self.root {
                    break;
                }
                top = p;
            }
            if self.get(top).and_then(|n| n.conn) != Some(conn) {
                return Err(format!("{} routes differently from its top-level ancestor", node.name));
            }
            if self.hops(id) != depth {
                return Err(format!("{} depth mismatch", node.name));
            }
        }
        Ok(())
    }
}
