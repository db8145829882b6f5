//! Coordinates for drawing a conversation tree.

use serde::Serialize;

use crate::conversation::{Conversation, NodeId, Role};

const DEFAULT_COLOR: &str = "#4285f4";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LayoutConfig {
    pub node_width: f64,
    pub node_height: f64,
    pub horizontal_gap: f64,
    pub vertical_gap: f64,
    pub origin_x: f64,
    pub origin_y: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_width: 180.0,
            node_height: 60.0,
            horizontal_gap: 220.0,
            vertical_gap: 100.0,
            origin_x: 50.0,
            origin_y: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutNode {
    pub id: NodeId,
    pub role: Role,
    pub color: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub children: Vec<LayoutNode>,
}

/// A parent-to-child edge, bottom centre of the parent to top centre of the child.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Connection {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl LayoutNode {
    /// Pre-order walk over this node and its descendants.
    pub fn walk(&self) -> Vec<&LayoutNode> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }
}

/// Lay out the whole conversation from its root.
///
/// Each subtree owns a horizontal span `leaves * horizontal_gap` wide and
/// siblings' spans are laid side by side, so siblings never share an x. A
/// parent with several children sits over the midpoint of its first and
/// last child; a parent with one child keeps the left edge of its span.
pub fn layout(conversation: &Conversation, config: &LayoutConfig) -> LayoutNode {
    place(conversation, conversation.root(), config.origin_x, 0, config).0
}

fn place(
    conversation: &Conversation,
    id: NodeId,
    x_offset: f64,
    depth: usize,
    config: &LayoutConfig,
) -> (LayoutNode, f64) {
    let node = &conversation.nodes()[id.0];
    let color = conversation
        .branch_for_node(id)
        .map_or(DEFAULT_COLOR, |b| b.color.as_str())
        .to_string();

    let mut children = Vec::with_capacity(node.children.len());
    let mut next_x = x_offset;
    // Children always come later in the arena; anything else would be a cycle.
    for &child in node.children.iter().filter(|c| c.0 > id.0) {
        let (placed, after) = place(conversation, child, next_x, depth + 1, config);
        children.push(placed);
        next_x = after;
    }

    let x = match (children.first(), children.last()) {
        (Some(first), Some(last)) if children.len() > 1 => (first.x + last.x) / 2.0,
        _ => x_offset,
    };

    let laid = LayoutNode {
        id,
        role: node.role,
        color,
        x,
        y: config.origin_y + depth as f64 * config.vertical_gap,
        width: config.node_width,
        height: config.node_height,
        children,
    };
    (laid, next_x.max(x_offset + config.horizontal_gap))
}

pub fn connections(root: &LayoutNode) -> Vec<Connection> {
    root.walk()
        .into_iter()
        .flat_map(|parent| {
            parent.children.iter().map(move |child| Connection {
                x1: parent.x + parent.width / 2.0,
                y1: parent.y + parent.height,
                x2: child.x + child.width / 2.0,
                y2: child.y,
            })
        })
        .collect()
}

pub fn bounds(root: &LayoutNode) -> Bounds {
    root.walk().into_iter().fold(
        Bounds {
            min_x: root.x,
            min_y: root.y,
            max_x: root.x + root.width,
            max_y: root.y + root.height,
        },
        |b, n| Bounds {
            min_x: b.min_x.min(n.x),
            min_y: b.min_y.min(n.y),
            max_x: b.max_x.max(n.x + n.width),
            max_y: b.max_y.max(n.y + n.height),
        },
    )
}
