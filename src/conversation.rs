//! Branching conversations.
//!
//! Nodes live in an append-only arena; a node's id is its index. Branches
//! are named heads pointing into the arena, so several continuations can
//! share one history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::tokens::Message;

pub const MAIN_BRANCH: &str = "main";
const MAIN_COLOR: &str = "#4285f4";
const BRANCH_COLORS: &[&str] = &["#ea4335", "#34a853", "#fbbc04", "#673ab7", "#ff6d00"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationNode {
    pub id: NodeId,
    pub content: String,
    pub role: Role,
    pub parent_id: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: String,
    pub name: String,
    pub head_node_id: NodeId,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BranchSummary {
    pub branch_id: String,
    pub branch_name: String,
    pub messages: Vec<ConversationNode>,
    pub message_count: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawConversation")]
pub struct Conversation {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    nodes: Vec<ConversationNode>,
    branches: Vec<Branch>,
    active_branch: String,
}

/// Stored form, checked before it becomes a [`Conversation`].
#[derive(Deserialize)]
struct RawConversation {
    id: String,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    nodes: Vec<ConversationNode>,
    branches: Vec<Branch>,
    active_branch: String,
}

impl TryFrom<RawConversation> for Conversation {
    type Error = Error;

    fn try_from(raw: RawConversation) -> Result<Self> {
        let root = raw
            .nodes
            .first()
            .ok_or_else(|| Error::invalid("nodes", "must contain a root"))?;
        if root.parent_id.is_some() {
            return Err(Error::invalid("nodes", "root must not have a parent"));
        }
        for (index, node) in raw.nodes.iter().enumerate() {
            if node.id.0 != index {
                return Err(Error::invalid("nodes", format!("{} stored at index {index}", node.id)));
            }
            // Parents precede children, which also rules out cycles.
            if index > 0 && !matches!(node.parent_id, Some(p) if p.0 < index) {
                return Err(Error::invalid("nodes", format!("{} has no earlier parent", node.id)));
            }
            for child in &node.children {
                let linked = raw
                    .nodes
                    .get(child.0)
                    .is_some_and(|c| c.parent_id == Some(node.id));
                if !linked {
                    return Err(Error::invalid(
                        "nodes",
                        format!("{} lists {child} as a child", node.id),
                    ));
                }
            }
        }
        if let Some(branch) = raw.branches.iter().find(|b| b.head_node_id.0 >= raw.nodes.len()) {
            return Err(Error::invalid(
                "branches",
                format!("{} points at missing {}", branch.id, branch.head_node_id),
            ));
        }
        if !raw.branches.iter().any(|b| b.id == raw.active_branch) {
            return Err(Error::invalid(
                "active_branch",
                format!("unknown branch {}", raw.active_branch),
            ));
        }

        Ok(Self {
            id: raw.id,
            name: raw.name,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            nodes: raw.nodes,
            branches: raw.branches,
            active_branch: raw.active_branch,
        })
    }
}

impl Conversation {
    /// Start a conversation with a root user message and a `main` branch.
    pub fn new(name: Option<&str>, initial_message: Option<&str>) -> Self {
        let now = Utc::now();
        let root = ConversationNode {
            id: NodeId(0),
            content: initial_message.unwrap_or_default().to_string(),
            role: Role::User,
            parent_id: None,
            children: Vec::new(),
            timestamp: now,
        };
        Self {
            id: format!("conv_{}", Uuid::new_v4().simple()),
            name: name.unwrap_or("Untitled Conversation").to_string(),
            created_at: now,
            updated_at: now,
            nodes: vec![root],
            branches: vec![Branch {
                id: MAIN_BRANCH.to_string(),
                name: "Main".to_string(),
                head_node_id: NodeId(0),
                color: MAIN_COLOR.to_string(),
                created_at: now,
            }],
            active_branch: MAIN_BRANCH.to_string(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn nodes(&self) -> &[ConversationNode] {
        &self.nodes
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn node(&self, id: NodeId) -> Result<&ConversationNode> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| Error::not_found("node", id.to_string()))
    }

    pub fn branch(&self, id: &str) -> Result<&Branch> {
        self.branches
            .iter()
            .find(|b| b.id == id)
            .ok_or_else(|| Error::not_found("branch", id))
    }

    pub fn active_branch(&self) -> &Branch {
        // `active_branch` only ever holds ids of existing branches, checked
        // again on deserialize.
        self.branches
            .iter()
            .find(|b| b.id == self.active_branch)
            .unwrap_or(&self.branches[0])
    }

    /// Append a message under `parent` (default: the active head) and move
    /// the active branch head to it.
    pub fn add_message(
        &mut self,
        content: &str,
        role: Role,
        parent: Option<NodeId>,
    ) -> Result<NodeId> {
        let parent = match parent {
            Some(p) => self.node(p)?.id,
            None => self.active_branch().head_node_id,
        };
        let id = NodeId(self.nodes.len());
        let now = Utc::now();
        self.nodes.push(ConversationNode {
            id,
            content: content.to_string(),
            role,
            parent_id: Some(parent),
            children: Vec::new(),
            timestamp: now,
        });
        self.nodes[parent.0].children.push(id);

        let active = self.active_branch.clone();
        if let Some(branch) = self.branches.iter_mut().find(|b| b.id == active) {
            branch.head_node_id = id;
        }
        self.updated_at = now;
        Ok(id)
    }

    pub fn create_branch(&mut self, name: &str, from: NodeId) -> Result<String> {
        self.node(from)?;
        let id = format!("branch_{}", self.branches.len());
        let color = BRANCH_COLORS[self.branches.len() % BRANCH_COLORS.len()];
        self.branches.push(Branch {
            id: id.clone(),
            name: name.to_string(),
            head_node_id: from,
            color: color.to_string(),
            created_at: Utc::now(),
        });
        info!(conversation = %self.id, branch = %id, from = %from, "created branch");
        Ok(id)
    }

    pub fn switch_branch(&mut self, id: &str) -> Result<()> {
        self.branch(id)?;
        self.active_branch = id.to_string();
        Ok(())
    }

    /// Node ids from the root down to `node`.
    pub fn path_to(&self, node: NodeId) -> Result<Vec<NodeId>> {
        let mut path = Vec::new();
        let mut current = Some(self.node(node)?.id);
        while let Some(id) = current {
            path.push(id);
            current = self.nodes[id.0].parent_id;
        }
        path.reverse();
        Ok(path)
    }

    pub fn branch_messages(&self, branch_id: &str) -> Result<Vec<&ConversationNode>> {
        let head = self.branch(branch_id)?.head_node_id;
        Ok(self
            .path_to(head)?
            .into_iter()
            .map(|id| &self.nodes[id.0])
            .collect())
    }

    /// Branch history as plain messages, ready for context accounting.
    pub fn branch_context(&self, branch_id: &str) -> Result<Vec<Message>> {
        Ok(self
            .branch_messages(branch_id)?
            .into_iter()
            .map(|n| Message::new(n.role.as_str(), n.content.clone()))
            .collect())
    }

    /// Summaries for the given branches; unknown ids are skipped.
    pub fn compare_branches(&self, branch_ids: &[&str]) -> Vec<BranchSummary> {
        branch_ids
            .iter()
            .filter_map(|id| {
                let branch = self.branch(id).ok()?;
                let messages: Vec<ConversationNode> = self
                    .branch_messages(id)
                    .ok()?
                    .into_iter()
                    .cloned()
                    .collect();
                Some(BranchSummary {
                    branch_id: branch.id.clone(),
                    branch_name: branch.name.clone(),
                    message_count: messages.len(),
                    last_updated: messages.last().map(|m| m.timestamp),
                    messages,
                })
            })
            .collect()
    }

    /// Whether `node` lies on the path from the root to the branch head.
    pub fn is_node_in_branch(&self, node: NodeId, branch: &Branch) -> bool {
        let mut current = Some(branch.head_node_id);
        while let Some(id) = current {
            if id == node {
                return true;
            }
            current = self.nodes.get(id.0).and_then(|n| n.parent_id);
        }
        false
    }

    /// The first branch whose history contains `node`, used for colouring.
    pub fn branch_for_node(&self, node: NodeId) -> Option<&Branch> {
        self.branches
            .iter()
            .find(|b| self.is_node_in_branch(node, b))
    }
}
