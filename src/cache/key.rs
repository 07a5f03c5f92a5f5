//! Namespace and key types.
//!
//! A [`CacheKey`] carries its namespace as the enum variant, so the same
//! identifier cached under two namespaces never collides and eviction can
//! route a key back to its map without parsing.

use serde::{Deserialize, Serialize};

/// A logical partition of cached records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// Conversation records.
    Conversation,
    /// Per-project records.
    Project,
    /// Derived agent-context snapshots.
    AgentContext,
}

impl Namespace {
    /// Every namespace, in map order.
    pub const ALL: [Namespace; 3] = [
        Namespace::Conversation,
        Namespace::Project,
        Namespace::AgentContext,
    ];

    /// Stable lowercase name, used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Conversation => "conversation",
            Namespace::Project => "project",
            Namespace::AgentContext => "agent_context",
        }
    }

    /// Map index within the store.
    pub(crate) fn index(&self) -> usize {
        match self {
            Namespace::Conversation => 0,
            Namespace::Project => 1,
            Namespace::AgentContext => 2,
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies a cached record: namespace tag plus identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "namespace", rename_all = "snake_case")]
pub enum CacheKey {
    Conversation { id: String },
    Project { id: String },
    /// Agent contexts are keyed by the (agent, project) pair.
    AgentContext { agent_id: String, project_id: String },
}

impl CacheKey {
    pub fn conversation(id: impl Into<String>) -> Self {
        CacheKey::Conversation { id: id.into() }
    }

    pub fn project(id: impl Into<String>) -> Self {
        CacheKey::Project { id: id.into() }
    }

    pub fn agent_context(agent_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        CacheKey::AgentContext {
            agent_id: agent_id.into(),
            project_id: project_id.into(),
        }
    }

    pub fn namespace(&self) -> Namespace {
        match self {
            CacheKey::Conversation { .. } => Namespace::Conversation,
            CacheKey::Project { .. } => Namespace::Project,
            CacheKey::AgentContext { .. } => Namespace::AgentContext,
        }
    }

    /// The project this key is scoped to, if the key itself names one.
    pub fn project_id(&self) -> Option<&str> {
        match self {
            CacheKey::Project { id } => Some(id),
            CacheKey::AgentContext { project_id, .. } => Some(project_id),
            CacheKey::Conversation { .. } => None,
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Conversation { id } => write!(f, "conversation:{id}"),
            CacheKey::Project { id } => write!(f, "project:{id}"),
            CacheKey::AgentContext {
                agent_id,
                project_id,
            } => write!(f, "agent_context:{agent_id}:{project_id}"),
        }
    }
}
