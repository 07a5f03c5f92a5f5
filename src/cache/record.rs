//! Cached record types and pending writes.
//!
//! Payloads are opaque to the cache apart from the two fields it needs:
//! a conversation's project (for project-scoped clears) and its history
//! list (for in-memory memory appends).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

use crate::cache::key::{CacheKey, Namespace};

/// One message appended to a conversation's memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: Uuid,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    /// Set once a flush containing this entry has been persisted.
    #[serde(default)]
    pub applied: bool,
}

impl MemoryEntry {
    pub fn new(
        conversation_id: impl Into<String>,
        role: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id: conversation_id.into(),
            role: role.into(),
            content: content.into(),
            applied: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    /// Owning project, if the conversation belongs to one.
    pub project_id: Option<String>,
    #[serde(default)]
    pub history: Vec<MemoryEntry>,
    #[serde(default)]
    pub data: Value,
}

impl ConversationRecord {
    pub fn new(id: impl Into<String>, project_id: Option<String>) -> Self {
        Self {
            id: id.into(),
            project_id,
            history: Vec::new(),
            data: Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    #[serde(default)]
    pub data: Value,
}

impl ProjectRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: Value::Null,
        }
    }
}

/// A derived snapshot of what an agent knows about a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    pub agent_id: String,
    pub project_id: String,
    #[serde(default)]
    pub data: Value,
}

impl AgentContext {
    /// The default context returned on a miss.
    pub fn empty(agent_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            project_id: project_id.into(),
            data: Value::Object(Default::default()),
        }
    }
}

/// A cached value, one variant per namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Conversation(ConversationRecord),
    Project(ProjectRecord),
    AgentContext(AgentContext),
}

impl Payload {
    pub fn namespace(&self) -> Namespace {
        match self {
            Payload::Conversation(_) => Namespace::Conversation,
            Payload::Project(_) => Namespace::Project,
            Payload::AgentContext(_) => Namespace::AgentContext,
        }
    }

    /// The key this payload is naturally cached under.
    pub fn key(&self) -> CacheKey {
        match self {
            Payload::Conversation(c) => CacheKey::conversation(&c.id),
            Payload::Project(p) => CacheKey::project(&p.id),
            Payload::AgentContext(a) => CacheKey::agent_context(&a.agent_id, &a.project_id),
        }
    }

    pub fn as_conversation(&self) -> Option<&ConversationRecord> {
        match self {
            Payload::Conversation(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_conversation_mut(&mut self) -> Option<&mut ConversationRecord> {
        match self {
            Payload::Conversation(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_conversation(self) -> Option<ConversationRecord> {
        match self {
            Payload::Conversation(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_project(self) -> Option<ProjectRecord> {
        match self {
            Payload::Project(p) => Some(p),
            _ => None,
        }
    }

    pub fn into_agent_context(self) -> Option<AgentContext> {
        match self {
            Payload::AgentContext(a) => Some(a),
            _ => None,
        }
    }
}

/// A live cache entry. Recency is tracked separately by the access tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub payload: Payload,
    /// Set once a write for this key has been persisted.
    pub applied: bool,
}

impl CacheEntry {
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            applied: false,
        }
    }
}

/// What a pending write carries to the persistent store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WriteBody {
    Record(Payload),
    Memory(MemoryEntry),
}

/// A queued write awaiting a batch flush.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub id: Uuid,
    pub key: CacheKey,
    pub body: WriteBody,
    pub enqueued_at: Instant,
}

impl PendingWrite {
    pub fn record(payload: Payload) -> Self {
        Self::with_key(payload.key(), WriteBody::Record(payload))
    }

    pub fn memory(entry: MemoryEntry) -> Self {
        let key = CacheKey::conversation(&entry.conversation_id);
        Self::with_key(key, WriteBody::Memory(entry))
    }

    pub fn with_key(key: CacheKey, body: WriteBody) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            body,
            enqueued_at: Instant::now(),
        }
    }
}
