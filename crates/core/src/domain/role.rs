use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{CoreError, Result};

/// A named persona with an instruction template and the capability tags it
/// accepts. Immutable once a run has started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRole {
    /// Role name, e.g. "Architect". Unique (case-insensitive) within a set.
    pub name: String,
    /// Display name of the team member playing the role.
    #[serde(default)]
    pub member: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub objectives: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Prompt template. See the orchestrator's prompt module for placeholders.
    #[serde(default)]
    pub instructions: Option<String>,
}

impl AgentRole {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            member: None,
            description: String::new(),
            objectives: Vec::new(),
            tools: Vec::new(),
            tags: Vec::new(),
            instructions: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_instructions(mut self, template: impl Into<String>) -> Self {
        self.instructions = Some(template.into());
        self
    }

    /// Lowercased capability tags. A role without explicit tags accepts its
    /// own name.
    pub fn capability_tags(&self) -> Vec<String> {
        let tags: Vec<String> = self
            .tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        if tags.is_empty() {
            vec![self.name.trim().to_lowercase()]
        } else {
            tags
        }
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.trim().eq_ignore_ascii_case(name.trim())
    }
}

/// Entry of a team file: `role` is the role name, `name` the member.
#[derive(Deserialize)]
struct TeamMember {
    role: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    objectives: Vec<String>,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    instructions: Option<String>,
}

impl From<TeamMember> for AgentRole {
    fn from(member: TeamMember) -> Self {
        Self {
            name: member.role,
            member: member.name,
            description: member.description,
            objectives: member.objectives,
            tools: member.tools,
            tags: member.tags,
            instructions: member.instructions,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RoleDocument {
    Wrapped { roles: Vec<AgentRole> },
    Team(Vec<TeamMember>),
    Bare(Vec<AgentRole>),
}

impl RoleDocument {
    fn into_roles(self) -> Vec<AgentRole> {
        match self {
            RoleDocument::Wrapped { roles } => roles,
            RoleDocument::Team(members) => members.into_iter().map(AgentRole::from).collect(),
            RoleDocument::Bare(roles) => roles,
        }
    }
}

/// Ordered, validated set of roles for one run.
///
/// Configuration order is significant: when several roles match a task the
/// first one listed wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RoleSet {
    roles: Vec<AgentRole>,
}

impl RoleSet {
    pub fn new(roles: Vec<AgentRole>) -> Result<Self> {
        if roles.is_empty() {
            return Err(CoreError::Validation(
                "role set must contain at least one role".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for role in &roles {
            let key = role.name.trim().to_lowercase();
            if key.is_empty() {
                return Err(CoreError::Validation("role name must not be empty".to_string()));
            }
            if !seen.insert(key) {
                return Err(CoreError::DuplicateRole(role.name.clone()));
            }
        }

        Ok(Self { roles })
    }

    /// Parse `[[roles]]` tables.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let doc: RoleDocument =
            toml::from_str(content).map_err(|e| CoreError::RoleFormat(e.to_string()))?;
        Self::new(doc.into_roles())
    }

    /// Parse `{"roles": [...]}`, a team file (array of `{role, name, ...}`)
    /// or a bare array of roles.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let doc: RoleDocument =
            serde_json::from_str(content).map_err(|e| CoreError::RoleFormat(e.to_string()))?;
        Self::new(doc.into_roles())
    }

    pub fn get(&self, name: &str) -> Option<&AgentRole> {
        self.roles.iter().find(|r| r.is_named(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentRole> {
        self.roles.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
