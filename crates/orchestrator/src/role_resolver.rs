//! Maps a task to exactly one configured role.
//!
//! An explicit `role_hint` is authoritative: it has to name a role or one of
//! its tags, and task content is not consulted. Without a hint the task's
//! title and description are matched against every role's capability tags.
//! Either way the first match in configured role order wins.

use sowcrew_core::{AgentRole, RoleSet, Task};

use crate::error::UnresolvedRoleError;

pub struct RoleResolver;

impl RoleResolver {
    pub fn resolve<'a>(task: &Task, roles: &'a RoleSet) -> Result<&'a AgentRole, UnresolvedRoleError> {
        match task.role_hint.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
            Some(hint) => roles
                .iter()
                .find(|role| Self::accepts_hint(role, hint))
                .ok_or_else(|| UnresolvedRoleError::UnknownHint {
                    task_id: task.id.clone(),
                    hint: hint.to_string(),
                }),
            None => {
                let words = normalize(&task.content());
                roles
                    .iter()
                    .find(|role| Self::matches_content(role, &words))
                    .ok_or_else(|| UnresolvedRoleError::NoMatch {
                        task_id: task.id.clone(),
                    })
            }
        }
    }

    fn accepts_hint(role: &AgentRole, hint: &str) -> bool {
        role.is_named(hint)
            || role
                .capability_tags()
                .iter()
                .any(|tag| tag.eq_ignore_ascii_case(hint))
    }

    fn matches_content(role: &AgentRole, words: &[String]) -> bool {
        let joined = words.join(" ");
        role.capability_tags().iter().any(|tag| {
            let tag_words = normalize(tag);
            match tag_words.as_slice() {
                [] => false,
                [single] => words.iter().any(|w| w.starts_with(single.as_str())),
                _ => format!(" {} ", joined).contains(&format!(" {} ", tag_words.join(" "))),
            }
        })
    }
}

/// Lowercased alphanumeric words.
fn normalize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}
