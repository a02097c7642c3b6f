//! Role prompt templates.
//!
//! A role's `instructions` is a template with `{placeholder}` slots filled in
//! per task. `{{` and `}}` produce literal braces. Templates are validated
//! when the role set is loaded so a typo fails the run before dispatch.

use sowcrew_core::{AgentContext, AgentRole, RoleSet, Task};

use crate::error::PromptError;

pub const PLACEHOLDERS: &[&str] = &[
    "role",
    "member",
    "role_description",
    "objectives",
    "tools",
    "task_id",
    "title",
    "description",
    "context",
];

const DEFAULT_TEMPLATE: &str = r#"You are the {role} on this project ({member}).
{role_description}
Your objectives: {objectives}
Available tools: {tools}

Successfully complete the following task assigned to the {role} role.

## Task {task_id}
**Title:** {title}
**Description:** {description}

## Context
{context}"#;

pub struct RolePrompts;

impl RolePrompts {
    /// The role's own template, or the built-in one.
    pub fn template(role: &AgentRole) -> &str {
        role.instructions
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_TEMPLATE)
    }

    pub fn validate(role: &AgentRole) -> Result<(), PromptError> {
        expand(&role.name, Self::template(role), |name| {
            PLACEHOLDERS.contains(&name).then(String::new)
        })
        .map(|_| ())
    }

    pub fn validate_all(roles: &RoleSet) -> Result<(), PromptError> {
        roles.iter().try_for_each(Self::validate)
    }

    pub fn render(role: &AgentRole, task: &Task, context: &AgentContext) -> Result<String, PromptError> {
        expand(&role.name, Self::template(role), |name| {
            let value = match name {
                "role" => role.name.clone(),
                "member" => role.member.clone().unwrap_or_else(|| role.name.clone()),
                "role_description" => role.description.clone(),
                "objectives" => or_none(role.objectives.join(", ")),
                "tools" => or_none(role.tools.join(", ")),
                "task_id" => task.id.to_string(),
                "title" => task.title.clone(),
                "description" => or_none(task.description.clone()),
                "context" => Self::context_block(context),
                _ => return None,
            };
            Some(value)
        })
    }

    /// Preamble and prior results as prompt text.
    pub fn context_block(context: &AgentContext) -> String {
        let mut sections = Vec::new();

        if let Some(preamble) = context.preamble.as_deref().filter(|p| !p.trim().is_empty()) {
            sections.push(format!("Project overview:\n{}", preamble.trim()));
        }

        if !context.prior_results.is_empty() {
            let lines: Vec<String> = context
                .prior_results
                .iter()
                .map(|prior| {
                    let output = match &prior.output {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    format!("- [{}] {} ({}): {}", prior.task_id, prior.title, prior.role, output)
                })
                .collect();
            sections.push(format!("Completed tasks:\n{}", lines.join("\n")));
        }

        if sections.is_empty() {
            "(none)".to_string()
        } else {
            sections.join("\n\n")
        }
    }
}

fn or_none(value: String) -> String {
    if value.trim().is_empty() {
        "(none)".to_string()
    } else {
        value
    }
}

fn expand<F>(role: &str, template: &str, mut lookup: F) -> Result<String, PromptError>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(|c: char| c == '{' || c == '}') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(after) = tail.strip_prefix("{{") {
            out.push('{');
            rest = after;
        } else if let Some(after) = tail.strip_prefix('}') {
            out.push('}');
            rest = after.strip_prefix('}').unwrap_or(after);
        } else {
            let end = tail.find('}').ok_or_else(|| PromptError::Unclosed {
                role: role.to_string(),
            })?;
            let name = tail[1..end].trim();
            let value = lookup(name).ok_or_else(|| PromptError::UnknownPlaceholder {
                role: role.to_string(),
                placeholder: name.to_string(),
            })?;
            out.push_str(&value);
            rest = &tail[end + 1..];
        }
    }

    out.push_str(rest);
    Ok(out)
}
