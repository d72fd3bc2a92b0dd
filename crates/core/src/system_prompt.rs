// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt construction: the background-task system prompt sent into the
//! child session, and the `<BackgroundTasks>` block injected into the
//! parent session so it knows what is still in flight.

use crate::task::Task;

pub const READ_ONLY_AGENTS: &[&str] = &["explorer", "librarian"];

pub fn is_read_only_agent(agent: &str) -> bool {
    READ_ONLY_AGENTS.contains(&agent)
}

const PROMPT_EXCERPT_LIMIT: usize = 500;

/// The system prompt sent into every background-task child session: task
/// identity, a truncated excerpt of the original prompt, and a clause
/// disabling nested background-task launches (read-only agents additionally
/// get a no-writes clause).
pub fn background_task_system_prompt(task: &Task) -> String {
    let excerpt = truncate_excerpt(&task.prompt, PROMPT_EXCERPT_LIMIT);
    let mut prompt = format!(
        "You are running as background task {id} (agent: {agent}).\n\
         Task description: {description}\n\
         Original prompt excerpt: {excerpt}\n\n\
         You may not launch further background tasks: the background_task and task tools are disabled for this session.",
        id = task.id,
        agent = task.agent,
        description = task.description,
        excerpt = excerpt,
    );
    if is_read_only_agent(&task.agent) {
        prompt.push_str("\nThis agent is read-only: you may not write, edit, or delete any files.");
    }
    prompt
}

fn truncate_excerpt(prompt: &str, limit: usize) -> String {
    if prompt.len() <= limit {
        return prompt.to_owned();
    }
    let mut boundary = limit;
    while boundary > 0 && !prompt.is_char_boundary(boundary) {
        boundary -= 1;
    }
    format!("{}...", &prompt[..boundary])
}

/// The full system-prompt array sent with the prompt: the background-task
/// prompt first, followed by any agent-variant-supplied system prompt.
pub fn effective_system_prompt(task: &Task, variant_system_prompt: Option<&str>) -> Vec<String> {
    let mut system = vec![background_task_system_prompt(task)];
    if let Some(variant) = variant_system_prompt {
        if !variant.is_empty() {
            system.push(variant.to_owned());
        }
    }
    system
}

/// The `<BackgroundTasks>` block for the parent session's system prompt,
/// enumerating running and pending-retrieval task ids/descriptions. `None`
/// when there is nothing to report.
pub fn background_tasks_block<'a>(tasks: impl Iterator<Item = (&'a str, &'a str)>) -> Option<String> {
    let lines: Vec<String> = tasks.map(|(id, description)| format!("- {id}: {description}")).collect();
    if lines.is_empty() {
        return None;
    }
    Some(format!("<BackgroundTasks>\n{}\n</BackgroundTasks>", lines.join("\n")))
}

/// Append the `<BackgroundTasks>` block to `system`, if there is one.
pub fn append_background_tasks_block<'a>(system: &mut Vec<String>, tasks: impl Iterator<Item = (&'a str, &'a str)>) {
    if let Some(block) = background_tasks_block(tasks) {
        system.push(block);
    }
}

#[cfg(test)]
#[path = "system_prompt_tests.rs"]
mod tests;
