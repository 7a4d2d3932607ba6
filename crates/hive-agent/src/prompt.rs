//! Prompt assembly
//!
//! Workers and the direct path share one output contract and the same
//! production rules; only the role line differs.

use hive_core::{SharedContext, Task};

use crate::specialization::{QueenDomain, Specialization};

const PRODUCTION_RULES: &str = "\
Rules for every file you produce:
- Production-ready code only. No TODO or FIXME comments, no placeholder values.
- No template markers such as {{name}}, [[name]] or <your-...>.
- No example.com URLs, test-mode API keys, mock ids or demo passwords; read secrets from the environment.
- No lorem ipsum or filler copy.
- In TypeScript, never use `any`, @ts-ignore or @ts-nocheck.
- UI components must be styled.";

const OUTPUT_CONTRACT: &str = "\
Respond with a JSON array inside a ```json fence. Each element is an object:
{\"path\": \"relative/file/path\", \"type\": \"file|config|schema|migration|test|documentation\", \"language\": \"typescript\", \"content\": \"full file contents\"}
Return complete files, not diffs.";

fn system_prompt(role: &str) -> String {
    format!("You are {}.\n\n{}\n\n{}", role, PRODUCTION_RULES, OUTPUT_CONTRACT)
}

/// System prompt for a specialized worker
pub fn worker_system_prompt(specialization: Specialization) -> String {
    system_prompt(specialization.role())
}

/// System prompt for a queen executing a task itself
pub fn direct_system_prompt(domain: QueenDomain) -> String {
    system_prompt(&format!(
        "a senior full-stack engineer working on {} tasks",
        domain
    ))
}

/// User prompt for a task
pub fn task_prompt(task: &Task, context: &SharedContext) -> String {
    let mut prompt = format!("Task {}: {}\n\n{}\n", task.id, task.name, task.description);

    if let Some(framework) = &context.framework {
        prompt.push_str(&format!("\nStack: {}\n", framework));
    }

    if let Some(contract) = &context.intent_contract {
        prompt.push_str(&format!("\nIntent: {}\n", contract.summary));
        if !contract.success_criteria.is_empty() {
            prompt.push_str("Success criteria:\n");
            for criterion in &contract.success_criteria {
                prompt.push_str(&format!("- {}\n", criterion));
            }
        }
        if !contract.anti_patterns.is_empty() {
            prompt.push_str("Must not contain:\n");
            for pattern in &contract.anti_patterns {
                prompt.push_str(&format!("- {}\n", pattern));
            }
        }
    }

    for note in &context.notes {
        prompt.push_str(&format!("\nNote: {}\n", note));
    }

    prompt
}
