// All upstream prompt constants for the generation module.

use crate::generation::RevisionHint;
use crate::models::{Request, TaskType};

/// System prompt for first-pass prompt synthesis.
pub const GENERATION_SYSTEM: &str =
    "You are an expert prompt engineer producing prompts for AI engineers \
    building proof-of-concept deliverables. Every prompt you write includes: \
    a clear role definition, a concrete task description, an explicit \
    expected output format, the constraints, and examples where they help. \
    Respond with the prompt text only. Do NOT include commentary, preamble, \
    or markdown code fences around the prompt.";

/// System prompt for revision passes.
pub const REVISION_SYSTEM: &str =
    "You are an expert prompt engineer improving an existing prompt based on \
    review feedback. Apply every suggestion while preserving the original \
    intent. Respond with the improved prompt text only — no explanations.";

/// Generation prompt template. Replace `{role}`, `{task_type}`,
/// `{requirements}`, `{context}`, `{constraints}` before sending.
const GENERATION_PROMPT_TEMPLATE: &str = r#"Write a prompt based on the requirements below.

ROLE the prompt should assign: {role}

TASK TYPE: {task_type}

REQUIREMENTS:
{requirements}
{context}{constraints}
The prompt must direct its reader to:
1. Provide a clearly structured answer
2. Include technical detail and concrete implementation examples
3. Call out likely risks and how to mitigate them"#;

/// Revision prompt template. Replace `{prior_prompt}` and `{suggestions}`.
const REVISION_PROMPT_TEMPLATE: &str = r#"Improve the following prompt.

CURRENT PROMPT:
{prior_prompt}

REVIEW SUGGESTIONS (apply all of them):
{suggestions}

Return only the improved prompt."#;

/// The role the synthesized prompt assigns its reader, per task family.
pub fn role_for(task_type: TaskType) -> &'static str {
    match task_type {
        TaskType::DataAnalysis => "an experienced data scientist",
        TaskType::ImageRecognition => "a computer vision specialist",
        TaskType::TextProcessing => "a natural language processing specialist",
        TaskType::RequirementsAnalysis => "a requirements analysis expert",
        TaskType::ApiTesting => "an API development and testing expert",
        TaskType::GeneralPoc => "a technical consultant for PoC projects",
    }
}

pub fn build_generation_prompt(request: &Request) -> String {
    let context = if request.context.is_empty() {
        String::new()
    } else {
        let lines: Vec<String> = request
            .context
            .iter()
            .map(|(k, v)| format!("- {k}: {v}"))
            .collect();
        format!("\nCONTEXT:\n{}\n", lines.join("\n"))
    };

    let constraints = match &request.constraints {
        Some(c) => format!("\nCONSTRAINTS:\n{c}\n"),
        None => String::new(),
    };

    GENERATION_PROMPT_TEMPLATE
        .replace("{role}", role_for(request.task_type))
        .replace("{task_type}", request.task_type.as_str())
        .replace("{requirements}", &request.requirements)
        .replace("{context}", &context)
        .replace("{constraints}", &constraints)
}

pub fn build_revision_prompt(hint: &RevisionHint) -> String {
    let suggestions = if hint.suggestions.is_empty() {
        "- Tighten wording and make the expected output explicit".to_string()
    } else {
        hint.suggestions
            .iter()
            .map(|s| format!("- {s}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    REVISION_PROMPT_TEMPLATE
        .replace("{prior_prompt}", &hint.prior_text)
        .replace("{suggestions}", &suggestions)
}
