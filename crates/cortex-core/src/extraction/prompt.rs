//! Extraction prompt assembly

use super::gitctx::GitContext;

/// Build the prompt handed to the external extractor. Documents the closed
/// memory-type set, the numeric invariants, and the scope rule so the
/// response parser can hold the extractor to them.
pub fn build_extraction_prompt(
    window: &str,
    git: &GitContext,
    project_name: &str,
) -> String {
    let commits = if git.commits.is_empty() {
        "(none)".to_string()
    } else {
        git.commits.join("\n")
    };
    let files = if git.files.is_empty() {
        "(none)".to_string()
    } else {
        git.files.join("\n")
    };

    format!(
        r#"You are extracting durable engineering knowledge from an agentic coding session.

Project: {project_name}
Branch: {branch}

Recent commits:
{commits}

Recently changed files:
{files}

Review the transcript below and extract memories worth keeping. Respond with
a JSON array (no prose). Each element:

{{
  "content": "full detail of the knowledge",
  "summary": "one-to-three line summary",
  "type": "architecture | decision | pattern | gotcha | context | progress | code_description | code",
  "confidence": 0.0 to 1.0,
  "priority": integer 1 to 10,
  "scope": "project" or "global",
  "tags": ["optional", "tags"]
}}

Rules:
- type must be one of the eight listed values.
- confidence is how certain the knowledge is; scope "global" requires
  confidence above 0.8 and must hold outside this project.
- priority 10 is for knowledge that prevents breakage; 1 is trivia.
- Prefer fewer, higher-quality memories over many weak ones.
- Respond with [] if nothing is worth keeping.

Transcript window:
{window}
"#,
        branch = git.branch,
    )
}
