//! Text rendering of job commands and results shared by the interactive triggers.

use super::{ALL, JobResult};

/// ## Summary
/// Splits a command line into job ids. A leading `/` is stripped from each word so chat
/// commands work, together with the `@bot` suffix group chats append to them; `all` or an empty
/// line selects every job.
#[must_use]
pub fn parse_job_ids(text: &str) -> Vec<String> {
    let ids: Vec<String> = text
        .split_whitespace()
        .map(|word| match word.strip_prefix('/') {
            Some(command) => command.split('@').next().unwrap_or_default(),
            None => word,
        })
        .filter(|word| !word.is_empty())
        .map(str::to_owned)
        .collect();

    if ids.iter().any(|id| id == ALL) {
        Vec::new()
    } else {
        ids
    }
}

/// ## Summary
/// Renders one line per job, `✔ id` or `✘ id: error`, with multi-line errors indented below.
#[must_use]
pub fn format_results(results: &[JobResult]) -> String {
    let mut lines = Vec::with_capacity(results.len());
    for result in results {
        match &result.error {
            None => lines.push(format!("✔ {}", result.job_id)),
            Some(err) => {
                let text = err.to_string();
                let mut rest = text.lines();
                lines.push(format!(
                    "✘ {}: {}",
                    result.job_id,
                    rest.next().unwrap_or_default()
                ));
                lines.extend(rest.map(|line| format!("    {line}")));
            }
        }
    }
    lines.join("\n")
}
