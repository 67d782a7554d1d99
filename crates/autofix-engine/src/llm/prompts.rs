use crate::detect::Finding;
use autofix_core::FailureDescriptor;

/// Findings beyond this many are left out of the prompt.
pub const MAX_PROMPT_FINDINGS: usize = 6;

const MAX_CODE_CHARS: usize = 20_000;

// ═══════════════════════════════════════════════════════════════════════════════
// PROMPTS
// ═══════════════════════════════════════════════════════════════════════════════

pub const REPAIR_SYSTEM: &str = r#"You repair small Python programs.

Rules:
- Return the complete corrected Python file and nothing else.
- Keep every function, class and statement that is not part of the bug.
- Keep names, signatures, comments and formatting unless they cause the failure.
- Fix the root cause; do not silence errors with try/except or by deleting the failing call.
- Do not add new dependencies beyond the Python standard library.
- If you cannot fix the program safely, return the original file unchanged."#;

/// Why the model is being asked, which shapes the framing of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairTrigger {
    /// A runtime or syntax failure was observed.
    Failure,
    /// Static analysis or loop stagnation forced the call.
    Forced,
}

pub struct RepairPrompt<'a> {
    pub code: &'a str,
    pub failure: Option<&'a FailureDescriptor>,
    pub findings: &'a [Finding],
    pub instructions: &'a str,
    pub trigger: RepairTrigger,
}

impl RepairPrompt<'_> {
    pub fn render(&self) -> String {
        let code = truncate_chars(self.code, MAX_CODE_CHARS);
        let error = self
            .failure
            .filter(|f| f.is_failure())
            .map(FailureDescriptor::summary)
            .unwrap_or_else(|| "<none>".to_string());
        let logic = if self.findings.is_empty() {
            "<none>".to_string()
        } else {
            self.findings
                .iter()
                .take(MAX_PROMPT_FINDINGS)
                .map(|f| format!("- {}", f.describe()))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let instructions = match self.instructions.trim() {
            "" => "Fix the program so it runs correctly.",
            text => text,
        };
        let framing = match self.trigger {
            RepairTrigger::Failure => "The program below fails when run.",
            RepairTrigger::Forced => {
                "The program below may run without crashing but is likely logically wrong, or earlier repairs made no progress. Fix the underlying logic."
            }
        };

        format!(
            "{framing}\n\nCODE:\n```python\n{code}\n```\n\nERROR:\n{error}\n\nDETECTED LOGIC ISSUES:\n{logic}\n\nUSER INSTRUCTIONS:\n{instructions}\n\nReturn only the corrected Python file in a single ```python block."
        )
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
