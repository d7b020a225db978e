//! Prompt text used for grading.

/// Collection of prompts used by the judge.
pub struct Prompts;

impl Prompts {
    /// Instructions appended to every user prompt.
    ///
    /// The reply is parsed line by line, so the three labels must stay
    /// exactly as written here.
    pub fn reasons_template() -> &'static str {
        r#"Please answer using the entire template below.

TEMPLATE:
Criteria: <Provide the criteria for this evaluation>
Supporting Evidence: <Provide your reasons for scoring based on the listed criteria step by step. Tie it back to the evaluation being completed.>
Score: <The score from {min_score} to {max_score} based on the given criteria>
"#
    }

    /// The reasons template with the score range filled in.
    pub fn reasons(min_score: f64, max_score: f64) -> String {
        Self::reasons_template()
            .replace("{min_score}", &format_number(min_score))
            .replace("{max_score}", &format_number(max_score))
    }
}

/// Print whole numbers without a trailing `.0`.
pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
