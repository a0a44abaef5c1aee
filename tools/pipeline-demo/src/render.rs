//! Terminal rendering of step updates and final artifacts.

use stagegraph::{PipelineState, StepUpdate};

/// Accumulating fields shown as progress.
const PROGRESS_FIELDS: [&str; 2] = ["progress", "debug_info"];

const UNREVIEWED_NOTE: &str =
    "Note: this result did not reach the review threshold before the revision budget ran out.";

/// Lines to print for one executed stage: its progress items, or a bare
/// marker when it reported none.
pub fn step_lines(step: &StepUpdate) -> Vec<String> {
    let lines: Vec<String> = PROGRESS_FIELDS
        .iter()
        .flat_map(|field| step.update.items(field))
        .filter_map(|item| item.as_str())
        .map(|text| format!("[{}] {text}", step.stage))
        .collect();
    if lines.is_empty() {
        vec![format!("[{}] done", step.stage)]
    } else {
        lines
    }
}

/// Warning for results published after the revision budget ran out.
pub fn unreviewed_note(state: &PipelineState) -> Option<&'static str> {
    state
        .flag("unreviewed")
        .unwrap_or(false)
        .then_some(UNREVIEWED_NOTE)
}

/// Message shown when a run produced no `what`.
pub fn retry_hint(what: &str) -> String {
    format!("No {what} was produced. Please retry.")
}

/// Final artifact in `field` with an unreviewed note when flagged, or a
/// retry hint when the run produced nothing.
pub fn final_artifact(state: &PipelineState, field: &str, what: &str) -> String {
    match (state.text(field), unreviewed_note(state)) {
        (Some(text), Some(note)) => format!("{text}\n\n{note}"),
        (Some(text), None) => text.to_string(),
        (None, _) => retry_hint(what),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagegraph::StateUpdate;

    #[test]
    fn progress_items_are_prefixed_with_stage() {
        let step = StepUpdate {
            stage: "researcher".into(),
            update: StateUpdate::new()
                .push("progress", "sub-question 1/2")
                .push("progress", "sub-question 2/2")
                .set("draft", "x"),
        };
        assert_eq!(
            step_lines(&step),
            vec!["[researcher] sub-question 1/2", "[researcher] sub-question 2/2"]
        );
    }

    #[test]
    fn silent_stage_gets_marker() {
        let step = StepUpdate {
            stage: "publish".into(),
            update: StateUpdate::new().set("final_report", "r"),
        };
        assert_eq!(step_lines(&step), vec!["[publish] done"]);
    }

    #[test]
    fn artifact_notes_and_retry_hint() {
        let state = PipelineState::new().with("final_report", "Report");
        assert_eq!(final_artifact(&state, "final_report", "report"), "Report");

        let state = state.with("unreviewed", true);
        assert!(final_artifact(&state, "final_report", "report").ends_with(UNREVIEWED_NOTE));

        let empty = PipelineState::new();
        assert_eq!(
            final_artifact(&empty, "final_report", "report"),
            "No report was produced. Please retry."
        );
    }
}
