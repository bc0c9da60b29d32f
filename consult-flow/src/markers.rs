//! In-band markers exchanged with the participants: the termination token a doctor emits once
//! it has reached a diagnosis, and the turn-budget note appended to doctor-bound prompts.

use regex::Regex;
use std::sync::LazyLock;

pub const TERMINATION_MARKER: &str = "<DIAGNOSIS_DONE>";

static TURN_NOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[System Note: turn (\d+)/(\d+)\]").expect("turn note pattern is valid")
});

/// Removes every occurrence of the termination marker.
///
/// Returns the visible text and whether the marker was present. Text without the marker is
/// returned untouched; text with it is trimmed after removal.
pub fn strip_termination(text: &str) -> (String, bool) {
    if !text.contains(TERMINATION_MARKER) {
        return (text.to_string(), false);
    }
    let cleaned = text.replace(TERMINATION_MARKER, "");
    (cleaned.trim().to_string(), true)
}

pub fn turn_note(turn: u32, max_turns: u32) -> String {
    format!("[System Note: turn {turn}/{max_turns}]")
}

/// Appends the turn note to a doctor-bound prompt.
pub fn annotate_turn(prompt: &str, turn: u32, max_turns: u32) -> String {
    format!("{prompt}\n\n{}", turn_note(turn, max_turns))
}

/// Extracts `(turn, max_turns)` from the last turn note in `text`.
pub fn parse_turn_note(text: &str) -> Option<(u32, u32)> {
    let caps = TURN_NOTE.captures_iter(text).last()?;
    let turn = caps.get(1)?.as_str().parse().ok()?;
    let max = caps.get(2)?.as_str().parse().ok()?;
    Some((turn, max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_marker_absent() {
        let (text, done) = strip_termination("  keep spacing ");
        assert_eq!(text, "  keep spacing ");
        assert!(!done);
    }

    #[test]
    fn test_strip_marker_at_start() {
        let (text, done) = strip_termination("<DIAGNOSIS_DONE> Chronic gastritis.");
        assert_eq!(text, "Chronic gastritis.");
        assert!(done);
    }

    #[test]
    fn test_strip_marker_in_middle() {
        let (text, done) = strip_termination("Diagnosis:<DIAGNOSIS_DONE> hypertension");
        assert_eq!(text, "Diagnosis: hypertension");
        assert!(done);
    }

    #[test]
    fn test_strip_marker_at_end_and_repeated() {
        let (text, done) =
            strip_termination("Type 2 diabetes. <DIAGNOSIS_DONE>\n<DIAGNOSIS_DONE>");
        assert_eq!(text, "Type 2 diabetes.");
        assert!(done);
    }

    #[test]
    fn test_strip_marker_only() {
        let (text, done) = strip_termination("<DIAGNOSIS_DONE>");
        assert_eq!(text, "");
        assert!(done);
    }

    #[test]
    fn test_turn_note_round_trip() {
        let prompt = annotate_turn("Where does it hurt?", 2, 3);
        assert_eq!(prompt, "Where does it hurt?\n\n[System Note: turn 2/3]");
        assert_eq!(parse_turn_note(&prompt), Some((2, 3)));
    }

    #[test]
    fn test_parse_turn_note_takes_last() {
        let text = format!("{} then {}", turn_note(1, 5), turn_note(4, 5));
        assert_eq!(parse_turn_note(&text), Some((4, 5)));
        assert_eq!(parse_turn_note("no note here"), None);
    }
}
