//! Rendering of recent turns for generation prompts.

use graphrag_core::Turn;

/// Maximum characters kept from each message.
const MAX_MESSAGE_CHARS: usize = 500;

/// Render turns as alternating `USER:` / `ASSISTANT:` lines, oldest first.
///
/// Returns an empty string when there is no history.
pub fn format_history(turns: &[Turn]) -> String {
    let mut lines = Vec::with_capacity(turns.len() * 2);
    for turn in turns {
        lines.push(format!("USER: {}", truncate(&turn.question)));
        lines.push(format!("ASSISTANT: {}", truncate(&turn.answer)));
    }
    lines.join("\n")
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_MESSAGE_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_history_renders_empty() {
        assert_eq!(format_history(&[]), "");
    }

    #[test]
    fn renders_user_and_assistant_lines() {
        let turns = vec![
            Turn::new("Which patients have diabetes?", "MATCH ...", "Ana and Ben."),
            Turn::new("And how old are they?", "MATCH ...", "Ana is 40."),
        ];
        let text = format_history(&turns);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "USER: Which patients have diabetes?");
        assert_eq!(lines[3], "ASSISTANT: Ana is 40.");
    }

    #[test]
    fn long_answers_are_truncated() {
        let turns = vec![Turn::new("q", "", "y".repeat(800))];
        let text = format_history(&turns);
        assert_eq!(text.lines().nth(1).unwrap().len(), "ASSISTANT: ".len() + 500);
    }
}
