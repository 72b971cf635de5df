//! Answer cleanup before display and speech.
//!
//! Local models often leak reasoning blocks or markdown into their answers;
//! the playback pipeline would read all of it out loud.

/// Reasoning/internal tags stripped together with their content.
const TAGS_TO_STRIP: [&str; 15] = [
    "thinking",
    "think",
    "reflection",
    "reflect",
    "internal",
    "reasoning",
    "thought",
    "scratch",
    "scratchpad",
    "plan",
    "analysis",
    "analyze",
    "consider",
    "pondering",
    "deliberation",
];

/// Strip reasoning tags, orphan tags, and markdown emphasis; collapse
/// whitespace to single spaces.
pub fn sanitize_answer(answer: &str) -> String {
    let mut result = answer.to_string();

    for tag in &TAGS_TO_STRIP {
        // Match <tag>...</tag> including attributes and newlines
        let pattern = format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag);
        if let Ok(re) = regex::Regex::new(&pattern) {
            result = re.replace_all(&result, "").to_string();
        }
    }

    // Remove any remaining orphaned opening/closing tags
    if let Ok(orphan_re) = regex::Regex::new(r"</?[\w]+[^>]*>") {
        result = orphan_re.replace_all(&result, "").to_string();
    }

    // Markdown emphasis markers read terribly over TTS
    result = result.replace('*', "");

    if let Ok(ws_re) = regex::Regex::new(r"\s+") {
        result = ws_re.replace_all(&result, " ").to_string();
    }

    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_thinking_tags() {
        let input = "<thinking>Let me think about this...</thinking>The answer is 42.";
        assert_eq!(sanitize_answer(input), "The answer is 42.");
    }

    #[test]
    fn test_strips_reflection_tags() {
        let input = "Hello <reflection>internal thought</reflection> world!";
        assert_eq!(sanitize_answer(input), "Hello world!");
    }

    #[test]
    fn test_plain_text_passes_through() {
        let input = "No tags here, just text.";
        assert_eq!(sanitize_answer(input), "No tags here, just text.");
    }

    #[test]
    fn test_strips_multiline_tags() {
        let input = "<think>\nMultiple\nlines\nof\nthought\n</think>Final answer here.";
        assert_eq!(sanitize_answer(input), "Final answer here.");
    }

    #[test]
    fn test_removes_orphan_tags() {
        let input = "Start <think>nested <inner>tags</inner> content</think> end";
        let output = sanitize_answer(input);
        assert!(!output.contains('<'));
        assert!(!output.contains('>'));
    }

    #[test]
    fn test_strips_markdown_asterisks() {
        let input = "This is **very** important, *really*.";
        assert_eq!(sanitize_answer(input), "This is very important, really.");
    }

    #[test]
    fn test_collapses_whitespace() {
        let input = "Too   many\n\nspaces  here.";
        assert_eq!(sanitize_answer(input), "Too many spaces here.");
    }
}
