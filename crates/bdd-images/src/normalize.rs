//! Log line normalization for image captions.

use regex::Regex;
use std::sync::OnceLock;

/// HTML line-break marker appended after each caption line
pub const LINE_BREAK: &str = "<br>";

fn step_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?im)(given|when|then) "(?P<step>.*)""#)
            .expect("step pattern is a valid regex")
    })
}

/// Turn a raw log line into a caption fragment.
///
/// NUL bytes are dropped. When the line mentions a step
/// (`given|when|then "<text>"`, any case) only `<text>` is kept, otherwise
/// the whole line. `<` and `>` are removed so the caption cannot break the
/// gallery markup, then `line_breaks` `<br>` markers are appended.
#[must_use]
pub fn normalize(line: &str, line_breaks: usize) -> String {
    let line = line.replace('\0', "");
    let step = step_pattern()
        .captures(&line)
        .and_then(|caps| caps.name("step"))
        .map_or(line.as_str(), |m| m.as_str());

    let mut caption: String = step.chars().filter(|c| *c != '<' && *c != '>').collect();
    caption.push_str(&LINE_BREAK.repeat(line_breaks));
    caption
}
