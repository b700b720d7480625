use regex::Regex;

/// Normalizes extracted text while keeping line structure for the splitter:
/// whitespace runs inside a line collapse, blank-line runs collapse to one.
pub fn normalize_block(input: &str) -> String {
    let cleaned = input
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{00A0}', '\u{200B}'], " ")
        .replace("\r\n", "\n")
        .replace('\r', "\n");

    let mut out = String::with_capacity(cleaned.len());
    let mut pending_blank = false;
    for line in cleaned.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            pending_blank = !out.is_empty();
            continue;
        }
        if !out.is_empty() {
            out.push_str(if pending_blank { "\n\n" } else { "\n" });
        }
        out.push_str(&line);
        pending_blank = false;
    }
    out
}

/// Removes `<think>` reasoning blocks and a fence wrapping the whole reply.
pub fn sanitize_model_output(answer: &str) -> String {
    let mut text = match Regex::new(r"(?s)<think>.*?</think>") {
        Ok(re) => re.replace_all(answer, "").trim().to_string(),
        Err(_) => answer.trim().to_string(),
    };

    if text.starts_with("```") && text.ends_with("```") && text.len() >= 6 {
        if let Ok(re) = Regex::new(r"(?s)^```[a-zA-Z]*\n(.*)\n```$") {
            if let Some(body) = re.captures(&text).and_then(|caps| caps.get(1)) {
                text = body.as_str().trim().to_string();
            }
        }
    }
    text
}

/// First `max_chars` characters, for log lines and step traces.
pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
