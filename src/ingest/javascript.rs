use std::future::Future;

use anyhow::Result;
use regex::Regex;

use crate::ollama::OllamaClient;
use crate::text::sanitize_model_output;

const SCRIPT_TAG_PATTERN: &str = r"(?s)<script.*?>(.*?)</script>";
const JS_FENCE_PATTERN: &str = r"(?s)```javascript\s*\n(.*?)\n```";
const PY_FENCE_PATTERN: &str = r"(?s)```python\s*\n(.*?)\n```";

/// JavaScript bodies found in `<script>` tags and ```javascript fences.
pub fn extract_javascript(content: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    for pattern in [SCRIPT_TAG_PATTERN, JS_FENCE_PATTERN] {
        let Ok(re) = Regex::new(pattern) else {
            continue;
        };
        for caps in re.captures_iter(content) {
            if let Some(body) = caps.get(1) {
                let body = body.as_str();
                if !body.trim().is_empty() && !blocks.iter().any(|b| b == body) {
                    blocks.push(body.to_string());
                }
            }
        }
    }
    blocks
}

pub fn conversion_prompt(js: &str) -> String {
    format!(
        "Convert the following JavaScript code to Python.\n\
         Keep the logic identical and use idiomatic Python.\n\
         Return only the Python code inside a ```python code block.\n\n\
         JavaScript code:\n```javascript\n{js}\n```"
    )
}

/// The fenced python block of a model reply, or the whole reply without one.
pub fn extract_python(reply: &str) -> String {
    let reply = sanitize_model_output(reply);
    Regex::new(PY_FENCE_PATTERN)
        .ok()
        .and_then(|re| {
            re.captures(&reply)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim().to_string())
        })
        .unwrap_or_else(|| reply.trim().to_string())
}

pub fn annotated_block(js: &str, python: &str) -> String {
    format!(
        "\n'''\nOriginal JavaScript:\n{js}\n'''\n\n'''\nConverted Python:\n{python}\n'''\n"
    )
}

pub fn conversion_error_block(js: &str, err: &anyhow::Error) -> String {
    let commented = js.lines().collect::<Vec<_>>().join("\n# ");
    format!("# Error converting JavaScript to Python: {err}\n# Original JavaScript:\n# {commented}")
}

/// Replaces every JavaScript block in `content` with the original plus its
/// Python conversion. Returns the rewritten content and the number of blocks.
pub async fn rewrite_javascript<F, Fut>(content: &str, mut convert: F) -> (String, usize)
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let blocks = extract_javascript(content);
    let mut rewritten = content.to_string();

    for js in &blocks {
        let replacement = match convert(js.clone()).await {
            Ok(reply) => annotated_block(js, &extract_python(&reply)),
            Err(err) => {
                tracing::warn!("javascript conversion failed: {err:#}");
                conversion_error_block(js, &err)
            }
        };
        rewritten = rewritten.replace(js.as_str(), &replacement);
    }

    (rewritten, blocks.len())
}

/// Asks the coding model for a Python rendition of `js`.
pub async fn convert_with_ollama(
    ollama: &OllamaClient,
    model: &str,
    temperature: f32,
    js: &str,
) -> Result<String> {
    ollama
        .generate_text(model, &conversion_prompt(js), None, temperature)
        .await
}
