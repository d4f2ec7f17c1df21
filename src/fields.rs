/// Splits template source into ordered `(title, content)` pairs.
///
/// Fields are introduced by `#[Title]#`; the body runs until the next header.
/// Text before the first header and headers without a closing `]#` are dropped.
/// A repeated title keeps its first position and takes the later content.
pub fn source_to_fields(text: &str) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    for chunk in text.split("#[").skip(1) {
        let Some((title, value)) = chunk.split_once("]#") else {
            continue;
        };
        let title = title.trim();
        if title.is_empty() {
            continue;
        }
        let value = value.trim().to_string();
        match out.iter_mut().find(|(t, _)| t == title) {
            Some(existing) => existing.1 = value,
            None => out.push((title.to_string(), value)),
        }
    }
    out
}
