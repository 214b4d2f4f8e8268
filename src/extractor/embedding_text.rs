//! Embedding text (§4.3): a deterministic concatenation of name, doc
//! comment, signature, and (for interfaces) a projected property
//! listing. Identical input must produce identical output — no
//! timestamps, random ordering, or environment-dependent formatting.

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn build_embedding_text(
    name: &str,
    doc_comment: Option<&str>,
    signature: &str,
    properties: Option<&[String]>,
) -> String {
    let mut parts = vec![name.to_string()];
    if let Some(doc) = doc_comment {
        let normalized = normalize_whitespace(doc);
        if !normalized.is_empty() {
            parts.push(normalized);
        }
    }
    parts.push(normalize_whitespace(signature));
    if let Some(props) = properties {
        if !props.is_empty() {
            parts.push(props.join(", "));
        }
    }
    parts.join(" :: ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_input_yields_identical_text() {
        let a = build_embedding_text("add", Some("Adds two numbers."), "fn add(a, b)", None);
        let b = build_embedding_text("add", Some("Adds two numbers."), "fn add(a, b)", None);
        assert_eq!(a, b);
    }

    #[test]
    fn whitespace_is_normalized() {
        let a = build_embedding_text("add", Some("Adds   two\n numbers."), "fn  add(a,b)", None);
        assert_eq!(a, "add :: Adds two numbers. :: fn add(a,b)");
    }

    #[test]
    fn interface_properties_are_projected() {
        let text = build_embedding_text(
            "Point",
            None,
            "interface Point",
            Some(&["x: number".to_string(), "y: number".to_string()]),
        );
        assert_eq!(text, "Point :: interface Point :: x: number, y: number");
    }

    #[test]
    fn missing_doc_comment_is_omitted_not_blank() {
        let text = build_embedding_text("add", None, "fn add()", None);
        assert_eq!(text, "add :: fn add()");
    }
}
