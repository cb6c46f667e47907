use serde_json::Value;

/// Extraction rules for embedding payloads, in priority order. Backends
/// disagree on where the vector lives; each rule names one known shape.
const EMBEDDING_RULES: [(&str, &str); 3] = [
    ("legacy-embedding", "/embedding"),
    ("batched-embeddings", "/embeddings/0"),
    ("openai-data", "/data/0/embedding"),
];

/// Pulls an embedding vector out of a backend response, trying each
/// known payload shape in turn. Returns the rule name with the vector.
pub fn embedding_from_response(payload: &Value) -> Option<(&'static str, Vec<f32>)> {
    for (rule, pointer) in EMBEDDING_RULES {
        if let Some(vector) = payload.pointer(pointer).and_then(float_array) {
            if !vector.is_empty() {
                return Some((rule, vector));
            }
        }
    }
    None
}

/// Finds the first well-formed bracketed float array inside free text,
/// e.g. a chat reply asked to emit `[0.1, -0.2, ...]`.
pub fn float_array_from_text(text: &str) -> Option<Vec<f32>> {
    let mut open: Option<usize> = None;

    for (offset, ch) in text.char_indices() {
        match ch {
            '[' => open = Some(offset),
            ']' => {
                if let Some(start) = open.take() {
                    let candidate = &text[start..=offset];
                    if let Ok(values) = serde_json::from_str::<Vec<f32>>(candidate) {
                        if !values.is_empty() {
                            return Some(values);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    None
}

fn float_array(value: &Value) -> Option<Vec<f32>> {
    let items = value.as_array()?;
    let mut floats = Vec::with_capacity(items.len());
    for item in items {
        floats.push(item.as_f64()? as f32);
    }
    Some(floats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_shape_wins_over_batched() {
        let payload = json!({
            "embedding": [1.0, 2.0],
            "embeddings": [[9.0, 9.0]],
        });
        let (rule, vector) = embedding_from_response(&payload).unwrap();
        assert_eq!(rule, "legacy-embedding");
        assert_eq!(vector, vec![1.0, 2.0]);
    }

    #[test]
    fn batched_shape_is_recognized() {
        let payload = json!({"embeddings": [[0.5, 0.25, 0.125]]});
        let (rule, vector) = embedding_from_response(&payload).unwrap();
        assert_eq!(rule, "batched-embeddings");
        assert_eq!(vector.len(), 3);
    }

    #[test]
    fn openai_shape_is_recognized() {
        let payload = json!({"data": [{"embedding": [0.1, 0.2]}]});
        let (rule, _) = embedding_from_response(&payload).unwrap();
        assert_eq!(rule, "openai-data");
    }

    #[test]
    fn unknown_shapes_yield_none() {
        assert!(embedding_from_response(&json!({"vector": [1.0]})).is_none());
        assert!(embedding_from_response(&json!({"embedding": []})).is_none());
        assert!(embedding_from_response(&json!({"embedding": ["a"]})).is_none());
    }

    #[test]
    fn bracketed_array_is_extracted_from_prose() {
        let reply = "Here is the summary vector: [0.1, -0.2, 0.3] as requested.";
        assert_eq!(
            float_array_from_text(reply),
            Some(vec![0.1, -0.2, 0.3])
        );
    }

    #[test]
    fn malformed_brackets_are_skipped_for_later_ones() {
        let reply = "ranges [a, b] then numbers [1.5, 2.5]";
        assert_eq!(float_array_from_text(reply), Some(vec![1.5, 2.5]));
    }

    #[test]
    fn text_without_arrays_yields_none() {
        assert!(float_array_from_text("no numbers here").is_none());
        assert!(float_array_from_text("empty []").is_none());
    }
}
