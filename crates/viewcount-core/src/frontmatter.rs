//! YAML frontmatter parsing and writing.
//!
//! Handles the `---` delimited YAML block at the top of a markdown item.
//! Format:
//! ```markdown
//! ---
//! tags: [project]
//! view-count: 12
//! ---
//!
//! ## Body content here
//! ```
//!
//! Items without a block read as an empty property map; writing an empty
//! map back removes the block.

use serde_yaml::{Mapping, Value};

use crate::error::ViewCountError;

/// Split a markdown item into its raw frontmatter YAML and body.
///
/// # Errors
///
/// Returns [`ViewCountError::Frontmatter`] if the content does not open with a
/// `---` line or the block is never closed.
pub fn split_frontmatter(content: &str) -> Result<(&str, &str), ViewCountError> {
    let after_open = content
        .strip_prefix("---")
        .and_then(|rest| rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')))
        .ok_or_else(|| {
            ViewCountError::Frontmatter("content must start with a '---' line".to_string())
        })?;

    let (yaml, rest) = match after_open.strip_prefix("---") {
        // Empty block: the closing delimiter follows immediately.
        Some(rest) => ("", rest),
        None => {
            let close_pos = after_open.find("\n---").ok_or_else(|| {
                ViewCountError::Frontmatter("no closing '---' delimiter found".to_string())
            })?;
            (&after_open[..close_pos], &after_open[close_pos + 4..])
        }
    };

    let body = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest);

    Ok((yaml, body))
}

/// Parse the property map and body of a markdown item.
///
/// Content without a frontmatter block yields an empty map and the whole
/// content as body.
///
/// # Errors
///
/// Returns [`ViewCountError::Frontmatter`] if the block is unterminated, is
/// not valid YAML, or is not a mapping.
pub fn read_properties(content: &str) -> Result<(Mapping, &str), ViewCountError> {
    if !content.starts_with("---") {
        return Ok((Mapping::new(), content));
    }

    let (yaml, body) = split_frontmatter(content)?;
    if yaml.trim().is_empty() {
        return Ok((Mapping::new(), body));
    }

    let value: Value =
        serde_yaml::from_str(yaml).map_err(|e| ViewCountError::Frontmatter(e.to_string()))?;
    match value {
        Value::Mapping(map) => Ok((map, body)),
        Value::Null => Ok((Mapping::new(), body)),
        other => Err(ViewCountError::Frontmatter(format!(
            "frontmatter must be a mapping, found {}",
            yaml_kind(&other)
        ))),
    }
}

/// Render a property map and body back into markdown.
///
/// # Errors
///
/// Returns [`ViewCountError::Serialization`] if the map cannot be serialized.
pub fn write_properties(properties: &Mapping, body: &str) -> Result<String, ViewCountError> {
    if properties.is_empty() {
        return Ok(body.to_string());
    }

    let yaml =
        serde_yaml::to_string(properties).map_err(|e| ViewCountError::Serialization(e.to_string()))?;

    let mut output = String::with_capacity(yaml.len() + body.len() + 8);
    output.push_str("---\n");
    output.push_str(&yaml);
    output.push_str("---\n");
    output.push_str(body);
    Ok(output)
}

/// Read-modify-write the property map of a markdown item.
///
/// Returns the rewritten content, or `None` when `edit` left the map
/// unchanged.
///
/// # Errors
///
/// Propagates parse and serialization errors from [`read_properties`] and
/// [`write_properties`].
pub fn update_properties<F>(content: &str, edit: F) -> Result<Option<String>, ViewCountError>
where
    F: FnOnce(&mut Mapping),
{
    let (original, body) = read_properties(content)?;
    let mut properties = original.clone();
    edit(&mut properties);

    if properties == original {
        return Ok(None);
    }
    write_properties(&properties, body).map(Some)
}

fn yaml_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_frontmatter_extracts_yaml_and_body() {
        let content = "---\ntitle: test\nview-count: 3\n---\n\n## Hello\n";
        let (yaml, body) = split_frontmatter(content).unwrap();
        assert!(yaml.contains("title: test"));
        assert!(yaml.contains("view-count: 3"));
        assert_eq!(body, "\n## Hello\n");
    }

    #[test]
    fn split_frontmatter_accepts_empty_block() {
        let (yaml, body) = split_frontmatter("---\n---\nBody").unwrap();
        assert_eq!(yaml, "");
        assert_eq!(body, "Body");
    }

    #[test]
    fn split_frontmatter_rejects_missing_opener() {
        assert!(split_frontmatter("title: test\n---\n").is_err());
    }

    #[test]
    fn split_frontmatter_rejects_missing_closer() {
        assert!(split_frontmatter("---\ntitle: test\n").is_err());
    }

    #[test]
    fn content_without_block_reads_empty() {
        let (props, body) = read_properties("# Just a heading\n").unwrap();
        assert!(props.is_empty());
        assert_eq!(body, "# Just a heading\n");
    }

    #[test]
    fn non_mapping_block_is_rejected() {
        let err = read_properties("---\n- a\n- b\n---\n").unwrap_err();
        assert!(err.to_string().contains("sequence"));
    }

    #[test]
    fn update_adds_block_to_plain_item() {
        let updated = update_properties("Body text\n", |props| {
            props.insert("view-count".into(), 1.into());
        })
        .unwrap()
        .unwrap();
        assert_eq!(updated, "---\nview-count: 1\n---\nBody text\n");
    }

    #[test]
    fn update_preserves_other_properties_and_body() {
        let content = "---\ntags:\n- rust\nview-count: 2\n---\n\n## Body\n";
        let updated = update_properties(content, |props| {
            props.insert("view-count".into(), 3.into());
        })
        .unwrap()
        .unwrap();

        let (props, body) = read_properties(&updated).unwrap();
        assert_eq!(props.get("view-count"), Some(&Value::from(3)));
        assert!(props.contains_key("tags"));
        assert_eq!(body, "\n## Body\n");
    }

    #[test]
    fn unchanged_map_is_not_rewritten() {
        let content = "---\nview-count: 2\n---\nBody\n";
        let result = update_properties(content, |props| {
            props.insert("view-count".into(), 2.into());
        })
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn removing_last_property_drops_block() {
        let content = "---\nview-count: 2\n---\nBody\n";
        let updated = update_properties(content, |props| {
            props.remove("view-count");
        })
        .unwrap()
        .unwrap();
        assert_eq!(updated, "Body\n");
    }
}
