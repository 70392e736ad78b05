//! Page selection for extraction requests.
//!
//! Callers name pages 1-based, either as repeated form values or as a JSON
//! list serialized into one field (`"[1, 2, 3]"`). Format problems are caught
//! before the document is opened; range problems once the page count is known.

use serde_json::Value;

use crate::error::{TransformError, TransformResult};

const FORMAT_HINT: &str = "Expected a list of page numbers, e.g. [1, 2, 3]";

/// Requested pages, as given by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSelection {
    All,
    /// 1-based page numbers, duplicates removed, first-seen order kept
    Explicit(Vec<u64>),
}

impl PageSelection {
    /// Build a selection from the `extract_all` and `pages` form fields
    pub fn from_form(extract_all: Option<&str>, pages: &[String]) -> TransformResult<Self> {
        if extract_all.is_some_and(parse_flag) {
            return Ok(PageSelection::All);
        }

        match pages {
            [] => Err(TransformError::validation(
                "Field 'pages' is required unless extract_all is true",
            )),
            [text] => Self::parse(text),
            values => {
                let items = values
                    .iter()
                    .map(|v| {
                        serde_json::from_str::<Value>(v.trim())
                            .unwrap_or_else(|_| Value::String(v.clone()))
                    })
                    .collect::<Vec<_>>();
                Self::from_items(&items)
            }
        }
    }

    /// Parse the textual form of a page list
    pub fn parse(text: &str) -> TransformResult<Self> {
        let value: Value = serde_json::from_str(text.trim()).map_err(|_| {
            TransformError::validation(format!("Invalid format for pages. {}", FORMAT_HINT))
        })?;
        Self::from_value(&value)
    }

    /// Validate an already-decoded page list
    pub fn from_value(value: &Value) -> TransformResult<Self> {
        match value {
            Value::Array(items) => Self::from_items(items),
            _ => Err(TransformError::validation(format!(
                "Invalid format for pages. {}",
                FORMAT_HINT
            ))),
        }
    }

    fn from_items(items: &[Value]) -> TransformResult<Self> {
        if items.is_empty() {
            return Err(TransformError::validation("No pages requested"));
        }

        let mut pages: Vec<u64> = Vec::with_capacity(items.len());
        for item in items {
            let page = match item.as_i64() {
                Some(n) if n >= 1 => n as u64,
                Some(n) => {
                    return Err(TransformError::validation(format!(
                        "Page numbers start at 1; got {}",
                        n
                    )));
                }
                None => match item.as_u64() {
                    Some(n) => n,
                    None => {
                        return Err(TransformError::validation(format!(
                            "Page numbers must be integers; got {}",
                            item
                        )));
                    }
                },
            };
            if !pages.contains(&page) {
                pages.push(page);
            }
        }

        Ok(PageSelection::Explicit(pages))
    }

    /// Zero-based page indices for a document with `page_count` pages
    pub fn resolve(&self, page_count: usize) -> TransformResult<Vec<usize>> {
        match self {
            PageSelection::All => Ok((0..page_count).collect()),
            PageSelection::Explicit(pages) => pages
                .iter()
                .map(|&page| {
                    let index = usize::try_from(page - 1).unwrap_or(usize::MAX);
                    if index < page_count {
                        Ok(index)
                    } else {
                        Err(TransformError::validation(format!(
                            "Page {} is out of range; the document has {} page{}",
                            page,
                            page_count,
                            if page_count == 1 { "" } else { "s" }
                        )))
                    }
                })
                .collect(),
        }
    }
}

/// Interpret a boolean form field
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(err: TransformError) -> String {
        assert!(matches!(err, TransformError::Validation { .. }));
        err.to_string()
    }

    #[test]
    fn test_textual_list_within_range() {
        let selection = PageSelection::parse("[1,2,3]").unwrap();
        assert_eq!(selection.resolve(5).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_zero_rejected() {
        let err = PageSelection::parse("[0]").unwrap_err();
        assert!(message(err).contains("start at 1"));
    }

    #[test]
    fn test_negative_rejected() {
        let err = PageSelection::parse("[2, -1]").unwrap_err();
        assert!(message(err).contains("got -1"));
    }

    #[test]
    fn test_beyond_page_count_rejected() {
        let selection = PageSelection::parse("[6]").unwrap();
        let err = selection.resolve(5).unwrap_err();
        assert!(message(err).contains("out of range"));
    }

    #[test]
    fn test_not_a_list_rejected() {
        let err = PageSelection::parse("not-a-list").unwrap_err();
        assert!(message(err).contains("Invalid format"));

        let err = PageSelection::parse("3").unwrap_err();
        assert!(message(err).contains("Invalid format"));
    }

    #[test]
    fn test_non_integer_element_rejected() {
        let err = PageSelection::parse("[1, \"two\"]").unwrap_err();
        assert!(message(err).contains("must be integers"));

        let err = PageSelection::parse("[1.5]").unwrap_err();
        assert!(message(err).contains("must be integers"));
    }

    #[test]
    fn test_empty_list_rejected() {
        let err = PageSelection::parse("[]").unwrap_err();
        assert!(message(err).contains("No pages"));
    }

    #[test]
    fn test_duplicates_collapse_in_order() {
        let selection = PageSelection::parse("[3, 1, 3]").unwrap();
        assert_eq!(selection, PageSelection::Explicit(vec![3, 1]));
        assert_eq!(selection.resolve(3).unwrap(), vec![2, 0]);
    }

    #[test]
    fn test_extract_all_overrides_pages() {
        let selection = PageSelection::from_form(Some("True"), &["garbage".to_string()]).unwrap();
        assert_eq!(selection, PageSelection::All);
        assert_eq!(selection.resolve(3).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_pages_required_without_extract_all() {
        let err = PageSelection::from_form(Some("false"), &[]).unwrap_err();
        assert!(message(err).contains("required"));

        let err = PageSelection::from_form(None, &[]).unwrap_err();
        assert!(message(err).contains("required"));
    }

    #[test]
    fn test_repeated_form_values() {
        let values = vec!["2".to_string(), "4".to_string()];
        let selection = PageSelection::from_form(None, &values).unwrap();
        assert_eq!(selection, PageSelection::Explicit(vec![2, 4]));

        let values = vec!["2".to_string(), "x".to_string()];
        assert!(PageSelection::from_form(None, &values).is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" YES "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }
}
