//! Markup stripping and entity decoding for scraped text
//!
//! The portal embeds spans, links and images inside table cells and HTML
//! entities inside names. Everything stored downstream goes through
//! [`clean_text`].

use scraper::Html;

/// Removes tags, decodes entities and collapses whitespace
///
/// # Example
///
/// ```
/// use lmis_harvest::markup::clean_text;
///
/// assert_eq!(clean_text("<b>Cox&#039;s</b>  Bazar"), "Cox's Bazar");
/// ```
pub fn clean_text(raw: &str) -> String {
    if !raw.contains('<') && !raw.contains('&') {
        return collapse_whitespace(raw);
    }
    let fragment = Html::parse_fragment(raw);
    let text: String = fragment.root_element().text().collect();
    collapse_whitespace(&text)
}

/// True if the raw cell markup contains the given marker (e.g. an image name)
pub fn contains_marker(raw: &str, marker: &str) -> bool {
    !marker.is_empty() && raw.contains(marker)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_passthrough() {
        assert_eq!(clean_text("  Bhola   RWH "), "Bhola RWH");
    }

    #[test]
    fn test_strips_nested_tags() {
        assert_eq!(
            clean_text("<a href='#'><span style='color:red'>120</span></a>"),
            "120"
        );
    }

    #[test]
    fn test_decodes_entities() {
        assert_eq!(clean_text("A &amp; B"), "A & B");
        assert_eq!(clean_text("Cox&#039;s Bazar"), "Cox's Bazar");
    }

    #[test]
    fn test_image_only_cell_is_empty() {
        assert_eq!(clean_text("<img src='images/tick.png'/>"), "");
        assert!(contains_marker("<img src='images/tick.png'/>", "tick.png"));
        assert!(!contains_marker("<img src='images/cross.png'/>", "tick.png"));
    }
}
