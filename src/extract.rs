//! HTML parsing for finished replies.
//!
//! The transport hands over outer HTML snapshots; everything here is a pure
//! function so it can be tested without a browser.

use std::time::Duration;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::models::SearchResult;
use crate::selectors;

const SERVER_BUSY: &str = "the server is busy. please try again later.";

/// Joins the markdown blocks of a reply node into one text body.
pub(crate) fn reply_text(html: &str) -> String {
    let document = Html::parse_fragment(html);
    let block = Selector::parse(selectors::MARKDOWN_BLOCK).unwrap();

    document
        .select(&block)
        .map(|b| b.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Texts of the reply node's extra-option chips, where the "Thought for N
/// seconds" and "Found N results" markers live. Second and third children of
/// the reply node; scoping to them keeps an answer body that merely mentions
/// those phrases from being mistaken for a chip.
pub(crate) fn chip_texts(html: &str) -> Vec<String> {
    let document = Html::parse_fragment(html);
    let Some(reply) = child_elements(document.root_element()).into_iter().next() else {
        return Vec::new();
    };
    child_elements(reply)
        .into_iter()
        .skip(1)
        .take(2)
        .map(element_text)
        .collect()
}

pub(crate) fn is_server_busy(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case(SERVER_BUSY)
}

/// Parses the "Thought for N seconds" chip text out of a reply body.
pub(crate) fn thought_duration(text: &str) -> Option<Duration> {
    let re = Regex::new(r"(?i)thought for (\d+(?:\.\d+)?) seconds").unwrap();
    let secs: f64 = re.captures(text)?.get(1)?.as_str().parse().ok()?;
    Some(Duration::from_secs_f64(secs))
}

/// True when the reply carries a "Found N results" search chip.
pub(crate) fn has_search_results(text: &str) -> bool {
    let re = Regex::new(r"(?i)found \d+ results").unwrap();
    re.is_match(text)
}

/// Joins the paragraphs of the DeepThink trace container.
pub(crate) fn deepthink_text(html: &str) -> Option<String> {
    let document = Html::parse_fragment(html);
    let paragraph = Selector::parse("p").unwrap();

    let text = document
        .select(&paragraph)
        .map(|p| p.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    (!text.is_empty()).then_some(text)
}

/// Parses the search results panel.
///
/// Panel layout: a "Search Results" header followed by the result list. Each
/// result is a meta row (favicon, website, date, rank), a title, and a
/// description, in child order. Malformed entries are skipped.
pub(crate) fn search_results(panel_html: &str) -> Vec<SearchResult> {
    let document = Html::parse_fragment(panel_html);
    let img = Selector::parse("img").unwrap();

    let Some(panel) = child_elements(document.root_element()).into_iter().next() else {
        return Vec::new();
    };
    let Some(list) = child_elements(panel).into_iter().nth(1) else {
        return Vec::new();
    };

    let mut results = Vec::new();
    for item in child_elements(list) {
        let children = child_elements(item);
        let [meta, title, description] = children.as_slice() else {
            continue;
        };

        let meta_children = child_elements(*meta);
        if meta_children.len() < 4 {
            continue;
        }
        let image_url = meta
            .select(&img)
            .next()
            .and_then(|i| i.value().attr("src"))
            .unwrap_or_default()
            .to_string();
        let Ok(index) = element_text(meta_children[3]).parse::<u32>() else {
            continue;
        };

        results.push(SearchResult {
            image_url,
            website: element_text(meta_children[1]),
            date: element_text(meta_children[2]),
            index,
            title: element_text(*title),
            description: element_text(*description),
        });
    }

    results
}

fn child_elements(element: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    element.children().filter_map(ElementRef::wrap).collect()
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_text_joins_markdown_blocks() {
        let html = r#"<div class="f9bf7997 d7dc56a8 c05b5566">
            <div class="ds-markdown ds-markdown--block"><p>Hello <strong>there</strong></p></div>
            <div class="ds-markdown ds-markdown--block"><p>Second block</p></div>
        </div>"#;
        assert_eq!(reply_text(html), "Hello there\n\nSecond block");
    }

    #[test]
    fn test_reply_text_empty_without_markdown() {
        assert_eq!(reply_text("<div><span>chrome</span></div>"), "");
    }

    #[test]
    fn test_server_busy_detection() {
        assert!(is_server_busy("The server is busy. Please try again later."));
        assert!(!is_server_busy("All good"));
    }

    #[test]
    fn test_thought_duration_parsing() {
        assert_eq!(
            thought_duration("Thought for 17 seconds"),
            Some(Duration::from_secs(17))
        );
        assert_eq!(
            thought_duration("prefix Thought for 2.5 seconds suffix"),
            Some(Duration::from_secs_f64(2.5))
        );
        assert_eq!(thought_duration("no chip here"), None);
    }

    #[test]
    fn test_chip_texts_cover_only_the_extra_options() {
        let html = r#"<div class="f9bf7997 d7dc56a8 c05b5566">
            <div><div class="ds-markdown ds-markdown--block"><p>I thought for 5 seconds about this</p></div></div>
            <div>Thought for 12 seconds</div>
            <div>Found 3 results</div>
        </div>"#;
        let chips = chip_texts(html);
        assert_eq!(chips, vec!["Thought for 12 seconds", "Found 3 results"]);
    }

    #[test]
    fn test_body_text_is_not_mistaken_for_a_chip() {
        // The answer body mentions the chip phrase; only real chips count.
        let html = r#"<div class="f9bf7997 d7dc56a8 c05b5566">
            <div><div class="ds-markdown ds-markdown--block"><p>Thought for 5 seconds</p></div></div>
        </div>"#;
        let chips = chip_texts(html);
        assert!(chips.iter().find_map(|c| thought_duration(c)).is_none());
    }

    #[test]
    fn test_search_chip_detection() {
        assert!(has_search_results("Found 25 results"));
        assert!(!has_search_results("Thought for 3 seconds"));
    }

    #[test]
    fn test_deepthink_text_joins_paragraphs() {
        let html = r#"<div class="e1675d8b"><p>First thought.</p><p>Second thought.</p></div>"#;
        assert_eq!(
            deepthink_text(html).as_deref(),
            Some("First thought.\nSecond thought.")
        );
        assert!(deepthink_text("<div></div>").is_none());
    }

    #[test]
    fn test_search_results_parsing() {
        let html = r#"<div class="fe369d61 f529c936">
            <div>Search Results</div>
            <div>
                <div>
                    <div>
                        <div><img src="https://example.com/icon.png"></div>
                        <div>example.com</div>
                        <div>2025-01-01</div>
                        <div>1</div>
                    </div>
                    <div>Example title</div>
                    <div>Example description</div>
                </div>
                <div>
                    <div><span>malformed entry</span></div>
                </div>
            </div>
        </div>"#;

        let results = search_results(html);
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.image_url, "https://example.com/icon.png");
        assert_eq!(r.website, "example.com");
        assert_eq!(r.date, "2025-01-01");
        assert_eq!(r.index, 1);
        assert_eq!(r.title, "Example title");
        assert_eq!(r.description, "Example description");
    }
}
