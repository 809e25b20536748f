use crate::tokenizer::{tokenize, Token, TokenContext};
use encoding_rs::Encoding;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};

lazy_static! {
    static ref HTML_INDICATORS: Vec<Regex> = [r"(?i)<html", r"(?i)<body", r"(?i)<div", r"(?i)<p>", r"(?i)<script", r"(?i)<style"]
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect();
    static ref SCRIPT: Regex = Regex::new(r"(?is)<script\b.*?</script\s*>").expect("valid regex");
    static ref STYLE: Regex = Regex::new(r"(?is)<style\b.*?</style\s*>").expect("valid regex");
    static ref HEAD: Regex = Regex::new(r"(?is)<head\b.*?</head\s*>").expect("valid regex");
    static ref COMMENT: Regex = Regex::new(r"(?s)<!--.*?-->").expect("valid regex");
    static ref SEL_TITLE: Selector = Selector::parse("title, h1").expect("valid selector");
    static ref SEL_META: Selector = Selector::parse("meta[name]").expect("valid selector");
    static ref SEL_A: Selector = Selector::parse("a[href]").expect("valid selector");
}

const HEADER_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];
const EMPHASIS_TAGS: &[&str] = &["em", "strong", "b", "i"];
const SILENT_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Structural extraction over raw markup.
pub trait MarkupExtractor {
    fn clean(&self, markup: &str) -> String;
    fn tokenize(&self, markup: &str) -> Vec<Token>;
    fn title(&self, markup: &str) -> String;
    fn description(&self, markup: &str) -> String;
    fn links(&self, markup: &str) -> Vec<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlExtractor;

impl MarkupExtractor for HtmlExtractor {
    fn clean(&self, markup: &str) -> String {
        let s = COMMENT.replace_all(markup, "");
        let s = SCRIPT.replace_all(&s, "");
        let s = STYLE.replace_all(&s, "");
        HEAD.replace_all(&s, "").into_owned()
    }

    fn tokenize(&self, markup: &str) -> Vec<Token> {
        let doc = Html::parse_document(markup);
        let mut tokens = Vec::new();
        for node in doc.root_element().descendants() {
            let Some(text) = node.value().as_text() else { continue };
            if text.trim().is_empty() {
                continue;
            }
            let mut context = TokenContext::PLAIN;
            let mut silent = false;
            for name in node.ancestors().filter_map(|a| a.value().as_element()).map(|e| e.name()) {
                if HEADER_TAGS.contains(&name) {
                    context.is_header = true;
                } else if EMPHASIS_TAGS.contains(&name) {
                    context.is_emphasized = true;
                } else if SILENT_TAGS.contains(&name) {
                    silent = true;
                }
            }
            if !silent {
                tokens.extend(tokenize(text, context));
            }
        }
        tokens
    }

    fn title(&self, markup: &str) -> String {
        let doc = Html::parse_document(markup);
        doc.select(&SEL_TITLE)
            .map(|n| n.text().collect::<String>().replace('\n', "").trim().to_string())
            .find(|t| !t.is_empty())
            .unwrap_or_default()
    }

    fn description(&self, markup: &str) -> String {
        let doc = Html::parse_document(markup);
        doc.select(&SEL_META)
            .filter(|m| m.value().attr("name").is_some_and(|n| n.eq_ignore_ascii_case("description")))
            .filter_map(|m| m.value().attr("content"))
            .last()
            .map(|c| c.trim().to_string())
            .unwrap_or_default()
    }

    fn links(&self, markup: &str) -> Vec<String> {
        let doc = Html::parse_document(markup);
        doc.select(&SEL_A)
            .filter_map(|a| a.value().attr("href"))
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect()
    }
}

/// Cheap check that content looks like markup at all.
pub fn is_html(content: &str) -> bool {
    HTML_INDICATORS.iter().any(|re| re.is_match(content))
}

/// Reinterpret `content` in its declared encoding.
///
/// Unknown labels and malformed input return the content unchanged.
pub fn decode_content(content: &str, declared: &str) -> String {
    let label = declared.trim();
    if label.is_empty() || label.eq_ignore_ascii_case("utf-8") || label.eq_ignore_ascii_case("utf8") {
        return content.to_string();
    }
    let Some(encoding) = Encoding::for_label(label.as_bytes()) else {
        return content.to_string();
    };
    match encoding.decode_without_bom_handling_and_without_replacement(content.as_bytes()) {
        Some(decoded) => decoded.into_owned(),
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title>Graph Mining
    Lab</title><meta name="description" content="Research group"><script>var hidden = 1;</script></head>
    <body><!-- skip me --><h1>Welcome Students</h1><p>We study <strong>graphs</strong> daily.</p>
    <a href="/people.html">People</a><a href="">empty</a></body></html>"#;

    #[test]
    fn extracts_metadata() {
        let x = HtmlExtractor;
        assert_eq!(x.title(PAGE), "Graph Mining    Lab");
        assert_eq!(x.description(PAGE), "Research group");
        assert_eq!(x.links(PAGE), vec!["/people.html".to_string()]);
    }

    #[test]
    fn tokens_carry_context() {
        let x = HtmlExtractor;
        let tokens = x.tokenize(&x.clean(PAGE));
        let welcom = tokens.iter().find(|t| t.value == "welcom").unwrap();
        assert!(welcom.is_header);
        let graph = tokens.iter().find(|t| t.value == "graph").unwrap();
        assert!(graph.is_emphasized && !graph.is_header);
        assert!(!tokens.iter().any(|t| t.value == "hidden" || t.value == "skip"));
    }

    #[test]
    fn html_heuristic() {
        assert!(is_html("<DIV>x</DIV>"));
        assert!(is_html("<p>hello"));
        assert!(!is_html("just some plain text"));
    }

    #[test]
    fn unknown_encoding_falls_back() {
        assert_eq!(decode_content("héllo", "not-a-charset"), "héllo");
        assert_eq!(decode_content("hello", "UTF-8"), "hello");
        assert_eq!(decode_content("hello", "iso-8859-1"), "hello");
    }
}
