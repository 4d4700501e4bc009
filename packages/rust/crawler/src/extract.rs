//! Article extraction: headline and readable body text from raw HTML.
//!
//! The body is taken from the paragraphs of the main content area
//! (`article`, `main`, `[role="main"]`, then `body`), skipping anything
//! nested inside page chrome such as navigation, footers, and forms.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Node, Selector};

use meetnews_shared::{MeetNewsError, Result};

/// Elements whose content never counts as article text.
const BOILERPLATE: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "noscript", "iframe", "form", "svg",
];

/// Content containers, most specific first.
const CONTAINERS: &[&str] = &["article", "main", r#"[role="main"]"#, "body"];

static WHITESPACE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\s+").expect("valid whitespace regex"));

/// Headline and body extracted from a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub title: String,
    pub text: String,
}

/// Extract an article from an HTML document.
///
/// Fails with a parse error when either the title or the body is empty,
/// including a body left empty by the `max_chars` cut.
pub fn extract_article(html: &str, max_chars: usize) -> Result<Article> {
    let doc = Html::parse_document(html);

    let title = extract_title(&doc)
        .ok_or_else(|| MeetNewsError::parse("no title found"))?;

    let body = extract_body(&doc);
    let text = truncate_chars(&body, max_chars).trim_end().to_string();
    if text.is_empty() {
        return Err(MeetNewsError::parse("no article text found"));
    }

    Ok(Article { title, text })
}

/// `og:title`, then `<title>`, then the first `<h1>`.
fn extract_title(doc: &Html) -> Option<String> {
    let og = Selector::parse(r#"meta[property="og:title"]"#).unwrap();
    let og_title = doc
        .select(&og)
        .find_map(|el| el.value().attr("content"))
        .map(normalise);

    og_title
        .filter(|t| !t.is_empty())
        .or_else(|| first_text(doc, "title"))
        .or_else(|| first_text(doc, "h1"))
}

fn first_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel)
        .map(|el| normalise(&el.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

/// Paragraph text of the first content container that yields any.
fn extract_body(doc: &Html) -> String {
    let p_sel = Selector::parse("p").unwrap();

    for container_sel in CONTAINERS {
        let Ok(sel) = Selector::parse(container_sel) else {
            continue;
        };
        let Some(container) = doc.select(&sel).next() else {
            continue;
        };

        let paragraphs: Vec<String> = container
            .select(&p_sel)
            .filter(|p| !p.ancestors().any(|a| is_boilerplate(a.value())))
            .map(|p| normalise(&p.text().collect::<String>()))
            .filter(|t| !t.is_empty())
            .collect();

        if !paragraphs.is_empty() {
            return paragraphs.join("\n");
        }

        // No <p> markup: fall back to all visible text in the container.
        let loose = loose_text(container);
        if !loose.is_empty() {
            return loose;
        }
    }

    String::new()
}

fn loose_text(container: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    for node in container.descendants() {
        if let Node::Text(text) = node.value() {
            if !node.ancestors().any(|a| is_boilerplate(a.value())) {
                let t: &str = text;
                parts.push(t);
            }
        }
    }
    normalise(&parts.join(" "))
}

fn is_boilerplate(node: &Node) -> bool {
    node.as_element()
        .is_some_and(|e| BOILERPLATE.contains(&e.name()))
}

/// Collapse runs of whitespace and trim.
fn normalise(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Cut to at most `max_chars` characters on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEWS_PAGE: &str = r#"<html><head>
        <title>Chipmaker beats forecasts | Daily Tech</title>
        <meta property="og:title" content="Chipmaker beats forecasts">
        </head><body>
        <header><p>Subscribe now</p></header>
        <nav><a href="/">Home</a></nav>
        <article>
          <h1>Chipmaker beats forecasts</h1>
          <p>Quarterly revenue   rose 20%
             on AI demand.</p>
          <p>Shares climbed in early trading.</p>
          <aside><p>Related: other news</p></aside>
        </article>
        <footer><p>Copyright 2025</p></footer>
        <script>var tracker = 1;</script>
        </body></html>"#;

    #[test]
    fn extracts_og_title_and_article_paragraphs() {
        let article = extract_article(NEWS_PAGE, 10_000).unwrap();
        assert_eq!(article.title, "Chipmaker beats forecasts");
        assert_eq!(
            article.text,
            "Quarterly revenue rose 20% on AI demand.\nShares climbed in early trading."
        );
        assert!(!article.text.contains("Related"));
        assert!(!article.text.contains("Subscribe"));
    }

    #[test]
    fn title_falls_back_to_title_tag_then_h1() {
        let html = "<html><head><title> Plain title </title></head><body><p>Body</p></body></html>";
        assert_eq!(extract_article(html, 100).unwrap().title, "Plain title");

        let html = "<html><body><h1>Heading only</h1><p>Body</p></body></html>";
        assert_eq!(extract_article(html, 100).unwrap().title, "Heading only");
    }

    #[test]
    fn missing_title_is_an_error() {
        let html = "<html><body><p>Body without any heading</p></body></html>";
        assert!(extract_article(html, 100).is_err());
    }

    #[test]
    fn missing_text_is_an_error() {
        let html = "<html><head><title>T</title></head><body><nav><p>menu</p></nav></body></html>";
        let err = extract_article(html, 100).unwrap_err();
        assert!(err.to_string().contains("no article text"));
    }

    #[test]
    fn loose_text_used_without_paragraphs() {
        let html = "<html><head><title>T</title></head><body><main><div>Loose   body text</div><script>x()</script></main></body></html>";
        assert_eq!(extract_article(html, 100).unwrap().text, "Loose body text");
    }

    #[test]
    fn body_cut_to_nothing_is_an_error() {
        let html = "<html><head><title>T</title></head><body><p>Body</p></body></html>";
        assert!(extract_article(html, 0).is_err());
    }

    #[test]
    fn cut_body_has_no_trailing_whitespace() {
        let html = "<html><head><title>T</title></head><body><p>ab</p><p>cd</p></body></html>";
        assert_eq!(extract_article(html, 3).unwrap().text, "ab");
    }

    #[test]
    fn truncates_on_char_boundary() {
        assert_eq!(truncate_chars("회의록요약", 3), "회의록");
        assert_eq!(truncate_chars("short", 100), "short");
    }
}
