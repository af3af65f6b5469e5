use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::{ElementRef, Html};

/// Render markdown to HTML for the post body / document export.
pub fn markdown_to_html(markdown: &str) -> String {
    let parser = pulldown_cmark::Parser::new(markdown);
    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, parser);
    html
}

/// Convert HTML (typically a word-processor export) to markdown.
///
/// Recognizes headings h1-h4 (deeper levels clamp to h4), paragraphs,
/// unordered/ordered lists, bold/italic, links and line breaks. Entities
/// are already decoded by the parser; non-breaking spaces become plain
/// spaces. Everything else passes through as text.
pub fn html_to_markdown(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut blocks = Vec::new();
    let mut pending = String::new();

    for child in document.root_element().children() {
        collect_blocks(child, &mut blocks, &mut pending);
    }
    flush_paragraph(&mut pending, &mut blocks);

    blocks.join("\n\n")
}

/// A document imported from HTML. A leading level-1 heading becomes the
/// title and is removed from the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedDocument {
    pub title: Option<String>,
    pub markdown: String,
}

pub fn import_document(html: &str) -> ImportedDocument {
    let markdown = html_to_markdown(html);
    let (title, markdown) = split_leading_heading(&markdown);
    ImportedDocument { title, markdown }
}

/// Split a leading "# " heading off a markdown document, returning the
/// heading text (if any) and the remaining body.
pub fn split_leading_heading(markdown: &str) -> (Option<String>, String) {
    match markdown.strip_prefix("# ") {
        Some(rest) => {
            let (first, body) = rest.split_once('\n').unwrap_or((rest, ""));
            (
                Some(first.trim().to_string()),
                body.trim_start_matches('\n').to_string(),
            )
        }
        None => (None, markdown.to_string()),
    }
}

/// First level-1 heading anywhere in a markdown document.
pub fn first_heading(markdown: &str) -> Option<String> {
    markdown
        .lines()
        .find_map(|line| line.trim().strip_prefix("# ").map(|t| t.trim().to_string()))
        .filter(|t| !t.is_empty())
}

fn collect_blocks(node: NodeRef<'_, Node>, blocks: &mut Vec<String>, pending: &mut String) {
    match node.value() {
        Node::Text(text) => append_text(pending, text),
        Node::Element(_) => {
            if let Some(element) = ElementRef::wrap(node) {
                block_element(element, blocks, pending);
            }
        }
        _ => {}
    }
}

fn block_element(element: ElementRef<'_>, blocks: &mut Vec<String>, pending: &mut String) {
    let tag = element.value().name().to_ascii_lowercase();
    match tag.as_str() {
        "script" | "style" | "noscript" | "head" | "title" | "meta" | "link" | "template" => {}
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            flush_paragraph(pending, blocks);
            // levels deeper than four clamp to four
            let level = tag[1..].parse::<usize>().unwrap_or(1).min(4);
            let text = render_inline(element);
            let text = text.trim();
            if !text.is_empty() {
                blocks.push(format!("{} {}", "#".repeat(level), text));
            }
        }
        "p" => {
            flush_paragraph(pending, blocks);
            let text = render_inline(element);
            let text = text.trim();
            if !text.is_empty() {
                blocks.push(text.to_string());
            }
        }
        "ul" | "ol" => {
            flush_paragraph(pending, blocks);
            let ordered = tag == "ol";
            let mut items = Vec::new();
            for child in element.children() {
                let li = match ElementRef::wrap(child) {
                    Some(el) if el.value().name().eq_ignore_ascii_case("li") => el,
                    _ => continue,
                };
                let text = render_inline(li);
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                if ordered {
                    items.push(format!("{}. {}", items.len() + 1, text));
                } else {
                    items.push(format!("- {text}"));
                }
            }
            if !items.is_empty() {
                blocks.push(items.join("\n"));
            }
        }
        "br" => pending.push('\n'),
        "b" | "strong" => wrap_emphasis(element, pending, "**"),
        "i" | "em" => wrap_emphasis(element, pending, "*"),
        "a" => append_link(element, pending),
        // containers (div, section, body, table cells, ...)
        _ => {
            for child in element.children() {
                collect_blocks(child, blocks, pending);
            }
        }
    }
}

fn flush_paragraph(pending: &mut String, blocks: &mut Vec<String>) {
    let text = pending.trim();
    if !text.is_empty() {
        blocks.push(text.to_string());
    }
    pending.clear();
}

/// Render the inline content of one block element.
fn render_inline(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for child in element.children() {
        inline_node(child, &mut out);
    }
    out
}

fn inline_node(node: NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(text) => append_text(out, text),
        Node::Element(_) => {
            if let Some(element) = ElementRef::wrap(node) {
                inline_element(element, out);
            }
        }
        _ => {}
    }
}

fn inline_element(element: ElementRef<'_>, out: &mut String) {
    let tag = element.value().name().to_ascii_lowercase();
    match tag.as_str() {
        "script" | "style" | "noscript" | "head" | "title" | "meta" | "link" | "template" => {}
        "br" => out.push('\n'),
        "b" | "strong" => wrap_emphasis(element, out, "**"),
        "i" | "em" => wrap_emphasis(element, out, "*"),
        "a" => append_link(element, out),
        _ => {
            for child in element.children() {
                inline_node(child, out);
            }
        }
    }
}

/// Wrap inline content in emphasis markers. Word-processor exports often
/// put the word-separating space *inside* the span; move it outside so
/// the markers hug the text.
fn wrap_emphasis(element: ElementRef<'_>, out: &mut String, marker: &str) {
    let inner = render_inline(element);
    let text = inner.trim();
    if text.is_empty() {
        if !inner.is_empty() {
            push_space(out);
        }
        return;
    }
    if inner.starts_with(char::is_whitespace) {
        push_space(out);
    }
    out.push_str(marker);
    out.push_str(text);
    out.push_str(marker);
    if inner.ends_with(char::is_whitespace) {
        push_space(out);
    }
}

fn append_link(element: ElementRef<'_>, out: &mut String) {
    let inner = render_inline(element);
    let text = inner.trim();
    match element.value().attr("href").map(str::trim) {
        Some(href) if !href.is_empty() && !text.is_empty() => {
            if inner.starts_with(char::is_whitespace) {
                push_space(out);
            }
            out.push_str(&format!("[{text}]({href})"));
            if inner.ends_with(char::is_whitespace) {
                push_space(out);
            }
        }
        _ => append_text(out, &inner),
    }
}

/// Append a text node, collapsing whitespace runs to a single space.
/// A newline already in `out` comes from an explicit <br> and is kept.
fn append_text(out: &mut String, text: &str) {
    for ch in text.chars() {
        let ch = if ch == '\u{a0}' { ' ' } else { ch };
        if ch.is_whitespace() {
            push_space(out);
        } else {
            out.push(ch);
        }
    }
}

fn push_space(out: &mut String) {
    if !out.is_empty() && !out.ends_with(' ') && !out.ends_with('\n') {
        out.push(' ');
    }
}
