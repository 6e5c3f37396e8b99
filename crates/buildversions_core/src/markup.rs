use std::collections::BTreeMap;

/// Elements that never carry children, whether or not they are written self-closed.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub name: String,
    pub attrs: BTreeMap<String, String>,
    pub children: Vec<Node>,
}

impl Element {
    fn new(name: String, attrs: BTreeMap<String, String>) -> Self {
        Self {
            name,
            attrs,
            children: Vec::new(),
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attrs
            .get("class")
            .is_some_and(|value| value.split_ascii_whitespace().any(|token| token == class))
    }

    /// Elements carrying `class`, starting with `self`, in document order.
    pub fn find_class(&self, class: &str) -> Vec<&Element> {
        let mut output = Vec::new();
        collect_class(self, class, &mut output);
        output
    }

    /// Text before the first child element, or `None` when there is none.
    pub fn text(&self) -> Option<String> {
        let mut text = String::new();
        for child in &self.children {
            match child {
                Node::Text(value) => text.push_str(value),
                Node::Element(_) => break,
            }
        }
        if text.is_empty() { None } else { Some(text) }
    }
}

fn collect_class<'a>(element: &'a Element, class: &str, output: &mut Vec<&'a Element>) {
    if element.has_class(class) {
        output.push(element);
    }
    for child in &element.children {
        if let Node::Element(child) = child {
            collect_class(child, class, output);
        }
    }
}

/// Scan a markup fragment into a tree rooted at an unnamed element.
///
/// Unknown closing tags are dropped and unclosed elements are closed at the end of
/// input, so any string produces a tree.
pub fn parse_fragment(html: &str) -> Element {
    let mut stack = vec![Element::default()];
    let mut text = String::new();
    let mut index = 0usize;

    while index < html.len() {
        let Some(lt) = html[index..].find('<') else {
            text.push_str(&html[index..]);
            break;
        };
        let at = index + lt;
        text.push_str(&html[index..at]);

        if starts_with_at(html, at, "<!--") {
            flush_text(&mut stack, &mut text);
            index = match index_of(html, "-->", at + 4) {
                Some(end) => end + 3,
                None => html.len(),
            };
            continue;
        }
        if starts_with_at(html, at, "<![CDATA[") {
            flush_text(&mut stack, &mut text);
            let start = at + "<![CDATA[".len();
            let end = index_of(html, "]]>", start).unwrap_or(html.len());
            push_node(&mut stack, Node::Text(html[start..end].to_string()));
            index = (end + 3).min(html.len());
            continue;
        }
        if starts_with_at(html, at, "<!") || starts_with_at(html, at, "<?") {
            flush_text(&mut stack, &mut text);
            index = match find_tag_end(html, at) {
                Some(end) => end + 1,
                None => html.len(),
            };
            continue;
        }
        if starts_with_at(html, at, "</") {
            let Some(end) = find_tag_end(html, at) else {
                text.push_str(&html[at..]);
                break;
            };
            flush_text(&mut stack, &mut text);
            let name = html[at + 2..end].trim().to_ascii_lowercase();
            close_element(&mut stack, &name);
            index = end + 1;
            continue;
        }

        let name = read_tag_name(html, at + 1);
        if name.is_empty() {
            text.push('<');
            index = at + 1;
            continue;
        }
        let Some(end) = find_tag_end(html, at) else {
            text.push_str(&html[at..]);
            break;
        };
        flush_text(&mut stack, &mut text);
        let raw = &html[at..=end];
        let name = name.to_ascii_lowercase();
        let body = &raw[1 + name.len()..raw.len() - 1];
        let element = Element::new(name.clone(), parse_attributes(body));
        let self_closing = raw[..raw.len() - 1].trim_end().ends_with('/');
        if self_closing || VOID_ELEMENTS.contains(&name.as_str()) {
            push_node(&mut stack, Node::Element(element));
        } else {
            stack.push(element);
        }
        index = end + 1;
    }

    flush_text(&mut stack, &mut text);
    while stack.len() > 1 {
        pop_into_parent(&mut stack);
    }
    stack.pop().unwrap_or_default()
}

fn flush_text(stack: &mut [Element], text: &mut String) {
    if text.is_empty() {
        return;
    }
    let decoded = decode_html(text);
    text.clear();
    push_node(stack, Node::Text(decoded));
}

fn push_node(stack: &mut [Element], node: Node) {
    if let Some(top) = stack.last_mut() {
        top.children.push(node);
    }
}

fn pop_into_parent(stack: &mut Vec<Element>) {
    if let Some(element) = stack.pop() {
        push_node(stack, Node::Element(element));
    }
}

fn close_element(stack: &mut Vec<Element>, name: &str) {
    let Some(position) = stack
        .iter()
        .skip(1)
        .rposition(|element| element.name == name)
    else {
        return;
    };
    // `position` is relative to the skipped root.
    while stack.len() > position + 1 {
        pop_into_parent(stack);
    }
}

fn read_tag_name(html: &str, start: usize) -> &str {
    let bytes = html.as_bytes();
    let mut index = start;
    while index < bytes.len() {
        let byte = bytes[index];
        let allowed = if index == start {
            byte.is_ascii_alphabetic()
        } else {
            byte.is_ascii_alphanumeric() || matches!(byte, b':' | b'-' | b'_' | b'.')
        };
        if !allowed {
            break;
        }
        index += 1;
    }
    &html[start..index]
}

/// Index of the `>` that closes the tag opened at `start`; quoted values may hold `>`.
fn find_tag_end(html: &str, start: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    html[start..].char_indices().find_map(|(offset, ch)| {
        match (quote, ch) {
            (Some(active), _) if active == ch => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '>') => return Some(start + offset),
            (None, _) => {}
        }
        None
    })
}

/// Attributes of a tag body (the text between the tag name and `>`). Names are
/// case-folded and the first occurrence of a name wins.
fn parse_attributes(body: &str) -> BTreeMap<String, String> {
    let mut attrs = BTreeMap::new();
    let mut rest = body;
    loop {
        rest = rest.trim_start_matches(|ch: char| ch.is_whitespace() || ch == '/');
        if rest.is_empty() {
            break;
        }
        let name_len = rest
            .find(|ch: char| ch.is_whitespace() || ch == '=' || ch == '/')
            .unwrap_or(rest.len());
        if name_len == 0 {
            // Stray `=`.
            rest = &rest[1..];
            continue;
        }
        let name = rest[..name_len].to_ascii_lowercase();
        rest = rest[name_len..].trim_start();

        let mut value = String::new();
        if let Some(assigned) = rest.strip_prefix('=') {
            let (raw, remainder) = split_attribute_value(assigned.trim_start());
            value = decode_html(raw);
            rest = remainder;
        }
        attrs.entry(name).or_insert(value);
    }
    attrs
}

/// Split off a quoted or bare attribute value, returning it with the unread remainder.
fn split_attribute_value(text: &str) -> (&str, &str) {
    match text.chars().next() {
        Some(quote @ ('"' | '\'')) => {
            let inner = &text[1..];
            match inner.find(quote) {
                Some(end) => (&inner[..end], &inner[end + 1..]),
                None => (inner, ""),
            }
        }
        _ => text.split_at(text.find(char::is_whitespace).unwrap_or(text.len())),
    }
}

fn index_of(text: &str, search: &str, start: usize) -> Option<usize> {
    text.get(start..)?.find(search).map(|offset| start + offset)
}

fn starts_with_at(text: &str, index: usize, sequence: &str) -> bool {
    text.as_bytes()
        .get(index..index + sequence.len())
        .is_some_and(|slice| slice == sequence.as_bytes())
}

/// Named references decoded in text and attribute values. Unknown names are kept
/// verbatim.
const NAMED_ENTITIES: &[(&str, char)] = &[
    ("amp", '&'),
    ("lt", '<'),
    ("gt", '>'),
    ("quot", '"'),
    ("apos", '\''),
    ("nbsp", '\u{a0}'),
    ("shy", '\u{ad}'),
    ("copy", '©'),
    ("reg", '®'),
    ("trade", '™'),
    ("deg", '°'),
    ("middot", '·'),
    ("bull", '•'),
    ("hellip", '…'),
    ("ndash", '–'),
    ("mdash", '—'),
    ("lsquo", '‘'),
    ("rsquo", '’'),
    ("ldquo", '“'),
    ("rdquo", '”'),
    ("laquo", '«'),
    ("raquo", '»'),
    ("euro", '€'),
    ("aelig", 'æ'),
    ("AElig", 'Æ'),
    ("oslash", 'ø'),
    ("Oslash", 'Ø'),
    ("aring", 'å'),
    ("Aring", 'Å'),
    ("auml", 'ä'),
    ("Auml", 'Ä'),
    ("ouml", 'ö'),
    ("Ouml", 'Ö'),
    ("uuml", 'ü'),
    ("Uuml", 'Ü'),
    ("szlig", 'ß'),
    ("eacute", 'é'),
    ("Eacute", 'É'),
    ("egrave", 'è'),
    ("aacute", 'á'),
    ("oacute", 'ó'),
    ("iacute", 'í'),
    ("uacute", 'ú'),
    ("ccedil", 'ç'),
    ("ntilde", 'ñ'),
];

/// Longest reference body considered, e.g. `#x10FFFF` or `hellip`.
const MAX_REFERENCE_LEN: usize = 10;

/// Decode character references: numeric (`&#8209;`, `&#x2011;`) and the names in
/// [`NAMED_ENTITIES`]. Anything else, including a bare `&`, is left as written.
pub fn decode_html(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        output.push_str(&rest[..amp]);
        rest = &rest[amp..];
        match decode_reference(rest) {
            Some((ch, consumed)) => {
                output.push(ch);
                rest = &rest[consumed..];
            }
            None => {
                output.push('&');
                rest = &rest[1..];
            }
        }
    }
    output.push_str(rest);
    output
}

/// Decode the reference at the start of `text` (which begins with `&`), returning
/// the character and the number of bytes it spans.
fn decode_reference(text: &str) -> Option<(char, usize)> {
    let semicolon = text
        .get(1..)?
        .char_indices()
        .take(MAX_REFERENCE_LEN + 1)
        .find(|(_, ch)| *ch == ';')
        .map(|(offset, _)| offset + 1)?;
    let reference = &text[1..semicolon];
    let ch = match reference.strip_prefix('#') {
        Some(numeric) => {
            let code = match numeric.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse::<u32>().ok()?,
            };
            char::from_u32(code)?
        }
        None => NAMED_ENTITIES
            .iter()
            .find(|(name, _)| *name == reference)
            .map(|(_, ch)| *ch)?,
    };
    Some((ch, semicolon + 1))
}

pub fn escape_html(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&quot;"),
            '\'' => output.push_str("&#39;"),
            _ => output.push(ch),
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::{Node, decode_html, escape_html, parse_fragment};

    #[test]
    fn fragment_tree_nests_elements_and_keeps_leading_text() {
        let root = parse_fragment(
            r#"<div class="outer"><p class="label">Gateway</p><span>a<b>b</b>c</span></div>"#,
        );
        let outer = root.find_class("outer");
        assert_eq!(outer.len(), 1);
        assert_eq!(outer[0].name, "div");
        let label = outer[0].find_class("label");
        assert_eq!(label[0].text().as_deref(), Some("Gateway"));

        let Node::Element(span) = &outer[0].children[1] else {
            panic!("expected span element");
        };
        assert_eq!(span.text().as_deref(), Some("a"));
    }

    #[test]
    fn class_lookup_matches_tokens_and_includes_self() {
        let root = parse_fragment(r#"<td class="commit wide"><a class="commit-link">x</a></td>"#);
        let cells = root.find_class("commit");
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].find_class("commit").len(), 1);
        assert_eq!(cells[0].find_class("commit-link").len(), 1);
        assert!(cells[0].find_class("wid").is_empty());
    }

    #[test]
    fn void_and_self_closed_elements_do_not_swallow_siblings() {
        let root = parse_fragment(
            r#"<div class="a">x</div><br></br><br/><hr><div class="b">y</div>"#,
        );
        assert_eq!(root.find_class("a")[0].text().as_deref(), Some("x"));
        assert_eq!(root.find_class("b")[0].text().as_deref(), Some("y"));
    }

    #[test]
    fn comments_cdata_and_stray_markup_are_tolerated() {
        let root = parse_fragment(
            "<!-- <p class=\"x\">no</p> --><p class=\"x\">1 < 2</p></span><p class=\"y\"><![CDATA[a&b]]></p><div",
        );
        let found = root.find_class("x");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text().as_deref(), Some("1 < 2"));
        assert_eq!(root.find_class("y")[0].text().as_deref(), Some("a&b"));
    }

    #[test]
    fn unclosed_elements_are_closed_at_end_of_input() {
        let root = parse_fragment(r#"<div class="a"><p class="b">text"#);
        let outer = root.find_class("a");
        assert_eq!(outer[0].find_class("b")[0].text().as_deref(), Some("text"));
    }

    #[test]
    fn attributes_are_decoded_and_case_folded() {
        let root = parse_fragment(r#"<A CLASS="commit-link" HREF="https://x/?a=1&amp;b=2">c</A>"#);
        let link = root.find_class("commit-link");
        assert_eq!(link[0].name, "a");
        assert_eq!(
            link[0].attrs.get("href").map(String::as_str),
            Some("https://x/?a=1&b=2")
        );
    }

    #[test]
    fn escape_and_decode_are_inverse_for_plain_text() {
        let raw = r#"<release & "hotfix" 'b'>"#;
        assert_eq!(decode_html(&escape_html(raw)), raw);
        assert_eq!(decode_html("&amp;lt;"), "&lt;");
    }

    #[test]
    fn numeric_and_named_references_are_decoded() {
        assert_eq!(decode_html("Bestilling&oslash;"), "Bestillingø");
        assert_eq!(decode_html("prod&#8209;eu"), "prod\u{2011}eu");
        assert_eq!(decode_html("prod&#x2011;eu"), "prod\u{2011}eu");
        assert_eq!(decode_html("a&ndash;b&hellip;"), "a–b…");
        assert_eq!(decode_html("&#39;x&#X27;"), "'x'");
    }

    #[test]
    fn unknown_or_broken_references_are_kept() {
        assert_eq!(decode_html("&bogus; R&D &"), "&bogus; R&D &");
        assert_eq!(decode_html("&#xZZ; &#1114112; &#;"), "&#xZZ; &#1114112; &#;");
        assert_eq!(decode_html("&amp"), "&amp");
    }

    #[test]
    fn attribute_values_may_be_bare_single_quoted_or_missing() {
        let root = parse_fragment(
            r#"<td class=commit data-x='a "b"' hidden class="ignored" title = "t">x</td>"#,
        );
        let cell = root.find_class("commit");
        assert_eq!(cell.len(), 1);
        let attrs = &cell[0].attrs;
        assert_eq!(attrs.get("data-x").map(String::as_str), Some(r#"a "b""#));
        assert_eq!(attrs.get("hidden").map(String::as_str), Some(""));
        assert_eq!(attrs.get("title").map(String::as_str), Some("t"));
        assert_eq!(attrs.get("class").map(String::as_str), Some("commit"));
    }
}
