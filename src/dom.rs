//! A small, tolerant HTML element tree.
//!
//! Pages are parsed into a [`Document`], rewritten in place, and written back
//! out with [`Document::to_html`]. Text and attribute values are stored
//! exactly as they appear in the source (entities are not decoded) so that a
//! well-formed page survives a parse/serialize round trip unchanged, apart
//! from whitespace inside tags and attribute quoting.
//!
//! Nodes are addressed by [`NodePath`], the child indices leading from the
//! document root to the node. A path is only valid until the next structural
//! mutation that touches one of its ancestors' child lists.

pub type NodePath = Vec<usize>;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

// Start tags that implicitly end an open <p>.
const CLOSES_P: &[&str] = &[
    "address", "article", "aside", "blockquote", "div", "dl", "fieldset", "footer", "form",
    "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "nav", "ol", "p", "pre", "section",
    "table", "ul",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
    /// `<!DOCTYPE ...>`, `<?xml ...?>` and friends, kept verbatim.
    Declaration(String),
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Node::Element(element)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    /// `None` for bare attributes such as `<input disabled>`.
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<Attribute>,
    pub children: Vec<Node>,
    /// Written as `<name/>`, as in XHTML or inline SVG.
    pub self_closing: bool,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
            self_closing: false,
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn is(&self, tag: &str) -> bool {
        self.name.eq_ignore_ascii_case(tag)
    }

    /// Raw attribute value. Bare attributes read as `""`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|attr| attr.name.eq_ignore_ascii_case(name))
            .map(|attr| attr.value.as_deref().unwrap_or_default())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    /// Sets `name` to the raw `value`, replacing an existing attribute in
    /// place or appending a new one. Callers escape untrusted values with
    /// [`escape_attr`].
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = Some(value.into());
        match self
            .attrs
            .iter_mut()
            .find(|attr| attr.name.eq_ignore_ascii_case(name))
        {
            Some(attr) => attr.value = value,
            None => self.attrs.push(Attribute {
                name: name.to_string(),
                value,
            }),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let idx = self
            .attrs
            .iter()
            .position(|attr| attr.name.eq_ignore_ascii_case(name))?;
        Some(self.attrs.remove(idx).value.unwrap_or_default())
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    fn is_void(&self) -> bool {
        VOID_ELEMENTS
            .iter()
            .any(|void| self.name.eq_ignore_ascii_case(void))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub nodes: Vec<Node>,
}

impl Document {
    pub fn node(&self, path: &[usize]) -> Option<&Node> {
        let (last, ancestors) = path.split_last()?;
        let mut nodes = &self.nodes;
        for &idx in ancestors {
            match nodes.get(idx)? {
                Node::Element(el) => nodes = &el.children,
                _ => return None,
            }
        }
        nodes.get(*last)
    }

    pub fn node_mut(&mut self, path: &[usize]) -> Option<&mut Node> {
        let (last, ancestors) = path.split_last()?;
        let mut nodes = &mut self.nodes;
        for &idx in ancestors {
            match nodes.get_mut(idx)? {
                Node::Element(el) => nodes = &mut el.children,
                _ => return None,
            }
        }
        nodes.get_mut(*last)
    }

    pub fn element(&self, path: &[usize]) -> Option<&Element> {
        match self.node(path)? {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        match self.node_mut(path)? {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    /// Child list of `parent`; the empty path is the document root.
    pub fn children(&self, parent: &[usize]) -> Option<&Vec<Node>> {
        if parent.is_empty() {
            return Some(&self.nodes);
        }
        self.element(parent).map(|el| &el.children)
    }

    fn children_mut(&mut self, parent: &[usize]) -> Option<&mut Vec<Node>> {
        if parent.is_empty() {
            return Some(&mut self.nodes);
        }
        self.element_mut(parent).map(|el| &mut el.children)
    }

    /// First element in document order matching `pred`.
    pub fn find(&self, pred: impl Fn(&Element) -> bool) -> Option<NodePath> {
        let mut path = Vec::new();
        if find_in(&self.nodes, &mut path, &pred) {
            Some(path)
        } else {
            None
        }
    }

    /// Every element matching `pred`, in document order.
    pub fn find_all(&self, pred: impl Fn(&Element) -> bool) -> Vec<NodePath> {
        let mut out = Vec::new();
        collect_in(&self.nodes, &mut Vec::new(), &pred, &mut out);
        out
    }

    pub fn find_by_id(&self, id: &str) -> Option<NodePath> {
        self.find(|el| el.id() == Some(id))
    }

    pub fn find_first(&self, tag: &str) -> Option<NodePath> {
        self.find(|el| el.is(tag))
    }

    /// Path of the first comment whose text equals `text`.
    pub fn find_comment(&self, text: &str) -> Option<NodePath> {
        let mut path = Vec::new();
        if find_comment_in(&self.nodes, &mut path, text) {
            Some(path)
        } else {
            None
        }
    }

    pub fn next_element_sibling(&self, path: &[usize]) -> Option<NodePath> {
        let (last, parent) = path.split_last()?;
        let siblings = self.children(parent)?;
        let idx = siblings
            .iter()
            .enumerate()
            .skip(last + 1)
            .find(|(_, node)| matches!(node, Node::Element(_)))
            .map(|(idx, _)| idx)?;
        Some(child_path(parent, idx))
    }

    /// First direct child element of `parent` named `tag`.
    pub fn child_element(&self, parent: &[usize], tag: &str) -> Option<NodePath> {
        let idx = self
            .element(parent)?
            .children
            .iter()
            .position(|node| matches!(node, Node::Element(el) if el.is(tag)))?;
        Some(child_path(parent, idx))
    }

    /// Inserts `node` at `index` of `parent`'s children (clamped to the end)
    /// and returns its path.
    pub fn insert(&mut self, parent: &[usize], index: usize, node: Node) -> Option<NodePath> {
        let children = self.children_mut(parent)?;
        let index = index.min(children.len());
        children.insert(index, node);
        Some(child_path(parent, index))
    }

    pub fn append_child(&mut self, parent: &[usize], node: Node) -> Option<NodePath> {
        self.insert(parent, usize::MAX, node)
    }

    pub fn remove(&mut self, path: &[usize]) -> Option<Node> {
        let (last, parent) = path.split_last()?;
        let children = self.children_mut(parent)?;
        if *last < children.len() {
            Some(children.remove(*last))
        } else {
            None
        }
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            write_node(node, &mut out);
        }
        out
    }
}

pub fn parent_path(path: &[usize]) -> &[usize] {
    path.split_last().map(|(_, parent)| parent).unwrap_or(&[])
}

fn child_path(parent: &[usize], idx: usize) -> NodePath {
    let mut path = parent.to_vec();
    path.push(idx);
    path
}

fn find_in(nodes: &[Node], path: &mut NodePath, pred: &impl Fn(&Element) -> bool) -> bool {
    for (idx, node) in nodes.iter().enumerate() {
        if let Node::Element(el) = node {
            path.push(idx);
            if pred(el) || find_in(&el.children, path, pred) {
                return true;
            }
            path.pop();
        }
    }
    false
}

fn collect_in(
    nodes: &[Node],
    path: &mut NodePath,
    pred: &impl Fn(&Element) -> bool,
    out: &mut Vec<NodePath>,
) {
    for (idx, node) in nodes.iter().enumerate() {
        if let Node::Element(el) = node {
            path.push(idx);
            if pred(el) {
                out.push(path.clone());
            }
            collect_in(&el.children, path, pred, out);
            path.pop();
        }
    }
}

fn find_comment_in(nodes: &[Node], path: &mut NodePath, text: &str) -> bool {
    for (idx, node) in nodes.iter().enumerate() {
        path.push(idx);
        match node {
            Node::Comment(comment) if comment == text => return true,
            Node::Element(el) if find_comment_in(&el.children, path, text) => return true,
            _ => {}
        }
        path.pop();
    }
    false
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => collect_text(&el.children, out),
            _ => {}
        }
    }
}

/// Escapes a value for use inside a double-quoted attribute.
pub fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Text(text) => out.push_str(text),
        Node::Comment(comment) => {
            out.push_str("<!--");
            out.push_str(comment);
            out.push_str("-->");
        }
        Node::Declaration(raw) => out.push_str(raw),
        Node::Element(el) => {
            out.push('<');
            out.push_str(&el.name);
            for attr in &el.attrs {
                out.push(' ');
                out.push_str(&attr.name);
                if let Some(value) = &attr.value {
                    let quote = if value.contains('"') { '\'' } else { '"' };
                    out.push('=');
                    out.push(quote);
                    out.push_str(value);
                    out.push(quote);
                }
            }
            if el.self_closing {
                out.push_str("/>");
                return;
            }
            out.push('>');
            if el.is_void() {
                return;
            }
            for child in &el.children {
                write_node(child, out);
            }
            out.push_str("</");
            out.push_str(&el.name);
            out.push('>');
        }
    }
}

pub fn parse(html: &str) -> Document {
    Document {
        nodes: parse_fragment(html),
    }
}

/// Parses `html` into a list of sibling nodes. Never fails: anything that
/// does not look like markup is kept as text.
pub fn parse_fragment(html: &str) -> Vec<Node> {
    let bytes = html.as_bytes();
    let mut builder = TreeBuilder::default();
    let mut pos = 0;
    let mut text_start = 0;

    while pos < bytes.len() {
        if bytes[pos] != b'<' {
            pos += 1;
            continue;
        }
        let rest = &html[pos..];

        if let Some(body) = rest.strip_prefix("<!--") {
            builder.text(&html[text_start..pos]);
            let (comment, consumed) = match body.find("-->") {
                Some(end) => (&body[..end], 4 + end + 3),
                None => (body, rest.len()),
            };
            builder.push(Node::Comment(comment.to_string()));
            pos += consumed;
            text_start = pos;
            continue;
        }

        if rest.starts_with("<!") || rest.starts_with("<?") {
            builder.text(&html[text_start..pos]);
            let consumed = rest.find('>').map(|end| end + 1).unwrap_or(rest.len());
            builder.push(Node::Declaration(rest[..consumed].to_string()));
            pos += consumed;
            text_start = pos;
            continue;
        }

        if rest.starts_with("</") {
            match read_end_tag(rest) {
                Some((name, consumed)) => {
                    builder.text(&html[text_start..pos]);
                    builder.close(name);
                    pos += consumed;
                    text_start = pos;
                }
                None => pos += 1,
            }
            continue;
        }

        let Some(tag) = read_start_tag(rest) else {
            pos += 1;
            continue;
        };
        builder.text(&html[text_start..pos]);
        pos += tag.consumed;

        let raw_text = RAW_TEXT_ELEMENTS
            .iter()
            .any(|raw| tag.element.name.eq_ignore_ascii_case(raw));
        if raw_text && !tag.self_closing {
            let mut element = tag.element;
            let closer = format!("</{}", element.name);
            let (content_end, resume) = match find_ignore_ascii_case(&html[pos..], &closer) {
                Some(offset) => {
                    let content_end = pos + offset;
                    let resume = html[content_end..]
                        .find('>')
                        .map(|gt| content_end + gt + 1)
                        .unwrap_or(html.len());
                    (content_end, resume)
                }
                None => (html.len(), html.len()),
            };
            if content_end > pos {
                element
                    .children
                    .push(Node::Text(html[pos..content_end].to_string()));
            }
            builder.push(Node::Element(element));
            pos = resume;
        } else {
            builder.open(tag.element, tag.self_closing);
        }
        text_start = pos;
    }

    builder.text(&html[text_start..]);
    builder.finish()
}

/// Byte offset of the first ASCII-case-insensitive match of `needle`.
fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

struct StartTag {
    element: Element,
    self_closing: bool,
    consumed: usize,
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.')
}

fn read_start_tag(input: &str) -> Option<StartTag> {
    let bytes = input.as_bytes();
    if bytes.len() < 2 || !bytes[1].is_ascii_alphabetic() {
        return None;
    }
    let mut pos = 1;
    while pos < bytes.len() && is_name_char(bytes[pos]) {
        pos += 1;
    }
    let mut element = Element::new(&input[1..pos]);

    loop {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        match *bytes.get(pos)? {
            b'>' => {
                return Some(StartTag {
                    element,
                    self_closing: false,
                    consumed: pos + 1,
                })
            }
            b'/' if bytes.get(pos + 1) == Some(&b'>') => {
                return Some(StartTag {
                    element,
                    self_closing: true,
                    consumed: pos + 2,
                })
            }
            b'/' => {
                pos += 1;
                continue;
            }
            _ => {}
        }

        let name_start = pos;
        while pos < bytes.len()
            && !bytes[pos].is_ascii_whitespace()
            && !matches!(bytes[pos], b'=' | b'>' | b'/')
        {
            pos += 1;
        }
        let name = &input[name_start..pos];
        if name.is_empty() {
            pos += 1;
            continue;
        }

        let mut lookahead = pos;
        while lookahead < bytes.len() && bytes[lookahead].is_ascii_whitespace() {
            lookahead += 1;
        }
        let value = if bytes.get(lookahead) == Some(&b'=') {
            pos = lookahead + 1;
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            match *bytes.get(pos)? {
                quote @ (b'"' | b'\'') => {
                    let start = pos + 1;
                    let end = start + input[start..].find(quote as char)?;
                    pos = end + 1;
                    Some(input[start..end].to_string())
                }
                _ => {
                    let start = pos;
                    while pos < bytes.len()
                        && !bytes[pos].is_ascii_whitespace()
                        && bytes[pos] != b'>'
                    {
                        pos += 1;
                    }
                    Some(input[start..pos].to_string())
                }
            }
        } else {
            None
        };
        element.attrs.push(Attribute {
            name: name.to_string(),
            value,
        });
    }
}

fn read_end_tag(input: &str) -> Option<(&str, usize)> {
    let bytes = input.as_bytes();
    if bytes.len() < 3 || !bytes[2].is_ascii_alphabetic() {
        return None;
    }
    let mut pos = 2;
    while pos < bytes.len() && is_name_char(bytes[pos]) {
        pos += 1;
    }
    let name = &input[2..pos];
    let close = input[pos..].find('>')?;
    Some((name, pos + close + 1))
}

#[derive(Default)]
struct TreeBuilder {
    root: Vec<Node>,
    open: Vec<Element>,
}

impl TreeBuilder {
    fn push(&mut self, node: Node) {
        match self.open.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.root.push(node),
        }
    }

    fn text(&mut self, text: &str) {
        if !text.is_empty() {
            self.push(Node::Text(text.to_string()));
        }
    }

    fn open(&mut self, mut element: Element, self_closing: bool) {
        self.close_implied(&element.name.to_ascii_lowercase());
        if self_closing || element.is_void() {
            element.self_closing = self_closing;
            self.push(Node::Element(element));
        } else {
            self.open.push(element);
        }
    }

    fn close_implied(&mut self, incoming: &str) {
        let Some(current) = self.open.last() else {
            return;
        };
        let closes = match current.name.to_ascii_lowercase().as_str() {
            "p" => CLOSES_P.contains(&incoming),
            "li" => incoming == "li",
            "dt" | "dd" => matches!(incoming, "dt" | "dd"),
            _ => false,
        };
        if closes {
            self.pop();
        }
    }

    fn pop(&mut self) {
        if let Some(element) = self.open.pop() {
            self.push(Node::Element(element));
        }
    }

    // Stray end tags with no matching open element are dropped.
    fn close(&mut self, name: &str) {
        if let Some(idx) = self.open.iter().rposition(|el| el.is(name)) {
            while self.open.len() > idx {
                self.pop();
            }
        }
    }

    fn finish(mut self) -> Vec<Node> {
        while !self.open.is_empty() {
            self.pop();
        }
        self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trips_well_formed_markup() {
        let html = "<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"UTF-8\"><title>A &amp; B</title></head>\
                    <body class=\"book\"><!-- note --><div id=\"toc\"><ul><li><a href=\"#x\">X</a></li></ul></div>\
                    <script>if (a < b) { go(\"</div>\"); }</script><input disabled></body></html>";
        assert_eq!(parse(html).to_html(), html);
    }

    #[test]
    fn raw_text_closer_matches_any_case() {
        let doc = parse("<SCRIPT>var s = \"</div>\";</Script><p>after</p><style>a{}</STYLE>");
        assert_eq!(
            doc.to_html(),
            "<SCRIPT>var s = \"</div>\";</SCRIPT><p>after</p><style>a{}</style>"
        );
        let script = doc.element(&[0]).expect("script");
        assert_eq!(script.children, vec![Node::Text("var s = \"</div>\";".to_string())]);
        assert!(doc.find_first("p").is_some());
        assert_eq!(find_ignore_ascii_case("abc</TiTlE>", "</title"), Some(3));
        assert_eq!(find_ignore_ascii_case("abc", "</title"), None);
    }

    #[test]
    fn keeps_svg_self_closing_elements() {
        let html = r#"<svg viewBox="0 0 1 1"><g id="logos"><path class="st0" d="M0,0z"/></g></svg>"#;
        let doc = parse(html);
        assert_eq!(doc.to_html(), html);
        let path = doc.find_first("path").expect("path element");
        assert!(doc.element(&path).expect("element").self_closing);
        assert_eq!(doc.element(&[0]).expect("svg").attr("viewbox"), Some("0 0 1 1"));
    }

    #[test]
    fn closes_implied_paragraphs_and_list_items() {
        let doc = parse("<ul><li>one<li>two</ul><p>a<p>b");
        assert_eq!(
            doc.to_html(),
            "<ul><li>one</li><li>two</li></ul><p>a</p><p>b</p>"
        );
    }

    #[test]
    fn ignores_stray_end_tags_and_stray_angles() {
        let doc = parse("<div>1 < 2</span></div>");
        assert_eq!(doc.to_html(), "<div>1 < 2</div>");
    }

    #[test]
    fn single_quoted_values_keep_their_quotes() {
        let html = r#"<a title='say "hi"' href=plain>x</a>"#;
        let doc = parse(html);
        let a = doc.element(&[0]).expect("anchor");
        assert_eq!(a.attr("title"), Some(r#"say "hi""#));
        assert_eq!(a.attr("href"), Some("plain"));
        assert_eq!(doc.to_html(), r#"<a title='say "hi"' href="plain">x</a>"#);
    }

    #[test]
    fn navigates_siblings_and_children() {
        let doc = parse(
            "<div id=\"toc\"><div id=\"toctitle\">Contents</div>\n<ul class=\"sectlevel1\"></ul></div>\
             <div id=\"index-link\"><p><a href=\"../index.html\">Index</a></p></div>",
        );
        let title = doc.find_by_id("toctitle").expect("toctitle");
        assert_eq!(title, vec![0, 0]);
        let next = doc.next_element_sibling(&title).expect("sibling");
        assert_eq!(doc.element(&next).and_then(|el| el.attr("class")), Some("sectlevel1"));
        assert_eq!(doc.next_element_sibling(&next), None);

        let link = doc.find_by_id("index-link").expect("index-link");
        let anchor = doc
            .child_element(&link, "p")
            .and_then(|p| doc.child_element(&p, "a"))
            .expect("anchor");
        assert_eq!(doc.element(&anchor).and_then(|a| a.attr("href")), Some("../index.html"));
        assert_eq!(doc.element(&anchor).map(Element::text), Some("Index".to_string()));
    }

    #[test]
    fn inserts_and_removes_nodes() {
        let mut doc = parse("<body><p>b</p></body>");
        let body = doc.find_first("body").expect("body");
        let first = doc
            .insert(&body, 0, Element::new("p").with_child(Node::Text("a".into())).into())
            .expect("inserted");
        assert_eq!(first, vec![0, 0]);
        doc.append_child(&body, Element::new("hr").into());
        assert_eq!(doc.to_html(), "<body><p>a</p><p>b</p><hr></body>");

        let removed = doc.remove(&[0, 1]);
        assert!(matches!(removed, Some(Node::Element(el)) if el.text() == "b"));
        assert_eq!(doc.to_html(), "<body><p>a</p><hr></body>");
        assert_eq!(doc.remove(&[0, 9]), None);
    }

    #[test]
    fn attributes_are_replaced_in_place() {
        let mut el = Element::new("ul").with_attr("id", "x").with_attr("class", "a");
        el.set_attr("CLASS", "b");
        assert_eq!(el.attrs.len(), 2);
        assert_eq!(el.attr("class"), Some("b"));
        assert_eq!(el.remove_attr("id"), Some("x".to_string()));
        assert!(!el.has_attr("id"));
        assert_eq!(escape_attr(r#"a&b"c"#), "a&amp;b&quot;c");
    }

    #[test]
    fn finds_comments_and_all_matches() {
        let doc = parse("<head><!--mark--></head><body><i class=\"x\"></i><b class=\"x\"></b></body>");
        assert_eq!(doc.find_comment("mark"), Some(vec![0, 0]));
        assert_eq!(doc.find_all(|el| el.attr("class") == Some("x")), vec![vec![1, 0], vec![1, 1]]);
    }
}
