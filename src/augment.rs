//! Rewrite passes that turn a generated reference page into the site layout:
//! a floating table of contents, a "Back to index" link and the site header.
//!
//! Each pass works on a parsed [`Document`] and can run on its own;
//! [`augment`] runs them in page order.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::assets::{BACK_LINK_LABEL, HEADER_HTML};
use crate::dom::{self, Document, Element, Node};

pub const TOC_TITLE_ID: &str = "toctitle";
pub const INDEX_LINK_ID: &str = "index-link";
pub const WIDGET_ID: &str = "tocbot";

/// Marks every element the passes create, so pages can be reverted.
pub const AUGMENT_ATTR: &str = "data-augment";
/// Values of [`AUGMENT_ATTR`] written by this crate.
pub const INJECTED_KINDS: [&str; 5] = ["toc", "tocbot-lib", "tocbot-init", "back-link", "header"];
/// Class the relocated table of contents had before it became `mobile-toc`.
pub const PREVIOUS_CLASS_ATTR: &str = "data-augment-class";

static HEADER_NODES: Lazy<Vec<Node>> = Lazy::new(|| dom::parse_fragment(HEADER_HTML.trim()));

/// Options handed to `tocbot.init`. Field names serialize the way tocbot
/// spells them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TocbotOptions {
    pub content_selector: String,
    pub heading_selector: String,
    pub position_fixed_selector: String,
    pub fixed_sidebar_offset: u32,
    pub smooth_scroll: bool,
}

impl Default for TocbotOptions {
    fn default() -> Self {
        Self {
            content_selector: "#content".to_string(),
            heading_selector: "h1, h2, h3, h4, h5".to_string(),
            position_fixed_selector: "body".to_string(),
            fixed_sidebar_offset: 90,
            smooth_scroll: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AugmentOptions {
    /// Filename of the site index; pages ending in it get no back link.
    pub index_file: String,
    pub tocbot: TocbotOptions,
    /// Optional `<script src>` for the tocbot library, loaded before the
    /// init call. `None` when the page template already loads it.
    pub tocbot_script: Option<String>,
}

impl Default for AugmentOptions {
    fn default() -> Self {
        Self {
            index_file: "index.html".to_string(),
            tocbot: TocbotOptions::default(),
            tocbot_script: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TocRelocation {
    Relocated { had_old_toc: bool },
    NoTocTitle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexTarget {
    Reference(String),
    Default,
}

impl IndexTarget {
    pub fn href<'a>(&'a self, index_file: &'a str) -> &'a str {
        match self {
            IndexTarget::Reference(href) => href,
            IndexTarget::Default => index_file,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackLink {
    Inserted { href: String },
    IndexPage,
    NoToc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub toc: TocRelocation,
    pub back_link: BackLink,
}

pub fn augment(doc: &mut Document, page_path: &str, options: &AugmentOptions) -> Report {
    let toc = relocate_toc(doc, options);
    let back_link = insert_back_link(doc, page_path, &toc, options);
    insert_header(doc);
    Report { toc, back_link }
}

/// Moves the pre-rendered table of contents to a mobile-only role and adds
/// an empty container for the tocbot widget next to it, then wires up the
/// widget. Pages without a `#toctitle` are left alone.
pub fn relocate_toc(doc: &mut Document, options: &AugmentOptions) -> TocRelocation {
    let Some(title) = doc.find_by_id(TOC_TITLE_ID) else {
        debug!("no #{TOC_TITLE_ID}; skipping table of contents");
        return TocRelocation::NoTocTitle;
    };

    let old_toc = doc.next_element_sibling(&title);
    if let Some(old) = old_toc.as_deref().and_then(|path| doc.element_mut(path)) {
        let previous = old.attr("class").unwrap_or_default().to_string();
        old.set_attr(PREVIOUS_CLASS_ATTR, previous);
        old.set_attr("class", "mobile-toc");
    }

    let widget = Element::new("div")
        .with_attr("id", WIDGET_ID)
        .with_attr("class", "js-toc desktop-toc")
        .with_attr(AUGMENT_ATTR, "toc");
    doc.append_child(dom::parent_path(&title), widget.into());

    init_widget(doc, options);

    TocRelocation::Relocated {
        had_old_toc: old_toc.is_some(),
    }
}

// No try/catch around the init call: a tocbot failure surfaces as a page error.
fn init_widget(doc: &mut Document, options: &AugmentOptions) {
    let body = doc.find_first("body").unwrap_or_default();

    if let Some(src) = &options.tocbot_script {
        let loader = Element::new("script")
            .with_attr("src", dom::escape_attr(src))
            .with_attr(AUGMENT_ATTR, "tocbot-lib");
        doc.append_child(&body, loader.into());
    }

    let json = match serde_json::to_string(&options.tocbot) {
        Ok(json) => json,
        Err(err) => {
            warn!("failed to serialise tocbot options: {err}");
            "{}".to_string()
        }
    };
    let init = Element::new("script")
        .with_attr(AUGMENT_ATTR, "tocbot-init")
        .with_child(Node::Text(format!(
            "tocbot.init({});",
            escape_json_for_script(&json)
        )));
    doc.append_child(&body, init.into());
}

fn escape_json_for_script(json: &str) -> String {
    json.replace("</", "<\\/")
}

pub fn is_index_page(page_path: &str, index_file: &str) -> bool {
    page_path.ends_with(index_file) || page_path.ends_with('/')
}

/// Link target for the back link: the page's own `#index-link > p > a`
/// when it has one, otherwise the site index file.
pub fn index_target(doc: &Document) -> IndexTarget {
    let Some(reference) = doc.find_by_id(INDEX_LINK_ID) else {
        return IndexTarget::Default;
    };
    let href = doc
        .child_element(&reference, "p")
        .and_then(|p| doc.child_element(&p, "a"))
        .and_then(|a| doc.element(&a))
        .and_then(|a| a.attr("href"));
    match href {
        Some(href) => IndexTarget::Reference(href.to_string()),
        None => {
            debug!("#{INDEX_LINK_ID} has no nested link; using the default index");
            IndexTarget::Default
        }
    }
}

/// Puts a "Back to index" block right before the tocbot container on every
/// page except the index itself.
pub fn insert_back_link(
    doc: &mut Document,
    page_path: &str,
    toc: &TocRelocation,
    options: &AugmentOptions,
) -> BackLink {
    if *toc == TocRelocation::NoTocTitle {
        return BackLink::NoToc;
    }
    if is_index_page(page_path, &options.index_file) {
        return BackLink::IndexPage;
    }

    let href = index_target(doc).href(&options.index_file).to_string();
    let Some(widget) = doc.find_by_id(WIDGET_ID) else {
        return BackLink::NoToc;
    };
    let Some((&position, parent)) = widget.split_last() else {
        return BackLink::NoToc;
    };

    let link = Element::new("a")
        .with_attr("href", href.as_str())
        .with_children(dom::parse_fragment(BACK_LINK_LABEL));
    let block = Element::new("div")
        .with_attr("class", "back-action")
        .with_attr(AUGMENT_ATTR, "back-link")
        .with_child(link);
    doc.insert(parent, position, block.into());

    BackLink::Inserted { href }
}

/// Inserts the site header as the first child of `<body>`. Documents without
/// a body get it right after any leading declarations.
pub fn insert_header(doc: &mut Document) {
    let header = Element::new("div")
        .with_attr(AUGMENT_ATTR, "header")
        .with_children(HEADER_NODES.iter().cloned());

    match doc.find_first("body") {
        Some(body) => {
            doc.insert(&body, 0, header.into());
        }
        None => {
            let at = doc
                .nodes
                .iter()
                .take_while(|node| matches!(node, Node::Declaration(_)))
                .count();
            doc.insert(&[], at, header.into());
        }
    }
}
