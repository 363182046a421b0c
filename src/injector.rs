use std::path::Path;

use tracing::debug;

use crate::augment::{self, AugmentOptions, AUGMENT_ATTR, PREVIOUS_CLASS_ATTR};
use crate::dom::{self, Document, Element, Node};

pub const MARKER: &str = "<!-- refdoc-augment: injected -->";
const MARKER_TEXT: &str = " refdoc-augment: injected ";

/// Augments one page. Returns `None` when the page already carries the
/// injection marker.
pub fn inject(content: &str, page_path: &str, options: &AugmentOptions) -> Option<String> {
    if content.contains(MARKER) {
        return None;
    }

    let mut doc = dom::parse(content);
    let report = augment::augment(&mut doc, page_path, options);
    debug!(page = page_path, ?report, "augmented page");
    insert_marker(&mut doc);

    Some(doc.to_html())
}

fn insert_marker(doc: &mut Document) {
    let marker = Node::Comment(MARKER_TEXT.to_string());
    match doc.find_first("head") {
        Some(head) => {
            doc.insert(&head, 0, marker);
        }
        // Anything ahead of the doctype puts browsers in quirks mode.
        None => {
            let at = doc
                .nodes
                .iter()
                .take_while(|node| matches!(node, Node::Declaration(_)))
                .count();
            doc.insert(&[], at, marker);
        }
    }
}

/// Strips everything [`inject`] added. Returns `None` when there is nothing
/// to strip.
pub fn revert(content: &str) -> Option<String> {
    if !content.contains(AUGMENT_ATTR) && !content.contains(MARKER) {
        return None;
    }

    let mut doc = dom::parse(content);
    let mut changed = false;

    for path in doc.find_all(|el| el.has_attr(PREVIOUS_CLASS_ATTR)) {
        let Some(el) = doc.element_mut(&path) else {
            continue;
        };
        if let Some(previous) = el.remove_attr(PREVIOUS_CLASS_ATTR) {
            if previous.is_empty() {
                el.remove_attr("class");
            } else {
                el.set_attr("class", previous);
            }
            changed = true;
        }
    }

    // Reverse document order keeps the remaining paths valid.
    let injected = |el: &Element| {
        el.attr(AUGMENT_ATTR)
            .is_some_and(|kind| augment::INJECTED_KINDS.contains(&kind))
    };
    for path in doc.find_all(injected).into_iter().rev() {
        changed |= doc.remove(&path).is_some();
    }

    while let Some(path) = doc.find_comment(MARKER_TEXT) {
        doc.remove(&path);
        changed = true;
    }

    if changed {
        Some(doc.to_html())
    } else {
        None
    }
}

pub fn should_skip_file(path: &Path) -> bool {
    if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
        let name = name.to_lowercase();
        return matches!(name.as_str(), "search.html" | "404.html");
    }
    false
}
