//! Markup injected into documentation pages.
//!
//! The header (with its inline logo) lives in `src/assets/header.html` and is
//! included at compile time so the binary stays self-contained.

pub const HEADER_HTML: &str = include_str!("assets/header.html");

pub const BACK_LINK_LABEL: &str =
    r#"<span><i class="fa fa-chevron-left" aria-hidden="true"></i></span> Back to index"#;
