// src/mirror/links.rs
// =============================================================================
// This module pulls links out of HTML pages.
//
// We use the `lol_html` crate, which:
// - Tokenizes HTML as a stream instead of building a DOM
// - Calls our handlers for elements matching CSS selectors
// - Never allocates a tree, so big pages cost little
//
// Only two things are collected:
//   <a href="...">   and   <img src="...">
// Everything else (scripts, stylesheets, other attributes) is ignored.
//
// lol_html hands attribute values back exactly as written in the markup, so
// character references ("&amp;") are decoded here before anything else
// sees them.
//
// Extraction and scoping are separate steps:
// 1. extract_links() returns the decoded attribute values in document order
// 2. resolve_links() turns them into absolute URLs and keeps those that
//    belong to the mirror
// =============================================================================

use crate::error::MirrorError;
use crate::mirror::paths::{clean_path, PathMapper};
use html_escape::decode_html_entities;
use lol_html::{element, HtmlRewriter, Settings};
use std::cell::RefCell;
use tracing::warn;
use url::Url;

// Returns every <a href> and <img src> value, in document order
//
// Parameters:
//   html: the raw page bytes (any encoding lol_html can tokenize)
//
// Example:
//   <a href="/docs">Docs</a><img src="logo.png">  ->  ["/docs", "logo.png"]
pub fn extract_links(html: &[u8]) -> Result<Vec<String>, MirrorError> {
    let found = RefCell::new(Vec::new());

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!("a[href]", |el| {
                    if let Some(href) = el.get_attribute("href") {
                        found.borrow_mut().push(decode_html_entities(&href).into_owned());
                    }
                    Ok(())
                }),
                element!("img[src]", |el| {
                    if let Some(src) = el.get_attribute("src") {
                        found.borrow_mut().push(decode_html_entities(&src).into_owned());
                    }
                    Ok(())
                }),
            ],
            ..Settings::default()
        },
        // We only read the page; the rewritten output is thrown away
        |_: &[u8]| {},
    );

    rewriter
        .write(html)
        .map_err(|e| MirrorError::Extract(e.to_string()))?;
    rewriter
        .end()
        .map_err(|e| MirrorError::Extract(e.to_string()))?;

    Ok(found.into_inner())
}

// Resolves raw links against the page URL and keeps the in-scope ones
//
// Parameters:
//   page_url: where the page really came from (after redirects!)
//   raw:      output of extract_links()
//   mapper:   knows the mirror root
//
// The first link that can't be resolved stops the scan: a broken link
// usually means the tokenizer lost track of the markup, so whatever comes
// after it isn't trustworthy. Links collected before it are kept.
pub fn resolve_links(page_url: &Url, raw: Vec<String>, mapper: &PathMapper) -> Vec<Url> {
    let mut links = Vec::with_capacity(raw.len());

    for link in raw {
        let mut absolute = match page_url.join(&link) {
            Ok(url) => url,
            Err(e) => {
                warn!(page = %page_url, link = %link, error = %e, "unparsable link, skipping rest of page");
                break;
            }
        };

        // "#section" links point at the same file
        absolute.set_fragment(None);
        tidy_path(&mut absolute);

        if mapper.in_scope(&absolute) {
            links.push(absolute);
        }
    }

    links
}

// Collapses "//" and leftover dot segments in the URL path
//
// A trailing slash survives: "/a//sub/" -> "/a/sub/", which still maps to
// sub/index.html.
fn tidy_path(url: &mut Url) {
    let mut cleaned = clean_path(url.path());
    if url.path().ends_with('/') && !cleaned.ends_with('/') {
        cleaned.push('/');
    }
    if cleaned != url.path() {
        url.set_path(&cleaned);
    }
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why RefCell?
//    - Both handlers need to push into the same Vec
//    - Two closures can't both hold `&mut found`, but they can both hold
//      `&found` and borrow mutably one at a time at runtime
//    - Everything runs on one thread inside this function, so no Mutex needed
//
// 2. Why is this a plain (non-async) function?
//    - HtmlRewriter isn't Send, so it can't be kept alive across an .await in
//      a tokio task. The content pipeline collects the page bytes first and
//      then calls us once.
//
// 3. What does Url::join do?
//    - Same thing a browser does with a relative link:
//      "http://x/a/page.html" + "b.html"   -> "http://x/a/b.html"
//      "http://x/a/page.html" + "/c/d"     -> "http://x/c/d"
//      "http://x/a/page.html" + "http://y" -> "http://y/"
// -----------------------------------------------------------------------------
