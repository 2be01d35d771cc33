// src/mirror/paths.rs
// =============================================================================
// Maps URLs onto files under the destination directory.
//
//   root = http://example.com/docs/      dst = ./mirror
//
//   http://example.com/docs/             -> ./mirror/index.html
//   http://example.com/docs/guide/       -> ./mirror/guide/index.html
//   http://example.com/docs/guide/a.html -> ./mirror/guide/a.html
//
// The mapping must be deterministic: the conditional fetcher re-derives the
// path on every run and compares it with what's on disk.
//
// This file also owns the "is this link part of the mirror?" test and the
// path cleaning that turns a URL path into a dedup key.
// =============================================================================

use crate::error::PathError;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone)]
pub struct PathMapper {
    root_url: Url,
    // Cleaned root path, e.g. "/docs" (or "/" for a whole-site mirror)
    root_path: String,
    dst: PathBuf,
}

impl PathMapper {
    pub fn new(root_url: &Url, dst: &Path) -> Self {
        PathMapper {
            root_url: root_url.clone(),
            root_path: clean_path(root_url.path()),
            dst: dst.to_path_buf(),
        }
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    // Local file for a URL
    //
    // Paths ending in '/' (and the root itself) are directories on the
    // server, so they are stored as <dir>/index.html.
    pub fn file_path(&self, url: &Url) -> Result<PathBuf, PathError> {
        let (mut path, rel) = self.relative(url.path())?;

        if !rel.is_empty() {
            path.push(&rel);
        }

        if rel.is_empty() || url.path().ends_with('/') {
            path.push("index.html");
        }

        Ok(path)
    }

    // Base directory and relative path for `url_path`
    //
    // "/docs/guide/a.html" under "/docs" -> (dst, "guide/a.html")
    // "/docs"              under "/docs" -> (dst, "")
    // "/documents/x"       under "/docs" -> (dst/.., "documents/x")
    // "/other/x"           under "/docs" -> error
    //
    // A sibling that only shares the root's string prefix lands next to dst,
    // the same place a lexical "dst/../documents/x" would put it.
    fn relative(&self, url_path: &str) -> Result<(PathBuf, String), PathError> {
        let cleaned = clean_path(url_path);
        if cleaned == self.root_path {
            return Ok((self.dst.clone(), String::new()));
        }

        let prefix = if self.root_path == "/" {
            "/".to_string()
        } else {
            format!("{}/", self.root_path)
        };
        if let Some(rel) = cleaned.strip_prefix(&prefix) {
            return Ok((self.dst.clone(), rel.to_string()));
        }

        if has_root_prefix(&cleaned, &self.root_path) {
            // root "/a/doc" -> parent "/a/", so "/a/documents/x" -> "documents/x"
            let parent_len = self.root_path.rfind('/').map_or(0, |i| i + 1);
            let rel = &cleaned[parent_len..];
            return Ok((self.sibling_base(), rel.to_string()));
        }

        Err(PathError::OutsideRoot {
            path: cleaned,
            root: self.root_path.clone(),
        })
    }

    // Directory that holds dst, computed lexically
    fn sibling_base(&self) -> PathBuf {
        match (self.dst.file_name(), self.dst.parent()) {
            (Some(_), Some(parent)) => parent.to_path_buf(),
            _ => self.dst.join(".."),
        }
    }

    // Whether a discovered link belongs to the mirror
    //
    // The path test is a plain string prefix test, not a segment test: with a
    // root of "/doc", "/documents" passes too. Such pages are crawled like
    // any other and stored beside dst (see relative()).
    pub fn in_scope(&self, url: &Url) -> bool {
        (url.scheme() == "http" || url.scheme() == "https")
            && url.host_str() == self.root_url.host_str()
            && url.port_or_known_default() == self.root_url.port_or_known_default()
            && has_root_prefix(url.path(), &self.root_path)
    }
}

pub fn has_root_prefix(url_path: &str, root_path: &str) -> bool {
    clean_path(url_path).starts_with(root_path)
}

// Lexically cleans a slash-separated path
//
// - repeated slashes collapse: "/a//b" -> "/a/b"
// - "." segments vanish:       "/a/./b" -> "/a/b"
// - ".." eats its parent:      "/a/b/../c" -> "/a/c"
// - trailing slash goes:       "/a/" -> "/a"  (but "/" stays "/")
// - empty becomes ".", and ".." can't climb above "/"
pub fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().map_or(false, |last| *last != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why not std::path for URL paths?
//    - URL paths always use '/', whatever the OS. std::path::Path would use
//      '\' on Windows and has no "lexical .." handling anyway.
//    - We only switch to PathBuf once we're building the local file name.
//
// 2. Percent-encoding
//    - url.path() is still percent-encoded ("/a%20b.html"), and that is
//      what ends up on disk. It's deterministic, which is all the cache
//      check needs.
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper(root: &str) -> PathMapper {
        PathMapper::new(&Url::parse(root).unwrap(), Path::new("/mirror"))
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path("/a/b/"), "/a/b");
        assert_eq!(clean_path("/"), "/");
        assert_eq!(clean_path(""), ".");
        assert_eq!(clean_path("/a//b/./c/../d"), "/a/b/d");
        assert_eq!(clean_path("/../a"), "/a");
        assert_eq!(clean_path("a/../../b"), "../b");
    }

    #[test]
    fn test_trailing_slash_maps_to_index() {
        let m = mapper("http://x/a/");
        let url = Url::parse("http://x/a/guide/").unwrap();
        assert_eq!(
            m.file_path(&url).unwrap(),
            PathBuf::from("/mirror/guide/index.html")
        );
    }

    #[test]
    fn test_root_maps_to_index() {
        let m = mapper("http://x/a/");
        for root in ["http://x/a/", "http://x/a"] {
            let url = Url::parse(root).unwrap();
            assert_eq!(m.file_path(&url).unwrap(), PathBuf::from("/mirror/index.html"));
        }
    }

    #[test]
    fn test_plain_file() {
        let m = mapper("http://x/a/");
        let url = Url::parse("http://x/a/b/c.png?size=2").unwrap();
        assert_eq!(m.file_path(&url).unwrap(), PathBuf::from("/mirror/b/c.png"));
    }

    #[test]
    fn test_whole_site_root() {
        let m = mapper("http://x/");
        assert_eq!(m.root_path(), "/");
        let url = Url::parse("http://x/top.html").unwrap();
        assert_eq!(m.file_path(&url).unwrap(), PathBuf::from("/mirror/top.html"));
    }

    #[test]
    fn test_same_url_same_path() {
        let m = mapper("http://x/a/");
        let url = Url::parse("http://x/a/deep/page.html").unwrap();
        assert_eq!(m.file_path(&url).unwrap(), m.file_path(&url).unwrap());
    }

    #[test]
    fn test_prefix_sibling_lands_beside_destination() {
        let m = mapper("http://x/doc/");
        let url = Url::parse("http://x/documents/x.html").unwrap();
        assert_eq!(m.file_path(&url).unwrap(), PathBuf::from("/documents/x.html"));

        let nested = PathMapper::new(
            &Url::parse("http://x/a/doc/").unwrap(),
            Path::new("out/mirror"),
        );
        let url = Url::parse("http://x/a/documents/sub/").unwrap();
        assert_eq!(
            nested.file_path(&url).unwrap(),
            PathBuf::from("out/documents/sub/index.html")
        );
    }

    #[test]
    fn test_unrelated_path_is_rejected() {
        // Only reachable through a redirect off the root
        let m = mapper("http://x/doc/");
        let url = Url::parse("http://x/other/x.html").unwrap();
        assert!(matches!(
            m.file_path(&url),
            Err(PathError::OutsideRoot { .. })
        ));
    }

    #[test]
    fn test_scope_drops_other_paths_and_hosts() {
        let m = mapper("http://x/a/");
        assert!(m.in_scope(&Url::parse("http://x/a/b.html").unwrap()));
        assert!(m.in_scope(&Url::parse("http://x/a").unwrap()));
        assert!(!m.in_scope(&Url::parse("http://x/b.html").unwrap()));
        assert!(!m.in_scope(&Url::parse("http://other/x").unwrap()));
        assert!(!m.in_scope(&Url::parse("http://other/a/b.html").unwrap()));
        assert!(!m.in_scope(&Url::parse("mailto:me@x").unwrap()));
    }

    #[test]
    fn test_scope_prefix_is_literal_not_segment_aware() {
        // Known limitation: a sibling sharing the string prefix is in scope
        let m = mapper("http://x/doc/");
        assert!(has_root_prefix("/documents/x.html", "/doc"));
        assert!(m.in_scope(&Url::parse("http://x/documents/x.html").unwrap()));
    }
}
