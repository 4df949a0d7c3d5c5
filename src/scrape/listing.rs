//! Structural parsing of origin directory-listing HTML.
//!
//! Directory servers emit anchor tags for every entry; folders carry a
//! trailing slash. Everything here works on anchor hrefs alone and never
//! inspects the surrounding markup.

use std::{cell::RefCell, rc::Rc};

use lol_html::{RewriteStrSettings, element, errors::RewritingError, rewrite_str};

use crate::domain::projects::MediaKind;

/// Folder that holds boilerplate for new projects, never published.
const TEMPLATE_SENTINEL: &str = "_template";

/// Collect every anchor href from a listing document, in document order.
fn anchor_hrefs(html: &str) -> Result<Vec<String>, RewritingError> {
    let hrefs: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("a[href]", {
                let hrefs = Rc::clone(&hrefs);
                move |el| {
                    if let Some(href) = el.get_attribute("href") {
                        hrefs.borrow_mut().push(href);
                    }
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )?;

    Ok(hrefs.take())
}

/// Candidate project folders from the origin root listing.
///
/// Anchors whose href ends in `/` are folders; `.`/`..` navigation entries
/// and the `_template` sentinel are excluded.
pub fn project_folders(html: &str) -> Result<Vec<String>, RewritingError> {
    let folders = anchor_hrefs(html)?
        .into_iter()
        .filter_map(|href| folder_name(&href))
        .filter(|name| name != TEMPLATE_SENTINEL)
        .collect();
    Ok(folders)
}

/// File entries from a project's `media/` listing: plain (non-folder)
/// anchors, reduced to their filename.
pub fn media_files(html: &str) -> Result<Vec<String>, RewritingError> {
    let files = anchor_hrefs(html)?
        .into_iter()
        .filter_map(|href| file_name(&href))
        .collect();
    Ok(files)
}

/// Classify and pair filenames with their media kind, dropping files with
/// unrecognized extensions.
pub fn classify_files(filenames: Vec<String>) -> Vec<(String, MediaKind)> {
    filenames
        .into_iter()
        .filter_map(|name| MediaKind::classify(&name).map(|kind| (name, kind)))
        .collect()
}

fn folder_name(href: &str) -> Option<String> {
    let path = strip_query(href);
    let trimmed = path.strip_suffix('/')?;
    let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

fn file_name(href: &str) -> Option<String> {
    let path = strip_query(href);
    if path.ends_with('/') {
        return None;
    }
    let name = path.rsplit('/').next().unwrap_or(path);
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

fn strip_query(href: &str) -> &str {
    let before_fragment = href.split('#').next().unwrap_or(href);
    before_fragment.split('?').next().unwrap_or(before_fragment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_listing_yields_plain_folders_only() {
        let html = r#"
            <html><body><pre>
            <a href="a/">a/</a>
            <a href="b/">b/</a>
            <a href="_template/">_template/</a>
            <a href="../">../</a>
            </pre></body></html>
        "#;

        assert_eq!(project_folders(html).expect("parses"), vec!["a", "b"]);
    }

    #[test]
    fn absolute_folder_hrefs_reduce_to_their_last_segment() {
        let html = r#"<a href="/archive/projects/lumen/">lumen/</a>"#;
        assert_eq!(project_folders(html).expect("parses"), vec!["lumen"]);
    }

    #[test]
    fn files_are_not_folders() {
        let html = r#"
            <a href="cover.jpg">cover.jpg</a>
            <a href="sub/">sub/</a>
            <a href="clip.mp4?raw=1">clip.mp4</a>
        "#;

        assert_eq!(
            media_files(html).expect("parses"),
            vec!["cover.jpg", "clip.mp4"]
        );
        assert_eq!(project_folders(html).expect("parses"), vec!["sub"]);
    }

    #[test]
    fn anchors_without_href_are_ignored() {
        let html = r#"<a name="top">top</a><a href="x/">x/</a>"#;
        assert_eq!(project_folders(html).expect("parses"), vec!["x"]);
    }

    #[test]
    fn classification_drops_unknown_extensions() {
        let files = vec![
            "b.jpg".to_string(),
            "a.zip".to_string(),
            "c.MD".to_string(),
            "d.webm".to_string(),
        ];

        let classified = classify_files(files);
        let names: Vec<&str> = classified.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["b.jpg", "c.MD", "d.webm"]);
        assert_eq!(classified[0].1, MediaKind::Image);
        assert_eq!(classified[1].1, MediaKind::Notes);
        assert_eq!(classified[2].1, MediaKind::Video);
    }
}
