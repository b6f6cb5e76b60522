//! Standalone HTML gallery for a scenario's image folder.

use crate::config::DEFAULT_ASSETS_DIR;
use crate::result::ImagesResult;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the generated gallery
pub const GALLERY_FILE_NAME: &str = "images.html";

/// `data-lightbox` group shared by every image of a gallery
pub const LIGHTBOX_GROUP: &str = "lightbox-test-results";

/// Gallery page renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gallery {
    title: String,
    assets_href: String,
}

impl Gallery {
    /// Gallery titled after the scenario; assets are referenced from the
    /// sibling `image_attachments_utils` folder
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            assets_href: format!("../{DEFAULT_ASSETS_DIR}"),
        }
    }

    /// Relative location of the lightbox assets
    #[must_use]
    pub fn with_assets_href(mut self, href: impl Into<String>) -> Self {
        self.assets_href = href.into();
        self
    }

    /// Page title
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Render the page for the given image file names (already ordered)
    #[must_use]
    pub fn render_html(
        &self,
        images: &[String],
        captions: &BTreeMap<String, Vec<String>>,
    ) -> String {
        let mut html = String::new();
        let title = escape_html(&self.title);
        let assets = escape_attribute(&self.assets_href);

        html.push_str("<!DOCTYPE html>\n<html class=\"gallery-html\">\n<head>\n");
        html.push_str("    <meta charset=\"UTF-8\">\n");
        html.push_str(&format!("    <title>{title}</title>\n"));
        html.push_str(&format!(
            "    <link rel=\"stylesheet\" href=\"{assets}/lightbox.css\">\n"
        ));
        html.push_str(&format!(
            "    <link rel=\"stylesheet\" href=\"{assets}/gallery.css\">\n"
        ));
        html.push_str(&format!(
            "    <script src=\"{assets}/lightbox.js\" type=\"text/javascript\" defer></script>\n"
        ));
        html.push_str("</head>\n<body class=\"gallery-body\">\n");
        html.push_str(&format!("<h1 class=\"gallery-title\">{title}</h1>\n"));
        html.push_str("<div class=\"gallery-container\">\n");

        for file_name in images {
            let stem = Path::new(file_name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(file_name);
            let caption = captions.get(stem).map(|lines| lines.concat()).unwrap_or_default();
            let src = escape_attribute(file_name);
            html.push_str(&format!(
                "    <a href=\"{src}\" data-lightbox=\"{LIGHTBOX_GROUP}\" data-title=\"{}\"><img src=\"{src}\" class=\"gallery-image\" alt=\"{}\"></a>\n",
                escape_attribute(&caption),
                escape_attribute(stem),
            ));
        }

        html.push_str("</div>\n</body>\n</html>\n");
        html
    }

    /// Write `images.html` into `folder` listing its `.png` files.
    ///
    /// Returns `None` and writes nothing when the folder holds no images.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the folder cannot be listed or the page
    /// cannot be written.
    pub fn write(
        &self,
        folder: &Path,
        captions: &BTreeMap<String, Vec<String>>,
    ) -> ImagesResult<Option<PathBuf>> {
        let images = list_png_files(folder)?;
        if images.is_empty() {
            debug!("no images in {}, gallery skipped", folder.display());
            return Ok(None);
        }
        let path = folder.join(GALLERY_FILE_NAME);
        fs::write(&path, self.render_html(&images, captions))?;
        debug!(images = images.len(), "gallery written to {}", path.display());
        Ok(Some(path))
    }
}

/// Render the gallery for `folder` with default asset locations
///
/// # Errors
///
/// See [`Gallery::write`].
pub fn render_gallery(
    folder: &Path,
    title: &str,
    captions: &BTreeMap<String, Vec<String>>,
) -> ImagesResult<Option<PathBuf>> {
    Gallery::new(title).write(folder, captions)
}

/// `.png` files (case-insensitive) directly inside `folder`, sorted by name.
/// A missing folder has no images.
///
/// # Errors
///
/// Returns an I/O error if an existing folder cannot be read.
pub fn list_png_files(folder: &Path) -> ImagesResult<Vec<String>> {
    if !folder.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        let is_png = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
        if is_png && path.is_file() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// Captions keep their `<br>` markers; lightbox renders the title as markup.
fn escape_attribute(s: &str) -> String {
    s.replace('&', "&amp;").replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn captions(pairs: &[(&str, &str)]) -> BTreeMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), vec![(*v).to_string()]))
            .collect()
    }

    mod render_tests {
        use super::*;

        #[test]
        fn test_page_structure() {
            let html = Gallery::new("Login works").render_html(
                &["0001.png".to_string()],
                &captions(&[("0001", "I log in<br>")]),
            );

            assert!(html.starts_with("<!DOCTYPE html>"));
            assert!(html.contains("<h1 class=\"gallery-title\">Login works</h1>"));
            assert!(html.contains("<div class=\"gallery-container\">"));
            assert!(html.contains("href=\"../image_attachments_utils/lightbox.css\""));
            assert!(html.contains("src=\"../image_attachments_utils/lightbox.js\""));
            assert!(html.contains(
                "<a href=\"0001.png\" data-lightbox=\"lightbox-test-results\" data-title=\"I log in<br>\">"
            ));
            assert!(html.contains("<img src=\"0001.png\" class=\"gallery-image\""));
        }

        #[test]
        fn test_missing_caption_is_empty() {
            let html = Gallery::new("t").render_html(&["0003.png".to_string()], &BTreeMap::new());
            assert!(html.contains("data-title=\"\""));
        }

        #[test]
        fn test_title_and_caption_escaping() {
            let html = Gallery::new("A <b> & \"c\"").render_html(
                &["0001.png".to_string()],
                &captions(&[("0001", "say \"hi\" & bye")]),
            );
            assert!(html.contains("A &lt;b&gt; &amp; &quot;c&quot;"));
            assert!(html.contains("data-title=\"say &quot;hi&quot; &amp; bye\""));
        }

        #[test]
        fn test_custom_assets_href() {
            let html = Gallery::new("t")
                .with_assets_href("assets")
                .render_html(&[], &BTreeMap::new());
            assert!(html.contains("href=\"assets/gallery.css\""));
        }
    }

    mod write_tests {
        use super::*;

        #[test]
        fn test_lists_png_files_sorted() {
            let dir = TempDir::new().unwrap();
            for name in ["0002.png", "0001.PNG", "0003.jpg", "notes.txt"] {
                fs::write(dir.path().join(name), b"x").unwrap();
            }
            fs::create_dir(dir.path().join("0000.png")).unwrap();

            let names = list_png_files(dir.path()).unwrap();

            assert_eq!(names, vec!["0001.PNG", "0002.png"]);
        }

        #[test]
        fn test_writes_gallery_in_order() {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("0002.png"), b"x").unwrap();
            fs::write(dir.path().join("0001.png"), b"x").unwrap();

            let path = render_gallery(dir.path(), "Scenario", &BTreeMap::new())
                .unwrap()
                .unwrap();

            assert_eq!(path, dir.path().join(GALLERY_FILE_NAME));
            let html = fs::read_to_string(path).unwrap();
            let first = html.find("0001.png").unwrap();
            let second = html.find("0002.png").unwrap();
            assert!(first < second);
        }

        #[test]
        fn test_no_images_no_file() {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("notes.txt"), b"x").unwrap();

            let written = render_gallery(dir.path(), "Scenario", &BTreeMap::new()).unwrap();

            assert!(written.is_none());
            assert!(!dir.path().join(GALLERY_FILE_NAME).exists());
        }

        #[test]
        fn test_missing_folder_no_file() {
            let dir = TempDir::new().unwrap();
            let written =
                render_gallery(&dir.path().join("absent"), "Scenario", &BTreeMap::new()).unwrap();
            assert!(written.is_none());
        }
    }
}
