//! Fresh project scaffolding and document templates.

use std::fs;
use std::path::Path;

use tracing::info;

use super::Project;
use crate::epub::package::{CSS_MEDIA_TYPE, XHTML_MEDIA_TYPE};
use crate::epub::{CONTAINER_PATH, MIMETYPE, ManifestItem, Package, SpineRef, container_xml};
use crate::error::{Error, Result};
use crate::nav::NavOptions;
use crate::util::escape_xml;

const OPF_PATH: &str = "OEBPS/content.opf";

const DEFAULT_CSS: &str = "body {
  margin: 0 5%;
  line-height: 1.4;
}

h1, h2, h3 {
  text-align: center;
}
";

/// Settings for [`Project::new_project`].
#[derive(Debug, Clone)]
pub struct NewProject {
    pub title: String,
    pub language: String,
    pub author: Option<String>,
}

impl Default for NewProject {
    fn default() -> Self {
        Self {
            title: "Untitled".to_string(),
            language: "en".to_string(),
            author: None,
        }
    }
}

/// An XHTML 5 content document.
pub(crate) fn xhtml_document(
    title: &str,
    language: &str,
    stylesheets: &[String],
    body: &str,
) -> String {
    let mut doc = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" xml:lang="{lang}" lang="{lang}">
<head>
  <title>{title}</title>
"#,
        lang = escape_xml(language),
        title = escape_xml(title)
    );
    for href in stylesheets {
        doc.push_str(&format!(
            "  <link rel=\"stylesheet\" type=\"text/css\" href=\"{}\"/>\n",
            escape_xml(href)
        ));
    }
    doc.push_str("</head>\n<body>\n");
    doc.push_str(body);
    doc.push_str("</body>\n</html>\n");
    doc
}

/// Current time in the form EPUB 3 requires for `dcterms:modified`.
pub(crate) fn modified_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

impl Project {
    /// Scaffold a minimal EPUB 3 project in `dir` and open it.
    ///
    /// Creates one chapter, one stylesheet and a navigation document
    /// generated from the chapter's heading.
    pub fn new_project<P: AsRef<Path>>(dir: P, settings: &NewProject) -> Result<Self> {
        let dir = dir.as_ref();
        if dir.join(CONTAINER_PATH).exists() {
            return Err(Error::InvalidEpub(format!(
                "{} already contains a project",
                dir.display()
            )));
        }

        fs::create_dir_all(dir.join("META-INF"))?;
        fs::create_dir_all(dir.join("OEBPS").join("Text"))?;
        fs::create_dir_all(dir.join("OEBPS").join("Styles"))?;

        fs::write(dir.join("mimetype"), MIMETYPE)?;
        fs::write(dir.join(CONTAINER_PATH), container_xml(OPF_PATH))?;
        fs::write(dir.join("OEBPS").join("Styles").join("style.css"), DEFAULT_CSS)?;

        let chapter = xhtml_document(
            &settings.title,
            &settings.language,
            &["../Styles/style.css".to_string()],
            &format!("  <h1>{}</h1>\n  <p></p>\n", escape_xml(&settings.title)),
        );
        fs::write(dir.join("OEBPS").join("Text").join("chapter1.xhtml"), chapter)?;

        let identifier = format!("urn:uuid:{}", uuid::Uuid::new_v4());
        let mut package = Package::new_epub3(&identifier, &settings.title, &settings.language);
        if let Some(author) = &settings.author {
            package.set_creators(std::slice::from_ref(author));
        }
        package.set_modified(&modified_timestamp());
        package.manifest.push(ManifestItem::new(
            "style.css",
            "Styles/style.css",
            CSS_MEDIA_TYPE,
        ));
        package.manifest.push(ManifestItem::new(
            "chapter1.xhtml",
            "Text/chapter1.xhtml",
            XHTML_MEDIA_TYPE,
        ));
        package.spine.items.push(SpineRef::new("chapter1.xhtml"));
        fs::write(dir.join("OEBPS").join("content.opf"), package.to_xml())?;

        let mut project = Self::open_folder(dir)?;
        project.generate_nav_from_headings(&NavOptions::default())?;

        info!(dir = %dir.display(), title = %settings.title, "scaffolded new project");
        Ok(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_project_layout() {
        let dir = TempDir::new().unwrap();
        let settings = NewProject {
            title: "A & B".to_string(),
            language: "de".to_string(),
            author: Some("Jo Writer".to_string()),
        };
        let project = Project::new_project(dir.path(), &settings).unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("mimetype")).unwrap(), MIMETYPE);
        assert_eq!(project.opf_path(), "OEBPS/content.opf");

        let package = project.package();
        assert_eq!(package.title(), Some("A & B"));
        assert_eq!(package.language(), Some("de"));
        assert_eq!(package.creators(), vec!["Jo Writer"]);
        assert!(package.identifier().unwrap().starts_with("urn:uuid:"));
        assert!(package.modified().is_some());

        assert_eq!(project.spine_ids(), vec!["chapter1.xhtml"]);
        let nav = package.nav_item().unwrap();
        assert_eq!(nav.href, "Text/nav.xhtml");
        assert!(project.item_path(nav).exists());
    }

    #[test]
    fn test_new_project_refuses_existing_project() {
        let dir = TempDir::new().unwrap();
        Project::new_project(dir.path(), &NewProject::default()).unwrap();
        assert!(matches!(
            Project::new_project(dir.path(), &NewProject::default()),
            Err(Error::InvalidEpub(_))
        ));
    }

    #[test]
    fn test_xhtml_document_links_stylesheets() {
        let doc = xhtml_document("T", "en", &["../Styles/a.css".to_string()], "  <p/>\n");
        assert!(doc.contains(r#"href="../Styles/a.css""#));
        assert!(doc.contains("<title>T</title>"));
    }
}
