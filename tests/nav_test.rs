//! Navigation generation across several documents and folders.

use std::fs;

use guten::{Error, NavOptions, NewProject, Project};
use tempfile::TempDir;

fn body_doc(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>t</title></head>
<body>
{body}
</body>
</html>
"#
    )
}

fn rebuild() -> NavOptions {
    NavOptions {
        overwrite: true,
        ..NavOptions::default()
    }
}

#[test]
fn test_existing_nav_requires_overwrite() {
    let dir = TempDir::new().unwrap();
    let mut project = Project::new_project(dir.path(), &NewProject::default()).unwrap();

    assert!(matches!(
        project.generate_nav_from_headings(&NavOptions::default()),
        Err(Error::NavExists(_))
    ));
    let report = project.generate_nav_from_headings(&rebuild()).unwrap();
    assert_eq!(report.nav_href, "Text/nav.xhtml");
    assert!(report.modified_files.is_empty());
    assert_eq!(
        project
            .manifest()
            .iter()
            .filter(|i| i.has_property("nav"))
            .count(),
        1
    );
}

#[test]
fn test_outline_across_documents() {
    let dir = TempDir::new().unwrap();
    let mut project = Project::new_project(dir.path(), &NewProject::default()).unwrap();

    let chapter1 = project.item_by_id("chapter1.xhtml").unwrap().clone();
    project
        .write_text(
            &chapter1,
            &body_doc(
                r#"<h1 id="part1">Part One</h1>
<h2>Beginnings</h2>
<h3 id="toc-1">Taken id</h3>
<h4>Too deep</h4>"#,
            ),
        )
        .unwrap();

    let second = project.create_document("second", "ignored").unwrap();
    project
        .write_text(&second, &body_doc("<h2>Middles</h2>\n<h1>Part Two</h1>"))
        .unwrap();

    let report = project.generate_nav_from_headings(&rebuild()).unwrap();

    let titles: Vec<_> = report.outline.iter().map(|h| h.title.as_str()).collect();
    assert_eq!(titles, vec!["Part One", "Part Two"]);
    let part1 = &report.outline[0];
    let children: Vec<_> = part1.children.iter().map(|h| h.title.as_str()).collect();
    assert_eq!(children, vec!["Beginnings", "Middles"]);
    assert_eq!(part1.children[0].children[0].title, "Taken id");

    // generated ids skip the one already present in the document
    assert_eq!(part1.children[0].id.as_deref(), Some("toc-2"));
    assert_eq!(
        report.modified_files,
        vec!["Text/chapter1.xhtml", "Text/second.xhtml"]
    );

    let nav = project.package().nav_item().unwrap().clone();
    let nav_text = project.read_text(&nav).unwrap();
    assert!(nav_text.contains(r#"<a href="chapter1.xhtml#part1">Part One</a>"#));
    assert!(nav_text.contains(r#"<a href="second.xhtml#toc-1">Middles</a>"#));
    assert!(!nav_text.contains("Too deep"));

    // a second run finds every id in place
    let again = project.generate_nav_from_headings(&rebuild()).unwrap();
    assert!(again.modified_files.is_empty());
    assert_eq!(again.outline, report.outline);
}

#[test]
fn test_without_adding_ids_links_to_file() {
    let dir = TempDir::new().unwrap();
    let mut project = Project::new_project(dir.path(), &NewProject::default()).unwrap();
    let second = project.create_document("second", "Plain").unwrap();
    let before = project.read_text(&second).unwrap();

    let options = NavOptions {
        overwrite: true,
        add_missing_ids: false,
        ..NavOptions::default()
    };
    let report = project.generate_nav_from_headings(&options).unwrap();
    assert!(report.modified_files.is_empty());
    assert_eq!(project.read_text(&second).unwrap(), before);
    assert_eq!(report.outline[1].href_from("OEBPS/Text/nav.xhtml"), "second.xhtml");
}

#[test]
fn test_nav_in_nested_folder_and_ncx() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("META-INF")).unwrap();
    fs::create_dir_all(root.join("OPS/content/part1")).unwrap();
    fs::write(root.join("mimetype"), "application/epub+zip").unwrap();
    fs::write(
        root.join("META-INF/container.xml"),
        guten::epub::container_xml("OPS/package.opf"),
    )
    .unwrap();
    fs::write(
        root.join("OPS/package.opf"),
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="uid">urn:isbn:9780000000000</dc:identifier>
    <dc:title>Nested</dc:title>
    <dc:language>en</dc:language>
    <meta property="dcterms:modified">2020-01-01T00:00:00Z</meta>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="a" href="content/part1/a.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="a"/>
  </spine>
</package>
"#,
    )
    .unwrap();
    fs::write(root.join("OPS/toc.ncx"), "<ncx/>").unwrap();
    fs::write(
        root.join("OPS/content/part1/a.xhtml"),
        body_doc(r#"<h1 id="start">Start</h1><h2 id="deeper">Deeper</h2>"#),
    )
    .unwrap();

    let mut project = Project::open_folder(root).unwrap();
    let report = project.generate_nav_from_headings(&NavOptions::default()).unwrap();

    assert_eq!(report.nav_href, "content/part1/nav.xhtml");
    assert_eq!(report.ncx_href.as_deref(), Some("toc.ncx"));

    let ncx = fs::read_to_string(root.join("OPS/toc.ncx")).unwrap();
    assert!(ncx.contains(r#"<content src="content/part1/a.xhtml#start"/>"#));
    assert!(ncx.contains(r#"<content src="content/part1/a.xhtml#deeper"/>"#));
    assert!(ncx.contains(r#"<meta name="dtb:uid" content="urn:isbn:9780000000000"/>"#));
    assert!(ncx.contains(r#"<meta name="dtb:depth" content="2"/>"#));

    let nav = fs::read_to_string(root.join("OPS/content/part1/nav.xhtml")).unwrap();
    assert!(nav.contains(r#"<a href="a.xhtml#start">Start</a>"#));

    assert_ne!(project.package().modified(), Some("2020-01-01T00:00:00Z"));
    assert!(project.validate().is_empty());
}

#[test]
fn test_legacy_encoded_chapter_rewritten_as_utf8() {
    let dir = TempDir::new().unwrap();
    let mut project = Project::new_project(dir.path(), &NewProject::default()).unwrap();
    let chapter1 = project.item_by_id("chapter1.xhtml").unwrap().clone();
    let mut bytes = b"<?xml version=\"1.0\" encoding=\"windows-1252\"?>\n".to_vec();
    bytes.extend_from_slice(b"<html xmlns=\"http://www.w3.org/1999/xhtml\"><body>\n");
    bytes.extend_from_slice(b"<h1>Caf\xe9</h1>\n</body></html>\n");
    fs::write(project.item_path(&chapter1), &bytes).unwrap();

    let report = project.generate_nav_from_headings(&rebuild()).unwrap();
    assert_eq!(report.outline[0].title, "Café");
    assert_eq!(report.modified_files, vec!["Text/chapter1.xhtml"]);

    let written = String::from_utf8(fs::read(project.item_path(&chapter1)).unwrap()).unwrap();
    assert!(written.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
    assert!(written.contains(r#"<h1 id="toc-1">Café</h1>"#));
}

#[test]
fn test_headingless_book_links_first_document() {
    let dir = TempDir::new().unwrap();
    let mut project = Project::new_project(dir.path(), &NewProject::default()).unwrap();
    let chapter1 = project.item_by_id("chapter1.xhtml").unwrap().clone();
    project
        .write_text(&chapter1, &body_doc("<p>No headings at all.</p>"))
        .unwrap();

    let report = project.generate_nav_from_headings(&rebuild()).unwrap();
    assert_eq!(report.outline.len(), 1);
    assert_eq!(report.outline[0].title, "Untitled");
    assert!(report.outline[0].id.is_none());
    assert!(report.modified_files.is_empty());

    let nav = project.package().nav_item().unwrap().clone();
    let nav_text = project.read_text(&nav).unwrap();
    assert_eq!(nav_text.matches("<li>").count(), 1);
    assert!(nav_text.contains(r#"<li><a href="chapter1.xhtml">Untitled</a></li>"#));
}
