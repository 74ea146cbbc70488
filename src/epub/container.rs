//! OCF container: `mimetype` and `META-INF/container.xml`.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{Error, Result};
use crate::util::{attr_string, local_name, strip_bom};

/// Contents of the `mimetype` entry.
pub const MIMETYPE: &str = "application/epub+zip";

/// Location of the container document relative to the project root.
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Media type of the OPF package document.
pub const OPF_MEDIA_TYPE: &str = "application/oebps-package+xml";

/// Parse META-INF/container.xml to find the package document path.
pub fn parse_container_xml(bytes: &[u8]) -> Result<String> {
    let content = String::from_utf8(strip_bom(bytes).to_vec())?;

    let mut reader = Reader::from_str(&content);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e))
                if local_name(e.name().as_ref()) == b"rootfile" =>
            {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"full-path" {
                        let path = attr_string(&attr.value);
                        if !path.is_empty() {
                            return Ok(path);
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    Err(Error::InvalidEpub(
        "No rootfile found in container.xml".into(),
    ))
}

/// Render a container document pointing at `opf_path`.
pub fn container_xml(opf_path: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="{}" media-type="{}"/>
  </rootfiles>
</container>
"#,
        crate::util::escape_xml(opf_path),
        OPF_MEDIA_TYPE
    )
}
