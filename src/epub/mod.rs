//! EPUB container primitives: OCF container, OPF package and href paths.

pub mod container;
pub mod package;
pub mod paths;

pub use container::{CONTAINER_PATH, MIMETYPE, container_xml, parse_container_xml};
pub use package::{GuideRef, ManifestItem, MetaNode, Package, Spine, SpineRef};
