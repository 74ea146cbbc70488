//! # guten
//!
//! An editing core for unpacked EPUB publications.
//!
//! ## Features
//!
//! - Open an unpacked EPUB folder or unpack an `.epub` into a working directory
//! - Edit the manifest and spine, keeping the package document on disk in sync
//! - Rename files and rewrite the links that point at them
//! - Generate an EPUB 3 navigation document (and NCX) from content headings
//! - Index element ids across documents for cross-reference linking
//! - Package the project back into a valid `.epub`
//!
//! ## Quick Start
//!
//! ```no_run
//! use guten::{ExportOptions, HookIndex, NavOptions, NewProject, Project};
//!
//! let mut project = Project::new_project("my-book", &NewProject::default())?;
//! project.create_document("chapter2", "The Second Chapter")?;
//!
//! let report = project.generate_nav_from_headings(&NavOptions {
//!     overwrite: true,
//!     ..NavOptions::default()
//! })?;
//! println!("{} entries in {}", report.outline.len(), report.nav_href);
//!
//! let mut hooks = HookIndex::new();
//! hooks.build_full_index(&project)?;
//! let link = hooks.link_to("Text/chapter2.xhtml", "Text/chapter1.xhtml", "toc-1");
//! assert_eq!(link, "chapter1.xhtml#toc-1");
//!
//! project.export_epub("my-book.epub", &ExportOptions::default())?;
//! # Ok::<(), guten::Error>(())
//! ```

pub mod epub;
pub mod error;
pub mod export;
pub mod hooks;
pub mod nav;
pub mod project;
pub(crate) mod util;

pub use epub::{ManifestItem, Package, SpineRef};
pub use error::{Error, Result};
pub use export::{ExportOptions, ExportReport};
pub use hooks::{FileHooks, Hook, HookIndex, scan_hooks};
pub use nav::{HeadingItem, NavOptions, NavReport, build_outline};
pub use project::{Issue, NewProject, Project, RenameOutcome, Severity};
