//! Internal consistency checks of a project.

use std::collections::HashSet;
use std::fmt;

use super::Project;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// A problem found by [`Project::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub severity: Severity,
    pub message: String,
    /// Manifest href (or spine idref) the issue is about.
    pub href: Option<String>,
}

impl Issue {
    fn error(message: impl Into<String>, href: Option<&str>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            href: href.map(str::to_string),
        }
    }

    fn warning(message: impl Into<String>, href: Option<&str>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            href: href.map(str::to_string),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.href {
            Some(href) => write!(f, "{}: {} ({})", self.severity, self.message, href),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

impl Project {
    /// Check the manifest, spine and files against each other.
    pub fn validate(&self) -> Vec<Issue> {
        let mut issues = Vec::new();
        let package = &self.package;

        let mut ids = HashSet::new();
        let mut paths = HashSet::new();
        for item in &package.manifest {
            if item.id.is_empty() {
                issues.push(Issue::error("manifest item without id", Some(&item.href)));
            } else if !ids.insert(item.id.as_str()) {
                issues.push(Issue::error(
                    format!("duplicate manifest id '{}'", item.id),
                    Some(&item.href),
                ));
            }

            let path = self.container_path(item);
            if !paths.insert(path) {
                issues.push(Issue::error("duplicate manifest href", Some(&item.href)));
            }
            if !self.item_path(item).is_file() {
                issues.push(Issue::error("file listed in manifest is missing", Some(&item.href)));
            }
        }

        if package.spine.items.is_empty() {
            issues.push(Issue::error("spine is empty", None));
        }
        let mut seen = HashSet::new();
        for itemref in &package.spine.items {
            match self.items_by_id.get(&itemref.idref) {
                None => issues.push(Issue::error(
                    format!("spine references unknown id '{}'", itemref.idref),
                    Some(&itemref.idref),
                )),
                Some(item) if !item.is_html() => issues.push(Issue::warning(
                    format!("spine item has media type {}", item.media_type),
                    Some(&item.href),
                )),
                Some(_) => {}
            }
            if !seen.insert(itemref.idref.as_str()) {
                issues.push(Issue::error(
                    format!("'{}' appears more than once in the spine", itemref.idref),
                    Some(&itemref.idref),
                ));
            }
        }

        if let Some(toc) = &package.spine.toc
            && !self.items_by_id.contains_key(toc)
        {
            issues.push(Issue::error(
                format!("spine toc references unknown id '{toc}'"),
                None,
            ));
        }

        if package.is_epub3() {
            match package.manifest.iter().filter(|i| i.has_property("nav")).count() {
                0 => issues.push(Issue::error("no navigation document", None)),
                1 => {}
                _ => issues.push(Issue::error("more than one navigation document", None)),
            }
        }

        issues
    }
}
