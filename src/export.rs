//! Packaging a project as an `.epub` archive.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::epub::{CONTAINER_PATH, MIMETYPE, Package, container_xml, parse_container_xml};
use crate::error::{Error, Result};
use crate::project::Project;
use crate::util::decode_markup;

/// Options for [`Project::export_epub`].
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Also pack files under the project directory that the manifest does
    /// not list.
    pub include_unreferenced: bool,
    /// Deflate level (0-9). `None` uses 6.
    pub compression_level: Option<u32>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_unreferenced: false,
            compression_level: Some(6),
        }
    }
}

/// What [`Project::export_epub`] wrote.
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub path: PathBuf,
    /// Archive entry names in write order.
    pub entries: Vec<String>,
    /// Problems found when re-reading the archive. They never fail an export.
    pub warnings: Vec<String>,
}

impl Project {
    /// Write the project to `out_path` as an EPUB archive.
    pub fn export_epub<P: AsRef<Path>>(
        &self,
        out_path: P,
        options: &ExportOptions,
    ) -> Result<ExportReport> {
        let out_path = out_path.as_ref();

        if self.package().spine.items.is_empty() {
            return Err(Error::EmptySpine);
        }
        for item in self.manifest() {
            let path = self.item_path(item);
            if !path.is_file() {
                return Err(Error::MissingFile(path));
            }
        }

        let level = options.compression_level.unwrap_or(6).min(9);
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let deflated = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(level as i64));

        let mut zip = ZipWriter::new(BufWriter::new(File::create(out_path)?));
        let mut entries: Vec<String> = Vec::new();

        // mimetype must be first and stored
        zip.start_file("mimetype", stored)?;
        zip.write_all(MIMETYPE.as_bytes())?;
        entries.push("mimetype".to_string());

        let container = match fs::read(self.workdir().join(CONTAINER_PATH)) {
            Ok(bytes) => bytes,
            Err(_) => container_xml(self.opf_path()).into_bytes(),
        };
        zip.start_file(CONTAINER_PATH, deflated)?;
        zip.write_all(&container)?;
        entries.push(CONTAINER_PATH.to_string());

        zip.start_file(self.opf_path(), deflated)?;
        zip.write_all(self.package().to_xml().as_bytes())?;
        entries.push(self.opf_path().to_string());

        let mut written: HashSet<String> = entries.iter().cloned().collect();
        for item in self.manifest() {
            let name = self.container_path(item);
            if !written.insert(name.clone()) {
                debug!(href = %item.href, "skipping duplicate entry");
                continue;
            }
            zip.start_file(name.as_str(), deflated)?;
            zip.write_all(&self.read_bytes(item)?)?;
            entries.push(name);
        }

        if options.include_unreferenced {
            let skip = out_path.canonicalize().ok();
            let mut extra = Vec::new();
            collect_files(self.workdir(), "", &mut extra)?;
            extra.sort();
            for (name, path) in extra {
                if written.contains(&name) || path.canonicalize().ok() == skip {
                    continue;
                }
                zip.start_file(name.as_str(), deflated)?;
                zip.write_all(&fs::read(&path)?)?;
                written.insert(name.clone());
                entries.push(name);
            }
        }

        zip.finish()?.flush()?;

        let warnings = sanity_check(out_path);
        for warning in &warnings {
            warn!(path = %out_path.display(), "{warning}");
        }

        info!(
            path = %out_path.display(),
            entries = entries.len(),
            warnings = warnings.len(),
            "exported epub"
        );
        Ok(ExportReport {
            path: out_path.to_path_buf(),
            entries,
            warnings,
        })
    }
}

/// Regular files under `dir`, as (container path, absolute path).
fn collect_files(dir: &Path, prefix: &str, out: &mut Vec<(String, PathBuf)>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let container = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&entry.path(), &container, out)?;
        } else if file_type.is_file() {
            out.push((container, entry.path()));
        }
    }
    Ok(())
}

/// Re-open a written archive and report structural problems.
fn sanity_check(path: &Path) -> Vec<String> {
    match check_archive(path) {
        Ok(warnings) => warnings,
        Err(e) => vec![format!("could not re-read archive: {e}")],
    }
}

fn check_archive(path: &Path) -> Result<Vec<String>> {
    let mut warnings = Vec::new();
    let mut archive = ZipArchive::new(File::open(path)?)?;

    {
        let first = archive.by_index(0)?;
        if first.name() != "mimetype" {
            warnings.push(format!("first entry is '{}', not mimetype", first.name()));
        } else if first.compression() != CompressionMethod::Stored {
            warnings.push("mimetype entry is compressed".to_string());
        }
    }

    let mut container = Vec::new();
    archive.by_name(CONTAINER_PATH)?.read_to_end(&mut container)?;
    let opf_path = parse_container_xml(&container)?;

    let mut opf = Vec::new();
    archive.by_name(&opf_path)?.read_to_end(&mut opf)?;
    let package = Package::parse(&decode_markup(&opf))?;
    if package.spine.items.is_empty() {
        warnings.push("package in archive has an empty spine".to_string());
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::NewProject;
    use tempfile::TempDir;

    fn project() -> (TempDir, Project) {
        let dir = TempDir::new().unwrap();
        let project =
            Project::new_project(dir.path().join("book"), &NewProject::default()).unwrap();
        (dir, project)
    }

    #[test]
    fn test_entry_order() {
        let (dir, project) = project();
        let out = dir.path().join("out.epub");
        let report = project.export_epub(&out, &ExportOptions::default()).unwrap();

        assert_eq!(
            &report.entries[..3],
            &["mimetype", "META-INF/container.xml", "OEBPS/content.opf"]
        );
        assert!(report.entries.contains(&"OEBPS/Text/nav.xhtml".to_string()));
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);

        let mut archive = ZipArchive::new(File::open(&out).unwrap()).unwrap();
        let first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), CompressionMethod::Stored);
    }

    #[test]
    fn test_unreferenced_files() {
        let (dir, project) = project();
        fs::write(project.workdir().join("OEBPS").join("notes.txt"), "scratch").unwrap();

        let out = dir.path().join("plain.epub");
        let report = project.export_epub(&out, &ExportOptions::default()).unwrap();
        assert!(!report.entries.contains(&"OEBPS/notes.txt".to_string()));

        let options = ExportOptions {
            include_unreferenced: true,
            ..ExportOptions::default()
        };
        let out = dir.path().join("full.epub");
        let report = project.export_epub(&out, &options).unwrap();
        assert_eq!(report.entries.last().map(String::as_str), Some("OEBPS/notes.txt"));
        assert_eq!(
            report.entries.iter().filter(|e| *e == "mimetype").count(),
            1
        );
    }

    #[test]
    fn test_missing_file_fails() {
        let (dir, project) = project();
        fs::remove_file(project.workdir().join("OEBPS/Styles/style.css")).unwrap();
        assert!(matches!(
            project.export_epub(dir.path().join("x.epub"), &ExportOptions::default()),
            Err(Error::MissingFile(_))
        ));
    }

    #[test]
    fn test_empty_spine_fails() {
        let (dir, mut project) = project();
        project.set_spine(&[]).unwrap();
        assert!(matches!(
            project.export_epub(dir.path().join("x.epub"), &ExportOptions::default()),
            Err(Error::EmptySpine)
        ));
    }
}
