//! Renders a service's embedded templates into its artifact directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use include_dir::{Dir, DirEntry};

use crate::application::ports::LocalArtifactWriter;
use crate::domain::DeployError;
use crate::domain::template::render_template;

/// Renders template directories. Identical in dry-run and real mode.
pub struct TemplateRenderer<'a> {
    templates: &'a Dir<'a>,
    writer: &'a dyn LocalArtifactWriter,
}

impl<'a> TemplateRenderer<'a> {
    pub fn new(templates: &'a Dir<'a>, writer: &'a dyn LocalArtifactWriter) -> Self {
        Self { templates, writer }
    }

    /// Render every template under `template_dir` into `out_dir`, keeping the
    /// relative layout. Files left in `out_dir` by an earlier render that no
    /// longer have a template are removed.
    ///
    /// Returns the written paths in sorted order.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Configuration` if the template directory does
    /// not exist or a template references an undefined value.
    pub fn render_dir(
        &self,
        template_dir: &str,
        values: &BTreeMap<String, String>,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let dir = self.templates.get_dir(template_dir).ok_or_else(|| {
            DeployError::config(
                format!("no templates embedded for '{template_dir}'"),
                "this build of datastack is missing service templates",
            )
        })?;

        let mut files = Vec::new();
        collect_files(dir, &mut files);
        files.sort_by(|a, b| a.0.cmp(b.0));

        let mut written = Vec::with_capacity(files.len());
        for (path, contents) in files {
            let name = path.to_string_lossy();
            let source = std::str::from_utf8(contents)
                .with_context(|| format!("template {name} is not UTF-8"))?;
            let rendered = render_template(&name, source, values)?;
            let relative = path.strip_prefix(dir.path()).unwrap_or(path);
            let target = out_dir.join(relative);
            self.writer.write_artifact(&target, rendered.as_bytes())?;
            written.push(target);
        }
        self.writer.prune(out_dir, &written)?;
        tracing::debug!(template_dir, count = written.len(), "rendered templates");
        Ok(written)
    }

    /// Write one generated (non-template) artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, path: &Path, content: &str) -> Result<PathBuf> {
        self.writer.write_artifact(path, content.as_bytes())?;
        Ok(path.to_path_buf())
    }
}

fn collect_files<'a>(dir: &'a Dir<'a>, out: &mut Vec<(&'a Path, &'a [u8])>) {
    for entry in dir.entries() {
        match entry {
            DirEntry::Dir(sub) => collect_files(sub, out),
            DirEntry::File(file) => out.push((file.path(), file.contents())),
        }
    }
}
