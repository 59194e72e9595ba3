use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::{Result, TaskError};
use cronbox_core::ScriptKind;

/// Scripts larger than this are rejected before any file I/O.
const MAX_SCRIPT_BYTES: usize = 1024 * 1024;

/// Marker lines the generated header carries. Content that already contains
/// one of these is written verbatim on update so round-trip edits never grow
/// a second header block.
const HEADER_MARKER: &str = "# Cronbox task:";
const HEADER_ID_MARKER: &str = "# Task id:";

/// Writes, replaces, and removes materialized script files.
///
/// Files live under `<root>/<kind>/task_<id>.<ext>` with executable
/// permission; the derived resolved command is `<interpreter> <path>`.
/// Inline-command tasks never touch the filesystem: their "script path" is
/// empty and the resolved command is the user text verbatim.
pub struct ScriptMaterializer {
    root: PathBuf,
}

impl ScriptMaterializer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Validate user-supplied content before any file I/O. Applies to every
    /// script kind, inline commands included.
    pub fn validate(&self, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(TaskError::InvalidScript(
                "script content cannot be empty".to_string(),
            ));
        }
        if content.len() > MAX_SCRIPT_BYTES {
            return Err(TaskError::InvalidScript(
                "script content too large (max 1 MiB)".to_string(),
            ));
        }
        // Defense against path escape via embedded commands.
        if content.contains("../") {
            return Err(TaskError::InvalidScript(
                "script content contains a parent-directory traversal".to_string(),
            ));
        }
        Ok(())
    }

    /// Write a fresh script file for a newly created task.
    ///
    /// Returns `(relative path, resolved command)`. The generated header
    /// (shebang + task name + creation timestamp + task id) is always
    /// prepended here — the idempotence guard only applies to updates.
    pub fn materialize(
        &self,
        task_id: &str,
        task_name: &str,
        kind: ScriptKind,
        content: &str,
    ) -> Result<(String, String)> {
        if kind == ScriptKind::Command {
            return Ok((String::new(), content.to_string()));
        }
        let body = format!("{}{}", header(kind, task_name, task_id), content);
        self.write_script(task_id, kind, &body)
    }

    /// Replace a task's script file: delete the old one (already-absent is
    /// fine), then write the new content. Content that still carries the
    /// generated header is written verbatim instead of gaining a second one.
    pub fn rematerialize(
        &self,
        task_id: &str,
        task_name: &str,
        kind: ScriptKind,
        content: &str,
        old_path: &str,
    ) -> Result<(String, String)> {
        if let Err(e) = self.delete(old_path) {
            // A task row change matters more than a stray file.
            tracing::warn!(old_path, error = %e, "failed to delete old script file");
        }

        if has_header(content) {
            if kind == ScriptKind::Command {
                return Ok((String::new(), content.to_string()));
            }
            self.write_script(task_id, kind, content)
        } else {
            self.materialize(task_id, task_name, kind, content)
        }
    }

    /// Remove a script file. Empty path and missing file are both no-ops.
    pub fn delete(&self, rel_path: &str) -> Result<()> {
        if rel_path.is_empty() {
            return Ok(());
        }
        match fs::remove_file(self.root.join(rel_path)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TaskError::ScriptDeleteFailed(e.to_string())),
        }
    }

    /// Read a script file back, header included.
    pub fn read(&self, rel_path: &str) -> std::io::Result<String> {
        if rel_path.is_empty() {
            return Ok(String::new());
        }
        fs::read_to_string(self.root.join(rel_path))
    }

    fn write_script(
        &self,
        task_id: &str,
        kind: ScriptKind,
        body: &str,
    ) -> Result<(String, String)> {
        let write_failed = |e: std::io::Error| TaskError::ScriptWriteFailed(e.to_string());

        let dir = self.root.join(kind.to_string());
        fs::create_dir_all(&dir).map_err(write_failed)?;

        let filename = format!("task_{task_id}.{}", extension(kind));
        let rel_path = format!("{kind}/{filename}");
        let full_path = dir.join(&filename);

        fs::write(&full_path, body).map_err(write_failed)?;
        make_executable(&full_path).map_err(write_failed)?;

        let command = format!("{} {}", interpreter(kind), full_path.display());
        Ok((rel_path, command))
    }
}

fn extension(kind: ScriptKind) -> &'static str {
    match kind {
        ScriptKind::Shell => "sh",
        ScriptKind::Python => "py",
        ScriptKind::Command => "",
    }
}

fn interpreter(kind: ScriptKind) -> &'static str {
    match kind {
        ScriptKind::Shell => "/bin/bash",
        // Resolved through the shell's PATH, which holds up in minimal
        // container images where /usr/bin/python3 may not exist.
        ScriptKind::Python => "python3",
        ScriptKind::Command => "",
    }
}

fn header(kind: ScriptKind, task_name: &str, task_id: &str) -> String {
    let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
    match kind {
        ScriptKind::Shell => format!(
            "#!/bin/bash\n{HEADER_MARKER} {task_name}\n# Created: {timestamp}\n{HEADER_ID_MARKER} {task_id}\n\n"
        ),
        ScriptKind::Python => format!(
            "#!/usr/bin/env python3\n# -*- coding: utf-8 -*-\n{HEADER_MARKER} {task_name}\n# Created: {timestamp}\n{HEADER_ID_MARKER} {task_id}\n\n"
        ),
        ScriptKind::Command => String::new(),
    }
}

fn has_header(content: &str) -> bool {
    content.contains(HEADER_MARKER) || content.contains(HEADER_ID_MARKER)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
