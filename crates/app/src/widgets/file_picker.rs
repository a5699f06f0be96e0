//! Native file dialog for choosing a model file, using rfd (rust file dialog).
//!
//! The dialog runs on its own thread so the window keeps repainting; poll
//! [`ModelPicker::try_get_result`] each frame.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, TryRecvError};

/// Filter for file types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFilter {
    pub name: String,
    pub extensions: Vec<String>,
}

impl FileFilter {
    pub fn new(name: impl Into<String>, extensions: &[&str]) -> Self {
        Self {
            name: name.into(),
            extensions: extensions.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn gguf() -> Self {
        Self::new("GGUF models", &["gguf"])
    }

    pub fn all_files() -> Self {
        Self::new("All files", &["*"])
    }
}

pub struct ModelPicker {
    title: String,
    filters: Vec<FileFilter>,
    result_rx: Option<Receiver<Option<PathBuf>>>,
}

impl Default for ModelPicker {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelPicker {
    pub fn new() -> Self {
        Self {
            title: "Select GGUF model".to_string(),
            filters: vec![FileFilter::gguf(), FileFilter::all_files()],
            result_rx: None,
        }
    }

    pub fn filters(&self) -> &[FileFilter] {
        &self.filters
    }

    /// Open the dialog, starting next to `current` when it is set. Ignored
    /// while a dialog is already showing.
    pub fn open(&mut self, current: Option<&Path>) {
        if self.is_picking() {
            return;
        }
        let start_dir = current
            .and_then(Path::parent)
            .filter(|dir| dir.is_dir())
            .map(Path::to_path_buf);
        let title = self.title.clone();
        let filters = self.filters.clone();
        let (tx, rx) = std::sync::mpsc::channel();
        self.result_rx = Some(rx);

        std::thread::spawn(move || {
            let mut dialog = rfd::FileDialog::new().set_title(&title);
            for filter in &filters {
                let ext_refs: Vec<&str> = filter.extensions.iter().map(|s| s.as_str()).collect();
                dialog = dialog.add_filter(&filter.name, &ext_refs);
            }
            if let Some(dir) = start_dir {
                dialog = dialog.set_directory(dir);
            }
            let _ = tx.send(dialog.pick_file());
        });
    }

    /// `Some(Some(path))` when a file was chosen, `Some(None)` when the dialog
    /// was dismissed, `None` while still open or idle.
    pub fn try_get_result(&mut self) -> Option<Option<PathBuf>> {
        let rx = self.result_rx.as_ref()?;
        match rx.try_recv() {
            Ok(choice) => {
                self.result_rx = None;
                Some(choice)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.result_rx = None;
                Some(None)
            }
        }
    }

    pub fn is_picking(&self) -> bool {
        self.result_rx.is_some()
    }
}
