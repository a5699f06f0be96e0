//! UI-side state: the chat session plus the widgets and dialogs around it.

use crate::modals::{KeyDialog, Modal, ModalResult, NoticeDialog};
use crate::widgets::ModelPicker;
use chat_host::Session;
use shared::settings::Mode;
use std::path::PathBuf;

pub struct AppState {
    pub session: Session,
    pub input_text: String,
    pub model_path_text: String,
    pub key_dialog: KeyDialog,
    pub notice_dialog: NoticeDialog,
    pub picker: ModelPicker,
}

impl Default for AppState {
    fn default() -> Self {
        Self::with_session(Session::default())
    }
}

impl AppState {
    pub fn with_session(session: Session) -> Self {
        let model_path_text = session
            .settings()
            .local
            .model_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        Self {
            session,
            input_text: String::new(),
            model_path_text,
            key_dialog: KeyDialog::new("api_key_dialog"),
            notice_dialog: NoticeDialog::new("notice_dialog"),
            picker: ModelPicker::new(),
        }
    }

    /// Pick up worker results, queued notices and a finished file dialog.
    pub fn poll(&mut self) {
        self.session.poll();
        while let Some(notice) = self.session.next_notice() {
            self.notice_dialog.push(notice);
        }
        if let Some(Some(path)) = self.picker.try_get_result() {
            self.model_path_text = path.display().to_string();
            self.sync_model_path();
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.session.is_busy() || self.picker.is_picking()
    }

    pub fn send_message(&mut self) {
        match self.session.submit(&self.input_text) {
            Ok(true) => self.input_text.clear(),
            Ok(false) => {}
            Err(e) => tracing::warn!("message not sent: {}", e),
        }
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.session.set_mode(mode);
    }

    pub fn browse_model(&mut self) {
        let current = self.current_model_path();
        self.picker.open(current.as_deref());
    }

    pub fn load_model(&mut self) {
        self.sync_model_path();
        if let Err(e) = self.session.request_load() {
            tracing::info!("model load not started: {}", e);
        }
        // Refusals raise notices; show them this frame.
        while let Some(notice) = self.session.next_notice() {
            self.notice_dialog.push(notice);
        }
    }

    pub fn open_key_dialog(&mut self) {
        self.key_dialog.open();
    }

    /// Apply the key dialog's outcome once it closes.
    pub fn apply_key_result(&mut self) {
        match self.key_dialog.take_result() {
            ModalResult::Confirmed(key) => self.session.set_credential(Some(key.as_str())),
            ModalResult::Cancelled => self.session.set_credential(None),
            ModalResult::Pending => {}
        }
        while let Some(notice) = self.session.next_notice() {
            self.notice_dialog.push(notice);
        }
    }

    pub fn clear_chat(&mut self) {
        self.session.clear();
    }

    pub fn sync_model_path(&mut self) {
        let path = self.current_model_path();
        self.session.set_model_path(path);
    }

    fn current_model_path(&self) -> Option<PathBuf> {
        let text = self.model_path_text.trim();
        if text.is_empty() {
            None
        } else {
            Some(PathBuf::from(text))
        }
    }
}
