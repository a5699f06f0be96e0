//! Masked entry for the hosted service's API key.
//!
//! The key is held in a `Zeroizing` buffer while typed and handed out once,
//! on submit.

use super::{paint_overlay, Modal, ModalResult};
use egui::{Align2, Context, Id, Key, RichText, TextEdit, Vec2};
use zeroize::Zeroizing;

pub struct KeyDialog {
    is_open: bool,
    key: Zeroizing<String>,
    result: ModalResult<Zeroizing<String>>,
    focus_pending: bool,
    id: Id,
}

impl KeyDialog {
    pub fn new(id: impl std::hash::Hash) -> Self {
        Self {
            is_open: false,
            key: Zeroizing::new(String::new()),
            result: ModalResult::Pending,
            focus_pending: false,
            id: Id::new(id),
        }
    }

    /// Get the result. `Confirmed` may hold an empty key; the session decides
    /// what a blank entry means.
    pub fn take_result(&mut self) -> ModalResult<Zeroizing<String>> {
        std::mem::replace(&mut self.result, ModalResult::Pending)
    }

    fn submit(&mut self) {
        let key = std::mem::take(&mut *self.key);
        self.result = ModalResult::Confirmed(Zeroizing::new(key));
    }
}

impl Modal for KeyDialog {
    fn update(&mut self, ctx: &Context) -> bool {
        if !self.is_open {
            return false;
        }

        let mut should_close = false;
        paint_overlay(ctx, self.id);

        egui::Window::new("OpenAI API Key")
            .id(self.id.with("window"))
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, Vec2::ZERO)
            .show(ctx, |ui| {
                ui.set_min_width(380.0);
                ui.add_space(8.0);
                ui.label("Paste your OpenAI API key (stored only in memory):");
                ui.add_space(8.0);

                let response = ui.add(
                    TextEdit::singleline(&mut *self.key)
                        .password(true)
                        .desired_width(340.0)
                        .hint_text("sk-..."),
                );
                if self.focus_pending {
                    response.request_focus();
                    self.focus_pending = false;
                }
                if response.lost_focus() && ui.input(|i| i.key_pressed(Key::Enter)) {
                    self.submit();
                    should_close = true;
                }

                ui.add_space(12.0);
                ui.horizontal(|ui| {
                    if ui.button("Cancel").clicked() {
                        self.result = ModalResult::Cancelled;
                        should_close = true;
                    }
                    ui.add_space(8.0);
                    if ui.button("OK").clicked() {
                        self.submit();
                        should_close = true;
                    }
                });

                ui.add_space(8.0);
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Min), |ui| {
                    ui.label(RichText::new("🔒 Key is never written to disk").small().weak());
                });
            });

        if ctx.input(|i| i.key_pressed(Key::Escape)) {
            self.result = ModalResult::Cancelled;
            should_close = true;
        }

        if should_close {
            self.is_open = false;
            self.key = Zeroizing::new(String::new());
        }
        should_close
    }

    fn is_open(&self) -> bool {
        self.is_open
    }

    fn open(&mut self) {
        self.is_open = true;
        self.focus_pending = true;
        self.key = Zeroizing::new(String::new());
        self.result = ModalResult::Pending;
    }

    fn close(&mut self) {
        self.is_open = false;
        self.key = Zeroizing::new(String::new());
        self.result = ModalResult::Cancelled;
    }
}
