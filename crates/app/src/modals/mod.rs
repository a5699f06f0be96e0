//! Modal dialogs for the application.

pub mod key_dialog;
pub mod notice_dialog;

pub use key_dialog::KeyDialog;
pub use notice_dialog::NoticeDialog;

use egui::Context;

/// Trait for modal dialogs.
pub trait Modal {
    /// Update and render the modal. Returns true if the modal should close.
    fn update(&mut self, ctx: &Context) -> bool;

    /// Returns true if the modal is currently open.
    fn is_open(&self) -> bool;

    fn open(&mut self);

    fn close(&mut self);
}

/// Result from a modal dialog.
#[derive(Debug, Clone)]
pub enum ModalResult<T> {
    /// User hasn't made a decision yet
    Pending,
    Confirmed(T),
    Cancelled,
}

impl<T> ModalResult<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, ModalResult::Pending)
    }

    pub fn take_value(self) -> Option<T> {
        match self {
            ModalResult::Confirmed(v) => Some(v),
            _ => None,
        }
    }
}

/// Dim everything behind a dialog.
pub(crate) fn paint_overlay(ctx: &Context, id: egui::Id) {
    egui::Area::new(id.with("overlay"))
        .anchor(egui::Align2::LEFT_TOP, egui::Vec2::ZERO)
        .show(ctx, |ui| {
            let screen_rect = ctx.screen_rect();
            ui.allocate_response(screen_rect.size(), egui::Sense::click());
            ui.painter()
                .rect_filled(screen_rect, 0.0, egui::Color32::from_black_alpha(160));
        });
}
