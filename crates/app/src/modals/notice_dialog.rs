//! Blocking warning/error popup for session notices.

use super::{paint_overlay, Modal};
use chat_host::{Notice, NoticeLevel};
use egui::{Align2, Context, Id, Key, RichText, Vec2};
use std::collections::VecDeque;

pub struct NoticeDialog {
    queue: VecDeque<Notice>,
    id: Id,
}

impl NoticeDialog {
    pub fn new(id: impl std::hash::Hash) -> Self {
        Self {
            queue: VecDeque::new(),
            id: Id::new(id),
        }
    }

    /// Queue a notice. Notices are shown one at a time, oldest first.
    pub fn push(&mut self, notice: Notice) {
        self.queue.push_back(notice);
    }

    pub fn current(&self) -> Option<&Notice> {
        self.queue.front()
    }
}

impl Modal for NoticeDialog {
    fn update(&mut self, ctx: &Context) -> bool {
        let Some(notice) = self.queue.front() else {
            return false;
        };

        let mut dismissed = false;
        paint_overlay(ctx, self.id);

        let (icon, color) = match notice.level {
            NoticeLevel::Warning => ("⚠", egui::Color32::from_rgb(220, 170, 60)),
            NoticeLevel::Error => ("✖", egui::Color32::from_rgb(210, 80, 80)),
        };
        egui::Window::new(format!("{} {}", icon, notice.title))
            .id(self.id.with("window"))
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, Vec2::ZERO)
            .show(ctx, |ui| {
                ui.set_min_width(320.0);
                ui.add_space(8.0);
                ui.label(RichText::new(&notice.message).color(color));
                ui.add_space(12.0);
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Min), |ui| {
                    if ui.button("OK").clicked() {
                        dismissed = true;
                    }
                });
            });

        if ctx.input(|i| i.key_pressed(Key::Escape) || i.key_pressed(Key::Enter)) {
            dismissed = true;
        }
        if dismissed {
            self.queue.pop_front();
        }
        dismissed
    }

    fn is_open(&self) -> bool {
        !self.queue.is_empty()
    }

    fn open(&mut self) {}

    fn close(&mut self) {
        self.queue.pop_front();
    }
}
