use chat_host::{Speaker, TranscriptEntry};
use eframe::egui;
use parking_lot::Mutex;
use shared::settings::{Mode, MAX_MAX_TOKENS, MAX_TEMPERATURE, MIN_MAX_TOKENS, MIN_TEMPERATURE};
use std::sync::Arc;
use std::time::Duration;

mod modals;
mod state;
mod widgets;

use modals::Modal;
use state::AppState;

const COMPOSER_ID: &str = "composer";

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([980.0, 720.0])
            .with_min_inner_size([640.0, 480.0]),
        vsync: true,
        ..Default::default()
    };
    eframe::run_native(
        "Local GGUF / API Chat",
        options,
        Box::new(|_cc| {
            Box::new(ChatApp {
                state: Arc::new(Mutex::new(AppState::default())),
            })
        }),
    )
}

struct ChatApp {
    state: Arc<Mutex<AppState>>,
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let mut s = self.state.lock();

        // Poll for worker results (non-blocking)
        s.poll();
        if s.is_waiting() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }

        let dark = ctx.style().visuals.dark_mode;

        egui::TopBottomPanel::top("header")
            .frame(egui::Frame::none().fill(if dark {
                egui::Color32::from_rgb(35, 35, 42)
            } else {
                egui::Color32::from_rgb(245, 247, 250)
            }))
            .show(ctx, |ui| {
                ui.add_space(10.0);
                ui.horizontal(|ui| {
                    ui.add_space(12.0);
                    ui.heading(egui::RichText::new("AI Chat").size(22.0));
                    ui.add_space(16.0);
                    ui.label(
                        egui::RichText::new(format!("Status: {}", s.session.status()))
                            .color(if dark {
                                egui::Color32::from_rgb(160, 160, 180)
                            } else {
                                egui::Color32::from_rgb(90, 90, 110)
                            }),
                    );
                });
                ui.add_space(6.0);
                render_controls(ui, &mut s);
                ui.add_space(6.0);
                render_knobs(ui, &mut s);
                ui.add_space(10.0);
            });

        egui::TopBottomPanel::bottom("composer_panel").show(ctx, |ui| {
            ui.add_space(8.0);
            render_composer(ui, &mut s);
            ui.add_space(8.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let busy_label = match s.session.phase() {
                chat_host::Phase::Generating => Some("Thinking"),
                chat_host::Phase::Loading => Some("Loading model"),
                chat_host::Phase::Idle => None,
            };
            egui::ScrollArea::vertical()
                .auto_shrink([false, false])
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    for entry in s.session.transcript() {
                        ui.add_space(6.0);
                        render_message(ui, entry, dark);
                        ui.add_space(6.0);
                    }
                    if let Some(label) = busy_label {
                        let time = ui.input(|i| i.time);
                        let dots = match ((time * 2.0) as i32) % 4 {
                            0 => "   ",
                            1 => ".  ",
                            2 => ".. ",
                            _ => "...",
                        };
                        ui.label(
                            egui::RichText::new(format!("{}{}", label, dots))
                                .italics()
                                .weak(),
                        );
                    }
                });
        });

        if s.key_dialog.update(ctx) {
            s.apply_key_result();
        }
        s.notice_dialog.update(ctx);
    }
}

fn render_controls(ui: &mut egui::Ui, s: &mut AppState) {
    let idle = !s.session.is_busy();
    ui.horizontal(|ui| {
        ui.add_space(12.0);
        ui.label("Mode:");
        let mut mode = s.session.mode();
        let local = ui.radio_value(&mut mode, Mode::Local, "Local (GGUF)");
        let remote = ui.radio_value(&mut mode, Mode::Remote, "API (OpenAI)");
        if local.changed() || remote.changed() {
            s.set_mode(mode);
        }

        ui.separator();
        ui.label("Model:");
        let response = ui.add(
            egui::TextEdit::singleline(&mut s.model_path_text)
                .desired_width(320.0)
                .hint_text("/path/to/model.gguf"),
        );
        if response.lost_focus() {
            s.sync_model_path();
        }
        if ui
            .add_enabled(!s.picker.is_picking(), egui::Button::new("Browse…"))
            .clicked()
        {
            s.browse_model();
        }
        if ui
            .add_enabled(idle, egui::Button::new("Load"))
            .on_hover_text("Load the selected .gguf file")
            .clicked()
        {
            s.load_model();
        }

        ui.separator();
        let key_label = if s.session.has_credential() {
            "Change API Key"
        } else {
            "Set API Key"
        };
        if ui.button(key_label).clicked() {
            s.open_key_dialog();
        }
    });

    if let Some(label) = s.session.engine_label() {
        ui.horizontal(|ui| {
            ui.add_space(12.0);
            ui.label(egui::RichText::new(format!("Loaded: {}", label)).small().weak());
        });
    }
}

fn render_knobs(ui: &mut egui::Ui, s: &mut AppState) {
    let generation = s.session.settings().generation;
    let mut max_tokens = generation.max_tokens;
    let mut temperature = generation.temperature;

    ui.horizontal(|ui| {
        ui.add_space(12.0);
        ui.label("Max tokens:");
        if ui
            .add(
                egui::DragValue::new(&mut max_tokens)
                    .clamp_range(MIN_MAX_TOKENS..=MAX_MAX_TOKENS)
                    .speed(4.0),
            )
            .changed()
        {
            s.session.set_max_tokens(max_tokens);
        }

        ui.add_space(12.0);
        ui.label("Temperature:");
        if ui
            .add(
                egui::DragValue::new(&mut temperature)
                    .clamp_range(MIN_TEMPERATURE..=MAX_TEMPERATURE)
                    .speed(0.1)
                    .fixed_decimals(1),
            )
            .changed()
        {
            s.session.set_temperature(temperature);
        }
        if s.session.mode() == Mode::Remote {
            ui.label(
                egui::RichText::new("(API mode uses its own temperature and limit)")
                    .small()
                    .weak(),
            );
        }

        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            ui.add_space(12.0);
            if ui.button("Clear Chat").clicked() {
                s.clear_chat();
            }
        });
    });
}

fn render_composer(ui: &mut egui::Ui, s: &mut AppState) {
    let can_send = s.session.can_submit();
    let composer_id = egui::Id::new(COMPOSER_ID);

    // Consume Enter before the text edit turns it into a newline.
    let focused = ui.memory(|m| m.has_focus(composer_id));
    let enter_pressed = focused && ui.input_mut(take_send_shortcut);

    ui.horizontal(|ui| {
        ui.add_space(8.0);
        ui.add_sized(
            [ui.available_width() - 90.0, 64.0],
            egui::TextEdit::multiline(&mut s.input_text)
                .id(composer_id)
                .hint_text("Type a message (Enter to send, Shift+Enter for a new line)")
                .font(egui::FontId::new(15.0, egui::FontFamily::Proportional)),
        );

        let btn = egui::Button::new("Send").fill(egui::Color32::from_rgb(70, 130, 180));
        let clicked = ui.add_enabled_ui(can_send, |ui| ui.add_sized([70.0, 40.0], btn))
            .inner
            .clicked();
        if clicked || (enter_pressed && can_send) {
            s.send_message();
        }
    });
}

/// Plain Enter sends. Shift+Enter is left for the text edit to insert a
/// newline; `consume_key` alone would also match it.
fn take_send_shortcut(input: &mut egui::InputState) -> bool {
    !input.modifiers.shift && input.consume_key(egui::Modifiers::NONE, egui::Key::Enter)
}

fn render_message(ui: &mut egui::Ui, entry: &TranscriptEntry, dark: bool) {
    match entry.speaker {
        Speaker::User => {
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Min), |ui| {
                ui.add_space(8.0);
                egui::Frame::none()
                    .fill(egui::Color32::from_rgb(70, 130, 180))
                    .rounding(egui::Rounding::same(12.0))
                    .inner_margin(egui::Margin::same(12.0))
                    .show(ui, |ui| {
                        ui.set_max_width(500.0);
                        ui.label(
                            egui::RichText::new(&entry.text)
                                .color(egui::Color32::WHITE)
                                .size(15.0),
                        );
                    });
            });
        }
        Speaker::Assistant | Speaker::Error => {
            let (fill, text_color) = match (entry.speaker, dark) {
                (Speaker::Error, true) => (
                    egui::Color32::from_rgb(70, 40, 40),
                    egui::Color32::from_rgb(240, 170, 170),
                ),
                (Speaker::Error, false) => (
                    egui::Color32::from_rgb(252, 232, 232),
                    egui::Color32::from_rgb(150, 40, 40),
                ),
                (_, true) => (
                    egui::Color32::from_rgb(50, 50, 58),
                    egui::Color32::from_rgb(220, 220, 230),
                ),
                (_, false) => (
                    egui::Color32::from_rgb(245, 245, 248),
                    egui::Color32::from_rgb(40, 40, 50),
                ),
            };
            egui::Frame::none()
                .fill(fill)
                .rounding(egui::Rounding::same(12.0))
                .inner_margin(egui::Margin::same(12.0))
                .show(ui, |ui| {
                    ui.set_max_width(600.0);
                    ui.label(
                        egui::RichText::new(&entry.text)
                            .color(text_color)
                            .size(15.0),
                    );
                    ui.add_space(6.0);
                    ui.horizontal(|ui| {
                        ui.label(egui::RichText::new(&entry.timestamp).small().weak());
                        if ui
                            .small_button("Copy")
                            .on_hover_text("Copy to clipboard")
                            .clicked()
                        {
                            ui.output_mut(|o| o.copied_text = entry.text.clone());
                        }
                    });
                });
        }
    }
}
