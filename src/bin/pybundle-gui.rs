use eframe::egui;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::thread;
use std::time::Duration;

use pybundle::{
    command::{self, CommandLine},
    config::init_logging,
    error::PackError,
    imports::detect_imports_in_file,
    options::{CompressionLevel, ConversionOptions, HiddenImports, OptimizationLevel, ToolInvocation},
    output::{open_in_file_browser, output_target},
    runner::{ConversionRunner, Outcome, RunEvent, SessionHandle},
    settings::{load_profile, save_profile, AppSettings},
    toolchain::{ToolReport, Toolchain},
};

fn main() -> eframe::Result<()> {
    init_logging(false);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 760.0])
            .with_min_inner_size([720.0, 600.0])
            .with_resizable(true),
        ..Default::default()
    };

    eframe::run_native(
        "PyBundle",
        options,
        Box::new(|cc| {
            configure_custom_style(&cc.egui_ctx);
            Ok(Box::new(PyBundleApp::new()))
        }),
    )
}

fn configure_custom_style(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();
    style.spacing.item_spacing = egui::vec2(10.0, 8.0);
    style.spacing.window_margin = egui::Margin::same(16.0);
    style.spacing.button_padding = egui::vec2(10.0, 6.0);
    style.visuals.widgets.noninteractive.rounding = egui::Rounding::same(6.0);
    style.visuals.widgets.inactive.rounding = egui::Rounding::same(6.0);
    style.visuals.widgets.hovered.rounding = egui::Rounding::same(6.0);
    style.visuals.widgets.active.rounding = egui::Rounding::same(6.0);
    style.visuals.window_rounding = egui::Rounding::same(10.0);
    ctx.set_style(style);
}

#[derive(PartialEq)]
enum StatusType {
    Info,
    Success,
    Error,
}

struct PyBundleApp {
    // Form state
    source: String,
    output_name: String,
    output_dir: String,
    icon: String,
    single_file: bool,
    windowed: bool,
    no_console: bool,
    clean: bool,
    no_confirm: bool,
    strip_debug: bool,
    optimization: u8,
    hidden_imports: HiddenImports,
    new_import: String,
    selected_import: Option<String>,
    extra_files: Vec<PathBuf>,
    selected_extra: Option<usize>,
    compress: bool,
    compression_level: u8,
    extra_args: String,
    tool: ToolInvocation,

    settings: AppSettings,
    settings_path: PathBuf,

    // Run state
    log: Vec<String>,
    progress: u8,
    status_message: String,
    status_type: StatusType,
    session: Option<SessionHandle>,
    tool_ready: bool,
    probe_rx: Option<Receiver<ToolReport>>,
    install_rx: Option<Receiver<Result<String, PackError>>>,
    pending: Option<(CommandLine, PathBuf)>,
}

impl PyBundleApp {
    fn new() -> Self {
        let settings_path = AppSettings::default_path();
        let settings = AppSettings::load_or_default(&settings_path);
        let defaults = ConversionOptions::default();

        let mut app = Self {
            source: String::new(),
            output_name: String::new(),
            output_dir: String::new(),
            icon: String::new(),
            single_file: defaults.single_file,
            windowed: defaults.windowed,
            no_console: defaults.no_console,
            clean: defaults.clean,
            no_confirm: defaults.no_confirm,
            strip_debug: defaults.strip_debug,
            optimization: defaults.optimization.get(),
            hidden_imports: HiddenImports::new(),
            new_import: String::new(),
            selected_import: None,
            extra_files: Vec::new(),
            selected_extra: None,
            compress: defaults.compress,
            compression_level: defaults.compression_level.get(),
            extra_args: String::new(),
            tool: ToolInvocation::from_env(),
            settings,
            settings_path,
            log: Vec::new(),
            progress: 0,
            status_message: "Ready".to_string(),
            status_type: StatusType::Info,
            session: None,
            tool_ready: false,
            probe_rx: None,
            install_rx: None,
            pending: None,
        };
        app.check_dependencies();
        app
    }

    fn is_running(&self) -> bool {
        self.session.is_some() || self.install_rx.is_some()
    }

    fn set_status(&mut self, message: impl Into<String>, status_type: StatusType) {
        self.status_message = message.into();
        self.status_type = status_type;
    }

    /// Probe interpreter and PyInstaller off the UI thread
    fn check_dependencies(&mut self) {
        self.log.push("🔍 Checking requirements...".to_string());
        let (tx, rx) = channel();
        let toolchain = Toolchain::new(self.tool.clone());
        thread::spawn(move || {
            let _ = tx.send(toolchain.probe());
        });
        self.probe_rx = Some(rx);
    }

    fn to_options(&self) -> ConversionOptions {
        let non_empty = |value: &str| {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        };

        ConversionOptions {
            source: PathBuf::from(self.source.trim()),
            output_name: non_empty(&self.output_name),
            output_dir: non_empty(&self.output_dir).map(PathBuf::from),
            icon: non_empty(&self.icon).map(PathBuf::from),
            single_file: self.single_file,
            windowed: self.windowed,
            no_console: self.no_console,
            clean: self.clean,
            no_confirm: self.no_confirm,
            strip_debug: self.strip_debug,
            optimization: OptimizationLevel::clamped(self.optimization as i64),
            hidden_imports: self.hidden_imports.clone(),
            extra_data: self.extra_files.clone(),
            compress: self.compress,
            compression_level: CompressionLevel::clamped(self.compression_level as i64),
            extra_args: self.extra_args.clone(),
            tool: self.tool.clone(),
        }
    }

    fn apply_options(&mut self, options: ConversionOptions) {
        let path_text = |path: Option<&Path>| {
            path.map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default()
        };

        self.source = options.source.to_string_lossy().into_owned();
        self.output_name = options.output_name.clone().unwrap_or_default();
        self.output_dir = path_text(options.output_dir.as_deref());
        self.icon = path_text(options.icon.as_deref());
        self.single_file = options.single_file;
        self.windowed = options.windowed;
        self.no_console = options.no_console;
        self.clean = options.clean;
        self.no_confirm = options.no_confirm;
        self.strip_debug = options.strip_debug;
        self.optimization = options.optimization.get();
        self.hidden_imports = options.hidden_imports;
        self.extra_files = options.extra_data;
        self.compress = options.compress;
        self.compression_level = options.compression_level.get();
        self.extra_args = options.extra_args;
        self.selected_extra = None;
        self.selected_import = None;
    }

    /// Fill in name and output folder from a newly chosen source file
    fn on_source_changed(&mut self) {
        let source = PathBuf::from(self.source.trim());
        if !source.is_file() {
            return;
        }
        let options = ConversionOptions::new(&source);
        if self.output_name.trim().is_empty() {
            self.output_name = options.default_output_name().unwrap_or_default();
        }
        if self.output_dir.trim().is_empty() {
            self.output_dir = options.working_dir().to_string_lossy().into_owned();
        }
    }

    fn browse_source(&mut self) {
        let mut dialog = rfd::FileDialog::new()
            .add_filter("Python Files", &["py", "pyw"])
            .add_filter("All Files", &["*"]);
        if let Some(dir) = &self.settings.recent.last_source_dir {
            dialog = dialog.set_directory(dir);
        }
        if let Some(path) = dialog.pick_file() {
            self.settings.recent.remember_source(&path);
            self.source = path.to_string_lossy().into_owned();
            self.on_source_changed();
        }
    }

    fn browse_output_dir(&mut self) {
        let mut dialog = rfd::FileDialog::new();
        if let Some(dir) = &self.settings.recent.last_output_dir {
            dialog = dialog.set_directory(dir);
        }
        if let Some(path) = dialog.pick_folder() {
            self.settings.recent.remember_output(&path);
            self.output_dir = path.to_string_lossy().into_owned();
        }
    }

    fn browse_icon(&mut self) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("Icon Files", &["ico", "icns", "png"])
            .pick_file()
        {
            self.icon = path.to_string_lossy().into_owned();
        }
    }

    fn add_hidden_import(&mut self) {
        let name = self.new_import.trim().to_string();
        if self.hidden_imports.insert(&name) {
            self.new_import.clear();
        } else if !name.is_empty() {
            self.set_status(format!("{} is already listed", name), StatusType::Info);
        }
    }

    fn detect_imports(&mut self) {
        let source = PathBuf::from(self.source.trim());
        if !source.is_file() {
            warn_dialog(&PackError::MissingSource.to_string());
            return;
        }

        self.log.push("🔍 Detecting imported modules...".to_string());
        match detect_imports_in_file(&source) {
            Ok(detected) => {
                let added = self.hidden_imports.extend_new(&detected);
                self.log.push(format!(
                    "✅ Detected {} modules, added {} new hidden imports",
                    detected.len(),
                    added
                ));
            }
            Err(e) => self.log.push(format!("❌ Import detection failed: {:#}", e)),
        }
    }

    fn save_profile(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("JSON Files", &["json"])
            .set_file_name("pybundle_profile.json")
            .save_file()
        else {
            return;
        };

        match save_profile(&path, &self.to_options()) {
            Ok(()) => {
                self.log.push(format!("✅ Saved profile: {}", path.display()));
                self.set_status("Profile saved", StatusType::Success);
            }
            Err(e) => {
                error_dialog(&e.to_string());
                self.set_status(e.to_string(), StatusType::Error);
            }
        }
    }

    fn load_profile(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("JSON Files", &["json"])
            .pick_file()
        else {
            return;
        };

        match load_profile(&path) {
            Ok(mut options) => {
                options.tool = self.tool.clone();
                self.apply_options(options);
                self.log.push(format!("✅ Loaded profile: {}", path.display()));
                self.set_status("Profile loaded", StatusType::Success);
            }
            Err(e) => {
                error_dialog(&e.to_string());
                self.set_status(e.to_string(), StatusType::Error);
            }
        }
    }

    fn start_conversion(&mut self) {
        if self.is_running() {
            return;
        }

        let options = self.to_options();
        let cmd = match command::build(&options) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn_dialog(&e.to_string());
                return;
            }
        };
        let working_dir = options.working_dir();

        for path in command::missing_data_paths(&options) {
            self.log
                .push(format!("⚠️ Skipping missing data file: {}", path.display()));
        }

        self.progress = 0;
        if self.tool_ready {
            self.launch(cmd, working_dir);
            return;
        }

        // Install PyInstaller first, then launch from `poll_install`.
        self.log.push("📦 Installing PyInstaller...".to_string());
        self.set_status("Installing PyInstaller...", StatusType::Info);
        let (tx, rx) = channel();
        let toolchain = Toolchain::new(self.tool.clone());
        thread::spawn(move || {
            let _ = tx.send(toolchain.ensure_installed());
        });
        self.install_rx = Some(rx);
        self.pending = Some((cmd, working_dir));
    }

    fn launch(&mut self, cmd: CommandLine, working_dir: PathBuf) {
        if let Err(e) = std::fs::create_dir_all(&working_dir) {
            self.set_status(
                format!("Failed to create {}: {}", working_dir.display(), e),
                StatusType::Error,
            );
            return;
        }
        self.set_status("Packaging...", StatusType::Info);
        self.session = Some(ConversionRunner::start(cmd, working_dir));
    }

    fn cancel_conversion(&mut self) {
        if let Some(session) = &self.session {
            if session.cancel() {
                self.log.push("⚠️ Cancelling...".to_string());
            }
        }
    }

    fn open_output_folder(&mut self) {
        match output_target(&self.to_options()) {
            Some(target) => {
                if let Err(e) = open_in_file_browser(&target) {
                    self.set_status(format!("{:#}", e), StatusType::Error);
                }
            }
            None => warn_dialog("The output folder does not exist yet"),
        }
    }

    fn poll_background(&mut self) {
        if let Some(rx) = &self.probe_rx {
            if let Ok(report) = rx.try_recv() {
                self.tool_ready = report.is_ready();
                self.log.extend(report.summary_lines());
                self.log.push("─".repeat(50));
                self.probe_rx = None;
            }
        }

        if let Some(rx) = &self.install_rx {
            if let Ok(result) = rx.try_recv() {
                self.install_rx = None;
                match result {
                    Ok(version) => {
                        self.tool_ready = true;
                        self.log.push(format!("✅ PyInstaller {} installed", version));
                        if let Some((cmd, working_dir)) = self.pending.take() {
                            self.launch(cmd, working_dir);
                        }
                    }
                    Err(e) => {
                        self.pending = None;
                        error_dialog(&e.to_string());
                        self.set_status(e.to_string(), StatusType::Error);
                    }
                }
            }
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };

        for event in session.drain() {
            match event {
                RunEvent::Log(line) => self.log.push(line),
                RunEvent::Progress(percent) => self.progress = percent,
                RunEvent::Done { outcome, message } => {
                    match outcome {
                        Outcome::Succeeded => {
                            self.status_message = message;
                            self.status_type = StatusType::Success;
                        }
                        Outcome::Cancelled => {
                            self.status_message = "Packaging cancelled".to_string();
                            self.status_type = StatusType::Info;
                        }
                        Outcome::Failed => {
                            error_dialog(&message);
                            self.status_message = message;
                            self.status_type = StatusType::Error;
                        }
                    }
                    break;
                }
            }
        }

        if session.is_finished() {
            self.session = None;
        }
    }

    fn paths_section(&mut self, ui: &mut egui::Ui) {
        egui::Grid::new("paths_grid")
            .num_columns(3)
            .spacing([10.0, 8.0])
            .show(ui, |ui| {
                ui.label("Source file:");
                let response = ui.add(
                    egui::TextEdit::singleline(&mut self.source)
                        .hint_text("main.py")
                        .desired_width(460.0),
                );
                if response.changed() {
                    self.on_source_changed();
                }
                if ui.button("🔍 Browse").clicked() {
                    self.browse_source();
                }
                ui.end_row();

                ui.label("Output name:");
                ui.add(egui::TextEdit::singleline(&mut self.output_name).desired_width(460.0));
                ui.end_row();

                ui.label("Output folder:");
                ui.add(egui::TextEdit::singleline(&mut self.output_dir).desired_width(460.0));
                if ui.button("📂 Browse").clicked() {
                    self.browse_output_dir();
                }
                ui.end_row();

                ui.label("Icon:");
                ui.add(egui::TextEdit::singleline(&mut self.icon).desired_width(460.0));
                if ui.button("🖼 Browse").clicked() {
                    self.browse_icon();
                }
                ui.end_row();
            });
    }

    fn options_section(&mut self, ui: &mut egui::Ui) {
        ui.horizontal_wrapped(|ui| {
            ui.checkbox(&mut self.single_file, "One file");
            ui.checkbox(&mut self.windowed, "Windowed");
            ui.checkbox(&mut self.no_console, "No console");
            ui.checkbox(&mut self.clean, "Clean build");
            ui.checkbox(&mut self.no_confirm, "No confirm");
            ui.checkbox(&mut self.strip_debug, "Strip symbols");
        });

        ui.horizontal(|ui| {
            ui.label("Optimization:");
            egui::ComboBox::from_id_salt("optimize_select")
                .selected_text(format!("-O{}", self.optimization))
                .show_ui(ui, |ui| {
                    for level in 0..=OptimizationLevel::MAX {
                        ui.selectable_value(&mut self.optimization, level, format!("-O{}", level));
                    }
                });

            ui.add_space(20.0);
            ui.checkbox(&mut self.compress, "UPX compression");
            ui.add_enabled(
                self.compress,
                egui::Slider::new(&mut self.compression_level, 0..=CompressionLevel::MAX)
                    .text("level"),
            );
        });

        ui.horizontal(|ui| {
            ui.label("Extra arguments:");
            ui.add(
                egui::TextEdit::singleline(&mut self.extra_args)
                    .hint_text("--log-level WARN")
                    .desired_width(f32::INFINITY),
            );
        });
    }

    fn lists_section(&mut self, ui: &mut egui::Ui) {
        ui.columns(2, |columns| {
            let ui = &mut columns[0];
            ui.label(egui::RichText::new("Hidden imports").strong());
            egui::ScrollArea::vertical()
                .id_salt("imports_list")
                .max_height(110.0)
                .show(ui, |ui| {
                    for name in self.hidden_imports.iter() {
                        let selected = self.selected_import.as_deref() == Some(name);
                        if ui.selectable_label(selected, name).clicked() {
                            self.selected_import = Some(name.to_string());
                        }
                    }
                });
            ui.horizontal(|ui| {
                let response = ui.add(
                    egui::TextEdit::singleline(&mut self.new_import)
                        .hint_text("module.name")
                        .desired_width(140.0),
                );
                let submitted =
                    response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                if ui.button("➕").clicked() || submitted {
                    self.add_hidden_import();
                }
                if ui.button("➖").clicked() {
                    if let Some(name) = self.selected_import.take() {
                        self.hidden_imports.remove(&name);
                    }
                }
                if ui.button("🔍 Detect").clicked() {
                    self.detect_imports();
                }
            });

            let ui = &mut columns[1];
            ui.label(egui::RichText::new("Extra files and folders").strong());
            egui::ScrollArea::vertical()
                .id_salt("extra_list")
                .max_height(110.0)
                .show(ui, |ui| {
                    for (index, path) in self.extra_files.iter().enumerate() {
                        let selected = self.selected_extra == Some(index);
                        let text = path.to_string_lossy();
                        if ui.selectable_label(selected, text.as_ref()).clicked() {
                            self.selected_extra = Some(index);
                        }
                    }
                });
            ui.horizontal(|ui| {
                if ui.button("📄 Add file").clicked() {
                    if let Some(path) = rfd::FileDialog::new().pick_file() {
                        self.extra_files.push(path);
                    }
                }
                if ui.button("📁 Add folder").clicked() {
                    if let Some(path) = rfd::FileDialog::new().pick_folder() {
                        self.extra_files.push(path);
                    }
                }
                if ui.button("➖").clicked() {
                    if let Some(index) = self.selected_extra.take() {
                        if index < self.extra_files.len() {
                            self.extra_files.remove(index);
                        }
                    }
                }
            });
        });
    }

    fn actions_section(&mut self, ui: &mut egui::Ui) {
        let running = self.is_running();
        ui.horizontal(|ui| {
            let convert = egui::Button::new(
                egui::RichText::new("🚀 Convert")
                    .size(18.0)
                    .strong()
                    .color(egui::Color32::WHITE),
            )
            .min_size(egui::vec2(160.0, 40.0))
            .fill(egui::Color32::from_rgb(0, 120, 215));

            if ui.add_enabled(!running, convert).clicked() {
                self.start_conversion();
            }
            if ui
                .add_enabled(self.session.is_some(), egui::Button::new("⏹ Cancel"))
                .clicked()
            {
                self.cancel_conversion();
            }
            if ui.button("📂 Open output").clicked() {
                self.open_output_folder();
            }
            ui.separator();
            if ui.add_enabled(!running, egui::Button::new("💾 Save profile")).clicked() {
                self.save_profile();
            }
            if ui.add_enabled(!running, egui::Button::new("📥 Load profile")).clicked() {
                self.load_profile();
            }
        });

        ui.add(
            egui::ProgressBar::new(self.progress as f32 / 100.0)
                .show_percentage()
                .animate(self.session.is_some()),
        );
    }
}

impl eframe::App for PyBundleApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_background();
        if self.is_running() || self.probe_rx.is_some() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let (color, icon) = match self.status_type {
                    StatusType::Info => (egui::Color32::LIGHT_GRAY, "ℹ"),
                    StatusType::Success => (egui::Color32::GREEN, "✅"),
                    StatusType::Error => (egui::Color32::from_rgb(255, 100, 100), "❌"),
                };
                ui.label(
                    egui::RichText::new(format!("{} {}", icon, self.status_message))
                        .color(color)
                        .strong(),
                );
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.heading(
                    egui::RichText::new("PyBundle")
                        .size(26.0)
                        .strong()
                        .color(egui::Color32::from_rgb(100, 200, 255)),
                );
                ui.label(egui::RichText::new("Python to executable with PyInstaller").italics().weak());
            });
            ui.add_space(8.0);

            ui.add_enabled_ui(!self.is_running(), |ui| {
                egui::Frame::group(ui.style())
                    .inner_margin(10.0)
                    .show(ui, |ui| self.paths_section(ui));
                egui::Frame::group(ui.style())
                    .inner_margin(10.0)
                    .show(ui, |ui| self.options_section(ui));
                egui::Frame::group(ui.style())
                    .inner_margin(10.0)
                    .show(ui, |ui| self.lists_section(ui));
            });

            ui.add_space(6.0);
            self.actions_section(ui);
            ui.add_space(6.0);

            egui::ScrollArea::vertical()
                .id_salt("log_pane")
                .stick_to_bottom(true)
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    for line in &self.log {
                        ui.label(egui::RichText::new(line).monospace());
                    }
                });
        });
    }
}

impl Drop for PyBundleApp {
    fn drop(&mut self) {
        // A silent tool never reaches a line boundary, so kill it outright.
        if let Some(session) = self.session.take() {
            session.shutdown();
        }
        if let Err(e) = self.settings.save(&self.settings_path) {
            eprintln!("{}", e);
        }
    }
}

fn warn_dialog(message: &str) {
    rfd::MessageDialog::new()
        .set_level(rfd::MessageLevel::Warning)
        .set_title("PyBundle")
        .set_description(message)
        .set_buttons(rfd::MessageButtons::Ok)
        .show();
}

fn error_dialog(message: &str) {
    rfd::MessageDialog::new()
        .set_level(rfd::MessageLevel::Error)
        .set_title("PyBundle")
        .set_description(message)
        .set_buttons(rfd::MessageButtons::Ok)
        .show();
}
