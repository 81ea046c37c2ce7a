//! Code playground runner: rebuilds the document from the three sources on
//! every run, renders it on exactly one surface, and collects the console
//! events the document posts back.

pub mod console;
pub mod document;
pub mod surface;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::models::{ArtifactFields, FileKind};

pub use console::{ConsoleLevel, ConsoleLog, ConsoleMessage};
pub use surface::{
    EmbeddedFrame, ExecutionSurface, ExternalWindow, SANDBOX_POLICY, SurfaceError, SurfaceKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run: u64,
    pub surface: SurfaceKind,
}

pub struct SandboxRunner {
    sources: ArtifactFields,
    auto_run: bool,
    embedded: EmbeddedFrame,
    external: Option<ExternalWindow>,
    console: ConsoleLog,
    runs: u64,
    last_run: Option<RunReport>,
}

impl SandboxRunner {
    /// Auto-run is on, so the initial sources are rendered immediately.
    pub fn new(sources: ArtifactFields) -> Self {
        let mut runner = Self {
            sources,
            auto_run: true,
            embedded: EmbeddedFrame::new(),
            external: None,
            console: ConsoleLog::new(),
            runs: 0,
            last_run: None,
        };
        runner.run();
        runner
    }

    pub fn sources(&self) -> &ArtifactFields {
        &self.sources
    }

    pub fn auto_run(&self) -> bool {
        self.auto_run
    }

    pub fn console(&self) -> &ConsoleLog {
        &self.console
    }

    pub fn last_run(&self) -> Option<RunReport> {
        self.last_run
    }

    pub fn set_markup(&mut self, markup: impl Into<String>) {
        self.sources.markup = markup.into();
        self.edited();
    }

    pub fn set_style(&mut self, style: impl Into<String>) {
        self.sources.style = style.into();
        self.edited();
    }

    pub fn set_script(&mut self, script: impl Into<String>) {
        self.sources.script = script.into();
        self.edited();
    }

    pub fn set_file(&mut self, file: FileKind, text: impl Into<String>) {
        match file {
            FileKind::Markup => self.set_markup(text),
            FileKind::Style => self.set_style(text),
            FileKind::Script => self.set_script(text),
        }
    }

    pub fn set_sources(&mut self, sources: ArtifactFields) {
        self.sources = sources;
        self.edited();
    }

    /// Turning auto-run back on renders the current sources right away.
    pub fn set_auto_run(&mut self, enabled: bool) {
        self.auto_run = enabled;
        self.edited();
    }

    fn edited(&mut self) {
        if self.auto_run {
            self.run();
        }
    }

    /// Clears the console, rebuilds the document and writes it to the active
    /// surface. A popped-out window found closed is dropped and the embedded
    /// frame takes over.
    pub fn run(&mut self) -> RunReport {
        self.console.clear();
        let document = document::build(&self.sources);
        self.runs += 1;

        self.discard_closed_window();
        let surface = match self.external.as_mut() {
            Some(window) => match window.write(&document) {
                Ok(()) => SurfaceKind::External,
                Err(SurfaceError::Closed) => {
                    warn!("External preview closed during write");
                    self.external = None;
                    self.write_embedded(&document)
                }
            },
            None => self.write_embedded(&document),
        };

        let report = RunReport {
            run: self.runs,
            surface,
        };
        debug!(run = report.run, surface = ?report.surface, "Sandbox run");
        self.last_run = Some(report);
        report
    }

    fn write_embedded(&mut self, document: &str) -> SurfaceKind {
        // The embedded frame never refuses a write.
        let _ = self.embedded.write(document);
        SurfaceKind::Embedded
    }

    fn discard_closed_window(&mut self) {
        if self.external.as_ref().is_some_and(|w| w.is_closed()) {
            info!("External preview window was closed, falling back to embedded frame");
            self.external = None;
        }
    }

    pub fn active_surface(&self) -> SurfaceKind {
        match &self.external {
            Some(window) if !window.is_closed() => SurfaceKind::External,
            _ => SurfaceKind::Embedded,
        }
    }

    fn active(&self) -> &dyn ExecutionSurface {
        match &self.external {
            Some(window) if !window.is_closed() => window as &dyn ExecutionSurface,
            _ => &self.embedded,
        }
    }

    /// Document currently rendered on the active surface.
    pub fn active_document(&self) -> Option<&str> {
        self.active().document()
    }

    pub fn is_popped_out(&self) -> bool {
        self.active_surface() == SurfaceKind::External
    }

    pub fn pop_out(&mut self) {
        if self.is_popped_out() {
            return;
        }
        self.external = Some(ExternalWindow::open());
        self.embedded.close();
        self.run();
    }

    pub fn pop_in(&mut self) {
        if let Some(mut window) = self.external.take() {
            window.close();
        }
        self.run();
    }

    /// The user closed the pop-out window. The embedded frame takes over and
    /// is rendered regardless of auto-run, since it was cleared on pop-out.
    pub fn window_closed(&mut self) {
        let Some(window) = self.external.as_mut() else {
            return;
        };
        window.mark_closed();
        self.discard_closed_window();
        self.run();
    }

    pub fn relay(&mut self, value: &Value) -> Option<&ConsoleMessage> {
        self.console.relay(value)
    }

    pub fn teardown(&mut self) {
        if let Some(mut window) = self.external.take() {
            window.close();
            debug!("External preview window closed on teardown");
        }
    }
}

impl Default for SandboxRunner {
    fn default() -> Self {
        Self::new(ArtifactFields::default())
    }
}

impl Drop for SandboxRunner {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn runner() -> SandboxRunner {
        SandboxRunner::new(ArtifactFields::new("<h1>Hi</h1>", "", ""))
    }

    #[test]
    fn test_new_runner_renders_immediately() {
        let runner = runner();
        assert_eq!(runner.last_run().map(|r| r.run), Some(1));
        assert!(runner.active_document().is_some_and(|d| d.contains("<h1>Hi</h1>")));
    }

    #[test]
    fn test_edits_rerun_only_with_auto_run() {
        let mut runner = runner();
        runner.set_script("console.log(1);");
        assert_eq!(runner.last_run().map(|r| r.run), Some(2));

        runner.set_auto_run(false);
        let runs = runner.last_run().map(|r| r.run);
        runner.set_markup("<h2>Changed</h2>");
        assert_eq!(runner.last_run().map(|r| r.run), runs);
        assert!(runner.active_document().is_some_and(|d| !d.contains("<h2>Changed</h2>")));

        runner.run();
        assert!(runner.active_document().is_some_and(|d| d.contains("<h2>Changed</h2>")));
    }

    #[test]
    fn test_run_clears_console() {
        let mut runner = runner();
        runner.relay(&json!({"type": "console", "level": "log", "message": "first"}));
        runner.relay(&json!({"type": "console", "level": "log", "message": "second"}));
        assert_eq!(runner.console().len(), 2);

        runner.run();
        assert!(runner.console().is_empty());
        let message = runner.relay(&json!({"type": "console", "level": "info", "message": "again"}));
        assert_eq!(message.map(|m| m.id), Some(0));
    }

    #[test]
    fn test_log_then_throw_yields_two_ordered_events() {
        let mut runner = SandboxRunner::new(ArtifactFields::new(
            "",
            "",
            "console.log(\"x\");\nthrow new Error(\"boom\");",
        ));
        let document = runner.active_document().map(str::to_string).unwrap_or_default();
        assert!(document.contains("document.body.appendChild(banner)"));

        // What the executed document posts back for that script.
        runner.relay(&json!({"type": "console", "level": "log", "message": "x"}));
        runner.relay(&json!({"type": "console", "level": "error", "message": "JavaScript Error: boom"}));

        let events: Vec<(ConsoleLevel, &str)> = runner
            .console()
            .messages()
            .iter()
            .map(|m| (m.level, m.message.as_str()))
            .collect();
        assert_eq!(
            events,
            vec![
                (ConsoleLevel::Log, "x"),
                (ConsoleLevel::Error, "JavaScript Error: boom")
            ]
        );
    }

    #[test]
    fn test_exactly_one_surface_active() {
        let mut runner = runner();
        assert_eq!(runner.active_surface(), SurfaceKind::Embedded);

        runner.pop_out();
        assert_eq!(runner.active_surface(), SurfaceKind::External);
        assert_eq!(runner.last_run().map(|r| r.surface), Some(SurfaceKind::External));
        assert!(runner.embedded.document().is_none());

        runner.pop_in();
        assert_eq!(runner.active_surface(), SurfaceKind::Embedded);
        assert_eq!(runner.last_run().map(|r| r.surface), Some(SurfaceKind::Embedded));
    }

    #[test]
    fn test_closed_window_falls_back_to_embedded() {
        let mut runner = runner();
        runner.pop_out();
        runner.window_closed();

        let report = runner.run();
        assert_eq!(report.surface, SurfaceKind::Embedded);
        assert!(!runner.is_popped_out());
        assert!(runner.active_document().is_some());
    }

    #[test]
    fn test_switching_surfaces_renders_without_auto_run() {
        let mut runner = runner();
        runner.set_auto_run(false);

        runner.pop_out();
        assert_eq!(runner.active_surface(), SurfaceKind::External);
        assert!(runner.active_document().is_some_and(|d| d.contains("<h1>Hi</h1>")));

        runner.pop_in();
        assert_eq!(runner.active_surface(), SurfaceKind::Embedded);
        assert!(runner.active_document().is_some_and(|d| d.contains("<h1>Hi</h1>")));
    }

    #[test]
    fn test_closing_window_restores_embedded_preview() {
        for auto_run in [true, false] {
            let mut runner = runner();
            runner.set_auto_run(auto_run);
            runner.pop_out();
            let runs = runner.last_run().map(|r| r.run);

            runner.window_closed();
            assert_eq!(runner.active_surface(), SurfaceKind::Embedded);
            assert!(runner.external.is_none());
            assert!(
                runner.active_document().is_some_and(|d| d.contains("<h1>Hi</h1>")),
                "auto_run = {auto_run}"
            );
            assert_eq!(runner.last_run().map(|r| r.run), runs.map(|n| n + 1));
        }

        // Nothing popped out: nothing to do.
        let mut runner = runner();
        let runs = runner.last_run().map(|r| r.run);
        runner.window_closed();
        assert_eq!(runner.last_run().map(|r| r.run), runs);
    }

    #[test]
    fn test_teardown_closes_window() {
        let mut runner = runner();
        runner.pop_out();
        runner.teardown();
        assert!(!runner.is_popped_out());
    }
}
