use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Capabilities granted to the embedded frame. Nothing else is allowed:
/// no top-level navigation, popups, forms or downloads.
pub const SANDBOX_POLICY: &str = "allow-scripts allow-same-origin";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("Execution surface has been closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceKind {
    Embedded,
    External,
}

/// Somewhere a built document can be rendered. Every write replaces the whole
/// document.
pub trait ExecutionSurface: Send {
    fn kind(&self) -> SurfaceKind;

    fn write(&mut self, document: &str) -> Result<(), SurfaceError>;

    /// Currently rendered document, if any.
    fn document(&self) -> Option<&str>;

    fn is_closed(&self) -> bool;

    fn close(&mut self);

    /// Number of documents written so far.
    fn write_count(&self) -> u64;
}

#[derive(Debug, Default)]
pub struct EmbeddedFrame {
    document: Option<String>,
    writes: u64,
}

impl EmbeddedFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sandbox_policy(&self) -> &'static str {
        SANDBOX_POLICY
    }
}

impl ExecutionSurface for EmbeddedFrame {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Embedded
    }

    fn write(&mut self, document: &str) -> Result<(), SurfaceError> {
        self.document = Some(document.to_string());
        self.writes += 1;
        Ok(())
    }

    fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    // The frame lives as long as the host page.
    fn is_closed(&self) -> bool {
        false
    }

    fn close(&mut self) {
        self.document = None;
    }

    fn write_count(&self) -> u64 {
        self.writes
    }
}

/// A separate top-level window the user popped the preview out into. The
/// user can close it at any time.
#[derive(Debug, Default)]
pub struct ExternalWindow {
    document: Option<String>,
    writes: u64,
    closed: bool,
}

impl ExternalWindow {
    pub fn open() -> Self {
        Self::default()
    }

    /// Records that the user closed the window.
    pub fn mark_closed(&mut self) {
        self.closed = true;
    }
}

impl ExecutionSurface for ExternalWindow {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::External
    }

    fn write(&mut self, document: &str) -> Result<(), SurfaceError> {
        if self.closed {
            return Err(SurfaceError::Closed);
        }
        self.document = Some(document.to_string());
        self.writes += 1;
        Ok(())
    }

    fn document(&self) -> Option<&str> {
        if self.closed {
            return None;
        }
        self.document.as_deref()
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn close(&mut self) {
        self.closed = true;
        self.document = None;
    }

    fn write_count(&self) -> u64 {
        self.writes
    }
}
