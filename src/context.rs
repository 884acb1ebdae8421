//! Per-run options shared by every component

/// Options that affect how a run is carried out rather than what it does
///
/// The flag mask decides which component runs. The context is handed to
/// that component and decides how it behaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunContext {
    /// Verbose diagnostics were requested
    pub debug: bool,
    /// Nothing may be written to disk
    pub dry_run: bool,
}
