//! Database bootstrap from an SQL script
//!
//! The script is mapped into memory read-only and fed to a [`SqlEngine`] one
//! statement at a time. Each statement is compiled, run to completion and
//! finalized before the next one is looked at. The first failure stops the
//! run; statements already executed stay in the database.
//!
//! ```text
//! Idle -> Mapped -> Draining -> Done
//!   \        \          \
//!    +--------+----------+---> Failed
//! ```

use std::fs::File;

use log::{debug, error};
use memmap2::{Mmap, MmapOptions};

use super::engine::{Compiled, SqlEngine};
use crate::context::RunContext;
use crate::error::{BudgetError, BudgetResult};

/// Progress of a [`Bootstrapper`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    /// Nothing has happened yet
    Idle,
    /// The script is mapped
    Mapped,
    /// Statements are being compiled and executed
    Draining,
    /// Every statement in the script executed
    Done,
    /// A step failed; terminal
    Failed,
}

/// Read position within a script
///
/// The offset only moves forward and never passes the end of the script.
#[derive(Debug)]
pub struct ScriptCursor<'a> {
    script: &'a [u8],
    offset: usize,
}

impl<'a> ScriptCursor<'a> {
    /// Start at the beginning of `script`
    pub fn new(script: &'a [u8]) -> Self {
        Self { script, offset: 0 }
    }

    /// Bytes consumed so far
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> &'a [u8] {
        &self.script[self.offset..]
    }

    /// Check if the whole script has been consumed
    pub fn is_exhausted(&self) -> bool {
        self.offset == self.script.len()
    }

    /// Move forward by exactly `consumed` bytes
    ///
    /// # Errors
    ///
    /// Fails if `consumed` is zero while input remains, or if it would move
    /// past the end of the script.
    pub fn advance(&mut self, consumed: usize) -> BudgetResult<()> {
        let remaining = self.script.len() - self.offset;
        if consumed == 0 && remaining > 0 {
            return Err(BudgetError::ResourceInvariantViolated(format!(
                "no progress at byte {} of {}",
                self.offset,
                self.script.len()
            )));
        }
        if consumed > remaining {
            return Err(BudgetError::ResourceInvariantViolated(format!(
                "advance of {} bytes at byte {} overruns {} byte script",
                consumed,
                self.offset,
                self.script.len()
            )));
        }
        self.offset += consumed;
        Ok(())
    }
}

/// A mapped script and the descriptor it was mapped from
///
/// Dropping it unmaps the region, then closes the file.
struct ScriptMapping {
    map: Mmap,
    _file: File,
}

impl ScriptMapping {
    fn new(file: File) -> BudgetResult<Self> {
        let metadata = file
            .metadata()
            .map_err(|e| BudgetError::ScriptMapFailed(e.to_string()))?;
        if !metadata.is_file() {
            return Err(BudgetError::ScriptMapFailed("not a regular file".into()));
        }
        if metadata.len() == 0 {
            return Err(BudgetError::ScriptMapFailed("script is empty".into()));
        }

        // SAFETY: the mapping is private and read-only, and it is dropped
        // before this process could observe changes made to the file.
        let map = unsafe { MmapOptions::new().map_copy_read_only(&file) }
            .map_err(|e| BudgetError::ScriptMapFailed(e.to_string()))?;
        debug!("mapped {} byte script", map.len());

        Ok(Self { map, _file: file })
    }
}

impl Drop for ScriptMapping {
    fn drop(&mut self) {
        debug!("releasing {} byte script mapping", self.map.len());
    }
}

/// Builds a database by running a script through an engine
pub struct Bootstrapper<'e, E: SqlEngine> {
    engine: &'e mut E,
    state: BootstrapState,
    history: Vec<BootstrapState>,
    executed: usize,
}

impl<'e, E: SqlEngine> Bootstrapper<'e, E> {
    /// Create an idle bootstrapper driving `engine`
    pub fn new(engine: &'e mut E) -> Self {
        Self {
            engine,
            state: BootstrapState::Idle,
            history: vec![BootstrapState::Idle],
            executed: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> BootstrapState {
        self.state
    }

    /// Every state entered so far, in order
    pub fn history(&self) -> &[BootstrapState] {
        &self.history
    }

    /// Number of statements executed
    pub fn executed(&self) -> usize {
        self.executed
    }

    /// Run every statement of `script`
    ///
    /// Returns the number of statements executed. The script is unmapped
    /// and closed before this returns, whatever the outcome. With
    /// `ctx.debug` set the text of every statement is logged before it runs.
    pub fn run(&mut self, ctx: &RunContext, script: File) -> BudgetResult<usize> {
        if self.state != BootstrapState::Idle {
            return Err(BudgetError::ResourceInvariantViolated(format!(
                "bootstrap started from {:?}",
                self.state
            )));
        }

        match self.map_and_drain(ctx, script) {
            Ok(executed) => {
                self.transition(BootstrapState::Done);
                Ok(executed)
            }
            Err(err) => {
                error!("bootstrap failed after {} statements: {}", self.executed, err);
                self.transition(BootstrapState::Failed);
                Err(err)
            }
        }
    }

    fn map_and_drain(&mut self, ctx: &RunContext, script: File) -> BudgetResult<usize> {
        let mapping = ScriptMapping::new(script)?;
        self.transition(BootstrapState::Mapped);
        self.drain(ctx, &mapping.map)
    }

    fn drain(&mut self, ctx: &RunContext, script: &[u8]) -> BudgetResult<usize> {
        self.transition(BootstrapState::Draining);
        let mut cursor = ScriptCursor::new(script);

        while !cursor.is_exhausted() {
            let offset = cursor.offset();
            let Compiled {
                statement,
                consumed,
            } = self
                .engine
                .compile(cursor.remaining())
                .map_err(|e| BudgetError::StatementCompileFailed {
                    offset,
                    message: e.to_string(),
                })?;

            // The engine reads no further than a NUL byte.
            if statement.is_none() && consumed == 0 {
                return Err(BudgetError::StatementCompileFailed {
                    offset,
                    message: unreadable(cursor.remaining()),
                });
            }

            if ctx.debug {
                let rest = cursor.remaining();
                let text = String::from_utf8_lossy(rest.get(..consumed).unwrap_or(rest));
                debug!("statement at byte {}: {}", offset, text.trim());
            }

            if let Err(err) = cursor.advance(consumed) {
                if let Some(statement) = statement {
                    self.engine.finalize(statement);
                }
                return Err(err);
            }

            let Some(mut statement) = statement else {
                continue;
            };
            let outcome = self.engine.execute(&mut statement);
            self.engine.finalize(statement);
            outcome.map_err(|e| BudgetError::StatementExecuteFailed {
                offset,
                message: e.to_string(),
            })?;

            self.executed += 1;
            debug!("statement {} at byte {} done", self.executed, offset);
        }

        Ok(self.executed)
    }

    fn transition(&mut self, next: BootstrapState) {
        debug!("bootstrap {:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
    }
}

/// Why the engine could not read any statement text from `rest`
fn unreadable(rest: &[u8]) -> String {
    match rest.first() {
        Some(&0) => "NUL byte in script".into(),
        _ => "no statement text could be read".into(),
    }
}
