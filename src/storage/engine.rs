//! Statement engine used to build databases from scripts
//!
//! [`SqlEngine`] is the compile/execute/finalize cycle the bootstrapper
//! drives. [`SqliteEngine`] implements it on a `rusqlite` connection, going
//! through `sqlite3_prepare_v2` directly so that compilation reports how many
//! bytes of the script it consumed.

use std::ffi::CStr;
use std::fmt;
use std::os::raw::{c_char, c_int};
use std::path::Path;
use std::ptr::{self, NonNull};

use log::debug;
use rusqlite::{ffi, Connection, OpenFlags};

use crate::error::{BudgetError, BudgetResult};

/// Failure reported by the engine, with its own diagnostic text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    /// Engine result code
    pub code: i32,
    /// Engine diagnostic
    pub message: String,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// Outcome of compiling the head of a script
#[derive(Debug)]
pub struct Compiled<S> {
    /// The compiled statement, or `None` if only whitespace or comments
    /// were consumed
    pub statement: Option<S>,
    /// Number of bytes of input the compilation consumed
    pub consumed: usize,
}

/// A relational engine that compiles statements one at a time
pub trait SqlEngine {
    /// A compiled statement owned by the engine's connection
    type Statement;

    /// Compile the first statement of `sql`
    fn compile(&mut self, sql: &[u8]) -> Result<Compiled<Self::Statement>, EngineError>;

    /// Run a compiled statement to completion
    fn execute(&mut self, statement: &mut Self::Statement) -> Result<(), EngineError>;

    /// Release a compiled statement
    fn finalize(&mut self, statement: Self::Statement);
}

/// A compiled SQLite statement, finalized when dropped
pub struct SqliteStatement {
    raw: NonNull<ffi::sqlite3_stmt>,
}

impl Drop for SqliteStatement {
    fn drop(&mut self) {
        // SAFETY: `raw` came from a successful sqlite3_prepare_v2 and is
        // finalized exactly once, here.
        unsafe {
            ffi::sqlite3_finalize(self.raw.as_ptr());
        }
    }
}

impl fmt::Debug for SqliteStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStatement").finish_non_exhaustive()
    }
}

/// [`SqlEngine`] over a SQLite database
pub struct SqliteEngine {
    conn: Connection,
}

impl SqliteEngine {
    /// Open `path` read-write, creating the database if needed
    pub fn create(path: &Path) -> BudgetResult<Self> {
        Self::open_with(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
    }

    /// Open an existing database at `path` read-write
    pub fn open_existing(path: &Path) -> BudgetResult<Self> {
        Self::open_with(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
    }

    /// Open a private in-memory database, gone once the engine is closed
    pub fn in_memory() -> BudgetResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| BudgetError::DatabaseOpenFailed(format!(":memory:: {}", e)))?;
        debug!("opened in-memory database with sqlite {}", rusqlite::version());
        Ok(Self { conn })
    }

    fn open_with(path: &Path, flags: OpenFlags) -> BudgetResult<Self> {
        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            BudgetError::DatabaseOpenFailed(format!("{}: {}", path.display(), e))
        })?;
        debug!("opened {} with sqlite {}", path.display(), rusqlite::version());
        Ok(Self { conn })
    }

    /// The underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Close the connection, reporting any error from the engine
    pub fn close(self) -> BudgetResult<()> {
        self.conn
            .close()
            .map_err(|(_, e)| BudgetError::DatabaseCloseFailed(e.to_string()))
    }

    fn db(&self) -> *mut ffi::sqlite3 {
        // SAFETY: the handle is only used while `self.conn` is alive and is
        // never closed through this pointer.
        unsafe { self.conn.handle() }
    }

    fn last_error(&self, code: c_int) -> EngineError {
        // SAFETY: sqlite3_errmsg always returns a valid NUL-terminated string
        // owned by the connection; it is copied out before any further call.
        let message = unsafe { CStr::from_ptr(ffi::sqlite3_errmsg(self.db())) }
            .to_string_lossy()
            .into_owned();
        EngineError { code, message }
    }
}

impl SqlEngine for SqliteEngine {
    type Statement = SqliteStatement;

    fn compile(&mut self, sql: &[u8]) -> Result<Compiled<SqliteStatement>, EngineError> {
        let len = c_int::try_from(sql.len()).map_err(|_| EngineError {
            code: ffi::SQLITE_TOOBIG,
            message: format!("{} bytes of statement text is too large", sql.len()),
        })?;

        let mut raw: *mut ffi::sqlite3_stmt = ptr::null_mut();
        let mut tail: *const c_char = ptr::null();

        // SAFETY: `sql` is valid for `len` bytes for the duration of the call.
        // With an explicit length sqlite never reads past it, so no NUL
        // terminator is required. `tail` is left pointing into `sql`.
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(self.db(), sql.as_ptr().cast(), len, &mut raw, &mut tail)
        };
        if rc != ffi::SQLITE_OK {
            return Err(self.last_error(rc));
        }

        let consumed = if tail.is_null() {
            sql.len()
        } else {
            // SAFETY: sqlite sets `tail` within `sql` or one past its end.
            let offset = unsafe { tail.cast::<u8>().offset_from(sql.as_ptr()) };
            usize::try_from(offset).map_err(|_| EngineError {
                code: ffi::SQLITE_MISUSE,
                message: "statement tail precedes its start".into(),
            })?
        };

        Ok(Compiled {
            statement: NonNull::new(raw).map(|raw| SqliteStatement { raw }),
            consumed,
        })
    }

    fn execute(&mut self, statement: &mut SqliteStatement) -> Result<(), EngineError> {
        loop {
            // SAFETY: the statement is live until finalized and belongs to
            // this connection.
            let rc = unsafe { ffi::sqlite3_step(statement.raw.as_ptr()) };
            match rc {
                ffi::SQLITE_ROW => continue,
                ffi::SQLITE_DONE => return Ok(()),
                rc => return Err(self.last_error(rc)),
            }
        }
    }

    fn finalize(&mut self, statement: SqliteStatement) {
        drop(statement);
    }
}

impl fmt::Debug for SqliteEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteEngine").finish_non_exhaustive()
    }
}
