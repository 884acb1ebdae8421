//! Startup flag resolution
//!
//! The options given on the command line form a mask of [`Flag`]s. Only a
//! handful of masks name something to do; [`resolve`] maps the mask onto
//! exactly one [`Action`] and everything else onto [`Action::Invalid`].

use std::fmt;
use std::path::PathBuf;

use log::warn;

use crate::crypto::SecureString;

/// A single startup capability, set by one command-line option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    HaveConfig,
    HaveDatabase,
    HaveKey,
    HavePassword,
    InitRequested,
    SqlFileProvided,
    Help,
    Interactive,
    NoOp,
    Validate,
}

impl Flag {
    /// Every flag, in bit order
    pub const ALL: [Self; 10] = [
        Self::HaveConfig,
        Self::HaveDatabase,
        Self::HaveKey,
        Self::HavePassword,
        Self::InitRequested,
        Self::SqlFileProvided,
        Self::Help,
        Self::Interactive,
        Self::NoOp,
        Self::Validate,
    ];

    /// Bit of this flag within a [`StartupFlags`] mask
    pub fn bit(self) -> u16 {
        1 << self as u16
    }

    /// The command-line option that sets this flag
    pub fn option(self) -> char {
        match self {
            Self::HaveConfig => 'C',
            Self::HaveDatabase => 'd',
            Self::HaveKey => 'k',
            Self::HavePassword => 'p',
            Self::InitRequested => 'I',
            Self::SqlFileProvided => 'f',
            Self::Help => 'h',
            Self::Interactive => 'i',
            Self::NoOp => 'n',
            Self::Validate => 'v',
        }
    }
}

/// A set of [`Flag`]s
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StartupFlags(u16);

impl StartupFlags {
    /// Plain connect to an existing database
    pub const CONNECT: Self = Self::of(&[Flag::HaveDatabase]);
    /// Decrypt a database with a key, then connect
    pub const DECRYPT: Self = Self::of(&[Flag::HaveKey, Flag::HaveDatabase]);
    /// Build a new database from a script
    pub const INIT_OK: Self =
        Self::of(&[Flag::InitRequested, Flag::HaveDatabase, Flag::SqlFileProvided]);
    /// Build a new encrypted database from a script
    pub const BOOTSTRAP_ENCRYPTED: Self = Self::of(&[
        Flag::HaveKey,
        Flag::InitRequested,
        Flag::HaveDatabase,
        Flag::SqlFileProvided,
    ]);

    const fn of(flags: &[Flag]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < flags.len() {
            bits |= 1 << flags[i] as u16;
            i += 1;
        }
        Self(bits)
    }

    /// The empty mask
    pub fn empty() -> Self {
        Self(0)
    }

    /// Build a mask from raw bits, dropping bits no flag uses
    pub fn from_bits(bits: u16) -> Self {
        let known = Flag::ALL.iter().fold(0, |acc, flag| acc | flag.bit());
        Self(bits & known)
    }

    /// This mask with `flag` added
    pub fn with(self, flag: Flag) -> Self {
        Self(self.0 | flag.bit())
    }

    /// Check if `flag` is in the mask
    pub fn contains(self, flag: Flag) -> bool {
        self.0 & flag.bit() != 0
    }

    /// The flags in the mask, in bit order
    pub fn iter(self) -> impl Iterator<Item = Flag> {
        Flag::ALL.into_iter().filter(move |flag| self.contains(*flag))
    }
}

impl FromIterator<Flag> for StartupFlags {
    fn from_iter<I: IntoIterator<Item = Flag>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

impl fmt::Display for StartupFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x} [", self.0)?;
        for (i, flag) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "-{}", flag.option())?;
        }
        f.write_str("]")
    }
}

impl fmt::Debug for StartupFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StartupFlags({})", self)
    }
}

/// Everything the command line asked for
///
/// The flag mask is derived from which fields are present, so a path is
/// always available for every path-carrying flag in the mask.
#[derive(Debug, Clone, Default)]
pub struct StartupArgs {
    pub config: Option<PathBuf>,
    pub database: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub sql: Option<PathBuf>,
    pub password: Option<SecureString>,
    pub init: bool,
    pub help: bool,
    pub interactive: bool,
    pub dry_run: bool,
    pub validate: bool,
}

impl StartupArgs {
    /// The flag mask these arguments amount to
    pub fn flags(&self) -> StartupFlags {
        [
            (self.config.is_some(), Flag::HaveConfig),
            (self.database.is_some(), Flag::HaveDatabase),
            (self.key.is_some(), Flag::HaveKey),
            (self.password.is_some(), Flag::HavePassword),
            (self.init, Flag::InitRequested),
            (self.sql.is_some(), Flag::SqlFileProvided),
            (self.help, Flag::Help),
            (self.interactive, Flag::Interactive),
            (self.dry_run, Flag::NoOp),
            (self.validate, Flag::Validate),
        ]
        .into_iter()
        .filter_map(|(set, flag)| set.then_some(flag))
        .collect()
    }

    /// Warn about every requested option that has no implementation
    ///
    /// Returns the unimplemented flags. They stay in the mask.
    pub fn report_unimplemented(&self) -> Vec<Flag> {
        let unimplemented: Vec<Flag> = self
            .flags()
            .iter()
            .filter(|flag| {
                matches!(
                    flag,
                    Flag::HavePassword | Flag::Interactive | Flag::NoOp | Flag::Validate
                )
            })
            .collect();
        for flag in &unimplemented {
            warn!("-{} is not implemented", flag.option());
        }
        unimplemented
    }
}

/// The one thing a startup does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Connect {
        database: PathBuf,
    },
    Decrypt {
        database: PathBuf,
        key: PathBuf,
    },
    Initialize {
        database: PathBuf,
        sql: PathBuf,
    },
    BootstrapEncrypted {
        database: PathBuf,
        key: PathBuf,
        sql: PathBuf,
    },
    ShowHelp,
    Invalid {
        mask: StartupFlags,
    },
}

/// Resolve the arguments into a single action
///
/// Help wins over everything else. Any mask other than the four authorized
/// ones is [`Action::Invalid`].
pub fn resolve(args: &StartupArgs) -> Action {
    let mask = args.flags();
    if mask.contains(Flag::Help) {
        return Action::ShowHelp;
    }

    match (&args.database, &args.key, &args.sql) {
        (Some(database), None, None) if mask == StartupFlags::CONNECT => Action::Connect {
            database: database.clone(),
        },
        (Some(database), Some(key), None) if mask == StartupFlags::DECRYPT => Action::Decrypt {
            database: database.clone(),
            key: key.clone(),
        },
        (Some(database), None, Some(sql)) if mask == StartupFlags::INIT_OK => Action::Initialize {
            database: database.clone(),
            sql: sql.clone(),
        },
        (Some(database), Some(key), Some(sql)) if mask == StartupFlags::BOOTSTRAP_ENCRYPTED => {
            Action::BootstrapEncrypted {
                database: database.clone(),
                key: key.clone(),
                sql: sql.clone(),
            }
        }
        _ => Action::Invalid { mask },
    }
}
