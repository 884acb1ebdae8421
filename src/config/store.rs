//! Config file loading and default synthesis
//!
//! The config file is a list of `key: value` lines with five known keys:
//! `database`, `password`, `dbhash`, `hashspec` and `cipherspec`. A missing
//! file is replaced by the compiled-in defaults, which are also written to
//! disk with owner-only permissions.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use super::paths::BudgetPaths;
use crate::context::RunContext;
use crate::crypto::{SecretBuffer, SecureString};
use crate::error::{BudgetError, BudgetResult};

/// Longest accepted database path, in bytes
pub const PATH_MAX: usize = 512;
/// Longest accepted password, in bytes
pub const PASS_MAX: usize = 1024;
/// Longest accepted stored digest, in hex characters
pub const HASH_MAX: usize = 512;
/// Size of the secret buffer a config file is read into or written from
pub const CONFIG_CAPACITY: usize = 4096;

/// Digest used for the stored password/database hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashSpec {
    None,
    Sha256,
    Sha512,
    Whirlpool,
    Shake256,
    Blake2b512,
    Sha512_256,
    Sha384,
    /// Default digest
    #[default]
    Sha3_512,
    Sha3_256,
}

impl HashSpec {
    /// Every supported digest
    pub const ALL: [Self; 10] = [
        Self::None,
        Self::Sha256,
        Self::Sha512,
        Self::Whirlpool,
        Self::Shake256,
        Self::Blake2b512,
        Self::Sha512_256,
        Self::Sha384,
        Self::Sha3_512,
        Self::Sha3_256,
    ];

    /// Name as written in the config file
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Sha256 => "SHA-256",
            Self::Sha512 => "SHA-512",
            Self::Whirlpool => "Whirlpool",
            Self::Shake256 => "SHAKE-256",
            Self::Blake2b512 => "BLAKE2b-512",
            Self::Sha512_256 => "SHA-512/256",
            Self::Sha384 => "SHA-384",
            Self::Sha3_512 => "SHA3-512",
            Self::Sha3_256 => "SHA3-256",
        }
    }

    /// Parse a digest name, ignoring case
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|spec| spec.name().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for HashSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cipher used to encrypt the database at rest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CipherSpec {
    Aes256Cbc,
    Aes256Ctr,
    Serpent256Cbc,
    Serpent256Cmc,
    TwofishCbc,
    /// Default cipher
    #[default]
    ChaCha20Poly1305,
}

impl CipherSpec {
    /// Every supported cipher
    pub const ALL: [Self; 6] = [
        Self::Aes256Cbc,
        Self::Aes256Ctr,
        Self::Serpent256Cbc,
        Self::Serpent256Cmc,
        Self::TwofishCbc,
        Self::ChaCha20Poly1305,
    ];

    /// Name as written in the config file
    pub fn name(&self) -> &'static str {
        match self {
            Self::Aes256Cbc => "AES-256-CBC",
            Self::Aes256Ctr => "AES-256-CTR",
            Self::Serpent256Cbc => "Serpent-256-CBC",
            Self::Serpent256Cmc => "Serpent-256-CMC",
            Self::TwofishCbc => "Twofish-CBC",
            Self::ChaCha20Poly1305 => "ChaCha20-Poly1305",
        }
    }

    /// Parse a cipher name, ignoring case
    ///
    /// Older config files spell the default cipher as plain `ChaCha20`.
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("chacha20") {
            return Some(Self::ChaCha20Poly1305);
        }
        Self::ALL
            .into_iter()
            .find(|spec| spec.name().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for CipherSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Database location and encryption parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Path of the budget database
    pub database: PathBuf,
    /// Symmetric password, empty when unused
    pub password: SecureString,
    /// Stored password/database digest as hex, empty when unset
    pub dbhash: String,
    /// Digest used for `dbhash`
    pub hash: HashSpec,
    /// Cipher used for the database file
    pub cipher: CipherSpec,
}

impl Config {
    /// The compiled-in defaults
    pub fn defaults(paths: &BudgetPaths) -> Self {
        Self {
            database: paths.database_file(),
            password: SecureString::default(),
            dbhash: String::new(),
            hash: HashSpec::default(),
            cipher: CipherSpec::default(),
        }
    }

    /// Serialize as the five `key: value` lines of the config file
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "database: {}", self.database.display())?;
        writeln!(w, "password: {}", self.password.as_str())?;
        writeln!(w, "dbhash: {}", self.dbhash)?;
        writeln!(w, "hashspec: {}", self.hash)?;
        writeln!(w, "cipherspec: {}", self.cipher)
    }

    /// Apply one `key: value` pair
    ///
    /// Unknown keys are ignored. An invalid value leaves the field untouched
    /// and is reported back as a warning message.
    fn apply(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "database" => {
                if value.is_empty() {
                    return Err("empty database path".into());
                }
                if value.len() > PATH_MAX {
                    return Err(format!("database path longer than {} bytes", PATH_MAX));
                }
                self.database = PathBuf::from(value);
            }
            "password" => {
                if value.len() > PASS_MAX {
                    return Err(format!("password longer than {} bytes", PASS_MAX));
                }
                self.password = SecureString::new(value);
            }
            "dbhash" => {
                if value.len() > HASH_MAX {
                    return Err(format!("dbhash longer than {} characters", HASH_MAX));
                }
                if !value.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err("dbhash is not hexadecimal".into());
                }
                self.dbhash = value.to_ascii_lowercase();
            }
            "hashspec" => {
                self.hash =
                    HashSpec::parse(value).ok_or_else(|| format!("unknown hashspec '{}'", value))?;
            }
            "cipherspec" => {
                self.cipher = CipherSpec::parse(value)
                    .ok_or_else(|| format!("unknown cipherspec '{}'", value))?;
            }
            other => debug!("ignoring unknown config key '{}'", other),
        }
        Ok(())
    }
}

/// Where a loaded [`Config`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from an existing file
    File,
    /// The file was absent and the compiled-in defaults are in use
    Defaults,
}

/// A config together with its origin
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub source: ConfigSource,
}

/// Reads and creates config files
#[derive(Debug, Clone)]
pub struct ConfigStore {
    paths: BudgetPaths,
}

impl ConfigStore {
    /// Create a store whose defaults are rooted at `paths`
    pub fn new(paths: BudgetPaths) -> Self {
        Self { paths }
    }

    /// Load the config at `path`, creating it from defaults if absent
    ///
    /// Under `ctx.dry_run` a missing file is not written and the defaults
    /// are only used in memory.
    ///
    /// # Errors
    ///
    /// Returns [`BudgetError::ConfigUnavailable`] if the file exists but
    /// cannot be read.
    pub fn load(&self, ctx: &RunContext, path: &Path) -> BudgetResult<LoadedConfig> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if let Some(defaults) = self.create_missing(ctx, path)? {
                    return Ok(defaults);
                }
                File::open(path).map_err(|e| unavailable(path, e))?
            }
            Err(e) => return Err(unavailable(path, e)),
        };
        self.read(file, path)
    }

    /// Write defaults for a missing config
    ///
    /// Returns `None` if another process created the file first, in which
    /// case that file should be read instead.
    fn create_missing(&self, ctx: &RunContext, path: &Path) -> BudgetResult<Option<LoadedConfig>> {
        let defaults = LoadedConfig {
            config: Config::defaults(&self.paths),
            source: ConfigSource::Defaults,
        };
        if ctx.dry_run {
            info!("{} not found, dry run so defaults are not written", path.display());
            return Ok(Some(defaults));
        }

        info!("{} not found, writing defaults", path.display());
        match self.write_default(path) {
            Ok(()) => Ok(Some(defaults)),
            Err(BudgetError::ConfigExists(_)) => {
                debug!("{} was created concurrently, reading it", path.display());
                Ok(None)
            }
            Err(err) if err.is_recoverable() => {
                warn!("{}; continuing with defaults", err);
                Ok(Some(defaults))
            }
            Err(err) => Err(err),
        }
    }

    fn read(&self, mut file: File, path: &Path) -> BudgetResult<LoadedConfig> {
        let metadata = file.metadata().map_err(|e| unavailable(path, e))?;
        if !metadata.is_file() {
            return Err(BudgetError::ConfigUnavailable(format!(
                "{}: not a regular file",
                path.display()
            )));
        }
        if metadata.len() > CONFIG_CAPACITY as u64 {
            return Err(BudgetError::ConfigUnavailable(format!(
                "{}: larger than {} bytes",
                path.display(),
                CONFIG_CAPACITY
            )));
        }

        let mut config = Config::defaults(&self.paths);
        SecretBuffer::scoped(CONFIG_CAPACITY, |buf| -> BudgetResult<()> {
            buf.fill_from(&mut file).map_err(|e| unavailable(path, e))?;
            parse_config(buf.as_bytes(), &mut config);
            Ok(())
        })?;

        debug!(
            "loaded {} (database {}, hash {}, cipher {})",
            path.display(),
            config.database.display(),
            config.hash,
            config.cipher
        );

        Ok(LoadedConfig {
            config,
            source: ConfigSource::File,
        })
    }

    /// Write the compiled-in defaults to `path`
    ///
    /// The file is created exclusively with owner-only permissions and synced
    /// before it is closed. An existing file is never touched.
    pub fn write_default(&self, path: &Path) -> BudgetResult<()> {
        let failed = |what: &str, e: io::Error| {
            BudgetError::ConfigWriteFailed(format!("{} {}: {}", what, path.display(), e))
        };
        let defaults = Config::defaults(&self.paths);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| failed("creating parent of", e))?;
        }

        SecretBuffer::scoped(CONFIG_CAPACITY, |buf| -> BudgetResult<()> {
            defaults
                .write_to(buf)
                .map_err(|e| failed("serializing defaults for", e))?;

            let mut options = OpenOptions::new();
            options.write(true).create_new(true);
            owner_only(&mut options);
            let mut file = options.open(path).map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    BudgetError::ConfigExists(path.display().to_string())
                } else {
                    failed("creating", e)
                }
            })?;

            file.write_all(buf.as_bytes())
                .map_err(|e| failed("wrote less than expected to", e))?;
            file.flush().map_err(|e| failed("flushing", e))?;
            file.sync_all().map_err(|e| failed("syncing", e))?;
            Ok(())
        })
    }
}

fn unavailable(path: &Path, e: io::Error) -> BudgetError {
    BudgetError::ConfigUnavailable(format!("{}: {}", path.display(), e))
}

#[cfg(unix)]
fn owner_only(options: &mut OpenOptions) {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(0o600);
}

#[cfg(not(unix))]
fn owner_only(_options: &mut OpenOptions) {}

/// Split a line at its first `:` into a trimmed key and value
fn split_line(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value.trim()))
}

/// Apply every well-formed line of `bytes` on top of `config`
fn parse_config(bytes: &[u8], config: &mut Config) {
    for (index, raw) in bytes.split(|&b| b == b'\n').enumerate() {
        let lineno = index + 1;
        let Ok(line) = std::str::from_utf8(raw) else {
            warn!("config line {}: not valid UTF-8, skipping", lineno);
            continue;
        };
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let Some((key, value)) = split_line(line) else {
            warn!("config line {}: expected 'key: value', skipping", lineno);
            continue;
        };
        if let Err(message) = config.apply(key, value) {
            warn!("config line {}: {}, skipping", lineno, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CTX: RunContext = RunContext {
        debug: false,
        dry_run: false,
    };

    fn store(temp_dir: &TempDir) -> ConfigStore {
        ConfigStore::new(BudgetPaths::with_home_dir(temp_dir.path()))
    }

    #[test]
    fn test_defaults() {
        let paths = BudgetPaths::with_home_dir("/home/user");
        let config = Config::defaults(&paths);
        assert_eq!(config.database, PathBuf::from("/home/user/.local/.budget"));
        assert!(config.password.is_empty());
        assert!(config.dbhash.is_empty());
        assert_eq!(config.hash, HashSpec::Sha3_512);
        assert_eq!(config.cipher, CipherSpec::ChaCha20Poly1305);
    }

    #[test]
    fn test_load_missing_writes_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let path = temp_dir.path().join("budget.conf");

        let loaded = store.load(&CTX, &path).unwrap();

        assert_eq!(loaded.source, ConfigSource::Defaults);
        assert_eq!(
            loaded.config,
            Config::defaults(&BudgetPaths::with_home_dir(temp_dir.path()))
        );

        let contents = fs::read_to_string(&path).unwrap();
        let keys: Vec<&str> = contents
            .lines()
            .filter_map(|l| l.split_once(':').map(|(k, _)| k))
            .collect();
        assert_eq!(keys, ["database", "password", "dbhash", "hashspec", "cipherspec"]);
        assert!(contents.contains("hashspec: SHA3-512\n"));
        assert!(contents.contains("cipherspec: ChaCha20-Poly1305\n"));

        let entries = fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_default_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("budget.conf");
        store(&temp_dir).load(&CTX, &path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_second_load_reads_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let path = temp_dir.path().join("budget.conf");

        let first = store.load(&CTX, &path).unwrap();
        let written = fs::read(&path).unwrap();

        let second = store.load(&CTX, &path).unwrap();
        assert_eq!(second.source, ConfigSource::File);
        assert_eq!(second.config, first.config);
        assert_eq!(fs::read(&path).unwrap(), written);
    }

    #[test]
    fn test_write_default_never_clobbers() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let path = temp_dir.path().join("budget.conf");
        fs::write(&path, "database: /srv/budget.db\n").unwrap();

        let err = store.write_default(&path).unwrap_err();
        assert!(matches!(err, BudgetError::ConfigExists(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), "database: /srv/budget.db\n");
    }

    #[test]
    fn test_config_created_concurrently_is_read() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let path = temp_dir.path().join("budget.conf");
        fs::write(&path, "database: /srv/budget.db\n").unwrap();

        assert!(store.create_missing(&CTX, &path).unwrap().is_none());
        let loaded = store.load(&CTX, &path).unwrap();
        assert_eq!(loaded.source, ConfigSource::File);
        assert_eq!(loaded.config.database, PathBuf::from("/srv/budget.db"));
    }

    #[test]
    fn test_dry_run_does_not_write_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("budget.conf");
        let ctx = RunContext {
            dry_run: true,
            ..CTX
        };

        let loaded = store(&temp_dir).load(&ctx, &path).unwrap();
        assert_eq!(loaded.source, ConfigSource::Defaults);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_unwritable_directory_falls_back_to_defaults() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let locked = temp_dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o500)).unwrap();
        let path = locked.join("budget.conf");

        let result = store(&temp_dir).load(&CTX, &path);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o700)).unwrap();

        // Under root the write goes through; the defaults are in use either way.
        let loaded = result.unwrap();
        assert_eq!(loaded.source, ConfigSource::Defaults);
    }

    #[test]
    fn test_write_default_creates_parent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".config").join("budget.conf");
        store(&temp_dir).write_default(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_load_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("budget.conf");
        fs::write(
            &path,
            "database: /srv/budget.db\n\
             password: correct horse\n\
             dbhash: ABCDEF0123\n\
             hashspec: blake2b-512\n\
             cipherspec: ChaCha20\n",
        )
        .unwrap();

        let loaded = store(&temp_dir).load(&CTX, &path).unwrap();
        assert_eq!(loaded.source, ConfigSource::File);
        assert_eq!(loaded.config.database, PathBuf::from("/srv/budget.db"));
        assert_eq!(loaded.config.password.as_str(), "correct horse");
        assert_eq!(loaded.config.dbhash, "abcdef0123");
        assert_eq!(loaded.config.hash, HashSpec::Blake2b512);
        assert_eq!(loaded.config.cipher, CipherSpec::ChaCha20Poly1305);
    }

    #[test]
    fn test_malformed_and_unknown_lines_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("budget.conf");
        fs::write(
            &path,
            "# comment\r\n\
             this line has no separator\n\
             colour: blue\n\
             hashspec: md5\n\
             dbhash: not-hex\n\
             cipherspec: aes-256-ctr\r\n\
             : orphan value\n",
        )
        .unwrap();

        let loaded = store(&temp_dir).load(&CTX, &path).unwrap();
        let defaults = Config::defaults(&BudgetPaths::with_home_dir(temp_dir.path()));
        assert_eq!(loaded.config.hash, defaults.hash);
        assert!(loaded.config.dbhash.is_empty());
        assert_eq!(loaded.config.cipher, CipherSpec::Aes256Ctr);
        assert_eq!(loaded.config.database, defaults.database);
    }

    #[test]
    fn test_overlong_values_are_rejected() {
        let mut config = Config::defaults(&BudgetPaths::with_home_dir("/home/user"));
        assert!(config.apply("database", &"a".repeat(PATH_MAX + 1)).is_err());
        assert!(config.apply("password", &"p".repeat(PASS_MAX + 1)).is_err());
        assert!(config.apply("dbhash", &"f".repeat(HASH_MAX + 1)).is_err());
        assert_eq!(config.database, PathBuf::from("/home/user/.local/.budget"));
    }

    #[test]
    fn test_directory_is_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let err = store(&temp_dir).load(&CTX, temp_dir.path()).unwrap_err();
        assert!(matches!(err, BudgetError::ConfigUnavailable(_)));
    }

    #[test]
    fn test_oversized_file_is_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("budget.conf");
        fs::write(&path, "x".repeat(CONFIG_CAPACITY + 1)).unwrap();

        let err = store(&temp_dir).load(&CTX, &path).unwrap_err();
        assert!(matches!(err, BudgetError::ConfigUnavailable(_)));
    }

    #[test]
    fn test_algorithm_names_round_trip() {
        for spec in HashSpec::ALL {
            assert_eq!(HashSpec::parse(spec.name()), Some(spec));
        }
        for spec in CipherSpec::ALL {
            assert_eq!(CipherSpec::parse(spec.name()), Some(spec));
        }
        assert_eq!(HashSpec::parse("sha3-256"), Some(HashSpec::Sha3_256));
        assert_eq!(CipherSpec::parse("rot13"), None);
    }
}
