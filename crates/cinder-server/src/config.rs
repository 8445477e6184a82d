//! Server configuration.
//!
//! Read once at startup from a redis.conf-style `key value` file
//! (lines of whitespace-separated pairs, `#` comments), with CLI flags
//! taking precedence over the file. Byte sizes accept K/M/G suffixes.

use std::path::{Path, PathBuf};

use cinder_core::EvictionPolicy;
use cinder_persistence::aof::FsyncPolicy;

/// All tunables, with their documented defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interface to bind.
    pub bind: String,
    /// TCP port.
    pub port: u16,
    /// Number of logical databases.
    pub databases: usize,
    /// Maximum simultaneous client connections.
    pub maxclients: usize,
    /// Idle connection timeout in seconds. 0 disables the timeout.
    pub timeout_secs: u64,
    /// Memory ceiling in bytes. `None` means unlimited.
    pub maxmemory: Option<usize>,
    /// What to do when the ceiling is hit.
    pub eviction_policy: EvictionPolicy,
    /// Whether to write the append-only log.
    pub appendonly: bool,
    /// When to fsync the log.
    pub appendfsync: FsyncPolicy,
    /// Directory for the snapshot and log files.
    pub dir: PathBuf,
    /// Snapshot filename inside `dir`.
    pub dbfilename: String,
    /// Log filename inside `dir`.
    pub appendfilename: String,
    /// Background snapshot interval in seconds. 0 disables periodic
    /// snapshots (SAVE/BGSAVE still work).
    pub save_interval_secs: u64,
    /// Rewrite when the log has grown this percent past its base size.
    pub aof_rewrite_percent: u64,
    /// Never rewrite below this log size.
    pub aof_rewrite_min_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 6379,
            databases: cinder_core::DEFAULT_DATABASE_COUNT,
            maxclients: 10_000,
            timeout_secs: 0,
            maxmemory: None,
            eviction_policy: EvictionPolicy::NoEviction,
            appendonly: false,
            appendfsync: FsyncPolicy::EverySec,
            dir: PathBuf::from("."),
            dbfilename: "dump.rdb".into(),
            appendfilename: "appendonly.aof".into(),
            save_interval_secs: 0,
            aof_rewrite_percent: 100,
            aof_rewrite_min_size: 1024 * 1024,
        }
    }
}

impl Config {
    /// Loads a config file over the defaults.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        let mut config = Self::default();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once(char::is_whitespace)
                .ok_or_else(|| format!("line {}: missing value for '{line}'", lineno + 1))?;
            config
                .apply(key, value.trim())
                .map_err(|e| format!("line {}: {e}", lineno + 1))?;
        }
        Ok(config)
    }

    /// Applies one `key value` pair. Used by both the file loader and
    /// CLI overrides.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key.to_ascii_lowercase().as_str() {
            "bind" => self.bind = value.into(),
            "port" => self.port = parse_num(key, value)?,
            "databases" => {
                let n: usize = parse_num(key, value)?;
                if n == 0 {
                    return Err("databases must be at least 1".into());
                }
                self.databases = n;
            }
            "maxclients" => self.maxclients = parse_num(key, value)?,
            "timeout" => self.timeout_secs = parse_num(key, value)?,
            "maxmemory" => {
                let bytes = parse_byte_size(value)?;
                self.maxmemory = (bytes > 0).then_some(bytes);
            }
            "maxmemory-policy" => self.eviction_policy = parse_eviction_policy(value)?,
            "appendonly" => self.appendonly = parse_bool(key, value)?,
            "appendfsync" => self.appendfsync = parse_fsync_policy(value)?,
            "dir" => self.dir = PathBuf::from(value),
            "dbfilename" => self.dbfilename = value.into(),
            "appendfilename" => self.appendfilename = value.into(),
            "save" => self.save_interval_secs = parse_num(key, value)?,
            "auto-aof-rewrite-percentage" => self.aof_rewrite_percent = parse_num(key, value)?,
            "auto-aof-rewrite-min-size" => {
                self.aof_rewrite_min_size = parse_byte_size(value)? as u64
            }
            other => return Err(format!("unknown config key '{other}'")),
        }
        Ok(())
    }

    /// Full path of the snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(&self.dbfilename)
    }

    /// Full path of the append-only log.
    pub fn aof_path(&self) -> PathBuf {
        self.dir.join(&self.appendfilename)
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("invalid value '{value}' for '{key}'"))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" => Ok(true),
        "no" | "false" | "0" => Ok(false),
        _ => Err(format!("invalid value '{value}' for '{key}'")),
    }
}

/// Parses a human-readable byte size string into a number of bytes.
///
/// Supports suffixes K/KB, M/MB, G/GB (binary multiples). Plain
/// numbers are bytes. Case insensitive.
pub fn parse_byte_size(input: &str) -> Result<usize, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty byte size string".into());
    }

    let upper = input.to_ascii_uppercase();

    let (num_str, multiplier) = if let Some(n) = upper.strip_suffix("GB") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix("MB") {
        (n, 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix("KB") {
        (n, 1024)
    } else if let Some(n) = upper.strip_suffix('G') {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix('M') {
        (n, 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix('K') {
        (n, 1024)
    } else {
        (upper.as_str(), 1)
    };

    let num: usize = num_str
        .parse()
        .map_err(|_| format!("invalid byte size: '{input}'"))?;

    num.checked_mul(multiplier)
        .ok_or_else(|| format!("byte size overflow: '{input}'"))
}

/// Parses an eviction policy name.
pub fn parse_eviction_policy(input: &str) -> Result<EvictionPolicy, String> {
    match input.to_ascii_lowercase().as_str() {
        "noeviction" => Ok(EvictionPolicy::NoEviction),
        "allkeys-lru" => Ok(EvictionPolicy::AllKeysLru),
        "allkeys-lfu" => Ok(EvictionPolicy::AllKeysLfu),
        "allkeys-random" => Ok(EvictionPolicy::AllKeysRandom),
        "volatile-ttl" => Ok(EvictionPolicy::VolatileTtl),
        _ => Err(format!(
            "unknown eviction policy '{input}'. valid options: noeviction, allkeys-lru, \
             allkeys-lfu, allkeys-random, volatile-ttl"
        )),
    }
}

/// Parses an fsync policy name.
pub fn parse_fsync_policy(input: &str) -> Result<FsyncPolicy, String> {
    match input.to_ascii_lowercase().as_str() {
        "always" => Ok(FsyncPolicy::Always),
        "everysec" => Ok(FsyncPolicy::EverySec),
        "no" => Ok(FsyncPolicy::No),
        _ => Err(format!(
            "unknown fsync policy '{input}'. valid options: always, everysec, no"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_documented_values() {
        let c = Config::default();
        assert_eq!(c.bind, "0.0.0.0");
        assert_eq!(c.port, 6379);
        assert_eq!(c.databases, 16);
        assert_eq!(c.maxclients, 10_000);
        assert_eq!(c.timeout_secs, 0);
        assert_eq!(c.maxmemory, None);
        assert!(!c.appendonly);
        assert_eq!(c.appendfsync, FsyncPolicy::EverySec);
        assert_eq!(c.dbfilename, "dump.rdb");
        assert_eq!(c.appendfilename, "appendonly.aof");
    }

    #[test]
    fn parse_plain_bytes_and_suffixes() {
        assert_eq!(parse_byte_size("1024").unwrap(), 1024);
        assert_eq!(parse_byte_size("100K").unwrap(), 100 * 1024);
        assert_eq!(parse_byte_size("100kb").unwrap(), 100 * 1024);
        assert_eq!(parse_byte_size("50M").unwrap(), 50 * 1024 * 1024);
        assert_eq!(parse_byte_size("2G").unwrap(), 2 * 1024 * 1024 * 1024);
        assert!(parse_byte_size("").is_err());
        assert!(parse_byte_size("abc").is_err());
        assert!(parse_byte_size("M").is_err());
    }

    #[test]
    fn parse_policies() {
        assert_eq!(
            parse_eviction_policy("ALLKEYS-LRU").unwrap(),
            EvictionPolicy::AllKeysLru
        );
        assert_eq!(
            parse_eviction_policy("volatile-ttl").unwrap(),
            EvictionPolicy::VolatileTtl
        );
        assert!(parse_eviction_policy("sometimes").is_err());

        assert_eq!(parse_fsync_policy("ALWAYS").unwrap(), FsyncPolicy::Always);
        assert_eq!(parse_fsync_policy("no").unwrap(), FsyncPolicy::No);
        assert!(parse_fsync_policy("maybe").is_err());
    }

    #[test]
    fn load_file_with_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# cinder config").unwrap();
        writeln!(file, "port 7000").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "maxmemory 100mb").unwrap();
        writeln!(file, "maxmemory-policy allkeys-lru").unwrap();
        writeln!(file, "appendonly yes").unwrap();
        writeln!(file, "appendfsync always").unwrap();
        writeln!(file, "databases 4").unwrap();
        file.flush().unwrap();

        let c = Config::load(file.path()).unwrap();
        assert_eq!(c.port, 7000);
        assert_eq!(c.maxmemory, Some(100 * 1024 * 1024));
        assert_eq!(c.eviction_policy, EvictionPolicy::AllKeysLru);
        assert!(c.appendonly);
        assert_eq!(c.appendfsync, FsyncPolicy::Always);
        assert_eq!(c.databases, 4);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let mut c = Config::default();
        assert!(c.apply("no-such-key", "1").is_err());
        assert!(c.apply("databases", "0").is_err());
    }

    #[test]
    fn maxmemory_zero_means_unlimited() {
        let mut c = Config::default();
        c.apply("maxmemory", "0").unwrap();
        assert_eq!(c.maxmemory, None);
    }

    #[test]
    fn paths_join_dir() {
        let mut c = Config::default();
        c.apply("dir", "/var/lib/cinder").unwrap();
        assert_eq!(c.snapshot_path(), PathBuf::from("/var/lib/cinder/dump.rdb"));
        assert_eq!(c.aof_path(), PathBuf::from("/var/lib/cinder/appendonly.aof"));
    }
}
