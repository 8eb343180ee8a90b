//! # UUID Generators
//!
//! Pluggable identifier generation for exchanges and messages.
//!
//! ## Available Generators
//!
//! - **DefaultUuidGenerator**: host-derived seed plus an atomic counter,
//!   unique per process and lexicographically increasing
//! - **ClassicUuidGenerator**: readable `ID-<host>-<seed>-<counter>` form
//! - **ShortUuidGenerator**: 8 hex char random seed plus an unpadded hex counter
//! - **SimpleUuidGenerator**: plain counter, useful in tests
//! - **RandomUuidGenerator**: RFC-4122 version 4 UUIDs
//!
//! ## Usage
//!
//! ```rust
//! use conduit_support::id_generator::{create_uuid_generator, UuidGeneratorKind};
//!
//! let generator = create_uuid_generator(UuidGeneratorKind::Simple);
//! assert_eq!(generator.generate_uuid(), "1");
//! assert_eq!(generator.generate_exchange_uuid(), "2");
//! ```

use crate::error::SupportError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Generates unique identifiers
pub trait UuidGenerator: Send + Sync + fmt::Debug {
    /// Generate a new unique id
    fn generate_uuid(&self) -> String;

    /// Generate a new unique id for an exchange
    fn generate_exchange_uuid(&self) -> String {
        self.generate_uuid()
    }
}

/// Host name used to seed generators, sanitised to `[A-Za-z0-9-]`
pub fn local_host_name() -> String {
    let raw = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok()
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|s| s.trim().to_string())
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string());

    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

/// 32-bit FNV-1a hash, stable across runs
fn fnv1a(input: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in input.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Host-seeded generator producing `PREFIX-COUNTER` ids
#[derive(Debug)]
pub struct DefaultUuidGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl DefaultUuidGenerator {
    pub fn new() -> Self {
        Self::with_host(&local_host_name())
    }

    /// Create a generator seeded from the given host name
    pub fn with_host(host: &str) -> Self {
        let seed = Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
        let prefix = format!("{:08X}{:08X}", fnv1a(host), seed & 0xffff_ffff);
        Self {
            prefix,
            counter: AtomicU64::new(0),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Default for DefaultUuidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl UuidGenerator for DefaultUuidGenerator {
    fn generate_uuid(&self) -> String {
        let next = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{:016X}", self.prefix, next)
    }
}

/// Generator producing readable `ID-host-seed-counter` ids
#[derive(Debug)]
pub struct ClassicUuidGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl ClassicUuidGenerator {
    pub fn new() -> Self {
        let seed = Utc::now().timestamp_millis();
        Self {
            prefix: format!("ID-{}-{}", local_host_name(), seed),
            counter: AtomicU64::new(0),
        }
    }
}

impl Default for ClassicUuidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl UuidGenerator for ClassicUuidGenerator {
    fn generate_uuid(&self) -> String {
        let next = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, next)
    }
}

/// Generator producing short `seed-counter` ids
#[derive(Debug)]
pub struct ShortUuidGenerator {
    seed: String,
    counter: AtomicU64,
}

impl ShortUuidGenerator {
    pub fn new() -> Self {
        let random = Uuid::new_v4();
        let bytes = random.as_bytes();
        let seed = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        Self {
            seed: format!("{seed:08x}"),
            counter: AtomicU64::new(0),
        }
    }
}

impl Default for ShortUuidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl UuidGenerator for ShortUuidGenerator {
    fn generate_uuid(&self) -> String {
        let next = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{:x}", self.seed, next)
    }
}

/// Counter based generator: "1", "2", "3", ...
#[derive(Debug, Default)]
pub struct SimpleUuidGenerator {
    counter: AtomicU64,
}

impl SimpleUuidGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UuidGenerator for SimpleUuidGenerator {
    fn generate_uuid(&self) -> String {
        let next = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        next.to_string()
    }
}

/// RFC-4122 random UUIDs
#[derive(Debug, Default)]
pub struct RandomUuidGenerator;

impl UuidGenerator for RandomUuidGenerator {
    fn generate_uuid(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Generator selection used by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UuidGeneratorKind {
    #[default]
    Default,
    Classic,
    Short,
    Simple,
    Random,
}

impl fmt::Display for UuidGeneratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Classic => write!(f, "classic"),
            Self::Short => write!(f, "short"),
            Self::Simple => write!(f, "simple"),
            Self::Random => write!(f, "random"),
        }
    }
}

impl FromStr for UuidGeneratorKind {
    type Err = SupportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "classic" => Ok(Self::Classic),
            "short" => Ok(Self::Short),
            "simple" => Ok(Self::Simple),
            "random" => Ok(Self::Random),
            _ => Err(SupportError::Configuration(format!(
                "Invalid uuid generator: {s}"
            ))),
        }
    }
}

/// Build the generator for the given kind
pub fn create_uuid_generator(kind: UuidGeneratorKind) -> Arc<dyn UuidGenerator> {
    match kind {
        UuidGeneratorKind::Default => Arc::new(DefaultUuidGenerator::new()),
        UuidGeneratorKind::Classic => Arc::new(ClassicUuidGenerator::new()),
        UuidGeneratorKind::Short => Arc::new(ShortUuidGenerator::new()),
        UuidGeneratorKind::Simple => Arc::new(SimpleUuidGenerator::new()),
        UuidGeneratorKind::Random => Arc::new(RandomUuidGenerator),
    }
}
