use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Branded nominal string ids backed by a random UUIDv7, so cross-assignment
/// between different id kinds is a type error rather than a silent bug.
macro_rules! branded_id {
    ($name:ident, $prefix:expr) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}-{}", $prefix, Uuid::now_v7()))
            }

            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(EventId, "evt");
branded_id!(NetworkRecordId, "net");
branded_id!(SnapshotId, "snap");
branded_id!(CommandId, "cmd");
branded_id!(ConnectionId, "conn");

/// Session ids are the one human-readable branded id: `sess-<adj>-<animal>-<YYYYMMDD>-<6base36>`.
/// Kept distinct from the generic `branded_id!` macro because it is not
/// UUID-backed and its shape is part of the external contract (spec.md §3).
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

const ADJECTIVES: &[&str] = &[
    "quiet", "amber", "brisk", "calm", "dusty", "eager", "faded", "gentle", "hollow", "icy",
    "jolly", "keen", "lively", "muted", "nimble", "opal", "plain", "quick", "rusty", "shy",
    "tame", "vivid", "wiry", "zesty",
];
const ANIMALS: &[&str] = &[
    "otter", "heron", "lynx", "finch", "gecko", "mole", "wren", "badger", "ibis", "vole",
    "marten", "egret", "shrew", "tapir", "quail", "stoat", "newt", "civet", "serin", "dunlin",
];

impl SessionId {
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let adj = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
        let animal = ANIMALS[rng.gen_range(0..ANIMALS.len())];
        let date = Utc::now().format("%Y%m%d");
        let suffix = base36_token(&mut rng, 6);
        Self(format!("sess-{adj}-{animal}-{date}-{suffix}"))
    }

    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe form used for the snapshot asset tree (spec.md §4.2):
    /// anything outside `[A-Za-z0-9_-]` is replaced with `_`.
    pub fn sanitized(&self) -> String {
        self.0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn base36_token(rng: &mut impl Rng, len: usize) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Error fingerprint ids are content-addressed, not random: `fp-<sha256(message+stack)[:16]>`
/// (spec.md §3). Constructing one always requires the normalized content.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FingerprintId(String);

impl FingerprintId {
    /// `message` and `stack` must already be normalized (lowercased,
    /// whitespace-collapsed, trimmed) by the caller so that identical
    /// logical errors always hash to the same id (spec.md §8).
    pub fn from_normalized(message: &str, stack: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(message.as_bytes());
        hasher.update(b"\0");
        hasher.update(stack.as_bytes());
        let digest = hasher.finalize();
        let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
        Self(format!("fp-{}", &hex[..16]))
    }

    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FingerprintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FingerprintId {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl AsRef<str> for FingerprintId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
