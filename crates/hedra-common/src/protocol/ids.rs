use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::protocol::error::{HedraError, Result};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name {
            pub shard: u64,
            pub realm: u64,
            pub num: u64,
        }

        impl $name {
            pub const fn new(shard: u64, realm: u64, num: u64) -> Self {
                Self { shard, realm, num }
            }
        }

        impl From<u64> for $name {
            fn from(num: u64) -> Self {
                Self::new(0, 0, num)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}.{}.{}", self.shard, self.realm, self.num)
            }
        }

        impl FromStr for $name {
            type Err = HedraError;

            /// Accepts `shard.realm.num` or a bare `num` (shard and realm 0).
            fn from_str(s: &str) -> Result<Self> {
                let parse = |part: &str| {
                    part.parse::<u64>().map_err(|_| {
                        HedraError::BasicParse(format!(
                            concat!("invalid ", stringify!($name), " `{}`"),
                            s
                        ))
                    })
                };

                let parts: Vec<&str> = s.split('.').collect();
                match parts.as_slice() {
                    [num] => Ok(Self::new(0, 0, parse(num)?)),
                    [shard, realm, num] => Ok(Self::new(parse(shard)?, parse(realm)?, parse(num)?)),
                    _ => Err(HedraError::BasicParse(format!(
                        concat!("invalid ", stringify!($name), " `{}`"),
                        s
                    ))),
                }
            }
        }
    };
}

entity_id!(
    /// Identity of an account; also used as the key of a consensus node.
    AccountId
);
entity_id!(FileId);
entity_id!(TopicId);

/// Wall-clock instant with nanosecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: u32,
}

impl Timestamp {
    pub const fn new(seconds: i64, nanos: u32) -> Self {
        Self { seconds, nanos }
    }

    pub fn now() -> Self {
        Self::from(SystemTime::now())
    }

    /// Total nanoseconds since the unix epoch.
    pub fn as_nanos(&self) -> i128 {
        self.seconds as i128 * 1_000_000_000 + self.nanos as i128
    }

    pub fn from_nanos(nanos: i128) -> Self {
        Self {
            seconds: nanos.div_euclid(1_000_000_000) as i64,
            nanos: nanos.rem_euclid(1_000_000_000) as u32,
        }
    }

    /// `None` when the result does not fit in the seconds field.
    pub fn checked_add(&self, duration: Duration) -> Option<Self> {
        let nanos = self
            .as_nanos()
            .checked_add(i128::try_from(duration.as_nanos()).ok()?)?;
        let seconds = i64::try_from(nanos.div_euclid(1_000_000_000)).ok()?;
        Some(Self::new(seconds, nanos.rem_euclid(1_000_000_000) as u32))
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(since) => Self::new(since.as_secs() as i64, since.subsec_nanos()),
            Err(before) => Self::from_nanos(-(before.duration().as_nanos() as i128)),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanos)
    }
}

/// External handle of a transaction: who pays for it and when it becomes valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId {
    pub payer: AccountId,
    pub valid_start: Timestamp,
    pub scheduled: bool,
}

impl TransactionId {
    pub const fn with_valid_start(payer: AccountId, valid_start: Timestamp) -> Self {
        Self {
            payer,
            valid_start,
            scheduled: false,
        }
    }

    /// Generates an ID for `payer` from the current wall clock.
    ///
    /// IDs issued through this function are unique per payer within the
    /// process: a clash with a previously issued valid start is resolved by
    /// moving forward one nanosecond.
    pub fn generate(payer: AccountId) -> Self {
        static GENERATOR: OnceLock<TransactionIdGenerator> = OnceLock::new();

        GENERATOR
            .get_or_init(|| TransactionIdGenerator::new(CollisionPolicy::Regenerate))
            .generate_at(payer, Timestamp::now())
            .unwrap_or_else(|_| Self::with_valid_start(payer, Timestamp::now()))
    }

    pub fn scheduled(mut self, scheduled: bool) -> Self {
        self.scheduled = scheduled;
        self
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.payer, self.valid_start)?;
        if self.scheduled {
            f.write_str("?scheduled")?;
        }
        Ok(())
    }
}

impl FromStr for TransactionId {
    type Err = HedraError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || HedraError::BasicParse(format!("invalid TransactionId `{}`", s));

        let (rest, scheduled) = match s.strip_suffix("?scheduled") {
            Some(rest) => (rest, true),
            None => (s, false),
        };

        let (payer, start) = rest.split_once('@').ok_or_else(invalid)?;
        let (seconds, nanos) = start.split_once('.').ok_or_else(invalid)?;

        let payer = payer.parse::<AccountId>()?;
        let seconds = seconds.parse::<i64>().map_err(|_| invalid())?;
        let nanos = nanos.parse::<u32>().map_err(|_| invalid())?;
        if nanos >= 1_000_000_000 {
            return Err(invalid());
        }

        Ok(Self {
            payer,
            valid_start: Timestamp::new(seconds, nanos),
            scheduled,
        })
    }
}

/// What [`TransactionIdGenerator`] does when the clock yields a valid start
/// that was already issued for the same payer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    /// Move the valid start forward past the last issued one.
    #[default]
    Regenerate,
    /// Refuse with [`HedraError::TransactionIdCollision`].
    Error,
}

/// Issues transaction IDs that never repeat a valid start for the same payer.
#[derive(Debug, Default)]
pub struct TransactionIdGenerator {
    policy: CollisionPolicy,
    last_issued: Mutex<HashMap<AccountId, Timestamp>>,
}

impl TransactionIdGenerator {
    pub fn new(policy: CollisionPolicy) -> Self {
        Self {
            policy,
            last_issued: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> CollisionPolicy {
        self.policy
    }

    pub fn generate(&self, payer: AccountId) -> Result<TransactionId> {
        self.generate_at(payer, Timestamp::now())
    }

    /// Issues an ID for `payer` using `now` as the candidate valid start.
    pub fn generate_at(&self, payer: AccountId, now: Timestamp) -> Result<TransactionId> {
        let mut last_issued = self.last_issued.lock();

        let valid_start = match last_issued.get(&payer) {
            Some(last) if now <= *last => match self.policy {
                CollisionPolicy::Regenerate => Timestamp::from_nanos(last.as_nanos() + 1),
                CollisionPolicy::Error => {
                    return Err(HedraError::TransactionIdCollision(
                        TransactionId::with_valid_start(payer, now),
                    ))
                }
            },
            _ => now,
        };

        last_issued.insert(payer, valid_start);
        Ok(TransactionId::with_valid_start(payer, valid_start))
    }
}
