//! # Protocol Configuration & Constants
//!
//! Every tunable number in VaultPay lives here. Engine-level knobs that an
//! operator may want to change at startup are grouped in [`EngineConfig`];
//! everything else is a compile-time constant.

use serde::{Deserialize, Serialize};

use crate::money::Amount;

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// The protocol version string reported by the node.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// ISO code of the single currency the service settles in.
pub const CURRENCY_CODE: &str = "KSH";

/// Decimal places of [`CURRENCY_CODE`]. Amounts are stored in minor units.
pub const CURRENCY_DECIMALS: u32 = 2;

/// Minor units per whole currency unit (`10^CURRENCY_DECIMALS`).
pub const MINOR_UNITS_PER_MAJOR: u64 = 100;

/// Balance credited to every new account: KSH 1,000.00.
pub const DEFAULT_STARTING_BALANCE: Amount = Amount::from_minor(1_000 * MINOR_UNITS_PER_MAJOR);

// ---------------------------------------------------------------------------
// Escrow Rules
// ---------------------------------------------------------------------------

/// Minimum number of release conditions on an escrow transaction.
pub const MIN_CONDITIONS: usize = 1;

/// Time limit applied when the sender does not pick one.
pub const DEFAULT_TIME_LIMIT_HOURS: u32 = 48;

/// Milliseconds in one hour. Deadlines are computed in milliseconds.
pub const MS_PER_HOUR: i64 = 60 * 60 * 1000;

// ---------------------------------------------------------------------------
// Trust Score
// ---------------------------------------------------------------------------

/// Score assigned to an account with no history.
pub const TRUST_BASELINE: u32 = 100;

/// Upper clamp for the trust score.
pub const TRUST_MAX: u32 = 200;

/// Maximum points a single score component can add or remove.
pub const TRUST_COMPONENT_WEIGHT: f64 = 50.0;

/// Number of completed transactions at which the volume bonus saturates.
pub const TRUST_VOLUME_SATURATION: f64 = 20.0;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Prefix of public account lookup codes.
pub const VAULT_ID_PREFIX: &str = "VID-";

/// Random characters after [`VAULT_ID_PREFIX`].
pub const VAULT_ID_LENGTH: usize = 8;

/// Prefix of public transaction reference codes.
pub const VTID_PREFIX: &str = "VTID-";

/// Random characters after [`VTID_PREFIX`].
pub const VTID_LENGTH: usize = 10;

/// Alphabet for public codes. `0/O` and `1/I` are left out so codes survive
/// being read aloud over the phone.
pub const CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// How many times a generator retries after hitting an existing code.
pub const MAX_CODE_ATTEMPTS: usize = 16;

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Default port for the REST/WebSocket API.
pub const DEFAULT_API_PORT: u16 = 9841;

/// Default port for the Prometheus metrics endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Runtime settings for the escrow engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Balance given to each newly registered account.
    pub starting_balance: Amount,
    /// Time limit used when a send request omits one.
    pub default_time_limit_hours: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            starting_balance: DEFAULT_STARTING_BALANCE,
            default_time_limit_hours: DEFAULT_TIME_LIMIT_HOURS,
        }
    }
}
