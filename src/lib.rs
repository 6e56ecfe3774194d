/// Account balances and the rules for debiting and crediting them.
/// Balance changes are expressed as events, produced by validating commands
pub mod account;

/// Validated ledger commands, built from raw caller input.
pub mod command;

/// Runtime knobs: node label, transfer latency, gate and replay policies.
pub mod config;

/// The ledger handle. Serializes mutations behind one lock and applies the
/// node-state gate before touching storage.
pub mod ledger;

/// Append-only transfer log records.
pub mod log;

/// Cosmetic node role label (follower/leader/candidate/failed).
pub mod node;

/// Storage interface, plus "in memory" and CSV file implementations.
///
/// NOTE: the ledger only talks to [`storage::LedgerStorage`], so a real
/// database could be dropped in behind it later.
pub mod storage;

/// Script runner behind the `ledger-node` binary. Kept in the library so
/// integration tests can drive it.
pub mod bin_utils;
