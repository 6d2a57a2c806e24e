//! The transaction record produced by the generator and consumed by sinks.

use serde::{Deserialize, Serialize};

/// Column names of a [`Transaction`], in serialization order.
///
/// Tabular and columnar outputs both use this order; it matches the field
/// declaration order of the struct so serde-driven writers line up with it.
pub const TRANSACTION_COLUMNS: [&str; 17] = [
    "id",
    "external_transaction_id",
    "vendor_bet_id",
    "round_id",
    "vendor_id",
    "vendor_code",
    "vendor_line_id",
    "game_category_id",
    "house_id",
    "master_agent_id",
    "agent_id",
    "currency_id",
    "currency_code",
    "bet_amount",
    "win_amount",
    "win_loss",
    "settled_at",
];

/// A settled betting transaction.
///
/// Immutable once built. Monetary fields are fixed-point decimal strings
/// with six fractional digits and satisfy `win_loss == win_amount - bet_amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Internal id, `TXN-<YYYYMMDD>-<sequence>`.
    pub id: String,
    pub external_transaction_id: String,
    pub vendor_bet_id: String,
    /// Groups ten consecutive sequence numbers.
    pub round_id: String,
    pub vendor_id: i32,
    pub vendor_code: String,
    pub vendor_line_id: i32,
    pub game_category_id: i32,
    pub house_id: i32,
    pub master_agent_id: i32,
    pub agent_id: i32,
    pub currency_id: i32,
    pub currency_code: String,
    pub bet_amount: String,
    pub win_amount: String,
    pub win_loss: String,
    /// RFC 3339 settlement time (UTC).
    pub settled_at: String,
}

impl Transaction {
    /// Sequence number embedded in the internal id.
    ///
    /// Returns `None` if the id does not end in a numeric segment.
    pub fn sequence(&self) -> Option<u64> {
        self.id.rsplit('-').next()?.parse().ok()
    }
}
