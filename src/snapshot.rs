use crate::{
    ledger::Address,
    units::Amount,
};
use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Ticket rules published by the contract. Fetched once per session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConstants {
    pub max_number: u64,
    pub min_number: u64,
    pub numbers_per_ticket: usize,
}

impl GameConstants {
    pub fn contains(&self, number: u64) -> bool {
        (self.min_number..=self.max_number).contains(&number)
    }
}

/// Block heights bounding the currently active round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundWindow {
    pub start_block: u64,
    pub end_block: u64,
    pub draw_block: u64,
}

pub type Ticket = Vec<u64>;

/// One winning ticket of a finished round. A round with three winners yields
/// three records sharing the round's jackpot, draw block and winner count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerRecord {
    pub round_index: u64,
    pub jackpot_at_draw: Amount,
    pub winner_count: usize,
    pub winner_handle: String,
    pub draw_block: u64,
}

/// Everything the UI renders, as read by a single refresh.
///
/// A snapshot is never edited in place: each refresh builds a new one and the
/// store swaps it in whole. `sequence` is the number of the refresh that
/// produced it; the empty snapshot a store starts with has sequence 0.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub sequence: u64,
    pub fetched_at: Option<DateTime<Utc>>,
    pub constants: Option<GameConstants>,
    pub accounts: Vec<Address>,
    pub active_account: Option<Address>,
    pub active_account_balance: Amount,
    pub jackpot: Amount,
    pub current_block: u64,
    pub round_window: RoundWindow,
    pub game_ended: bool,
    pub is_number_drawable: bool,
    pub tickets: Vec<Ticket>,
    pub previous_winners: Vec<WinnerRecord>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_populated(&self) -> bool {
        self.sequence > 0
    }
}
