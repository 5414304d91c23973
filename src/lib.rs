//! Client-side core of the MegaLottery game: mirrors the on-ledger lottery
//! contract into a refreshable snapshot and submits player actions.

pub mod config;
pub mod deployment;
pub mod error;
pub mod error_state;
pub mod ledger;
pub mod logging;
pub mod snapshot;
pub mod store;
pub mod submission;
pub mod units;
pub mod winners;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use config::{
    ClientConfig,
    RefreshOrdering,
};
pub use error::{
    Error,
    Intent,
};
pub use ledger::{
    Address,
    LedgerClient,
    LotteryContract,
};
pub use snapshot::Snapshot;
pub use store::{
    GameStateStore,
    Lifecycle,
    RefreshOutcome,
};
pub use submission::TicketSubmission;
