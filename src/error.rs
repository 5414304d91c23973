use crate::{
    ledger::NetworkId,
    store::Lifecycle,
};
use color_eyre::eyre::Report;
use std::fmt;
use thiserror::Error;

/// User-initiated write, used to label rejections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Intent {
    BuyTicket,
    EndGame,
    SkipBlock,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Intent::BuyTicket => "Buy Ticket",
            Intent::EndGame => "End Game",
            Intent::SkipBlock => "Skip Block",
        };
        f.write_str(name)
    }
}

/// How a failure should be surfaced to the player.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notice {
    Info,
    Error,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to load web3, accounts, or contract: {0}")]
    LedgerUnavailable(Report),
    #[error("no lottery deployment recorded for network {network_id}")]
    DeploymentNotFound { network_id: NetworkId },
    #[error("Game has ended!")]
    RoundClosed,
    #[error("Please select {expected} {}.", noun(.expected))]
    WrongTicketSize { expected: usize, actual: usize },
    #[error("All numbers must be between {min} and {max}!")]
    NumberOutOfRange { min: u64, max: u64 },
    #[error("Game is still running!")]
    RoundStillRunning,
    #[error("Game is not ready to draw!")]
    NotYetDrawable,
    #[error("{intent} rejected - no data was sent")]
    WriteRejected { intent: Intent, report: Report },
    #[error("ledger call `{method}` failed: {report}")]
    Ledger { method: &'static str, report: Report },
    #[error("unexpected value from `{method}`: {reason}")]
    Decode { method: &'static str, reason: String },
    #[error("game state store is {0}")]
    NotReady(Lifecycle),
    #[error("no wallet account available")]
    NoActiveAccount,
}

fn noun(count: &usize) -> &'static str {
    if *count == 1 { "number" } else { "numbers" }
}

impl Error {
    /// Local validation failures: nothing was sent to the ledger and the player
    /// can recover by changing their input or waiting.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::RoundClosed
                | Error::WrongTicketSize { .. }
                | Error::NumberOutOfRange { .. }
                | Error::RoundStillRunning
                | Error::NotYetDrawable
        )
    }

    pub fn notice(&self) -> Notice {
        match self {
            Error::RoundClosed | Error::RoundStillRunning | Error::NotYetDrawable => {
                Notice::Info
            }
            _ => Notice::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use color_eyre::eyre::eyre;

    #[test]
    fn display__wrong_ticket_size__pluralizes_expected_count() {
        let one = Error::WrongTicketSize {
            expected: 1,
            actual: 2,
        };
        let six = Error::WrongTicketSize {
            expected: 6,
            actual: 5,
        };
        assert_eq!(one.to_string(), "Please select 1 number.");
        assert_eq!(six.to_string(), "Please select 6 numbers.");
    }

    #[test]
    fn display__number_out_of_range__reports_bounds() {
        let err = Error::NumberOutOfRange { min: 1, max: 49 };
        assert_eq!(err.to_string(), "All numbers must be between 1 and 49!");
    }

    #[test]
    fn display__write_rejected__names_the_intent() {
        let err = Error::WriteRejected {
            intent: Intent::EndGame,
            report: eyre!("user denied transaction signature"),
        };
        assert_eq!(err.to_string(), "End Game rejected - no data was sent");
    }

    #[test]
    fn notice__round_state_failures_are_informational() {
        assert_eq!(Error::RoundClosed.notice(), Notice::Info);
        assert_eq!(Error::RoundStillRunning.notice(), Notice::Info);
        assert_eq!(Error::NotYetDrawable.notice(), Notice::Info);
        assert_eq!(
            Error::NumberOutOfRange { min: 1, max: 2 }.notice(),
            Notice::Error
        );
    }

    #[test]
    fn is_validation__excludes_ledger_failures() {
        assert!(Error::RoundClosed.is_validation());
        assert!(!Error::NoActiveAccount.is_validation());
        assert!(
            !Error::Ledger {
                method: "getJackpot",
                report: eyre!("timeout"),
            }
            .is_validation()
        );
    }
}
