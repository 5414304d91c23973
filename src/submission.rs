//! Player-initiated writes: buying a ticket, ending a round and (on dev
//! networks) mining an empty block.
//!
//! Preconditions are checked against fresh ledger reads rather than the last
//! snapshot. A failed check sends nothing. Every write that reaches the
//! ledger, accepted or rejected, is followed by a refresh of the store.

use crate::{
    error::{
        Error,
        Intent,
    },
    error_state::ErrorModal,
    ledger::{
        Address,
        LedgerClient,
        LotteryContract,
        Receipt,
    },
    snapshot::GameConstants,
    store::{
        GameStateStore,
        Scheduler,
        Session,
        TokioScheduler,
    },
    units::TICKET_PRICE,
};
use color_eyre::eyre;
use tracing::{
    debug,
    error,
    info,
    warn,
};

/// Checks a ticket against the round's rules: exactly `numbers_per_ticket`
/// numbers, each within `[min_number, max_number]`.
pub fn validate_ticket(constants: &GameConstants, numbers: &[u64]) -> Result<(), Error> {
    if numbers.len() != constants.numbers_per_ticket {
        return Err(Error::WrongTicketSize {
            expected: constants.numbers_per_ticket,
            actual: numbers.len(),
        });
    }
    if numbers.iter().all(|number| constants.contains(*number)) {
        Ok(())
    } else {
        Err(out_of_range(constants))
    }
}

/// Parses raw number entries. An entry that is not a non-negative integer is
/// reported as out of range.
pub fn parse_ticket_input<I: AsRef<str>>(
    constants: &GameConstants,
    raw: &[I],
) -> Result<Vec<u64>, Error> {
    if raw.len() != constants.numbers_per_ticket {
        return Err(Error::WrongTicketSize {
            expected: constants.numbers_per_ticket,
            actual: raw.len(),
        });
    }
    raw.iter()
        .map(|entry| {
            entry
                .as_ref()
                .trim()
                .parse::<u64>()
                .map_err(|_| out_of_range(constants))
        })
        .collect()
}

fn out_of_range(constants: &GameConstants) -> Error {
    Error::NumberOutOfRange {
        min: constants.min_number,
        max: constants.max_number,
    }
}

pub struct TicketSubmission<L, S = TokioScheduler> {
    store: GameStateStore<L, S>,
}

impl<L, S> Clone for TicketSubmission<L, S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<L: LedgerClient, S: Scheduler> TicketSubmission<L, S> {
    pub fn new(store: GameStateStore<L, S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &GameStateStore<L, S> {
        &self.store
    }

    pub async fn buy_ticket(&self, numbers: &[u64]) -> Result<Receipt, Error> {
        let session = self.store.session()?;
        ensure_round_open(&session.contract).await?;
        validate_ticket(&session.constants, numbers)
            .inspect_err(|err| debug!(%err, ?numbers, "ticket refused"))?;
        self.submit_ticket(session, numbers).await
    }

    /// Same as [`Self::buy_ticket`] for numbers still in their typed form.
    pub async fn buy_ticket_from_input<I: AsRef<str> + Sync>(
        &self,
        raw: &[I],
    ) -> Result<Receipt, Error> {
        let session = self.store.session()?;
        ensure_round_open(&session.contract).await?;
        let numbers = parse_ticket_input(&session.constants, raw)
            .inspect_err(|err| debug!(%err, "ticket input refused"))?;
        validate_ticket(&session.constants, &numbers)
            .inspect_err(|err| debug!(%err, ?numbers, "ticket refused"))?;
        self.submit_ticket(session, &numbers).await
    }

    async fn submit_ticket(&self, session: &Session<L>, numbers: &[u64]) -> Result<Receipt, Error> {
        let from = self.active_account()?;
        let outcome = session
            .contract
            .buy_ticket(numbers, &from, TICKET_PRICE)
            .await;
        self.finish(Intent::BuyTicket, outcome).await
    }

    /// Closes the round once it is over and its draw block has been mined.
    pub async fn end_game(&self) -> Result<Receipt, Error> {
        let session = self.store.session()?;
        let contract = &session.contract;
        if !contract.has_game_ended().await? {
            return Err(Error::RoundStillRunning);
        }
        if !contract.is_number_drawable().await? {
            return Err(Error::NotYetDrawable);
        }
        let from = self.active_account()?;
        let outcome = contract.end_game(&from).await;
        self.finish(Intent::EndGame, outcome).await
    }

    /// Mines one block on a development network. No preconditions.
    pub async fn advance_block(&self) -> Result<Receipt, Error> {
        let session = self.store.session()?;
        let from = self.active_account()?;
        let outcome = session.contract.skip_block(&from).await;
        self.finish(Intent::SkipBlock, outcome).await
    }

    fn active_account(&self) -> Result<Address, Error> {
        self.store
            .snapshot()
            .active_account
            .clone()
            .ok_or(Error::NoActiveAccount)
    }

    async fn finish(
        &self,
        intent: Intent,
        outcome: eyre::Result<Receipt>,
    ) -> Result<Receipt, Error> {
        let result = match outcome {
            Ok(receipt) => {
                info!(
                    %intent,
                    transaction = %receipt.transaction_hash,
                    block = receipt.block_number,
                    "write accepted"
                );
                Ok(receipt)
            }
            Err(report) => {
                error!(%intent, error = %report, "write rejected");
                self.store.record_error(ErrorModal::rejected(intent));
                Err(Error::WriteRejected { intent, report })
            }
        };
        if let Err(err) = self.store.refresh().await {
            warn!(?err, %intent, "refresh after write failed");
        }
        result
    }
}

async fn ensure_round_open<L: LedgerClient>(contract: &LotteryContract<L>) -> Result<(), Error> {
    if contract.has_game_ended().await? {
        return Err(Error::RoundClosed);
    }
    Ok(())
}
