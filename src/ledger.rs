//! The ledger seam: the transport trait the core consumes and a typed wrapper
//! over the lottery contract's fixed method surface.

use crate::{
    error::Error,
    snapshot::{
        GameConstants,
        RoundWindow,
    },
    units::Amount,
};
use color_eyre::eyre::Result;
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::{
    Value,
    json,
};
use std::{
    fmt,
    sync::Arc,
};

pub type NetworkId = u64;

/// Contract method names. These are the wire contract with the deployed
/// lottery and must not change.
pub mod methods {
    pub const HAS_GAME_ENDED: &str = "hasGameEnded";
    pub const IS_NUMBER_DRAWABLE: &str = "isNumberDrawable";
    pub const MAX_NUMBER: &str = "MAX_NUMBER";
    pub const MIN_NUMBER: &str = "MIN_NUMBER";
    pub const NUMBERS_PER_TICKET: &str = "NUMBERS_PER_TICKET";
    pub const MY_TICKET_COUNT: &str = "getMyTicketCountOfCurrentGame";
    pub const MY_TICKET_NUMBERS: &str = "getMyTicketNumbersOfCurrentGame";
    pub const JACKPOT: &str = "getJackpot";
    pub const CURRENT_GAME: &str = "currentGame";
    pub const FINISHED_GAME_COUNT: &str = "getNumberOfFinishedGames";
    pub const FINISHED_GAMES: &str = "finishedGames";
    pub const WINNERS: &str = "getWinners";
    pub const BUY_TICKET: &str = "buyTicket";
    pub const END_GAME: &str = "endGame";
    pub const SKIP_BLOCK: &str = "skipBlock";

    pub const GET_ACCOUNTS: &str = "getAccounts";
    pub const GET_BALANCE: &str = "getBalance";
    pub const GET_BLOCK_NUMBER: &str = "getBlockNumber";
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendOptions {
    pub from: Address,
    pub value: Option<Amount>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: String,
    pub block_number: u64,
}

/// Remote ledger access, as provided by the wallet/RPC layer.
///
/// Reads (`call`) never cost anything; writes (`send`) fail when the signer
/// declines or the network refuses to broadcast. Implementations are shared
/// between the refresh loop and user-initiated writes without client-side
/// locking.
pub trait LedgerClient: Send + Sync + 'static {
    fn network_id(&self) -> impl Future<Output = Result<NetworkId>> + Send;

    fn resolve_deployment(
        &self,
        network_id: NetworkId,
    ) -> impl Future<Output = Result<Option<Address>>> + Send;

    fn call(
        &self,
        contract: &Address,
        method: &str,
        args: &[Value],
        from: Option<&Address>,
    ) -> impl Future<Output = Result<Value>> + Send;

    fn send(
        &self,
        contract: &Address,
        method: &str,
        args: &[Value],
        options: SendOptions,
    ) -> impl Future<Output = Result<Receipt>> + Send;

    fn accounts(&self) -> impl Future<Output = Result<Vec<Address>>> + Send;

    fn balance(&self, address: &Address) -> impl Future<Output = Result<u128>> + Send;

    fn block_number(&self) -> impl Future<Output = Result<u64>> + Send;
}

/// Summary of a finished round as stored by the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FinishedRound {
    pub jackpot: Amount,
    pub draw_block: u64,
}

pub struct LotteryContract<L> {
    ledger: Arc<L>,
    address: Address,
}

impl<L> Clone for LotteryContract<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            address: self.address.clone(),
        }
    }
}

impl<L: LedgerClient> LotteryContract<L> {
    pub fn new(ledger: Arc<L>, address: Address) -> Self {
        Self { ledger, address }
    }

    async fn read(
        &self,
        method: &'static str,
        args: &[Value],
        from: Option<&Address>,
    ) -> Result<Value, Error> {
        self.ledger
            .call(&self.address, method, args, from)
            .await
            .map_err(|report| Error::Ledger { method, report })
    }

    pub async fn has_game_ended(&self) -> Result<bool, Error> {
        let value = self.read(methods::HAS_GAME_ENDED, &[], None).await?;
        decode_bool(methods::HAS_GAME_ENDED, &value)
    }

    pub async fn is_number_drawable(&self) -> Result<bool, Error> {
        let value = self.read(methods::IS_NUMBER_DRAWABLE, &[], None).await?;
        decode_bool(methods::IS_NUMBER_DRAWABLE, &value)
    }

    pub async fn constants(&self) -> Result<GameConstants, Error> {
        let (max_number, min_number, numbers_per_ticket) = futures::try_join!(
            self.read_u64(methods::MAX_NUMBER),
            self.read_u64(methods::MIN_NUMBER),
            self.read_u64(methods::NUMBERS_PER_TICKET),
        )?;
        let numbers_per_ticket =
            usize::try_from(numbers_per_ticket).map_err(|_| Error::Decode {
                method: methods::NUMBERS_PER_TICKET,
                reason: format!("{numbers_per_ticket} does not fit a ticket length"),
            })?;
        Ok(GameConstants {
            max_number,
            min_number,
            numbers_per_ticket,
        })
    }

    async fn read_u64(&self, method: &'static str) -> Result<u64, Error> {
        let value = self.read(method, &[], None).await?;
        decode_u64(method, &value)
    }

    pub async fn my_ticket_count(&self, from: &Address) -> Result<u64, Error> {
        let value = self.read(methods::MY_TICKET_COUNT, &[], Some(from)).await?;
        decode_u64(methods::MY_TICKET_COUNT, &value)
    }

    pub async fn my_ticket_numbers(
        &self,
        index: u64,
        from: &Address,
    ) -> Result<Vec<u64>, Error> {
        let value = self
            .read(methods::MY_TICKET_NUMBERS, &[json!(index)], Some(from))
            .await?;
        decode_u64_list(methods::MY_TICKET_NUMBERS, &value)
    }

    /// Every ticket `from` holds in the current round, one read per ticket.
    pub async fn my_tickets(&self, from: &Address) -> Result<Vec<Vec<u64>>, Error> {
        let count = self.my_ticket_count(from).await?;
        let mut tickets = Vec::new();
        for index in 0..count {
            tickets.push(self.my_ticket_numbers(index, from).await?);
        }
        Ok(tickets)
    }

    pub async fn jackpot(&self) -> Result<Amount, Error> {
        let value = self.read(methods::JACKPOT, &[], None).await?;
        decode_u128(methods::JACKPOT, &value).map(Amount::from_base_units)
    }

    pub async fn current_game(&self) -> Result<RoundWindow, Error> {
        let method = methods::CURRENT_GAME;
        let value = self.read(method, &[], None).await?;
        Ok(RoundWindow {
            start_block: decode_u64(method, field(method, &value, "startBlock")?)?,
            end_block: decode_u64(method, field(method, &value, "endBlock")?)?,
            draw_block: decode_u64(method, field(method, &value, "drawBlock")?)?,
        })
    }

    pub async fn finished_game_count(&self) -> Result<u64, Error> {
        self.read_u64(methods::FINISHED_GAME_COUNT).await
    }

    pub async fn finished_game(&self, index: u64) -> Result<FinishedRound, Error> {
        let method = methods::FINISHED_GAMES;
        let value = self.read(method, &[json!(index)], None).await?;
        Ok(FinishedRound {
            jackpot: Amount::from_base_units(decode_u128(
                method,
                field(method, &value, "jackpot")?,
            )?),
            draw_block: decode_u64(method, field(method, &value, "drawBlock")?)?,
        })
    }

    pub async fn winners(&self, index: u64) -> Result<Vec<String>, Error> {
        let method = methods::WINNERS;
        let value = self.read(method, &[json!(index)], None).await?;
        let items = match value {
            Value::Array(items) => items,
            other => return Err(unexpected(method, &other, "a list of winner handles")),
        };
        items
            .iter()
            .map(|item| match item {
                Value::String(handle) => Ok(handle.clone()),
                other => Err(unexpected(method, other, "a winner handle string")),
            })
            .collect()
    }

    pub async fn buy_ticket(
        &self,
        numbers: &[u64],
        from: &Address,
        price: Amount,
    ) -> Result<Receipt> {
        let numbers = Value::Array(numbers.iter().map(|n| json!(n)).collect());
        let options = SendOptions {
            from: from.clone(),
            value: Some(price),
        };
        self.ledger
            .send(&self.address, methods::BUY_TICKET, &[numbers], options)
            .await
    }

    pub async fn end_game(&self, from: &Address) -> Result<Receipt> {
        let options = SendOptions {
            from: from.clone(),
            value: None,
        };
        self.ledger
            .send(&self.address, methods::END_GAME, &[], options)
            .await
    }

    pub async fn skip_block(&self, from: &Address) -> Result<Receipt> {
        let options = SendOptions {
            from: from.clone(),
            value: None,
        };
        self.ledger
            .send(&self.address, methods::SKIP_BLOCK, &[], options)
            .await
    }
}

fn unexpected(method: &'static str, value: &Value, expected: &str) -> Error {
    Error::Decode {
        method,
        reason: format!("expected {expected}, got {value}"),
    }
}

fn field<'a>(
    method: &'static str,
    value: &'a Value,
    name: &str,
) -> Result<&'a Value, Error> {
    value.get(name).ok_or_else(|| Error::Decode {
        method,
        reason: format!("missing field `{name}` in {value}"),
    })
}

// uint values arrive either as JSON numbers or as decimal/hex strings
pub(crate) fn decode_u128(method: &'static str, value: &Value) -> Result<u128, Error> {
    let parsed = match value {
        Value::Number(number) => number.as_u64().map(u128::from),
        Value::String(raw) => {
            let raw = raw.trim();
            match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
                Some(hex) => u128::from_str_radix(hex, 16).ok(),
                None => raw.parse().ok(),
            }
        }
        _ => None,
    };
    parsed.ok_or_else(|| unexpected(method, value, "an unsigned integer"))
}

pub(crate) fn decode_u64(method: &'static str, value: &Value) -> Result<u64, Error> {
    let wide = decode_u128(method, value)?;
    u64::try_from(wide).map_err(|_| unexpected(method, value, "a 64-bit unsigned integer"))
}

pub(crate) fn decode_bool(method: &'static str, value: &Value) -> Result<bool, Error> {
    match value {
        Value::Bool(flag) => Ok(*flag),
        Value::String(raw) if raw == "true" => Ok(true),
        Value::String(raw) if raw == "false" => Ok(false),
        other => Err(unexpected(method, other, "a boolean")),
    }
}

fn decode_u64_list(method: &'static str, value: &Value) -> Result<Vec<u64>, Error> {
    let Value::Array(items) = value else {
        return Err(unexpected(method, value, "a list of numbers"));
    };
    items.iter().map(|item| decode_u64(method, item)).collect()
}
