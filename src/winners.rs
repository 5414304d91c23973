use crate::{
    error::Error,
    ledger::{
        LedgerClient,
        LotteryContract,
    },
    snapshot::WinnerRecord,
};

pub const DEFAULT_WINNERS_TO_DISPLAY: usize = 4;

/// Builds the "previous winners" list by walking finished rounds newest first.
///
/// Cost is bounded by the budget: scanning stops as soon as `max_results`
/// records are collected, so older rounds are never read. Rounds without
/// winners cost a single `getWinners` read and contribute nothing.
pub struct WinnerAggregator<'a, L> {
    contract: &'a LotteryContract<L>,
}

impl<'a, L: LedgerClient> WinnerAggregator<'a, L> {
    pub fn new(contract: &'a LotteryContract<L>) -> Self {
        Self { contract }
    }

    pub async fn aggregate(&self, max_results: usize) -> Result<Vec<WinnerRecord>, Error> {
        let mut records = Vec::new();
        if max_results == 0 {
            return Ok(records);
        }
        let finished = self.contract.finished_game_count().await?;
        for round_index in (0..finished).rev() {
            let handles = self.contract.winners(round_index).await?;
            if handles.is_empty() {
                continue;
            }
            let round = self.contract.finished_game(round_index).await?;
            let winner_count = handles.len();
            let remaining = max_results - records.len();
            records.extend(handles.into_iter().take(remaining).map(|winner_handle| {
                WinnerRecord {
                    round_index,
                    jackpot_at_draw: round.jackpot,
                    winner_count,
                    winner_handle,
                    draw_block: round.draw_block,
                }
            }));
            if records.len() >= max_results {
                break;
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        ledger::{
            Address,
            methods,
        },
        test_helpers::{
            CONTRACT_ADDRESS,
            FakeLedger,
            FinishedRoundFixture,
        },
        units::Amount,
    };
    use std::sync::Arc;

    fn contract_over(rounds: Vec<FinishedRoundFixture>) -> (Arc<FakeLedger>, LotteryContract<FakeLedger>) {
        let ledger = Arc::new(FakeLedger::new());
        ledger.update(|state| state.finished_rounds = rounds);
        let contract = LotteryContract::new(ledger.clone(), Address::new(CONTRACT_ADDRESS));
        (ledger, contract)
    }

    fn round(jackpot: u64, draw_block: u64, winners: &[&str]) -> FinishedRoundFixture {
        FinishedRoundFixture {
            jackpot: Amount::from_display_units(jackpot),
            draw_block,
            winners: winners.iter().map(|w| w.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn aggregate__newest_first_with_mid_round_truncation() {
        // given
        let (_ledger, contract) = contract_over(vec![
            round(10, 100, &["A", "B"]),
            round(20, 200, &[]),
            round(30, 300, &["C", "D", "E"]),
        ]);

        // when
        let actual = WinnerAggregator::new(&contract).aggregate(4).await.unwrap();

        // then
        let summary: Vec<(String, u64, usize)> = actual
            .iter()
            .map(|r| (r.winner_handle.clone(), r.round_index, r.winner_count))
            .collect();
        let expected = vec![
            ("C".to_string(), 2, 3),
            ("D".to_string(), 2, 3),
            ("E".to_string(), 2, 3),
            ("A".to_string(), 0, 2),
        ];
        assert_eq!(summary, expected);
        assert_eq!(actual[0].jackpot_at_draw, Amount::from_display_units(30));
        assert_eq!(actual[0].draw_block, 300);
        assert_eq!(actual[3].jackpot_at_draw, Amount::from_display_units(10));
        assert_eq!(actual[3].draw_block, 100);
    }

    #[tokio::test]
    async fn aggregate__empty_round_is_visited_but_its_summary_is_not_read() {
        // given
        let (ledger, contract) = contract_over(vec![
            round(10, 100, &["A", "B"]),
            round(20, 200, &[]),
            round(30, 300, &["C", "D", "E"]),
        ]);

        // when
        WinnerAggregator::new(&contract).aggregate(4).await.unwrap();

        // then
        assert_eq!(ledger.calls(methods::WINNERS), 3);
        assert_eq!(ledger.calls(methods::FINISHED_GAMES), 2);
    }

    #[tokio::test]
    async fn aggregate__no_finished_rounds__returns_empty_after_count_read_only() {
        // given
        let (ledger, contract) = contract_over(Vec::new());

        // when
        let actual = WinnerAggregator::new(&contract).aggregate(4).await.unwrap();

        // then
        assert!(actual.is_empty());
        assert_eq!(ledger.calls(methods::FINISHED_GAME_COUNT), 1);
        assert_eq!(ledger.calls(methods::WINNERS), 0);
        assert_eq!(ledger.calls(methods::FINISHED_GAMES), 0);
    }

    #[tokio::test]
    async fn aggregate__budget_filled__older_rounds_are_never_read() {
        // given
        let (ledger, contract) = contract_over(vec![
            round(1, 10, &["old"]),
            round(2, 20, &["older-than-budget"]),
            round(3, 30, &["W1", "W2"]),
        ]);

        // when
        let actual = WinnerAggregator::new(&contract).aggregate(2).await.unwrap();

        // then
        let handles: Vec<&str> = actual.iter().map(|r| r.winner_handle.as_str()).collect();
        assert_eq!(handles, vec!["W1", "W2"]);
        assert_eq!(ledger.calls(methods::WINNERS), 1);
        assert_eq!(ledger.calls(methods::FINISHED_GAMES), 1);
    }

    #[tokio::test]
    async fn aggregate__fewer_winners_than_budget__returns_all_of_them() {
        // given
        let (_ledger, contract) =
            contract_over(vec![round(5, 50, &["X"]), round(6, 60, &[])]);

        // when
        let actual = WinnerAggregator::new(&contract)
            .aggregate(DEFAULT_WINNERS_TO_DISPLAY)
            .await
            .unwrap();

        // then
        assert_eq!(actual.len(), 1);
        assert_eq!(actual[0].winner_handle, "X");
        assert_eq!(actual[0].round_index, 0);
    }

    #[tokio::test]
    async fn aggregate__zero_budget__reads_nothing() {
        let (ledger, contract) = contract_over(vec![round(5, 50, &["X"])]);

        let actual = WinnerAggregator::new(&contract).aggregate(0).await.unwrap();

        assert!(actual.is_empty());
        assert_eq!(ledger.calls(methods::FINISHED_GAME_COUNT), 0);
    }
}
