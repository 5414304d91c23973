use crate::{
    config::ClientConfig,
    deployment::DeploymentArtifact,
    ledger::{
        Address,
        LedgerClient,
        NetworkId,
        Receipt,
        SendOptions,
        methods,
    },
    snapshot::{
        GameConstants,
        RoundWindow,
        Ticket,
    },
    store::{
        GameStateStore,
        Scheduler,
    },
    submission::TicketSubmission,
    units::Amount,
};
use color_eyre::eyre::{
    Result,
    bail,
    eyre,
};
use futures::{
    StreamExt,
    stream::BoxStream,
};
use serde_json::{
    Value,
    json,
};
use std::{
    collections::{
        HashMap,
        HashSet,
    },
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
    time::Duration,
};
use tokio::sync::{
    mpsc,
    oneshot,
};
use tokio_stream::wrappers::UnboundedReceiverStream;

pub const CONTRACT_ADDRESS: &str = "0x5b1869D9A4C187F2EAa108f3062412ecf0526b24";
pub const ALICE: &str = "0x627306090abaB3A6e1400e9345bC60c78a8BEf57";
pub const LOCAL_NETWORK_ID: NetworkId = 5777;

pub const NET_VERSION: &str = "net_version";
pub const RESOLVE_DEPLOYMENT: &str = "resolveDeployment";

const REJECTED_SIGNATURE: &str = "User denied transaction signature.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinishedRoundFixture {
    pub jackpot: Amount,
    pub draw_block: u64,
    pub winners: Vec<String>,
}

/// A write the fake was asked to perform, accepted or not.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteRecord {
    pub method: String,
    pub args: Vec<Value>,
    pub from: Address,
    pub value: Option<Amount>,
    pub accepted: bool,
}

/// The ledger as the fake sees it. Tests edit it through [`FakeLedger::update`].
#[derive(Clone, Debug)]
pub struct LedgerState {
    pub reachable: bool,
    pub network_id: NetworkId,
    pub deployments: DeploymentArtifact,
    pub accounts: Vec<Address>,
    pub balances: HashMap<Address, Amount>,
    pub block_number: u64,
    pub constants: GameConstants,
    pub game_ended: bool,
    pub number_drawable: bool,
    pub jackpot: Amount,
    pub round_window: RoundWindow,
    pub tickets: HashMap<Address, Vec<Ticket>>,
    pub finished_rounds: Vec<FinishedRoundFixture>,
    /// Winners recorded for the round the next `endGame` closes.
    pub next_winners: Vec<String>,
    pub reject_writes: bool,
    pub failing_reads: HashSet<String>,
}

impl Default for LedgerState {
    fn default() -> Self {
        let mut deployments = DeploymentArtifact::new("Lottery");
        deployments.record(LOCAL_NETWORK_ID, &Address::new(CONTRACT_ADDRESS));
        let alice = Address::new(ALICE);
        Self {
            reachable: true,
            network_id: LOCAL_NETWORK_ID,
            deployments,
            accounts: vec![alice.clone()],
            balances: HashMap::from([(alice, Amount::from_display_units(100))]),
            block_number: 10,
            constants: GameConstants {
                max_number: 49,
                min_number: 1,
                numbers_per_ticket: 6,
            },
            game_ended: false,
            number_drawable: false,
            jackpot: Amount::ZERO,
            round_window: RoundWindow {
                start_block: 1,
                end_block: 20,
                draw_block: 25,
            },
            tickets: HashMap::new(),
            finished_rounds: Vec::new(),
            next_winners: Vec::new(),
            reject_writes: false,
            failing_reads: HashSet::new(),
        }
    }
}

impl LedgerState {
    fn check_read(&self, method: &str) -> Result<()> {
        if !self.reachable {
            bail!("connection refused");
        }
        if self.failing_reads.contains(method) {
            bail!("{method} timed out");
        }
        Ok(())
    }

    fn check_contract(&self, contract: &Address) -> Result<()> {
        match self.deployments.resolve(self.network_id) {
            Some(deployed) if &deployed == contract => Ok(()),
            _ => bail!("no contract code at {contract}"),
        }
    }

    fn tickets_of(&self, from: Option<&Address>) -> &[Ticket] {
        from.and_then(|address| self.tickets.get(address))
            .map_or(&[][..], Vec::as_slice)
    }

    fn finished_round(&self, args: &[Value]) -> Result<&FinishedRoundFixture> {
        let index = index_arg(args)?;
        self.finished_rounds
            .get(index)
            .ok_or_else(|| eyre!("finished round {index} does not exist"))
    }

    fn read_contract(
        &self,
        method: &str,
        args: &[Value],
        from: Option<&Address>,
    ) -> Result<Value> {
        let value = match method {
            methods::HAS_GAME_ENDED => json!(self.game_ended),
            methods::IS_NUMBER_DRAWABLE => json!(self.number_drawable),
            methods::MAX_NUMBER => json!(self.constants.max_number),
            methods::MIN_NUMBER => json!(self.constants.min_number),
            methods::NUMBERS_PER_TICKET => json!(self.constants.numbers_per_ticket),
            methods::MY_TICKET_COUNT => json!(self.tickets_of(from).len()),
            methods::MY_TICKET_NUMBERS => {
                let index = index_arg(args)?;
                let ticket = self
                    .tickets_of(from)
                    .get(index)
                    .ok_or_else(|| eyre!("ticket {index} does not exist"))?;
                json!(ticket)
            }
            methods::JACKPOT => json!(self.jackpot.base_units().to_string()),
            methods::CURRENT_GAME => json!({
                "startBlock": self.round_window.start_block,
                "endBlock": self.round_window.end_block,
                "drawBlock": self.round_window.draw_block,
            }),
            methods::FINISHED_GAME_COUNT => json!(self.finished_rounds.len()),
            methods::FINISHED_GAMES => {
                let round = self.finished_round(args)?;
                json!({
                    "jackpot": round.jackpot.base_units().to_string(),
                    "drawBlock": round.draw_block,
                })
            }
            methods::WINNERS => json!(self.finished_round(args)?.winners),
            other => bail!("unknown contract method {other}"),
        };
        Ok(value)
    }

    fn apply_write(&mut self, method: &str, args: &[Value], options: &SendOptions) -> Result<()> {
        match method {
            methods::BUY_TICKET => {
                let numbers = args
                    .first()
                    .and_then(Value::as_array)
                    .ok_or_else(|| eyre!("buyTicket expects a list of numbers"))?
                    .iter()
                    .map(|number| number.as_u64().ok_or_else(|| eyre!("bad number {number}")))
                    .collect::<Result<Vec<_>>>()?;
                let paid = options.value.unwrap_or(Amount::ZERO);
                self.tickets
                    .entry(options.from.clone())
                    .or_default()
                    .push(numbers);
                self.jackpot = self.jackpot.checked_add(paid).unwrap_or(self.jackpot);
                if let Some(balance) = self.balances.get_mut(&options.from) {
                    *balance = Amount::from_base_units(
                        balance.base_units().saturating_sub(paid.base_units()),
                    );
                }
            }
            methods::END_GAME => self.close_round(),
            methods::SKIP_BLOCK => {}
            other => bail!("unknown contract method {other}"),
        }
        Ok(())
    }

    fn close_round(&mut self) {
        let window = self.round_window;
        self.finished_rounds.push(FinishedRoundFixture {
            jackpot: self.jackpot,
            draw_block: window.draw_block,
            winners: std::mem::take(&mut self.next_winners),
        });
        self.jackpot = Amount::ZERO;
        self.tickets.clear();
        self.game_ended = false;
        self.number_drawable = false;
        let start_block = self.block_number + 1;
        let end_block = start_block + window.end_block.saturating_sub(window.start_block);
        self.round_window = RoundWindow {
            start_block,
            end_block,
            draw_block: end_block + window.draw_block.saturating_sub(window.end_block),
        };
    }
}

fn index_arg(args: &[Value]) -> Result<usize> {
    args.first()
        .and_then(Value::as_u64)
        .and_then(|index| usize::try_from(index).ok())
        .ok_or_else(|| eyre!("expected an index argument, got {args:?}"))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Hold {
    reached: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

/// A read parked by [`FakeLedger::hold_next`]. Its response is computed when
/// the call arrives and handed back only after [`HeldRead::release`] (or drop).
pub struct HeldRead {
    reached: Option<oneshot::Receiver<()>>,
    release: Option<oneshot::Sender<()>>,
}

impl HeldRead {
    pub async fn reached(&mut self) {
        if let Some(reached) = self.reached.take() {
            let _ = reached.await;
        }
    }

    pub fn release(&mut self) {
        if let Some(release) = self.release.take() {
            let _ = release.send(());
        }
    }
}

/// In-memory ledger that answers the lottery contract's methods from a
/// [`LedgerState`] and counts every call it receives.
#[derive(Default)]
pub struct FakeLedger {
    state: Mutex<LedgerState>,
    calls: Mutex<HashMap<String, usize>>,
    writes: Mutex<Vec<WriteRecord>>,
    holds: Mutex<HashMap<String, Hold>>,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: LedgerState) -> Self {
        Self {
            state: Mutex::new(state),
            ..Self::default()
        }
    }

    pub fn update(&self, edit: impl FnOnce(&mut LedgerState)) {
        edit(&mut lock(&self.state));
    }

    pub fn state(&self) -> LedgerState {
        lock(&self.state).clone()
    }

    pub fn calls(&self, method: &str) -> usize {
        lock(&self.calls).get(method).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).values().sum()
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        lock(&self.writes).clone()
    }

    /// Parks the next call to `method` until the returned handle releases it.
    pub fn hold_next(&self, method: &str) -> HeldRead {
        let (reached_tx, reached_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        lock(&self.holds).insert(
            method.to_string(),
            Hold {
                reached: reached_tx,
                release: release_rx,
            },
        );
        HeldRead {
            reached: Some(reached_rx),
            release: Some(release_tx),
        }
    }

    fn record_call(&self, method: &str) {
        *lock(&self.calls).entry(method.to_string()).or_default() += 1;
    }

    async fn respond<T>(&self, method: &str, response: Result<T>) -> Result<T> {
        let hold = lock(&self.holds).remove(method);
        if let Some(hold) = hold {
            let _ = hold.reached.send(());
            let _ = hold.release.await;
        }
        response
    }

    fn read(&self, method: &str, read: impl FnOnce(&LedgerState) -> Result<Value>) -> Result<Value> {
        let state = lock(&self.state);
        state.check_read(method)?;
        read(&state)
    }

    fn write(
        &self,
        contract: &Address,
        method: &str,
        args: &[Value],
        options: &SendOptions,
    ) -> Result<Receipt> {
        let mut state = lock(&self.state);
        if !state.reachable {
            bail!("connection refused");
        }
        state.check_contract(contract)?;
        let accepted = !state.reject_writes;
        let mut writes = lock(&self.writes);
        writes.push(WriteRecord {
            method: method.to_string(),
            args: args.to_vec(),
            from: options.from.clone(),
            value: options.value,
            accepted,
        });
        if !accepted {
            bail!("{REJECTED_SIGNATURE}");
        }
        state.apply_write(method, args, options)?;
        state.block_number += 1;
        Ok(Receipt {
            transaction_hash: format!("0x{:064x}", writes.len()),
            block_number: state.block_number,
        })
    }
}

impl LedgerClient for FakeLedger {
    async fn network_id(&self) -> Result<NetworkId> {
        self.record_call(NET_VERSION);
        let response = self
            .read(NET_VERSION, |state| Ok(json!(state.network_id)))
            .and_then(|value| value.as_u64().ok_or_else(|| eyre!("bad network id")));
        self.respond(NET_VERSION, response).await
    }

    async fn resolve_deployment(&self, network_id: NetworkId) -> Result<Option<Address>> {
        self.record_call(RESOLVE_DEPLOYMENT);
        let response = {
            let state = lock(&self.state);
            state
                .check_read(RESOLVE_DEPLOYMENT)
                .map(|()| state.deployments.resolve(network_id))
        };
        self.respond(RESOLVE_DEPLOYMENT, response).await
    }

    async fn call(
        &self,
        contract: &Address,
        method: &str,
        args: &[Value],
        from: Option<&Address>,
    ) -> Result<Value> {
        self.record_call(method);
        let response = self.read(method, |state| {
            state.check_contract(contract)?;
            state.read_contract(method, args, from)
        });
        self.respond(method, response).await
    }

    async fn send(
        &self,
        contract: &Address,
        method: &str,
        args: &[Value],
        options: SendOptions,
    ) -> Result<Receipt> {
        self.record_call(method);
        let response = self.write(contract, method, args, &options);
        self.respond(method, response).await
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        self.record_call(methods::GET_ACCOUNTS);
        let response = {
            let state = lock(&self.state);
            state
                .check_read(methods::GET_ACCOUNTS)
                .map(|()| state.accounts.clone())
        };
        self.respond(methods::GET_ACCOUNTS, response).await
    }

    async fn balance(&self, address: &Address) -> Result<u128> {
        self.record_call(methods::GET_BALANCE);
        let response = {
            let state = lock(&self.state);
            state.check_read(methods::GET_BALANCE).map(|()| {
                state
                    .balances
                    .get(address)
                    .map_or(0, |balance| balance.base_units())
            })
        };
        self.respond(methods::GET_BALANCE, response).await
    }

    async fn block_number(&self) -> Result<u64> {
        self.record_call(methods::GET_BLOCK_NUMBER);
        let response = {
            let state = lock(&self.state);
            state
                .check_read(methods::GET_BLOCK_NUMBER)
                .map(|()| state.block_number)
        };
        self.respond(methods::GET_BLOCK_NUMBER, response).await
    }
}

/// Scheduler driven by hand: every [`ManualScheduler::tick`] fires one tick on
/// each live stream.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    senders: Arc<Mutex<Vec<mpsc::UnboundedSender<()>>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&self) {
        lock(&self.senders).retain(|sender| sender.send(()).is_ok());
    }
}

impl Scheduler for ManualScheduler {
    fn ticks(&self, _period: Duration) -> BoxStream<'static, ()> {
        let (sender, receiver) = mpsc::unbounded_channel();
        lock(&self.senders).push(sender);
        UnboundedReceiverStream::new(receiver).boxed()
    }
}

/// An initialized store and submission surface over a [`FakeLedger`], ticked
/// by a [`ManualScheduler`].
pub struct TestContext {
    ledger: Arc<FakeLedger>,
    scheduler: ManualScheduler,
    submission: TicketSubmission<FakeLedger, ManualScheduler>,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_ledger(FakeLedger::new()).await
    }

    pub async fn with_ledger(ledger: FakeLedger) -> Self {
        Self::with_config(ledger, ClientConfig::default()).await
    }

    pub async fn with_config(ledger: FakeLedger, config: ClientConfig) -> Self {
        let ledger = Arc::new(ledger);
        let scheduler = ManualScheduler::new();
        let store = GameStateStore::with_scheduler(ledger.clone(), scheduler.clone(), config);
        store.initialize().await.unwrap();
        Self {
            ledger,
            scheduler,
            submission: TicketSubmission::new(store),
        }
    }

    pub fn ledger(&self) -> &FakeLedger {
        &self.ledger
    }

    pub fn scheduler(&self) -> &ManualScheduler {
        &self.scheduler
    }

    pub fn store(&self) -> &GameStateStore<FakeLedger, ManualScheduler> {
        self.submission.store()
    }

    pub fn submission(&self) -> &TicketSubmission<FakeLedger, ManualScheduler> {
        &self.submission
    }
}
