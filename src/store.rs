//! Mirrors ledger state into an immutable [`Snapshot`] and keeps it fresh.
//!
//! Lifecycle: `Uninitialized → Ready | Degraded(NoDeployment) → TornDown`.
//! Every refresh builds a complete snapshot off to the side and publishes it
//! with a single swap, so readers never observe a half-updated view. Refreshes
//! may overlap; each carries a sequence number and, under
//! [`RefreshOrdering::DiscardStale`], a result older than the published
//! snapshot is dropped instead of overwriting newer data.

use crate::{
    config::{
        ClientConfig,
        RefreshOrdering,
    },
    error::Error,
    error_state::{
        ErrorModal,
        ErrorState,
    },
    ledger::{
        LedgerClient,
        LotteryContract,
        methods,
    },
    snapshot::{
        GameConstants,
        Snapshot,
    },
    units::Amount,
    winners::WinnerAggregator,
};
use chrono::Utc;
use futures::{
    StreamExt,
    stream::BoxStream,
};
use std::{
    fmt,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        OnceLock,
        PoisonError,
        atomic::{
            AtomicU64,
            Ordering,
        },
    },
    time::Duration,
};
use tokio::{
    sync::{
        oneshot,
        watch,
    },
    time::{
        self,
        MissedTickBehavior,
    },
};
use tokio_stream::wrappers::IntervalStream;
use tracing::{
    debug,
    info,
    warn,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DegradedReason {
    NoDeployment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Ready,
    Degraded(DegradedReason),
    TornDown,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Uninitialized => f.write_str("uninitialized"),
            Lifecycle::Ready => f.write_str("ready"),
            Lifecycle::Degraded(DegradedReason::NoDeployment) => {
                f.write_str("degraded (no deployment on this network)")
            }
            Lifecycle::TornDown => f.write_str("torn down"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    Published { sequence: u64 },
    /// A newer snapshot was already published when this result arrived.
    Discarded { sequence: u64, current: u64 },
    /// The store was not `Ready`; nothing was read or published.
    Skipped(Lifecycle),
}

/// Source of periodic refresh ticks.
pub trait Scheduler: Send + Sync + 'static {
    fn ticks(&self, period: Duration) -> BoxStream<'static, ()>;
}

/// Ticks on the tokio clock. The first tick fires one full period after the
/// stream is created.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn ticks(&self, period: Duration) -> BoxStream<'static, ()> {
        let mut interval = time::interval_at(time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        IntervalStream::new(interval).map(|_| ()).boxed()
    }
}

pub(crate) struct Session<L> {
    pub(crate) contract: LotteryContract<L>,
    pub(crate) constants: GameConstants,
}

struct StoreInner<L, S> {
    ledger: Arc<L>,
    scheduler: S,
    config: ClientConfig,
    lifecycle: Mutex<Lifecycle>,
    session: OnceLock<Session<L>>,
    init_lock: tokio::sync::Mutex<()>,
    next_sequence: AtomicU64,
    snapshot: watch::Sender<Arc<Snapshot>>,
    errors: watch::Sender<ErrorState>,
    poller: Mutex<Option<oneshot::Sender<()>>>,
}

pub struct GameStateStore<L, S = TokioScheduler> {
    inner: Arc<StoreInner<L, S>>,
}

impl<L, S> Clone for GameStateStore<L, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<L: LedgerClient> GameStateStore<L, TokioScheduler> {
    pub fn new(ledger: Arc<L>, config: ClientConfig) -> Self {
        Self::with_scheduler(ledger, TokioScheduler, config)
    }
}

impl<L: LedgerClient, S: Scheduler> GameStateStore<L, S> {
    pub fn with_scheduler(ledger: Arc<L>, scheduler: S, config: ClientConfig) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Snapshot::empty()));
        let (errors, _) = watch::channel(ErrorState::hidden());
        Self {
            inner: Arc::new(StoreInner {
                ledger,
                scheduler,
                config,
                lifecycle: Mutex::new(Lifecycle::Uninitialized),
                session: OnceLock::new(),
                init_lock: tokio::sync::Mutex::new(()),
                next_sequence: AtomicU64::new(0),
                snapshot,
                errors,
                poller: Mutex::new(None),
            }),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *lock(&self.inner.lifecycle)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.inner.snapshot.subscribe()
    }

    pub fn constants(&self) -> Option<GameConstants> {
        self.inner.session.get().map(|session| session.constants)
    }

    pub fn error_state(&self) -> ErrorState {
        self.inner.errors.borrow().clone()
    }

    pub fn subscribe_errors(&self) -> watch::Receiver<ErrorState> {
        self.inner.errors.subscribe()
    }

    pub fn dismiss_error(&self) {
        self.inner.errors.send_if_modified(|state| {
            let was_shown = state.shown();
            *state = ErrorState::hidden();
            was_shown
        });
    }

    pub(crate) fn record_error(&self, modal: ErrorModal) {
        if self.lifecycle() == Lifecycle::TornDown {
            return;
        }
        self.inner.errors.send_replace(ErrorState::showing(modal));
    }

    pub(crate) fn session(&self) -> Result<&Session<L>, Error> {
        let lifecycle = self.lifecycle();
        match (lifecycle, self.inner.session.get()) {
            (Lifecycle::Ready, Some(session)) => Ok(session),
            _ => Err(Error::NotReady(lifecycle)),
        }
    }

    /// Checks the wallet is reachable, resolves the contract, fetches the game
    /// constants, publishes the first snapshot and starts periodic refreshing.
    ///
    /// On `LedgerUnavailable` the store stays `Uninitialized` and may be
    /// initialized again later. On `DeploymentNotFound` it becomes `Degraded`
    /// for good and every refresh is a no-op. Calling this on a `Ready` store
    /// does nothing.
    pub async fn initialize(&self) -> Result<(), Error> {
        let _init = self.inner.init_lock.lock().await;
        match self.lifecycle() {
            Lifecycle::Uninitialized => {}
            Lifecycle::Ready => return Ok(()),
            other => return Err(Error::NotReady(other)),
        }
        self.resolve_session()
            .await
            .inspect_err(|err| warn!(%err, "game state store failed to initialize"))?;

        if let Err(err) = self.refresh().await {
            warn!(?err, "initial refresh failed; polling will retry");
        }
        self.start_poller();
        Ok(())
    }

    async fn resolve_session(&self) -> Result<(), Error> {
        let ledger = &self.inner.ledger;
        let network_id = ledger.network_id().await.map_err(Error::LedgerUnavailable)?;
        ledger.accounts().await.map_err(Error::LedgerUnavailable)?;
        let resolved = ledger
            .resolve_deployment(network_id)
            .await
            .map_err(Error::LedgerUnavailable)?;
        let Some(address) = resolved.filter(|address| !address.is_empty()) else {
            self.leave_uninitialized(Lifecycle::Degraded(DegradedReason::NoDeployment))?;
            warn!(network_id, "no lottery deployment on this network; refreshes disabled");
            return Err(Error::DeploymentNotFound { network_id });
        };

        let contract = LotteryContract::new(ledger.clone(), address.clone());
        let constants = contract.constants().await.map_err(|err| match err {
            Error::Ledger { report, .. } => Error::LedgerUnavailable(report),
            other => other,
        })?;
        let _ = self.inner.session.set(Session {
            contract,
            constants,
        });
        self.leave_uninitialized(Lifecycle::Ready)?;
        info!(%address, network_id, ?constants, "game state store ready");
        Ok(())
    }

    fn leave_uninitialized(&self, next: Lifecycle) -> Result<(), Error> {
        let mut lifecycle = lock(&self.inner.lifecycle);
        if *lifecycle != Lifecycle::Uninitialized {
            return Err(Error::NotReady(*lifecycle));
        }
        *lifecycle = next;
        Ok(())
    }

    /// Reads the full ledger view and publishes it as one snapshot.
    ///
    /// Any failed read aborts the refresh and leaves the published snapshot
    /// untouched. Outside the `Ready` state this returns
    /// [`RefreshOutcome::Skipped`] without touching the ledger.
    pub async fn refresh(&self) -> Result<RefreshOutcome, Error> {
        let session = match self.session() {
            Ok(session) => session,
            Err(Error::NotReady(lifecycle)) => return Ok(RefreshOutcome::Skipped(lifecycle)),
            Err(err) => return Err(err),
        };
        let sequence = self.inner.next_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = self.read_snapshot(session, sequence).await?;
        Ok(self.publish(snapshot))
    }

    async fn read_snapshot(
        &self,
        session: &Session<L>,
        sequence: u64,
    ) -> Result<Snapshot, Error> {
        let contract = &session.contract;
        let ledger = &self.inner.ledger;

        let account_reads = async {
            let accounts = ledger.accounts().await.map_err(|report| Error::Ledger {
                method: methods::GET_ACCOUNTS,
                report,
            })?;
            let active_account = accounts.first().cloned();
            let (balance, tickets) = match &active_account {
                Some(account) => {
                    let balance = async {
                        ledger
                            .balance(account)
                            .await
                            .map(Amount::from_base_units)
                            .map_err(|report| Error::Ledger {
                                method: methods::GET_BALANCE,
                                report,
                            })
                    };
                    futures::try_join!(balance, contract.my_tickets(account))?
                }
                None => (Amount::ZERO, Vec::new()),
            };
            Ok::<_, Error>((accounts, active_account, balance, tickets))
        };
        let block_read = async {
            ledger.block_number().await.map_err(|report| Error::Ledger {
                method: methods::GET_BLOCK_NUMBER,
                report,
            })
        };
        let winners = WinnerAggregator::new(contract);

        let (
            game_ended,
            is_number_drawable,
            (accounts, active_account, active_account_balance, tickets),
            jackpot,
            current_block,
            round_window,
            previous_winners,
        ) = futures::try_join!(
            contract.has_game_ended(),
            contract.is_number_drawable(),
            account_reads,
            contract.jackpot(),
            block_read,
            contract.current_game(),
            winners.aggregate(self.inner.config.winners_to_display),
        )?;

        Ok(Snapshot {
            sequence,
            fetched_at: Some(Utc::now()),
            constants: Some(session.constants),
            accounts,
            active_account,
            active_account_balance,
            jackpot,
            current_block,
            round_window,
            game_ended,
            is_number_drawable,
            tickets,
            previous_winners,
        })
    }

    fn publish(&self, snapshot: Snapshot) -> RefreshOutcome {
        let sequence = snapshot.sequence;
        let ordering = self.inner.config.refresh_ordering;
        let mut outcome = RefreshOutcome::Published { sequence };
        // lock order: watch, then lifecycle
        self.inner.snapshot.send_if_modified(|slot| {
            let state = self.lifecycle();
            if state != Lifecycle::Ready {
                outcome = RefreshOutcome::Skipped(state);
                return false;
            }
            let current = slot.sequence;
            let accept = match ordering {
                RefreshOrdering::DiscardStale => sequence > current,
                RefreshOrdering::LastArrivalWins => true,
            };
            if accept {
                *slot = Arc::new(snapshot);
            } else {
                outcome = RefreshOutcome::Discarded { sequence, current };
            }
            accept
        });

        match outcome {
            RefreshOutcome::Skipped(state) => {
                debug!(sequence, lifecycle = %state, "dropping refresh result");
            }
            RefreshOutcome::Discarded { current, .. } => {
                debug!(sequence, current, "discarding stale refresh result");
            }
            RefreshOutcome::Published { .. } => {}
        }
        outcome
    }

    fn start_poller(&self) {
        let lifecycle = lock(&self.inner.lifecycle);
        if *lifecycle != Lifecycle::Ready {
            return;
        }
        let mut poller = lock(&self.inner.poller);
        if poller.is_some() {
            return;
        }
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let mut ticks = self.inner.scheduler.ticks(self.inner.config.poll_interval());
        // weak, so dropping every store handle also ends the poller
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    tick = ticks.next() => {
                        if tick.is_none() {
                            break;
                        }
                        let Some(inner) = inner.upgrade() else {
                            break;
                        };
                        let store = GameStateStore { inner };
                        tokio::spawn(async move {
                            if let Err(err) = store.refresh().await {
                                warn!(?err, "periodic refresh failed");
                            }
                        });
                    }
                }
            }
            debug!("refresh poller stopped");
        });
        *poller = Some(shutdown_tx);
    }

    /// Stops periodic refreshing. Refreshes and writes still in flight finish
    /// against the ledger but can no longer publish into the store.
    pub fn teardown(&self) {
        let mut lifecycle = lock(&self.inner.lifecycle);
        if *lifecycle == Lifecycle::TornDown {
            return;
        }
        *lifecycle = Lifecycle::TornDown;
        if let Some(shutdown) = lock(&self.inner.poller).take() {
            let _ = shutdown.send(());
        }
        drop(lifecycle);
        info!("game state store torn down");
    }
}
