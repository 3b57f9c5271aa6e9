//! Bot Runner - Controller actor and its handle
//!
//! One task owns the bar history, the ledger, the feed connector and the bot
//! state. Commands, ticks, timer firings and reasoning results all arrive as
//! messages and are handled one at a time in arrival order.

use chrono::Utc;
use market_feed::{BarAggregator, BarUpdate, FeedMode, Tick, TickFeed};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::decision::parse_decision;
use crate::indicators::IndicatorSnapshot;
use crate::portfolio::PortfolioLedger;
use crate::reasoning::{ReasoningError, ReasoningService};
use crate::scheduler::DecisionScheduler;
use crate::types::{BotSnapshot, BotState, ChartBar, Decision, DecisionRequest, RiskLevel};

const INBOX_CAPACITY: usize = 64;
const TICK_BUFFER: usize = 256;

/// Failure of a controller command
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BotError {
    #[error("risk level can only change while the bot is inactive (currently {0})")]
    RiskLevelLocked(BotState),

    #[error("bot controller is no longer running")]
    ControllerGone,
}

enum Command {
    Start(oneshot::Sender<FeedMode>),
    Stop(oneshot::Sender<()>),
    SetRiskLevel(RiskLevel, oneshot::Sender<Result<(), BotError>>),
    Snapshot(oneshot::Sender<BotSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

enum Event {
    Command(Command),
    CycleDue {
        generation: u64,
    },
    CycleResolved {
        generation: u64,
        outcome: Result<Decision, ReasoningError>,
    },
}

/// Cloneable handle to a running controller
#[derive(Clone)]
pub struct BotHandle {
    inbox: mpsc::Sender<Event>,
    state: watch::Receiver<BotState>,
}

impl BotHandle {
    /// Connect the feed and begin decision cycles.
    ///
    /// Returns the feed source in use; a no-op if already started.
    pub async fn start(&self) -> Result<FeedMode, BotError> {
        self.request(Command::Start).await
    }

    /// Disarm the scheduler and disconnect the feed. Idempotent.
    pub async fn stop(&self) -> Result<(), BotError> {
        self.request(Command::Stop).await
    }

    /// Rejected unless the bot is inactive
    pub async fn set_risk_level(&self, level: RiskLevel) -> Result<(), BotError> {
        self.request(|reply| Command::SetRiskLevel(level, reply)).await?
    }

    pub async fn snapshot(&self) -> Result<BotSnapshot, BotError> {
        self.request(Command::Snapshot).await
    }

    /// Stop and end the controller task
    pub async fn shutdown(self) -> Result<(), BotError> {
        self.request(Command::Shutdown).await
    }

    /// Latest published state
    pub fn state(&self) -> BotState {
        *self.state.borrow()
    }

    /// Receiver notified on every state transition
    pub fn subscribe(&self) -> watch::Receiver<BotState> {
        self.state.clone()
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, BotError> {
        let (reply, response) = oneshot::channel();
        self.inbox
            .send(Event::Command(command(reply)))
            .await
            .map_err(|_| BotError::ControllerGone)?;
        response.await.map_err(|_| BotError::ControllerGone)
    }
}

/// Main bot runner that owns the trading loop state
pub struct BotRunner {
    config: EngineConfig,
    feed: Box<dyn TickFeed>,
    reasoner: Arc<dyn ReasoningService>,
    inbox: mpsc::WeakSender<Event>,
    state_tx: watch::Sender<BotState>,
    state: BotState,
    /// Bumped on every start and stop; stale cycle results carry an old value
    generation: u64,
    risk_level: RiskLevel,
    data_source: Option<FeedMode>,
    ticks: Option<mpsc::Receiver<Tick>>,
    bars: BarAggregator,
    current_price: Option<f64>,
    ledger: PortfolioLedger,
    scheduler: DecisionScheduler,
}

impl BotRunner {
    /// Spawn the controller task and return its handle
    pub fn spawn(
        config: EngineConfig,
        feed: Box<dyn TickFeed>,
        reasoner: Arc<dyn ReasoningService>,
    ) -> BotHandle {
        let (inbox, events) = mpsc::channel(INBOX_CAPACITY);
        let (state_tx, state) = watch::channel(BotState::Inactive);

        let bar_width = chrono::Duration::from_std(config.bar_width)
            .unwrap_or_else(|_| chrono::Duration::seconds(15));

        let runner = Self {
            bars: BarAggregator::new(bar_width, config.max_bars),
            ledger: PortfolioLedger::new(
                config.initial_cash,
                config.asset_name.clone(),
                config.min_trade_cash,
                config.log_capacity,
            ),
            scheduler: DecisionScheduler::new(config.cycle_period, config.initial_delay),
            risk_level: config.risk_level,
            config,
            feed,
            reasoner,
            inbox: inbox.downgrade(),
            state_tx,
            state: BotState::Inactive,
            generation: 0,
            data_source: None,
            ticks: None,
            current_price: None,
        };

        tokio::spawn(runner.run(events));

        BotHandle { inbox, state }
    }

    async fn run(mut self, mut events: mpsc::Receiver<Event>) {
        info!("Bot runner ready ({})", self.config.asset_name);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(Event::Command(Command::Shutdown(reply))) => {
                        self.stop().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(event) => self.handle(event).await,
                    None => {
                        self.stop().await;
                        break;
                    }
                },
                tick = next_tick(&mut self.ticks) => match tick {
                    Some(tick) => self.on_tick(tick),
                    None => {
                        warn!("Tick stream ended while {}", self.state);
                        self.ticks = None;
                    }
                },
            }
        }

        info!("Bot runner exited");
    }

    async fn handle(&mut self, event: Event) {
        match event {
            Event::Command(command) => self.on_command(command).await,
            Event::CycleDue { generation } => {
                if generation == self.generation {
                    self.begin_cycle("timer");
                }
            }
            Event::CycleResolved {
                generation,
                outcome,
            } => self.finish_cycle(generation, outcome),
        }
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Start(reply) => {
                let mode = self.start().await;
                let _ = reply.send(mode);
            }
            Command::Stop(reply) => {
                self.stop().await;
                let _ = reply.send(());
            }
            Command::SetRiskLevel(level, reply) => {
                let result = if self.state.is_active() {
                    Err(BotError::RiskLevelLocked(self.state))
                } else {
                    info!("Risk level set to {}", level);
                    self.risk_level = level;
                    Ok(())
                };
                let _ = reply.send(result);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown(reply) => {
                // Handled by the run loop
                let _ = reply.send(());
            }
        }
    }

    async fn start(&mut self) -> FeedMode {
        if let (true, Some(mode)) = (self.state.is_active(), self.data_source) {
            debug!("Start ignored: bot already {}", self.state);
            return mode;
        }

        let (sink, ticks) = mpsc::channel(TICK_BUFFER);
        let mode = self.feed.connect(sink).await;
        self.ticks = Some(ticks);
        self.data_source = Some(mode);

        self.generation += 1;
        self.set_state(BotState::Running);

        let generation = self.generation;
        self.scheduler
            .arm(self.inbox.clone(), move || Event::CycleDue { generation });

        info!(
            "Bot started: source={}, risk={}, cash={:.2}",
            mode,
            self.risk_level,
            self.ledger.state().cash
        );
        mode
    }

    async fn stop(&mut self) {
        self.scheduler.disarm();
        self.feed.disconnect().await;
        self.ticks = None;

        if self.state.is_active() {
            self.generation += 1;
            self.data_source = None;
            self.set_state(BotState::Inactive);
            info!("Bot stopped");
        }
    }

    fn on_tick(&mut self, tick: Tick) {
        self.current_price = Some(tick.price);
        let update = self.bars.push(&tick);
        debug!("Tick {:.2} ({:?}), {} bars", tick.price, update, self.bars.len());

        if update == BarUpdate::Opened && self.config.decide_on_new_bar {
            self.begin_cycle("new bar");
        }
    }

    fn begin_cycle(&mut self, trigger: &str) {
        match self.state {
            BotState::Running => {}
            BotState::Thinking => {
                debug!("Decision still in flight, skipping {} cycle", trigger);
                return;
            }
            BotState::Error => {
                warn!("Bot in error state, skipping {} cycle", trigger);
                return;
            }
            BotState::Inactive => return,
        }

        let price = match self.current_price {
            Some(price) => price,
            None => {
                warn!("No price yet, skipping {} cycle", trigger);
                return;
            }
        };

        let required = self.config.periods.sma_long;
        if self.bars.len() < required {
            warn!(
                "Insufficient history ({}/{} bars), skipping {} cycle",
                self.bars.len(),
                required,
                trigger
            );
            return;
        }

        let request = self.decision_request(price);
        self.set_state(BotState::Thinking);

        let generation = self.generation;
        let reasoner = self.reasoner.clone();
        let inbox = self.inbox.clone();

        info!("Requesting decision ({} cycle) at {:.2}", trigger, price);

        tokio::spawn(async move {
            let outcome = match reasoner.request_decision(&request).await {
                Ok(payload) => parse_decision(&payload).map_err(ReasoningError::from),
                Err(e) => Err(e),
            };

            if let Some(inbox) = inbox.upgrade() {
                let _ = inbox
                    .send(Event::CycleResolved {
                        generation,
                        outcome,
                    })
                    .await;
            }
        });
    }

    fn finish_cycle(&mut self, generation: u64, outcome: Result<Decision, ReasoningError>) {
        if generation != self.generation || self.state != BotState::Thinking {
            info!(
                "Discarding decision from superseded cycle (bot now {})",
                self.state
            );
            return;
        }

        match outcome {
            Ok(decision) => {
                info!(
                    "Decision: {} {:.0}% | {}",
                    decision.action,
                    decision.trade_fraction * 100.0,
                    decision.reasoning
                );
                if let Some(price) = self.current_price {
                    self.ledger.apply(&decision, price, Utc::now());
                }
                self.set_state(BotState::Running);
            }
            Err(e) => {
                error!("Decision cycle failed: {}", e);
                self.set_state(BotState::Error);
            }
        }
    }

    fn decision_request(&self, price: f64) -> DecisionRequest {
        let closes = self.bars.closes();
        let portfolio = self.ledger.state();

        DecisionRequest {
            risk_level: self.risk_level,
            risk_guidance: self.risk_level.guidance().to_string(),
            fraction_range: self.risk_level.fraction_range(),
            cash: portfolio.cash,
            asset_amount: portfolio.asset_amount,
            asset_name: self.ledger.asset_name().to_string(),
            latest_close: self.bars.last().map(|bar| bar.close).unwrap_or(price),
            recent_bars: self.bars.recent(self.config.recent_bars),
            indicators: IndicatorSnapshot::from_closes(&closes, &self.config.periods),
        }
    }

    fn snapshot(&self) -> BotSnapshot {
        let closes = self.bars.closes();
        let series = IndicatorSnapshot::series(&closes, &self.config.periods);
        let bars = self
            .bars
            .iter()
            .zip(series)
            .map(|(bar, indicators)| ChartBar {
                bar: *bar,
                indicators,
            })
            .collect();

        let (profit_loss, profit_loss_pct) = self.ledger.profit_loss(self.current_price);

        BotSnapshot {
            state: self.state,
            risk_level: self.risk_level,
            data_source: self.data_source,
            asset_name: self.ledger.asset_name().to_string(),
            portfolio: self.ledger.state(),
            current_price: self.current_price,
            portfolio_value: self.ledger.value(self.current_price),
            profit_loss,
            profit_loss_pct,
            bars,
            indicators: IndicatorSnapshot::from_closes(&closes, &self.config.periods),
            trades: self.ledger.trades().to_vec(),
            decisions: self.ledger.decisions().to_vec(),
        }
    }

    fn set_state(&mut self, state: BotState) {
        if self.state != state {
            debug!("State {} -> {}", self.state, state);
        }
        self.state = state;
        self.state_tx.send_replace(state);
    }
}

async fn next_tick(ticks: &mut Option<mpsc::Receiver<Tick>>) -> Option<Tick> {
    match ticks {
        Some(ticks) => ticks.recv().await,
        None => std::future::pending().await,
    }
}
