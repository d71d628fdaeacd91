//! WebSocket Game Server
//!
//! Accepts observer connections, runs the authoritative tick loop, and
//! serializes every bet/cashout request against it.
//!
//! One `Mutex<RoundScheduler>` is the whole concurrency story: the tick task
//! and every request handler take it in turn, so a request can never read
//! round state a tick is mid-way through mutating. Broadcast to observers is
//! fire-and-forget through the [`ObserverHub`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::core::clock::Clock;
use crate::core::rng::CrashSource;
use crate::game::bets::{BetError, PlayerId, SettledOutcome};
use crate::game::events::EngineEvent;
use crate::game::scheduler::{EngineConfig, RoundScheduler};
use crate::network::broadcast::{FeedItem, ObserverHub, DEFAULT_HUB_CAPACITY};
use crate::network::protocol::{error_reply, ClientMessage, ErrorCode, ErrorReply, ServerMessage};

/// Convert an engine event to its broadcast message.
fn convert_engine_event(event: EngineEvent) -> ServerMessage {
    match event {
        EngineEvent::RoundUpdate {
            round,
            server_time_ms,
        } => ServerMessage::RoundUpdate {
            round,
            server_time: server_time_ms,
        },
        EngineEvent::MultiplierTick {
            round_id,
            elapsed_ms,
            multiplier,
            server_time_ms,
        } => ServerMessage::MultiplierTick {
            round_id,
            elapsed: elapsed_ms,
            multiplier,
            server_time: server_time_ms,
        },
        EngineEvent::BetPlaced {
            round_id,
            player_id,
            amount,
            auto_cashout_at,
        } => ServerMessage::BetPlaced {
            round_id,
            player_id,
            amount,
            auto_cashout_at,
        },
        EngineEvent::PlayerCashedOut {
            round_id,
            player_id,
            multiplier,
            payout,
        } => ServerMessage::PlayerCashedOut {
            round_id,
            player_id,
            multiplier,
            payout,
        },
        EngineEvent::HistoryAppended {
            round_id,
            crash_multiplier,
        } => ServerMessage::HistoryAppended {
            round_id,
            crash_multiplier,
        },
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Engine configuration.
    pub engine: EngineConfig,
    /// Per-observer broadcast queue capacity.
    pub hub_capacity: usize,
    /// History entries served per request at most.
    pub history_limit: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            max_connections: 1000,
            engine: EngineConfig::default(),
            hub_capacity: DEFAULT_HUB_CAPACITY,
            history_limit: 50,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// The crash game server.
pub struct CrashServer {
    config: ServerConfig,
    engine: Arc<Mutex<RoundScheduler>>,
    hub: Arc<ObserverHub>,
    clock: Arc<dyn Clock>,
    connections: Arc<AtomicUsize>,
    shutdown_tx: broadcast::Sender<()>,
}

impl CrashServer {
    /// Create a server around an injected clock and crash source.
    pub fn new(config: ServerConfig, clock: Arc<dyn Clock>, source: Box<dyn CrashSource>) -> Self {
        let engine = RoundScheduler::new(config.engine.clone(), clock.clone(), source);
        let hub = ObserverHub::new(config.hub_capacity);
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            engine: Arc::new(Mutex::new(engine)),
            hub: Arc::new(hub),
            clock,
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Run the server: the tick loop plus the accept loop.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Crash server listening on {}", self.config.bind_addr);

        let tick_task = tokio::spawn(Self::run_tick_loop(
            self.engine.clone(),
            self.hub.clone(),
            self.config.engine.tick_interval_ms,
            self.shutdown_tx.subscribe(),
        ));

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let open = self.connections.load(Ordering::SeqCst);
                            if open >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        tick_task.abort();
        Ok(())
    }

    /// The authoritative tick loop. Missed intervals are skipped, never
    /// replayed: the next tick re-derives elapsed time from the clock.
    async fn run_tick_loop(
        engine: Arc<Mutex<RoundScheduler>>,
        hub: Arc<ObserverHub>,
        tick_interval_ms: u64,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut ticker = interval(Duration::from_millis(tick_interval_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let events = {
                        let mut engine = engine.lock().await;
                        engine.tick()
                    };
                    for event in events {
                        hub.publish(convert_engine_event(event));
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let engine = self.engine.clone();
        let hub = self.hub.clone();
        let clock = self.clock.clone();
        let connections = self.connections.clone();
        let version = self.config.version.clone();
        let history_limit = self.config.history_limit;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        connections.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    connections.fetch_sub(1, Ordering::SeqCst);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            // Outbound writer task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            // Feed-forward task: hub -> this observer. A gap means this
            // observer fell behind; re-sync it with a fresh snapshot.
            let feed_task = {
                let mut feed = hub.subscribe();
                let msg_tx = msg_tx.clone();
                let engine = engine.clone();
                tokio::spawn(async move {
                    while let Some(item) = feed.next().await {
                        let forward = match item {
                            FeedItem::Event(msg) => msg,
                            FeedItem::Gap { missed } => {
                                debug!("Observer lagged, resyncing ({missed} events dropped)");
                                let engine = engine.lock().await;
                                ServerMessage::RoundUpdate {
                                    round: engine.snapshot(),
                                    server_time: engine.now_ms(),
                                }
                            }
                        };
                        if msg_tx.send(forward).await.is_err() {
                            break;
                        }
                    }
                })
            };

            // New observers get the current round without waiting for a tick
            {
                let engine = engine.lock().await;
                let _ = msg_tx
                    .send(ServerMessage::RoundUpdate {
                        round: engine.snapshot(),
                        server_time: engine.now_ms(),
                    })
                    .await;
            }

            let mut player: Option<PlayerId> = None;

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::Error(ErrorReply {
                                            code: ErrorCode::InvalidInput,
                                            message: "Invalid message format".to_string(),
                                        })).await;
                                        continue;
                                    }
                                };
                                Self::handle_client_message(
                                    client_msg,
                                    &mut player,
                                    &engine,
                                    &hub,
                                    &clock,
                                    &version,
                                    history_limit,
                                    &msg_tx,
                                ).await;
                            }
                            Some(Ok(Message::Ping(_))) => {
                                let _ = msg_tx.send(ServerMessage::Pong {
                                    timestamp: 0,
                                    server_time: clock.now_ms(),
                                }).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                debug!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // A disconnect just stops delivery; any request already handed to
            // the engine above was settled on ledger state alone.
            sender_task.abort();
            feed_task.abort();
            connections.fetch_sub(1, Ordering::SeqCst);
            debug!("Client {} cleaned up", addr);
        });
    }

    /// Handle one client message against the engine.
    #[allow(clippy::too_many_arguments)]
    async fn handle_client_message(
        msg: ClientMessage,
        player: &mut Option<PlayerId>,
        engine: &Arc<Mutex<RoundScheduler>>,
        hub: &Arc<ObserverHub>,
        clock: &Arc<dyn Clock>,
        version: &str,
        history_limit: usize,
        msg_tx: &mpsc::Sender<ServerMessage>,
    ) {
        match msg {
            ClientMessage::Join { player_id } => {
                *player = Some(player_id);
                let _ = msg_tx
                    .send(ServerMessage::Joined {
                        player_id,
                        server_version: version.to_string(),
                    })
                    .await;
                debug!("Player {} joined", player_id);
            }

            ClientMessage::PlaceBet(req) => {
                let Some(player_id) = *player else {
                    let _ = msg_tx.send(not_joined()).await;
                    return;
                };
                let (result, round_id) = {
                    let mut engine = engine.lock().await;
                    let result = engine.place_bet(player_id, req.amount, req.auto_cashout_at);
                    (result, engine.round_id())
                };
                match result {
                    Ok(bet) => {
                        let _ = msg_tx
                            .send(ServerMessage::BetAck {
                                round_id,
                                amount: bet.amount,
                                auto_cashout_at: bet.auto_cashout_at,
                            })
                            .await;
                        hub.publish(ServerMessage::BetPlaced {
                            round_id,
                            player_id,
                            amount: bet.amount,
                            auto_cashout_at: bet.auto_cashout_at,
                        });
                    }
                    Err(err) => {
                        debug!("Bet rejected for {}: {}", player_id, err);
                        let _ = msg_tx.send(ServerMessage::Error(error_reply(&err))).await;
                    }
                }
            }

            ClientMessage::CashOut => {
                let Some(player_id) = *player else {
                    let _ = msg_tx.send(not_joined()).await;
                    return;
                };
                let (result, round_id) = {
                    let mut engine = engine.lock().await;
                    let result = engine.cash_out(player_id);
                    (result, engine.round_id())
                };
                match result {
                    Ok(receipt) => {
                        let _ = msg_tx
                            .send(ServerMessage::PayoutAck {
                                round_id,
                                multiplier: receipt.multiplier,
                                payout: receipt.payout,
                                already_settled: false,
                            })
                            .await;
                        hub.publish(ServerMessage::PlayerCashedOut {
                            round_id,
                            player_id,
                            multiplier: receipt.multiplier,
                            payout: receipt.payout,
                        });
                    }
                    // The auto/manual race resolved first; not a fault. The
                    // player gets the settled outcome.
                    Err(BetError::AlreadySettled(SettledOutcome::CashedOut {
                        multiplier,
                        payout,
                    })) => {
                        let _ = msg_tx
                            .send(ServerMessage::PayoutAck {
                                round_id,
                                multiplier,
                                payout,
                                already_settled: true,
                            })
                            .await;
                    }
                    Err(err) => {
                        debug!("Cashout rejected for {}: {}", player_id, err);
                        let _ = msg_tx.send(ServerMessage::Error(error_reply(&err))).await;
                    }
                }
            }

            ClientMessage::SyncRequest => {
                let (round, server_time) = {
                    let engine = engine.lock().await;
                    (engine.snapshot(), engine.now_ms())
                };
                let _ = msg_tx
                    .send(ServerMessage::RoundUpdate { round, server_time })
                    .await;
            }

            ClientMessage::HistoryRequest { limit } => {
                let entries = {
                    let engine = engine.lock().await;
                    engine.history(limit.unwrap_or(history_limit).min(history_limit))
                };
                let _ = msg_tx.send(ServerMessage::HistorySnapshot { entries }).await;
            }

            ClientMessage::Ping { timestamp } => {
                let _ = msg_tx
                    .send(ServerMessage::Pong {
                        timestamp,
                        server_time: clock.now_ms(),
                    })
                    .await;
            }
        }
    }

    /// Signal every task to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Number of subscribed observer feeds.
    pub fn observer_count(&self) -> usize {
        self.hub.observer_count()
    }
}

fn not_joined() -> ServerMessage {
    ServerMessage::Error(ErrorReply {
        code: ErrorCode::NotJoined,
        message: "Join before betting".to_string(),
    })
}
