//! The client loop.
//!
//! One connection feeds one [`SnapshotPipeline`]. `state_update` payloads are
//! applied in arrival order from a single task, the animation clock ticks at
//! the configured rate, and control ids typed on stdin go through the
//! [`CommandDispatcher`]. A dropped connection clears the scene before
//! reconnecting.

use std::future::Future;
use std::time::Duration;

use serde_json::{Value, json};
use skirmish_config::{Config, InputConfig, NetworkConfig, RenderConfig};
use skirmish_net::{
    ChannelClient, ChannelConfig, ChannelError, CommandDispatcher, CommandSink, ConnectionState,
    DispatchError, ReconnectConfig, ReconnectError, Session, UiAction, reconnect_loop,
};
use skirmish_render::EcsSurface;
use skirmish_sync::{
    AnimationCatalog, CatalogError, STATE_UPDATE_EVENT, SnapshotPipeline, SurfaceError,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

/// Errors that stop the client.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The animation catalog could not be loaded.
    #[error("failed to load animation catalog: {0}")]
    Catalog(#[from] CatalogError),

    /// The surface refused to register the catalog's animations.
    #[error("render surface rejected the catalog: {0}")]
    Surface(#[from] SurfaceError),

    /// The server refused the connection or the join.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The connection was lost for good.
    #[error(transparent)]
    Reconnect(#[from] ReconnectError),
}

/// Loads the catalog named by `render.catalog_path`, or the built-in one.
///
/// # Errors
///
/// Returns [`CatalogError`] if the file cannot be read or is invalid.
pub fn load_catalog(render: &RenderConfig) -> Result<AnimationCatalog, CatalogError> {
    match &render.catalog_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading animation catalog");
            AnimationCatalog::from_ron(path)
        }
        None => AnimationCatalog::builtin(),
    }
}

/// Default spawn buttons plus the extra ones from `input.spawn_bindings`.
pub fn build_dispatcher(input: &InputConfig) -> CommandDispatcher {
    let mut dispatcher = CommandDispatcher::with_default_bindings();
    for (control, unit_type) in &input.spawn_bindings {
        dispatcher.bind(control, UiAction::spawn(unit_type));
    }
    dispatcher
}

/// Channel timings from the network config.
pub fn channel_config(network: &NetworkConfig) -> ChannelConfig {
    ChannelConfig {
        heartbeat_interval: network.heartbeat_interval(),
        heartbeat_timeout: network.heartbeat_timeout(),
        join_timeout: network.join_timeout(),
    }
}

/// Reconnection backoff from the network config.
pub fn reconnect_config(network: &NetworkConfig) -> ReconnectConfig {
    ReconnectConfig {
        initial_delay: network.reconnect_initial_delay(),
        max_delay: network.reconnect_max_delay(),
        max_attempts: network.reconnect_attempts,
        ..Default::default()
    }
}

/// Animation clock period. A zero rate is treated as 1 Hz.
pub fn frame_period(render: &RenderConfig) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(render.tick_rate_hz.max(1)))
}

/// What a line of control input amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    /// A command was pushed.
    Dispatched,
    /// Blank, unknown, or the push failed.
    Ignored,
    /// The user asked to exit.
    Quit,
}

/// Handles one line of control input: a control id, `help`, or `quit`.
pub fn handle_control_line(
    line: &str,
    dispatcher: &CommandDispatcher,
    sink: &impl CommandSink,
) -> ControlOutcome {
    let control = line.trim();
    match control {
        "" => ControlOutcome::Ignored,
        "quit" | "exit" => ControlOutcome::Quit,
        "help" => {
            let controls: Vec<&str> = dispatcher.controls().collect();
            tracing::info!(controls = ?controls, "available controls");
            ControlOutcome::Ignored
        }
        _ => match dispatcher.dispatch(control, sink) {
            Ok(()) => ControlOutcome::Dispatched,
            Err(DispatchError::Unbound(control)) => {
                tracing::warn!(%control, "unknown control; type `help` for the list");
                ControlOutcome::Ignored
            }
            Err(error) => {
                tracing::warn!(control, %error, "command not sent");
                ControlOutcome::Ignored
            }
        },
    }
}

/// What one network event did to the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NetEvent {
    /// A snapshot was applied.
    Applied,
    /// The connection state changed without being lost.
    Idle,
    /// The connection is gone and the scene was cleared.
    Lost,
}

/// A joined connection and its inbound streams.
struct Connection {
    client: ChannelClient,
    session: Session,
    updates: mpsc::UnboundedReceiver<Value>,
    state: watch::Receiver<ConnectionState>,
}

impl Connection {
    /// Subscribes to snapshots and joins the configured topic on `client`.
    async fn join(client: ChannelClient, network: &NetworkConfig) -> Result<Self, ChannelError> {
        let updates = client.subscribe(STATE_UPDATE_EVENT);
        let state = client.state().subscribe();
        let session = client.join(&network.topic, json!({})).await?;
        Ok(Self {
            client,
            session,
            updates,
            state,
        })
    }

    async fn open(network: &NetworkConfig) -> Result<Self, ChannelError> {
        let client = ChannelClient::connect(&network.server_url, channel_config(network)).await?;
        Self::join(client, network).await
    }
}

/// First connection. A refused join is fatal; anything else falls back to
/// the reconnection backoff.
async fn connect(network: &NetworkConfig) -> Result<Connection, AppError> {
    match Connection::open(network).await {
        Ok(connection) => Ok(connection),
        Err(error @ ChannelError::JoinRejected { .. }) => Err(error.into()),
        Err(error) => {
            tracing::warn!(%error, url = %network.server_url, "initial connection failed");
            reconnect(network).await
        }
    }
}

async fn reconnect(network: &NetworkConfig) -> Result<Connection, AppError> {
    loop {
        let client = reconnect_loop(
            &network.server_url,
            reconnect_config(network),
            channel_config(network),
        )
        .await?;
        match Connection::join(client, network).await {
            Ok(connection) => return Ok(connection),
            Err(error @ ChannelError::JoinRejected { .. }) => return Err(error.into()),
            Err(error) => tracing::warn!(%error, "rejoin failed"),
        }
    }
}

/// The running client: configuration, the snapshot pipeline over a headless
/// ECS surface, and the control bindings.
pub struct App {
    config: Config,
    pipeline: SnapshotPipeline<EcsSurface>,
    dispatcher: CommandDispatcher,
}

impl App {
    /// Loads the catalog, builds the surface and registers every animation.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Catalog`] or [`AppError::Surface`].
    pub fn new(config: Config) -> Result<Self, AppError> {
        let catalog = load_catalog(&config.render)?;
        tracing::info!(
            sheets = catalog.sheets().count(),
            animations = catalog.len(),
            "animation catalog ready"
        );
        let surface = EcsSurface::from_catalog(&catalog);
        let mut pipeline = SnapshotPipeline::new(catalog, surface);
        pipeline.mount()?;
        let dispatcher = build_dispatcher(&config.input);

        Ok(Self {
            config,
            pipeline,
            dispatcher,
        })
    }

    /// The snapshot pipeline.
    pub fn pipeline(&self) -> &SnapshotPipeline<EcsSurface> {
        &self.pipeline
    }

    /// Mutable access to the snapshot pipeline.
    pub fn pipeline_mut(&mut self) -> &mut SnapshotPipeline<EcsSurface> {
        &mut self.pipeline
    }

    /// The control bindings.
    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    /// Applies one raw `state_update` payload. Malformed payloads are
    /// dropped by the pipeline and leave the scene untouched.
    pub fn apply_update(&mut self, payload: &Value) {
        let Ok(report) = self.pipeline.on_state_update(payload) else {
            return;
        };
        for failure in &report.failures {
            tracing::warn!(id = %failure.id, error = %failure.error, "entity not reconciled");
        }
        if self.config.debug.trace_snapshots {
            tracing::info!(
                snapshot = self.pipeline.applied(),
                sprites = self.pipeline.reconciler().len(),
                retired = report.retired,
                spawned = report.spawned,
                replayed = report.replayed,
                moved = report.moved,
                "snapshot"
            );
        }
    }

    /// Advances every sprite animation by `delta` seconds.
    pub fn tick(&mut self, delta: Duration) {
        self.pipeline.surface_mut().tick(delta.as_secs_f32());
    }

    /// Waits for the next snapshot or state change on `connection`. A lost
    /// connection clears the scene; reconnecting is left to the caller.
    async fn pump(&mut self, connection: &mut Connection) -> NetEvent {
        tokio::select! {
            biased;

            update = connection.updates.recv() => match update {
                Some(payload) => {
                    self.apply_update(&payload);
                    NetEvent::Applied
                }
                None => self.lose_connection(),
            },

            changed = connection.state.changed() => {
                let lost = changed.is_err()
                    || *connection.state.borrow_and_update() == ConnectionState::Disconnected;
                if lost {
                    self.lose_connection()
                } else {
                    NetEvent::Idle
                }
            }
        }
    }

    fn lose_connection(&mut self) -> NetEvent {
        let report = self.pipeline.on_disconnect();
        tracing::warn!(retired = report.retired, "connection lost; scene cleared");
        NetEvent::Lost
    }

    /// Reconnects and rejoins. `Ok(None)` means stop: either reconnecting is
    /// disabled or `interrupt` fired first.
    async fn resume<F>(&self, interrupt: &mut F) -> Result<Option<Connection>, AppError>
    where
        F: Future + Unpin,
    {
        tokio::select! {
            connection = reconnect(&self.config.network) => match connection {
                Ok(connection) => {
                    tracing::info!(
                        player_id = connection.session.player_id.as_deref().unwrap_or("-"),
                        "session resumed"
                    );
                    Ok(Some(connection))
                }
                Err(AppError::Reconnect(ReconnectError::Disabled)) => {
                    tracing::info!("connection lost and reconnecting is disabled");
                    Ok(None)
                }
                Err(error) => Err(error),
            },
            _ = interrupt => Ok(None),
        }
    }

    /// Connects, joins, and runs until Ctrl-C, `quit` on stdin, or a fatal
    /// connection error. Always leaves the topic and disposes the scene on
    /// the way out.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Channel`] if the join is refused and
    /// [`AppError::Reconnect`] once reconnection gives up.
    pub async fn run(mut self) -> Result<(), AppError> {
        let interrupt = tokio::signal::ctrl_c();
        tokio::pin!(interrupt);

        let mut connection = tokio::select! {
            connection = connect(&self.config.network) => connection?,
            _ = &mut interrupt => {
                self.pipeline.unmount();
                return Ok(());
            }
        };
        tracing::info!(
            topic = %connection.session.topic,
            player_id = connection.session.player_id.as_deref().unwrap_or("-"),
            "session started"
        );

        let mut frames = tokio::time::interval(frame_period(&self.config.render));
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_frame = Instant::now();

        let mut controls = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;

        loop {
            tokio::select! {
                biased;

                _ = &mut interrupt => {
                    tracing::info!("interrupted");
                    break;
                }

                event = self.pump(&mut connection) => {
                    if event == NetEvent::Lost {
                        match self.resume(&mut interrupt).await? {
                            Some(next) => connection = next,
                            None => break,
                        }
                    }
                }

                now = frames.tick() => {
                    self.tick(now.duration_since(last_frame));
                    last_frame = now;
                }

                line = controls.next_line(), if stdin_open => match line {
                    Ok(Some(line)) => {
                        let outcome =
                            handle_control_line(&line, &self.dispatcher, &connection.client);
                        if outcome == ControlOutcome::Quit {
                            break;
                        }
                    }
                    Ok(None) => stdin_open = false,
                    Err(error) => {
                        tracing::warn!(%error, "stdin closed");
                        stdin_open = false;
                    }
                },
            }
        }

        connection.client.leave();
        let report = self.pipeline.unmount();
        tracing::info!(retired = report.retired, "client stopped");
        Ok(())
    }
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;
