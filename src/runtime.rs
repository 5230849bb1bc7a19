//! Runtime assembly: constructs every singleton once, performs crash
//! recovery, wires the event consumers, and owns the shutdown sequence.

use std::{path::PathBuf, sync::Arc, time::Instant};

use tokio::sync::watch;

use crate::{
    agent::{InboundMessage, SessionLoop},
    ai::{ModelRouter, ProviderSet},
    approvals::ApprovalBroker,
    channels::{Channel, ChannelManager},
    config::SettingsStore,
    cost::CostTracker,
    error::{CoreError, Result},
    event_bus::{AppEvent, EventBus, TokioBroadcastBus},
    gateway::{self, GatewayState},
    memory::{KeywordMemory, Memory, ThreadStore},
    orchestrator::{OrchestrateReceiver, Orchestrator, SubAgentIndex, should_orchestrate},
    scheduler,
    security::{AuditLog, RateLimiter, load_or_create_token},
    tasks::{NewTask, TaskSource, TaskStore},
    tools::{BuiltinToolDeps, MailTransport, ToolRegistry, register_builtins},
    triggers::{ActionKind, InboxClient, TriggerRegistry},
};

pub struct RuntimeOptions {
    pub workspace: PathBuf,
    pub gateway_host: String,
    pub gateway_port: u16,
    pub webhook_port: u16,
    pub enable_gateway: bool,
    /// Loaded SKILL instructions (the loader itself is external).
    pub skills: Vec<String>,
}

/// External collaborators supplied by the embedding binary.
#[derive(Default)]
pub struct Collaborators {
    pub channels: Vec<Arc<dyn Channel>>,
    pub inbox: Option<Arc<dyn InboxClient>>,
    pub mail: Option<Arc<dyn MailTransport>>,
    pub memory: Option<Arc<dyn Memory>>,
}

pub struct AgentRuntime {
    pub session: Arc<SessionLoop>,
    pub orchestrator: Arc<Orchestrator>,
    pub bus: Arc<dyn EventBus>,
    pub channels: Arc<ChannelManager>,
    pub settings: Arc<SettingsStore>,
    pub tasks: Arc<TaskStore>,
    pub triggers: Arc<TriggerRegistry>,
    audit: Arc<AuditLog>,
    shutdown_tx: watch::Sender<bool>,
    handles: std::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl AgentRuntime {
    /// Boot the whole agent host. Fatal errors here abort start-up.
    pub async fn start(
        options: RuntimeOptions,
        providers: ProviderSet,
        router: ModelRouter,
        collaborators: Collaborators,
    ) -> Result<Arc<Self>> {
        let workspace = options.workspace.clone();
        std::fs::create_dir_all(&workspace)
            .map_err(|e| CoreError::fatal(format!("cannot create workspace: {e}")))?;

        // Singletons, in dependency order. The audit log and gateway token
        // are fatal when unavailable.
        let token = load_or_create_token(&workspace)?;
        let audit = Arc::new(AuditLog::open(&workspace)?);
        let settings = Arc::new(SettingsStore::load(&workspace, token.clone())?);
        audit.set_enabled(settings.get().security.audit_log);

        let bus: Arc<dyn EventBus> = Arc::new(TokioBroadcastBus::new());
        let cost = Arc::new(CostTracker::load(&workspace)?);
        let tasks = Arc::new(TaskStore::load(&workspace, Some(bus.clone()))?);
        let approvals = ApprovalBroker::load(&workspace, Some(bus.clone()))?;
        let triggers = Arc::new(TriggerRegistry::load(&workspace, Some(bus.clone()))?);
        let agents = Arc::new(SubAgentIndex::new());
        let memory: Arc<dyn Memory> = collaborators
            .memory
            .unwrap_or_else(|| Arc::new(KeywordMemory::new()));
        let router = Arc::new(router);
        let limiter = Arc::new(RateLimiter::new());

        let (orchestrate_tx, orchestrate_rx) = tokio::sync::mpsc::unbounded_channel();

        let mut registry = ToolRegistry::new()
            .with_bus(bus.clone())
            .with_audit(audit.clone())
            .with_settings(settings.clone());
        register_builtins(
            &mut registry,
            BuiltinToolDeps {
                workspace: workspace.clone(),
                settings: settings.clone(),
                memory: memory.clone(),
                tasks: tasks.clone(),
                triggers: triggers.clone(),
                cost: cost.clone(),
                orchestrate: Some(orchestrate_tx),
                mail: collaborators.mail,
                inbox: collaborators.inbox.clone(),
            },
        );
        let registry = Arc::new(registry);

        let session = Arc::new(
            SessionLoop::new(
                providers.clone(),
                router.clone(),
                registry,
                Arc::new(ThreadStore::new(&workspace)),
                memory.clone(),
                tasks.clone(),
                approvals.clone(),
                cost.clone(),
                settings.clone(),
                Some(bus.clone()),
                workspace.clone(),
            )
            .with_skills(options.skills.clone()),
        );
        let orchestrator = Arc::new(Orchestrator::new(
            session.clone(),
            providers,
            router.clone(),
            tasks.clone(),
            cost.clone(),
            agents.clone(),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::new();

        // Channel listeners feed the bus; the manager routes replies back.
        let mut manager = ChannelManager::new();
        for channel in collaborators.channels {
            manager.register(channel.clone());
            let bus_in = bus.clone();
            handles.push(tokio::spawn(async move {
                let (tx, mut rx) = tokio::sync::mpsc::channel(64);
                let name = channel.name().to_string();
                let listener = channel.clone();
                tokio::spawn(async move {
                    if let Err(e) = listener.listen(tx).await {
                        log::error!("channel '{name}': listener stopped: {e}");
                    }
                });
                while let Some(message) = rx.recv().await {
                    let _ = bus_in.publish(AppEvent::MessageReceived {
                        channel: message.channel,
                        user: message.sender,
                        content: message.content,
                    });
                }
            }));
        }
        let channels = Arc::new(manager);

        // Event plane.
        let heartbeat_config = settings.get().heartbeat;
        if heartbeat_config.enabled {
            handles.push(scheduler::heartbeat::spawn(
                bus.clone(),
                workspace.clone(),
                heartbeat_config.interval_minutes,
                shutdown_rx.clone(),
            ));
        }
        handles.extend(crate::triggers::start_all(
            triggers.clone(),
            &workspace,
            options.webhook_port,
            collaborators.inbox,
            shutdown_rx.clone(),
        ));

        // Gateway.
        if options.enable_gateway {
            let state = GatewayState {
                token,
                settings: settings.clone(),
                tasks: tasks.clone(),
                approvals: approvals.clone(),
                cost: cost.clone(),
                triggers: triggers.clone(),
                agents,
                audit: audit.clone(),
                bus: bus.clone(),
                limiter: limiter.clone(),
                memory,
                router,
                skills: Arc::new(options.skills),
                started_at: Instant::now(),
            };
            let host = options.gateway_host.clone();
            let port = options.gateway_port;
            let gateway_shutdown = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                if let Err(e) = gateway::serve(state, &host, port, gateway_shutdown).await {
                    log::error!("gateway: {e}");
                }
            }));
        }

        let runtime = Arc::new(Self {
            session,
            orchestrator,
            bus,
            channels,
            settings,
            tasks,
            triggers,
            audit,
            shutdown_tx,
            handles: std::sync::Mutex::new(handles),
        });

        runtime.spawn_event_consumer(shutdown_rx.clone(), limiter);
        runtime.spawn_orchestrate_consumer(orchestrate_rx, shutdown_rx);
        Ok(runtime)
    }

    /// The main consumer: inbound messages, heartbeats, and trigger fires all
    /// become session turns, each handled on its own task so turns interleave.
    fn spawn_event_consumer(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
        limiter: Arc<RateLimiter>,
    ) {
        let runtime = Arc::clone(self);
        let allowed_users = allowed_user_ids();
        let handle = tokio::spawn(async move {
            let mut rx = runtime.bus.subscribe();
            loop {
                tokio::select! {
                    event = rx.recv() => {
                        let event = match event {
                            Ok(e) => e,
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                                log::warn!("event consumer lagged, missed {n} events");
                                continue;
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                        };
                        runtime.dispatch(event, &limiter, &allowed_users);
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        });
        self.handles.lock().unwrap_or_else(|e| e.into_inner()).push(handle);
    }

    fn dispatch(
        self: &Arc<Self>,
        event: AppEvent,
        limiter: &Arc<RateLimiter>,
        allowed_users: &Option<Vec<String>>,
    ) {
        match event {
            AppEvent::MessageReceived { channel, user, content } => {
                if let Some(allowed) = allowed_users
                    && !allowed.contains(&user)
                {
                    log::warn!("dropping message from unauthorised user '{user}'");
                    return;
                }
                let limit = self.settings.get().limits.rate_limit_per_minute;
                if !limiter.check(&format!("msg:{channel}:{user}"), limit) {
                    let runtime = Arc::clone(self);
                    tokio::spawn(async move {
                        runtime
                            .channels
                            .deliver(&channel, &user, "Rate limit exceeded; please slow down.")
                            .await;
                    });
                    return;
                }
                let runtime = Arc::clone(self);
                tokio::spawn(async move {
                    let message = InboundMessage {
                        channel: channel.clone(),
                        user: user.clone(),
                        text: content,
                    };
                    let reply = match runtime.session.handle_message(&message).await {
                        Ok(reply) => reply,
                        Err(e) => e.to_string(),
                    };
                    runtime.channels.deliver(&channel, &user, &reply).await;
                });
            }
            AppEvent::HeartbeatDue { items } => {
                let runtime = Arc::clone(self);
                tokio::spawn(async move {
                    match runtime.session.heartbeat_turn(&items).await {
                        Ok(Some(alert)) => {
                            let config = runtime.settings.get().heartbeat;
                            if !config.channel.is_empty() {
                                runtime.channels.deliver(&config.channel, "heartbeat", &alert).await;
                            } else {
                                log::info!("heartbeat: {alert}");
                            }
                        }
                        Ok(None) => {}
                        Err(e) => log::warn!("heartbeat turn failed: {e}"),
                    }
                });
            }
            AppEvent::TriggerFired { trigger_id, name, trigger_type, payload } => {
                let runtime = Arc::clone(self);
                tokio::spawn(async move {
                    runtime
                        .handle_trigger_fired(&trigger_id, &name, &trigger_type, payload)
                        .await;
                });
            }
            _ => {}
        }
    }

    async fn handle_trigger_fired(
        self: &Arc<Self>,
        trigger_id: &str,
        name: &str,
        trigger_type: &str,
        payload: serde_json::Value,
    ) {
        let Some(trigger) = self.triggers.get(trigger_id) else {
            // A deleted trigger can still have an in-flight fire.
            log::debug!("trigger '{name}' vanished before handling");
            return;
        };
        match trigger.action.kind {
            ActionKind::Message => {
                match self
                    .session
                    .trigger_turn(
                        name,
                        trigger_type,
                        &trigger.action.content,
                        trigger.action.channel.as_deref(),
                        trigger.action.user.as_deref(),
                        &payload,
                    )
                    .await
                {
                    Ok(reply) => {
                        if let (Some(channel), Some(user)) =
                            (&trigger.action.channel, &trigger.action.user)
                        {
                            self.channels.deliver(channel, user, &reply).await;
                        } else {
                            log::info!("trigger '{name}': {reply}");
                        }
                    }
                    Err(e) => log::warn!("trigger '{name}' turn failed: {e}"),
                }
            }
            ActionKind::Task => {
                let source = TaskSource {
                    channel: trigger.action.channel.clone().unwrap_or_default(),
                    user: trigger.action.user.clone().unwrap_or_default(),
                };
                let created = self.tasks.create(NewTask {
                    title: format!("trigger: {name}"),
                    description: trigger.action.content.clone(),
                    source,
                    ..Default::default()
                });
                match created {
                    Ok(task) if should_orchestrate(&task.description) => {
                        let runtime = Arc::clone(self);
                        let task_id = task.id.clone();
                        tokio::spawn(async move {
                            if let Err(e) = runtime.orchestrator.orchestrate(&task_id).await {
                                log::warn!("trigger-created task {task_id} failed: {e}");
                            }
                        });
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("trigger '{name}': task creation failed: {e}"),
                }
            }
        }
    }

    fn spawn_orchestrate_consumer(
        self: &Arc<Self>,
        mut rx: OrchestrateReceiver,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let runtime = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    request = rx.recv() => {
                        let Some(request) = request else { return };
                        let runtime = Arc::clone(&runtime);
                        tokio::spawn(async move {
                            let task_id = request.task_id.clone();
                            match runtime.orchestrator.orchestrate(&task_id).await {
                                Ok(summary) => {
                                    if let Some(task) = runtime.tasks.get(&task_id)
                                        && !task.source.channel.is_empty()
                                    {
                                        runtime
                                            .channels
                                            .deliver(&task.source.channel, &task.source.user, &summary)
                                            .await;
                                    }
                                }
                                Err(e) => log::warn!("orchestration of {task_id} failed: {e}"),
                            }
                        });
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        });
        self.handles.lock().unwrap_or_else(|e| e.into_inner()).push(handle);
    }

    /// Stop the heartbeat, every trigger watcher, both listeners, and flush
    /// the audit log.
    pub async fn shutdown(&self) {
        log::info!("shutting down");
        let _ = self.shutdown_tx.send(true);
        // Give graceful shutdowns a moment, then abort stragglers.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        for handle in self.handles.lock().unwrap_or_else(|e| e.into_inner()).drain(..) {
            handle.abort();
        }
        self.audit.close();
    }
}

fn allowed_user_ids() -> Option<Vec<String>> {
    std::env::var("ALLOWED_USER_IDS").ok().and_then(|raw| {
        let ids: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        (!ids.is_empty()).then_some(ids)
    })
}
