//! Command and event routing.
//!
//! The [`CommandRouter`] observes every adapter's hub. Events of one platform
//! go through a single queue, so they are routed in the order the adapter
//! triggered them:
//!
//! ```text
//! event ──▶ event handlers (platform / role filtered)
//!       ──▶ message-like? ──▶ prefix ──▶ lookup ──▶ prefix mode
//!                                                ──▶ platform ──▶ role ──▶ run
//! ```
//!
//! A handler or command that suspends on I/O continues in its own task and
//! the queue moves on to the next event. Refusals are answered in the chat;
//! handler errors are only logged.

mod command;
mod handler;
mod roles;
mod split;

pub use command::{Command, CommandContext, FnCommand, PrefixMode};
pub use handler::{EventContext, EventHandler};
pub use roles::RoleTable;
pub use split::{split_args, split_name};

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::task::Poll;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, debug_span, error, warn};

use parley_core::{BoxedAdapter, ChatIo, EventObserver, InferredEvent, Platform, Role};

use crate::config::BotConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::usernames::UsernameCache;

/// What the router did with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routing {
    /// Not a command: not message-like, no match without a prefix, or the
    /// prefix mode did not allow it.
    Ignored,
    /// The command ran to completion.
    Ran { command: String },
    /// The command returned an error, which was logged.
    Failed { command: String },
    /// The command is restricted to another platform.
    WrongPlatform { command: String, platform: Platform },
    /// The sender's role is too low.
    Forbidden {
        command: String,
        role: Role,
        required: Role,
    },
    /// A prefixed message named no known command.
    NotFound,
    /// The command suspended and finishes in its own task.
    Running { command: String },
}

/// Whether routing waits for handlers and commands to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    /// Await every handler and the command.
    Await,
    /// Poll each once, in order; whatever suspends continues in its own task.
    Detach,
}

/// Polls `work` according to `completion`. `None` means it was detached.
async fn complete<F>(work: F, completion: Completion) -> Option<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let mut work = Box::pin(work);
    if completion == Completion::Await {
        return Some(work.await);
    }
    match futures::poll!(work.as_mut()) {
        Poll::Ready(output) => Some(output),
        Poll::Pending => {
            tokio::spawn(work.in_current_span());
            None
        }
    }
}

type Queued = (InferredEvent, BoxedAdapter);

#[derive(Default)]
struct CommandTable {
    commands: Vec<Arc<dyn Command>>,
    /// Lowercased names and aliases to positions in `commands`.
    index: HashMap<String, usize>,
}

impl CommandTable {
    fn find(&self, name: &str) -> Option<Arc<dyn Command>> {
        let name = name.to_lowercase();
        let position = self.index.get(&name).or_else(|| {
            if name.contains('-') {
                self.index.get(split_name(&name).0)
            } else {
                None
            }
        })?;
        self.commands.get(*position).cloned()
    }
}

struct RouterInner {
    prefixes: Vec<String>,
    roles: RoleTable,
    usernames: Arc<UsernameCache>,
    commands: RwLock<CommandTable>,
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
    /// One ordered queue per platform, drained by a single task.
    queues: Mutex<HashMap<Platform, mpsc::UnboundedSender<Queued>>>,
}

/// Routes events to event handlers and commands.
///
/// Cloning is cheap; clones share their commands and handlers.
#[derive(Clone)]
pub struct CommandRouter {
    inner: Arc<RouterInner>,
}

impl CommandRouter {
    /// Creates a router with explicit prefixes and roles.
    pub fn new(prefixes: Vec<String>, roles: RoleTable, usernames: Arc<UsernameCache>) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                prefixes,
                roles,
                usernames,
                commands: RwLock::new(CommandTable::default()),
                handlers: RwLock::new(Vec::new()),
                queues: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Creates a router from the `bot` section.
    pub fn from_config(config: &BotConfig, usernames: Arc<UsernameCache>) -> Self {
        Self::new(config.prefixes.clone(), RoleTable::from_config(config), usernames)
    }

    /// Registers a command. Names and aliases must be unique, ignoring case.
    pub fn register_command(&self, command: impl Command) -> RuntimeResult<()> {
        self.register_command_arc(Arc::new(command))
    }

    /// Registers a shared command.
    pub fn register_command_arc(&self, command: Arc<dyn Command>) -> RuntimeResult<()> {
        let names: Vec<String> = std::iter::once(command.name())
            .chain(command.aliases().iter().map(String::as_str))
            .map(|name| name.trim().to_lowercase())
            .collect();

        for name in &names {
            if name.is_empty() || name.chars().any(char::is_whitespace) {
                return Err(RuntimeError::InvalidCommand(format!(
                    "'{}' has an empty or whitespace-containing name or alias",
                    command.name()
                )));
            }
        }

        let mut table = self.inner.commands.write();
        for (i, name) in names.iter().enumerate() {
            let taken_here = names[..i].contains(name);
            let taken = table
                .index
                .get(name)
                .and_then(|position| table.commands.get(*position))
                .map(|owner| owner.name().to_string());
            if let Some(owner) = taken.or_else(|| taken_here.then(|| command.name().to_string())) {
                return Err(RuntimeError::DuplicateCommand {
                    name: name.clone(),
                    owner,
                });
            }
        }

        let position = table.commands.len();
        for name in names {
            table.index.insert(name, position);
        }
        debug!(command = command.name(), "Registered command");
        table.commands.push(command);
        Ok(())
    }

    /// Registers a handler that sees every event.
    pub fn register_event_handler(&self, handler: impl EventHandler) {
        self.inner.handlers.write().push(Arc::new(handler));
    }

    /// Returns every registered command, in registration order.
    pub fn commands(&self) -> Vec<Arc<dyn Command>> {
        self.inner.commands.read().commands.clone()
    }

    /// Looks up a command by name or alias, falling back to the `name-prop` base.
    pub fn find_command(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.inner.commands.read().find(name)
    }

    /// Returns the number of registered commands.
    pub fn command_count(&self) -> usize {
        self.inner.commands.read().commands.len()
    }

    /// Returns the number of registered event handlers.
    pub fn handler_count(&self) -> usize {
        self.inner.handlers.read().len()
    }

    /// Returns the command prefixes; the first one is the default.
    pub fn prefixes(&self) -> &[String] {
        &self.inner.prefixes
    }

    /// Returns the table that maps senders to roles.
    pub fn roles(&self) -> &RoleTable {
        &self.inner.roles
    }

    /// Returns the username cache shared with every context.
    pub fn usernames(&self) -> &Arc<UsernameCache> {
        &self.inner.usernames
    }

    /// Runs event handlers, then routes message-like events to a command.
    ///
    /// Waits for every handler and the command to finish.
    pub async fn dispatch(&self, event: InferredEvent, adapter: BoxedAdapter) -> Routing {
        self.route(event, adapter, Completion::Await).await
    }

    async fn route(
        &self,
        event: InferredEvent,
        adapter: BoxedAdapter,
        completion: Completion,
    ) -> Routing {
        let message_like = event.event_type().is_message_like();
        let role = match event.sender_id() {
            Some(sender) if message_like => self.inner.roles.resolve(sender),
            _ => Role::Everyone,
        };
        let io = ChatIo::new(event, adapter);

        self.run_handlers(&io, role, completion).await;

        if !message_like {
            return Routing::Ignored;
        }
        self.route_command(io, role, completion).await
    }

    async fn run_handlers(&self, io: &ChatIo, role: Role, completion: Completion) {
        let handlers = self.inner.handlers.read().clone();
        let platform = io.platform();
        let event_type = io.event_type();

        for handler in handlers {
            if handler.platform().is_some_and(|only| only != platform) {
                continue;
            }
            if !role.satisfies(handler.role()) {
                continue;
            }
            let ctx = EventContext {
                io: io.clone(),
                role,
                usernames: self.inner.usernames.clone(),
            };
            let work = async move {
                if let Err(e) = handler.handle(ctx).await {
                    error!(
                        platform = %platform,
                        event_type = %event_type,
                        error = format!("{e:#}"),
                        "Event handler failed"
                    );
                }
            };
            complete(work, completion).await;
        }
    }

    async fn route_command(&self, io: ChatIo, role: Role, completion: Completion) -> Routing {
        let body = io
            .event()
            .as_message()
            .map(|message| message.body.clone())
            .unwrap_or_default();

        let mut command_name = body.split_whitespace().next().unwrap_or_default();
        let mut prefix = self.inner.prefixes.first().cloned().unwrap_or_default();
        let mut has_prefix = false;
        for candidate in &self.inner.prefixes {
            if body.starts_with(candidate.as_str()) {
                prefix = candidate.clone();
                has_prefix = true;
                command_name = command_name.get(candidate.len()..).unwrap_or_default();
                break;
            }
        }

        let Some(command) = self.find_command(command_name) else {
            if has_prefix {
                debug!(name = command_name, "Unknown command");
                reply(&io, not_found_text());
                return Routing::NotFound;
            }
            return Routing::Ignored;
        };

        if !command.prefix_mode().accepts(has_prefix) {
            return Routing::Ignored;
        }

        let name = command.name().to_string();
        if let Some(only) = command.platform()
            && only != io.platform()
        {
            reply(&io, wrong_platform_text(only));
            return Routing::WrongPlatform {
                command: name,
                platform: only,
            };
        }

        let required = command.role();
        if !role.satisfies(required) {
            reply(&io, forbidden_text(role, required));
            return Routing::Forbidden {
                command: name,
                role,
                required,
            };
        }

        let (base, prop) = split_name(command_name);
        let ctx = CommandContext {
            args: split_args(&body).into_iter().skip(1).collect(),
            command_name: command_name.to_string(),
            command_base: base.to_string(),
            command_prop: prop.to_string(),
            prefix,
            has_prefix,
            role,
            usernames: self.inner.usernames.clone(),
            io,
        };

        debug!(command = %name, args = ctx.args.len(), "Running command");
        let running = name.clone();
        let work = async move {
            match command.run(ctx).await {
                Ok(()) => Routing::Ran { command: name },
                Err(e) => {
                    error!(command = %name, error = format!("{e:#}"), "Command failed");
                    Routing::Failed { command: name }
                }
            }
        };
        complete(work, completion)
            .await
            .unwrap_or(Routing::Running { command: running })
    }

    /// Queues `event` behind earlier events of the same platform.
    fn enqueue(&self, event: InferredEvent, adapter: BoxedAdapter) {
        let platform = adapter.platform();
        let mut queues = self.inner.queues.lock();

        let queued = match queues.get(&platform) {
            Some(tx) => match tx.send((event, adapter)) {
                Ok(()) => return,
                Err(mpsc::error::SendError(queued)) => queued,
            },
            None => (event, adapter),
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(platform = %platform, "dropping event: no async runtime to route it on");
            return;
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(queued);
        runtime.spawn(drain(Arc::downgrade(&self.inner), rx));
        queues.insert(platform, tx);
        debug!(platform = %platform, "Started event queue");
    }
}

/// Routes queued events one after another until the router is dropped.
async fn drain(inner: Weak<RouterInner>, mut rx: mpsc::UnboundedReceiver<Queued>) {
    while let Some((event, adapter)) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let router = CommandRouter { inner };
        let span = debug_span!(
            "route",
            platform = %adapter.platform(),
            event_type = %event.event_type(),
        );
        router
            .route(event, adapter, Completion::Detach)
            .instrument(span)
            .await;
    }
}

impl EventObserver for CommandRouter {
    fn on_event(&self, event: &InferredEvent, adapter: &BoxedAdapter) {
        self.enqueue(event.clone(), adapter.clone());
    }
}

fn reply(io: &ChatIo, text: String) {
    if let Err(e) = io.reply(text) {
        warn!(error = %e, "Failed to send router reply");
    }
}

fn wrong_platform_text(platform: Platform) -> String {
    format!("🔒 Restricted Access!\nThis only works on platform named \"{platform}\".")
}

fn forbidden_text(role: Role, required: Role) -> String {
    format!("👑 No Permission!\n\n• Your role: {role}\n• Required role: {required}")
}

fn not_found_text() -> String {
    [
        "⁉️ Command not found.",
        "",
        "• Check the spelling of the command.",
        "• Check the help list.",
        "• Ask for guidance from the admin.",
    ]
    .join("\n")
}
