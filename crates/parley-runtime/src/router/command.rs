//! Commands and the context they run with.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use parley_core::{ChatIo, InferredEvent, Platform, Role};

use crate::usernames::UsernameCache;

/// Whether a command expects one of the configured prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefixMode {
    /// Runs only when the message starts with a prefix.
    #[default]
    Required,
    /// Runs with or without a prefix.
    Optional,
    /// Runs only when the message has no prefix.
    Forbidden,
}

impl PrefixMode {
    /// Returns `true` if a message with or without a prefix may run the command.
    pub fn accepts(self, has_prefix: bool) -> bool {
        match self {
            Self::Required => has_prefix,
            Self::Optional => true,
            Self::Forbidden => !has_prefix,
        }
    }
}

/// Everything a command invocation needs.
#[derive(Clone)]
pub struct CommandContext {
    /// Facade over the triggering message.
    pub io: ChatIo,
    /// Arguments after the command name, quote-aware.
    pub args: Vec<String>,
    /// The command name as typed, prefix stripped.
    pub command_name: String,
    /// The part of the name before the first `-`.
    pub command_base: String,
    /// The part of the name after the first `-`, possibly empty.
    pub command_prop: String,
    /// The prefix the message used, or the first configured prefix.
    pub prefix: String,
    /// Whether the message started with a prefix.
    pub has_prefix: bool,
    /// Role of the sender.
    pub role: Role,
    pub(crate) usernames: Arc<UsernameCache>,
}

impl CommandContext {
    /// Returns the triggering event.
    pub fn event(&self) -> &InferredEvent {
        self.io.event()
    }

    /// Returns the platform the message arrived on.
    pub fn platform(&self) -> Platform {
        self.io.platform()
    }

    /// Returns the full message body.
    pub fn body(&self) -> &str {
        self.io
            .event()
            .as_message()
            .map(|message| message.body.as_str())
            .unwrap_or_default()
    }

    /// Returns the argument at `index`.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Returns the display name of `user_id`, cached per platform.
    pub async fn username(&self, user_id: &str) -> String {
        self.usernames.get(self.io.adapter(), user_id).await
    }

    /// Returns the username cache.
    pub fn usernames(&self) -> &Arc<UsernameCache> {
        &self.usernames
    }
}

/// A named command.
#[async_trait]
pub trait Command: Send + Sync + 'static {
    /// Primary name, matched case-insensitively.
    fn name(&self) -> &str;

    /// Alternative names.
    fn aliases(&self) -> &[String] {
        &[]
    }

    fn description(&self) -> &str {
        ""
    }

    /// Role required to run the command.
    fn role(&self) -> Role {
        Role::Everyone
    }

    /// The only platform the command runs on, if restricted.
    fn platform(&self) -> Option<Platform> {
        None
    }

    fn prefix_mode(&self) -> PrefixMode {
        PrefixMode::Required
    }

    /// Runs the command.
    async fn run(&self, ctx: CommandContext) -> anyhow::Result<()>;
}

/// A command built from a closure.
///
/// ```rust,ignore
/// let ping = FnCommand::new("ping", |ctx: CommandContext| async move {
///     ctx.io.reply("pong")?.await?;
///     Ok(())
/// })
/// .alias("p");
/// ```
pub struct FnCommand<F, Fut> {
    name: String,
    aliases: Vec<String>,
    description: String,
    role: Role,
    platform: Option<Platform>,
    prefix_mode: PrefixMode,
    run: F,
    _marker: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnCommand<F, Fut>
where
    F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, run: F) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            description: String::new(),
            role: Role::Everyone,
            platform: None,
            prefix_mode: PrefixMode::Required,
            run,
            _marker: PhantomData,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn prefix_mode(mut self, mode: PrefixMode) -> Self {
        self.prefix_mode = mode;
        self
    }
}

#[async_trait]
impl<F, Fut> Command for FnCommand<F, Fut>
where
    F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn aliases(&self) -> &[String] {
        &self.aliases
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn role(&self) -> Role {
        self.role
    }

    fn platform(&self) -> Option<Platform> {
        self.platform
    }

    fn prefix_mode(&self) -> PrefixMode {
        self.prefix_mode
    }

    async fn run(&self, ctx: CommandContext) -> anyhow::Result<()> {
        (self.run)(ctx).await
    }
}
