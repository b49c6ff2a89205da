//! Operator command surface.
//!
//! Commands are looked up in a static dispatch table that declares each
//! command's arity; link parsing always goes through `locator::resolve`.
//! Forwards run on a spawned task so `/status` stays responsive, and the run
//! tracker rejects a second forward while one is in flight.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    domain::ChatId,
    errors::Error,
    locator::{self, LINK_EXAMPLE},
    messaging::port::MessagingPort,
    sequencer::{BatchObserver, BatchRun, BatchSequencer},
    status::ServiceStatus,
    tracker::{RunKind, RunSnapshot, RunTicket, RunTracker},
    transfer::TransferOutcome,
    utils::{format_duration, split_text_chunks},
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandAction {
    Help,
    Forward,
    Batch,
    Status,
}

#[derive(Clone, Copy, Debug)]
pub struct CommandSpec {
    pub name: &'static str,
    pub usage: &'static str,
    pub about: &'static str,
    pub min_args: usize,
    pub action: CommandAction,
}

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "start",
        usage: "/start",
        about: "Show this help message",
        min_args: 0,
        action: CommandAction::Help,
    },
    CommandSpec {
        name: "help",
        usage: "/help",
        about: "Show this help message",
        min_args: 0,
        action: CommandAction::Help,
    },
    CommandSpec {
        name: "forward",
        usage: "/forward https://t.me/c/xxxxxxxxxx/123",
        about: "Relay a single message",
        min_args: 1,
        action: CommandAction::Forward,
    },
    CommandSpec {
        name: "batch",
        usage: "/batch https://t.me/c/xxxx/100 https://t.me/c/xxxx/150",
        about: "Relay every message between two links (inclusive)",
        min_args: 2,
        action: CommandAction::Batch,
    },
    CommandSpec {
        name: "status",
        usage: "/status",
        about: "Show uptime and the running forward",
        min_args: 0,
        action: CommandAction::Status,
    },
];

pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|c| c.name == name)
}

/// A command line split into its parts.
#[derive(Debug, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    /// Lowercased, without the leading `/`.
    pub name: String,
    /// The `@botname` suffix, if any.
    pub addressee: Option<&'a str>,
    pub args: Vec<&'a str>,
}

impl ParsedCommand<'_> {
    /// A command with no suffix is addressed to everyone; one with a suffix
    /// only to the bot of that name.
    pub fn is_for(&self, bot_username: Option<&str>) -> bool {
        match (self.addressee, bot_username) {
            (None, _) => true,
            (Some(to), Some(me)) => to.eq_ignore_ascii_case(me.trim_start_matches('@')),
            (Some(_), None) => false,
        }
    }
}

/// Split `/cmd@botname arg1 arg2` into a lowercase name, the addressee and the arguments.
pub fn parse_command(text: &str) -> Option<ParsedCommand<'_>> {
    let mut parts = text.split_whitespace();
    let first = parts.next()?.strip_prefix('/')?;
    let (name, addressee) = match first.split_once('@') {
        Some((name, to)) => (name, Some(to)),
        None => (first, None),
    };
    if name.is_empty() {
        return None;
    }
    Some(ParsedCommand {
        name: name.to_lowercase(),
        addressee,
        args: parts.collect(),
    })
}

pub fn help_text() -> String {
    let mut lines = vec!["🤖 Restricted Forwarder\n".to_string(), "Commands:".to_string()];
    for c in COMMANDS.iter().filter(|c| c.name != "start") {
        lines.push(format!("{} - {}", c.usage, c.about));
    }
    lines.push(String::new());
    lines.push("Private links look like https://t.me/c/1234567890/123, public ones like https://t.me/channel/123.".to_string());
    lines.push(String::new());
    lines.push("The bot must be a member of the source chat. Chats with protected content (forwarding disabled) cannot be relayed.".to_string());
    lines.join("\n")
}

fn format_error(e: &Error) -> String {
    match e {
        Error::InvalidLocator { reason, .. } => {
            format!("❌ Invalid link: {reason}\nUse: {LINK_EXAMPLE}")
        }
        Error::Busy => format!("⏳ {e}"),
        Error::Usage(msg) => msg.clone(),
        other => format!("❌ {other}"),
    }
}

fn progress_line(run: &BatchRun) -> String {
    format!(
        "{}/{} ({}%) • {} relayed • {} failed",
        run.processed,
        run.total(),
        run.percent(),
        run.succeeded,
        run.failed()
    )
}

fn batch_report(run: &BatchRun) -> String {
    let mut lines = Vec::new();
    if run.interrupted {
        lines.push(format!(
            "⚠️ Batch interrupted • {}/{} messages processed",
            run.processed,
            run.total()
        ));
    } else {
        lines.push(format!(
            "✅ Batch finished • {} messages processed",
            run.processed
        ));
    }
    lines.push(format!(
        "Relayed: {} • Failed: {}",
        run.succeeded,
        run.failed()
    ));

    if !run.failures.is_empty() {
        lines.push("\nFailed:".to_string());
        for f in &run.failures {
            lines.push(format!("• {}: {}", f.message_id, f.detail));
        }
        let hidden = run.failed() as usize - run.failures.len();
        if hidden > 0 {
            lines.push(format!("… and {hidden} more"));
        }
    }
    lines.join("\n")
}

fn run_line(snap: &RunSnapshot) -> String {
    let run = &snap.run;
    let label = match snap.kind {
        RunKind::Single => "Single forward",
        RunKind::Batch => "Batch",
    };
    format!(
        "🔄 {label} in {}: {} → {}\n   └─ {} • running {}",
        run.conversation,
        run.start,
        run.end,
        progress_line(run),
        format_duration(snap.elapsed_secs)
    )
}

pub struct CommandSurface {
    sequencer: Arc<BatchSequencer>,
    tracker: Arc<RunTracker>,
    status: Arc<ServiceStatus>,
    messenger: Arc<dyn MessagingPort>,
    max_batch_size: u32,
    bot_username: OnceLock<String>,
}

impl CommandSurface {
    pub fn new(
        sequencer: Arc<BatchSequencer>,
        tracker: Arc<RunTracker>,
        status: Arc<ServiceStatus>,
        messenger: Arc<dyn MessagingPort>,
        max_batch_size: u32,
    ) -> Self {
        Self {
            sequencer,
            tracker,
            status,
            messenger,
            max_batch_size,
            bot_username: OnceLock::new(),
        }
    }

    /// Record the bot's own username once it is known. Until then, commands
    /// carrying an `@suffix` are ignored.
    pub fn set_bot_username(&self, username: &str) {
        let _ = self.bot_username.set(username.to_string());
    }

    /// Handle one operator message. Returns the spawned forward, if any.
    pub async fn handle(self: &Arc<Self>, chat: ChatId, text: &str) -> Option<JoinHandle<()>> {
        match self.dispatch(chat, text).await {
            Ok(task) => task,
            Err(e) => {
                info!(chat_id = chat.0, error = %e, "command rejected");
                self.reply(chat, &format_error(&e)).await;
                None
            }
        }
    }

    async fn dispatch(self: &Arc<Self>, chat: ChatId, text: &str) -> Result<Option<JoinHandle<()>>> {
        let cmd = parse_command(text).ok_or_else(|| {
            Error::Usage("Commands start with '/'. Send /help for usage.".to_string())
        })?;
        if !cmd.is_for(self.bot_username.get().map(String::as_str)) {
            debug!(chat_id = chat.0, addressee = ?cmd.addressee, "command addressed to another bot");
            return Ok(None);
        }
        let ParsedCommand { name, args, .. } = cmd;
        let spec = lookup(&name).ok_or_else(|| {
            Error::Usage(format!("Unknown command: /{name}\nSend /help for usage."))
        })?;
        if args.len() < spec.min_args {
            return Err(Error::Usage(format!("Usage:\n{}", spec.usage)));
        }

        match spec.action {
            CommandAction::Help => {
                self.reply(chat, &help_text()).await;
                Ok(None)
            }
            CommandAction::Status => {
                self.reply(chat, &self.status_text()).await;
                Ok(None)
            }
            CommandAction::Forward => self.start_forward(chat, args[0]).await.map(Some),
            CommandAction::Batch => self.start_batch(chat, args[0], args[1]).await.map(Some),
        }
    }

    async fn start_forward(self: &Arc<Self>, chat: ChatId, link: &str) -> Result<JoinHandle<()>> {
        let loc = locator::resolve(link)?;
        let run = BatchRun::new(loc.conversation.clone(), loc.message_id, loc.message_id);
        let ticket = self.tracker.try_begin(RunKind::Single, run.clone())?;

        self.reply(chat, &format!("Starting single forward → {}", loc.message_id))
            .await;

        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let outcome = this
                .sequencer
                .engine()
                .transfer(&loc.conversation, loc.message_id)
                .await;
            let mut run = run;
            run.record(&outcome);
            ticket.record(&run);

            let text = if outcome.succeeded() {
                "✅ Done".to_string()
            } else {
                format!("❌ Message {}: {}", outcome.message_id, outcome.detail())
            };
            this.reply(chat, &text).await;
            drop(ticket);
        }))
    }

    async fn start_batch(
        self: &Arc<Self>,
        chat: ChatId,
        first: &str,
        last: &str,
    ) -> Result<JoinHandle<()>> {
        let start = locator::resolve(first)?;
        let end = locator::resolve(last)?;
        if start.conversation != end.conversation {
            return Err(Error::CrossConversationBatch {
                start: start.conversation,
                end: end.conversation,
            });
        }

        let run = BatchRun::new(start.conversation, start.message_id, end.message_id);
        if run.total() > self.max_batch_size {
            return Err(Error::Usage(format!(
                "❌ Range too large: {} messages (max {}). Split it into smaller batches.",
                run.total(),
                self.max_batch_size
            )));
        }
        let ticket = self.tracker.try_begin(RunKind::Batch, run.clone())?;

        self.reply(
            chat,
            &format!(
                "Batch processing {} → {} ({} messages, may take time)",
                run.start,
                run.end,
                run.total()
            ),
        )
        .await;

        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let observer = ReplyObserver {
                surface: Arc::clone(&this),
                chat,
                ticket,
            };
            let done = this
                .sequencer
                .run_batch(run.conversation, run.start, run.end, &observer)
                .await;

            this.reply(chat, &batch_report(&done)).await;
            drop(observer);
        }))
    }

    fn status_text(&self) -> String {
        let mut lines = vec!["📊 Forwarder Status\n".to_string()];
        lines.push(format!(
            "⏱️ Uptime: {}",
            format_duration(self.status.uptime().as_secs())
        ));
        lines.push(format!(
            "🔌 Connected: {}",
            if self.status.is_connected() { "yes" } else { "no" }
        ));
        match self.tracker.snapshot() {
            Some(snap) => lines.push(run_line(&snap)),
            None => lines.push("⚪ Idle".to_string()),
        }
        lines.join("\n")
    }

    async fn reply(&self, chat: ChatId, text: &str) {
        let limit = self.messenger.capabilities().max_message_len;
        for chunk in split_text_chunks(text, limit) {
            if let Err(e) = self.messenger.send_text(chat, &chunk).await {
                warn!(chat_id = chat.0, error = %e, "failed to send reply");
            }
        }
    }
}

/// Mirrors batch progress into the run tracker and the operator chat.
struct ReplyObserver {
    surface: Arc<CommandSurface>,
    chat: ChatId,
    ticket: RunTicket,
}

#[async_trait]
impl BatchObserver for ReplyObserver {
    fn on_attempt(&self, run: &BatchRun, _outcome: &TransferOutcome) {
        self.ticket.record(run);
    }

    async fn on_progress(&self, run: &BatchRun) {
        self.surface
            .reply(self.chat, &format!("⏳ Progress: {}", progress_line(run)))
            .await;
    }
}
