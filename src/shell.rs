//! Line-oriented shell over the conversation store.

use std::io::{self, Write};

use crate::conversations::{
    Conversation, ConversationError, ConversationId, ConversationStore, PersistOutcome, Responder,
    send_message,
};

/// Characters of the first message shown in search results.
const PREVIEW_CHARS: usize = 60;

/// Characters of a conversation id shown in listings.
const SHORT_ID_LEN: usize = 8;

/// Usage text printed by `/help`.
const HELP: &str = "\
/new                  start a conversation
/list                 list conversations (* marks the current one)
/select <id>          switch conversation (an id prefix is enough)
/rename <id> <title>  rename a conversation
/delete <id>          delete a conversation
/search <query>       search titles and messages
/show                 print the current conversation
/help                 show this help
/quit                 exit
anything else is sent as a message";

/// A parsed shell line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    /// Blank line.
    Empty,
    /// `/new`.
    New,
    /// `/list`.
    List,
    /// `/select <id>`.
    Select(String),
    /// `/rename <id> <title>`.
    Rename {
        /// Conversation id or prefix.
        id: String,
        /// New title.
        title: String,
    },
    /// `/delete <id>`.
    Delete(String),
    /// `/search <query>`.
    Search(String),
    /// `/show`.
    Show,
    /// `/help`.
    Help,
    /// `/quit`.
    Quit,
    /// Plain text sent as a user message.
    Send(String),
}

/// Parse one input line.
///
/// # Errors
/// Returns a usage message for unknown commands or missing arguments.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Empty);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Send(line.to_string()));
    };

    let (name, args) = rest
        .split_once(char::is_whitespace)
        .map_or((rest, ""), |(name, args)| (name, args.trim()));

    let required = |usage: &str| {
        if args.is_empty() {
            Err(format!("usage: {usage}"))
        } else {
            Ok(args.to_string())
        }
    };

    match name {
        "new" => Ok(Command::New),
        "list" => Ok(Command::List),
        "show" => Ok(Command::Show),
        "help" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        "select" => required("/select <id>").map(Command::Select),
        "delete" => required("/delete <id>").map(Command::Delete),
        "search" => required("/search <query>").map(Command::Search),
        "rename" => {
            let args = required("/rename <id> <title>")?;
            let (id, title) = args
                .split_once(char::is_whitespace)
                .ok_or_else(|| "usage: /rename <id> <title>".to_string())?;
            Ok(Command::Rename {
                id: id.to_string(),
                title: title.trim().to_string(),
            })
        }
        other => Err(format!("unknown command /{other}, try /help")),
    }
}

/// Whether the shell should keep reading.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flow {
    /// Read the next line.
    Continue,
    /// Stop the session.
    Quit,
}

/// Interactive session state.
pub struct Shell {
    store: ConversationStore,
    responder: Box<dyn Responder>,
}

impl Shell {
    /// Wrap an initialized store.
    #[must_use]
    pub fn new(store: ConversationStore, responder: Box<dyn Responder>) -> Self {
        Self { store, responder }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Parse and run one line.
    ///
    /// # Errors
    /// Returns an error only if writing to `out` fails.
    pub async fn handle_line<W: Write>(&mut self, line: &str, out: &mut W) -> io::Result<Flow> {
        match parse_command(line) {
            Ok(command) => self.execute(command, out).await,
            Err(usage) => {
                writeln!(out, "{usage}")?;
                Ok(Flow::Continue)
            }
        }
    }

    /// Run one command.
    ///
    /// # Errors
    /// Returns an error only if writing to `out` fails.
    pub async fn execute<W: Write>(&mut self, command: Command, out: &mut W) -> io::Result<Flow> {
        match command {
            Command::Empty => {}
            Command::Quit => return Ok(Flow::Quit),
            Command::Help => writeln!(out, "{HELP}")?,
            Command::New => {
                let committed = self.store.create_conversation().await;
                writeln!(out, "created {}", short(&committed.value))?;
                report_persistence(&committed.persistence, out)?;
            }
            Command::List => self.list(out)?,
            Command::Show => self.show(out)?,
            Command::Search(query) => self.search(&query, out)?,
            Command::Select(token) => {
                if let Some(id) = self.resolve(&token, out)? {
                    match self.store.select_conversation(&id) {
                        Ok(()) => self.show(out)?,
                        Err(err) => writeln!(out, "error: {}", describe(&err))?,
                    }
                }
            }
            Command::Rename { id, title } => {
                if let Some(id) = self.resolve(&id, out)? {
                    match self.store.update_conversation_title(&id, &title).await {
                        Ok(committed) => {
                            writeln!(out, "renamed {}", short(&id))?;
                            report_persistence(&committed.persistence, out)?;
                        }
                        Err(err) => writeln!(out, "error: {}", describe(&err))?,
                    }
                }
            }
            Command::Delete(token) => {
                if let Some(id) = self.resolve(&token, out)? {
                    match self.store.delete_conversation(&id).await {
                        Ok(committed) => {
                            writeln!(out, "deleted {}", short(&id))?;
                            report_persistence(&committed.persistence, out)?;
                        }
                        Err(err) => writeln!(out, "error: {}", describe(&err))?,
                    }
                }
            }
            Command::Send(content) => {
                match send_message(&mut self.store, self.responder.as_ref(), &content).await {
                    Ok(turn) => {
                        writeln!(out, "assistant: {}", turn.assistant.content)?;
                        report_persistence(&turn.persistence, out)?;
                    }
                    Err(err) => writeln!(out, "error: {}", describe(&err))?,
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn list<W: Write>(&self, out: &mut W) -> io::Result<()> {
        if self.store.conversations().is_empty() {
            return writeln!(out, "no conversations yet");
        }
        let current = self.store.current_conversation_id();
        for conversation in self.store.conversations() {
            let marker = if Some(conversation.id()) == current { '*' } else { ' ' };
            writeln!(
                out,
                "{marker} {}  {}  ({} messages, {})",
                short(conversation.id()),
                conversation.title(),
                conversation.messages().len(),
                conversation.updated_at().format("%Y-%m-%d %H:%M"),
            )?;
        }
        Ok(())
    }

    fn show<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let Some(conversation) = self.store.current_conversation() else {
            return writeln!(out, "no conversation selected");
        };
        writeln!(out, "# {}", conversation.title())?;
        for message in conversation.messages() {
            writeln!(out, "{}: {}", message.role, message.content)?;
        }
        Ok(())
    }

    fn search<W: Write>(&self, query: &str, out: &mut W) -> io::Result<()> {
        let hits = self.store.search(query);
        if hits.is_empty() {
            return writeln!(out, "No conversations found");
        }
        for conversation in hits {
            let preview = conversation.preview(PREVIEW_CHARS).unwrap_or_default();
            writeln!(
                out,
                "{}  {}  {preview}...",
                short(conversation.id()),
                conversation.title()
            )?;
        }
        Ok(())
    }

    /// Resolve a full id or a unique id prefix.
    fn resolve<W: Write>(&self, token: &str, out: &mut W) -> io::Result<Option<ConversationId>> {
        let exact = token
            .parse::<ConversationId>()
            .ok()
            .and_then(|id| self.store.get(&id));
        if let Some(conversation) = exact {
            return Ok(Some(conversation.id().clone()));
        }
        let token = token.trim().to_ascii_lowercase();
        let mut matches = self
            .store
            .conversations()
            .iter()
            .map(Conversation::id)
            .filter(|id| id.as_str().to_ascii_lowercase().starts_with(&token));

        match (matches.next(), matches.next()) {
            (Some(id), None) => Ok(Some(id.clone())),
            (Some(_), Some(_)) => {
                writeln!(out, "error: id prefix {token:?} is ambiguous")?;
                Ok(None)
            }
            (None, _) => {
                writeln!(out, "error: no conversation matches {token:?}")?;
                Ok(None)
            }
        }
    }
}

fn short(id: &ConversationId) -> String {
    id.as_str().chars().take(SHORT_ID_LEN).collect()
}

fn report_persistence<W: Write>(outcome: &PersistOutcome, out: &mut W) -> io::Result<()> {
    if let PersistOutcome::Failed(reason) = outcome {
        writeln!(out, "warning: changes kept in memory only: {reason}")?;
    }
    Ok(())
}

/// Render a store error for the shell.
#[must_use]
pub fn describe(err: &ConversationError) -> String {
    if err.is_storage() {
        format!("storage problem: {err}")
    } else {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use crate::conversations::{ManualClock, MemorySlot, StubResponder, TitleConfig};

    async fn shell_with(slot: Arc<MemorySlot>) -> Shell {
        let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()));
        let store = ConversationStore::initialize(slot, clock, TitleConfig::default()).await;
        Shell::new(
            store,
            Box::new(StubResponder::new(Duration::ZERO, "On it.")),
        )
    }

    async fn run(shell: &mut Shell, line: &str) -> String {
        let mut out = Vec::new();
        shell.handle_line(line, &mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("   "), Ok(Command::Empty));
        assert_eq!(parse_command("/new"), Ok(Command::New));
        assert_eq!(parse_command("/exit"), Ok(Command::Quit));
        assert_eq!(
            parse_command("/select abc"),
            Ok(Command::Select("abc".to_string()))
        );
        assert_eq!(
            parse_command("/rename abc  Austin leads "),
            Ok(Command::Rename {
                id: "abc".to_string(),
                title: "Austin leads".to_string(),
            })
        );
        assert_eq!(
            parse_command(" hello there "),
            Ok(Command::Send("hello there".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_command("/select").is_err());
        assert!(parse_command("/rename abc").is_err());
        assert!(parse_command("/frobnicate").is_err());
    }

    #[tokio::test]
    async fn test_send_then_list_and_show() {
        let mut shell = shell_with(Arc::new(MemorySlot::new())).await;
        let reply = run(&mut shell, "Find SaaS leads").await;
        assert_eq!(reply, "assistant: On it.\n");

        let listing = run(&mut shell, "/list").await;
        assert!(listing.starts_with('*'));
        assert!(listing.contains("Find SaaS leads"));
        assert!(listing.contains("(2 messages"));

        let shown = run(&mut shell, "/show").await;
        assert_eq!(shown, "# Find SaaS leads\nuser: Find SaaS leads\nassistant: On it.\n");
    }

    #[tokio::test]
    async fn test_select_rename_delete_by_prefix() {
        let mut shell = shell_with(Arc::new(MemorySlot::new())).await;
        run(&mut shell, "/new").await;
        let id = shell.store().current_conversation_id().unwrap().clone();
        let prefix = short(&id);

        run(&mut shell, &format!("/rename {prefix} Pipeline review")).await;
        assert_eq!(shell.store().get(&id).unwrap().title(), "Pipeline review");

        let blank = run(&mut shell, &format!("/rename {prefix}    ")).await;
        assert!(blank.starts_with("usage"));

        let deleted = run(&mut shell, &format!("/delete {prefix}")).await;
        assert!(deleted.starts_with("deleted"));
        assert!(shell.store().conversations().is_empty());

        let missing = run(&mut shell, &format!("/select {prefix}")).await;
        assert!(missing.starts_with("error"));
    }

    #[tokio::test]
    async fn test_select_by_full_stored_id() {
        let raw = r#"[{"id":"1700000000000","title":"Older","messages":[],"createdAt":"2023-11-14T22:13:20.000Z","updatedAt":"2023-11-14T22:13:20.000Z"},{"id":"1700000000","title":"Oldest","messages":[],"createdAt":"2023-11-14T22:13:20.000Z","updatedAt":"2023-11-14T22:13:20.000Z"}]"#;
        let mut shell = shell_with(Arc::new(MemorySlot::with_value(raw))).await;

        let shown = run(&mut shell, "/select 1700000000").await;
        assert_eq!(shown, "# Oldest\n");
        let ambiguous = run(&mut shell, "/select 17000").await;
        assert!(ambiguous.contains("ambiguous"));
    }

    #[tokio::test]
    async fn test_search_output() {
        let mut shell = shell_with(Arc::new(MemorySlot::new())).await;
        run(&mut shell, "Austin SaaS founders").await;
        assert!(run(&mut shell, "/search austin").await.contains("Austin SaaS founders"));
        assert_eq!(run(&mut shell, "/search denver").await, "No conversations found\n");
    }

    #[tokio::test]
    async fn test_failed_write_is_reported_as_warning() {
        let slot = Arc::new(MemorySlot::new());
        let mut shell = shell_with(slot.clone()).await;
        slot.set_unavailable(true);
        let out = run(&mut shell, "/new").await;
        assert!(out.contains("warning: changes kept in memory only"));
        assert_eq!(shell.store().conversations().len(), 1);
    }

    #[tokio::test]
    async fn test_quit_stops() {
        let mut shell = shell_with(Arc::new(MemorySlot::new())).await;
        let mut out = Vec::new();
        assert_eq!(shell.handle_line("/quit", &mut out).await.unwrap(), Flow::Quit);
    }

    #[test]
    fn test_describe_marks_storage_errors() {
        let err = ConversationError::Unavailable("disk gone".to_string());
        assert!(describe(&err).starts_with("storage problem"));
        let err = ConversationError::InvalidTitle("empty".to_string());
        assert_eq!(describe(&err), "invalid title: empty");
    }
}
