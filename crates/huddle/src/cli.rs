//! CLI (Command Line Interface) mode
//!
//! Interactive REPL over one domain. Each line after the first is a
//! follow-up in the same conversation until `/clear`.

use huddle_core::Query;
use huddle_core::Response;
use huddle_core::orchestration::{Outcome, Role};
use nu_ansi_term::{Color, Style};
use reedline::{
    ColumnarMenu, Completer, DefaultHinter, Emacs, KeyCode, KeyModifiers, Keybindings, MenuBuilder,
    Prompt, Reedline, ReedlineEvent, ReedlineMenu, Signal, Suggestion,
};

use crate::App;

/// Available commands for autocomplete display
const COMMANDS: &[(&str, &str)] = &[
    ("/help", "Show help"),
    ("/exit", "Exit the program"),
    ("/quit", "Exit the program"),
    ("/clear", "Start a new conversation"),
    ("/history", "Show the conversation so far"),
    ("/domains", "List available domains"),
    ("/trace", "Toggle per-sub-query results after each answer"),
];

/// Command completer for reedline
#[derive(Clone)]
pub struct CommandCompleter {
    commands: Vec<(&'static str, &'static str)>,
}

impl CommandCompleter {
    pub fn new() -> Self {
        Self {
            commands: COMMANDS.to_vec(),
        }
    }
}

impl Default for CommandCompleter {
    fn default() -> Self {
        Self::new()
    }
}

impl Completer for CommandCompleter {
    fn complete(&mut self, line: &str, pos: usize) -> Vec<Suggestion> {
        if !line.starts_with('/') {
            return Vec::new();
        }

        self.commands
            .iter()
            .filter(|(cmd, _)| cmd.starts_with(line))
            .map(|(cmd, desc)| Suggestion {
                value: cmd.to_string(),
                description: Some(desc.to_string()),
                extra: None,
                span: reedline::Span::new(0, pos),
                append_whitespace: true,
                style: None,
            })
            .collect()
    }
}

/// Prompt showing the active domain
struct DomainPrompt {
    domain: String,
    style: Style,
}

impl DomainPrompt {
    fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            style: Color::Cyan.bold(),
        }
    }
}

impl Prompt for DomainPrompt {
    fn render_prompt_left(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Owned(self.style.paint(format!("{}> ", self.domain)).to_string())
    }

    fn render_prompt_right(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _prompt_mode: reedline::PromptEditMode) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_history_search_indicator(
        &self,
        _history_search: reedline::PromptHistorySearch,
    ) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }
}

/// REPL state carried between lines
#[derive(Default)]
struct Session {
    /// Last answered query and its answer text
    last: Option<(Query, String)>,
    trace: bool,
}

impl Session {
    /// Next query: a follow-up when a conversation is in progress
    fn next_query(&self, text: &str) -> Query {
        match &self.last {
            Some((query, answer)) => query.follow_up(answer.as_str(), text),
            None => Query::new(text),
        }
    }
}

/// What the loop should do after a command
#[derive(Debug, PartialEq, Eq)]
enum CommandResult {
    Handled,
    Exit,
    NotCommand,
}

/// Run CLI interactive mode
pub async fn run_cli(app: App) -> anyhow::Result<()> {
    print_welcome(&app.domain);

    let mut keybindings = default_keybindings();

    // Trigger completion on '/' key
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Char('/'),
        ReedlineEvent::Edit(vec![reedline::EditCommand::Complete]),
    );

    let menu = Box::new(
        ColumnarMenu::default()
            .with_name("command_menu")
            .with_columns(1)
            .with_column_width(Some(48))
            .with_only_buffer_difference(false),
    );

    let hinter = DefaultHinter::default().with_style(Style::new().dimmed());

    let mut line_editor = Reedline::create()
        .with_completer(Box::new(CommandCompleter::new()))
        .with_menu(ReedlineMenu::EngineCompleter(menu))
        .with_hinter(Box::new(hinter))
        .with_edit_mode(Box::new(Emacs::new(keybindings)));

    let prompt = DomainPrompt::new(&app.domain);
    let mut session = Session::default();

    loop {
        match line_editor.read_line(&prompt) {
            Ok(Signal::Success(line)) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }

                match handle_command(input, &mut session, &app).await {
                    CommandResult::Exit => break,
                    CommandResult::Handled => continue,
                    CommandResult::NotCommand => {}
                }

                let query = session.next_query(input);
                match app.answer(&query).await {
                    Ok(response) => {
                        println!("\n{}\n", response.answer.text);
                        if session.trace {
                            print_results(&response);
                        }
                        session.last = Some((query, response.answer.text));
                    }
                    Err(e) => {
                        eprintln!("\n❌ Error: {}\n", e);
                    }
                }
            }
            Ok(Signal::CtrlC) => {
                println!("^C");
                continue;
            }
            Ok(Signal::CtrlD) => {
                println!("\n👋 Bye!\n");
                break;
            }
            Err(err) => {
                eprintln!("\n❌ Error: {}\n", err);
                break;
            }
        }
    }

    Ok(())
}

/// Default keybindings for reedline
fn default_keybindings() -> Keybindings {
    let mut keybindings = Keybindings::new();
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Tab,
        ReedlineEvent::Edit(vec![reedline::EditCommand::Complete]),
    );
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Enter, ReedlineEvent::Submit);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Esc, ReedlineEvent::Esc);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('c'), ReedlineEvent::CtrlC);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('d'), ReedlineEvent::CtrlD);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Up, ReedlineEvent::Up);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Down, ReedlineEvent::Down);
    keybindings
}

/// Handle slash commands
async fn handle_command(input: &str, session: &mut Session, app: &App) -> CommandResult {
    let lower = input.to_lowercase();

    match lower.as_str() {
        "/exit" | "/quit" | "/q" => {
            println!("\n👋 Bye!\n");
            CommandResult::Exit
        }
        "/clear" => {
            session.last = None;
            println!("\n✅ Started a new conversation.\n");
            CommandResult::Handled
        }
        "/help" | "/?" => {
            print_help();
            CommandResult::Handled
        }
        "/history" => {
            print_history(session);
            CommandResult::Handled
        }
        "/trace" => {
            session.trace = !session.trace;
            println!("\n🔎 Trace {}\n", if session.trace { "on" } else { "off" });
            CommandResult::Handled
        }
        "/domains" => {
            match app.loader.list().await {
                Ok(domains) => {
                    println!();
                    println!("📂 Domains in {}:", app.loader.dir().display());
                    for name in domains {
                        let marker = if name == app.domain { "*" } else { " " };
                        println!("  {} {}", marker, name);
                    }
                    println!();
                }
                Err(e) => eprintln!("\n❌ Error: {}\n", e),
            }
            CommandResult::Handled
        }
        _ if lower.starts_with('/') => {
            eprintln!("\n❓ Unknown command: {}. Type /help for a list of commands.\n", input);
            CommandResult::Handled
        }
        _ => CommandResult::NotCommand,
    }
}

/// Print one line per sub-query with its handler and outcome
pub fn print_results(response: &Response) {
    println!(
        "{}",
        Style::new()
            .dimmed()
            .paint(format!("request {} ({} ms)", response.request_id, response.elapsed_ms))
    );

    for (i, result) in response.results.iter().enumerate() {
        let status = match &result.outcome {
            Outcome::Answered(answer) if answer.is_partial() => {
                Color::Yellow.paint(format!("partial after {} hops", answer.hops))
            }
            Outcome::Answered(answer) => Color::Green.paint(format!("ok after {} hops", answer.hops)),
            Outcome::Failed(failure) => Color::Red.paint(failure.to_string()),
        };
        println!(
            "{}. [{}] {} - {}",
            i + 1,
            result.subquery.handler(),
            result.subquery.text(),
            status
        );
    }
    println!();
}

/// Print welcome message
fn print_welcome(domain: &str) {
    println!();
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║          🏟️  huddle CLI - interactive mode                  ║");
    println!("╠════════════════════════════════════════════════════════════╣");
    println!("║  Ask a question and press Enter                            ║");
    println!("║  Commands: /help, /exit, /clear, /history, /trace          ║");
    println!("║  Type / to see command suggestions                         ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!("  Domain: {}", domain);
    println!();
}

/// Print help message
fn print_help() {
    println!();
    println!("📖 Available commands:");
    for (cmd, desc) in COMMANDS {
        println!("  {} - {}", cmd, desc);
    }
    println!();
    println!("💡 Questions after the first are follow-ups until /clear");
    println!("💡 Ctrl+C while a question is running cancels it");
    println!();
}

/// Print conversation history
fn print_history(session: &Session) {
    let Some((query, answer)) = &session.last else {
        println!("\n📜 No conversation yet.\n");
        return;
    };

    let turns = query.history().len() + 2;
    println!();
    println!("📜 Conversation ({} turns):", turns);
    println!("{}", "─".repeat(50));

    let lines = query
        .history()
        .iter()
        .map(|turn| (turn.role, turn.text.as_str()))
        .chain([(Role::User, query.text()), (Role::Assistant, answer.as_str())]);

    for (i, (role, text)) in lines.enumerate() {
        let who = match role {
            Role::User => "👤 You",
            Role::Assistant => "🤖 huddle",
            _ => "⚙️",
        };
        println!("{}. {}: {}", i + 1, who, preview(text).replace('\n', " "));
    }

    println!("{}", "─".repeat(50));
    println!();
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(100) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
