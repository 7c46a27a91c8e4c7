//! REPL (Read-Eval-Print Loop) implementation for interactive chat.

use anyhow::Result;
use console::{Style, Term, style};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

use carrivo_domain::{DomainServices, LanguageHint};

use super::print_reply;

/// REPL state and configuration.
pub struct Repl {
    services: DomainServices,
    session_id: Option<String>,
    language: LanguageHint,
    editor: Editor<(), DefaultHistory>,
    term: Term,
    verbose: bool,
}

impl Repl {
    /// Create a new REPL instance.
    pub fn new(
        services: DomainServices,
        session_id: Option<String>,
        language: LanguageHint,
        verbose: bool,
    ) -> Result<Self> {
        let config = Config::builder()
            .history_ignore_space(true)
            .auto_add_history(true)
            .build();

        let editor = Editor::with_config(config)?;

        Ok(Self {
            services,
            session_id,
            language,
            editor,
            term: Term::stdout(),
            verbose,
        })
    }

    /// Run the REPL loop.
    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();

        loop {
            let prompt = self.format_prompt();

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();

                    if line.is_empty() {
                        continue;
                    }

                    if line.starts_with('/') {
                        match self.handle_slash_command(line).await {
                            Ok(ControlFlow::Continue) => continue,
                            Ok(ControlFlow::Exit) => break,
                            Err(e) => {
                                self.print_error(&format!("Command error: {}", e));
                                continue;
                            }
                        }
                    }

                    self.send_message(line).await;
                }
                Err(ReadlineError::Interrupted) => {
                    println!();
                    self.print_dim("(Interrupted - type /quit to exit)");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(e) => {
                    self.print_error(&format!("Input error: {}", e));
                    break;
                }
            }
        }

        self.print_dim("Goodbye! مع السلامة");
        Ok(())
    }

    /// Session for the next message, created on first use.
    fn current_session(&mut self) -> String {
        self.session_id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone()
    }

    /// Send a message and print the reply or the apology.
    async fn send_message(&mut self, message: &str) {
        let session_id = self.current_session();
        let result = self
            .services
            .chat()
            .process_message(&session_id, message, self.language)
            .await;

        match result {
            Ok(response) => {
                print_reply(&response, self.verbose);
                println!();
            }
            Err(e) => {
                match e.apology() {
                    Some(apology) => println!("{}", apology),
                    None => self.print_error(&e.to_string()),
                }
                if self.verbose && e.apology().is_some() {
                    self.print_dim(&format!("({})", e));
                }
                println!();
            }
        }
    }

    /// Handle a slash command.
    async fn handle_slash_command(&mut self, input: &str) -> Result<ControlFlow> {
        let parts: Vec<&str> = input[1..].split_whitespace().collect();
        let cmd = parts.first().copied().unwrap_or("");
        let args = &parts[1..];

        match cmd {
            "quit" | "q" | "exit" => {
                return Ok(ControlFlow::Exit);
            }
            "help" | "h" | "?" => {
                self.print_help();
            }
            "clear" | "cls" => {
                self.term.clear_screen()?;
            }
            "new" => {
                self.session_id = None;
                self.print_dim("Started new session");
            }
            "session" => {
                if let Some(ref id) = self.session_id {
                    println!("Current session: {}", id);
                } else {
                    self.print_dim("No active session (will create on first message)");
                }
            }
            "lang" if args.len() == 1 => match args[0].parse::<LanguageHint>() {
                Ok(hint) => {
                    self.language = hint;
                    self.print_dim(&format!("Reply language: {}", describe_hint(hint)));
                }
                Err(e) => self.print_error(&e),
            },
            "lang" => {
                self.print_dim(&format!("Reply language: {}", describe_hint(self.language)));
            }
            "search" if !args.is_empty() => {
                let query = args.join(" ");
                self.search(&query).await;
            }
            "" => {
                self.print_dim("Type /help for available commands");
            }
            _ => {
                self.print_error(&format!("Unknown command: /{}", cmd));
                self.print_dim("Type /help for available commands");
            }
        }

        Ok(ControlFlow::Continue)
    }

    async fn search(&self, query: &str) {
        let dim = Style::new().dim();
        println!("Searching: {}", dim.apply_to(query));

        let report = self.services.search().search(query, None).await;
        if report.outcome.is_empty() {
            self.print_dim("No results found");
            return;
        }
        for (i, result) in report.outcome.results.iter().enumerate() {
            println!(
                "{}. {} {}",
                i + 1,
                result.item().title(),
                dim.apply_to(format!("({}, score: {:.3})", result.tier, result.score))
            );
        }
    }

    fn print_welcome(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Carrivo Chat").bold().cyan());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!(
            "{}",
            dim.apply_to("Ask in Arabic, Egyptian Arabic or English.")
        );
        println!(
            "{}",
            dim.apply_to("Use /help for commands, Ctrl+D to exit.")
        );
        println!();
    }

    fn print_help(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Available Commands").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("  {}  - Exit the REPL", style("/quit, /q").cyan());
        println!("  {}  - Show this help", style("/help, /h, /?").cyan());
        println!("  {}  - Clear the screen", style("/clear").cyan());
        println!("  {}  - Start a new session", style("/new").cyan());
        println!("  {}  - Show current session ID", style("/session").cyan());
        println!(
            "  {}  - Set reply language (auto, ar, ar_eg, en)",
            style("/lang <code>").cyan()
        );
        println!(
            "  {}  - Search roadmaps and FAQ",
            style("/search <query>").cyan()
        );
        println!();
        println!("{}", dim.apply_to("Keyboard shortcuts:"));
        println!("  {} - Interrupt current input", dim.apply_to("Ctrl+C"));
        println!("  {} - Exit the REPL", dim.apply_to("Ctrl+D"));
        println!();
    }

    fn format_prompt(&self) -> String {
        format!("{} ", style("carrivo>").cyan().bold())
    }

    fn print_dim(&self, msg: &str) {
        let dim = Style::new().dim();
        println!("{}", dim.apply_to(msg));
    }

    fn print_error(&self, msg: &str) {
        let red = Style::new().red();
        println!("{} {}", red.apply_to("Error:"), msg);
    }
}

fn describe_hint(hint: LanguageHint) -> String {
    match hint {
        LanguageHint::Auto => "auto".to_string(),
        LanguageHint::Explicit(language) => language.code().to_string(),
    }
}

/// Control flow for the REPL.
pub enum ControlFlow {
    Continue,
    Exit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use carrivo_domain::Language;

    #[test]
    fn test_describe_hint() {
        assert_eq!(describe_hint(LanguageHint::Auto), "auto");
        assert_eq!(describe_hint(LanguageHint::Explicit(Language::ArEg)), "ar_EG");
    }
}
