//! Terminal side of the form
//!
//! - masked API key prompt
//! - user-turn list and busy indicator
//! - type-ahead discarded when the form is re-enabled

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

use crate::controller::FormSurface;
use crate::credential::CredentialPrompt;

// ═══════════════════════════════════════════════════════════════
// API KEY PROMPT
// ═══════════════════════════════════════════════════════════════

/// Prompt user for API key (masked input). `None` if cancelled with Esc or Ctrl-C.
pub fn prompt_api_key() -> Result<Option<String>> {
    print!("Please enter your OpenAI API key: ");
    io::stdout().flush()?;

    // Read with echo disabled
    enable_raw_mode()?;
    let result = read_masked();
    disable_raw_mode()?;
    println!();

    result
}

/// What one key press did to the masked input
#[derive(Debug, PartialEq, Eq)]
enum KeyStep {
    Submit,
    Cancel,
    Typed,
    Erased,
    Ignored,
}

fn apply_key(key: &mut String, k: KeyEvent) -> KeyStep {
    if k.kind != KeyEventKind::Press {
        return KeyStep::Ignored;
    }
    // Raw mode delivers Ctrl-C as a key, not a signal
    if k.modifiers.contains(KeyModifiers::CONTROL) {
        return match k.code {
            KeyCode::Char('c') | KeyCode::Char('d') => KeyStep::Cancel,
            _ => KeyStep::Ignored,
        };
    }
    match k.code {
        KeyCode::Enter => KeyStep::Submit,
        KeyCode::Esc => KeyStep::Cancel,
        KeyCode::Char(c) => {
            key.push(c);
            KeyStep::Typed
        }
        KeyCode::Backspace if key.pop().is_some() => KeyStep::Erased,
        _ => KeyStep::Ignored,
    }
}

fn read_masked() -> Result<Option<String>> {
    let mut key = String::new();

    loop {
        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        let Event::Key(k) = event::read()? else {
            continue;
        };
        match apply_key(&mut key, k) {
            KeyStep::Submit => return Ok(Some(key)),
            KeyStep::Cancel => return Ok(None),
            KeyStep::Typed => {
                print!("*");
                io::stdout().flush()?;
            }
            KeyStep::Erased => {
                print!("\x08 \x08");
                io::stdout().flush()?;
            }
            KeyStep::Ignored => {}
        }
    }
}

/// Credential prompt backed by the terminal
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl CredentialPrompt for TerminalPrompt {
    fn request(&mut self) -> Result<Option<String>> {
        if !io::stdin().is_terminal() {
            tracing::warn!("stdin is not a terminal; cannot ask for an API key");
            return Ok(None);
        }
        prompt_api_key()
    }

    fn alert(&mut self, message: &str) {
        eprintln!("! {}", message);
        eprintln!("  (or store one with: tailgen config set key <your-key>)");
    }
}

// ═══════════════════════════════════════════════════════════════
// FORM
// ═══════════════════════════════════════════════════════════════

/// Line-oriented form on stdout
#[derive(Debug)]
pub struct TerminalForm {
    preview_path: PathBuf,
    shown_turns: usize,
}

impl TerminalForm {
    pub fn new(preview_path: PathBuf) -> Self {
        Self { preview_path, shown_turns: 0 }
    }

    /// Print the input prompt
    pub fn prompt(&self) -> Result<()> {
        print!("> ");
        io::stdout().flush()?;
        Ok(())
    }
}

impl FormSurface for TerminalForm {
    fn show_user_turns(&mut self, turns: &[&str]) {
        if turns.len() < self.shown_turns {
            println!("(conversation cleared)");
            self.shown_turns = 0;
        }
        // Earlier turns are already on screen
        for turn in &turns[self.shown_turns..] {
            println!("You: {}", turn);
        }
        self.shown_turns = turns.len();
    }

    fn set_enabled(&mut self, enabled: bool) {
        if enabled {
            discard_type_ahead();
        } else {
            println!("Generating... live preview: {}", self.preview_path.display());
        }
    }

    fn reset(&mut self) {
        println!("Done. Preview: {}\n", self.preview_path.display());
    }
}

/// Drop whatever was typed while the form was disabled
fn discard_type_ahead() {
    if !io::stdin().is_terminal() {
        return;
    }
    let mut dropped = 0usize;
    while let Ok(true) = event::poll(Duration::ZERO) {
        if event::read().is_err() {
            break;
        }
        dropped += 1;
    }
    if dropped > 0 {
        tracing::debug!(events = dropped, "discarded input typed while busy");
    }
}
