use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use marketplace_core::{decode_pairs, update, Msg, SearchState};
use marketplace_engine::{CredentialStore, FileSlot};
use marketplace_logging::{market_info, market_warn};

use super::commands::{self, Input, HELP};
use super::config::{self, Cli};
use super::effects::{EffectRunner, Notice};
use super::{logging, render};

/// Engine events are polled at this interval while the user is idle.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub enum AppEvent {
    Line(String),
    Msg(Msg),
    InputClosed,
}

pub fn run_app() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::resolve(&cli)?;
    logging::initialize(config.log, config.verbose);
    market_info!(
        "Starting marketplace client against {} (page size {}, debounce {}ms)",
        config.base_url,
        config.page_size,
        config.debounce_ms
    );

    let store = CredentialStore::open(FileSlot::new(&config.credentials_path));
    if !store.is_durable() {
        market_warn!("Session will not survive a restart");
    }

    let (event_tx, event_rx) = mpsc::channel::<AppEvent>();
    let runner = EffectRunner::new(config.client_settings(), store, event_tx.clone())
        .context("starting search engine")?;
    spawn_stdin_reader(event_tx);

    let mut app = App {
        state: SearchState::with_settings(config.search_settings()),
        runner,
    };
    println!("Type `help` for commands.");

    let initial = config
        .initial_query
        .as_deref()
        .map(decode_pairs)
        .unwrap_or_default();
    app.dispatch_msg(Msg::QueryRestored(initial));
    app.render_if_dirty();

    loop {
        let first = match event_rx.recv_timeout(POLL_INTERVAL) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        // Coalesce: everything already queued is applied before one render.
        let pending = first.into_iter().chain(event_rx.try_iter());
        let mut quit = false;
        for event in pending {
            match event {
                AppEvent::Msg(msg) => app.dispatch_msg(msg),
                AppEvent::Line(line) => quit |= app.handle_line(&line),
                AppEvent::InputClosed => quit = true,
            }
        }
        app.process_engine_notices();
        app.render_if_dirty();
        if quit {
            break;
        }
    }

    market_info!("Marketplace client exiting");
    Ok(())
}

struct App {
    state: SearchState,
    runner: EffectRunner,
}

impl App {
    fn dispatch_msg(&mut self, msg: Msg) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;
        self.runner.enqueue(effects);
    }

    /// Returns true when the user asked to quit.
    fn handle_line(&mut self, line: &str) -> bool {
        match commands::parse(line, self.state.filters()) {
            Ok(None) => {}
            Ok(Some(Input::Msg(msg))) => self.dispatch_msg(msg),
            Ok(Some(Input::SignIn { email, password })) => {
                println!("Signing in as {email}…");
                self.runner.sign_in(email, password);
            }
            Ok(Some(Input::SignOut)) => {
                self.runner.sign_out();
                println!("Signed out.");
            }
            Ok(Some(Input::Help)) => println!("{HELP}"),
            Ok(Some(Input::Quit)) => return true,
            Err(err) => println!("{err:#}"),
        }
        false
    }

    fn process_engine_notices(&mut self) {
        // Dispatching can queue a redirect, so drain until quiet.
        loop {
            let notices = self.runner.drain();
            if notices.is_empty() {
                return;
            }
            for notice in notices {
                match notice {
                    Notice::Msg(msg) => self.dispatch_msg(msg),
                    Notice::SignInFailed(message) => println!("Sign-in failed: {message}"),
                    Notice::RedirectToSignIn => {
                        println!("Your session has ended. Use `login <email> <password>`.");
                    }
                }
            }
        }
    }

    fn render_if_dirty(&mut self) {
        if !self.state.consume_dirty() {
            return;
        }
        let view = self.state.view();
        let lines = render::render(&view, self.runner.address(), self.runner.is_signed_in());
        let mut stdout = io::stdout().lock();
        for line in lines {
            let _ = writeln!(stdout, "{line}");
        }
        let _ = stdout.flush();
    }
}

fn spawn_stdin_reader(event_tx: mpsc::Sender<AppEvent>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if event_tx.send(AppEvent::Line(line)).is_err() {
                return;
            }
        }
        let _ = event_tx.send(AppEvent::InputClosed);
    });
}
