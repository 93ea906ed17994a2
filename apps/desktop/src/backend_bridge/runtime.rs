//! Interactive loop: stdin commands and collaborator completions feed one session.

use std::{
    io::{self, BufRead},
    thread,
};

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use workflow::{CompletionOutcome, SampleGallery, WorkflowEvent, WorkflowSession};

use crate::{
    backend_bridge::commands::{read_drop_event, read_file_selection, WorkflowCommand, HELP},
    render::{self, StatusReport},
};

const COMMAND_QUEUE: usize = 32;

/// Forwards parsed stdin lines. The sender is dropped at end of input.
pub fn spawn_stdin_reader(cmd_tx: mpsc::Sender<WorkflowCommand>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    tracing::warn!("failed to read stdin: {err}");
                    break;
                }
            };
            match WorkflowCommand::parse(&line) {
                Ok(Some(cmd)) => {
                    let quit = cmd == WorkflowCommand::Quit;
                    if cmd_tx.blocking_send(cmd).is_err() || quit {
                        return;
                    }
                }
                Ok(None) => {}
                Err(message) => eprintln!("{message}"),
            }
        }
    });
}

pub async fn run_interactive(mut session: WorkflowSession, gallery: SampleGallery) -> Result<()> {
    let (cmd_tx, mut cmd_rx) = mpsc::channel(COMMAND_QUEUE);
    spawn_stdin_reader(cmd_tx);
    let mut events = session.subscribe_events();

    println!("{}", render::describe_view(&session.view()));
    println!("{HELP}");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    finish_pending(&mut session, &mut events).await;
                    break;
                };
                if cmd == WorkflowCommand::Quit {
                    break;
                }
                handle_command(&mut session, &gallery, cmd).await;
            }
            Some(outcome) = session.next_completion() => {
                if outcome == CompletionOutcome::Discarded {
                    tracing::debug!("ignored a response for an image that is no longer loaded");
                }
            }
        }
        print_events(&mut events);
    }

    if session.pending_completions() > 0 {
        tracing::info!(
            pending = session.pending_completions(),
            "exiting with removal requests still in flight"
        );
    }
    Ok(())
}

pub async fn handle_command(
    session: &mut WorkflowSession,
    gallery: &SampleGallery,
    cmd: WorkflowCommand,
) {
    tracing::debug!(command = cmd.name(), "handling command");
    let result = match cmd {
        WorkflowCommand::Load { path } => match read_file_selection(&path).await {
            Ok(selection) => session.load_file_selection(selection),
            Err(err) => {
                eprintln!("error: {err:#}");
                return;
            }
        },
        WorkflowCommand::Drop { paths } => match read_drop_event(&paths).await {
            Ok(event) => {
                let outcome = session.load_drop(event);
                debug_assert!(outcome.suppress_default);
                outcome.loaded
            }
            Err(err) => {
                eprintln!("error: {err:#}");
                return;
            }
        },
        WorkflowCommand::Sample { sample_id } => session.select_sample(gallery, &sample_id),
        WorkflowCommand::Samples => {
            println!("{}", render::describe_samples(&gallery.samples()));
            Ok(())
        }
        WorkflowCommand::Clear => {
            session.clear_source();
            Ok(())
        }
        WorkflowCommand::Remove => session.request_removal().map(|_| ()),
        WorkflowCommand::Download => session.download().map(|_| ()),
        WorkflowCommand::Status => {
            let report = StatusReport::new(session.view(), session.pending_completions());
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{json}"),
                Err(err) => eprintln!("error: failed to render status: {err}"),
            }
            Ok(())
        }
        WorkflowCommand::Help => {
            println!("{HELP}");
            Ok(())
        }
        WorkflowCommand::Quit => Ok(()),
    };

    if let Err(err) = result {
        eprintln!("{}", render::describe_error(&err));
    }
}

/// Applies every in-flight completion once input has ended, so piped scripts see results.
pub async fn finish_pending(
    session: &mut WorkflowSession,
    events: &mut broadcast::Receiver<WorkflowEvent>,
) {
    if session.pending_completions() > 0 {
        tracing::info!(
            pending = session.pending_completions(),
            "input ended; waiting for removal requests in flight"
        );
    }
    while session.next_completion().await.is_some() {
        print_events(events);
    }
}

fn print_events(events: &mut broadcast::Receiver<WorkflowEvent>) {
    loop {
        match events.try_recv() {
            Ok(event) => {
                if let Some(line) = render::describe_event(&event) {
                    println!("{line}");
                }
            }
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event display fell behind");
            }
            Err(_) => break,
        }
    }
}
