//! Interactive prompt-to-agent flow

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use promptpilot_sdk::chat::ChatReply;
use promptpilot_sdk::dispatch::ExecutionLog;
use promptpilot_sdk::extract::ExtractedCode;
use promptpilot_sdk::router::RoutingMode;
use promptpilot_sdk::session::{GenerationEvent, ParameterSource, Session, SessionState};
use promptpilot_sdk::PilotError;
use shared_types::ActionCompletion;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::console::{ConsoleNotifier, LineReader};
use crate::cli::{FollowUp, GenerateArgs};
use crate::config::PilotConfig;
use crate::error::CliError;

const SUBMIT: &str = "/submit";

pub async fn run_generate(config: &PilotConfig, args: &GenerateArgs) -> Result<(), CliError> {
    let client_config = config.client_config()?;
    let mut session = Session::connect(&client_config, config.token_provider()?, Arc::new(ConsoleNotifier))?;
    let mut input = LineReader::stdin();

    let mode = args.reasoning.map_or(RoutingMode::Auto, RoutingMode::Manual);
    let begin = session.begin(&args.prompt, mode).await?;
    info!(
        needs_reasoning = begin.decision.needs_reasoning,
        fallback = begin.decision.is_fallback(),
        "Prompt routed"
    );

    if let Some(first_reply) = begin.first_reply {
        clarify(&mut session, &mut input, first_reply).await?;
    }

    if args.identify_parameters {
        session.identify_parameters().await?;
    } else {
        session.generate().await?;
    }

    let code = follow_stream(&mut session, &mut input).await?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, &code.code)
                .with_context(|| format!("Failed to write agent code to {}", path.display()))?;
            eprintln!("Saved agent code to {}", path.display());
        }
        None => println!("{}", code.code),
    }

    if let Some(follow_up) = args.then {
        if code.is_placeholder() {
            return Err(CliError::Command("No code was generated; nothing to run".to_string()));
        }
        run_follow_up(&mut session, follow_up).await?;
    }
    Ok(())
}

async fn clarify(session: &mut Session, input: &mut LineReader, first_reply: ChatReply) -> Result<(), CliError> {
    print_reply(&first_reply);
    eprintln!("Answer the questions above; type {} when you are done.", SUBMIT);

    loop {
        let Some(line) = input.ask("> ").await? else {
            return Err(CliError::Interrupted);
        };
        if line.is_empty() {
            continue;
        }

        if line == SUBMIT {
            match session.chat() {
                Some(chat) if chat.can_submit() => return Ok(()),
                Some(chat) => eprintln!(
                    "A little more detail first: {} turns are needed, {} so far.",
                    chat.min_turns(),
                    chat.turns()
                ),
                None => return Ok(()),
            }
            continue;
        }

        let reply = session.send_chat(&line).await?;
        print_reply(&reply);
        if session.chat().is_some_and(|chat| chat.should_suggest_submit()) {
            eprintln!("That should be enough detail; type {} to generate.", SUBMIT);
        }
    }
}

fn print_reply(reply: &ChatReply) {
    eprintln!("\n{}\n", reply.content);
}

/// Drive the stream until code is ready, answering parameter requests on the way
async fn follow_stream(session: &mut Session, input: &mut LineReader) -> Result<ExtractedCode, CliError> {
    loop {
        let Some(event) = session.next_event().await else {
            return Err(stream_failure(session));
        };

        match event {
            GenerationEvent::Text(text) | GenerationEvent::Code(text) => {
                eprint!("{}", text);
                std::io::stderr().flush()?;
            }
            GenerationEvent::Activity(message) => {
                debug!(kind = ?message.kind, phase = ?message.phase, "Generator activity");
            }
            GenerationEvent::ParametersRequested { parameters, source } => {
                eprintln!();
                if source == ParameterSource::Sniffed {
                    eprintln!("The generator stopped to ask for some details.");
                }
                loop {
                    let answers = input.ask_parameters(&parameters).await?;
                    match session.submit_parameters(answers).await {
                        Ok(()) => break,
                        Err(PilotError::InvalidRequest { message }) => eprintln!("{}", message),
                        Err(e) => return Err(e.into()),
                    }
                }
            }
            GenerationEvent::Finished(code) => {
                eprintln!();
                return Ok(code);
            }
            GenerationEvent::Failed(_) | GenerationEvent::ParametersFailed(_) | GenerationEvent::Ended(_) => {
                if session.state() == SessionState::Error {
                    return Err(stream_failure(session));
                }
            }
        }
    }
}

fn stream_failure(session: &Session) -> CliError {
    let reason = session
        .last_error()
        .unwrap_or("The generation stream ended unexpectedly");
    PilotError::stream(reason).into()
}

async fn run_follow_up(session: &mut Session, follow_up: FollowUp) -> Result<(), CliError> {
    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let result = match follow_up {
        FollowUp::Execute => execute(session, &cancel).await,
        FollowUp::Test => session.test(&cancel).await.map(|c| print_completion(&c)),
        FollowUp::Schedule => session.schedule(&cancel).await.map(|c| print_completion(&c)),
    };

    watcher.abort();
    result.map_err(CliError::from)
}

async fn execute(session: &mut Session, cancel: &CancellationToken) -> Result<(), PilotError> {
    let (tap, mut chunks) = mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(chunk) = chunks.recv().await {
            let _ = stdout.write_all(chunk.as_bytes());
            let _ = stdout.flush();
        }
    });

    let mut log = ExecutionLog::with_tap(tap);
    let result = session.execute(&mut log, cancel).await;
    drop(log);
    if printer.await.is_err() {
        debug!("Output printer stopped early");
    }
    result
}

fn print_completion(completion: &ActionCompletion) {
    println!("status: {}", completion.status);
    if !completion.message.is_empty() {
        println!("{}", completion.message);
    }
    if let Some(schedule_id) = &completion.schedule_id {
        println!("schedule id: {}", schedule_id);
    }
}
