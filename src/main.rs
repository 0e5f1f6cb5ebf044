//! Terminal front end for a tutoring session
//!
//! Streams the conversation to stdout and reads answers from stdin.

use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};
use tutor_session::interpreter::PendingInput;
use tutor_session::session::{Backend, Feedback};
use tutor_session::timeline::{MessageBody, Role};
use tutor_session::transport::http::ApiClient;
use tutor_session::transport::{HttpBackend, HttpTransport, SessionToken, TurnTransport};
use tutor_session::{SessionConfig, SessionController, UserAction};

type Controller = SessionController<HttpTransport, HttpBackend>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    let fmt_layer = if std::env::var_os("TUTOR_LOG_JSON").is_some() {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tutor_session=info".into()),
        )
        .with(fmt_layer)
        .init();

    // Configuration
    let config = SessionConfig::from_env();
    if config.course_id.is_empty() {
        return Err("TUTOR_COURSE_ID must be set".into());
    }
    tracing::info!(api_base = %config.api_base, course_id = %config.course_id, preview = config.preview_mode, "Starting tutor session");

    let api = ApiClient::new(config.clone(), SessionToken::new(config.token.clone()))?;
    let mut controller = SessionController::new(
        config,
        HttpTransport::new(api.clone()),
        HttpBackend::new(api),
    );

    controller.load_tree().await?;
    let Some(lesson_id) = controller.tree().selected_id().map(str::to_string).or_else(|| {
        controller
            .tree()
            .lessons()
            .find(|l| l.can_learn())
            .map(|l| l.id.clone())
    }) else {
        return Err("No lesson available to start".into());
    };
    let chapter_id = controller
        .tree()
        .chapter_of(&lesson_id)
        .map(|c| c.id.clone())
        .ok_or("Lesson has no chapter")?;

    controller.start(&chapter_id, &lesson_id).await?;

    let mut view = View::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        view.render(&controller);
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match handle_line(&mut controller, &view, line.trim()).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => eprintln!("! {e}"),
                }
            }
            more = controller.next_signal() => {
                if !more {
                    // Nothing in flight; wait for input only
                    view.render(&controller);
                    let Some(line) = lines.next_line().await? else { break };
                    match handle_line(&mut controller, &view, line.trim()).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => eprintln!("! {e}"),
                    }
                }
            }
        }
    }

    controller.shutdown();
    Ok(())
}

/// Interpret one line of user input; false means quit
async fn handle_line<T, B>(
    controller: &mut SessionController<T, B>,
    view: &View,
    line: &str,
) -> Result<bool, Box<dyn std::error::Error>>
where
    T: TurnTransport + 'static,
    B: Backend + 'static,
{
    let (command, arg) = line.split_once(' ').map_or((line, ""), |(c, a)| (c, a.trim()));
    match command {
        "" => {}
        "/quit" => return Ok(false),
        "/reset" => {
            let chapter_id = controller.chapter_id().map(str::to_string).ok_or("No chapter started")?;
            controller.reset_chapter(&chapter_id).await?;
        }
        "/resend" => controller.resend()?,
        "/select" => {
            let chapter_id = controller
                .tree()
                .chapter_of(arg)
                .map(|c| c.id.clone())
                .ok_or_else(|| format!("Unknown lesson: {arg}"))?;
            controller.select_lesson(arg)?;
            controller.start(&chapter_id, arg).await?;
        }
        "/like" | "/dislike" => {
            let feedback = if command == "/like" { Feedback::Like } else { Feedback::Dislike };
            let index: usize = arg.parse().map_err(|_| "Usage: /like <n>")?;
            let id = view.numbered.get(index.wrapping_sub(1)).ok_or("No such message")?;
            controller.annotate(id, feedback)?;
        }
        _ => {
            let action = match controller.pending_input() {
                Some(pending) => answer(pending, line),
                None => UserAction::text(line),
            };
            controller.send(action)?;
        }
    }
    Ok(true)
}

/// A number picks an option of a button prompt; anything else is text
fn answer(pending: &PendingInput, line: &str) -> UserAction {
    let options = pending.options();
    let chosen = line
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| options.get(i).copied());
    match chosen {
        Some(option) => UserAction::choose(pending, option),
        None if options.len() == 1 && !pending.is_text() => UserAction::choose(pending, options[0]),
        None => UserAction::answer(pending, line),
    }
}

/// Incremental stdout renderer
#[derive(Default)]
struct View {
    /// Completed teacher messages, numbered for `/like` and `/dislike`
    numbered: Vec<tutor_session::timeline::MessageId>,
    printed: usize,
    /// Bytes already printed of the open message
    streamed: usize,
    prompted: bool,
}

impl View {
    fn render(&mut self, controller: &Controller) {
        let messages = controller.timeline().messages();
        let mut out = std::io::stdout().lock();

        if messages.len() < self.printed {
            // Timeline was cleared (reset or restart)
            let _ = writeln!(out, "\n──────── restarted ────────");
            self.printed = 0;
            self.streamed = 0;
            self.numbered.clear();
        }

        while self.printed < messages.len() {
            let message = &messages[self.printed];
            match &message.body {
                MessageBody::Text(text) => {
                    if self.streamed == 0 {
                        let who = match message.role {
                            Role::Teacher => "tutor",
                            Role::Student => "you",
                        };
                        let _ = write!(out, "\n[{who}] ");
                    }
                    let _ = write!(out, "{}", text.get(self.streamed..).unwrap_or_default());
                    self.streamed = text.len();
                    if !message.is_complete {
                        break;
                    }
                    if message.role == Role::Teacher && message.log_id.is_some() {
                        self.numbered.push(message.id.clone());
                        let _ = write!(out, "  (#{})", self.numbered.len());
                    }
                    let _ = writeln!(out);
                }
                MessageBody::LessonBoundary { lesson_id } => {
                    let name = controller.tree().lesson(lesson_id).map_or(lesson_id.as_str(), |l| l.name.as_str());
                    let _ = writeln!(out, "\n════ {name} ════");
                }
                MessageBody::Control(payload) => {
                    let _ = writeln!(out, "[control] {payload}");
                }
            }
            self.printed += 1;
            self.streamed = 0;
            self.prompted = false;
        }

        if controller.input_enabled() && !self.prompted {
            if let Some(pending) = controller.pending_input() {
                for (i, option) in pending.options().iter().enumerate() {
                    let _ = writeln!(out, "  {}. {}", i + 1, option.label);
                }
            }
            let _ = write!(out, "> ");
            self.prompted = true;
        }
        let _ = out.flush();
    }
}
