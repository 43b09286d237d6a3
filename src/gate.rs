//! Overwrite protection for expensive simulation artifacts.
//!
//! The gate checks for an existing artifact and, if one is found, asks a
//! [`Prompt`] whether to continue. The existence check and the later write by
//! the engine are not atomic: another process can create or remove the file in
//! between. A single operator drives the prompt, so this race is accepted.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Once;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

/// Outcome of [`ArtifactGate::check_and_confirm`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No artifact on disk
    RunFresh,
    /// Artifact exists and the operator chose to continue with it
    ReuseExisting,
    Aborted,
}

/// One answer from the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptReply {
    Answer(String),
    /// Interrupt or closed input
    Interrupted,
}

/// Source of yes/no answers
pub trait Prompt {
    fn ask(&mut self, question: &str) -> PromptReply;
}

impl<F> Prompt for F
where
    F: FnMut(&str) -> PromptReply,
{
    fn ask(&mut self, question: &str) -> PromptReply {
        self(question)
    }
}

static PROMPTING: AtomicBool = AtomicBool::new(false);
static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static HANDLER: Once = Once::new();

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Ctrl-C while a prompt is waiting sets [`INTERRUPTED`]; at any other time
/// it exits with the conventional status 130.
fn install_interrupt_handler() {
    HANDLER.call_once(|| {
        let installed = ctrlc::set_handler(|| {
            if PROMPTING.load(Ordering::SeqCst) {
                INTERRUPTED.store(true, Ordering::SeqCst);
            } else {
                std::process::exit(130);
            }
        });
        if let Err(e) = installed {
            warn!("Ctrl-C will not cancel the overwrite prompt: {}", e);
        }
    });
}

/// Background thread reading one stdin line per request
#[derive(Debug)]
struct LineReader {
    requests: Sender<()>,
    lines: Receiver<io::Result<String>>,
    /// A read was requested and its line not yet received
    pending: bool,
}

impl LineReader {
    fn spawn() -> Self {
        let (requests, request_rx) = mpsc::channel::<()>();
        let (line_tx, lines) = mpsc::channel();
        thread::spawn(move || {
            for () in request_rx {
                let mut line = String::new();
                let read = io::stdin().lock().read_line(&mut line).map(|_| line);
                if line_tx.send(read).is_err() {
                    break;
                }
            }
        });
        Self {
            requests,
            lines,
            pending: false,
        }
    }
}

/// Wait for a line until `interrupted` is raised; `None` on interrupt.
fn wait_for_line(
    lines: &Receiver<io::Result<String>>,
    interrupted: &AtomicBool,
    poll: Duration,
) -> Option<io::Result<String>> {
    loop {
        match lines.recv_timeout(poll) {
            Ok(read) => return Some(read),
            Err(RecvTimeoutError::Timeout) => {
                if interrupted.swap(false, Ordering::SeqCst) {
                    return None;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Some(Err(io::ErrorKind::BrokenPipe.into()));
            }
        }
    }
}

/// Reads answers from standard input.
///
/// Ctrl-C and end of input both count as an interrupt. Outside the prompt
/// Ctrl-C still terminates the process.
#[derive(Debug, Default)]
pub struct StdinPrompt {
    reader: Option<LineReader>,
}

impl Prompt for StdinPrompt {
    fn ask(&mut self, question: &str) -> PromptReply {
        install_interrupt_handler();
        print!("{question}");
        let _ = io::stdout().flush();

        let reader = self.reader.get_or_insert_with(LineReader::spawn);
        if !reader.pending {
            if reader.requests.send(()).is_err() {
                return PromptReply::Interrupted;
            }
            reader.pending = true;
        }

        INTERRUPTED.store(false, Ordering::SeqCst);
        PROMPTING.store(true, Ordering::SeqCst);
        let read = wait_for_line(&reader.lines, &INTERRUPTED, POLL_INTERVAL);
        PROMPTING.store(false, Ordering::SeqCst);

        match read {
            None => {
                println!();
                PromptReply::Interrupted
            }
            Some(read) => {
                reader.pending = false;
                match read {
                    Ok(line) if !line.is_empty() => PromptReply::Answer(line),
                    _ => PromptReply::Interrupted,
                }
            }
        }
    }
}

pub const CONFIRM_QUESTION: &str = "Do you want to continue? (y/n): ";

pub struct ArtifactGate {
    prompt: Box<dyn Prompt>,
}

impl ArtifactGate {
    pub fn new(prompt: impl Prompt + 'static) -> Self {
        Self {
            prompt: Box::new(prompt),
        }
    }

    /// Gate that answers every question with standard input
    pub fn interactive() -> Self {
        Self::new(StdinPrompt::default())
    }

    pub fn check_and_confirm(&mut self, artifact: &Path) -> Decision {
        if !artifact.exists() {
            info!("Starting new simulation");
            return Decision::RunFresh;
        }

        warn!("Simulation artifact already exists: {:?}", artifact);
        loop {
            match self.prompt.ask(CONFIRM_QUESTION) {
                PromptReply::Answer(raw) => match raw.trim().to_lowercase().as_str() {
                    "y" => {
                        info!("Continuing with existing simulation file");
                        return Decision::ReuseExisting;
                    }
                    "n" => {
                        info!("Simulation cancelled by user");
                        return Decision::Aborted;
                    }
                    _ => info!("Please enter 'y' or 'n'."),
                },
                PromptReply::Interrupted => {
                    info!("Simulation cancelled by user");
                    return Decision::Aborted;
                }
            }
        }
    }
}

impl std::fmt::Debug for ArtifactGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactGate").finish_non_exhaustive()
    }
}
