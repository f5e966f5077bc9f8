//! PTY execution with scripted auto-responses.
//!
//! Spawns the target CLI attached to a pseudo-terminal, feeds it input, and
//! watches the accumulated output for trigger phrases (trust dialogs,
//! submenu navigation) that each get answered exactly once. Blocking; async
//! callers run this on `tokio::task::spawn_blocking`.

use std::io::Read;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, CommandBuilder, PtySize};
use tracing::{debug, warn};

use crate::error::ProbeError;

const PTY_ROWS: u16 = 50;
const PTY_COLS: u16 = 200;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long the output must stay unchanged, with every trigger answered,
/// before the CLI is considered settled and harvested.
const QUIET_WINDOW: Duration = Duration::from_millis(900);

/// One scripted reply: when `trigger` appears in the accumulated output and
/// has not been answered yet, `response` is written to the CLI's input.
#[derive(Debug, Clone)]
pub struct AutoResponse {
    pub trigger: String,
    pub response: String,
}

impl AutoResponse {
    pub fn new(trigger: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            response: response.into(),
        }
    }
}

/// Everything needed to run one automated CLI interaction.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Resolved binary path (callers should go through [`super::locate`])
    pub binary: PathBuf,
    pub args: Vec<String>,
    /// Written to the CLI's input right after spawn (e.g., "/usage\r")
    pub initial_input: Option<String>,
    pub timeout: Duration,
    pub working_dir: Option<PathBuf>,
    pub auto_responses: Vec<AutoResponse>,
}

impl ExecRequest {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new(),
            initial_input: None,
            timeout: Duration::from_secs(30),
            working_dir: None,
            auto_responses: Vec::new(),
        }
    }
}

/// Raw result of an automated run. Exit-code interpretation belongs to the
/// provider parser; a non-zero code is not automatically an error.
#[derive(Debug)]
pub struct ExecOutcome {
    pub output: Vec<u8>,
    pub exit_code: i32,
}

/// Tracks which triggers have already been answered, so output re-scans
/// never fire a response twice.
struct AutoResponder {
    entries: Vec<AutoResponse>,
    fired: Vec<bool>,
}

impl AutoResponder {
    fn new(entries: Vec<AutoResponse>) -> Self {
        let fired = vec![false; entries.len()];
        Self { entries, fired }
    }

    /// Responses due against the current accumulated output, marking each
    /// as fired.
    fn due(&mut self, output: &str) -> Vec<String> {
        let mut responses = Vec::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if !self.fired[i] && output.contains(&entry.trigger) {
                self.fired[i] = true;
                responses.push(entry.response.clone());
            }
        }
        responses
    }

    fn all_fired(&self) -> bool {
        self.fired.iter().all(|f| *f)
    }
}

/// Kills the child on drop, so no exit path leaves an orphaned subprocess.
struct ChildGuard {
    child: Box<dyn Child + Send + Sync>,
    reaped: bool,
}

impl ChildGuard {
    fn try_wait(&mut self) -> std::io::Result<Option<portable_pty::ExitStatus>> {
        let status = self.child.try_wait()?;
        if status.is_some() {
            self.reaped = true;
        }
        Ok(status)
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Run a CLI under a PTY until it exits, times out, or settles.
///
/// Returns the raw captured bytes (feed through [`crate::term::render`]
/// before parsing) and the exit code. On timeout the child is killed and
/// partial output is discarded.
pub fn execute(req: &ExecRequest) -> Result<ExecOutcome, ProbeError> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize {
            rows: PTY_ROWS,
            cols: PTY_COLS,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| ProbeError::execution(format!("failed to open PTY: {e}")))?;

    let mut cmd = CommandBuilder::new(&req.binary);
    cmd.args(&req.args);
    if let Some(dir) = &req.working_dir {
        cmd.cwd(dir);
    }

    let child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| ProbeError::execution(format!("failed to launch {}: {e}", req.binary.display())))?;
    let mut guard = ChildGuard {
        child,
        reaped: false,
    };
    // Close our copy of the slave so reads see EOF when the child exits
    drop(pair.slave);

    debug!(binary = %req.binary.display(), "spawned CLI under PTY");

    let mut reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| ProbeError::execution(format!("failed to clone PTY reader: {e}")))?;
    let mut writer = pair
        .master
        .take_writer()
        .map_err(|e| ProbeError::execution(format!("failed to take PTY writer: {e}")))?;

    let buffer: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let buffer_reader = buffer.clone();
    let reader_thread = thread::spawn(move || {
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => buffer_reader.lock().extend_from_slice(&chunk[..n]),
                Err(e) => {
                    if e.kind() != std::io::ErrorKind::WouldBlock {
                        break;
                    }
                }
            }
        }
    });

    if let Some(input) = &req.initial_input {
        let _ = writer.write_all(input.as_bytes());
        let _ = writer.flush();
    }

    let mut responder = AutoResponder::new(req.auto_responses.clone());
    let started = Instant::now();
    let mut last_len = 0usize;
    let mut last_growth = Instant::now();

    let exit_code = loop {
        if let Some(status) = guard
            .try_wait()
            .map_err(|e| ProbeError::execution(format!("wait failed: {e}")))?
        {
            // Give the reader a moment to drain what the child wrote last
            thread::sleep(Duration::from_millis(100));
            break status.exit_code() as i32;
        }

        if started.elapsed() >= req.timeout {
            warn!(binary = %req.binary.display(), "CLI timed out, killing");
            drop(guard);
            join_with_timeout(reader_thread, Duration::from_secs(1));
            return Err(ProbeError::Timeout);
        }

        let (len, responses) = {
            let buf = buffer.lock();
            let text = String::from_utf8_lossy(&buf);
            (buf.len(), responder.due(&text))
        };
        for response in responses {
            debug!("auto-response fired");
            let _ = writer.write_all(response.as_bytes());
            let _ = writer.flush();
            last_growth = Instant::now();
        }

        if len > last_len {
            last_len = len;
            last_growth = Instant::now();
        } else if len > 0 && responder.all_fired() && last_growth.elapsed() >= QUIET_WINDOW {
            // Interactive CLI settled: harvest what is on screen
            debug!(binary = %req.binary.display(), "output settled, harvesting");
            drop(guard);
            break 0;
        }

        thread::sleep(POLL_INTERVAL);
    };

    // The writer must go before joining, or a reader blocked on the master
    // side may never see EOF
    drop(writer);
    drop(pair.master);
    join_with_timeout(reader_thread, Duration::from_secs(1));

    let output = std::mem::take(&mut *buffer.lock());
    Ok(ExecOutcome { output, exit_code })
}

/// Join a thread, abandoning it if it does not finish in time.
fn join_with_timeout<T>(handle: JoinHandle<T>, timeout: Duration) {
    let start = Instant::now();
    loop {
        if handle.is_finished() {
            let _ = handle.join();
            return;
        }
        if start.elapsed() >= timeout {
            debug!("reader thread join timed out, abandoning");
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
}
