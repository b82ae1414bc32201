//! Runs a signing engine as a child process.
//!
//! Stdin is fed while stdout and stderr are drained, all three at once. An
//! engine is free to start writing before it has read all of its input, so
//! doing these one after another can wedge both sides on full pipe buffers.

use std::ffi::OsString;
use std::io;
use std::process::Stdio;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// What a finished (or abandoned) engine run left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubprocessOutcome {
    /// `None` when the process was killed by a signal or timed out.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

impl SubprocessOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Engine stderr as text, for error reporting.
    pub fn diagnostic(&self) -> String {
        let text = String::from_utf8_lossy(&self.stderr);
        let text = text.trim();
        if text.is_empty() {
            match self.exit_code {
                Some(code) => format!("engine exited with status {code}"),
                None => "engine was terminated by a signal".to_string(),
            }
        } else {
            text.to_string()
        }
    }

    pub(crate) fn timed_out() -> Self {
        Self {
            timed_out: true,
            ..Self::default()
        }
    }
}

/// Spawn `argv`, pipe `stdin` into it and collect its output.
///
/// The whole exchange, including waiting for exit, is bounded by `deadline`.
/// On expiry the child is killed and reaped before returning. Dropping the
/// returned future also kills the child.
pub async fn run(argv: &[OsString], stdin: Bytes, deadline: Duration) -> io::Result<SubprocessOutcome> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty argv"))?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;
    debug!(pid = ?child.id(), program = ?program, "spawned signing engine");

    let mut child_stdin = child.stdin.take();
    let child_stdout = child.stdout.take();
    let child_stderr = child.stderr.take();
    let child_ref = &mut child;

    let exchange = async move {
        let feed = async {
            if let Some(mut pipe) = child_stdin.take() {
                match pipe.write_all(&stdin).await {
                    Ok(()) => {}
                    // The engine may exit without reading everything; its
                    // exit status says whether that was a failure.
                    Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {}
                    Err(err) => return Err(err),
                }
                // Dropping the pipe signals EOF.
                drop(pipe);
            }
            Ok(())
        };
        let (_, stdout, stderr) =
            tokio::try_join!(feed, drain(child_stdout), drain(child_stderr))?;
        let status = child_ref.wait().await?;
        Ok::<_, io::Error>(SubprocessOutcome {
            exit_code: status.code(),
            stdout,
            stderr,
            timed_out: false,
        })
    };

    let result = timeout(deadline, exchange).await;
    match result {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(pid = ?child.id(), ?deadline, "signing engine exceeded deadline, killing it");
            child.kill().await?;
            Ok(SubprocessOutcome::timed_out())
        }
    }
}

async fn drain<R>(pipe: Option<R>) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}
