//! Gradient oracle backed by an external inference command.
//!
//! The command is started once per evaluation. It receives the encoding as a
//! single JSON object on stdin and must print the Jacobian on stdout:
//!
//! ```text
//! stdin:  {"encoding": [2.0, 0.0, 1.0, ...]}
//! stdout: {"jacobian": [[...], [...], [...]]}
//! ```
//!
//! The child process never outlives [`GradientOracle::evaluate_gradient`]: it
//! is waited for on success and killed and reaped on timeout. A timeout also
//! bounds reading its output, even when processes it started keep the pipes
//! open.

use std::{
    io::{self, Read, Write},
    process::{Child, Command, ExitStatus, Stdio},
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use super::{GradientOracle, Jacobian, OracleError};
use crate::deck::DeckEncoding;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Serialize)]
struct Request<'a> {
    encoding: &'a [f64],
}

#[derive(Deserialize)]
struct Response {
    jacobian: Vec<Vec<f64>>,
}

#[derive(Debug, Clone)]
pub struct SubprocessOracle {
    program: String,
    args: Vec<String>,
    num_features: usize,
    timeout: Option<Duration>,
}

impl SubprocessOracle {
    /// `command` is the program followed by its arguments.
    pub fn new(command: &[String], num_features: usize) -> Result<Self, OracleError> {
        let Some((program, args)) = command.split_first() else {
            return Err(OracleError::Unavailable {
                reason: "empty oracle command".to_owned(),
            });
        };
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            num_features,
            timeout: None,
        })
    }

    /// Kills the command if it runs longer than `limit`.
    #[must_use]
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    fn wait(
        &self,
        child: &mut Child,
        deadline: Option<Instant>,
    ) -> Result<ExitStatus, OracleError> {
        let failed = |e: io::Error| OracleError::Failed {
            reason: format!("failed to wait for `{}`: {e}", self.program),
        };
        let (Some(deadline), Some(limit)) = (deadline, self.timeout) else {
            return child.wait().map_err(failed);
        };
        loop {
            if let Some(status) = child.try_wait().map_err(failed)? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                return Err(OracleError::Timeout { limit });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Feeds `request` to the command and collects its stdout.
    ///
    /// Pipe I/O runs on detached threads. Processes the command leaves behind
    /// may keep the pipes open, so the readers are never joined past the
    /// deadline.
    fn communicate(&self, child: &mut Child, request: Vec<u8>) -> Result<Vec<u8>, OracleError> {
        let deadline = self.timeout.map(|limit| Instant::now() + limit);

        let waited = start_pipe_io(child, request)
            .and_then(|pipes| self.wait(child, deadline).map(|status| (status, pipes)));
        let (status, (stdout, stderr)) = match waited {
            Ok(waited) => waited,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };

        let stdout = self.collect(&stdout, deadline)?;
        if !status.success() {
            let stderr = self.collect(&stderr, deadline).unwrap_or_default();
            return Err(OracleError::Failed {
                reason: format!(
                    "`{}` exited with {status}: {}",
                    self.program,
                    String::from_utf8_lossy(&stderr).trim()
                ),
            });
        }
        Ok(stdout)
    }

    fn collect(
        &self,
        reader: &PipeReader,
        deadline: Option<Instant>,
    ) -> Result<Vec<u8>, OracleError> {
        let received = match (deadline, self.timeout) {
            (Some(deadline), Some(limit)) => reader
                .recv_timeout(deadline.saturating_duration_since(Instant::now()))
                .map_err(|e| match e {
                    mpsc::RecvTimeoutError::Timeout => OracleError::Timeout { limit },
                    mpsc::RecvTimeoutError::Disconnected => reader_panicked(),
                })?,
            _ => reader.recv().map_err(|_| reader_panicked())?,
        };
        received.map_err(|e| OracleError::Failed {
            reason: format!("failed to read output of `{}`: {e}", self.program),
        })
    }
}

type PipeReader = mpsc::Receiver<io::Result<Vec<u8>>>;

/// Writes `request` to the child's stdin and starts reading stdout and stderr.
fn start_pipe_io(
    child: &mut Child,
    request: Vec<u8>,
) -> Result<(PipeReader, PipeReader), OracleError> {
    if let Some(mut stdin) = child.stdin.take() {
        spawn_io("oracle-stdin", move || {
            if let Err(e) = stdin.write_all(&request) {
                // the exit status reports why the command stopped reading
                log::debug!("Failed to write oracle request: {e}");
            }
        })?;
    }
    let stdout = spawn_reader("oracle-stdout", child.stdout.take())?;
    let stderr = spawn_reader("oracle-stderr", child.stderr.take())?;
    Ok((stdout, stderr))
}

fn reader_panicked() -> OracleError {
    OracleError::Failed {
        reason: "oracle output reader panicked".to_owned(),
    }
}

fn spawn_io<F>(name: &str, f: F) -> Result<(), OracleError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_owned())
        .spawn(f)
        .map(drop)
        .map_err(|e| OracleError::Failed {
            reason: format!("failed to spawn {name} thread: {e}"),
        })
}

fn spawn_reader<R>(
    name: &str,
    pipe: Option<R>,
) -> Result<PipeReader, OracleError>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    spawn_io(name, move || {
        let mut buf = vec![];
        let result = match pipe {
            Some(mut pipe) => pipe.read_to_end(&mut buf).map(|_| buf),
            None => Ok(buf),
        };
        // the receiver is gone once the deadline has passed
        let _ = tx.send(result);
    })?;
    Ok(rx)
}

impl GradientOracle for SubprocessOracle {
    fn num_features(&self) -> usize {
        self.num_features
    }

    fn evaluate_gradient(&self, encoding: &DeckEncoding) -> Result<Jacobian, OracleError> {
        let request = serde_json::to_vec(&Request {
            encoding: encoding.as_slice(),
        })
        .map_err(|e| OracleError::Failed {
            reason: format!("failed to encode oracle request: {e}"),
        })?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| OracleError::Unavailable {
                reason: format!("failed to start `{}`: {e}", self.program),
            })?;

        let stdout = self.communicate(&mut child, request)?;
        let response: Response =
            serde_json::from_slice(&stdout).map_err(|e| OracleError::Failed {
                reason: format!("malformed output from `{}`: {e}", self.program),
            })?;
        Jacobian::from_rows(response.jacobian, self.num_features)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str, num_features: usize) -> SubprocessOracle {
        let command = ["sh", "-c", script].map(str::to_owned);
        SubprocessOracle::new(&command, num_features).unwrap()
    }

    fn encoding() -> DeckEncoding {
        DeckEncoding::new(vec![2.0, 0.0, 1.0])
    }

    #[test]
    fn test_reads_jacobian_from_stdout() {
        let oracle = shell(
            r#"cat > /dev/null; echo '{"jacobian": [[0.3, 0.9, -0.1], [0, 0, 0], [1, 1, 1]]}'"#,
            3,
        );
        let jacobian = oracle.evaluate_gradient(&encoding()).unwrap();
        assert_eq!(jacobian.fitness_gradient(), &[0.3, 0.9, -0.1]);
    }

    #[test]
    fn test_receives_encoding_on_stdin() {
        // echoes the encoding back as every Jacobian row
        let oracle = shell(
            r#"line=$(cat); enc=$(echo "$line" | sed 's/.*\[\(.*\)\].*/\1/'); echo "{\"jacobian\": [[$enc], [$enc], [$enc]]}""#,
            3,
        );
        let jacobian = oracle.evaluate_gradient(&encoding()).unwrap();
        assert_eq!(jacobian.fitness_gradient(), &[2.0, 0.0, 1.0]);
    }

    #[test]
    fn test_nonzero_exit_fails_elite() {
        let oracle = shell("cat > /dev/null; echo boom >&2; exit 3", 3);
        let err = oracle.evaluate_gradient(&encoding()).unwrap_err();
        assert!(matches!(&err, OracleError::Failed { reason } if reason.contains("boom")));
        assert!(!err.is_systemic());
    }

    #[test]
    fn test_malformed_output_fails_elite() {
        let oracle = shell("cat > /dev/null; echo not json", 3);
        let err = oracle.evaluate_gradient(&encoding()).unwrap_err();
        assert!(matches!(err, OracleError::Failed { .. }));
    }

    #[test]
    fn test_wrong_shape_is_systemic() {
        let oracle = shell(r#"cat > /dev/null; echo '{"jacobian": [[1, 2, 3]]}'"#, 3);
        let err = oracle.evaluate_gradient(&encoding()).unwrap_err();
        assert!(matches!(err, OracleError::OutputShape { rows: 1, .. }));
        assert!(err.is_systemic());
    }

    #[test]
    fn test_timeout_kills_command() {
        let oracle = shell("exec sleep 10", 3).with_timeout(Duration::from_millis(100));
        let start = Instant::now();
        let err = oracle.evaluate_gradient(&encoding()).unwrap_err();
        assert!(matches!(err, OracleError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_timeout_bounds_wait_on_grandchild() {
        // `sleep` runs as a grandchild holding stdout after `sh` is killed
        let oracle = shell("sleep 6; echo done", 3).with_timeout(Duration::from_millis(100));
        let start = Instant::now();
        let err = oracle.evaluate_gradient(&encoding()).unwrap_err();
        assert!(matches!(err, OracleError::Timeout { .. }));
        assert!(!err.is_systemic());
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_timeout_bounds_output_held_by_background_process() {
        let oracle = shell(
            r#"cat > /dev/null; sleep 6 & echo '{"jacobian": [[1, 2, 3], [0, 0, 0], [0, 0, 0]]}'"#,
            3,
        )
        .with_timeout(Duration::from_millis(500));
        let start = Instant::now();
        let err = oracle.evaluate_gradient(&encoding()).unwrap_err();
        assert!(matches!(err, OracleError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let oracle =
            SubprocessOracle::new(&["/nonexistent/cardorder-oracle".to_owned()], 3).unwrap();
        let err = oracle.evaluate_gradient(&encoding()).unwrap_err();
        assert!(matches!(err, OracleError::Unavailable { .. }));
        assert!(err.is_systemic());
    }

    #[test]
    fn test_empty_command_is_unavailable() {
        assert!(matches!(
            SubprocessOracle::new(&[], 3),
            Err(OracleError::Unavailable { .. })
        ));
    }
}
