//! Subprocess execution behind a narrow trait.
//!
//! External tools are invoked through [`CommandRunner`] so the translate and
//! statistics logic can be tested with a fake that never spawns anything.
//! [`SystemRunner`] is the real implementation: it drains stdout and stderr
//! on helper threads (so a chatty tool never blocks on a full pipe), polls
//! for exit, and kills the child once the timeout elapses.

use std::fmt;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{command} timed out after {timeout:?}")]
    TimedOut {
        command: String,
        timeout: Duration,
        output: String,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A program and its argument vector. No shell is involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Shell-like rendering for logs; arguments with spaces are quoted.
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Exit status plus merged output (stdout followed by stderr).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub status: Option<i32>,
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn status_string(&self) -> String {
        match self.status {
            Some(code) => code.to_string(),
            None => "signal".to_string(),
        }
    }
}

pub trait CommandRunner: Sync {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError>;
}

/// Runs commands with `std::process`, bounded by an optional timeout.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        log::debug!("running {}", spec);
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: spec.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break Some(status);
            }
            if self.timeout.is_some_and(|t| started.elapsed() >= t) {
                // The child may exit between try_wait and kill.
                let _ = child.kill();
                let _ = child.wait();
                break None;
            }
            thread::sleep(POLL_INTERVAL);
        };

        let mut output = collect(stdout);
        output.push_str(&collect(stderr));

        match status {
            Some(status) => Ok(CommandOutput {
                status: status.code(),
                output,
            }),
            None => Err(RunnerError::TimedOut {
                command: spec.to_string(),
                timeout: self.timeout.unwrap_or_default(),
                output,
            }),
        }
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<thread::JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Fake runner that records every command and answers from a script.
    ///
    /// The responder sees the `CommandSpec`, so tests can create the output file a
    /// real translate run would have written.
    #[derive(Clone)]
    pub struct FakeRunner {
        seen: Arc<Mutex<Vec<CommandSpec>>>,
        respond: Arc<dyn Fn(&CommandSpec) -> Result<CommandOutput, RunnerError> + Send + Sync>,
    }

    impl FakeRunner {
        pub fn new(
            respond: impl Fn(&CommandSpec) -> Result<CommandOutput, RunnerError>
            + Send
            + Sync
            + 'static,
        ) -> Self {
            Self {
                seen: Arc::new(Mutex::new(Vec::new())),
                respond: Arc::new(respond),
            }
        }

        pub fn with_output(status: i32, output: &str) -> Self {
            let output = output.to_string();
            Self::new(move |_| {
                Ok(CommandOutput {
                    status: Some(status),
                    output: output.clone(),
                })
            })
        }

        pub fn spawn_failure() -> Self {
            Self::new(|spec| {
                Err(RunnerError::Spawn {
                    program: spec.program.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not installed"),
                })
            })
        }

        pub fn take_seen(&self) -> Vec<CommandSpec> {
            std::mem::take(&mut *self.seen.lock().unwrap())
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
            self.seen.lock().unwrap().push(spec.clone());
            (self.respond)(spec)
        }
    }

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let spec = CommandSpec::new("gdal_translate")
            .args(["-of", "JPEG"])
            .arg("/data/my scene.ntf");
        assert_eq!(
            spec.to_string(),
            "gdal_translate -of JPEG \"/data/my scene.ntf\""
        );
    }

    #[test]
    fn status_string_for_signal() {
        let out = CommandOutput {
            status: None,
            output: String::new(),
        };
        assert!(!out.success());
        assert_eq!(out.status_string(), "signal");
    }

    #[test]
    fn fake_runner_records_specs() {
        let runner = FakeRunner::with_output(0, "ok");
        let out = runner.run(&CommandSpec::new("gdalinfo").arg("-stats")).unwrap();
        assert!(out.success());
        let seen = runner.take_seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].args, vec!["-stats"]);
    }

    #[test]
    fn system_runner_missing_program_is_spawn_error() {
        let runner = SystemRunner::new(Some(Duration::from_secs(5)));
        let result = runner.run(&CommandSpec::new("definitely-not-a-real-tool-4242"));
        assert!(matches!(result, Err(RunnerError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_merges_stdout_then_stderr() {
        let runner = SystemRunner::new(Some(Duration::from_secs(10)));
        let spec = CommandSpec::new("sh").args(["-c", "echo out; echo err 1>&2; exit 3"]);
        let out = runner.run(&spec).unwrap();
        assert_eq!(out.status, Some(3));
        assert_eq!(out.output, "out\nerr\n");
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_kills_on_timeout() {
        let runner = SystemRunner::new(Some(Duration::from_millis(200)));
        let started = Instant::now();
        let result = runner.run(&CommandSpec::new("sleep").arg("30"));
        assert!(matches!(result, Err(RunnerError::TimedOut { .. })));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
