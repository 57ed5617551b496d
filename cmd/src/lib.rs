use std::ffi::OsStr;
use std::fmt::Display;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as BaseCommand;

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to spawn command: {command}")]
    Spawn {
        command: String,
        #[source]
        error: tokio::io::Error,
    },

    #[error("failed to write stdin of command: {command}")]
    Stdin {
        command: String,
        #[source]
        error: tokio::io::Error,
    },

    #[error("command failed ({status}): {command}\n{output}")]
    Failure {
        command: String,
        status: String,
        output: String,
    },
}

/// Captured result of an external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn new(code: Option<i32>, stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stdout followed by stderr, trimmed.
    pub fn combined(&self) -> String {
        let mut combined = String::from_utf8_lossy(&self.stdout).into_owned();
        if !self.stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&String::from_utf8_lossy(&self.stderr));
        }
        combined.trim_end().to_owned()
    }

    pub fn status(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_owned(),
        }
    }
}

#[derive(Debug)]
pub struct Command {
    cmd: BaseCommand,
    stdin: Option<Vec<u8>>,
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cmd = self.cmd.as_std();
        let program = cmd.get_program().to_string_lossy();
        let args = cmd
            .get_args()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        if args.is_empty() {
            write!(f, "{program}",)
        } else {
            write!(f, "{program} {args}",)
        }
    }
}

impl Command {
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            cmd: BaseCommand::new(program),
            stdin: None,
        }
    }

    pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        self.cmd.arg(arg);
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.cmd.args(args);
        self
    }

    pub fn env<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.cmd.env(key, value);
        self
    }

    /// Bytes fed to the command's standard input.
    pub fn stdin(&mut self, data: impl Into<Vec<u8>>) -> &mut Command {
        self.stdin = Some(data.into());
        self
    }

    /// Run to completion and capture output, whatever the exit status.
    pub async fn output(&mut self) -> Result<CommandOutput, CommandError> {
        debug!("exec: {self}");

        let mut child = self
            .cmd
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| CommandError::Spawn {
                command: self.to_string(),
                error,
            })?;

        // Feed stdin concurrently so a chatty child cannot block on a full pipe.
        let writer = match (child.stdin.take(), self.stdin.clone()) {
            (Some(mut stdin), Some(data)) => Some(tokio::spawn(async move {
                stdin.write_all(&data).await?;
                stdin.shutdown().await
            })),
            _ => None,
        };

        let output = child
            .wait_with_output()
            .await
            .map_err(|error| CommandError::Spawn {
                command: self.to_string(),
                error,
            })?;

        if let Some(writer) = writer {
            let written = writer
                .await
                .unwrap_or_else(|join_error| Err(tokio::io::Error::other(join_error)));
            match written {
                Ok(()) => {}
                // A failed child may exit without reading its input; its own output says why.
                Err(error)
                    if error.kind() == tokio::io::ErrorKind::BrokenPipe
                        && !output.status.success() =>
                {
                    debug!("stdin closed early by failed command: {self}");
                }
                Err(error) => {
                    return Err(CommandError::Stdin {
                        command: self.to_string(),
                        error,
                    });
                }
            }
        }

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    /// Run to completion; a non-zero exit is an error carrying the output.
    pub async fn run(&mut self) -> Result<CommandOutput, CommandError> {
        let output = self.output().await?;
        if output.success() {
            Ok(output)
        } else {
            Err(CommandError::Failure {
                command: self.to_string(),
                status: output.status(),
                output: output.combined(),
            })
        }
    }
}
