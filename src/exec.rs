//! External command invocation.
//!
//! All external tools go through [`Cmd`], which keeps the invocation
//! printable for error messages. Commands block until completion; there is
//! no timeout (a hung tool hangs the run).

use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};

/// Builder for an external command invocation.
///
/// ```rust,ignore
/// Cmd::new("growpart")
///     .args(["/dev/sda", "2"])
///     .error_msg("growpart failed")
///     .run()?;
/// ```
pub struct Cmd {
    program: String,
    args: Vec<String>,
    error_msg: Option<String>,
}

impl Cmd {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            error_msg: None,
        }
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_string()));
        self
    }

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.display().to_string());
        self
    }

    /// Message prefix used when the command fails.
    pub fn error_msg(mut self, msg: &str) -> Self {
        self.error_msg = Some(msg.to_string());
        self
    }

    fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    /// Run with inherited stdio, failing on a non-zero exit status.
    pub fn run(self) -> Result<()> {
        let display = self.display();
        let status = Command::new(&self.program)
            .args(&self.args)
            .status()
            .with_context(|| format!("failed to spawn '{}'", display))?;

        if !status.success() {
            match self.error_msg {
                Some(msg) => bail!("{} ('{}' exited with {})", msg, display, status),
                None => bail!("'{}' exited with {}", display, status),
            }
        }
        Ok(())
    }

    /// Run without streaming, returning combined stdout + stderr. A non-zero
    /// exit status is an error carrying the captured output.
    pub fn capture(self) -> Result<String> {
        let display = self.display();
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to spawn '{}'", display))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            let msg = self
                .error_msg
                .unwrap_or_else(|| format!("'{}' failed", display));
            bail!("{}: {}", msg, combined.trim());
        }
        Ok(combined)
    }

    /// Like [`Cmd::capture`], but a non-zero exit is not an error: returns
    /// the combined output and whether the command succeeded. Used for
    /// best-effort probes (`growpart` reporting NOCHANGE, `systemctl
    /// is-active`).
    pub fn capture_unchecked(self) -> Result<(String, bool)> {
        let display = self.display();
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to spawn '{}'", display))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok((combined, output.status.success()))
    }
}

/// Check whether a command is available on PATH.
pub fn command_exists(name: &str) -> bool {
    which::which(name).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_exists() {
        assert!(command_exists("ls"));
        assert!(!command_exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn test_capture_output() {
        let out = Cmd::new("echo").arg("hello").capture().unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[test]
    fn test_run_failure_carries_error_msg() {
        let err = Cmd::new("ls")
            .arg("/definitely/not/a/path/xyz")
            .error_msg("listing failed")
            .capture()
            .unwrap_err();
        assert!(err.to_string().contains("listing failed"));
    }

    #[test]
    fn test_capture_unchecked_reports_status() {
        let (_, ok) = Cmd::new("ls")
            .arg("/definitely/not/a/path/xyz")
            .capture_unchecked()
            .unwrap();
        assert!(!ok);
    }
}
