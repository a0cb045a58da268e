use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::Duration;

use crate::error::{DeployError, DeployResult};

/// Run a command and capture its output. Fails if the command
/// returns a non-zero exit code.
pub fn run(program: &str, args: &[&str]) -> DeployResult<String> {
    let output = spawn(program, args)?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(failure(program, args, &output))
    }
}

/// Run a command with stdin/stdout/stderr inherited (interactive).
pub fn run_interactive(program: &str, args: &[&str]) -> DeployResult<()> {
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|e| spawn_error(program, e))?;

    if status.success() {
        Ok(())
    } else {
        Err(DeployError::CommandFailed {
            command: format_command(program, args),
            status,
            stderr: String::new(),
        })
    }
}

/// Run a command with stdout shown live but stderr teed: each line
/// is echoed to the terminal and retained, so a failure still
/// carries the diagnostics the child printed. Used for engine
/// invocations whose stderr drives failure classification.
pub fn run_streamed(program: &str, args: &[&str]) -> DeployResult<()> {
    use std::io::{BufRead, BufReader};

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    let mut stderr = String::new();
    if let Some(pipe) = child.stderr.take() {
        for line in BufReader::new(pipe).lines() {
            let line = line?;
            eprintln!("{line}");
            stderr.push_str(&line);
            stderr.push('\n');
        }
    }

    let status = child.wait()?;
    if status.success() {
        Ok(())
    } else {
        Err(DeployError::CommandFailed {
            command: format_command(program, args),
            status,
            stderr: stderr.trim().to_string(),
        })
    }
}

/// Run a command that pipes its stdin from a byte slice. Used for
/// secrets that must never appear in argv.
pub fn run_with_stdin(program: &str, args: &[&str], stdin_data: &[u8]) -> DeployResult<String> {
    use std::io::Write;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    if let Some(stdin) = &mut child.stdin {
        stdin.write_all(stdin_data)?;
    }
    drop(child.stdin.take());

    let output = child.wait_with_output()?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(failure(program, args, &output))
    }
}

/// Run a command, retrying with exponential backoff on failure.
/// The first retry waits `base_delay`, doubling on each attempt.
pub fn run_with_retry(
    program: &str,
    args: &[&str],
    max_attempts: u32,
    base_delay: Duration,
) -> DeployResult<String> {
    let mut delay = base_delay;
    let mut attempt = 1;

    loop {
        match run(program, args) {
            Ok(output) => return Ok(output),
            Err(err) if attempt < max_attempts => {
                eprintln!(
                    "  Attempt {attempt}/{max_attempts} failed: \
                     {err}; retrying in {}s",
                    delay.as_secs()
                );
                thread::sleep(delay);
                delay *= 2;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Check if a command exists on PATH.
#[must_use]
pub fn command_exists(program: &str) -> bool {
    Command::new("which")
        .arg(program)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

fn spawn(program: &str, args: &[&str]) -> DeployResult<Output> {
    Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| spawn_error(program, e))
}

fn spawn_error(program: &str, e: std::io::Error) -> DeployError {
    if e.kind() == std::io::ErrorKind::NotFound {
        DeployError::CommandNotFound(program.to_string())
    } else {
        DeployError::Io(e)
    }
}

fn failure(program: &str, args: &[&str], output: &Output) -> DeployError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    DeployError::CommandFailed {
        command: format_command(program, args),
        status: output.status,
        stderr,
    }
}

fn format_command(program: &str, args: &[&str]) -> String {
    let mut parts = vec![program.to_string()];
    parts.extend(args.iter().map(|a| (*a).to_string()));
    parts.join(" ")
}
