//! Small OS helpers shared by the shortcut and login-item writers

use std::io;
use std::path::Path;
use std::process::{Command, ExitStatus, Output, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Upper bound for any helper process the shell runs (`reg`, PowerShell)
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

/// A command that never flashes a console window on Windows
pub fn background_command(program: &str) -> Command {
    #[allow(unused_mut)]
    let mut cmd = Command::new(program);

    // Hide console on Windows
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    cmd
}

fn timed_out(program: &str, timeout: Duration) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("{} timed out after {:?}", program, timeout),
    )
}

/// Runs `cmd` without capturing output, killing it once `timeout` passes
pub fn status_with_timeout(mut cmd: Command, timeout: Duration) -> io::Result<ExitStatus> {
    let program = cmd.get_program().to_string_lossy().to_string();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    match child.wait_timeout(timeout)? {
        Some(status) => Ok(status),
        None => {
            let _ = child.kill();
            let _ = child.wait();
            Err(timed_out(&program, timeout))
        }
    }
}

/// Async variant capturing output; the child is killed when the deadline
/// passes
pub async fn output_with_timeout(cmd: Command, timeout: Duration) -> io::Result<Output> {
    let program = cmd.get_program().to_string_lossy().to_string();
    let mut cmd = tokio::process::Command::from(cmd);
    cmd.stdin(Stdio::null()).kill_on_drop(true);

    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(output) => output,
        Err(_) => Err(timed_out(&program, timeout)),
    }
}

/// Sets mode 0755 on Unix; a no-op elsewhere
pub fn make_executable(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Quotes a value for a single-quoted PowerShell string literal
pub fn powershell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quotes a value for a POSIX shell
pub fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
