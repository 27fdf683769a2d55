//! The account-control capability: set a local account's password and
//! force its sessions to log off.
//!
//! On Windows the implementation shells out to the built-in tools
//! (`net user`, `query session`, `logoff`); everywhere else a logging stub
//! stands in so the agent can be exercised end-to-end on a dev machine.

use std::future::Future;

/// Error type for account-control failures.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with status {status}: {stderr}")]
    CommandFailed {
        command: &'static str,
        status: i32,
        stderr: String,
    },
}

/// Narrow capability over local user accounts.
///
/// Injected into the enforcement loop so production uses the OS tools and
/// tests use a recording stub.
pub trait AccountControl {
    /// Set the OS password for a local account.
    fn set_password(
        &self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = Result<(), ControlError>> + Send;

    /// Force-logoff every interactive session of the account. Succeeds when
    /// no session matches.
    fn disconnect_session(
        &self,
        username: &str,
    ) -> impl Future<Output = Result<(), ControlError>> + Send;
}

// ---------------------------------------------------------------------------
// Session table parsing
// ---------------------------------------------------------------------------

/// Extract the session ids belonging to `username` from `query session`
/// output.
///
/// Matching is by short name, case-insensitive, ignoring any `DOMAIN\`
/// prefix. Session 0 (services) is always skipped, as is the header row.
/// The current-session marker (`>`) is tolerated.
pub fn parse_session_ids(output: &str, username: &str) -> Vec<u32> {
    let mut ids = Vec::new();

    for line in output.lines().skip(1) {
        let line = line.trim_start_matches('>');
        let tokens: Vec<&str> = line.split_whitespace().collect();

        let Some(name_idx) = tokens.iter().position(|token| {
            let short = token.rsplit('\\').next().unwrap_or(token);
            short.eq_ignore_ascii_case(username)
        }) else {
            continue;
        };

        // The session id is the first numeric column after the username.
        let Some(id) = tokens[name_idx + 1..]
            .iter()
            .find_map(|token| token.parse::<u32>().ok())
        else {
            continue;
        };

        if id != 0 {
            ids.push(id);
        }
    }

    ids
}

// ---------------------------------------------------------------------------
// Windows implementation
// ---------------------------------------------------------------------------

/// Account control backed by the Windows built-in tools.
#[cfg(windows)]
#[derive(Debug, Default)]
pub struct WindowsAccountControl;

#[cfg(windows)]
impl WindowsAccountControl {
    pub fn new() -> Self {
        Self
    }

    async fn run(
        command: &'static str,
        args: &[&str],
    ) -> Result<std::process::Output, ControlError> {
        use std::os::windows::process::CommandExt as _;

        // CREATE_NO_WINDOW: the service must not flash console windows.
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;

        let mut cmd = std::process::Command::new(command);
        cmd.args(args).creation_flags(CREATE_NO_WINDOW);

        tokio::process::Command::from(cmd)
            .output()
            .await
            .map_err(|source| ControlError::Spawn { command, source })
    }

    fn check(command: &'static str, output: std::process::Output) -> Result<(), ControlError> {
        if output.status.success() {
            return Ok(());
        }
        Err(ControlError::CommandFailed {
            command,
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(windows)]
impl AccountControl for WindowsAccountControl {
    async fn set_password(&self, username: &str, password: &str) -> Result<(), ControlError> {
        let output = Self::run("net", &["user", username, password]).await?;
        Self::check("net user", output)
    }

    async fn disconnect_session(&self, username: &str) -> Result<(), ControlError> {
        let output = Self::run("query", &["session"]).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        let mut last_err = None;
        for session_id in parse_session_ids(&stdout, username) {
            let id = session_id.to_string();
            match Self::run("logoff", &[&id]).await.and_then(|o| Self::check("logoff", o)) {
                Ok(()) => {
                    tracing::info!(username, session_id, "Logged off session");
                }
                Err(e) => {
                    tracing::warn!(username, session_id, error = %e, "Session logoff failed");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Non-Windows stub
// ---------------------------------------------------------------------------

/// Logging stand-in for platforms without local-account control. Lets the
/// whole agent run against a control plane on a dev machine.
#[derive(Debug, Default)]
pub struct LoggingAccountControl;

impl LoggingAccountControl {
    pub fn new() -> Self {
        Self
    }
}

impl AccountControl for LoggingAccountControl {
    async fn set_password(&self, username: &str, _password: &str) -> Result<(), ControlError> {
        tracing::info!(username, "stub: would set account password");
        Ok(())
    }

    async fn disconnect_session(&self, username: &str) -> Result<(), ControlError> {
        tracing::info!(username, "stub: would disconnect sessions");
        Ok(())
    }
}
