//! The reconcile loop's core: diff required per-account state against what
//! was last applied, and push only the differences through the
//! account-control capability.
//!
//! Enforcement is password-based: an allowed account gets the well-known
//! unlock password back, a blocked one gets a fresh random password and its
//! sessions are logged off. Changing the password invalidates cached
//! credentials at the next logon; the disconnect forces re-authentication
//! immediately.

use std::collections::HashMap;

use aegis_core::{is_within_intervals, ClientConfig};
use chrono::{DateTime, Local};
use rand::Rng;

use crate::control::AccountControl;

/// The well-known password restored while access is allowed. Deliberately
/// weak: the threat model is a parental schedule, not a hostile adversary.
const UNLOCK_PASSWORD: &str = "123456";

/// Length of the random password set while access is blocked.
const LOCK_PASSWORD_LEN: usize = 20;

/// Applies config to local accounts, idempotently.
///
/// `last_state` maps OS account names to the last applied decision
/// (`true` = allowed). It starts empty, so the first reconcile after start
/// always applies every user once.
pub struct Enforcer<C> {
    control: C,
    last_state: HashMap<String, bool>,
}

impl<C: AccountControl> Enforcer<C> {
    pub fn new(control: C) -> Self {
        Self {
            control,
            last_state: HashMap::new(),
        }
    }

    /// One reconcile pass over every user in the config.
    ///
    /// All per-user decisions use the single `now` passed in. A config with
    /// zero users applies nothing and leaves `last_state` untouched.
    pub async fn reconcile(&mut self, config: &ClientConfig, now: DateTime<Local>) {
        for user in &config.users {
            let required = is_within_intervals(&now, &user.allowed_intervals);

            // Unknown accounts default to the opposite decision so the
            // first pass always applies.
            let current = self
                .last_state
                .get(&user.username)
                .copied()
                .unwrap_or(!required);
            if required == current {
                continue;
            }

            if required {
                self.unlock(&user.username).await;
            } else {
                self.lock(&user.username).await;
            }
        }
    }

    /// Restore the well-known password. On failure the account stays
    /// recorded as blocked so the next tick retries.
    async fn unlock(&mut self, username: &str) {
        match self.control.set_password(username, UNLOCK_PASSWORD).await {
            Ok(()) => {
                tracing::info!(username, "Account unlocked (access allowed)");
                self.last_state.insert(username.to_string(), true);
            }
            Err(e) => {
                tracing::error!(username, error = %e, "Failed to unlock account");
                self.last_state.insert(username.to_string(), false);
            }
        }
    }

    /// Scramble the password and kick active sessions. The account counts
    /// as blocked once the password changed, even if the disconnect failed;
    /// a failed password change stays recorded as allowed so the next tick
    /// retries.
    async fn lock(&mut self, username: &str) {
        let password = generate_lock_password();
        match self.control.set_password(username, &password).await {
            Ok(()) => {
                self.last_state.insert(username.to_string(), false);
                if let Err(e) = self.control.disconnect_session(username).await {
                    tracing::warn!(username, error = %e, "Session disconnect failed");
                }
                tracing::info!(username, "Account locked (access denied)");
            }
            Err(e) => {
                tracing::error!(username, error = %e, "Failed to lock account");
                self.last_state.insert(username.to_string(), true);
            }
        }
    }
}

/// A 20-character password drawn uniformly from `[A-Za-z0-9]` using the
/// thread-local CSPRNG.
fn generate_lock_password() -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(LOCK_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use aegis_core::{AllowedInterval, UserAccessConfig};
    use chrono::Duration;

    use crate::control::ControlError;

    #[derive(Debug, PartialEq, Eq, Clone)]
    enum Call {
        SetPassword { username: String, password: String },
        Disconnect { username: String },
    }

    /// Records every capability call; failure can be injected per method.
    #[derive(Default)]
    struct RecordingControl {
        calls: Mutex<Vec<Call>>,
        fail_set_password: AtomicBool,
        fail_disconnect: AtomicBool,
    }

    impl RecordingControl {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn clear(&self) {
            self.calls.lock().unwrap().clear();
        }
    }

    impl AccountControl for &RecordingControl {
        async fn set_password(&self, username: &str, password: &str) -> Result<(), ControlError> {
            self.calls.lock().unwrap().push(Call::SetPassword {
                username: username.to_string(),
                password: password.to_string(),
            });
            if self.fail_set_password.load(Ordering::SeqCst) {
                return Err(ControlError::CommandFailed {
                    command: "net user",
                    status: 2,
                    stderr: "access denied".to_string(),
                });
            }
            Ok(())
        }

        async fn disconnect_session(&self, username: &str) -> Result<(), ControlError> {
            self.calls.lock().unwrap().push(Call::Disconnect {
                username: username.to_string(),
            });
            if self.fail_disconnect.load(Ordering::SeqCst) {
                return Err(ControlError::CommandFailed {
                    command: "logoff",
                    status: 1,
                    stderr: "no such session".to_string(),
                });
            }
            Ok(())
        }
    }

    fn config_with(username: &str, intervals: Vec<AllowedInterval>) -> ClientConfig {
        ClientConfig {
            users: vec![UserAccessConfig {
                username: username.to_string(),
                allowed_intervals: intervals,
            }],
            version: "v1".to_string(),
        }
    }

    fn around_now() -> (DateTime<Local>, Vec<AllowedInterval>) {
        let now = Local::now();
        let intervals = vec![AllowedInterval {
            start: now - Duration::hours(1),
            end: now + Duration::hours(1),
        }];
        (now, intervals)
    }

    #[tokio::test]
    async fn first_tick_applies_an_allowed_user_once() {
        let control = RecordingControl::default();
        let mut enforcer = Enforcer::new(&control);
        let (now, intervals) = around_now();
        let config = config_with("alice", intervals);

        enforcer.reconcile(&config, now).await;
        assert_eq!(
            control.calls(),
            [Call::SetPassword {
                username: "alice".to_string(),
                password: UNLOCK_PASSWORD.to_string(),
            }]
        );

        // Second tick with unchanged state: nothing to do.
        control.clear();
        enforcer.reconcile(&config, now).await;
        assert!(control.calls().is_empty());
    }

    #[tokio::test]
    async fn first_tick_locks_a_blocked_user_and_kicks_sessions() {
        let control = RecordingControl::default();
        let mut enforcer = Enforcer::new(&control);
        let now = Local::now();
        let config = config_with("alice", vec![]);

        enforcer.reconcile(&config, now).await;

        let calls = control.calls();
        assert_eq!(calls.len(), 2);
        match &calls[0] {
            Call::SetPassword { username, password } => {
                assert_eq!(username, "alice");
                assert_eq!(password.len(), LOCK_PASSWORD_LEN);
                assert!(password.bytes().all(|b| b.is_ascii_alphanumeric()));
                assert_ne!(password, UNLOCK_PASSWORD);
            }
            other => panic!("expected a password change first, got {other:?}"),
        }
        assert_eq!(
            calls[1],
            Call::Disconnect {
                username: "alice".to_string()
            }
        );

        control.clear();
        enforcer.reconcile(&config, now).await;
        assert!(control.calls().is_empty(), "lock must not be re-applied");
    }

    #[tokio::test]
    async fn boundary_crossing_flips_the_account() {
        let control = RecordingControl::default();
        let mut enforcer = Enforcer::new(&control);
        let (now, intervals) = around_now();
        let config = config_with("alice", intervals);

        enforcer.reconcile(&config, now).await;
        control.clear();

        // Two hours later the interval has ended.
        enforcer.reconcile(&config, now + Duration::hours(2)).await;

        let calls = control.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], Call::SetPassword { .. }));
        assert!(matches!(calls[1], Call::Disconnect { .. }));
    }

    #[tokio::test]
    async fn empty_config_applies_nothing() {
        let control = RecordingControl::default();
        let mut enforcer = Enforcer::new(&control);
        let config = ClientConfig {
            users: vec![],
            version: "v1".to_string(),
        };

        enforcer.reconcile(&config, Local::now()).await;
        assert!(control.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_unlock_is_retried_on_the_next_tick() {
        let control = RecordingControl::default();
        control.fail_set_password.store(true, Ordering::SeqCst);
        let mut enforcer = Enforcer::new(&control);
        let (now, intervals) = around_now();
        let config = config_with("alice", intervals);

        enforcer.reconcile(&config, now).await;
        assert_eq!(control.calls().len(), 1);

        // Still failing: it keeps trying.
        control.clear();
        enforcer.reconcile(&config, now).await;
        assert_eq!(control.calls().len(), 1);

        // Once the capability recovers the unlock sticks.
        control.fail_set_password.store(false, Ordering::SeqCst);
        control.clear();
        enforcer.reconcile(&config, now).await;
        assert_eq!(control.calls().len(), 1);

        control.clear();
        enforcer.reconcile(&config, now).await;
        assert!(control.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_disconnect_still_counts_as_locked() {
        let control = RecordingControl::default();
        control.fail_disconnect.store(true, Ordering::SeqCst);
        let mut enforcer = Enforcer::new(&control);
        let config = config_with("alice", vec![]);

        let now = Local::now();
        enforcer.reconcile(&config, now).await;
        assert_eq!(control.calls().len(), 2);

        // The password changed, so the account is blocked; no retry.
        control.clear();
        enforcer.reconcile(&config, now).await;
        assert!(control.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_lock_is_retried_with_a_fresh_password() {
        let control = RecordingControl::default();
        control.fail_set_password.store(true, Ordering::SeqCst);
        let mut enforcer = Enforcer::new(&control);
        let config = config_with("alice", vec![]);

        let now = Local::now();
        enforcer.reconcile(&config, now).await;
        let first = control.calls();
        assert_eq!(first.len(), 1, "no disconnect after a failed change");

        control.fail_set_password.store(false, Ordering::SeqCst);
        control.clear();
        enforcer.reconcile(&config, now).await;
        let second = control.calls();
        assert_eq!(second.len(), 2);

        // Fresh randomness on every attempt.
        let (Call::SetPassword { password: p1, .. }, Call::SetPassword { password: p2, .. }) =
            (&first[0], &second[0])
        else {
            panic!("expected password changes");
        };
        assert_ne!(p1, p2);
    }

    #[test]
    fn lock_passwords_are_long_random_alphanumerics() {
        let a = generate_lock_password();
        let b = generate_lock_password();
        assert_eq!(a.len(), LOCK_PASSWORD_LEN);
        assert!(a.bytes().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
