//! Argument-vector construction for the external sync tool.
//!
//! The tool is invoked as
//! `cloudsync --dir DIR [--username U --password P]* [--enable FEATURE]*
//! [--verbose | --silent]`, with the working directory also exported via an
//! environment variable. Passwords are decrypted immediately before the
//! spawn and must never appear in logs: anything logged goes through
//! [`CommandSpec::masked_args`].

use std::sync::Arc;

use synchub_core::credentials::CredentialCipher;
use synchub_core::error::CoreError;
use synchub_db::models::profile::{Profile, ProfileAccount};

/// Environment variable carrying the working directory.
pub const SYNC_DIR_ENV: &str = "SYNCHUB_SYNC_DIR";

const PASSWORD_FLAG: &str = "--password";
const MASK: &str = "***";

/// A service account with its password decrypted, alive only for the
/// duration of one spawn.
pub struct DecryptedAccount {
    pub username: String,
    pub password: String,
}

/// Decrypt every account password for a spawn. The error names the failing
/// field (`<service>.password`) without any secret material.
pub fn decrypt_accounts(
    cipher: &Arc<CredentialCipher>,
    accounts: &[ProfileAccount],
) -> Result<Vec<DecryptedAccount>, CoreError> {
    accounts
        .iter()
        .map(|account| {
            let field = format!("{}.password", account.service);
            let password = cipher.decrypt(&account.password_enc, &field)?;
            Ok(DecryptedAccount {
                username: account.username.clone(),
                password,
            })
        })
        .collect()
}

/// A fully built invocation of the sync tool.
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory, also injected as [`SYNC_DIR_ENV`].
    pub sync_dir: String,
}

impl CommandSpec {
    /// Build the argument vector from profile data.
    ///
    /// `dir_override` substitutes a different working directory (used by
    /// first-time setup flows); `None` uses the profile's own.
    pub fn build(
        program: &str,
        profile: &Profile,
        accounts: &[DecryptedAccount],
        dir_override: Option<&str>,
    ) -> Self {
        let sync_dir = dir_override.unwrap_or(&profile.sync_dir).to_string();

        let mut args = vec!["--dir".to_string(), sync_dir.clone()];

        for account in accounts {
            args.push("--username".to_string());
            args.push(account.username.clone());
            args.push(PASSWORD_FLAG.to_string());
            args.push(account.password.clone());
        }

        for feature in &profile.features {
            args.push("--enable".to_string());
            args.push(feature.clone());
        }

        match profile.log_level.as_str() {
            "debug" => args.push("--verbose".to_string()),
            "warn" | "error" => args.push("--silent".to_string()),
            _ => {}
        }

        Self {
            program: program.to_string(),
            args,
            sync_dir,
        }
    }

    /// The argument vector with every password value masked, safe to log.
    pub fn masked_args(&self) -> Vec<String> {
        let mut masked = Vec::with_capacity(self.args.len());
        let mut mask_next = false;
        for arg in &self.args {
            if mask_next {
                masked.push(MASK.to_string());
            } else {
                masked.push(arg.clone());
            }
            mask_next = arg == PASSWORD_FLAG;
        }
        masked
    }

    /// A `tokio::process::Command` with the program, arguments, and
    /// environment applied.
    pub fn command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args).env(SYNC_DIR_ENV, &self.sync_dir);
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_profile(log_level: &str, features: &[&str]) -> Profile {
        Profile {
            id: 1,
            name: "home".to_string(),
            enabled: true,
            cron_expr: None,
            sync_dir: "/srv/sync/home".to_string(),
            features: features.iter().map(|f| f.to_string()).collect(),
            log_level: log_level.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn dir_flag_always_present() {
        let spec = CommandSpec::build("cloudsync", &test_profile("info", &[]), &[], None);
        assert_eq!(spec.args[..2], ["--dir", "/srv/sync/home"]);
        assert_eq!(spec.sync_dir, "/srv/sync/home");
    }

    #[test]
    fn override_replaces_profile_dir() {
        let spec = CommandSpec::build(
            "cloudsync",
            &test_profile("info", &[]),
            &[],
            Some("/tmp/setup"),
        );
        assert_eq!(spec.args[..2], ["--dir", "/tmp/setup"]);
        assert_eq!(spec.sync_dir, "/tmp/setup");
    }

    #[test]
    fn account_flags_in_order() {
        let accounts = vec![DecryptedAccount {
            username: "alice@example.com".to_string(),
            password: "s3cret".to_string(),
        }];
        let spec = CommandSpec::build("cloudsync", &test_profile("info", &[]), &accounts, None);
        assert_eq!(
            spec.args[2..6],
            ["--username", "alice@example.com", "--password", "s3cret"]
        );
    }

    #[test]
    fn features_and_verbosity() {
        let spec = CommandSpec::build(
            "cloudsync",
            &test_profile("debug", &["photos", "contacts"]),
            &[],
            None,
        );
        let args = spec.args.join(" ");
        assert!(args.contains("--enable photos"));
        assert!(args.contains("--enable contacts"));
        assert!(args.ends_with("--verbose"));

        let silent = CommandSpec::build("cloudsync", &test_profile("warn", &[]), &[], None);
        assert!(silent.args.join(" ").ends_with("--silent"));

        let default = CommandSpec::build("cloudsync", &test_profile("info", &[]), &[], None);
        assert!(!default.args.join(" ").contains("--verbose"));
        assert!(!default.args.join(" ").contains("--silent"));
    }

    #[test]
    fn masked_args_hide_every_password() {
        let accounts = vec![
            DecryptedAccount {
                username: "a@example.com".to_string(),
                password: "first-secret".to_string(),
            },
            DecryptedAccount {
                username: "b@example.com".to_string(),
                password: "second-secret".to_string(),
            },
        ];
        let spec = CommandSpec::build("cloudsync", &test_profile("info", &[]), &accounts, None);

        let masked = spec.masked_args().join(" ");
        assert!(!masked.contains("first-secret"));
        assert!(!masked.contains("second-secret"));
        assert_eq!(masked.matches("***").count(), 2);
        // Usernames are not secrets and stay visible.
        assert!(masked.contains("a@example.com"));
    }
}
