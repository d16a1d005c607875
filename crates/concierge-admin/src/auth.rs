//! Credential verification and HMAC-signed session cookies.
//!
//! `ADMIN_PASSWORD_HASH` (argon2) is preferred; the plaintext
//! `ADMIN_PASSWORD` comparison exists for small deployments that have not
//! generated a hash. The password check always runs so a wrong username is
//! indistinguishable from a wrong password.

use argon2::password_hash::PasswordHash;
use argon2::{Argon2, PasswordVerifier};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use concierge_core::config::AdminConfig;

type HmacSha256 = Hmac<Sha256>;

/// Session lifetime: 30-day remember-me.
const SESSION_TTL_SECS: i64 = 30 * 24 * 60 * 60;

pub const SESSION_COOKIE: &str = "concierge_session";

pub fn verify_credentials(config: &AdminConfig, username: &str, password: &str) -> bool {
    if username.is_empty() || password.is_empty() {
        return false;
    }
    let username_ok = username == config.username;

    let password_ok = if !config.password_hash.is_empty() {
        PasswordHash::new(&config.password_hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    } else {
        password == config.password
    };

    username_ok && password_ok
}

fn sign(secret: &str, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Issue a session token: `{expiry}.{hmac}`.
pub fn issue_session(secret: &str) -> String {
    let expiry = Utc::now().timestamp() + SESSION_TTL_SECS;
    let signature = sign(secret, &format!("session:{expiry}"));
    format!("{expiry}.{signature}")
}

pub fn verify_session(secret: &str, token: &str) -> bool {
    let Some((expiry_str, signature)) = token.split_once('.') else {
        return false;
    };
    let Ok(expiry) = expiry_str.parse::<i64>() else {
        return false;
    };
    if expiry < Utc::now().timestamp() {
        return false;
    }
    sign(secret, &format!("session:{expiry}")) == signature
}

/// CSRF token bound to the session token (double-submit pattern).
pub fn csrf_token(secret: &str, session: &str) -> String {
    sign(secret, &format!("csrf:{session}"))
}

pub fn verify_csrf(secret: &str, session: &str, token: &str) -> bool {
    !token.is_empty() && csrf_token(secret, session) == token
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(password: &str, hash: &str) -> AdminConfig {
        AdminConfig {
            username: "admin".into(),
            password: password.into(),
            password_hash: hash.into(),
            secret_key: "test-secret".into(),
            host: "127.0.0.1".into(),
            port: 5000,
        }
    }

    #[test]
    fn plaintext_credentials_verify() {
        let cfg = config("hunter2", "");
        assert!(verify_credentials(&cfg, "admin", "hunter2"));
        assert!(!verify_credentials(&cfg, "admin", "wrong"));
        assert!(!verify_credentials(&cfg, "other", "hunter2"));
        assert!(!verify_credentials(&cfg, "admin", ""));
    }

    #[test]
    fn argon2_hash_preferred_over_plaintext() {
        use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(b"hunter2", &salt)
            .unwrap()
            .to_string();

        let cfg = config("ignored-plaintext", &hash);
        assert!(verify_credentials(&cfg, "admin", "hunter2"));
        assert!(
            !verify_credentials(&cfg, "admin", "ignored-plaintext"),
            "plaintext is not consulted when a hash is set"
        );
    }

    #[test]
    fn session_roundtrip_and_tamper_detection() {
        let token = issue_session("secret");
        assert!(verify_session("secret", &token));
        assert!(!verify_session("other-secret", &token));
        assert!(!verify_session("secret", &format!("{token}x")));
        assert!(!verify_session("secret", "999.deadbeef"));
        assert!(!verify_session("secret", "garbage"));
    }

    #[test]
    fn expired_session_rejected() {
        let expiry = Utc::now().timestamp() - 10;
        let signature = sign("secret", &format!("session:{expiry}"));
        assert!(!verify_session("secret", &format!("{expiry}.{signature}")));
    }

    #[test]
    fn csrf_bound_to_session() {
        let session = issue_session("secret");
        let token = csrf_token("secret", &session);
        assert!(verify_csrf("secret", &session, &token));
        assert!(!verify_csrf("secret", &session, "wrong"));
        assert!(!verify_csrf("secret", "other-session", &token));
        assert!(!verify_csrf("secret", &session, ""));
    }
}
