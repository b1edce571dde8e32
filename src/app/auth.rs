use anyhow::{Result, bail};

use crate::db::KeyValueStore;

use super::backend::BackendError;

pub(crate) const AUTH_TOKEN_KEY: &str = "authToken";
const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn stored_token<S: KeyValueStore>(store: &S) -> Result<Option<String>> {
    Ok(store
        .get(AUTH_TOKEN_KEY)?
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty()))
}

pub(crate) fn require_token<S: KeyValueStore>(store: &S) -> Result<String, BackendError> {
    match stored_token(store) {
        Ok(Some(token)) => Ok(token),
        Ok(None) => Err(BackendError::MissingToken),
        Err(err) => {
            tracing::warn!("auth token lookup failed: {err:#}");
            Err(BackendError::MissingToken)
        }
    }
}

pub(crate) fn is_authenticated<S: KeyValueStore>(store: &S) -> bool {
    matches!(stored_token(store), Ok(Some(_)))
}

pub(crate) fn save_token<S: KeyValueStore>(store: &S, token: &str) -> Result<()> {
    store.set(AUTH_TOKEN_KEY, token)
}

pub(crate) fn clear_token<S: KeyValueStore>(store: &S) -> Result<bool> {
    store.remove(AUTH_TOKEN_KEY)
}

/// Loose `\S+@\S+\.\S+` shape check.
pub(crate) fn is_plausible_email(raw: &str) -> bool {
    let email = raw.trim();
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() {
        return false;
    }
    match domain.rfind('.') {
        Some(dot) => dot > 0 && dot + 1 < domain.len(),
        None => false,
    }
}

pub(crate) fn validate_credentials(email: &str, password: &str) -> Result<()> {
    if email.trim().is_empty() {
        bail!("email is required");
    }
    if !is_plausible_email(email) {
        bail!("entered value does not match email format");
    }
    if password.is_empty() {
        bail!("password is required");
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        bail!("password must be at least {MIN_PASSWORD_LEN} characters");
    }
    Ok(())
}
