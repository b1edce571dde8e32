use crate::db::KeyValueStore;

pub(crate) const RESUME_KEY_PREFIX: &str = "video-time-";

pub(crate) fn resume_key(locator: &str) -> String {
    format!("{RESUME_KEY_PREFIX}{locator}")
}

pub(crate) fn locator_from_resume_key(key: &str) -> Option<&str> {
    key.strip_prefix(RESUME_KEY_PREFIX)
}

pub(crate) fn parse_resume_seconds(raw: &str) -> Option<f64> {
    let seconds = raw.trim().parse::<f64>().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then_some(seconds)
}

/// Best-effort resume-position persistence: failures are logged, never returned.
pub(crate) struct ResumePositions<S> {
    store: S,
}

impl<S: KeyValueStore> ResumePositions<S> {
    pub(crate) fn new(store: S) -> Self {
        Self { store }
    }

    pub(crate) fn load(&self, locator: &str) -> Option<f64> {
        match self.store.get(&resume_key(locator)) {
            Ok(Some(raw)) => {
                let parsed = parse_resume_seconds(&raw);
                if parsed.is_none() {
                    tracing::warn!(locator, raw = raw.as_str(), "ignoring unparseable resume position");
                }
                parsed
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(locator, "resume position lookup failed: {err:#}");
                None
            }
        }
    }

    pub(crate) fn save(&self, locator: &str, seconds: f64) {
        if !seconds.is_finite() || seconds < 0.0 {
            return;
        }
        if let Err(err) = self.store.set(&resume_key(locator), &seconds.to_string()) {
            tracing::warn!(locator, seconds, "resume position write failed: {err:#}");
        }
    }
}
