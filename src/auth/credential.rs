//! Credential sets produced by the interactive login and the session record wrapping them.

// self
use crate::{_prelude::*, auth::CredentialSecret};

/// Opaque key/value token set produced by one successful login (cookies, access tokens, device
/// identifiers, ...).
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSet(BTreeMap<String, CredentialSecret>);
impl CredentialSet {
	/// Creates an empty set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds or replaces one entry.
	pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.insert(key, value);

		self
	}

	/// Adds or replaces one entry in place.
	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
		self.0.insert(key.into(), CredentialSecret::new(value));
	}

	/// Returns the secret stored under `key`.
	pub fn get(&self, key: &str) -> Option<&CredentialSecret> {
		self.0.get(key)
	}

	/// Iterates over entry names without exposing values.
	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.0.keys().map(String::as_str)
	}

	/// Returns the number of entries.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when the set holds no entries.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl<K, V> FromIterator<(K, V)> for CredentialSet
where
	K: Into<String>,
	V: Into<String>,
{
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		Self(iter.into_iter().map(|(k, v)| (k.into(), CredentialSecret::new(v))).collect())
	}
}
impl Debug for CredentialSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_set().entries(self.keys()).finish()
	}
}

/// Credentials together with the instant they were acquired.
///
/// A session only exists after a successful acquisition, so "credentials present" and
/// "acquisition time present" can never disagree. Renewals replace the whole value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialSession {
	/// Credentials returned by the login.
	pub credentials: Arc<CredentialSet>,
	/// Instant the login completed.
	pub acquired_at: OffsetDateTime,
}
impl CredentialSession {
	/// Wraps freshly acquired credentials.
	pub fn new(credentials: CredentialSet, acquired_at: OffsetDateTime) -> Self {
		Self { credentials: Arc::new(credentials), acquired_at }
	}

	/// Instant at which the session stops being valid for the given window.
	pub fn expires_at(&self, validity_window: Duration) -> OffsetDateTime {
		self.acquired_at + validity_window
	}

	/// Returns `true` while `instant - acquired_at < validity_window`.
	pub fn is_valid_at(&self, instant: OffsetDateTime, validity_window: Duration) -> bool {
		instant - self.acquired_at < validity_window
	}

	/// Time left before expiry, clamped at zero.
	pub fn remaining_at(&self, instant: OffsetDateTime, validity_window: Duration) -> Duration {
		let remaining = self.expires_at(validity_window) - instant;

		if remaining.is_negative() { Duration::ZERO } else { remaining }
	}
}
