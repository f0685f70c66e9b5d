//! Strongly typed identifiers for vehicles and in-flight remote requests.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view)?;

				Ok(Self(view.to_owned()))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 64;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty or whitespace.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (resource, request).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (resource, request).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (resource, request).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

def_id! { ResourceId, "Stable identifier of a controllable vehicle (usually its VIN).", "Resource" }
def_id! { RequestId, "Backend-issued identifier of a remote command awaiting completion.", "Request" }

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn identifiers_reject_whitespace_and_empty_values() {
		assert!(ResourceId::new(" KMHL14JA5PA000001").is_err(), "Leading whitespace must be rejected.");
		assert!(ResourceId::new("KMHL14JA5PA000001 ").is_err(), "Trailing whitespace must be rejected.");

		let vin = ResourceId::new("KMHL14JA5PA000001").expect("VIN fixture should be valid.");

		assert_eq!(vin.as_ref(), "KMHL14JA5PA000001");
		assert_eq!(format!("{vin:?}"), "Resource(KMHL14JA5PA000001)");
		assert!(RequestId::new("").is_err());
		assert!(RequestId::new("req 1").is_err());
	}

	#[test]
	fn serde_enforces_validation() {
		let vin: ResourceId =
			serde_json::from_str("\"VIN-42\"").expect("Resource should deserialize successfully.");

		assert_eq!(vin.as_ref(), "VIN-42");
		assert!(serde_json::from_str::<ResourceId>("\"with space\"").is_err());
	}

	#[test]
	fn identifiers_parse_from_strings() {
		let vin: ResourceId = "KMHL14JA5PA000001".parse().expect("VIN should parse.");

		assert_eq!(vin.as_ref(), "KMHL14JA5PA000001");
		assert_eq!(
			"req 1".parse::<RequestId>(),
			Err(IdentifierError::ContainsWhitespace { kind: "Request" })
		);
	}

	#[test]
	fn length_limit_applies() {
		let exact = "a".repeat(IDENTIFIER_MAX_LEN);

		ResourceId::new(&exact).expect("Exact length should succeed.");

		let too_long = "a".repeat(IDENTIFIER_MAX_LEN + 1);

		assert!(matches!(
			ResourceId::new(&too_long),
			Err(IdentifierError::TooLong { kind: "Resource", max: IDENTIFIER_MAX_LEN })
		));
	}

	#[test]
	fn borrow_supports_fast_lookup() {
		let map: HashMap<ResourceId, u8> = HashMap::from_iter([(
			ResourceId::new("VIN1").expect("Resource used for lookup should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("VIN1"), Some(&7));
	}
}
