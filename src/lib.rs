//! Session and command orchestration for remotely controlled vehicles: single-flight credential
//! renewal, auth-aware command retries, sliding-window rate limits, and resilient inventory
//! discovery behind one broker facade.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod backend;
pub mod broker;
pub mod command;
pub mod config;
pub mod debounce;
pub mod directory;
pub mod error;
pub mod executor;
pub mod obs;
pub mod rate_limit;
pub mod session;
pub mod store;

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap, VecDeque},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::{Arc, Weak},
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};

	pub use crate::error::{Error, FailureKind, Result};

	/// Converts a signed [`Duration`] into a sleepable [`std::time::Duration`], clamping negatives
	/// to zero.
	pub fn to_std(duration: Duration) -> std::time::Duration {
		std::time::Duration::try_from(duration).unwrap_or_default()
	}
}

pub use serde_json;
#[cfg(test)] use color_eyre as _;
