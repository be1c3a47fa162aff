//! Account payloads: registration, password change, and the signed-in user.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Role granting household and event administration.
pub const ROLE_ADMIN: &str = "ADMIN";
/// Role granting administration of other administrators.
pub const ROLE_SUPER_ADMIN: &str = "SUPER_ADMIN";

/// New account submitted to `POST /auth/register`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
	/// Account email address.
	pub email: String,
	/// Chosen password.
	#[serde(serialize_with = "crate::auth::tokens::expose_secret")]
	pub password: TokenSecret,
	/// Given name.
	pub first_name: String,
	/// Family name.
	pub last_name: String,
}
impl Registration {
	/// Builds a registration for the provided person.
	pub fn new(
		email: impl Into<String>,
		password: impl Into<String>,
		first_name: impl Into<String>,
		last_name: impl Into<String>,
	) -> Self {
		Self {
			email: email.into(),
			password: TokenSecret::new(password.into()),
			first_name: first_name.into(),
			last_name: last_name.into(),
		}
	}
}

/// Body of `POST /auth/update-password`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
	/// Password currently in use.
	#[serde(serialize_with = "crate::auth::tokens::expose_secret")]
	pub old_password: TokenSecret,
	/// Replacement password.
	#[serde(rename = "password", serialize_with = "crate::auth::tokens::expose_secret")]
	pub new_password: TokenSecret,
}
impl PasswordChange {
	/// Builds a change from the old and new password.
	pub fn new(old_password: impl Into<String>, new_password: impl Into<String>) -> Self {
		Self {
			old_password: TokenSecret::new(old_password.into()),
			new_password: TokenSecret::new(new_password.into()),
		}
	}
}

/// Server acknowledgement of a password change.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PasswordUpdate {
	/// Human-readable status message.
	#[serde(default)]
	pub message: String,
	/// Whether the password was changed.
	pub success: bool,
}

/// Signed-in user returned by `GET /auth/me`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
	/// Account identifier.
	pub id: String,
	/// Account email address.
	pub email: String,
	/// Granted roles, e.g. `ADMIN`.
	#[serde(default)]
	pub roles: Vec<String>,
	/// Given name.
	#[serde(default)]
	pub first_name: Option<String>,
	/// Family name.
	#[serde(default)]
	pub last_name: Option<String>,
	/// Push notifications enabled.
	#[serde(default)]
	pub notifications: bool,
	/// Email updates enabled.
	#[serde(default)]
	pub email_updates: bool,
	/// Location sharing enabled.
	#[serde(default)]
	pub location_sharing: bool,
}
impl User {
	/// Returns `true` if `role` was granted.
	pub fn has_role(&self, role: &str) -> bool {
		self.roles.iter().any(|granted| granted == role)
	}

	/// Administrators and super administrators.
	pub fn is_admin(&self) -> bool {
		self.has_role(ROLE_ADMIN) || self.is_super_admin()
	}

	/// Super administrators only.
	pub fn is_super_admin(&self) -> bool {
		self.has_role(ROLE_SUPER_ADMIN)
	}
}
