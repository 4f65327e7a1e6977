//! Webhook payload model for one tenant installation.

// self
use crate::{
	_prelude::*,
	install::{Secret, TenantKey},
};

/// One tenant installation as delivered by the platform's install webhook.
///
/// Records are never mutated in place: an update replaces credentials by
/// re-saving, and an uninstall deletes by OAuth client identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRecord {
	/// Platform metadata endpoint describing the OAuth provider.
	pub capabilities_url: Url,
	/// OAuth client identifier; globally unique and the natural delete key.
	pub oauth_id: String,
	/// OAuth client secret. Redacted from all log output.
	pub oauth_secret: Secret,
	/// Tenant (group/organization) scope.
	pub group_id: u64,
	/// Optional sub-scope; `0` means "no room scope".
	#[serde(default)]
	pub room_id: u64,
}
impl InstallRecord {
	/// The `(group, room)` scope this installation covers.
	pub const fn tenant_key(&self) -> TenantKey {
		TenantKey::new(self.group_id, self.room_id)
	}
}
