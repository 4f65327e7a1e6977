//! Tenant scoping key shared by the store, the cache, and the controller.

// self
use crate::_prelude::*;

/// Composite `(group, room)` scope identifying one installation's credentials
/// and cached token.
///
/// Renders as `"group:room"`, e.g. `"1:0"` for a group-scoped installation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantKey {
	/// Group (organization) identifier.
	pub group: u64,
	/// Room identifier; `0` means the installation carries no room scope.
	pub room: u64,
}
impl TenantKey {
	/// Builds a key from its parts.
	pub const fn new(group: u64, room: u64) -> Self {
		Self { group, room }
	}

	/// Returns true when the installation carries no room scope.
	pub const fn is_group_scoped(&self) -> bool {
		self.room == 0
	}
}
impl Display for TenantKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}:{}", self.group, self.room)
	}
}
