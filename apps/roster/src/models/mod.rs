pub mod directory;
pub mod filter;
pub mod permission;
pub mod role;

pub use directory::{Alliance, Character, Corporation};
pub use filter::{Filter, FilterRef};
pub use permission::Permission;
pub use role::{NewRole, Role, RoleKind, RolePatch};
