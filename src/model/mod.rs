pub mod access_role;
pub mod repository;
pub mod sshkey;
pub mod user;

pub use access_role::AccessRole;
pub use repository::{Repo, is_valid_repo_name};
pub use sshkey::{SshKey, SshKeyType};
pub use user::User;
