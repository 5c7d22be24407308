mod hash_password;
mod init;
mod purge_tokens;

pub use hash_password::{cmd_hash_password, read_new_password};
pub use init::cmd_init;
pub use purge_tokens::cmd_purge_tokens;
