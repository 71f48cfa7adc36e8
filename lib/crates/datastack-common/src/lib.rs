pub mod secret_paths;
pub mod types;

pub use secret_paths::{encryption_key_path, secret_path, validate_secret_path};
pub use types::*;
