/// Vault path layout for platform secrets.
///
/// Every secret minted by the installer lives under
/// `datastack/{customer}/{service}/{name}`. Both vault backends receive the
/// same logical path; each maps it onto its own API.
pub mod layout {
    /// Root segment shared by every secret path.
    pub const ROOT: &str = "datastack";

    /// Service segment for installer-owned material (artifact keys).
    pub const INSTALLER: &str = "installer";

    /// Secret name of the per-run artifact encryption key.
    pub const ARTIFACT_KEY: &str = "artifact-encryption-key";

    /// Maximum accepted path length.
    pub const MAX_PATH_LEN: usize = 200;
}

/// Build the path for a service-scoped secret.
#[must_use]
pub fn secret_path(customer: &str, service: &str, name: &str) -> String {
    format!("{}/{customer}/{service}/{name}", layout::ROOT)
}

/// Path of the artifact encryption key for a customer.
#[must_use]
pub fn encryption_key_path(customer: &str) -> String {
    secret_path(customer, layout::INSTALLER, layout::ARTIFACT_KEY)
}

/// Validate that a path follows `datastack/<segment>/<segment>/<segment>`.
///
/// Segments are lowercase alphanumerics and dashes. Always call before
/// handing a path built from operator input to a backend.
pub fn validate_secret_path(path: &str) -> Result<(), &'static str> {
    if path.len() > layout::MAX_PATH_LEN {
        return Err("secret path is too long");
    }
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() != 4 {
        return Err("secret path must have exactly four segments");
    }
    if segments[0] != layout::ROOT {
        return Err("secret path must start with 'datastack/'");
    }
    for segment in &segments[1..] {
        if segment.is_empty() {
            return Err("secret path segments must not be empty");
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err("secret path segments must be lowercase [a-z0-9-]");
        }
    }
    Ok(())
}
