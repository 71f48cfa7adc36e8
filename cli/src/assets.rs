//! Service templates compiled into the binary.
//!
//! `include_dir!` embeds everything under `cli/templates/`, one directory per
//! registry unit. Rendering reads them straight from memory, so a deployment
//! never depends on files next to the executable.

use include_dir::{Dir, include_dir};

/// Every service template directory, keyed by service id.
pub static TEMPLATES: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/templates");

/// Whether templates are embedded for `service`.
#[must_use]
pub fn has_templates(service: &str) -> bool {
    TEMPLATES.get_dir(service).is_some()
}
