//! Outbound-request safety.
//!
//! Every URL the audit pipeline dereferences passes through this module first,
//! so attacker-controlled redirects, sitemap entries and canonical tags cannot
//! steer requests at internal services.

mod url_validation;

pub use url_validation::{validate_url_safe, UrlPolicy};
