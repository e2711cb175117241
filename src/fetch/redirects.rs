//! HTTP redirect chain resolution.
//!
//! This module follows redirect chains manually, one non-following request per
//! hop, so the full path from initial URL to final destination is recorded and
//! every hop target can be SSRF-checked before it is requested.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use url::Url;

use super::{Fetcher, RequestOptions};
use crate::error_handling::FetchError;
use crate::security::UrlPolicy;

/// One request in a redirect chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectHop {
    pub url: String,
    pub status_code: u16,
}

/// The observed redirect path of a URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectChain {
    pub hops: Vec<RedirectHop>,
    pub final_url: String,
    pub redirect_count: usize,
    pub loop_detected: bool,
    pub max_redirects_reached: bool,
    /// Set when a hop pointed at a URL the policy refused to follow.
    pub blocked_target: Option<String>,
}

impl RedirectChain {
    /// True when the walk ended for a reason other than reaching a final response.
    pub fn is_truncated(&self) -> bool {
        self.loop_detected || self.max_redirects_reached || self.blocked_target.is_some()
    }
}

/// Walks the redirect chain starting at `start_url`.
///
/// Stops at the first non-redirect response, a redirect without `Location`,
/// a revisited URL (`loop_detected`), a hop the `policy` rejects
/// (`blocked_target`), or after `max_hops` requests (`max_redirects_reached`).
/// The chain never holds more than `max_hops` entries.
///
/// # Errors
///
/// Returns the `FetchError` of the first request that fails at the transport
/// level, or a `Blocked` error when `start_url` itself is refused.
pub async fn walk_redirect_chain(
    fetcher: &dyn Fetcher,
    start_url: &str,
    max_hops: usize,
    policy: &UrlPolicy,
) -> Result<RedirectChain, FetchError> {
    policy
        .check(start_url)
        .map_err(|reason| FetchError::blocked(start_url, reason))?;

    let options = RequestOptions::no_follow();
    let mut chain = RedirectChain::default();
    let mut visited: HashSet<String> = HashSet::new();
    let mut current = start_url.to_string();
    visited.insert(current.clone());

    loop {
        if chain.hops.len() >= max_hops {
            chain.max_redirects_reached = true;
            log::warn!("Redirect chain for {start_url} exceeded {max_hops} hops");
            break;
        }

        let response = fetcher.get(&current, &options).await?;
        chain.hops.push(RedirectHop {
            url: current.clone(),
            status_code: response.status,
        });

        if !response.is_redirect() {
            break;
        }
        let Some(location) = response.location() else {
            log::warn!(
                "Redirect status {} for {} but no Location header",
                response.status,
                current
            );
            break;
        };

        let next = match Url::parse(location).or_else(|_| {
            Url::parse(&current).and_then(|base| base.join(location))
        }) {
            Ok(next) => next.to_string(),
            Err(e) => {
                log::warn!("Unparseable redirect target '{location}' from {current}: {e}");
                break;
            }
        };
        chain.redirect_count += 1;

        if !visited.insert(next.clone()) {
            chain.loop_detected = true;
            log::warn!("Redirect loop detected at {next}");
            current = next;
            break;
        }
        if let Err(reason) = policy.check(&next) {
            log::warn!("Refusing to follow redirect to {next}: {reason}");
            chain.blocked_target = Some(next.clone());
            current = next;
            break;
        }
        current = next;
    }

    chain.final_url = current;
    Ok(chain)
}
