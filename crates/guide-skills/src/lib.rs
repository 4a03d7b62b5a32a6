//! External collaborators for the guide core.

pub use guide_core::{WikiHit, WikiService, WikiSummary};

mod wiki;

pub use wiki::{parse_search, parse_summary, strip_html, WikiClient, WikiEndpoint, WikiError};
