//! Plain-text rendering of an [`Answer`] for chat-style clients.
//!
//! Local images are rewritten to the gateway's static routes (`/pack` for the content pack,
//! `/kb-images` for the keyword KB image directory). A local file outside every served
//! directory is left out of the reply, since clients could not fetch it.

use guide_core::{Answer, OutputUnit};
use std::path::Path;

/// Route the pack directory is served under.
pub const PACK_ROUTE: &str = "/pack";
/// Route the keyword KB image directory is served under.
pub const KB_IMAGE_ROUTE: &str = "/kb-images";

/// Served directories, checked in order.
pub struct ImageRoutes<'a> {
    mounts: Vec<(&'static str, &'a Path)>,
}

impl<'a> ImageRoutes<'a> {
    pub fn new(pack_dir: &'a Path, kb_image_dir: &'a Path) -> Self {
        Self {
            mounts: vec![(PACK_ROUTE, pack_dir), (KB_IMAGE_ROUTE, kb_image_dir)],
        }
    }

    /// URL path for a local file, if it lives under a served directory.
    pub fn url_for(&self, path: &Path) -> Option<String> {
        self.mounts.iter().find_map(|(route, dir)| {
            let rel = path.strip_prefix(dir).ok()?;
            let parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            Some(format!("{}/{}", route, parts.join("/")))
        })
    }
}

fn unit_line(unit: &OutputUnit, routes: &ImageRoutes<'_>) -> Option<String> {
    match unit {
        OutputUnit::Text(text) => Some(text.clone()),
        OutputUnit::RemoteImage(url) => Some(format!("[image] {}", url)),
        OutputUnit::LocalImage(path) => {
            let url = routes.url_for(path);
            if url.is_none() {
                tracing::debug!(target: "guide::gateway", path = %path.display(), "local image outside served directories; omitted");
            }
            url.map(|u| format!("[image] {}", u))
        }
    }
}

/// One line per output unit; wiki answers become title / summary / link.
pub fn reply_lines(answer: &Answer, routes: &ImageRoutes<'_>) -> Vec<String> {
    match answer {
        Answer::Pack { units, .. } | Answer::Kb { units, .. } => {
            units.iter().filter_map(|u| unit_line(u, routes)).collect()
        }
        Answer::Wiki { title, summary, url } => {
            let mut lines = vec![format!("[wiki] {}", title)];
            if !summary.is_empty() {
                lines.push(summary.clone());
            }
            lines.push(url.clone());
            lines
        }
        Answer::NotFound { query } => vec![format!("No local entry or wiki result for \"{}\".", query)],
        Answer::Failed { message } => vec![format!("Wiki lookup failed: {}", message)],
        Answer::EmptyQuery => vec!["Usage: send a keyword, e.g. \"waterskin\".".to_string()],
    }
}
