use super::{Resolve, ResolvedAction};
use crate::http::Request;

use std::path::{Component, Path, PathBuf};

use tracing::debug;

/// Serves files from disk.
///
/// - `/` maps to `/index.html`.
/// - An extensionless path `P` maps to `P.html` when that file exists.
/// - Paths under the download prefix map into the data directory and are
///   sent as attachments.
/// - A path that could leave its root (`..`, `.`, an empty segment, or a
///   second leading `/`) is refused with 403.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    resource_dir: PathBuf,
    data_dir: PathBuf,
    download_prefix: String,
}

impl StaticResolver {
    pub fn new(resource_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            resource_dir: resource_dir.into(),
            data_dir: data_dir.into(),
            download_prefix: "/download/".to_owned(),
        }
    }

    pub fn resource_dir(&self) -> &Path {
        &self.resource_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Maps a path relative to the resource directory.
    fn page_path(&self, relative: &str) -> PathBuf {
        if relative.is_empty() {
            return self.resource_dir.join("index.html");
        }

        let direct = self.resource_dir.join(relative);

        if direct.extension().is_none() {
            let html = self.resource_dir.join(format!("{relative}.html"));
            if html.is_file() {
                return html;
            }
        }

        direct
    }
}

/// Whether joining `relative` onto a root stays strictly below it.
///
/// Every segment must be a plain name: `PathBuf::join` would drop the root
/// for an absolute path, and `..` would climb out of it.
fn stays_inside(relative: &str) -> bool {
    relative.split('/').all(|segment| !segment.is_empty())
        && Path::new(relative)
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

impl Resolve for StaticResolver {
    fn resolve(&self, request: &Request) -> ResolvedAction {
        let path = request.path.as_str();

        let Some(relative) = path.strip_prefix('/') else {
            debug!(path, "refusing relative request target");
            return ResolvedAction::error(403);
        };

        if let Some(name) = path.strip_prefix(&self.download_prefix) {
            if name.is_empty() {
                return ResolvedAction::error(404);
            }
            if !stays_inside(name) {
                debug!(path, "refusing download outside the data directory");
                return ResolvedAction::error(403);
            }
            return ResolvedAction::download(self.data_dir.join(name));
        }

        if !relative.is_empty() && !stays_inside(relative) {
            debug!(path, "refusing path outside the resource directory");
            return ResolvedAction::error(403);
        }

        ResolvedAction::page(self.page_path(relative))
    }
}
