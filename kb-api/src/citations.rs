use std::collections::HashMap;

use kb_retrieval::RetrievedChunk;
use kb_store::DocStore;
use serde::Serialize;

type TitlePath = (String, String);

use crate::error::ApiError;

/// A citation as returned to clients (§4.9 "citation construction").
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub id: u32,
    pub doc_id: String,
    pub title: String,
    pub route: String,
    pub chunk_id: String,
}

/// Strip known content-root prefixes, drop `.md`/`.mdx` extensions, strip
/// a trailing `/index`, and collapse repeated slashes, turning a source
/// file path into a site-relative route.
pub fn path_to_route(path: &str, content_roots: &[String]) -> String {
    let mut p = path.trim();
    for root in content_roots {
        let root = root.trim_matches('/');
        if root.is_empty() {
            continue;
        }
        if let Some(rest) = p.strip_prefix(root) {
            if rest.is_empty() || rest.starts_with('/') {
                p = rest;
                break;
            }
        }
    }

    let mut route = p.to_string();
    for ext in [".mdx", ".md"] {
        if let Some(stripped) = route.strip_suffix(ext) {
            route = stripped.to_string();
            break;
        }
    }
    if let Some(stripped) = route.strip_suffix("/index") {
        route = stripped.to_string();
    } else if route == "index" {
        route = String::new();
    }

    if !route.starts_with('/') {
        route = format!("/{route}");
    }
    while route.contains("//") {
        route = route.replace("//", "/");
    }
    if route.len() > 1 && route.ends_with('/') {
        route.pop();
    }
    route
}

/// Build one citation per retrieved chunk, in retrieval order, joining
/// each unique `doc_id` with the doc store for `title`/`path` (§4.9).
pub fn build_citations(
    chunks: &[RetrievedChunk],
    doc_store: &dyn DocStore,
    content_roots: &[String],
) -> Result<Vec<Citation>, ApiError> {
    let mut title_path: HashMap<String, TitlePath> = HashMap::new();
    for chunk in chunks {
        if !title_path.contains_key(&chunk.doc_id) {
            let resolved = match doc_store.get(&chunk.doc_id)? {
                Some(row) => (row.title, row.path),
                None => (chunk.doc_id.clone(), String::new()),
            };
            title_path.insert(chunk.doc_id.clone(), resolved);
        }
    }

    Ok(chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let (title, path) = title_path.get(&chunk.doc_id).cloned().unwrap_or_default();
            Citation {
                id: (i + 1) as u32,
                doc_id: chunk.doc_id.clone(),
                title,
                route: path_to_route(&path, content_roots),
                chunk_id: chunk.chunk_id.clone(),
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roots() -> Vec<String> {
        vec!["docs".to_string()]
    }

    #[test]
    fn strips_content_root_and_extension() {
        assert_eq!(path_to_route("docs/guide/setup.md", &roots()), "/guide/setup");
    }

    #[test]
    fn strips_mdx_extension() {
        assert_eq!(path_to_route("docs/intro.mdx", &roots()), "/intro");
    }

    #[test]
    fn strips_trailing_index() {
        assert_eq!(path_to_route("docs/guide/index.md", &roots()), "/guide");
    }

    #[test]
    fn collapses_repeated_slashes() {
        assert_eq!(path_to_route("docs//guide//setup.md", &roots()), "/guide/setup");
    }

    #[test]
    fn leaves_path_without_known_root_alone_besides_normalization() {
        assert_eq!(path_to_route("other/page.md", &roots()), "/other/page");
    }
}
