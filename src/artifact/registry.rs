//! Content-type registry
//!
//! Process-wide table from content-type to [`ArtifactKind`], built once on
//! first use from the content-types each kind declares.

use std::sync::LazyLock;

use rustc_hash::FxHashMap;

use super::ArtifactKind;

static REGISTRY: LazyLock<FxHashMap<&'static str, ArtifactKind>> = LazyLock::new(|| {
    let mut map = FxHashMap::default();
    for kind in ArtifactKind::ALL {
        for content_type in kind.content_types() {
            map.insert(*content_type, kind);
        }
    }
    map
});

/// Artifact kind registered for `content_type`, if any.
#[must_use]
pub fn kind_for_content_type(content_type: &str) -> Option<ArtifactKind> {
    REGISTRY.get(content_type).copied()
}

/// All registered content-types, sorted.
#[must_use]
pub fn registered_content_types() -> Vec<&'static str> {
    let mut types: Vec<&'static str> = REGISTRY.keys().copied().collect();
    types.sort_unstable();
    types
}
