//! Identifier types.

use serde::{Deserialize, Serialize};
use uuid::{uuid, Uuid};

/// Namespace for deterministic v5 transformation ids.
const REMOD_NAMESPACE: Uuid = uuid!("5f0c7d1e-2a43-4c8e-9b61-7e2d4a9c13f0");

/// Identity of the transformation that produced a [`FileCommand`].
///
/// Multi-transformation runs tag every command with this id so that results
/// for the same file can be told apart and ordered.
///
/// - [`TransformationId::named`] derives a stable v5 UUID from a name, so
///   the same transformation gets the same id across processes.
/// - [`TransformationId::new`] returns a random v4 UUID for ad hoc sources.
///
/// ```
/// use remod_types::TransformationId;
///
/// assert_eq!(
///     TransformationId::named("rename-props"),
///     TransformationId::named("rename-props"),
/// );
/// assert_ne!(TransformationId::new(), TransformationId::new());
/// ```
///
/// [`FileCommand`]: crate::FileCommand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformationId(Uuid);

impl TransformationId {
    /// Creates a random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic id from a transformation name.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self(Uuid::new_v5(&REMOD_NAMESPACE, name.as_bytes()))
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TransformationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransformationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a worker lane inside one orchestrator pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LaneId(pub usize);

impl std::fmt::Display for LaneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lane-{}", self.0)
    }
}
