//! The slice of a template task row the scheduler reads.

use serde::{Deserialize, Serialize};

/// A reusable task row flagged `is_template = 1` on the external queue.
///
/// `args` and `metadata` are opaque blobs; the core never deserializes
/// them. Only the store's cloning routine touches their contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateTask {
    pub id: i64,
    pub task_type: String,
    pub description: String,
    pub args: Option<String>,
    pub metadata: Option<String>,
}
