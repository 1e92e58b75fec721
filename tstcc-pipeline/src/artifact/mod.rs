//! Stage artifacts: where they live, how they are read, how they are published.

pub mod checkpoint;
pub mod labels;
pub mod paths;

pub use checkpoint::{
    CheckpointArtifact, PreparedCheckpoint, PublishedCheckpoint, load_checkpoint,
    publish_checkpoint,
};
pub use labels::{PseudoLabelArtifact, pseudo_label_path, publish_pseudo_labels};
pub use paths::{ArtifactPathResolver, StageDescriptor, checkpoint_path, run_root, stage_dir};
