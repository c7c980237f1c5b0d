use datacat_api::StageError;
use conductor::ConductorError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("config: {0}")]
    Config(String),

    #[error("{stage}: {source}")]
    Stage { stage: &'static str, source: StageError },

    #[error("conductor: {0}")]
    Conductor(#[from] ConductorError),
}

impl PipelineError {
    /// Attach the failing stage to a stage error.
    pub fn stage(stage: &'static str) -> impl FnOnce(StageError) -> Self {
        move |source| PipelineError::Stage { stage, source }
    }
}
