#[derive(Debug, thiserror::Error)]
pub enum DatacatError {
    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    Pipeline(#[from] pipeline::PipelineError),
}
