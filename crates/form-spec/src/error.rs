use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("failed to parse form definition: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid message template '{key}': {source}")]
    Template {
        key: &'static str,
        #[source]
        source: Box<handlebars::TemplateError>,
    },
}
