// ⚠️ Error taxonomy for the analytics core
//
// Configuration  - bad or missing source data, insufficient population (fatal at startup)
// NotFound       - unknown company id (structured miss for the caller)
// Degraded...    - graph store unreachable (converted to an explicit degraded answer)

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalyticsError>;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    /// Source data missing/malformed, or the population cannot be clustered
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Company id absent from the snapshot or the graph store
    #[error("Not found: {0}")]
    NotFound(String),

    /// External graph store could not answer
    #[error("Graph store unavailable: {0}")]
    DegradedDependency(String),

    /// Request parameter out of its allowed range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Narrative generator failed
    #[error("Narrative generation failed: {0}")]
    Narrative(String),
}

impl AnalyticsError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        AnalyticsError::Configuration(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AnalyticsError::NotFound(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AnalyticsError::NotFound(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, AnalyticsError::Configuration(_))
    }

    /// HTTP status code for the presentation layer
    pub fn status_code(&self) -> u16 {
        match self {
            AnalyticsError::NotFound(_) => 404,
            AnalyticsError::InvalidParameter(_) => 400,
            AnalyticsError::DegradedDependency(_) => 503,
            AnalyticsError::Narrative(_) => 502,
            AnalyticsError::Configuration(_) => 500,
        }
    }
}

impl From<csv::Error> for AnalyticsError {
    fn from(err: csv::Error) -> Self {
        AnalyticsError::Configuration(format!("CSV error: {}", err))
    }
}

impl From<std::io::Error> for AnalyticsError {
    fn from(err: std::io::Error) -> Self {
        AnalyticsError::Configuration(format!("IO error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AnalyticsError::not_found("X").status_code(), 404);
        assert_eq!(AnalyticsError::configuration("bad").status_code(), 500);
        assert_eq!(
            AnalyticsError::InvalidParameter("horizon".to_string()).status_code(),
            400
        );
    }

    #[test]
    fn test_io_errors_become_configuration() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.csv");
        let err: AnalyticsError = io.into();

        assert!(err.is_configuration());
        assert!(err.to_string().contains("missing.csv"));
    }
}
