/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Ingest,
    Preprocessing,
    Regression,
    Propagation,
    Formatting,
    Output,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Config => "config",
            Stage::Ingest => "ingest",
            Stage::Preprocessing => "preprocessing",
            Stage::Regression => "regression",
            Stage::Propagation => "propagation",
            Stage::Formatting => "formatting",
            Stage::Output => "output",
        }
    }
}

/// Failure category, independent of the stage that raised it.
///
/// `NotConverged`, `SingularJacobian` and `InfeasibleBounds` are the numerical
/// failures of a regression; callers can tell them apart from a poor but
/// successful fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    InsufficientData,
    NotConverged,
    SingularJacobian,
    InfeasibleBounds,
    Io,
}

impl ErrorKind {
    fn default_exit_code(self) -> u8 {
        match self {
            ErrorKind::InvalidInput | ErrorKind::Io => 2,
            ErrorKind::InsufficientData => 3,
            ErrorKind::NotConverged | ErrorKind::SingularJacobian | ErrorKind::InfeasibleBounds => 4,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    kind: ErrorKind,
    stage: Stage,
    fit: Option<String>,
    message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            exit_code: kind.default_exit_code(),
            kind,
            stage,
            fit: None,
            message: message.into(),
        }
    }

    pub fn invalid(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, stage, message)
    }

    pub fn io(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, stage, message)
    }

    /// Attach the identifying label of the fit being processed.
    ///
    /// An already attached label is kept.
    pub fn with_fit(mut self, fit: impl Into<String>) -> Self {
        if self.fit.is_none() {
            self.fit = Some(fit.into());
        }
        self
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn fit(&self) -> Option<&str> {
        self.fit.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.fit {
            Some(fit) => write!(f, "[{}] {fit}: {}", self.stage.label(), self.message),
            None => write!(f, "[{}] {}", self.stage.label(), self.message),
        }
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("kind", &self.kind)
            .field("stage", &self.stage)
            .field("fit", &self.fit)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_stage_and_fit() {
        let err = AppError::new(ErrorKind::NotConverged, Stage::Regression, "iteration budget exhausted")
            .with_fit("Fit 2");
        assert_eq!(err.to_string(), "[regression] Fit 2: iteration budget exhausted");
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn with_fit_keeps_the_innermost_label() {
        let err = AppError::invalid(Stage::Preprocessing, "empty").with_fit("inner").with_fit("outer");
        assert_eq!(err.fit(), Some("inner"));
        assert_eq!(err.exit_code(), 2);
    }
}
