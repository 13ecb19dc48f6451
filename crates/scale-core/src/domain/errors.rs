use super::PipelineStage;

pub type ScalingResult<T> = Result<T, ScalingError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalingErrorCategory {
    Success,
    InputValidationError,
    DataIntegrityError,
    IoSystemError,
    ComputationError,
    Cancelled,
    InternalError,
}

impl ScalingErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::InputValidationError => 2,
            Self::IoSystemError => 3,
            Self::ComputationError => 4,
            Self::InternalError => 5,
            Self::DataIntegrityError => 6,
            Self::Cancelled => 130,
        }
    }

    pub const fn rust_category(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::InputValidationError => "InputValidationError",
            Self::DataIntegrityError => "DataIntegrityError",
            Self::IoSystemError => "IoSystemError",
            Self::ComputationError => "ComputationError",
            Self::Cancelled => "Cancelled",
            Self::InternalError => "InternalError",
        }
    }

    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::Success)
    }
}

/// Fatal pipeline error tagged with the stage that raised it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} [{}] {}: {}", .category.rust_category(), .placeholder, .stage, .message)]
pub struct ScalingError {
    category: ScalingErrorCategory,
    stage: PipelineStage,
    placeholder: &'static str,
    message: String,
}

impl ScalingError {
    pub fn new(
        category: ScalingErrorCategory,
        stage: PipelineStage,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            stage,
            placeholder,
            message: message.into(),
        }
    }

    pub fn configuration(
        stage: PipelineStage,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            ScalingErrorCategory::InputValidationError,
            stage,
            placeholder,
            message,
        )
    }

    pub fn data_integrity(
        stage: PipelineStage,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            ScalingErrorCategory::DataIntegrityError,
            stage,
            placeholder,
            message,
        )
    }

    pub fn io_system(
        stage: PipelineStage,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ScalingErrorCategory::IoSystemError, stage, placeholder, message)
    }

    pub fn computation(
        stage: PipelineStage,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            ScalingErrorCategory::ComputationError,
            stage,
            placeholder,
            message,
        )
    }

    pub fn cancelled(stage: PipelineStage) -> Self {
        Self::new(
            ScalingErrorCategory::Cancelled,
            stage,
            "RUN.CANCELLED",
            "abort requested between iterations",
        )
    }

    pub fn internal(
        stage: PipelineStage,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ScalingErrorCategory::InternalError, stage, placeholder, message)
    }

    pub const fn category(&self) -> ScalingErrorCategory {
        self.category
    }

    pub const fn stage(&self) -> &PipelineStage {
        &self.stage
    }

    pub const fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        let severity = if self.category.is_fatal() {
            "ERROR"
        } else {
            "INFO"
        };
        format!(
            "{}: [{}] {}: {}",
            severity, self.placeholder, self.stage, self.message
        )
    }

    pub fn fatal_exit_line(&self) -> Option<String> {
        self.category
            .is_fatal()
            .then(|| format!("FATAL EXIT CODE: {}", self.exit_code()))
    }
}
