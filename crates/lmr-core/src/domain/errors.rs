use std::error::Error;
use std::fmt::{Display, Formatter};

pub type LmrResult<T> = Result<T, LmrError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LmrErrorCategory {
    Configuration,
    NotFound,
    Structural,
    Launch,
    Run,
    Internal,
}

impl LmrErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Configuration => 2,
            Self::NotFound => 3,
            Self::Structural => 4,
            Self::Launch => 5,
            Self::Run => 6,
            Self::Internal => 7,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "ConfigurationError",
            Self::NotFound => "NotFoundError",
            Self::Structural => "StructuralError",
            Self::Launch => "LaunchError",
            Self::Run => "RunError",
            Self::Internal => "InternalError",
        }
    }
}

impl Display for LmrErrorCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Terminal failure of a job invocation. None of these are retried; the code
/// is a stable token (`CONFIG.*`, `NOTFOUND.*`, ...) that tests and users can
/// grep for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LmrError {
    category: LmrErrorCategory,
    code: &'static str,
    message: String,
}

impl LmrError {
    pub fn new(category: LmrErrorCategory, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            category,
            code,
            message: message.into(),
        }
    }

    pub fn configuration(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(LmrErrorCategory::Configuration, code, message)
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(LmrErrorCategory::NotFound, code, message)
    }

    pub fn structural(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(LmrErrorCategory::Structural, code, message)
    }

    pub fn launch(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(LmrErrorCategory::Launch, code, message)
    }

    pub fn run(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(LmrErrorCategory::Run, code, message)
    }

    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(LmrErrorCategory::Internal, code, message)
    }

    pub const fn category(&self) -> LmrErrorCategory {
        self.category
    }

    pub const fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        format!("ERROR: [{}] {}", self.code, self.message)
    }

    pub fn fatal_exit_line(&self) -> String {
        format!("FATAL EXIT CODE: {}", self.exit_code())
    }
}

impl Display for LmrError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}] {}", self.category, self.code, self.message)
    }
}

impl Error for LmrError {}
