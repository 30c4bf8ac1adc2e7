use std::fmt;

pub type ClockResult<T> = Result<T, ClockError>;

/// Invalid clock configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockError {
    InvalidPrecision { value: f64 },
    UnsupportedBits { bits: u32 },
    InvalidDriftRate { value: f64 },
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPrecision { value } => {
                write!(f, "network time precision must be positive, got {value}")
            }
            Self::UnsupportedBits { bits } => {
                write!(f, "network timestamps must be 16 or 32 bits, got {bits}")
            }
            Self::InvalidDriftRate { value } => {
                write!(f, "clock drift rate must be non-negative, got {value}")
            }
        }
    }
}

impl std::error::Error for ClockError {}
