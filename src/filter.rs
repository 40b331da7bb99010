use std::fmt;
use std::time::Duration;

use crate::model::ItemCriteria;

/// Why an item was not processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// A minimum is set but the platform reported no duration
    DurationUnknown { min: u64 },
    TooShort { duration: Duration, min: u64 },
    TooLong { duration: Duration, max: u64 },
    TitleMismatch { filter: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::DurationUnknown { min } => {
                write!(f, "duration unknown (minimum is {min}s)")
            }
            Rejection::TooShort { duration, min } => {
                write!(f, "duration {}s is below the minimum of {min}s", duration.as_secs_f64())
            }
            Rejection::TooLong { duration, max } => {
                write!(f, "duration {}s exceeds the maximum of {max}s", duration.as_secs_f64())
            }
            Rejection::TitleMismatch { filter } => {
                write!(f, "title does not contain \"{filter}\"")
            }
        }
    }
}

/// Decides whether a candidate video is converted
#[derive(Debug, Clone)]
pub struct ItemFilter {
    min_duration: Option<u64>,
    max_duration: Option<u64>,
    /// Already case-folded
    title_filter: Option<String>,
}

impl ItemFilter {
    pub fn new(criteria: &ItemCriteria) -> Self {
        Self {
            min_duration: criteria.min_duration_seconds,
            max_duration: criteria.max_duration_seconds,
            title_filter: criteria
                .title_filter
                .as_deref()
                .filter(|filter| !filter.is_empty())
                .map(str::to_lowercase),
        }
    }

    pub fn should_process(&self, duration: Option<Duration>, title: &str) -> bool {
        self.evaluate(duration, title).is_ok()
    }

    /// Like [`should_process`](Self::should_process), naming the first failed check.
    ///
    /// An unknown duration fails only the minimum check, never the maximum.
    /// Bounds are whole seconds; durations are compared unrounded.
    pub fn evaluate(&self, duration: Option<Duration>, title: &str) -> Result<(), Rejection> {
        if let Some(min) = self.min_duration {
            match duration {
                None => return Err(Rejection::DurationUnknown { min }),
                Some(duration) if duration < Duration::from_secs(min) => {
                    return Err(Rejection::TooShort { duration, min });
                }
                Some(_) => {}
            }
        }

        if let (Some(max), Some(duration)) = (self.max_duration, duration)
            && duration > Duration::from_secs(max)
        {
            return Err(Rejection::TooLong { duration, max });
        }

        if let Some(ref filter) = self.title_filter
            && !title.to_lowercase().contains(filter.as_str())
        {
            return Err(Rejection::TitleMismatch {
                filter: filter.clone(),
            });
        }

        Ok(())
    }
}
