use core::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Where a message stands for one destination
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Status {
    Received,
    Filtered,
    Transformed,
    Sent,
    Queued,
    Error,
    Pending,
}

impl Status {
    /// The statuses a destination is allowed to settle on after a send
    pub const DESTINATION_FINAL: [Self; 4] = [Self::Filtered, Self::Error, Self::Sent, Self::Queued];

    /// Checks if this is a status a destination may finish a send attempt with
    pub fn is_valid_destination_status(self) -> bool {
        Self::DESTINATION_FINAL.contains(&self)
    }

    /// Checks if the message has left the pipeline for good (it will not be sent again)
    pub const fn is_completed(self) -> bool {
        matches!(self, Self::Filtered | Self::Error | Self::Sent)
    }

    pub const fn as_char(self) -> char {
        match self {
            Self::Received => 'R',
            Self::Filtered => 'F',
            Self::Transformed => 'T',
            Self::Sent => 'S',
            Self::Queued => 'Q',
            Self::Error => 'E',
            Self::Pending => 'P',
        }
    }
}

impl TryFrom<char> for Status {
    type Error = char;

    fn try_from(value: char) -> Result<Self, char> {
        match value {
            'R' => Ok(Self::Received),
            'F' => Ok(Self::Filtered),
            'T' => Ok(Self::Transformed),
            'S' => Ok(Self::Sent),
            'Q' => Ok(Self::Queued),
            'E' => Ok(Status::Error),
            'P' => Ok(Self::Pending),
            other => Err(other),
        }
    }
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        let name = match self {
            Self::Received => "RECEIVED",
            Self::Filtered => "FILTERED",
            Self::Transformed => "TRANSFORMED",
            Self::Sent => "SENT",
            Self::Queued => "QUEUED",
            Self::Error => "ERROR",
            Self::Pending => "PENDING",
        };

        fmt.write_str(name)
    }
}
