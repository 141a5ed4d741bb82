//! Appointment status transition table.
//!
//! Legal status changes are a pure function of `(state, action)`:
//!
//! | state       | advance     | cancel    | no_show |
//! |-------------|-------------|-----------|---------|
//! | Scheduled   | InProgress  | Cancelled | NoShow  |
//! | InProgress  | Completed   | -         | -       |
//! | Completed   | -           | -         | -       |
//! | Cancelled   | -           | -         | -       |
//! | NoShow      | -           | -         | -       |

use crate::{AppointmentStatus, Error, Result};
use std::fmt;
use std::str::FromStr;

/// An action requested against an appointment's status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Advance,
    Cancel,
    NoShow,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Advance, Action::Cancel, Action::NoShow];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Advance => "advance",
            Action::Cancel => "cancel",
            Action::NoShow => "no_show",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    /// Case-insensitive; `no-show` is accepted as a spelling of `no_show`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "advance" => Ok(Action::Advance),
            "cancel" => Ok(Action::Cancel),
            "no_show" | "no-show" => Ok(Action::NoShow),
            _ => Err(Error::InvalidAction(s.to_string())),
        }
    }
}

/// Resolve the status reached by applying `action` in state `from`.
pub fn next_status(from: AppointmentStatus, action: Action) -> Result<AppointmentStatus> {
    use AppointmentStatus::*;

    match (from, action) {
        (Scheduled, Action::Advance) => Ok(InProgress),
        (Scheduled, Action::Cancel) => Ok(Cancelled),
        (Scheduled, Action::NoShow) => Ok(NoShow),
        (InProgress, Action::Advance) => Ok(Completed),
        _ => Err(Error::InvalidTransition { from, action }),
    }
}

/// Actions that have an edge out of `from`
pub fn allowed_actions(from: AppointmentStatus) -> Vec<Action> {
    Action::ALL
        .into_iter()
        .filter(|action| next_status(from, *action).is_ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use AppointmentStatus::*;

    #[test]
    fn test_full_table() {
        let expected = [
            (Scheduled, Action::Advance, Some(InProgress)),
            (Scheduled, Action::Cancel, Some(Cancelled)),
            (Scheduled, Action::NoShow, Some(NoShow)),
            (InProgress, Action::Advance, Some(Completed)),
            (InProgress, Action::Cancel, None),
            (InProgress, Action::NoShow, None),
            (Completed, Action::Advance, None),
            (Completed, Action::Cancel, None),
            (Completed, Action::NoShow, None),
            (Cancelled, Action::Advance, None),
            (Cancelled, Action::Cancel, None),
            (Cancelled, Action::NoShow, None),
            (NoShow, Action::Advance, None),
            (NoShow, Action::Cancel, None),
            (NoShow, Action::NoShow, None),
        ];

        for (from, action, to) in expected {
            match (next_status(from, action), to) {
                (Ok(actual), Some(to)) => assert_eq!(actual, to, "{:?} + {:?}", from, action),
                (Err(Error::InvalidTransition { from: f, action: a }), None) => {
                    assert_eq!(f, from);
                    assert_eq!(a, action);
                }
                (other, _) => panic!("{:?} + {:?} gave {:?}", from, action, other),
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_actions() {
        for status in AppointmentStatus::ALL {
            assert_eq!(status.is_terminal(), allowed_actions(status).is_empty());
        }
    }

    #[test]
    fn test_parse_action() {
        assert_eq!("advance".parse::<Action>().unwrap(), Action::Advance);
        assert_eq!("CANCEL".parse::<Action>().unwrap(), Action::Cancel);
        assert_eq!("no-show".parse::<Action>().unwrap(), Action::NoShow);
        assert!(matches!(
            "reschedule".parse::<Action>(),
            Err(Error::InvalidAction(a)) if a == "reschedule"
        ));
    }
}
