use std::fmt;

use uuid::Uuid;

/// Identifier for one user turn (submit through finalize or failure).
///
/// A fresh id is minted on every submit so events from an abandoned turn can be told
/// apart from the active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TurnId(pub Uuid);

impl TurnId {
    pub fn new_v7() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Phase of the session's single in-flight turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    Sending(TurnId),
    Streaming(TurnId),
    Finalizing(TurnId),
}

/// State transition input for the turn lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnTransition {
    Submit(TurnId),
    Open(TurnId),
    Finish(TurnId),
    Settle(TurnId),
    Fail(TurnId),
}

/// Rejection reason for illegal turn transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionRejection {
    Busy { active: TurnId, attempted: TurnId },
    NoActiveTurn,
    TurnMismatch { active: TurnId, attempted: TurnId },
    WrongPhase { phase: TurnPhase, transition: TurnTransition },
}

pub type TransitionResult = Result<TurnPhase, TransitionRejection>;

impl TurnPhase {
    pub fn active_turn(&self) -> Option<TurnId> {
        match self {
            Self::Idle => None,
            Self::Sending(turn) | Self::Streaming(turn) | Self::Finalizing(turn) => Some(*turn),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Applies one transition deterministically.
    ///
    /// Only `Submit` is accepted while idle. Every other transition must name the active
    /// turn and come from the phase it leaves.
    pub fn apply(&self, transition: TurnTransition) -> TransitionResult {
        if let TurnTransition::Submit(attempted) = transition {
            return match self.active_turn() {
                None => Ok(Self::Sending(attempted)),
                Some(active) => Err(TransitionRejection::Busy { active, attempted }),
            };
        }

        let attempted = transition.turn();
        let Some(active) = self.active_turn() else {
            return Err(TransitionRejection::NoActiveTurn);
        };
        if active != attempted {
            return Err(TransitionRejection::TurnMismatch { active, attempted });
        }

        match (self, transition) {
            (Self::Sending(_), TurnTransition::Open(turn)) => Ok(Self::Streaming(turn)),
            (Self::Sending(_) | Self::Streaming(_), TurnTransition::Finish(turn)) => {
                Ok(Self::Finalizing(turn))
            }
            (Self::Sending(_) | Self::Streaming(_), TurnTransition::Fail(_)) => Ok(Self::Idle),
            (Self::Finalizing(_), TurnTransition::Settle(_)) => Ok(Self::Idle),
            _ => Err(TransitionRejection::WrongPhase {
                phase: *self,
                transition,
            }),
        }
    }
}

impl TurnTransition {
    pub fn turn(&self) -> TurnId {
        match self {
            Self::Submit(turn)
            | Self::Open(turn)
            | Self::Finish(turn)
            | Self::Settle(turn)
            | Self::Fail(turn) => *turn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_walks_every_phase() {
        let turn = TurnId::new_v7();
        let mut phase = TurnPhase::Idle;
        for (transition, expected) in [
            (TurnTransition::Submit(turn), TurnPhase::Sending(turn)),
            (TurnTransition::Open(turn), TurnPhase::Streaming(turn)),
            (TurnTransition::Finish(turn), TurnPhase::Finalizing(turn)),
            (TurnTransition::Settle(turn), TurnPhase::Idle),
        ] {
            phase = phase.apply(transition).unwrap();
            assert_eq!(phase, expected);
        }
    }

    #[test]
    fn second_submit_is_rejected_while_busy() {
        let first = TurnId::new_v7();
        let second = TurnId::new_v7();
        for phase in [
            TurnPhase::Sending(first),
            TurnPhase::Streaming(first),
            TurnPhase::Finalizing(first),
        ] {
            assert_eq!(
                phase.apply(TurnTransition::Submit(second)),
                Err(TransitionRejection::Busy {
                    active: first,
                    attempted: second
                })
            );
        }
    }

    #[test]
    fn failure_skips_finalizing() {
        let turn = TurnId::new_v7();
        assert_eq!(
            TurnPhase::Sending(turn).apply(TurnTransition::Fail(turn)),
            Ok(TurnPhase::Idle)
        );
        assert_eq!(
            TurnPhase::Streaming(turn).apply(TurnTransition::Fail(turn)),
            Ok(TurnPhase::Idle)
        );
        assert!(
            TurnPhase::Finalizing(turn)
                .apply(TurnTransition::Fail(turn))
                .is_err()
        );
    }

    #[test]
    fn stale_turn_events_are_rejected() {
        let active = TurnId::new_v7();
        let stale = TurnId::new_v7();
        assert_eq!(
            TurnPhase::Streaming(active).apply(TurnTransition::Finish(stale)),
            Err(TransitionRejection::TurnMismatch {
                active,
                attempted: stale
            })
        );
        assert_eq!(
            TurnPhase::Idle.apply(TurnTransition::Open(stale)),
            Err(TransitionRejection::NoActiveTurn)
        );
    }

    #[test]
    fn out_of_order_transitions_are_rejected() {
        let turn = TurnId::new_v7();
        assert!(
            TurnPhase::Streaming(turn)
                .apply(TurnTransition::Open(turn))
                .is_err()
        );
        assert!(
            TurnPhase::Sending(turn)
                .apply(TurnTransition::Settle(turn))
                .is_err()
        );
    }
}
