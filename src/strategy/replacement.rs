use crate::models::{Candidate, OpenPosition};

/// Swap decided by [`consider_replacement`]
#[derive(Debug, Clone, PartialEq)]
pub struct ReplacementPlan {
    pub exit: OpenPosition,
    pub enter: Candidate,
}

/// Decide whether `candidate` should displace the weakest open position
///
/// The exit target is the position with the lowest unrealized return. A
/// profitable book (every return >= 0) is never liquidated to chase a
/// higher score, and an instrument already held is never bought again.
pub fn consider_replacement(
    candidate: &Candidate,
    positions: &[OpenPosition],
) -> Option<ReplacementPlan> {
    if positions
        .iter()
        .any(|p| p.instrument == candidate.instrument)
    {
        return None;
    }

    let weakest = positions
        .iter()
        .filter(|p| p.unrealized_return_pct.is_finite())
        .min_by(|a, b| a.unrealized_return_pct.total_cmp(&b.unrealized_return_pct))?;

    if weakest.unrealized_return_pct >= 0.0 {
        return None;
    }

    Some(ReplacementPlan {
        exit: weakest.clone(),
        enter: candidate.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RiskProfile, SignalStrength, TimingCategory};

    fn create_test_candidate(instrument: &str) -> Candidate {
        Candidate {
            instrument: instrument.to_string(),
            score: 0.95,
            effective_score: 0.95,
            timing: TimingCategory::Now,
            strength: SignalStrength::Strong,
            timing_reason: String::new(),
            risk_profile: RiskProfile::HighRisk,
        }
    }

    fn create_test_position(instrument: &str, unrealized_return_pct: f64) -> OpenPosition {
        OpenPosition {
            instrument: instrument.to_string(),
            unrealized_return_pct,
        }
    }

    #[test]
    fn test_exits_lowest_return() {
        let positions = vec![
            create_test_position("A", -5.0),
            create_test_position("B", 2.0),
            create_test_position("C", -10.0),
        ];

        let plan = consider_replacement(&create_test_candidate("NEW"), &positions).unwrap();
        assert_eq!(plan.exit.instrument, "C");
        assert_eq!(plan.enter.instrument, "NEW");
    }

    #[test]
    fn test_keeps_profitable_book() {
        let positions = vec![
            create_test_position("A", 1.0),
            create_test_position("B", 2.0),
            create_test_position("C", 3.0),
        ];

        assert!(consider_replacement(&create_test_candidate("NEW"), &positions).is_none());
    }

    #[test]
    fn test_break_even_is_not_a_loss() {
        let positions = vec![create_test_position("A", 0.0)];
        assert!(consider_replacement(&create_test_candidate("NEW"), &positions).is_none());
    }

    #[test]
    fn test_no_positions() {
        assert!(consider_replacement(&create_test_candidate("NEW"), &[]).is_none());
    }

    #[test]
    fn test_already_held_candidate() {
        let positions = vec![
            create_test_position("NEW", -3.0),
            create_test_position("A", -8.0),
        ];

        assert!(consider_replacement(&create_test_candidate("NEW"), &positions).is_none());
    }
}
