//! Churn scoring, risk aggregation, escalation and recommendations.
//!
//! All pure functions over the conversation state. The score policy is a
//! placeholder heuristic, not a trained model; swap `score_churn` out for
//! real churn prediction.

use crate::pipeline::types::{ChurnIndicator, ChurnLabel, ConversationState, CustomerProfile};

/// Score above which the numeric signal alone marks a customer high risk.
pub const HIGH_RISK_SCORE: f64 = 0.7;

/// Negative classifications that trigger escalation on their own.
pub const ESCALATION_STREAK: u32 = 3;

/// Products suggested on the non-escalation branch.
pub const RECOMMENDED_PRODUCTS: [&str; 3] = ["iPhone 16 Pro", "Galaxy S25+", "Google Pixel 9 Pro"];

/// Churn score from tenure (months) and monthly spend. First rule wins.
pub fn score_churn(profile: &CustomerProfile) -> f64 {
    let tenure = profile.number("tenure");
    let monthly = profile.number("monthly_charges");

    if tenure < 3.0 && monthly > 100.0 {
        0.9
    } else if tenure < 6.0 {
        0.7
    } else {
        0.3
    }
}

/// Score the state's customer profile.
pub fn apply_churn_score(state: &mut ConversationState) {
    state.churn_score = Some(score_churn(&state.meta.structured));
}

/// Combine the classifier signal and the numeric score into a label.
pub fn churn_label_for(indicator: Option<ChurnIndicator>, score: Option<f64>) -> ChurnLabel {
    if indicator == Some(ChurnIndicator::Likely) || score.unwrap_or(0.0) > HIGH_RISK_SCORE {
        ChurnLabel::HighRisk
    } else {
        ChurnLabel::LowMedium
    }
}

/// Derive `churn_label` from the state's indicator and score.
pub fn aggregate(state: &mut ConversationState) {
    state.churn_label = Some(churn_label_for(state.churn_indicator, state.churn_score));
}

/// The escalation criterion. Used by both the router's branch and the
/// escalation decider, so the two can never disagree.
pub fn should_escalate(state: &ConversationState) -> bool {
    state.negative_streak >= ESCALATION_STREAK || state.churn_label == Some(ChurnLabel::HighRisk)
}

/// Set the escalation flag from [`should_escalate`].
pub fn decide_escalation(state: &mut ConversationState) {
    state.escalate = should_escalate(state);
}

/// Attach the static product list.
pub fn recommend(state: &mut ConversationState) {
    state.product_recs = RECOMMENDED_PRODUCTS.iter().map(|p| p.to_string()).collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(tenure: f64, monthly: f64) -> CustomerProfile {
        CustomerProfile::new()
            .with("tenure", tenure)
            .with("monthly_charges", monthly)
    }

    #[test]
    fn score_boundaries() {
        assert_eq!(score_churn(&profile(2.0, 150.0)), 0.9);
        assert_eq!(score_churn(&profile(5.0, 50.0)), 0.7);
        assert_eq!(score_churn(&profile(10.0, 50.0)), 0.3);
        // tenure is not < 3, so the second rule applies
        assert_eq!(score_churn(&profile(3.0, 150.0)), 0.7);
        // monthly must be strictly above 100
        assert_eq!(score_churn(&profile(1.0, 100.0)), 0.7);
    }

    #[test]
    fn missing_profile_scores_as_new_customer() {
        // tenure 0, monthly 0 → second rule
        assert_eq!(score_churn(&CustomerProfile::new()), 0.7);
    }

    #[test]
    fn non_numeric_values_read_as_zero() {
        let p = CustomerProfile::new()
            .with("tenure", "forever")
            .with("monthly_charges", "lots");
        assert_eq!(score_churn(&p), 0.7);
    }

    #[test]
    fn aggregation_table() {
        assert_eq!(
            churn_label_for(Some(ChurnIndicator::Likely), Some(0.1)),
            ChurnLabel::HighRisk
        );
        assert_eq!(
            churn_label_for(Some(ChurnIndicator::Unlikely), Some(0.75)),
            ChurnLabel::HighRisk
        );
        assert_eq!(
            churn_label_for(Some(ChurnIndicator::Unlikely), Some(0.5)),
            ChurnLabel::LowMedium
        );
        // exactly 0.7 is not above the threshold
        assert_eq!(churn_label_for(None, Some(0.7)), ChurnLabel::LowMedium);
        assert_eq!(churn_label_for(None, None), ChurnLabel::LowMedium);
    }

    #[test]
    fn aggregate_writes_label() {
        let mut state = ConversationState::new("x");
        state.churn_score = Some(0.9);
        aggregate(&mut state);
        assert_eq!(state.churn_label(), Some(ChurnLabel::HighRisk));
    }

    #[test]
    fn escalation_on_streak_or_label() {
        let mut state = ConversationState::new("x");
        state.churn_label = Some(ChurnLabel::LowMedium);
        state.negative_streak = 2;
        assert!(!should_escalate(&state));

        state.negative_streak = 3;
        assert!(should_escalate(&state));

        state.negative_streak = 0;
        state.churn_label = Some(ChurnLabel::HighRisk);
        assert!(should_escalate(&state));
    }

    #[test]
    fn escalation_decider_is_idempotent() {
        let mut state = ConversationState::new("x");
        state.negative_streak = 3;
        decide_escalation(&mut state);
        let first = state.escalate;
        decide_escalation(&mut state);
        assert_eq!(state.escalate, first);
        assert_eq!(state.negative_streak, 3);
    }

    #[test]
    fn recommendations_are_fixed() {
        let mut state = ConversationState::new("x");
        recommend(&mut state);
        recommend(&mut state);
        assert_eq!(
            state.product_recs,
            vec!["iPhone 16 Pro", "Galaxy S25+", "Google Pixel 9 Pro"]
        );
    }
}
