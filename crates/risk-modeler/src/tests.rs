#[cfg(test)]
mod risk_modeler_tests {
    use crate::*;
    use approx::assert_relative_eq;

    fn calm_returns() -> Vec<f64> {
        (0..100).map(|i| if i % 2 == 0 { 0.001 } else { -0.001 }).collect()
    }

    fn calm_input() -> RiskInput {
        RiskInput::new("calm_book", calm_returns(), 5.0, 10_000.0)
    }

    fn report_with(cascade_risk: f64, margin_buffer_multiple: f64) -> RiskReport {
        RiskReport {
            strategy: "ladder".to_string(),
            var_95: -0.01,
            var_99: -0.02,
            evt_var_99: -0.02,
            cvar_99: -0.025,
            cascade_risk,
            margin_buffer_ok: true,
            margin_buffer_multiple,
            max_recommended_leverage: 10.0,
            max_position_usd: 1_000_000.0,
            correlation_regime: CorrelationRegime::Normal,
            risk_flags: vec![],
            recommendations: vec![],
        }
    }

    // ===== Test 1: Calm book passes every check =====

    #[test]
    fn test_calm_book_within_bounds() {
        let report = assess_risk(&calm_input());

        assert_eq!(report.var_95, -0.001);
        assert_eq!(report.evt_var_99, -0.001);
        assert_relative_eq!(report.cascade_risk, 0.08, epsilon = 1e-12);
        assert!(report.margin_buffer_ok);
        assert_relative_eq!(report.margin_buffer_multiple, 50.0, epsilon = 1e-9);
        assert_eq!(report.max_recommended_leverage, MAX_LEVERAGE_CAP);
        assert_relative_eq!(report.max_position_usd, 2_000_000.0, epsilon = 1e-6);
        assert!(report.risk_flags.is_empty());
        assert_eq!(
            report.recommendations,
            vec!["Risk parameters within acceptable bounds".to_string()]
        );
        assert!(check_emergency(&report).is_none());
    }

    // ===== Test 2: Fat left tail halts entries =====

    #[test]
    fn test_fat_tail_halts_entries() {
        let mut returns = vec![0.01; 14];
        returns.insert(0, -0.25);
        let input = RiskInput::new("tail_book", returns, 5.0, 10_000.0);
        let report = assess_risk(&input);

        assert!(report.evt_var_99.abs() > EVT_VAR_EMERGENCY);
        assert!(report
            .recommendations
            .contains(&"Reduce position size or leverage immediately".to_string()));

        let action = check_emergency(&report).expect("emergency");
        assert_eq!(action.action, EmergencyActionKind::HaltEntries);
        assert_eq!(action.severity, Severity::Emergency);
        assert_eq!(
            action.summary(),
            "HALT_ENTRIES: No new positions. Tighten existing stops."
        );
    }

    // ===== Test 3: Correlation stress outranks everything =====

    #[test]
    fn test_correlation_stress_flattens() {
        let mut input = calm_input();
        input.returns.insert(0, -0.5);
        input.correlation_matrix = Some(vec![vec![1.0, 0.98], vec![0.98, 1.0]]);
        let report = assess_risk(&input);
        assert_eq!(report.correlation_regime, CorrelationRegime::Stress);

        let action = check_emergency(&report).expect("emergency");
        assert_eq!(action.action, EmergencyActionKind::FlattenAll);
        assert_eq!(action.summary(), "FLATTEN_ALL: Close all positions immediately");
    }

    // ===== Test 4: Escalation ladder order =====

    #[test]
    fn test_emergency_ladder_order() {
        let both = check_emergency(&report_with(0.75, 1.5)).expect("action");
        assert_eq!(both.action, EmergencyActionKind::Reduce50Pct);
        assert_eq!(both.severity, Severity::Critical);

        let buffer = check_emergency(&report_with(0.55, 1.5)).expect("action");
        assert_eq!(buffer.action, EmergencyActionKind::ReduceLeverage);

        let tighten = check_emergency(&report_with(0.55, 10.0)).expect("action");
        assert_eq!(tighten.action, EmergencyActionKind::TightenStops);
        assert_eq!(tighten.severity, Severity::Warning);

        assert!(check_emergency(&report_with(0.5, 2.0)).is_none());
    }

    // ===== Test 5: Over-levered book =====

    #[test]
    fn test_leverage_above_recommendation() {
        let input = RiskInput::new("hot_book", calm_returns(), 25.0, 10_000.0);
        let report = assess_risk(&input);

        assert!(report.cascade_risk > CASCADE_SAFE);
        assert_eq!(report.max_recommended_leverage, MAX_LEVERAGE_CAP);
        assert!(report
            .risk_flags
            .contains(&"Current leverage 25.0x exceeds recommended 20.0x".to_string()));
        assert!(report
            .recommendations
            .contains(&"Reduce leverage to 20.0x or below".to_string()));
        assert!(report
            .recommendations
            .contains(&"Tighten stop losses and reduce new entries".to_string()));
    }

    // ===== Test 6: Margin buffer depends on asset class =====

    #[test]
    fn test_margin_buffer_by_asset_class() {
        let mut input = RiskInput::new("low_lev", calm_returns(), 2.0, 10_000.0);
        let crypto = assess_risk(&input);
        assert!(!crypto.margin_buffer_ok);
        assert!(crypto
            .risk_flags
            .contains(&"Margin buffer below 2.5x crypto minimum".to_string()));

        input.asset_class = AssetClass::Futures;
        let futures = assess_risk(&input);
        assert!(futures.margin_buffer_ok);
    }

    // ===== Test 7: Extreme funding and oversized position =====

    #[test]
    fn test_funding_and_position_flags() {
        let mut input = RiskInput::new("crowded", calm_returns(), 5.0, 5_000_000.0);
        input.funding_rate_8h = 0.001;
        let report = assess_risk(&input);

        assert!(report
            .recommendations
            .contains(&"Consider mean-reversion or contra-funding trade".to_string()));
        let position_rec = format!("Reduce position to ${} or below", "2,000,000");
        assert!(
            report.recommendations.contains(&position_rec),
            "{:?}",
            report.recommendations
        );
    }

    // ===== Test 8: Flat book serializes infinite buffer =====

    #[test]
    fn test_flat_book_json() {
        let input = RiskInput::new("flat", vec![], 0.0, 0.0);
        let report = assess_risk(&input);
        assert_eq!(report.var_95, 0.0);
        assert_eq!(report.evt_var_99, 0.0);
        assert_eq!(report.cvar_99, 0.0);
        assert!(report.margin_buffer_multiple.is_infinite());

        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["margin_buffer_multiple"], "inf");
        assert_eq!(json["correlation_regime"], "normal");
    }

    // ===== Test 9: Input deserializes with defaults =====

    #[test]
    fn test_input_defaults_from_json() {
        let input: RiskInput = serde_json::from_str(
            r#"{"strategy":"s","returns":[0.01,-0.02],"leverage":3.0,"position_size_usd":1000.0}"#,
        )
        .expect("parse");
        assert_eq!(input.account_equity, 100_000.0);
        assert_eq!(input.asset_class, AssetClass::Crypto);
        assert!(input.correlation_matrix.is_none());
    }

    // ===== Test 10: EVT estimate reports its method =====

    #[test]
    fn test_evt_estimate_serializes_method() {
        let est = evt_var_estimate(&[0.01, -0.02], 0.99);
        let json = serde_json::to_value(est).expect("serialize");
        assert_eq!(json["method"], "historical");
        assert_eq!(json["reason"], "insufficient_data");
    }
}
