//! Strategy risk assessment and the emergency escalation ladder.

use sigma_core::stats::{percentile, population_std};
use tracing::{error, info, warn};

use crate::cascade::{estimate_cascade_risk, CascadeInputs};
use crate::models::*;
use crate::tail::{cvar, evt_var};

const DEFAULT_DAILY_VOL: f64 = 0.03;
const MIN_VOL_FLOOR: f64 = 0.01;
/// Fraction of equity at risk per unit of tail loss when sizing positions.
const RISK_BUDGET: f64 = 0.02;
const MIN_TAIL_LOSS: f64 = 0.001;

/// Mean pairwise correlation across the upper triangle.
pub fn correlation_regime(matrix: &[Vec<f64>]) -> CorrelationRegime {
    let n = matrix.len();
    if n < 2 {
        return CorrelationRegime::Normal;
    }

    let mut sum = 0.0;
    let mut count = 0usize;
    for (i, row) in matrix.iter().enumerate() {
        for value in row.iter().skip(i + 1).take(n - i - 1) {
            sum += value;
            count += 1;
        }
    }
    if count == 0 {
        return CorrelationRegime::Normal;
    }

    let avg = sum / count as f64;
    if avg > CORRELATION_STRESS {
        CorrelationRegime::Stress
    } else if avg > CORRELATION_ELEVATED {
        CorrelationRegime::Elevated
    } else {
        CorrelationRegime::Normal
    }
}

/// Initial margin `1/leverage` times the required multiple must fit in the account.
pub fn margin_buffer_ok(leverage: f64, required_multiple: f64) -> bool {
    if leverage <= 0.0 {
        return true;
    }
    (1.0 / leverage) * required_multiple <= 1.0
}

/// Survive a 3-sigma daily move, haircut by cascade risk, capped at 20x.
pub fn max_recommended_leverage(daily_vol: f64, cascade_risk: f64) -> f64 {
    let base = 1.0 / (3.0 * daily_vol.max(MIN_VOL_FLOOR));
    (base * (1.0 - 0.5 * cascade_risk)).min(MAX_LEVERAGE_CAP)
}

pub fn assess_risk(input: &RiskInput) -> RiskReport {
    let returns = &input.returns;
    let (var_95, var_99) = if returns.is_empty() {
        (0.0, 0.0)
    } else {
        (percentile(returns, 5.0), percentile(returns, 1.0))
    };
    let evt_var_99 = evt_var(returns, 0.99);
    let cvar_99 = cvar(returns, 0.99);

    let daily_vol = if returns.len() > 1 {
        population_std(returns)
    } else {
        DEFAULT_DAILY_VOL
    };

    let cascade_risk = estimate_cascade_risk(&CascadeInputs {
        leverage: input.leverage,
        funding_rate_8h: input.funding_rate_8h,
        daily_volatility: daily_vol,
        oi_usd: input.oi_usd,
    });

    let required_buffer = input.asset_class.margin_buffer();
    let buffer_ok = margin_buffer_ok(input.leverage, required_buffer);
    let margin_required = if input.leverage > 0.0 {
        input.position_size_usd / input.leverage
    } else {
        0.0
    };
    let margin_buffer_multiple = if margin_required > 0.0 {
        input.account_equity / margin_required
    } else {
        f64::INFINITY
    };

    let max_leverage = max_recommended_leverage(daily_vol, cascade_risk);
    let tail_loss = evt_var_99.abs().max(MIN_TAIL_LOSS);
    let max_position_usd = (input.account_equity * max_leverage * RISK_BUDGET / tail_loss)
        .min(input.account_equity * max_leverage);

    let correlation_regime = input
        .correlation_matrix
        .as_deref()
        .map(correlation_regime)
        .unwrap_or_default();

    let mut flags = Vec::new();
    let mut recommendations = Vec::new();

    if evt_var_99.abs() > EVT_VAR_CAUTION {
        flags.push(format!(
            "EVT VaR(99%) = {} exceeds {} caution threshold",
            pct(evt_var_99),
            pct(EVT_VAR_CAUTION)
        ));
        recommendations.push("Reduce position size or leverage immediately".to_string());
    } else if evt_var_99.abs() > EVT_VAR_SAFE {
        flags.push(format!(
            "EVT VaR(99%) = {} exceeds {} safe threshold",
            pct(evt_var_99),
            pct(EVT_VAR_SAFE)
        ));
        recommendations.push("Consider reducing leverage or adding hedges".to_string());
    }

    if cascade_risk > CASCADE_CAUTION {
        flags.push(format!("High liquidation cascade risk: {cascade_risk:.2}"));
        recommendations.push("Reduce exposure by 50% due to liquidation cascade risk".to_string());
    } else if cascade_risk > CASCADE_SAFE {
        flags.push(format!("Moderate liquidation cascade risk: {cascade_risk:.2}"));
        recommendations.push("Tighten stop losses and reduce new entries".to_string());
    }

    if !buffer_ok {
        flags.push(format!(
            "Margin buffer below {required_buffer:.1}x {} minimum",
            input.asset_class.as_str()
        ));
        recommendations.push(format!(
            "Reduce leverage from {:.1}x to below {:.1}x to meet {required_buffer:.1}x margin buffer",
            input.leverage, max_leverage
        ));
    }

    if input.leverage > max_leverage {
        flags.push(format!(
            "Current leverage {:.1}x exceeds recommended {max_leverage:.1}x",
            input.leverage
        ));
        recommendations.push(format!("Reduce leverage to {max_leverage:.1}x or below"));
    }

    if input.position_size_usd > max_position_usd {
        flags.push(format!(
            "Position ${} exceeds max ${}",
            usd(input.position_size_usd),
            usd(max_position_usd)
        ));
        recommendations.push(format!("Reduce position to ${} or below", usd(max_position_usd)));
    }

    if input.funding_rate_8h.abs() > EXTREME_FUNDING_RATE {
        flags.push(format!(
            "Extreme funding rate: {:.4}% per 8h",
            input.funding_rate_8h * 100.0
        ));
        recommendations.push("Consider mean-reversion or contra-funding trade".to_string());
    }

    if recommendations.is_empty() {
        recommendations.push("Risk parameters within acceptable bounds".to_string());
    }

    let report = RiskReport {
        strategy: input.strategy.clone(),
        var_95,
        var_99,
        evt_var_99,
        cvar_99,
        cascade_risk,
        margin_buffer_ok: buffer_ok,
        margin_buffer_multiple,
        max_recommended_leverage: max_leverage,
        max_position_usd,
        correlation_regime,
        risk_flags: flags,
        recommendations,
    };

    info!(
        strategy = %report.strategy,
        evt_var_99 = report.evt_var_99,
        cascade_risk = report.cascade_risk,
        flags = report.risk_flags.len(),
        "Risk assessment complete"
    );
    report
}

/// First matching rung of the escalation ladder, most severe first.
pub fn check_emergency(report: &RiskReport) -> Option<EmergencyAction> {
    let (action, severity, trigger) = if report.correlation_regime == CorrelationRegime::Stress {
        (
            EmergencyActionKind::FlattenAll,
            Severity::Emergency,
            "Correlation regime: STRESS".to_string(),
        )
    } else if report.evt_var_99.abs() > EVT_VAR_EMERGENCY {
        (
            EmergencyActionKind::HaltEntries,
            Severity::Emergency,
            format!("EVT VaR(99%) = {}", pct(report.evt_var_99)),
        )
    } else if report.cascade_risk > CASCADE_REDUCE {
        (
            EmergencyActionKind::Reduce50Pct,
            Severity::Critical,
            format!("Cascade risk = {:.2}", report.cascade_risk),
        )
    } else if report.margin_buffer_multiple < MARGIN_BUFFER_CRITICAL {
        (
            EmergencyActionKind::ReduceLeverage,
            Severity::Critical,
            format!("Margin buffer = {:.1}x", report.margin_buffer_multiple),
        )
    } else if report.cascade_risk > CASCADE_TIGHTEN {
        (
            EmergencyActionKind::TightenStops,
            Severity::Warning,
            format!("Cascade risk = {:.2}", report.cascade_risk),
        )
    } else {
        return None;
    };

    let emergency = EmergencyAction {
        strategy: report.strategy.clone(),
        trigger,
        action,
        severity,
    };

    match severity {
        Severity::Emergency => error!(
            strategy = %emergency.strategy,
            trigger = %emergency.trigger,
            action = emergency.action.as_str(),
            "Emergency risk action"
        ),
        Severity::Critical => warn!(
            strategy = %emergency.strategy,
            trigger = %emergency.trigger,
            action = emergency.action.as_str(),
            "Critical risk action"
        ),
        Severity::Warning => info!(
            strategy = %emergency.strategy,
            trigger = %emergency.trigger,
            action = emergency.action.as_str(),
            "Risk warning"
        ),
    }
    Some(emergency)
}

fn pct(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}

/// Whole dollars with thousands separators.
fn usd(amount: f64) -> String {
    let rounded = amount.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}
