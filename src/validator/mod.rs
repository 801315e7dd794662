//! Validator & Economics (§4.2).
//!
//! Fee decomposition, dynamic borrow sizing, the abnormal-ROI filter, and
//! the circuit breaker. The circuit breaker deliberately does not reach for
//! the teacher's declared `circuit_breaker`/`rate_limiter` crates.io deps
//! (near-empty placeholder crates — see `DESIGN.md`); the spec fully
//! specifies the policy, so it's implemented directly.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::{BorrowBounds, CircuitBreakerConfig, EconomicsConfig};
use crate::types::PricingContext;

#[derive(Debug, Clone, Copy)]
pub struct FeeBreakdown {
    pub gross_profit: i128,
    pub fixed_cost: u64,
    pub net_after_fixed: i128,
    pub tip: u64,
    pub slippage_buffer: u64,
    pub net_profit: i128,
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub valid: bool,
    pub fee: u64,
    pub net_profit: i128,
    pub breakdown: FeeBreakdown,
    pub reason: Option<String>,
}

/// Fee decomposition in the exact order specified by §4.2.
///
/// `repriced_output` is the output amount re-priced at execution size;
/// `borrow_principal` is the flash-loan amount. Gross profit is
/// `repriced_output - borrow_principal` exactly, with no fee term — the
/// provider's `flash_loan_fee` on the borrowed amount (0 for zero-fee
/// providers) is reported only via `ValidationResult.fee`, never subtracted
/// here. `ctx` carries the fee/tip weights and the already-estimated
/// priority fee together as one unit rather than two separately-threaded
/// arguments.
pub fn decompose_fees(
    repriced_output: u64,
    borrow_principal: u64,
    flash_loan_fee: u64,
    ctx: &PricingContext,
) -> ValidationResult {
    let gross_profit = repriced_output as i128 - borrow_principal as i128;
    let fixed_cost = ctx.base_fee + ctx.priority_fee;
    let net_after_fixed = gross_profit - fixed_cost as i128;

    let tip = if net_after_fixed > 0 {
        (net_after_fixed * ctx.tip_percent as i128 / 100) as u64
    } else {
        0
    };

    let slippage_buffer = {
        let a = (borrow_principal as f64 * 0.0003) as u64;
        let b = if gross_profit > 0 {
            (gross_profit as f64 * 0.10) as u64
        } else {
            0
        };
        let c = (borrow_principal as f64 * 0.0002) as u64;
        a.min(b).min(c)
    };

    let net_profit = net_after_fixed - tip as i128 - slippage_buffer as i128;

    let valid = !ctx.enable_net_profit_check || net_profit > 0;
    let reason = if !valid {
        Some("net profit not positive".to_string())
    } else {
        None
    };

    ValidationResult {
        valid,
        fee: flash_loan_fee,
        net_profit,
        breakdown: FeeBreakdown {
            gross_profit,
            fixed_cost,
            net_after_fixed,
            tip,
            slippage_buffer,
            net_profit,
        },
        reason,
    }
}

/// Rejects opportunities whose query-time ROI exceeds the configured
/// threshold (default 10%, §4.2) as a likely data anomaly.
pub fn is_abnormal_roi(profit: i128, input_amount: u64, threshold_bps: u16) -> bool {
    if input_amount == 0 {
        return true;
    }
    let roi_bps = (profit.max(0) as u128 * 10_000) / input_amount as u128;
    roi_bps > threshold_bps as u128
}

/// Dynamic borrow-sizing policy (§4.2): pick a multiplier of the query-time
/// amount based on the observed profit rate, apply the safety factor, and
/// clamp to `[min_borrow, max_borrow]`.
pub fn size_borrow(query_amount: u64, profit_at_query: i128, bounds: &BorrowBounds) -> u64 {
    if query_amount == 0 {
        return bounds.min_borrow_lamports;
    }
    let roi = profit_at_query.max(0) as f64 / query_amount as f64;

    let multiplier = if roi > 0.01 {
        bounds.max_multiplier
    } else if roi > 0.005 {
        (bounds.min_multiplier + bounds.max_multiplier) / 2.0
    } else if roi > 0.001 {
        bounds.min_multiplier * 1.5
    } else {
        bounds.min_multiplier
    };

    let sized = query_amount as f64 * multiplier * bounds.safety_factor;
    (sized as u64).clamp(bounds.min_borrow_lamports, bounds.max_borrow_lamports)
}

/// Outcome of one execution attempt, fed to the circuit breaker.
#[derive(Debug, Clone, Copy)]
pub struct AttemptOutcome {
    pub succeeded: bool,
    pub loss_lamports: u64,
}

struct Window {
    consecutive_failures: u32,
    recent_outcomes: VecDeque<(Instant, AttemptOutcome)>,
    tripped_until: Option<Instant>,
}

/// Per-window `{consecutive_failures, hourly_loss_lamports, success_rate}`
/// circuit breaker (§4.2, invariant I9).
pub struct CircuitBreaker {
    cfg: CircuitBreakerConfig,
    state: Mutex<Window>,
}

impl CircuitBreaker {
    pub fn new(cfg: CircuitBreakerConfig) -> Self {
        Self {
            cfg,
            state: Mutex::new(Window {
                consecutive_failures: 0,
                recent_outcomes: VecDeque::new(),
                tripped_until: None,
            }),
        }
    }

    pub fn can_attempt(&self) -> bool {
        let state = self.state.lock();
        match state.tripped_until {
            Some(until) => Instant::now() >= until,
            None => true,
        }
    }

    pub fn record(&self, outcome: AttemptOutcome) {
        let mut state = self.state.lock();
        let now = Instant::now();

        if outcome.succeeded {
            state.consecutive_failures = 0;
        } else {
            state.consecutive_failures += 1;
        }
        state.recent_outcomes.push_back((now, outcome));

        let hour_ago = now - Duration::from_secs(3600);
        while matches!(state.recent_outcomes.front(), Some((t, _)) if *t < hour_ago) {
            state.recent_outcomes.pop_front();
        }

        let hourly_loss: u64 = state
            .recent_outcomes
            .iter()
            .map(|(_, o)| if o.succeeded { 0 } else { o.loss_lamports })
            .sum();
        let total = state.recent_outcomes.len().max(1) as f64;
        let successes = state.recent_outcomes.iter().filter(|(_, o)| o.succeeded).count() as f64;
        let success_rate = successes / total;

        let should_trip = state.consecutive_failures >= self.cfg.max_consecutive_failures
            || hourly_loss >= self.cfg.max_hourly_loss_lamports
            || (state.recent_outcomes.len() >= 5 && success_rate < self.cfg.min_success_rate);

        if should_trip {
            state.tripped_until = Some(now + Duration::from_secs(self.cfg.cooldown_seconds));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(enable_check: bool) -> EconomicsConfig {
        EconomicsConfig {
            base_fee_lamports: 10_000,
            tip_percent: 30,
            slippage_buffer_bps: 15,
            enable_net_profit_check: enable_check,
            abnormal_roi_threshold_bps: 1_000,
        }
    }

    fn ctx(enable_check: bool) -> PricingContext {
        PricingContext::from_config(&cfg(enable_check), 50_000)
    }

    #[test]
    fn decomposition_sums_back_to_gross() {
        let result = decompose_fees(51_000_000_000, 50_000_000_000, 0, &ctx(true));
        let b = result.breakdown;
        assert_eq!(
            b.gross_profit,
            b.net_after_fixed + b.fixed_cost as i128
        );
        assert_eq!(
            b.net_profit,
            b.net_after_fixed - b.tip as i128 - b.slippage_buffer as i128
        );
    }

    #[test]
    fn valid_iff_positive_net_profit_when_check_enabled() {
        let result = decompose_fees(50_000_100_000, 50_000_000_000, 0, &ctx(true));
        assert_eq!(result.valid, result.net_profit > 0);
    }

    #[test]
    fn net_profit_check_disabled_always_valid() {
        let result = decompose_fees(1, 50_000_000_000, 0, &ctx(false));
        assert!(result.valid);
    }

    #[test]
    fn abnormal_roi_is_rejected() {
        assert!(is_abnormal_roi(2_000, 1_000, 1_000));
        assert!(!is_abnormal_roi(5, 1_000, 1_000));
    }

    #[test]
    fn circuit_breaker_trips_after_consecutive_failures() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            max_consecutive_failures: 3,
            max_hourly_loss_lamports: u64::MAX,
            min_success_rate: 0.0,
            cooldown_seconds: 60,
        });
        assert!(cb.can_attempt());
        for _ in 0..3 {
            cb.record(AttemptOutcome {
                succeeded: false,
                loss_lamports: 100,
            });
        }
        assert!(!cb.can_attempt());
    }

    #[test]
    fn circuit_breaker_resets_on_success() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            max_consecutive_failures: 2,
            max_hourly_loss_lamports: u64::MAX,
            min_success_rate: 0.0,
            cooldown_seconds: 60,
        });
        cb.record(AttemptOutcome {
            succeeded: false,
            loss_lamports: 0,
        });
        cb.record(AttemptOutcome {
            succeeded: true,
            loss_lamports: 0,
        });
        cb.record(AttemptOutcome {
            succeeded: false,
            loss_lamports: 0,
        });
        assert!(cb.can_attempt());
    }
}
