use crate::TradeError;

/// Units to trade so that a stop-out loses `risk_amount` in account currency.
///
/// `units = risk_amount / (stop_distance * unit_risk_factor)`. Anything that
/// does not come out as a finite positive number is rejected.
pub fn position_size(
    risk_amount: f64,
    stop_distance: f64,
    unit_risk_factor: f64,
) -> Result<f64, TradeError> {
    let units = risk_amount / (stop_distance * unit_risk_factor);
    if units.is_finite() && units > 0.0 && stop_distance > 0.0 {
        Ok(units)
    } else {
        Err(TradeError::InvalidSize {
            units,
            risk_amount,
            stop_distance,
        })
    }
}
