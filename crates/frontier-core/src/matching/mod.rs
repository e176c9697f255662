pub mod risk_tolerance;
