//! Decision framework: four ordered gates, trade parameters, confidence and sizing.

pub mod confidence;
pub mod framework;
pub mod gates;
pub mod params;

pub use confidence::{confidence, position_size, Confidence, Penalty};
pub use framework::{vetting_gates_pass, DecisionFramework};
pub use gates::{fundamental_gate, risk_gate, technical_gate, timing_gate, RiskAssessment};
pub use params::trade_parameters;
