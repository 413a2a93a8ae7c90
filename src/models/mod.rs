pub mod ambulance;
pub mod corridor;
pub mod event;
pub mod hazard;
pub mod location;
pub mod position;
pub mod sos_alert;
pub mod traffic_signal;
