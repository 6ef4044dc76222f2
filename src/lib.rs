#![no_std]

/// Driver for reading DHT11 or DHT22 sensors over a single open-drain line.
pub mod dhtxx;
/// The open-drain data line shared by the controller and a sensor.
pub mod line;
/// Connector ports that sensors can be attached to.
pub mod ports;
/// Persisted sensor definitions and the set of configured sensors.
///
/// Definitions are stored as plain text, one `name type port` line per sensor.
pub mod registry;
