use core::fmt::{self, Write};
use embedded_hal::digital::{InputPin, OutputPin};
use heapless::{String, Vec};

use crate::dhtxx::{is_valid_name, Error, Sensor, SensorType, MAX_NAME_LEN};
use crate::ports;

/// The maximum number of sensors a registry holds.
pub const MAX_SENSORS: usize = 5;

const FILE_HEADER: &str = "# Sensor definitions\n\
    # name: up to 10 letters, digits or _\n\
    # type: 0 = DHT11, 1 = DHT22\n\
    # port: 2-7, 10, 12-17\n\
    # name type port\n";

#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError<TIoError> {
    /// The registry already holds [`MAX_SENSORS`] sensors.
    Full,
    InvalidName,
    /// The port is not one of [`ports::PORTS`].
    InvalidPort,
    /// Another sensor already uses this port.
    DuplicatePort,
    /// No sensor at the given index.
    UnknownSensor,
    /// Wrapped error from the HAL.
    Pin(TIoError),
}

impl<TIoError> From<Error<TIoError>> for ConfigError<TIoError> {
    fn from(error: Error<TIoError>) -> ConfigError<TIoError> {
        match error {
            Error::Wrapped(error) => ConfigError::Pin(error),
            _ => ConfigError::InvalidName,
        }
    }
}

/// A persisted sensor definition.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorConfig {
    pub name: String<MAX_NAME_LEN>,
    pub sensor_type: SensorType,
    /// Connector number, see [`ports::PORTS`].
    pub port: u8,
}

impl SensorConfig {
    /// Returns `None` if `name` is longer than [`MAX_NAME_LEN`]. Other fields are checked by
    /// [`SensorConfig::check`].
    pub fn new(name: &str, sensor_type: SensorType, port: u8) -> Option<SensorConfig> {
        let mut label = String::new();
        label.push_str(name).ok()?;
        Some(SensorConfig {
            name: label,
            sensor_type,
            port,
        })
    }

    /// Whether this definition can be used to build a sensor.
    pub fn check(&self) -> bool {
        if !is_valid_name(&self.name) {
            #[cfg(feature = "defmt")]
            defmt::debug!("sensor [{}] name check failed", self.name.as_str());
            return false;
        }
        if !ports::is_valid(self.port) {
            #[cfg(feature = "defmt")]
            defmt::debug!(
                "sensor [{}] port check failed: {}",
                self.name.as_str(),
                self.port
            );
            return false;
        }
        true
    }

    /// Parses a `name type port` line.
    fn parse_line(line: &str) -> Option<SensorConfig> {
        let mut fields = line.split_whitespace();
        let name = fields.next()?;
        let sensor_type = SensorType::from_index(fields.next()?.parse().ok()?)?;
        let port = fields.next()?.parse().ok()?;
        SensorConfig::new(name, sensor_type, port)
    }
}

impl fmt::Display for SensorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.name,
            self.sensor_type.index(),
            self.port
        )
    }
}

/// Parses a sensor definitions file.
///
/// Each line holds `name type port`. Blank lines and lines starting with `#` are ignored, as are
/// lines that do not parse or fail [`SensorConfig::check`]. Definitions past [`MAX_SENSORS`] are
/// dropped.
pub fn parse_sensors(input: &str) -> Vec<SensorConfig, MAX_SENSORS> {
    let mut sensors = Vec::new();
    for line in input.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match SensorConfig::parse_line(line) {
            Some(config) if config.check() => {
                if sensors.push(config).is_err() {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("too many sensors, ignoring the rest");
                    break;
                }
            }
            _ => {
                #[cfg(feature = "defmt")]
                defmt::debug!("skipping sensor definition: {}", line);
            }
        }
    }
    sensors
}

/// Writes a sensor definitions file that [`parse_sensors`] can read back.
///
/// Definitions that fail [`SensorConfig::check`] are left out. Returns the number written.
pub fn write_sensors<W: Write>(writer: &mut W, sensors: &[SensorConfig]) -> Result<usize, fmt::Error> {
    writer.write_str(FILE_HEADER)?;
    let mut saved = 0;
    for sensor in sensors.iter().filter(|sensor| sensor.check()) {
        writeln!(writer, "{}", sensor)?;
        saved += 1;
    }
    Ok(saved)
}

/// The configured sensors and the ports they are attached to.
#[derive(Debug)]
pub struct Registry<TPin> {
    entries: Vec<(Sensor<TPin>, u8), MAX_SENSORS>,
}

impl<TPin> Registry<TPin> {
    pub const fn new() -> Registry<TPin> {
        Registry {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Sensor<TPin>> {
        self.entries.get(index).map(|(sensor, _)| sensor)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Sensor<TPin>> {
        self.entries.get_mut(index).map(|(sensor, _)| sensor)
    }

    /// The port of the sensor at `index`.
    pub fn port(&self, index: usize) -> Option<u8> {
        self.entries.get(index).map(|(_, port)| *port)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sensor<TPin>> {
        self.entries.iter().map(|(sensor, _)| sensor)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Sensor<TPin>> {
        self.entries.iter_mut().map(|(sensor, _)| sensor)
    }

    pub fn configs(&self) -> Vec<SensorConfig, MAX_SENSORS> {
        let mut configs = Vec::new();
        for (sensor, port) in self.entries.iter() {
            if let Some(config) = SensorConfig::new(sensor.name(), sensor.sensor_type(), *port) {
                // Same capacity as `entries`.
                let _ = configs.push(config);
            }
        }
        configs
    }

    /// Writes the current sensors as a definitions file. Returns the number written.
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<usize, fmt::Error> {
        write_sensors(writer, &self.configs())
    }
}

impl<TPin> Default for Registry<TPin> {
    fn default() -> Registry<TPin> {
        Registry::new()
    }
}

impl<TPin, TError> Registry<TPin>
where
    TPin: InputPin<Error = TError> + OutputPin<Error = TError>,
{
    /// Adds a sensor for `config`, driven through `pin`.
    ///
    /// `pin` must be the pin behind `config.port`, configured as open-drain with a pull-up.
    pub fn add(&mut self, config: &SensorConfig, pin: TPin) -> Result<(), ConfigError<TError>> {
        if self.entries.is_full() {
            return Err(ConfigError::Full);
        }
        if !is_valid_name(&config.name) {
            return Err(ConfigError::InvalidName);
        }
        if !ports::is_valid(config.port) {
            return Err(ConfigError::InvalidPort);
        }
        if self.entries.iter().any(|(_, port)| *port == config.port) {
            return Err(ConfigError::DuplicatePort);
        }
        let sensor = Sensor::new(&config.name, pin, config.sensor_type)?;
        self.entries
            .push((sensor, config.port))
            .map_err(|_| ConfigError::Full)
    }

    /// Adds every usable definition from a definitions file.
    ///
    /// `pin_fn` supplies the pin for a port number, or `None` if the host cannot provide it, in
    /// which case that sensor is skipped. Definitions that cannot be added are skipped too. Only HAL
    /// errors are returned. Returns the number of sensors added.
    pub fn load<PinFn>(&mut self, input: &str, mut pin_fn: PinFn) -> Result<usize, ConfigError<TError>>
    where
        PinFn: FnMut(u8) -> Option<TPin>,
    {
        let mut loaded = 0;
        for config in parse_sensors(input).iter() {
            if self.entries.is_full() {
                break;
            }
            if self.entries.iter().any(|(_, port)| *port == config.port) {
                #[cfg(feature = "defmt")]
                defmt::warn!("sensor [{}] shares port {}", config.name.as_str(), config.port);
                continue;
            }
            let pin = match pin_fn(config.port) {
                Some(pin) => pin,
                None => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("no pin for port {}", config.port);
                    continue;
                }
            };
            self.add(config, pin)?;
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Removes the sensor at `index` and returns its released pin.
    pub fn remove(&mut self, index: usize) -> Result<TPin, ConfigError<TError>> {
        if index >= self.entries.len() {
            return Err(ConfigError::UnknownSensor);
        }
        let (sensor, _) = self.entries.remove(index);
        Ok(sensor.release()?)
    }

    /// Removes every sensor, returning the released pins in order.
    pub fn clear(&mut self) -> Result<Vec<TPin, MAX_SENSORS>, ConfigError<TError>> {
        let mut pins = Vec::new();
        while !self.entries.is_empty() {
            let pin = self.remove(0)?;
            // Same capacity as `entries`.
            let _ = pins.push(pin);
        }
        Ok(pins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_line_fields() {
        let config = SensorConfig::parse_line("Garage 1 13").unwrap();
        assert_eq!(config.name.as_str(), "Garage");
        assert_eq!(config.sensor_type, SensorType::Dht22);
        assert_eq!(config.port, 13);
    }

    #[test]
    fn parse_line_rejects_malformed() {
        assert_eq!(SensorConfig::parse_line("Garage"), None);
        assert_eq!(SensorConfig::parse_line("Garage 1"), None);
        assert_eq!(SensorConfig::parse_line("Garage x 13"), None);
        assert_eq!(SensorConfig::parse_line("Garage 2 13"), None);
        assert_eq!(SensorConfig::parse_line("Garage 1 -3"), None);
        assert_eq!(SensorConfig::parse_line("Garage_door_1 0 2"), None);
    }

    #[test]
    fn check_rejects_unknown_port() {
        let config = SensorConfig::new("Garage", SensorType::Dht11, 8).unwrap();
        assert!(!config.check());
    }

    #[test]
    fn display_matches_file_format() {
        let config = SensorConfig::new("Attic", SensorType::Dht11, 7).unwrap();
        let mut line: String<32> = String::new();
        write!(line, "{}", config).unwrap();
        assert_eq!(line.as_str(), "Attic 0 7");
    }
}
