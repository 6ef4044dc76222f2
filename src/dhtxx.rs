use core::convert::Infallible;
use core::time::Duration;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use heapless::String;

use crate::line::OpenDrainLine;

#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<TIoError> {
    /// Wrapped error from the HAL.
    Wrapped(TIoError),
    /// Invalid argument was provided.
    InvalidArgument,
    /// The frame's checksum did not match its payload.
    BadData,
    /// The line did not transition within the configured number of polling iterations.
    NoResponse,
}

impl<TIoError> From<TIoError> for Error<TIoError> {
    fn from(error: TIoError) -> Error<TIoError> {
        Error::Wrapped(error)
    }
}

/// Value used for both fields of a [`Reading`] when no valid data is available.
///
/// Lies outside the operating range of both sensors, so it can never be a real measurement.
pub const SENTINEL_VALUE: f32 = -128.0;

/// The maximum length of a sensor's name.
pub const MAX_NAME_LEN: usize = 10;

/// The default minimum interval between two bus transactions with a DHT11.
///
/// The datasheet allows faster polling, but some sensors misbehave below this.
pub const DHT11_POLLING_INTERVAL: Duration = Duration::from_millis(2000);

/// The default minimum interval between two bus transactions with a DHT22.
pub const DHT22_POLLING_INTERVAL: Duration = Duration::from_millis(2000);

/// The default number of polling iterations after which a handshake wait gives up.
///
/// This is tied to the speed of the host. Recalibrate it when moving to a different target.
pub const DEFAULT_TIMEOUT: u32 = 65534;

const RESET_PULSE_MS: u32 = 18;

/// A humidity and temperature measurement.
///
/// Humidity is in percent relative humidity. Temperature is in degrees Fahrenheit for the DHT11
/// and degrees Celsius for the DHT22.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading {
    pub humidity: f32,
    pub temperature: f32,
}

impl Reading {
    /// Signals that no valid data was available for this read.
    pub const SENTINEL: Reading = Reading {
        humidity: SENTINEL_VALUE,
        temperature: SENTINEL_VALUE,
    };

    /// Whether this reading holds real data rather than the sentinel.
    pub fn is_valid(&self) -> bool {
        self.humidity != SENTINEL_VALUE && self.temperature != SENTINEL_VALUE
    }
}

impl Default for Reading {
    fn default() -> Reading {
        Reading::SENTINEL
    }
}

/// The supported sensor variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorType {
    Dht11,
    Dht22,
}

impl SensorType {
    /// The index used to persist this type.
    pub fn index(self) -> u8 {
        match self {
            SensorType::Dht11 => 0,
            SensorType::Dht22 => 1,
        }
    }

    pub fn from_index(index: u8) -> Option<SensorType> {
        match index {
            0 => Some(SensorType::Dht11),
            1 => Some(SensorType::Dht22),
            _ => None,
        }
    }
}

/// The five bytes sent by a sensor: humidity high and low, temperature high and low, checksum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawFrame(pub [u8; 5]);

impl RawFrame {
    /// Whether the sum of the first four bytes, truncated to 8 bits, matches the last byte.
    pub fn checksum_ok(&self) -> bool {
        let sum = self.0[..4]
            .iter()
            .fold(0u8, |sum, byte| sum.wrapping_add(*byte));
        sum == self.0[4]
    }

    /// Converts the frame into physical values, or `None` if the checksum does not match.
    pub fn decode(&self, sensor_type: SensorType) -> Option<Reading> {
        if !self.checksum_ok() {
            return None;
        }
        Some(match sensor_type {
            SensorType::Dht11 => decode_dht11(&self.0),
            SensorType::Dht22 => decode_dht22(&self.0),
        })
    }
}

fn decode_dht11(bytes: &[u8; 5]) -> Reading {
    let mut temperature = bytes[2] as f32 * 1.8 + 32.0;
    // Some DHT11 clones report tenths of a degree in byte 3, as sign + magnitude.
    if bytes[3] != 0 {
        let (negative, tenths) = split_sign(bytes[3]);
        let fraction = tenths as f32 * 0.1;
        if negative {
            temperature -= fraction;
        } else {
            temperature += fraction;
        }
    }
    Reading {
        humidity: bytes[0] as f32,
        temperature,
    }
}

fn decode_dht22(bytes: &[u8; 5]) -> Reading {
    let humidity = u16::from_be_bytes([bytes[0], bytes[1]]) as f32 * 0.1;
    let (negative, high) = split_sign(bytes[2]);
    let magnitude = u16::from_be_bytes([high, bytes[3]]) as f32;
    let temperature = if negative {
        magnitude * -0.1
    } else {
        magnitude * 0.1
    };
    Reading {
        humidity,
        temperature,
    }
}

/// Splits a sign-magnitude byte into its sign bit and the remaining 7 bits.
#[inline]
fn split_sign(byte: u8) -> (bool, u8) {
    (byte & 0x80 != 0, byte & 0x7F)
}

/// Whether `name` can be used as a sensor name.
///
/// Names are 1 to [`MAX_NAME_LEN`] characters long, using only ASCII letters, digits and `_`.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Options to modify the behavior of the DHT driver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Options {
    /// Limits how often each sensor's bus is used. Reads within the polling interval return the
    /// sensor's cached reading instead.
    pub polling_control: bool,
    /// The minimum interval between bus transactions with a DHT11. Must be non-zero.
    pub dht11_polling_interval: Duration,
    /// The minimum interval between bus transactions with a DHT22. Must be non-zero.
    pub dht22_polling_interval: Duration,
    /// The number of polling iterations each handshake wait may spend before the sensor is
    /// considered absent.
    pub timeout: u32,
}

pub const DEFAULT_OPTIONS: Options = Options {
    polling_control: true,
    dht11_polling_interval: DHT11_POLLING_INTERVAL,
    dht22_polling_interval: DHT22_POLLING_INTERVAL,
    timeout: DEFAULT_TIMEOUT,
};

impl Options {
    pub fn polling_interval(&self, sensor_type: SensorType) -> Duration {
        match sensor_type {
            SensorType::Dht11 => self.dht11_polling_interval,
            SensorType::Dht22 => self.dht22_polling_interval,
        }
    }

    fn is_valid(&self) -> bool {
        // Intervals are compared against a difference of `u32` millisecond ticks.
        let valid_interval =
            |interval: Duration| interval.as_millis() > 0 && interval.as_millis() < u32::MAX as u128;
        self.timeout > 0
            && self.timeout < u32::MAX
            && valid_interval(self.dht11_polling_interval)
            && valid_interval(self.dht22_polling_interval)
    }
}

impl Default for Options {
    fn default() -> Options {
        DEFAULT_OPTIONS
    }
}

/// The last reading of a sensor and when its bus was last used.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollCache {
    last_polling_time: u32,
    last_reading: Reading,
}

impl PollCache {
    const fn new() -> PollCache {
        PollCache {
            last_polling_time: 0,
            last_reading: Reading::SENTINEL,
        }
    }

    /// The tick at which the bus was last used, plus one. Zero if the sensor was never polled.
    pub fn last_polling_time(&self) -> u32 {
        self.last_polling_time
    }

    pub fn last_reading(&self) -> Reading {
        self.last_reading
    }

    fn fresh(&self, now: u32, interval_ms: u32) -> Option<Reading> {
        if self.last_polling_time == 0 {
            return None;
        }
        // Measured from the tick of the poll itself, without the +1 stored by `mark_polled`.
        let elapsed = now.wrapping_sub(self.last_polling_time.wrapping_sub(1));
        if elapsed <= interval_ms {
            return Some(self.last_reading);
        }
        None
    }

    fn mark_polled(&mut self, now: u32) {
        self.last_polling_time = match now.wrapping_add(1) {
            0 => 1,
            tick => tick,
        };
    }

    fn store(&mut self, reading: Reading) {
        self.last_reading = reading;
    }
}

/// A single configured sensor: its name, its line and its type.
///
/// The polling cache is only touched by [`Dht::read`]. Reads of one sensor must not overlap.
#[derive(Debug)]
pub struct Sensor<TPin> {
    name: String<MAX_NAME_LEN>,
    line: OpenDrainLine<TPin>,
    sensor_type: SensorType,
    cache: PollCache,
}

impl<TPin, TError> Sensor<TPin>
where
    TPin: InputPin<Error = TError> + OutputPin<Error = TError>,
{
    /// Constructs a sensor that communicates over the given pin.
    ///
    /// The pin must be configured as open-drain with a pull-up. The line is released immediately.
    /// Returns [`Error::InvalidArgument`] if `name` is not valid (see [`is_valid_name`]).
    pub fn new(
        name: &str,
        pin: TPin,
        sensor_type: SensorType,
    ) -> Result<Sensor<TPin>, Error<TError>> {
        if !is_valid_name(name) {
            return Err(Error::InvalidArgument);
        }
        let mut label = String::new();
        label.push_str(name).map_err(|_| Error::InvalidArgument)?;
        Ok(Sensor {
            name: label,
            line: OpenDrainLine::new(pin)?,
            sensor_type,
            cache: PollCache::new(),
        })
    }

    /// Releases the line and returns the pin.
    pub fn release(self) -> Result<TPin, Error<TError>> {
        Ok(self.line.into_inner()?)
    }
}

impl<TPin> Sensor<TPin> {
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn sensor_type(&self) -> SensorType {
        self.sensor_type
    }

    pub fn cache(&self) -> &PollCache {
        &self.cache
    }

    /// The reading stored by the last bus transaction.
    pub fn last_reading(&self) -> Reading {
        self.cache.last_reading
    }
}

/// Handshake stages where the decoder waits for the sensor to move the line.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Phase {
    /// Line released after the reset pulse, waiting for the pull-up to raise it.
    AwaitRelease,
    AwaitAckLow,
    AwaitAckHigh,
    /// Waiting for the low pulse that starts the first bit.
    AwaitStartLow,
}

/// Reads DHT11 and DHT22 sensors.
///
/// Holds the collaborators shared by every sensor: a blocking delay and a monotonic millisecond
/// tick. The provided `time_fn` only needs to count milliseconds from an arbitrary origin; it may
/// wrap around.
#[derive(Debug)]
pub struct Dht<TDelay, TimeFn>
where
    TimeFn: Fn() -> u32,
{
    delay: TDelay,
    time_fn: TimeFn,
    options: Options,
}

impl<TDelay, TimeFn> Dht<TDelay, TimeFn>
where
    TDelay: DelayNs,
    TimeFn: Fn() -> u32,
{
    /// Constructs a DHT reader. If `options` is `None`, then [`DEFAULT_OPTIONS`] is used.
    ///
    /// Returns [`Error::InvalidArgument`] if `timeout` is zero or `u32::MAX`, or if either polling
    /// interval is zero or does not fit in a `u32` number of milliseconds.
    pub fn new(
        delay: TDelay,
        time_fn: TimeFn,
        options: Option<Options>,
    ) -> Result<Dht<TDelay, TimeFn>, Error<Infallible>> {
        let options = options.unwrap_or(DEFAULT_OPTIONS);
        if !options.is_valid() {
            return Err(Error::InvalidArgument);
        }
        Ok(Dht {
            delay,
            time_fn,
            options,
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Reads humidity and temperature from the sensor.
    ///
    /// Never fails: if the sensor does not respond or sends a corrupt frame, then
    /// [`Reading::SENTINEL`] is returned. When polling control is enabled and the sensor was read
    /// less than its polling interval ago, the cached reading is returned without using the bus.
    ///
    /// The bus transaction blocks for about 25ms with interrupts disabled, since bits are
    /// distinguished by counting polling iterations.
    pub fn read<TPin, TError>(&mut self, sensor: &mut Sensor<TPin>) -> Reading
    where
        TPin: InputPin<Error = TError> + OutputPin<Error = TError>,
    {
        if self.options.polling_control {
            let interval = self.options.polling_interval(sensor.sensor_type).as_millis() as u32;
            let now = (self.time_fn)();
            if let Some(reading) = sensor.cache.fresh(now, interval) {
                return reading;
            }
            sensor.cache.mark_polled(now);
        }

        let reading = match self.try_read(sensor) {
            Ok(reading) => reading,
            Err(Error::BadData) => {
                #[cfg(feature = "defmt")]
                defmt::debug!("sensor [{}] sent a corrupt frame", sensor.name.as_str());
                Reading::SENTINEL
            }
            Err(_) => {
                #[cfg(feature = "defmt")]
                defmt::debug!("sensor [{}] did not respond", sensor.name.as_str());
                // Leave the line released for the next attempt. Nothing else can be done if the
                // HAL refuses.
                let _ = sensor.line.set_line(false);
                // Forget the last reading so a dead sensor does not keep reporting it.
                sensor.cache.store(Reading::SENTINEL);
                return Reading::SENTINEL;
            }
        };

        if self.options.polling_control {
            sensor.cache.store(reading);
        }
        reading
    }

    fn try_read<TPin, TError>(&mut self, sensor: &mut Sensor<TPin>) -> Result<Reading, Error<TError>>
    where
        TPin: InputPin<Error = TError> + OutputPin<Error = TError>,
    {
        let frame = self.receive_frame(&mut sensor.line)?;
        frame.decode(sensor.sensor_type).ok_or(Error::BadData)
    }

    fn receive_frame<TPin, TError>(
        &mut self,
        line: &mut OpenDrainLine<TPin>,
    ) -> Result<RawFrame, Error<TError>>
    where
        TPin: InputPin<Error = TError> + OutputPin<Error = TError>,
    {
        let delay = &mut self.delay;
        let timeout = self.options.timeout;
        critical_section::with(|_| -> Result<RawFrame, Error<TError>> {
            line.set_line(true)?;
            delay.delay_ms(RESET_PULSE_MS);
            line.set_line(false)?;

            // The release and the acknowledgement share one budget.
            let mut counter = 0u32;
            wait_while(line, false, &mut counter, timeout, Phase::AwaitRelease)?;
            wait_while(line, true, &mut counter, timeout, Phase::AwaitAckLow)?;
            counter = 0;
            wait_while(line, false, &mut counter, timeout, Phase::AwaitAckHigh)?;
            counter = 0;
            wait_while(line, true, &mut counter, timeout, Phase::AwaitStartLow)?;

            let mut bytes = [0u8; 5];
            for byte in bytes.iter_mut() {
                for bit in (0..8).rev() {
                    if read_bit(line)? {
                        *byte |= 1 << bit;
                    }
                }
            }
            Ok(RawFrame(bytes))
        })
    }
}

/// Polls the line until it leaves `level`, counting iterations into `counter`.
#[inline]
#[cfg_attr(not(feature = "defmt"), allow(unused_variables))]
fn wait_while<TPin, TError>(
    line: &mut OpenDrainLine<TPin>,
    level: bool,
    counter: &mut u32,
    timeout: u32,
    phase: Phase,
) -> Result<(), Error<TError>>
where
    TPin: InputPin<Error = TError> + OutputPin<Error = TError>,
{
    while line.read_line()? == level {
        *counter += 1;
        if *counter > timeout {
            #[cfg(feature = "defmt")]
            defmt::trace!("timed out in {}", phase);
            return Err(Error::NoResponse);
        }
    }
    Ok(())
}

/// Reads one bit by comparing how long the line stays high against how long it stayed low.
///
/// Both counts saturate, so a stuck line resolves to 0.
#[inline]
fn read_bit<TPin, TError>(line: &mut OpenDrainLine<TPin>) -> Result<bool, Error<TError>>
where
    TPin: InputPin<Error = TError> + OutputPin<Error = TError>,
{
    let mut low_count = 0u16;
    while !line.read_line()? && low_count != u16::MAX {
        low_count += 1;
    }
    let mut high_count = 0u16;
    while line.read_line()? && high_count != u16::MAX {
        high_count += 1;
    }
    Ok(high_count > low_count)
}
