use embedded_hal::digital::{InputPin, OutputPin};

/// A single open-drain data line shared between the controller and a sensor.
///
/// The line is never actively driven high. Releasing it lets the external pull-up raise it, so the
/// sensor can still pull it low to respond. The wrapped pin must therefore be configured by the HAL
/// as an open-drain output with its input buffer enabled.
#[derive(Debug)]
pub struct OpenDrainLine<TPin> {
    pin: TPin,
}

impl<TPin, TError> OpenDrainLine<TPin>
where
    TPin: InputPin<Error = TError> + OutputPin<Error = TError>,
{
    /// Takes ownership of the pin and releases the line so it idles high.
    pub fn new(mut pin: TPin) -> Result<OpenDrainLine<TPin>, TError> {
        pin.set_high()?;
        Ok(OpenDrainLine { pin })
    }

    /// Drives the line low if `low` is true, otherwise releases it.
    #[inline]
    pub fn set_line(&mut self, low: bool) -> Result<(), TError> {
        if low {
            self.pin.set_low()
        } else {
            self.pin.set_high()
        }
    }

    /// Samples the current level of the line. Returns true when the line is high.
    #[inline]
    pub fn read_line(&mut self) -> Result<bool, TError> {
        self.pin.is_high()
    }

    /// Releases the line and returns the underlying pin.
    pub fn into_inner(mut self) -> Result<TPin, TError> {
        self.pin.set_high()?;
        Ok(self.pin)
    }
}
