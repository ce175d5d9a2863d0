//! Output devices for trackmix.
//!
//! Devices pull audio by posting data requests on the engine's command
//! channel and receive the rendered bytes through `commit`.

mod cpal_backend;
mod null;

pub use cpal_backend::CpalOutput;
pub use null::{NullOutput, Pacing};

use tx_engine::OutputDevice;

/// Names accepted by [`create_device`].
pub const DEVICE_NAMES: [&str; 2] = ["cpal", "null"];

/// Create a device by name.
///
/// `rate` is used by the null device; the cpal device runs at whatever rate
/// the system device reports.
pub fn create_device(name: &str, rate: u32, fragment: usize) -> Option<Box<dyn OutputDevice>> {
    Some(match name {
        "null" => Box::new(NullOutput::new(rate, fragment, Pacing::RealTime)),
        "cpal" => Box::new(CpalOutput::new(fragment)),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_knows_its_devices() {
        for name in DEVICE_NAMES {
            let dev = create_device(name, 22050, 128).unwrap();
            assert_eq!(dev.name(), name);
        }
        assert!(create_device("alsa", 22050, 128).is_none());
    }
}
