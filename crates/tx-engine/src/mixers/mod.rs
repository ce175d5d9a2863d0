//! Bundled mixer implementations.

mod float;
mod integer;
mod voice;

pub use float::FloatMixer;
pub use integer::IntegerMixer;

use crate::mixer::Mixer;

/// Names accepted by [`create_mixer`], in registry order.
pub const MIXER_NAMES: [&str; 2] = ["integer", "float"];

/// Create a mixer by name.
pub fn create_mixer(name: &str) -> Option<Box<dyn Mixer>> {
    Some(match name {
        "integer" => Box::new(IntegerMixer::new()),
        "float" => Box::new(FloatMixer::new()),
        _ => return None,
    })
}

/// One instance of every bundled mixer, in [`MIXER_NAMES`] order.
pub fn standard_mixers() -> Vec<Box<dyn Mixer>> {
    MIXER_NAMES.iter().filter_map(|name| create_mixer(name)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_matches_names() {
        let mixers = standard_mixers();
        let names: Vec<_> = mixers.iter().map(|m| m.name()).collect();
        assert_eq!(names, MIXER_NAMES);
        assert!(create_mixer("sinc").is_none());
    }
}
