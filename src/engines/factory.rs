//! Engine factory: stable id → instance, plus catalog metadata.
//!
//! Ids are contiguous from 0 (the pass-through) and never reordered;
//! hosts persist them. Categories are UI metadata only. The mix-index
//! table is the single authority on where each engine's dry/wet parameter
//! lives: entries without one return `None`, never a fallback index — a
//! fabricated index would address past the parameter array.

use crate::engines::{
    convolution::ConvolutionReverb,
    delay::{DigitalDelay, ModDelay, MultiTapDelay, PingPongDelay, ReverseDelay, TapeDelay},
    distortion::{BitCrusher, Foldback, HardClip, Overdrive, SoftClip, TapeSaturator, Waveshaper},
    dynamics::{Compressor, Expander, Limiter, NoiseGate, TransientShaper},
    eq::{AutoWah, BellEq, CombFilter, FilterResponse, FormantFilter, SvfEngine},
    modulation::{AutoPan, Chorus, Flanger, Phaser, RingMod, Rotary, Tremolo, Vibrato},
    pitch::{Harmonizer, Octaver, PitchShiftPsola, PitchShiftPv},
    reverb::{GatedReverb, ReverbCharacter, ReverbEngine, SpringReverb},
    spatial::{HaasDelay, MidSide, Panner, StereoWidener},
    spectral::{Robotizer, SpectralFreeze, SpectralGate, Whisperizer},
    utility::{DcBlock, Gain, MonoMaker, Passthrough, PhaseInvert},
    Engine,
};
use crate::error::RackError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineCategory {
    Utility,
    Dynamics,
    EqFilter,
    Distortion,
    Modulation,
    Delay,
    Reverb,
    PitchSpectral,
    Spatial,
}

pub struct CatalogEntry {
    pub id: u32,
    pub name: &'static str,
    pub category: EngineCategory,
    /// Index of the engine's dry/wet parameter, if it has one.
    pub mix_index: Option<usize>,
    build: fn() -> Box<dyn Engine>,
}

use EngineCategory::*;

static CATALOG: [CatalogEntry; 57] = [
    CatalogEntry { id: 0, name: "None", category: Utility, mix_index: None, build: || Box::new(Passthrough) },
    CatalogEntry { id: 1, name: "Gain", category: Utility, mix_index: None, build: || Box::new(Gain::new()) },
    CatalogEntry { id: 2, name: "DC Blocker", category: Utility, mix_index: None, build: || Box::new(DcBlock::new()) },
    CatalogEntry { id: 3, name: "Mono Maker", category: Utility, mix_index: None, build: || Box::new(MonoMaker::new()) },
    CatalogEntry { id: 4, name: "Phase Invert", category: Utility, mix_index: None, build: || Box::new(PhaseInvert::new()) },
    CatalogEntry { id: 5, name: "Compressor", category: Dynamics, mix_index: Some(5), build: || Box::new(Compressor::new()) },
    CatalogEntry { id: 6, name: "Limiter", category: Dynamics, mix_index: None, build: || Box::new(Limiter::new()) },
    CatalogEntry { id: 7, name: "Noise Gate", category: Dynamics, mix_index: None, build: || Box::new(NoiseGate::new()) },
    CatalogEntry { id: 8, name: "Expander", category: Dynamics, mix_index: None, build: || Box::new(Expander::new()) },
    CatalogEntry { id: 9, name: "Transient Shaper", category: Dynamics, mix_index: None, build: || Box::new(TransientShaper::new()) },
    CatalogEntry { id: 10, name: "Low Pass", category: EqFilter, mix_index: Some(2), build: || Box::new(SvfEngine::new(FilterResponse::LowPass)) },
    CatalogEntry { id: 11, name: "High Pass", category: EqFilter, mix_index: Some(2), build: || Box::new(SvfEngine::new(FilterResponse::HighPass)) },
    CatalogEntry { id: 12, name: "Band Pass", category: EqFilter, mix_index: Some(2), build: || Box::new(SvfEngine::new(FilterResponse::BandPass)) },
    CatalogEntry { id: 13, name: "Notch", category: EqFilter, mix_index: Some(2), build: || Box::new(SvfEngine::new(FilterResponse::Notch)) },
    CatalogEntry { id: 14, name: "Bell EQ", category: EqFilter, mix_index: None, build: || Box::new(BellEq::new()) },
    CatalogEntry { id: 15, name: "Auto Wah", category: EqFilter, mix_index: Some(2), build: || Box::new(AutoWah::new()) },
    CatalogEntry { id: 16, name: "Comb Filter", category: EqFilter, mix_index: Some(2), build: || Box::new(CombFilter::new()) },
    CatalogEntry { id: 17, name: "Formant Filter", category: EqFilter, mix_index: Some(2), build: || Box::new(FormantFilter::new()) },
    CatalogEntry { id: 18, name: "Soft Clip", category: Distortion, mix_index: Some(2), build: || Box::new(SoftClip::new()) },
    CatalogEntry { id: 19, name: "Hard Clip", category: Distortion, mix_index: Some(2), build: || Box::new(HardClip::new()) },
    CatalogEntry { id: 20, name: "Foldback", category: Distortion, mix_index: Some(2), build: || Box::new(Foldback::new()) },
    CatalogEntry { id: 21, name: "Overdrive", category: Distortion, mix_index: Some(3), build: || Box::new(Overdrive::new()) },
    CatalogEntry { id: 22, name: "Tape Saturator", category: Distortion, mix_index: Some(2), build: || Box::new(TapeSaturator::new()) },
    CatalogEntry { id: 23, name: "Waveshaper", category: Distortion, mix_index: Some(2), build: || Box::new(Waveshaper::new()) },
    CatalogEntry { id: 24, name: "Bit Crusher", category: Distortion, mix_index: Some(2), build: || Box::new(BitCrusher::new()) },
    CatalogEntry { id: 25, name: "Chorus", category: Modulation, mix_index: Some(2), build: || Box::new(Chorus::new()) },
    CatalogEntry { id: 26, name: "Flanger", category: Modulation, mix_index: Some(3), build: || Box::new(Flanger::new()) },
    CatalogEntry { id: 27, name: "Phaser", category: Modulation, mix_index: Some(3), build: || Box::new(Phaser::new()) },
    CatalogEntry { id: 28, name: "Tremolo", category: Modulation, mix_index: None, build: || Box::new(Tremolo::new()) },
    CatalogEntry { id: 29, name: "Vibrato", category: Modulation, mix_index: None, build: || Box::new(Vibrato::new()) },
    CatalogEntry { id: 30, name: "Auto Pan", category: Modulation, mix_index: None, build: || Box::new(AutoPan::new()) },
    CatalogEntry { id: 31, name: "Ring Mod", category: Modulation, mix_index: Some(1), build: || Box::new(RingMod::new()) },
    CatalogEntry { id: 32, name: "Rotary", category: Modulation, mix_index: Some(2), build: || Box::new(Rotary::new()) },
    CatalogEntry { id: 33, name: "Digital Delay", category: Delay, mix_index: Some(2), build: || Box::new(DigitalDelay::new()) },
    CatalogEntry { id: 34, name: "Ping Pong Delay", category: Delay, mix_index: Some(2), build: || Box::new(PingPongDelay::new()) },
    CatalogEntry { id: 35, name: "Tape Delay", category: Delay, mix_index: Some(4), build: || Box::new(TapeDelay::new()) },
    CatalogEntry { id: 36, name: "Multi Tap Delay", category: Delay, mix_index: Some(3), build: || Box::new(MultiTapDelay::new()) },
    CatalogEntry { id: 37, name: "Reverse Delay", category: Delay, mix_index: Some(1), build: || Box::new(ReverseDelay::new()) },
    CatalogEntry { id: 38, name: "Mod Delay", category: Delay, mix_index: Some(4), build: || Box::new(ModDelay::new()) },
    CatalogEntry { id: 39, name: "Room Reverb", category: Reverb, mix_index: Some(2), build: || Box::new(ReverbEngine::new(ReverbCharacter::Room)) },
    CatalogEntry { id: 40, name: "Hall Reverb", category: Reverb, mix_index: Some(3), build: || Box::new(ReverbEngine::new(ReverbCharacter::Hall)) },
    CatalogEntry { id: 41, name: "Plate Reverb", category: Reverb, mix_index: Some(2), build: || Box::new(ReverbEngine::new(ReverbCharacter::Plate)) },
    CatalogEntry { id: 42, name: "Gated Reverb", category: Reverb, mix_index: Some(3), build: || Box::new(GatedReverb::new()) },
    CatalogEntry { id: 43, name: "Spring Reverb", category: Reverb, mix_index: Some(2), build: || Box::new(SpringReverb::new()) },
    CatalogEntry { id: 44, name: "Convolution Reverb", category: Reverb, mix_index: Some(1), build: || Box::new(ConvolutionReverb::new()) },
    CatalogEntry { id: 45, name: "Pitch Shift PV", category: PitchSpectral, mix_index: Some(3), build: || Box::new(PitchShiftPv::new()) },
    CatalogEntry { id: 46, name: "Pitch Shift PSOLA", category: PitchSpectral, mix_index: Some(2), build: || Box::new(PitchShiftPsola::new()) },
    CatalogEntry { id: 47, name: "Harmonizer", category: PitchSpectral, mix_index: Some(3), build: || Box::new(Harmonizer::new()) },
    CatalogEntry { id: 48, name: "Octaver", category: PitchSpectral, mix_index: Some(2), build: || Box::new(Octaver::new()) },
    CatalogEntry { id: 49, name: "Spectral Freeze", category: PitchSpectral, mix_index: Some(2), build: || Box::new(SpectralFreeze::new()) },
    CatalogEntry { id: 50, name: "Spectral Gate", category: PitchSpectral, mix_index: Some(2), build: || Box::new(SpectralGate::new()) },
    CatalogEntry { id: 51, name: "Robotizer", category: PitchSpectral, mix_index: Some(0), build: || Box::new(Robotizer::new()) },
    CatalogEntry { id: 52, name: "Whisperizer", category: PitchSpectral, mix_index: Some(1), build: || Box::new(Whisperizer::new()) },
    CatalogEntry { id: 53, name: "Stereo Widener", category: Spatial, mix_index: None, build: || Box::new(StereoWidener::new()) },
    CatalogEntry { id: 54, name: "Haas Delay", category: Spatial, mix_index: Some(2), build: || Box::new(HaasDelay::new()) },
    CatalogEntry { id: 55, name: "Mid Side", category: Spatial, mix_index: None, build: || Box::new(MidSide::new()) },
    CatalogEntry { id: 56, name: "Panner", category: Spatial, mix_index: None, build: || Box::new(Panner::new()) },
];

/// Number of engines in the catalog. Host choice parameters span 0..K−1.
pub const ENGINE_COUNT: u32 = CATALOG.len() as u32;

/// The full catalog, id-ordered, for host UI population.
pub fn catalog() -> &'static [CatalogEntry] {
    &CATALOG
}

/// Manufacture an engine instance. Never called on the audio thread.
pub fn create_engine(id: u32) -> Result<Box<dyn Engine>, RackError> {
    match CATALOG.get(id as usize) {
        Some(entry) => Ok((entry.build)()),
        None => {
            log::warn!("engine id {id} out of range, slot unchanged");
            Err(RackError::UnknownEngine(id))
        }
    }
}

/// Index of the dry/wet mix parameter for an engine, if it has one.
/// `None` means the engine has no mix parameter and cannot be
/// short-circuited on mix = 0.
pub fn mix_index(id: u32) -> Option<usize> {
    CATALOG.get(id as usize).and_then(|entry| entry.mix_index)
}

/// Cross-check the catalog against each engine's reported metadata.
/// Run at startup in debug builds and from the test suite: every name must
/// match, and every mix index must point at a parameter literally named
/// "Mix".
pub fn validate_catalog() {
    for entry in &CATALOG {
        let engine = (entry.build)();
        assert_eq!(
            engine.name(),
            entry.name,
            "catalog name mismatch for id {}",
            entry.id
        );
        assert!(
            engine.parameter_count() <= crate::MAX_PARAMS,
            "{} exposes too many parameters",
            entry.name
        );
        if let Some(index) = entry.mix_index {
            assert!(
                index < engine.parameter_count(),
                "{}: mix index {} out of range",
                entry.name,
                index
            );
            assert_eq!(
                engine.parameter_name(index),
                "Mix",
                "{}: mix index {} does not point at the mix parameter",
                entry.name,
                index
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_contiguous_and_stable() {
        for (index, entry) in CATALOG.iter().enumerate() {
            assert_eq!(entry.id, index as u32);
        }
        assert_eq!(ENGINE_COUNT, 57);
    }

    #[test]
    fn test_id_zero_is_passthrough() {
        let engine = create_engine(0).unwrap();
        assert_eq!(engine.name(), "None");
        assert_eq!(engine.parameter_count(), 0);
    }

    #[test]
    fn test_unknown_id_rejected() {
        assert!(create_engine(ENGINE_COUNT).is_err());
        assert!(create_engine(u32::MAX).is_err());
    }

    #[test]
    fn test_catalog_cross_check() {
        validate_catalog();
    }

    #[test]
    fn test_missing_mix_is_none_not_fallback() {
        // Engines without a mix parameter must report None; a fabricated
        // fallback index would write past the parameter array.
        for entry in catalog() {
            let engine = (entry.build)();
            let has_mix = (0..engine.parameter_count())
                .any(|i| engine.parameter_name(i) == "Mix");
            assert_eq!(
                entry.mix_index.is_some(),
                has_mix,
                "mix table wrong for {}",
                entry.name
            );
        }
    }

    #[test]
    fn test_every_engine_has_metadata() {
        for entry in catalog() {
            let engine = (entry.build)();
            assert!(!engine.name().is_empty());
            assert!(engine.name().is_ascii());
            for i in 0..engine.parameter_count() {
                assert!(!engine.parameter_name(i).is_empty());
            }
            // Out-of-range name lookups degrade to empty, never panic.
            assert_eq!(engine.parameter_name(engine.parameter_count()), "");
        }
    }
}
