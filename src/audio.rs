//! The creepy tone sequence.
//!
//! A mono buffer of two sine beeps in a fixed rhythm (four fast high beeps, a
//! long pause, one low beep, a shorter pause, five low beeps) that gets
//! injected into the host's outbound voice channel so nearby players hear it
//! as if it came from the avatar. The whole sequence is baked up front; the
//! host polls [`Sequencer::update`] once per tick until it ends, at which
//! point the prior voice configuration is restored.

use thiserror::Error;
use tracing::{debug, info};

pub const SAMPLE_RATE: u32 = 44_100;

const HIGH_HZ: f32 = 1000.;
const HIGH_LEN: f32 = 0.15;
const LOW_HZ: f32 = 200.;
const LOW_LEN: f32 = 0.4;

/// Pure sine tone at full scale.
pub fn tone(frequency: f32, length: f32) -> Vec<f32> {
    let count = (SAMPLE_RATE as f32 * length) as usize;
    (0..count)
        .map(|i| (std::f32::consts::TAU * frequency * i as f32 / SAMPLE_RATE as f32).sin())
        .collect()
}

/// The baked sequence buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct CreepySequence {
    samples: Vec<f32>,
}

impl CreepySequence {
    pub fn bake() -> Self {
        let high = tone(HIGH_HZ, HIGH_LEN);
        let low = tone(LOW_HZ, LOW_LEN);

        // Four highs, a 6 s gap, one low, a 3 s gap, five lows, a 1 s tail.
        let total = 4. * 0.4 + 6. + LOW_LEN + 3. + 5. * 0.6 + 1.;
        let mut samples = vec![0.; (total * SAMPLE_RATE as f32) as usize];
        let mut cursor = 0usize;

        let put = |samples: &mut Vec<f32>, cursor: &mut usize, clip: &[f32], slot: f32| {
            for (i, &s) in clip.iter().enumerate() {
                if let Some(out) = samples.get_mut(*cursor + i) {
                    *out = s;
                }
            }
            *cursor += (slot * SAMPLE_RATE as f32) as usize;
        };

        for _ in 0..4 {
            put(&mut samples, &mut cursor, &high, 0.4);
        }
        cursor += (6. * SAMPLE_RATE as f32) as usize;
        put(&mut samples, &mut cursor, &low, LOW_LEN);
        cursor += (3. * SAMPLE_RATE as f32) as usize;
        for _ in 0..5 {
            put(&mut samples, &mut cursor, &low, 0.6);
        }

        Self { samples }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn duration(&self) -> f32 {
        self.samples.len() as f32 / SAMPLE_RATE as f32
    }
}

/// Outbound voice settings as they were before injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundConfig {
    pub transmit: bool,
    pub looped: bool,
}

/// The host's audio output.
pub trait AudioSink {
    /// Starts transmitting the buffer on the outbound voice channel and
    /// returns the configuration to restore afterwards, or `None` when no
    /// outbound channel exists.
    fn inject(&mut self, samples: &[f32], sample_rate: u32) -> Option<OutboundConfig>;
    fn restore(&mut self, config: OutboundConfig);
    /// Spatial playback at the listener only.
    fn play_local(&mut self, samples: &[f32], sample_rate: u32);
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SequenceError {
    #[error("a sequence is already playing")]
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Playing {
    ends_at: f32,
    restore: Option<OutboundConfig>,
}

/// Tracks one playing sequence and restores the sink when it ends.
///
/// Poll [`update`](Self::update) every tick; call [`stop`](Self::stop) if the
/// controller goes away mid-sequence so the voice channel is not left stuck
/// on the injected clip.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sequencer {
    playing: Option<Playing>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        self.playing.is_some()
    }

    pub fn trigger<S: AudioSink>(
        &mut self,
        sink: &mut S,
        sequence: &CreepySequence,
        now: f32,
    ) -> Result<(), SequenceError> {
        if self.playing.is_some() {
            return Err(SequenceError::Busy);
        }

        let restore = sink.inject(sequence.samples(), SAMPLE_RATE);
        match restore {
            Some(_) => info!("injected sequence into the outbound voice channel"),
            None => debug!("no outbound voice channel, playing locally only"),
        }
        sink.play_local(sequence.samples(), SAMPLE_RATE);

        self.playing = Some(Playing {
            ends_at: now + sequence.duration(),
            restore,
        });
        Ok(())
    }

    pub fn update<S: AudioSink>(&mut self, sink: &mut S, now: f32) {
        if let Some(playing) = self.playing {
            if now >= playing.ends_at {
                self.finish(sink, playing);
            }
        }
    }

    /// Aborts the sequence, restoring the sink immediately.
    pub fn stop<S: AudioSink>(&mut self, sink: &mut S) {
        if let Some(playing) = self.playing {
            self.finish(sink, playing);
        }
    }

    fn finish<S: AudioSink>(&mut self, sink: &mut S, playing: Playing) {
        if let Some(config) = playing.restore {
            sink.restore(config);
        }
        self.playing = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockSink {
        has_channel: bool,
        injected: usize,
        local_plays: usize,
        restored: Vec<OutboundConfig>,
    }

    impl AudioSink for MockSink {
        fn inject(&mut self, samples: &[f32], sample_rate: u32) -> Option<OutboundConfig> {
            assert_eq!(sample_rate, SAMPLE_RATE);
            self.injected = samples.len();
            self.has_channel.then_some(OutboundConfig {
                transmit: false,
                looped: true,
            })
        }

        fn restore(&mut self, config: OutboundConfig) {
            self.restored.push(config);
        }

        fn play_local(&mut self, _: &[f32], _: u32) {
            self.local_plays += 1;
        }
    }

    fn networked_sink() -> MockSink {
        MockSink {
            has_channel: true,
            ..MockSink::default()
        }
    }

    fn at(seconds: f32) -> usize {
        (seconds * SAMPLE_RATE as f32) as usize
    }

    #[test]
    fn sequence_lasts_fifteen_seconds() {
        assert!((CreepySequence::bake().duration() - 15.).abs() < 1e-3);
    }

    #[test]
    fn beeps_land_at_their_slots() {
        let sequence = CreepySequence::bake();
        let samples = sequence.samples();
        let high = tone(HIGH_HZ, HIGH_LEN);
        let low = tone(LOW_HZ, LOW_LEN);

        // Four high beeps 0.4 s apart from the start.
        for slot in 0..4 {
            let start = at(slot as f32 * 0.4);
            assert_eq!(samples[start + 1], high[1]);
            // Silent rest of the slot.
            assert_eq!(samples[start + at(0.2)], 0.);
        }

        // The lone low beep after the 6 s gap.
        assert_eq!(samples[at(7.6) + 1], low[1]);
        assert_eq!(samples[at(9.)], 0.);

        // Five low beeps 0.6 s apart after the 3 s gap.
        for slot in 0..5 {
            let start = at(11. + slot as f32 * 0.6);
            assert_eq!(samples[start + 1], low[1]);
        }

        // Silent tail.
        assert!(samples[at(14.2)..].iter().all(|&s| s == 0.));
    }

    #[test]
    fn sequencer_restores_the_channel_when_done() {
        let sequence = CreepySequence::bake();
        let mut sink = networked_sink();
        let mut sequencer = Sequencer::new();

        sequencer.trigger(&mut sink, &sequence, 1.).unwrap();
        assert!(sequencer.is_playing());
        assert_eq!(sink.injected, sequence.samples().len());
        assert_eq!(sink.local_plays, 1);

        sequencer.update(&mut sink, 10.);
        assert!(sequencer.is_playing());
        assert!(sink.restored.is_empty());

        sequencer.update(&mut sink, 1. + sequence.duration());
        assert!(!sequencer.is_playing());
        assert_eq!(
            sink.restored,
            vec![OutboundConfig {
                transmit: false,
                looped: true,
            }]
        );
    }

    #[test]
    fn trigger_while_playing_is_refused() {
        let sequence = CreepySequence::bake();
        let mut sink = networked_sink();
        let mut sequencer = Sequencer::new();

        sequencer.trigger(&mut sink, &sequence, 0.).unwrap();
        assert_eq!(
            sequencer.trigger(&mut sink, &sequence, 1.),
            Err(SequenceError::Busy)
        );
    }

    #[test]
    fn stop_restores_mid_sequence() {
        let sequence = CreepySequence::bake();
        let mut sink = networked_sink();
        let mut sequencer = Sequencer::new();

        sequencer.trigger(&mut sink, &sequence, 0.).unwrap();
        sequencer.stop(&mut sink);
        assert!(!sequencer.is_playing());
        assert_eq!(sink.restored.len(), 1);

        // Stopping again must not restore twice.
        sequencer.stop(&mut sink);
        assert_eq!(sink.restored.len(), 1);
    }

    #[test]
    fn missing_channel_still_plays_locally() {
        let sequence = CreepySequence::bake();
        let mut sink = MockSink::default();
        let mut sequencer = Sequencer::new();

        sequencer.trigger(&mut sink, &sequence, 0.).unwrap();
        assert_eq!(sink.local_plays, 1);

        sequencer.update(&mut sink, sequence.duration());
        assert!(!sequencer.is_playing());
        assert!(sink.restored.is_empty());
    }
}
