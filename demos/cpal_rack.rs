//! Play a sawtooth through the rack on the default output device.
//!
//! Slot 1 crushes, slot 2 filters, slot 3 adds room reverb. Run with:
//!
//!   cargo run --example cpal_rack

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use hexrack::block::AudioBlock;
use hexrack::{Rack, MAX_BLOCK_SIZE};
use std::{thread, time::Duration};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or("no default output device available")?;
    let config = device.default_output_config()?;
    let sample_rate = config.sample_rate().0 as f32;
    let channels = config.channels() as usize;

    let (mut rack, mut handle) = Rack::new(sample_rate, MAX_BLOCK_SIZE);
    rack.prepare(sample_rate, MAX_BLOCK_SIZE);

    handle.set_engine(0, 24)?; // Bit Crusher
    handle.set_param(0, 0, 0.55);
    handle.set_param(0, 1, 0.45);
    handle.set_param(0, 2, 0.8);
    handle.set_engine(1, 10)?; // Low Pass
    handle.set_param(1, 0, 0.55);
    handle.set_param(1, 1, 0.4);
    handle.set_param(1, 2, 1.0);
    handle.set_engine(2, 39)?; // Room Reverb
    handle.set_param(2, 0, 0.6);
    handle.set_param(2, 1, 0.4);
    handle.set_param(2, 2, 0.35);

    let mut render_buf = vec![0.0f32; MAX_BLOCK_SIZE];
    let mut phase = 0.0f32;
    let freq = 110.0f32;

    let stream = device.build_output_stream(
        &config.into(),
        move |data: &mut [f32], _| {
            let total_frames = data.len() / channels;
            let mut written = 0;
            while written < total_frames {
                let frames = (total_frames - written).min(MAX_BLOCK_SIZE);
                let block = &mut render_buf[..frames];

                for s in block.iter_mut() {
                    *s = (2.0 * phase - 1.0) * 0.25;
                    phase += freq / sample_rate;
                    if phase >= 1.0 {
                        phase -= 1.0;
                    }
                }
                rack.process(&mut AudioBlock::mono(block));

                let out = written * channels;
                for (i, &s) in block.iter().enumerate() {
                    for ch in 0..channels {
                        data[out + i * channels + ch] = s;
                    }
                }
                written += frames;
            }
        },
        |err| eprintln!("stream error: {err}"),
        None,
    )?;
    stream.play()?;

    println!("playing for 8 seconds...");
    thread::sleep(Duration::from_secs(8));
    Ok(())
}
