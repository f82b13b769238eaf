//! Polling of the pitch-bend slider.

use defmt::warn;
use embassy_stm32::{
    Peri,
    adc::Adc,
    peripherals::{ADC1, PA3},
};
use embassy_time::{Duration, Instant, Ticker};
use emiuet_lib::{
    io::{AnalogChannel, AnalogInput, AnalogReadError},
    midi_out::MidiOut,
    mpe::MpeAllocator,
    slider::PitchBendSlider,
};

/// The converter and the pin the pitch-bend slider's wiper is connected to.
pub struct SliderAdc {
    adc: Adc<'static, ADC1>,
    pitch_bend: Peri<'static, PA3>,
}

impl SliderAdc {
    pub fn new(adc: Adc<'static, ADC1>, pitch_bend: Peri<'static, PA3>) -> Self {
        Self { adc, pitch_bend }
    }
}

impl AnalogInput for SliderAdc {
    fn read_raw(&mut self, channel: AnalogChannel) -> Result<u16, AnalogReadError> {
        match channel {
            AnalogChannel::PITCH_BEND => Ok(self.adc.blocking_read(&mut self.pitch_bend)),
            AnalogChannel(unknown) => {
                warn!("No analog input on channel {}", unknown);
                Err(AnalogReadError::UnknownChannel(unknown))
            }
        }
    }
}

/// Task responsible for polling the slider and sending its pitch bends.
#[embassy_executor::task]
pub async fn poll_slider(
    mut slider: PitchBendSlider,
    mut adc: SliderAdc,
    interval: Duration,
    mpe: &'static MpeAllocator,
    midi_out: &'static MidiOut,
) -> ! {
    let mut ticker = Ticker::every(interval);
    loop {
        slider.poll(&mut adc, Instant::now(), mpe, midi_out);
        ticker.next().await;
    }
}
