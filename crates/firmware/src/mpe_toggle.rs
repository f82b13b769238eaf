//! The user button switches MPE on and off.

use defmt::info;
use embassy_stm32::{exti::ExtiInput, gpio::Output};
use embassy_time::Timer;
use emiuet_lib::{configuration::CycleConfig, mpe::MpeAllocator};

/// A press must still read as pressed this long after its edge.
const DEBOUNCE_MS: u64 = 30;

/// Handles button presses, cycling through the [`MpeMode`][emiuet_lib::configuration::MpeMode]s and lighting the
/// LED while MPE is enabled.
#[embassy_executor::task]
pub async fn toggle_mpe(
    mut button: ExtiInput<'static>,
    mut led: Output<'static>,
    mpe: &'static MpeAllocator,
) -> ! {
    loop {
        button.wait_for_rising_edge().await;
        Timer::after_millis(DEBOUNCE_MS).await;
        if button.is_low() {
            continue;
        }

        let mode = mpe.mode().cycle();
        mpe.set_mode(mode);
        // a new mode starts from a clean pitch-bend target
        mpe.lock_pitchbend_target(false);
        mpe.reset_pitchbend_target();
        info!("User button pressed: MPE {}", mode);

        if mode.is_enabled() {
            led.set_high();
        } else {
            led.set_low();
        }

        button.wait_for_low().await;
    }
}
