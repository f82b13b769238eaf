//! Emiuet is [Embassy](https://embassy.dev)-based firmware for a MIDI controller laid out like the neck of a six-string
//! instrument. The firmware runs on the [Nucleo-F767ZI development
//! board](https://www.st.com/en/evaluation-tools/nucleo-f767zi.html), which is powered by an F7-series STM32
//! microcontroller.
//!
//! A 6×13 key matrix (strings × frets) is scanned and debounced, and every key plays the note of its fret. A slider
//! bends pitch upward. With [MPE](https://midi.org/mpe-midi-polyphonic-expression) enabled (the user button toggles
//! it), each string plays on its own channel and the slider bends only the string most recently struck. MIDI leaves
//! over USB and, optionally, over a TRS serial port.
//!
//! The state machines live in `emiuet_lib`; this crate wires them to the board.

#![no_std]
#![no_main]

mod matrix;
mod midi_out;
mod mpe_toggle;
mod slider;

use defmt::*;
use embassy_executor::Spawner;
use embassy_stm32::{
    Config,
    adc::{Adc, SampleTime},
    bind_interrupts,
    exti::ExtiInput,
    gpio::{Input, Level, Output, Pull, Speed},
    peripherals,
    time::Hertz,
    usart::{self, UartTx},
    usb,
};
use embassy_time::Timer;
use embassy_usb::{Builder, UsbDevice, class::midi::MidiClass};
use emiuet_lib::{
    configuration::{ScanConfig, SliderConfig},
    dispatcher::NoteDispatcher,
    io::{AnalogChannel, PinMatrix},
    matrix::MatrixScanner,
    midi_out::MidiOut,
    mpe::MpeAllocator,
    slider::PitchBendSlider,
};
use static_cell::StaticCell;

use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(
    #[doc(hidden)]
    struct Irqs {
        OTG_FS => usb::InterruptHandler<peripherals::USB_OTG_FS>;
    }
);

type UsbDriver = usb::Driver<'static, peripherals::USB_OTG_FS>;

/// Time allowed for the board's inputs to come up before the matrix is scanned.
const START_DELAY_MS: u64 = 300;

/// Channel allocation shared by the note dispatcher, the slider and the MPE toggle.
static MPE: MpeAllocator = MpeAllocator::new();

/// Every MIDI message produced by the controller goes through here.
static MIDI_OUT: MidiOut = MidiOut::new();

/// Turns key events into notes.
static DISPATCHER: NoteDispatcher<'static, MidiOut> = NoteDispatcher::new(&MPE, &MIDI_OUT);

static SCANNER: MatrixScanner<'static> = MatrixScanner::new(ScanConfig::DEFAULT);

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Initializing Emiuet");

    let mut config = Config::default();
    {
        use embassy_stm32::rcc::*;
        // hse: high-speed external clock
        config.rcc.hse = Some(Hse {
            freq: Hertz(8_000_000),
            mode: HseMode::Bypass,
        });

        // pll: phase-locked loop, crucial for dividing clock
        config.rcc.pll_src = PllSource::HSE;
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL216,
            divp: Some(PllPDiv::DIV2), // 8mhz / 4 * 216 / 2 = 216Mhz
            // per section 5.2 of RM0410, the 48MHz clock used for USB OTG FS is derived from the main PLL VCO (PLLQ clock)
            divq: Some(PllQDiv::DIV9), // 8mhz / 4 * 216 / 9 = 48Mhz
            divr: None,
        });
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV4;
        config.rcc.apb2_pre = APBPrescaler::DIV2;
        config.rcc.sys = Sysclk::PLL1_P;
        config.rcc.mux.clk48sel = mux::Clk48sel::PLL1_Q;
    }
    let p = embassy_stm32::init(config);

    // user button toggles MPE; the blue LED shows whether it is on
    let button = ExtiInput::new(p.PC13, p.EXTI13, Pull::None);
    let blue_led = Output::new(p.PB7, Level::Low, Speed::Low);
    unwrap!(spawner.spawn(mpe_toggle::toggle_mpe(button, blue_led, &MPE)));

    // Create the driver, from the HAL.
    static ENDPOINT_OUT_BUFFER: StaticCell<[u8; 256]> = StaticCell::new();
    let mut config = embassy_stm32::usb::Config::default();

    // USB devices which are self-powered (i.e., that can stay powered on if unplugged from the host)
    // need to enable vbus_detection to comply with the USB spec. Per section 6.10 of the Nucleo board
    // manual (UM1974), CN13 (the USB port) cannot power the board; external power is necessary.
    // See docs on `vbus_detection` for details.
    config.vbus_detection = true;

    let driver = usb::Driver::new_fs(
        p.USB_OTG_FS,
        Irqs,
        p.PA12,
        p.PA11,
        ENDPOINT_OUT_BUFFER.init([0; 256]),
        config,
    );

    // per https://pid.codes, FOSS projects can apply to be listed under the vendor ID owned by InterBiometrics
    let vendor_id = 0x1209;
    let product_id = 0x6613;

    let mut config = embassy_usb::Config::new(vendor_id, product_id);
    config.manufacturer = Some("Emiuet");
    config.product = Some("Emiuet MIDI Controller");
    config.self_powered = true;
    config.max_power = 0;

    // Create embassy-usb DeviceBuilder using the driver and config.
    // It needs some buffers for building the descriptors.
    static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
    static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
    static CONTROL_BUFFER: StaticCell<[u8; 64]> = StaticCell::new();

    let mut builder = Builder::new(
        driver,
        config,
        CONFIG_DESCRIPTOR.init([0; 256]),
        BOS_DESCRIPTOR.init([0; 256]),
        &mut [], // no msos descriptors
        CONTROL_BUFFER.init([0; 64]),
    );

    // one MIDI OUT jack toward the host; nothing is read back
    let class = MidiClass::new(&mut builder, 0, 1, 64);
    let usb = builder.build();

    unwrap!(spawner.spawn(usb_task(usb)));
    unwrap!(spawner.spawn(midi_out::usb_midi(class, MIDI_OUT.usb_queue())));

    // TRS MIDI: USART2 TX on PD5 at the MIDI baud rate
    let mut uart_config = usart::Config::default();
    uart_config.baudrate = midi_out::MIDI_BAUD_RATE;
    let uart = unwrap!(UartTx::new(p.USART2, p.PD5, p.DMA1_CH6, uart_config));
    unwrap!(spawner.spawn(midi_out::trs_midi(uart, MIDI_OUT.trs_queue())));

    // rows are driven, columns pulled up and read
    let rows = [
        Output::new(p.PE2, Level::High, Speed::Low),
        Output::new(p.PE3, Level::High, Speed::Low),
        Output::new(p.PE4, Level::High, Speed::Low),
        Output::new(p.PE5, Level::High, Speed::Low),
        Output::new(p.PE6, Level::High, Speed::Low),
        Output::new(p.PE7, Level::High, Speed::Low),
    ];
    let columns = [
        Input::new(p.PF0, Pull::Up),
        Input::new(p.PF1, Pull::Up),
        Input::new(p.PF2, Pull::Up),
        Input::new(p.PF3, Pull::Up),
        Input::new(p.PF4, Pull::Up),
        Input::new(p.PF5, Pull::Up),
        Input::new(p.PF6, Pull::Up),
        Input::new(p.PF7, Pull::Up),
        Input::new(p.PF8, Pull::Up),
        Input::new(p.PF9, Pull::Up),
        Input::new(p.PF10, Pull::Up),
        Input::new(p.PF11, Pull::Up),
        Input::new(p.PF12, Pull::Up),
    ];
    let board_matrix = PinMatrix::new(rows, columns);

    let mut adc = Adc::new(p.ADC1);
    adc.set_sample_time(SampleTime::CYCLES112);
    let slider_adc = slider::SliderAdc::new(adc, p.PA3);

    Timer::after_millis(START_DELAY_MS).await;

    SCANNER.start(&DISPATCHER, SCANNER.config().discard_cycles());
    unwrap!(spawner.spawn(matrix::scan_matrix(board_matrix, &SCANNER)));

    let pitch_bend = PitchBendSlider::new(AnalogChannel::PITCH_BEND, &SliderConfig::DEFAULT);
    unwrap!(spawner.spawn(slider::poll_slider(
        pitch_bend,
        slider_adc,
        SliderConfig::DEFAULT.poll_interval,
        &MPE,
        &MIDI_OUT
    )));

    info!("Emiuet started");
}

#[embassy_executor::task]
async fn usb_task(mut usb: UsbDevice<'static, UsbDriver>) -> ! {
    usb.run().await
}
