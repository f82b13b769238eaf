//! Transports draining the MIDI output queues: USB-MIDI and TRS serial.

use crate::UsbDriver;
use defmt::{info, panic, warn};
use embassy_stm32::{mode::Async, usart::UartTx};
use embassy_usb::{class::midi::MidiClass, driver::EndpointError};
use emiuet_lib::midi_out::{MidiQueue, encode, usb_midi_packet};

/// Baud rate of serial MIDI.
pub const MIDI_BAUD_RATE: u32 = 31_250;

/// USB-MIDI virtual cable carrying every message.
const USB_CABLE: u8 = 0;

/// Size of a full-speed bulk packet; it holds up to 16 USB-MIDI event packets.
const USB_PACKET_SIZE: usize = 64;

#[doc(hidden)]
struct Disconnected {}

impl From<EndpointError> for Disconnected {
    fn from(val: EndpointError) -> Self {
        match val {
            EndpointError::BufferOverflow => panic!("Buffer overflow"),
            EndpointError::Disabled => Disconnected {},
        }
    }
}

/// Task responsible for sending queued messages to the USB host.
///
/// Messages queued while no host is connected are discarded on connection rather than replayed late.
#[embassy_executor::task]
pub async fn usb_midi(mut class: MidiClass<'static, UsbDriver>, queue: &'static MidiQueue) -> ! {
    loop {
        class.wait_connection().await;
        queue.clear();
        info!("USB connected");
        let _ = forward_to_usb(&mut class, queue).await;
        info!("USB disconnected");
    }
}

/// Helper function which batches whatever is queued into as few bulk packets as possible.
async fn forward_to_usb(
    class: &mut MidiClass<'static, UsbDriver>,
    queue: &'static MidiQueue,
) -> Result<(), Disconnected> {
    let mut buf = [0_u8; USB_PACKET_SIZE];
    loop {
        let mut len = 0;
        let mut next = Some(queue.receive().await);
        while let Some(message) = next {
            if let Some(packet) = usb_midi_packet(USB_CABLE, &message) {
                buf[len..len + 4].copy_from_slice(&packet);
                len += 4;
            }
            next = if len + 4 <= USB_PACKET_SIZE {
                queue.try_receive().ok()
            } else {
                None
            };
        }

        if len > 0 {
            class.write_packet(&buf[..len]).await?;
        }
    }
}

/// Task responsible for writing queued messages to the TRS serial port.
#[embassy_executor::task]
pub async fn trs_midi(mut uart: UartTx<'static, Async>, queue: &'static MidiQueue) -> ! {
    let mut buf = [0_u8; 3];
    loop {
        let message = queue.receive().await;
        let Some(len) = encode(&message, &mut buf) else {
            continue;
        };
        if let Err(e) = uart.write(&buf[..len]).await {
            warn!("TRS MIDI write failed: {}", e);
        }
    }
}
