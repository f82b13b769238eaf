//! Periodic scanning of the key matrix.

use embassy_stm32::gpio::{Input, Output};
use embassy_time::{Delay, Ticker};
use emiuet_lib::{
    io::PinMatrix,
    matrix::{COLUMNS, MatrixScanner, ROWS},
};

/// The key matrix as wired on the board: rows on port E, columns on port F.
pub type BoardMatrix = PinMatrix<Output<'static>, Input<'static>, ROWS, COLUMNS>;

/// Task responsible for running one scan cycle per scan period, forever.
///
/// Row settling uses a busy wait of a few dozen microseconds, short enough not to starve the other tasks.
#[embassy_executor::task]
pub async fn scan_matrix(mut matrix: BoardMatrix, scanner: &'static MatrixScanner<'static>) -> ! {
    let mut ticker = Ticker::every(scanner.config().period());
    let mut delay = Delay;
    loop {
        scanner.scan(&mut matrix, &mut delay);
        ticker.next().await;
    }
}
