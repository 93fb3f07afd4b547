//! nRF legacy UART0 binding
//!
//! The interrupt half of the link lives in a static and is serviced from the UART0 interrupt;
//! [`new_uart`] hands back the application half.
//!
//! ```ignore
//! bind_interrupts!(struct Irqs {
//!     UARTE0 => embassy_serial_frame::nrf::InterruptHandler;
//! });
//!
//! let (_uart, mut link) = new_uart(p.UARTE0, Irqs, p.P0_08, p.P0_06, Config::default())?;
//! let mut buf = [0u8; 32];
//! let len = link.recv_async(&mut buf).await?;
//! ```

use core::cell::RefCell;
use core::convert::Infallible;
use core::sync::atomic::{AtomicBool, Ordering, compiler_fence};

use embassy_hal_internal::{PeripheralRef, into_ref};
use embassy_nrf::{
    Peripheral,
    gpio::{Input, Level, Output, OutputDrive, Pin as GpioPin, Pull},
    interrupt::{self, typelevel::Interrupt},
    pac, peripherals,
};
use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use nrf_pac::uart::vals;

use crate::Error;
use crate::config::{Baudrate, Config, Parity};
use crate::link::{Link, LinkApp, LinkIsr};
use crate::log::debug;
use crate::rx::RxStatus;
use crate::transport::{SerialPort, TxNotify};

/// UART0 shares its interrupt line with UARTE0.
type UartIrq = interrupt::typelevel::UARTE0;

static LINK: Link = Link::new();
static NOTIFY: UartNotify = UartNotify::new();
static ISR: Mutex<CriticalSectionRawMutex, RefCell<Option<LinkIsr<'static, UartNotify>>>> =
    Mutex::new(RefCell::new(None));

pub struct InterruptHandler {
    _private: (),
}

impl interrupt::typelevel::Handler<UartIrq> for InterruptHandler {
    unsafe fn on_interrupt() {
        ISR.lock(|isr| {
            if let Some(isr) = isr.borrow_mut().as_mut() {
                let _ = isr.service(&mut UartRegs);
            }
        });
    }
}

/// Transmit-ready notification of UART0: the TXDRDY interrupt enable.
pub struct UartNotify {
    enabled: AtomicBool,
    tx_idle: AtomicBool,
}

impl UartNotify {
    const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            tx_idle: AtomicBool::new(true),
        }
    }
}

impl TxNotify for UartNotify {
    fn lock(&self) {
        pac::UART0.intenclr().write(|w| w.set_txdrdy(true));
        self.enabled.store(false, Ordering::Release);
        compiler_fence(Ordering::SeqCst);
    }

    fn unlock(&self) {
        compiler_fence(Ordering::SeqCst);
        self.enabled.store(true, Ordering::Release);
        pac::UART0.intenset().write(|w| w.set_txdrdy(true));
        // An idle transmitter raises no TXDRDY, so kick the handler once.
        if self.tx_idle.load(Ordering::Acquire) {
            UartIrq::pend();
        }
    }

    fn is_unlocked(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

/// Register-level access to UART0, used from the interrupt handler only.
struct UartRegs;

impl SerialPort for UartRegs {
    type Error = Infallible;

    fn read_byte(&mut self) -> Result<Option<(u8, RxStatus)>, Infallible> {
        let r = pac::UART0;
        if r.events_rxdrdy().read() == 0 {
            return Ok(None);
        }
        r.events_rxdrdy().write_value(0);

        let mut status = RxStatus::OK;
        if r.events_error().read() != 0 {
            r.events_error().write_value(0);
            let src = r.errorsrc().read();
            if src.overrun() {
                status = status | RxStatus::OVERRUN;
            }
            if src.parity() {
                status = status | RxStatus::PARITY;
            }
            if src.framing() {
                status = status | RxStatus::FRAMING;
            }
            if src.break_() {
                status = status | RxStatus::BREAK;
            }
            // write-one-to-clear
            r.errorsrc().write_value(src);
        }

        Ok(Some((r.rxd().read().rxd(), status)))
    }

    fn write_ready(&mut self) -> bool {
        let r = pac::UART0;
        if r.events_txdrdy().read() != 0 {
            r.events_txdrdy().write_value(0);
            NOTIFY.tx_idle.store(true, Ordering::Release);
        }
        NOTIFY.tx_idle.load(Ordering::Acquire)
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), Infallible> {
        NOTIFY.tx_idle.store(false, Ordering::Release);
        pac::UART0.txd().write(|w| w.set_txd(byte));
        Ok(())
    }
}

fn baudrate(b: Baudrate) -> vals::Baudrate {
    match b {
        Baudrate::Baud9600 => vals::Baudrate::BAUD9600,
        Baudrate::Baud19200 => vals::Baudrate::BAUD19200,
        Baudrate::Baud38400 => vals::Baudrate::BAUD38400,
        Baudrate::Baud57600 => vals::Baudrate::BAUD57600,
        Baudrate::Baud115200 => vals::Baudrate::BAUD115200,
    }
}

/// Owns UART0 and its pins while the link runs; dropping it stops the UART.
pub struct Uart<'d> {
    _p: PeripheralRef<'d, peripherals::UARTE0>,
    _rxd: Input<'d>,
    _txd: Output<'d>,
}

impl Drop for Uart<'_> {
    fn drop(&mut self) {
        UartIrq::disable();
        let r = pac::UART0;
        r.intenclr().write(|w| w.0 = 0xffff_ffff);
        r.tasks_stoprx().write_value(1);
        r.tasks_stoptx().write_value(1);
        r.enable().write(|w| w.set_enable(vals::Enable::DISABLED));
    }
}

/// Starts UART0 and returns it together with the application half of the link.
///
/// Can be called once; later calls fail with [`Error::AlreadyInitialized`].
pub fn new_uart(
    uart: impl Peripheral<P = peripherals::UARTE0> + 'static,
    _irq: impl interrupt::typelevel::Binding<UartIrq, InterruptHandler> + 'static,
    rxd: impl Peripheral<P = impl GpioPin> + 'static,
    txd: impl Peripheral<P = impl GpioPin> + 'static,
    config: Config,
) -> Result<(Uart<'static>, LinkApp<'static, UartNotify>), Error> {
    into_ref!(uart, rxd, txd);

    let (isr, app) = LINK.try_split(&NOTIFY, &config)?;
    ISR.lock(|cell| cell.replace(Some(isr)));

    let r = pac::UART0;
    r.psel().rxd().write_value(rxd.psel_bits());
    r.psel().txd().write_value(txd.psel_bits());
    let rxd = Input::new(rxd, Pull::Up);
    let txd = Output::new(txd, Level::High, OutputDrive::Standard);

    r.baudrate().write(|w| w.set_baudrate(baudrate(config.baudrate)));
    r.config().write(|w| {
        w.set_hwfc(false);
        w.set_parity(match config.parity {
            Parity::None => vals::ConfigParity::EXCLUDED,
            Parity::Even => vals::ConfigParity::INCLUDED,
        });
    });

    r.events_rxdrdy().write_value(0);
    r.events_txdrdy().write_value(0);
    r.events_error().write_value(0);
    r.intenset().write(|w| w.set_rxdrdy(true));

    r.enable().write(|w| w.set_enable(vals::Enable::ENABLED));
    r.tasks_startrx().write_value(1);
    r.tasks_starttx().write_value(1);

    UartIrq::unpend();
    unsafe { UartIrq::enable() };

    debug!("uart: up at {} baud", config.baudrate.bits_per_second());

    Ok((
        Uart {
            _p: uart,
            _rxd: rxd,
            _txd: txd,
        },
        app,
    ))
}
