//! Life Beacons is [Embassy](https://embassy.dev)-based firmware which plays Conway's Game of Life as a generative MIDI
//! sequencer. It runs on the [Nucleo-F767ZI development board](https://www.st.com/en/evaluation-tools/nucleo-f767zi.html)
//! and shows up on the host as a USB MIDI device.
//!
//! Cells marked as beacons send a note-on when they are born and a note-off when they die. Generations advance every
//! 100ms, or in step with the MIDI beat clock the host sends, depending on the tempo sync setting. Buttons on the board
//! start and pause the simulation, cycle the tempo sync setting, control automatic reseeding, and clear the board: a short
//! press of the clear button kills every cell, a long press removes every beacon as well.
//!
//! Cells and beacons are edited from a grid controller plugged into the same host, whose pads arrive as notes over
//! USB-MIDI: while the simulation is paused, tapping a pad toggles its cell and holding it creates or removes a beacon.
//!
//! For details about the hardware or how to use the device, see the `README`.

#![no_std]
#![no_main]

use defmt::{panic, *};
use embassy_executor::Spawner;
use embassy_futures::select::{Either, select};
use embassy_stm32::{
    Config, bind_interrupts,
    exti::ExtiInput,
    gpio::{Level, Output, Pull, Speed},
    peripherals,
    rng::{self, Rng},
    time::Hertz,
    usb,
};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel, mutex, signal::Signal};
use embassy_time::{Duration, Instant, Timer};
use embassy_usb::{
    Builder, UsbDevice,
    class::midi::{MidiClass, Receiver, Sender},
    driver::EndpointError,
};
use life_beacons_lib::{
    app::LifeApp,
    configuration::TempoSync,
    embassy_time as lib_time,
    midi::{self, BeaconEvent, MidiSink},
    pads::{self, Pads},
    scheduler::OneShotTimer,
    simulation::{MAX_BEACONS, Operation},
    transport::{ClockChange, MidiClock},
};
use rand_chacha::{ChaCha8Rng, rand_core::SeedableRng};
use static_cell::StaticCell;
use wmidi::{Note, Velocity};

use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(
    #[doc(hidden)]
    struct Irqs {
        OTG_FS => usb::InterruptHandler<peripherals::USB_OTG_FS>;
        RNG => rng::InterruptHandler<peripherals::RNG>;
    }
);

type UsbDriver = usb::Driver<'static, peripherals::USB_OTG_FS>;
type App = LifeApp<MidiClock, WakeSignal, UsbMidiOut, ChaCha8Rng>;
type AppAsyncMutex = mutex::Mutex<CriticalSectionRawMutex, App>;

/// Beacon notes go out on the first virtual cable.
const CABLE: u8 = 0;

/// Presses held at least this long count as long presses, on the board's buttons as on the controller's pads.
const LONG_PRESS: Duration = Duration::from_millis(pads::LONG_PRESS.as_millis());

/// Enough room for a note-on and a note-off from every beacon at once; clearing a full board queues one note-off each.
const MIDI_OUT_CAPACITY: usize = 2 * MAX_BEACONS;

/// USB-MIDI Event Packets waiting to be sent to the host.
static MIDI_OUT: channel::Channel<CriticalSectionRawMutex, [u8; 4], MIDI_OUT_CAPACITY> =
    channel::Channel::new();

/// The [`Instant`] at which the scheduler next wants to wake. A new value replaces any wake still pending.
static WAKE_SCHEDULE: Signal<CriticalSectionRawMutex, Instant> = Signal::new();

/// The scheduler's timer: each request is forwarded to [`wake_task`] through [`WAKE_SCHEDULE`].
struct WakeSignal;

impl OneShotTimer for WakeSignal {
    fn schedule(&mut self, delay: lib_time::Duration) {
        WAKE_SCHEDULE.signal(Instant::now() + Duration::from_micros(delay.as_micros()));
    }
}

/// Queues beacon notes for [`midi_out_task`].
struct UsbMidiOut;

impl UsbMidiOut {
    fn send(&self, event: BeaconEvent) {
        if MIDI_OUT.try_send(event.to_usb_packet(CABLE)).is_err() {
            match event {
                BeaconEvent::NoteOn(note, _) => {
                    error!("MIDI output queue full; dropped note on {}", u8::from(note));
                }
                BeaconEvent::NoteOff(note) => {
                    error!("MIDI output queue full; dropped note off {}", u8::from(note));
                }
            }
        }
    }
}

impl MidiSink for UsbMidiOut {
    fn note_on(&mut self, note: Note, velocity: Velocity) {
        debug!("Note on {}", u8::from(note));
        self.send(BeaconEvent::NoteOn(note, velocity));
    }

    fn note_off(&mut self, note: Note) {
        debug!("Note off {}", u8::from(note));
        self.send(BeaconEvent::NoteOff(note));
    }
}

/// The current time as the library counts it.
fn lib_now() -> lib_time::Instant {
    lib_time::Instant::from_micros(Instant::now().as_micros())
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Initializing Life Beacons");

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
            // per section 5.2 of RM0410: the 48MHz clock used for USB OTG FS and the RNG is derived from main PLL VCO
            // (PLLQ clock) or PLLSAI VCO (PLLSAI clock)
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

    let mut seed = [0_u8; 32];
    let mut hw_rng = Rng::new(p.RNG, Irqs);
    if hw_rng.async_fill_bytes(&mut seed).await.is_err() {
        warn!("Hardware RNG failed; seeding from uptime");
        seed[..8].copy_from_slice(&Instant::now().as_ticks().to_le_bytes());
    }

    static APP: StaticCell<AppAsyncMutex> = StaticCell::new();
    let app = APP.init(mutex::Mutex::new(LifeApp::new(
        MidiClock::new(),
        WakeSignal,
        UsbMidiOut,
        ChaCha8Rng::from_seed(seed),
    )));
    {
        // an empty board would never come to life on its own
        let mut app = app.lock().await;
        app.advance_auto_seed();
        app.set_beat_indicator(true);
    }

    let button = ExtiInput::new(p.PC13, p.EXTI13, Pull::None);
    let green_led = Output::new(p.PB0, Level::High, Speed::Low);
    unwrap!(spawner.spawn(run_input_task(button, green_led, app)));

    let toggle = ExtiInput::new(p.PD1, p.EXTI1, Pull::Up);
    let blue_led = Output::new(p.PB7, Level::Low, Speed::Low);
    unwrap!(spawner.spawn(tempo_sync_input_task(toggle, blue_led, app)));

    let seed_button = ExtiInput::new(p.PD0, p.EXTI0, Pull::Up);
    unwrap!(spawner.spawn(auto_seed_input_task(seed_button, app)));

    let clear_button = ExtiInput::new(p.PD2, p.EXTI2, Pull::Up);
    unwrap!(spawner.spawn(clear_input_task(clear_button, app)));

    let red_led = Output::new(p.PB14, Level::Low, Speed::Low);
    unwrap!(spawner.spawn(wake_task(red_led, app)));

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
    let product_id = 0x11fe;

    let mut config = embassy_usb::Config::new(vendor_id, product_id);
    config.manufacturer = Some("Pawpaw Works");
    config.product = Some("Life Beacons");
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

    // one jack in for the host's clock and the controller's pads, one jack out for beacon notes
    let class = MidiClass::new(&mut builder, 1, 1, 64);
    let usb = builder.build();

    unwrap!(spawner.spawn(usb_task(usb)));

    let (sender, receiver) = class.split();
    unwrap!(spawner.spawn(midi_in_task(receiver, app)));
    unwrap!(spawner.spawn(midi_out_task(sender)));
}

/// Task responsible for waking the scheduler at the instants it asks for.
///
/// A request arriving while another is pending replaces it, so the scheduler only ever has one wake outstanding. The
/// red LED flips on every beat.
#[embassy_executor::task]
async fn wake_task(mut beat_led: Output<'static>, app: &'static AppAsyncMutex) -> ! {
    loop {
        let mut expiry = WAKE_SCHEDULE.wait().await;
        while let Either::Second(replacement) = select(Timer::at(expiry), WAKE_SCHEDULE.wait()).await {
            expiry = replacement;
        }

        let wake = app.lock().await.on_wake();
        if wake.beat {
            beat_led.toggle();
        }
        if wake.simulation.contains(Operation::Reseed) {
            debug!("Board reseeded");
        }
    }
}

/// Starts and pauses the simulation; the green LED is lit while it runs.
#[embassy_executor::task]
async fn run_input_task(
    mut button: ExtiInput<'static>,
    mut led: Output<'static>,
    app: &'static AppAsyncMutex,
) -> ! {
    loop {
        button.wait_for_rising_edge().await;
        let mut app = app.lock().await;
        let running = !app.is_running();
        app.set_running(running);
        info!("Simulation {}", if running { "running" } else { "paused" });
        led.set_level(if running { Level::High } else { Level::Low });
    }
}

/// Cycles through the [`TempoSync`] settings. The blue LED is lit whenever generations follow the host's clock.
#[embassy_executor::task]
async fn tempo_sync_input_task(
    mut button: ExtiInput<'static>,
    mut led: Output<'static>,
    app: &'static AppAsyncMutex,
) -> ! {
    loop {
        button.wait_for_rising_edge().await;
        let tempo_sync = app.lock().await.cycle_tempo_sync();

        match tempo_sync {
            TempoSync::Off => {
                led.set_low();
            }
            _ => {
                led.set_high();
            }
        }
    }
}

/// A short press turns reseeding on or lengthens its interval; a long press turns it off.
#[embassy_executor::task]
async fn auto_seed_input_task(mut button: ExtiInput<'static>, app: &'static AppAsyncMutex) -> ! {
    loop {
        // pulled up, so pressing drives the pin low
        button.wait_for_falling_edge().await;
        let pressed = Instant::now();
        button.wait_for_rising_edge().await;

        let mut app = app.lock().await;
        let auto_seed = if pressed.elapsed() >= LONG_PRESS {
            app.toggle_auto_seed()
        } else {
            app.advance_auto_seed()
        };
        info!("Auto-seed every {} generations", auto_seed.ticks());
    }
}

/// A short press kills every cell; a long press removes every beacon too, releasing any notes they hold.
#[embassy_executor::task]
async fn clear_input_task(mut button: ExtiInput<'static>, app: &'static AppAsyncMutex) -> ! {
    loop {
        // pulled up, so pressing drives the pin low
        button.wait_for_falling_edge().await;
        let pressed = Instant::now();
        button.wait_for_rising_edge().await;

        let mut app = app.lock().await;
        if pressed.elapsed() >= LONG_PRESS {
            info!("Clearing beacons");
            app.clear_beacons();
        } else {
            info!("Clearing cells");
            app.clear_cells();
        }
    }
}

#[embassy_executor::task]
async fn usb_task(mut usb: UsbDevice<'static, UsbDriver>) -> ! {
    usb.run().await
}

#[embassy_executor::task]
async fn midi_in_task(
    mut receiver: Receiver<'static, UsbDriver>,
    app: &'static AppAsyncMutex,
) -> ! {
    let mut pads: Pads = Pads::new();
    loop {
        receiver.wait_connection().await;
        info!("USB connected");
        let _ = process_midi_in(&mut receiver, &mut pads, app).await;
        info!("USB disconnected");
        pads.release_all();
    }
}

#[embassy_executor::task]
async fn midi_out_task(mut sender: Sender<'static, UsbDriver>) -> ! {
    loop {
        sender.wait_connection().await;
        let _ = process_midi_out(&mut sender).await;
    }
}

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

/// Helper function which feeds MIDI received over USB to the transport, and pad presses to the board.
async fn process_midi_in<'d, T: usb::Instance + 'd>(
    receiver: &mut Receiver<'d, usb::Driver<'d, T>>,
    pads: &mut Pads,
    app: &'static AppAsyncMutex,
) -> Result<(), Disconnected> {
    let mut buf = [0; 64];
    loop {
        let n = receiver.read_packet(&mut buf).await?;
        let now = lib_now();
        let mut app = app.lock().await;
        let mut change = ClockChange::none();
        for msg in midi::messages(&buf[..n]) {
            change |= app.scheduler_mut().transport_mut().receive(&msg, now);
            if let Some(gesture) = pads.receive(&msg, now) {
                app.press(gesture);
            }
        }

        if change.contains(ClockChange::Started) {
            info!("Transport started");
        }
        if change.contains(ClockChange::Stopped) {
            info!("Transport stopped");
        }
    }
}

/// Helper function which sends queued beacon notes to the host.
async fn process_midi_out<'d, T: usb::Instance + 'd>(
    sender: &mut Sender<'d, usb::Driver<'d, T>>,
) -> Result<(), Disconnected> {
    loop {
        let packet = MIDI_OUT.receive().await;
        sender.write_packet(&packet).await?;
    }
}
