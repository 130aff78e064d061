//! Drive a glove session against a simulated right-hand glove and print the
//! decoded samples.
//!
//! Usage: RUST_LOG=debug cargo run --example simulate

use glove_hid::protocol::{self, CLIENT_CHARACTERISTIC_CONFIG, HID_REPORT, HID_REPORT_MAP, HID_SERVICE};
use glove_hid::transport::CharProperties;
use glove_hid::{
    Characteristic, Descriptor, GattEvent, GattStatus, GattTransport, GloveEvent, GloveSession,
    LinkState, PassThroughFusion, Service, SessionConfig, TransportError,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const REPORT_MAP: u16 = 0x20;
const MOTION: u16 = 0x30;
const COMPASS: u16 = 0x40;
const FEATURE: u16 = 0x50;

/// Fake peripheral: every request queues the completion a real glove would send.
struct SimulatedGlove {
    pending: Arc<Mutex<VecDeque<GattEvent>>>,
}

impl SimulatedGlove {
    fn push(&self, event: GattEvent) {
        if let Ok(mut q) = self.pending.lock() {
            q.push_back(event);
        }
    }
}

fn report(handle: u16, notify: bool) -> Characteristic {
    let mut properties = CharProperties::READ;
    let mut descriptors = Vec::new();
    if notify {
        properties |= CharProperties::NOTIFY;
        descriptors.push(Descriptor {
            uuid: CLIENT_CHARACTERISTIC_CONFIG,
            handle: handle + 1,
            value: None,
        });
    }
    Characteristic {
        uuid: HID_REPORT,
        handle,
        properties,
        descriptors,
    }
}

impl GattTransport for SimulatedGlove {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.push(GattEvent::ConnectionStateChanged {
            status: GattStatus::SUCCESS,
            state: LinkState::Connected,
        });
        Ok(())
    }

    fn close(&mut self) {
        println!("transport: link closed");
    }

    fn discover_services(&mut self) -> Result<(), TransportError> {
        let service = Service {
            uuid: HID_SERVICE,
            characteristics: vec![
                Characteristic {
                    uuid: HID_REPORT_MAP,
                    handle: REPORT_MAP,
                    properties: CharProperties::READ,
                    descriptors: Vec::new(),
                },
                report(MOTION, true),
                report(COMPASS, true),
                report(FEATURE, false),
            ],
        };
        self.push(GattEvent::ServicesDiscovered {
            status: GattStatus::SUCCESS,
            services: vec![service],
        });
        Ok(())
    }

    fn read(&mut self, characteristic: u16) -> Result<(), TransportError> {
        let value = match characteristic {
            REPORT_MAP => vec![0x05, 0x03, 0x09, 0x04, 0xA1, 0x01],
            FEATURE => vec![0x01],
            other => return Err(TransportError::UnknownHandle(other)),
        };
        self.push(GattEvent::CharacteristicRead {
            handle: characteristic,
            status: GattStatus::SUCCESS,
            value,
        });
        Ok(())
    }

    fn write(&mut self, characteristic: u16, value: &[u8]) -> Result<(), TransportError> {
        println!("transport: write 0x{:04x} {:02X?}", characteristic, value);
        Ok(())
    }

    fn write_descriptor(&mut self, descriptor: u16, value: &[u8]) -> Result<(), TransportError> {
        println!("transport: write descriptor 0x{:04x} {:02X?}", descriptor, value);
        Ok(())
    }

    fn set_notify(&mut self, _characteristic: u16, _enabled: bool) -> Result<(), TransportError> {
        Ok(())
    }
}

fn motion_report(step: u32) -> Vec<u8> {
    let angle = step as f32 * 0.1;
    let (s, c) = (angle / 2.0).sin_cos();
    let quat = [c, 0.0, 0.0, s].map(|v| (v * protocol::QUAT_DIVISOR) as i16);
    let accel = [0i16, 0, 16384];

    let mut buf = Vec::with_capacity(19);
    for v in quat.iter().chain(accel.iter()) {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf.extend((0..5).map(|f| ((step * 10 + f * 40) % 256) as u8));
    buf
}

fn main() {
    env_logger::init();

    let pending = Arc::new(Mutex::new(VecDeque::new()));
    let transport = SimulatedGlove {
        pending: pending.clone(),
    };
    let (mut session, events) = GloveSession::new(
        "simulated-glove",
        Box::new(transport),
        Box::new(PassThroughFusion),
        SessionConfig::from_env(),
    );

    if let Err(e) = session.connect() {
        eprintln!("Failed to connect: {}", e);
        std::process::exit(1);
    }

    // Deliver completions one at a time, as a transport binding would.
    loop {
        let next = pending.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(event) => session.handle_event(event),
            None => break,
        }
    }

    println!("state: {}  hand: {}", session.state(), session.handedness());

    for step in 0..10 {
        session.handle_event(GattEvent::CharacteristicChanged {
            handle: MOTION,
            value: motion_report(step),
        });
        session.handle_event(GattEvent::CharacteristicChanged {
            handle: COMPASS,
            value: [320i16, 0, -160].iter().flat_map(|v| v.to_le_bytes()).collect(),
        });
    }

    session.close();

    loop {
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(GloveEvent::Changed(d)) => {
                let euler = d.euler.to_degrees();
                let linear = glove_hid::linear_acceleration(d.acceleration, glove_hid::gravity(d.quaternion));
                println!(
                    "#{:<3} euler=[{:+7.2}, {:+7.2}, {:+7.2}]  linear=[{:+.3}, {:+.3}, {:+.3}]  fingers={:.2?}",
                    d.packet_number, euler.x, euler.y, euler.z, linear.x, linear.y, linear.z, d.fingers,
                );
            }
            Ok(GloveEvent::Closed) => {
                println!("session closed");
                break;
            }
            Ok(other) => println!("event: {:?}", other),
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
    }
}
