use crate::config::{RoleAssignment, SessionConfig};
use crate::fusion::SensorFusion;
use crate::identity::{self, Identity, Rejection};
use crate::math;
use crate::protocol::{
    self, CLIENT_CHARACTERISTIC_CONFIG, ENABLE_NOTIFICATION_VALUE, FINGER_COUNT, FINGER_INVALID,
    FINGER_OFFSET, HID_REPORT, HID_REPORT_MAP, HID_SERVICE, REPORT_REFERENCE,
};
use crate::stream::{EventSender, GloveEvent, GloveStream};
use crate::transport::{
    CharProperties, Characteristic, GattEvent, GattStatus, GattTransport, LinkState, Service,
};
use crate::types::{
    GloveData, GloveFlags, Handedness, MotionSample, Quaternion, ReportRole, SessionState, Vector3,
};
use crate::{GloveError, Result};
use std::collections::BTreeMap;

/// Latest decoded samples of one glove.
///
/// Updated only through [`SensorState::apply_motion_sample`] and
/// [`SensorState::apply_compass_sample`], which return the new state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorState {
    pub quaternion: Quaternion,
    pub acceleration: Vector3,
    pub compass: Vector3,
    /// The quaternion is a fusion result rather than a raw motion decode.
    pub fused: bool,
    /// Motion reports processed so far.
    pub packets: u32,
}

impl SensorState {
    pub fn apply_motion_sample(self, sample: MotionSample) -> SensorState {
        SensorState {
            quaternion: sample.quaternion,
            acceleration: sample.acceleration,
            fused: false,
            packets: self.packets.wrapping_add(1),
            ..self
        }
    }

    pub fn apply_compass_sample(self, compass: Vector3, fusion: &mut dyn SensorFusion) -> SensorState {
        let fused = fusion.fuse(
            self.acceleration.to_array(),
            compass.to_array(),
            self.quaternion.to_array(),
        );
        SensorState {
            quaternion: Quaternion::from(fused),
            compass,
            fused: true,
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ReportSlot {
    handle: u16,
    value: Option<Vec<u8>>,
}

/// Report characteristics keyed by the role they play.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RoleMap {
    slots: BTreeMap<ReportRole, ReportSlot>,
}

const POSITIONAL_ROLES: [ReportRole; 3] = [ReportRole::Motion, ReportRole::Compass, ReportRole::Feature];

impl RoleMap {
    /// Assign roles to the HID report characteristics of a service, given in
    /// discovery order.
    pub fn assign(reports: &[&Characteristic], mode: RoleAssignment) -> RoleMap {
        let references: Vec<_> = reports
            .iter()
            .map(|c| {
                c.descriptor(REPORT_REFERENCE)
                    .and_then(|d| d.value.as_deref())
                    .and_then(protocol::parse_report_reference)
            })
            .collect();

        let tagged = match mode {
            RoleAssignment::Tagged => true,
            RoleAssignment::Positional => false,
            RoleAssignment::Auto => !references.is_empty() && references.iter().all(Option::is_some),
        };

        let mut map = RoleMap::default();
        if tagged {
            for (c, reference) in reports.iter().zip(&references) {
                match reference.and_then(|r| r.role()) {
                    Some(role) if map.slots.contains_key(&role) => {
                        log::warn!("Duplicate {} report at 0x{:04x}, ignored", role, c.handle);
                    }
                    Some(role) => map.insert(role, c.handle),
                    None => log::debug!("Report 0x{:04x} has no glove role ({:?})", c.handle, reference),
                }
            }
        } else {
            for (c, role) in reports.iter().zip(POSITIONAL_ROLES) {
                map.insert(role, c.handle);
            }
            if reports.len() > POSITIONAL_ROLES.len() {
                log::debug!("Ignoring {} extra reports", reports.len() - POSITIONAL_ROLES.len());
            }
        }

        log::debug!("Report roles ({}): {:?}", if tagged { "tagged" } else { "positional" }, map);
        map
    }

    fn insert(&mut self, role: ReportRole, handle: u16) {
        self.slots.insert(role, ReportSlot { handle, value: None });
    }

    pub fn handle(&self, role: ReportRole) -> Option<u16> {
        self.slots.get(&role).map(|s| s.handle)
    }

    pub fn role_of(&self, handle: u16) -> Option<ReportRole> {
        self.slots
            .iter()
            .find(|(_, slot)| slot.handle == handle)
            .map(|(role, _)| *role)
    }

    pub fn value(&self, role: ReportRole) -> Option<&[u8]> {
        self.slots.get(&role).and_then(|s| s.value.as_deref())
    }

    pub fn store(&mut self, role: ReportRole, value: Vec<u8>) {
        if let Some(slot) = self.slots.get_mut(&role) {
            slot.value = Some(value);
        }
    }
}

/// One glove peripheral: connection state, report roles, latest samples and
/// the fusion collaborator.
///
/// Driven by transport events through [`GloveSession::handle_event`]; the
/// consumer reads [`GloveEvent`]s from the [`GloveStream`] returned by
/// [`GloveSession::new`].
pub struct GloveSession {
    id: String,
    state: SessionState,
    link: LinkState,
    config: SessionConfig,
    transport: Box<dyn GattTransport + Send>,
    fusion: Option<Box<dyn SensorFusion + Send>>,
    report_map: Option<u16>,
    roles: RoleMap,
    sensors: SensorState,
    identity: Option<Identity>,
    events: EventSender,
}

impl GloveSession {
    pub fn new(
        id: impl Into<String>,
        transport: Box<dyn GattTransport + Send>,
        fusion: Box<dyn SensorFusion + Send>,
        config: SessionConfig,
    ) -> (GloveSession, GloveStream) {
        let (events, stream) = GloveStream::channel(config.event_capacity);
        let session = GloveSession {
            id: id.into(),
            state: SessionState::Disconnected,
            link: LinkState::Disconnected,
            config,
            transport,
            fusion: Some(fusion),
            report_map: None,
            roles: RoleMap::default(),
            sensors: SensorState::default(),
            identity: None,
            events,
        };
        (session, stream)
    }

    /// Ask the transport to open the link.
    pub fn connect(&mut self) -> Result<()> {
        if self.state != SessionState::Disconnected {
            return Err(GloveError::InvalidState(self.state));
        }

        log::info!("[{}] Connecting", self.id);
        self.state = SessionState::Connecting;
        if let Err(e) = self.transport.connect() {
            let err = GloveError::from(e);
            self.fail(err.clone());
            return Err(err);
        }
        Ok(())
    }

    /// Close the session and release the transport link and fusion instance.
    pub fn close(&mut self) {
        self.teardown(SessionState::Closed);
    }

    /// Feed one transport event into the state machine.
    pub fn handle_event(&mut self, event: GattEvent) {
        if self.state.is_terminal() {
            log::trace!("[{}] Session {}, ignoring {:?}", self.id, self.state, event);
            return;
        }

        match event {
            GattEvent::ConnectionStateChanged { status, state } => {
                self.on_connection_state(status, state)
            }
            GattEvent::ServicesDiscovered { status, services } => {
                self.on_services_discovered(status, &services)
            }
            GattEvent::CharacteristicRead { handle, status, value } => {
                self.on_characteristic_read(handle, status, value)
            }
            GattEvent::CharacteristicChanged { handle, value } => {
                self.on_characteristic_changed(handle, value)
            }
        }
    }

    fn on_connection_state(&mut self, status: GattStatus, state: LinkState) {
        self.link = state;

        match state {
            LinkState::Connected if status.is_success() => {
                if matches!(
                    self.state,
                    SessionState::Disconnected | SessionState::Connecting | SessionState::Discovering
                ) {
                    log::info!("[{}] Link up, discovering services", self.id);
                    self.state = SessionState::Discovering;
                    if let Err(e) = self.transport.discover_services() {
                        self.fail(e.into());
                    }
                }
            }
            LinkState::Connected => self.fail(GloveError::GattStatus {
                operation: "connect",
                status,
            }),
            LinkState::Disconnected if !status.is_success() => self.fail(GloveError::GattStatus {
                operation: "link",
                status,
            }),
            LinkState::Disconnected => {
                log::info!("[{}] Link down while {}", self.id, self.state);
            }
            LinkState::Connecting | LinkState::Disconnecting => {}
        }
    }

    fn on_services_discovered(&mut self, status: GattStatus, services: &[Service]) {
        if self.state != SessionState::Discovering {
            log::debug!("[{}] Unexpected service discovery while {}", self.id, self.state);
            return;
        }
        if !status.is_success() {
            self.fail(GloveError::GattStatus {
                operation: "service discovery",
                status,
            });
            return;
        }

        let Some(service) = services.iter().find(|s| s.uuid == HID_SERVICE) else {
            self.reject(Rejection::NotHid);
            return;
        };
        let reports: Vec<&Characteristic> = service
            .characteristics
            .iter()
            .filter(|c| c.uuid == HID_REPORT)
            .collect();
        let report_map = match service.characteristic(HID_REPORT_MAP) {
            Some(c) if !reports.is_empty() => c.handle,
            _ => {
                self.reject(Rejection::NotHid);
                return;
            }
        };

        self.roles = RoleMap::assign(&reports, self.config.role_assignment);
        self.report_map = Some(report_map);
        self.state = SessionState::Identifying;
        log::info!(
            "[{}] HID service found with {} reports, reading report map",
            self.id,
            reports.len()
        );

        if let Err(e) = self.transport.read(report_map) {
            self.fail(e.into());
            return;
        }
        if self.config.subscribe_notifications {
            if let Err(e) = self.subscribe(&reports) {
                self.fail(e);
            }
        }
    }

    fn subscribe(&mut self, reports: &[&Characteristic]) -> Result<()> {
        for c in reports
            .iter()
            .filter(|c| c.properties.contains(CharProperties::NOTIFY))
        {
            log::debug!("[{}] Enabling notifications on 0x{:04x}", self.id, c.handle);
            self.transport.set_notify(c.handle, true)?;
            if let Some(cccd) = c.descriptor(CLIENT_CHARACTERISTIC_CONFIG) {
                self.transport
                    .write_descriptor(cccd.handle, &ENABLE_NOTIFICATION_VALUE)?;
            }
        }
        Ok(())
    }

    fn on_characteristic_read(&mut self, handle: u16, status: GattStatus, value: Vec<u8>) {
        if Some(handle) == self.report_map {
            if self.state != SessionState::Identifying {
                log::trace!("[{}] Report map already handled", self.id);
                return;
            }
            if !status.is_success() {
                self.fail(GloveError::GattStatus {
                    operation: "report map read",
                    status,
                });
                return;
            }
            self.identify(&value);
            return;
        }

        match self.roles.role_of(handle) {
            Some(role) if status.is_success() => {
                log::debug!("[{}] Read {} report: {:02X?}", self.id, role, value);
                self.roles.store(role, value);
            }
            Some(role) => {
                log::warn!("[{}] Reading {} report failed ({})", self.id, role, status);
                self.events.send(GloveEvent::Error(GloveError::GattStatus {
                    operation: "report read",
                    status,
                }));
            }
            None => log::trace!("[{}] Read of unknown handle 0x{:04x}", self.id, handle),
        }
    }

    fn identify(&mut self, descriptor: &[u8]) {
        let identity = identity::validate(descriptor);
        self.identity = Some(identity);

        if let Some(reason) = identity.reason {
            self.reject(reason);
            return;
        }

        log::info!("[{}] Glove detected, session ready", self.id);
        self.state = SessionState::Ready;
        self.events.send(GloveEvent::Detected { is_glove: true });

        match self.roles.handle(ReportRole::Feature) {
            Some(feature) => {
                if let Err(e) = self.transport.read(feature) {
                    log::warn!("[{}] Feature report read not submitted: {}", self.id, e);
                    self.events.send(GloveEvent::Error(e.into()));
                }
            }
            None => log::warn!("[{}] No feature report, handedness stays unknown", self.id),
        }
    }

    fn on_characteristic_changed(&mut self, handle: u16, value: Vec<u8>) {
        if self.state != SessionState::Ready {
            log::trace!("[{}] Notification on 0x{:04x} before ready, ignored", self.id, handle);
            return;
        }

        match self.roles.role_of(handle) {
            Some(ReportRole::Motion) => match protocol::decode_motion(&value) {
                Some(sample) => {
                    self.roles.store(ReportRole::Motion, value);
                    self.sensors = self.sensors.apply_motion_sample(sample);
                    self.events.send(GloveEvent::Changed(self.data()));
                }
                None => log::warn!(
                    "[{}] Short motion report ({} bytes), sample dropped",
                    self.id,
                    value.len()
                ),
            },
            Some(ReportRole::Compass) => match protocol::decode_compass(&value) {
                Some(compass) => {
                    self.roles.store(ReportRole::Compass, value);
                    if let Some(fusion) = self.fusion.as_deref_mut() {
                        self.sensors = self.sensors.apply_compass_sample(compass, fusion);
                    }
                }
                None => log::warn!(
                    "[{}] Short compass report ({} bytes), sample dropped",
                    self.id,
                    value.len()
                ),
            },
            Some(ReportRole::Feature) => self.roles.store(ReportRole::Feature, value),
            Some(ReportRole::Rumble) | None => {
                log::trace!("[{}] Notification on 0x{:04x} ignored", self.id, handle)
            }
        }
    }

    fn reject(&mut self, reason: Rejection) {
        log::info!("[{}] Not a glove: {}", self.id, reason);
        self.identity = Some(Identity {
            is_glove: false,
            reason: Some(reason),
        });
        self.events.send(GloveEvent::Detected { is_glove: false });
        self.teardown(SessionState::Rejected);
    }

    fn fail(&mut self, err: GloveError) {
        log::warn!("[{}] {}", self.id, err);
        self.events.send(GloveEvent::Error(err));
        self.teardown(SessionState::Closed);
    }

    fn teardown(&mut self, terminal: SessionState) {
        if self.state.is_terminal() {
            return;
        }

        log::info!("[{}] {} -> {}", self.id, self.state, terminal);
        self.state = terminal;
        self.link = LinkState::Disconnected;
        self.transport.close();
        self.fusion = None;
        self.events.send(GloveEvent::Closed);
    }

    // -- Queries --

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.link == LinkState::Connected && !self.state.is_terminal()
    }

    /// Result of the report map check, once it ran.
    pub fn identity(&self) -> Option<Identity> {
        self.identity
    }

    pub fn handedness(&self) -> Handedness {
        identity::handedness(
            self.roles
                .value(ReportRole::Feature)
                .and_then(|v| v.first().copied()),
        )
    }

    pub fn flags(&self) -> Option<GloveFlags> {
        identity::flags(self.roles.value(ReportRole::Feature))
    }

    pub fn quaternion(&self) -> Quaternion {
        self.sensors.quaternion
    }

    pub fn acceleration(&self) -> Vector3 {
        self.sensors.acceleration
    }

    pub fn compass(&self) -> Vector3 {
        self.sensors.compass
    }

    pub fn sensors(&self) -> SensorState {
        self.sensors
    }

    /// Flex of finger `i` (0 = thumb) in [0, 1].
    ///
    /// Returns -1.0 for `i > 4` or before the first motion report. Left hand
    /// gloves report their fingers in reverse order.
    pub fn finger(&self, i: usize) -> f32 {
        if i >= FINGER_COUNT {
            return FINGER_INVALID;
        }
        let Some(report) = self.roles.value(ReportRole::Motion) else {
            return FINGER_INVALID;
        };
        let i = if self.handedness() == Handedness::Left {
            FINGER_COUNT - 1 - i
        } else {
            i
        };
        protocol::decode_finger(report, FINGER_OFFSET + i)
    }

    pub fn fingers(&self) -> [f32; FINGER_COUNT] {
        std::array::from_fn(|i| self.finger(i))
    }

    /// Snapshot of the latest sample.
    pub fn data(&self) -> GloveData {
        GloveData {
            packet_number: self.sensors.packets,
            handedness: self.handedness(),
            quaternion: self.sensors.quaternion,
            acceleration: self.sensors.acceleration,
            euler: math::to_euler(self.sensors.quaternion),
            fingers: self.fingers(),
        }
    }

    // -- Commands --

    fn ready_report(&self, role: ReportRole) -> Result<u16> {
        if self.state != SessionState::Ready {
            return Err(GloveError::InvalidState(self.state));
        }
        self.roles
            .handle(role)
            .ok_or(GloveError::ReportUnavailable(role))
    }

    /// Write the flags byte of the feature report. Remaining report bytes are kept.
    pub fn set_flags(&mut self, flags: GloveFlags) -> Result<()> {
        let handle = self.ready_report(ReportRole::Feature)?;
        let [flags_byte] = protocol::encode_flags(flags);
        let mut value = self
            .roles
            .value(ReportRole::Feature)
            .map(<[u8]>::to_vec)
            .unwrap_or_default();
        match value.first_mut() {
            Some(first) => *first = flags_byte,
            None => value.push(flags_byte),
        }
        self.transport.write(handle, &value)?;
        self.roles.store(ReportRole::Feature, value);
        log::info!("[{}] Flags set to {:?}", self.id, flags);
        Ok(())
    }

    pub fn set_handedness(&mut self, right_hand: bool) -> Result<()> {
        let mut flags = self.flags().unwrap_or_default();
        flags.set(GloveFlags::HANDEDNESS, right_hand);
        self.set_flags(flags)
    }

    /// Switch the on-glove calibration modes on or off.
    pub fn calibrate(&mut self, gyro: bool, accel: bool, fingers: bool) -> Result<()> {
        let mut flags = self.flags().unwrap_or_default();
        flags.set(GloveFlags::CAL_GYRO, gyro);
        flags.set(GloveFlags::CAL_ACCEL, accel);
        flags.set(GloveFlags::CAL_FINGERS, fingers);
        self.set_flags(flags)
    }

    /// Drive the vibration motor, `power` in [0, 1].
    pub fn set_vibration(&mut self, power: f32) -> Result<()> {
        let handle = self.ready_report(ReportRole::Rumble)?;
        self.transport.write(handle, &protocol::encode_rumble(power))?;
        Ok(())
    }
}

impl Drop for GloveSession {
    fn drop(&mut self) {
        self.teardown(SessionState::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::mock::RecordingFusion;
    use crate::protocol::{REPORT_TYPE_FEATURE, REPORT_TYPE_INPUT, REPORT_TYPE_OUTPUT};
    use crate::transport::mock::*;
    use std::sync::atomic::Ordering;

    const FUSED: [f32; 4] = [0.5, 0.5, 0.5, 0.5];

    struct Harness {
        session: GloveSession,
        events: GloveStream,
        transport: MockTransport,
        fusion_calls: std::sync::Arc<std::sync::Mutex<Vec<([f32; 3], [f32; 3], [f32; 4])>>>,
        fusion_drops: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    fn harness_with(transport: MockTransport, config: SessionConfig) -> Harness {
        let fusion = RecordingFusion::new(FUSED);
        let fusion_calls = fusion.calls.clone();
        let fusion_drops = fusion.drops.clone();
        let (session, events) =
            GloveSession::new("glove-test", Box::new(transport.clone()), Box::new(fusion), config);
        Harness {
            session,
            events,
            transport,
            fusion_calls,
            fusion_drops,
        }
    }

    fn harness() -> Harness {
        harness_with(MockTransport::default(), SessionConfig::default())
    }

    fn link_up() -> GattEvent {
        GattEvent::ConnectionStateChanged {
            status: GattStatus::SUCCESS,
            state: LinkState::Connected,
        }
    }

    fn discovered(service: Service) -> GattEvent {
        GattEvent::ServicesDiscovered {
            status: GattStatus::SUCCESS,
            services: vec![service],
        }
    }

    fn read(handle: u16, value: &[u8]) -> GattEvent {
        GattEvent::CharacteristicRead {
            handle,
            status: GattStatus::SUCCESS,
            value: value.to_vec(),
        }
    }

    fn notify(handle: u16, value: Vec<u8>) -> GattEvent {
        GattEvent::CharacteristicChanged { handle, value }
    }

    fn motion_report(quat: [i16; 4], accel: [i16; 3], fingers: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        for v in quat.iter().chain(accel.iter()) {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf.extend_from_slice(fingers);
        buf
    }

    fn compass_report(compass: [i16; 3]) -> Vec<u8> {
        compass.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Drive a session to Ready with the given service and feature byte.
    fn make_ready(h: &mut Harness, service: Service, feature: Option<u8>) {
        h.session.connect().unwrap();
        h.session.handle_event(link_up());
        h.session.handle_event(discovered(service));
        h.session.handle_event(read(REPORT_MAP_HANDLE, &[0x00, 0x03, 0x00, 0x04]));
        assert_eq!(h.session.state(), SessionState::Ready);
        if let Some(flags) = feature {
            h.session.handle_event(read(FEATURE_HANDLE, &[flags]));
        }
        h.events.drain();
    }

    #[test]
    fn test_end_to_end_scenario() {
        let mut h = harness();
        assert_eq!(h.session.state(), SessionState::Disconnected);

        h.session.connect().unwrap();
        assert_eq!(h.session.state(), SessionState::Connecting);
        assert_eq!(h.transport.requests(), vec![Request::Connect]);

        h.session.handle_event(link_up());
        assert_eq!(h.session.state(), SessionState::Discovering);
        assert!(h.session.is_connected());

        h.session.handle_event(discovered(glove_service()));
        assert_eq!(h.session.state(), SessionState::Identifying);

        h.session.handle_event(read(REPORT_MAP_HANDLE, &[0x00, 0x03, 0x00, 0x04]));
        assert_eq!(h.session.state(), SessionState::Ready);
        assert_eq!(h.events.try_recv(), Some(GloveEvent::Detected { is_glove: true }));

        assert_eq!(
            h.transport.requests(),
            vec![
                Request::Connect,
                Request::DiscoverServices,
                Request::Read(REPORT_MAP_HANDLE),
                Request::SetNotify(MOTION_HANDLE, true),
                Request::WriteDescriptor(cccd(MOTION_HANDLE), vec![0x01, 0x00]),
                Request::SetNotify(COMPASS_HANDLE, true),
                Request::WriteDescriptor(cccd(COMPASS_HANDLE), vec![0x01, 0x00]),
                Request::Read(FEATURE_HANDLE),
            ]
        );

        h.session
            .handle_event(notify(MOTION_HANDLE, motion_report([16384; 4], [0; 3], &[0; 5])));
        assert_eq!(h.session.quaternion(), Quaternion::new(1.0, 1.0, 1.0, 1.0));
        assert_eq!(h.session.acceleration(), Vector3::zero());
        match h.events.try_recv() {
            Some(GloveEvent::Changed(data)) => {
                assert_eq!(data.packet_number, 1);
                assert_eq!(data.quaternion, Quaternion::new(1.0, 1.0, 1.0, 1.0));
            }
            other => panic!("expected Changed, got {:?}", other),
        }

        h.session
            .handle_event(notify(COMPASS_HANDLE, compass_report([32, 64, -32])));
        let calls = h.fusion_calls.lock().unwrap().clone();
        assert_eq!(calls, vec![([0.0; 3], [1.0, 2.0, -1.0], [1.0; 4])]);
        assert_eq!(h.session.quaternion(), Quaternion::from(FUSED));
        assert!(h.session.sensors().fused);
        assert_eq!(h.events.try_recv(), None);
    }

    #[test]
    fn test_rejects_non_glove() {
        let mut h = harness();
        h.session.connect().unwrap();
        h.session.handle_event(link_up());
        h.session.handle_event(discovered(glove_service()));
        h.session.handle_event(read(REPORT_MAP_HANDLE, &[0x05, 0x01, 0x09, 0x06]));

        assert_eq!(h.session.state(), SessionState::Rejected);
        assert_eq!(
            h.session.identity().and_then(|i| i.reason),
            Some(Rejection::UsagePage(0x01))
        );
        assert_eq!(
            h.events.drain(),
            vec![GloveEvent::Detected { is_glove: false }, GloveEvent::Closed]
        );
        assert_eq!(h.fusion_drops.load(Ordering::SeqCst), 1);
        assert_eq!(h.transport.requests().last(), Some(&Request::Close));
        assert!(!h.session.is_connected());

        drop(h.session);
        assert_eq!(h.fusion_drops.load(Ordering::SeqCst), 1);
        let closes = h
            .transport
            .requests()
            .iter()
            .filter(|r| **r == Request::Close)
            .count();
        assert_eq!(closes, 1);
    }

    #[test]
    fn test_missing_hid_service_rejects() {
        let mut h = harness();
        h.session.connect().unwrap();
        h.session.handle_event(link_up());
        h.session.handle_event(GattEvent::ServicesDiscovered {
            status: GattStatus::SUCCESS,
            services: vec![Service {
                uuid: protocol::sig_uuid(0x180F),
                characteristics: Vec::new(),
            }],
        });
        assert_eq!(h.session.state(), SessionState::Rejected);
        assert_eq!(
            h.events.drain(),
            vec![GloveEvent::Detected { is_glove: false }, GloveEvent::Closed]
        );
    }

    #[test]
    fn test_discovery_failure_closes() {
        let mut h = harness();
        h.session.connect().unwrap();
        h.session.handle_event(link_up());
        h.session.handle_event(GattEvent::ServicesDiscovered {
            status: GattStatus::FAILURE,
            services: Vec::new(),
        });
        assert_eq!(h.session.state(), SessionState::Closed);
        assert_eq!(
            h.events.drain(),
            vec![
                GloveEvent::Error(GloveError::GattStatus {
                    operation: "service discovery",
                    status: GattStatus::FAILURE,
                }),
                GloveEvent::Closed,
            ]
        );
        assert_eq!(h.fusion_drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribe_failure_closes() {
        let transport = MockTransport {
            fail_notify: true,
            ..Default::default()
        };
        let mut h = harness_with(transport, SessionConfig::default());
        h.session.connect().unwrap();
        h.session.handle_event(link_up());
        h.session.handle_event(discovered(glove_service()));

        assert_eq!(h.session.state(), SessionState::Closed);
        let events = h.events.drain();
        assert!(matches!(
            events.first(),
            Some(GloveEvent::Error(GloveError::Transport(_)))
        ));
        assert_eq!(events.last(), Some(&GloveEvent::Closed));
    }

    #[test]
    fn test_notifications_before_ready_ignored() {
        let mut h = harness();
        h.session.connect().unwrap();
        h.session.handle_event(link_up());
        h.session.handle_event(discovered(glove_service()));
        h.session
            .handle_event(notify(MOTION_HANDLE, motion_report([16384; 4], [0; 3], &[255; 5])));

        h.session
            .handle_event(notify(COMPASS_HANDLE, compass_report([32, 0, 0])));

        assert_eq!(h.session.quaternion(), Quaternion::default());
        assert_eq!(h.session.compass(), Vector3::zero());
        assert_eq!(h.session.finger(0), FINGER_INVALID);
        assert!(h.fusion_calls.lock().unwrap().is_empty());
        assert_eq!(h.events.try_recv(), None);
    }

    #[test]
    fn test_fingers_follow_handedness() {
        let fingers = [10u8, 20, 30, 40, 50];
        let report = motion_report([16384, 0, 0, 0], [0; 3], &fingers);

        let mut right = harness();
        make_ready(&mut right, glove_service(), Some(0x01));
        right.session.handle_event(notify(MOTION_HANDLE, report.clone()));
        assert_eq!(right.session.handedness(), Handedness::Right);
        for i in 0..5 {
            assert_eq!(right.session.finger(i), fingers[i] as f32 / 255.0);
        }

        let mut left = harness();
        make_ready(&mut left, glove_service(), Some(0x00));
        left.session.handle_event(notify(MOTION_HANDLE, report));
        assert_eq!(left.session.handedness(), Handedness::Left);
        for i in 0..5 {
            assert_eq!(left.session.finger(i), fingers[4 - i] as f32 / 255.0);
        }
        assert_eq!(left.session.finger(5), FINGER_INVALID);
    }

    #[test]
    fn test_queries_before_data() {
        let mut h = harness();
        make_ready(&mut h, glove_service(), None);
        assert_eq!(h.session.handedness(), Handedness::Unknown);
        assert_eq!(h.session.flags(), None);
        assert_eq!(h.session.finger(0), FINGER_INVALID);
        assert_eq!(h.session.fingers(), [FINGER_INVALID; 5]);

        // motion report without finger bytes
        h.session
            .handle_event(notify(MOTION_HANDLE, motion_report([16384, 0, 0, 0], [0; 3], &[])));
        assert_eq!(h.session.finger(2), FINGER_INVALID);
        assert_eq!(h.session.data().packet_number, 1);
    }

    #[test]
    fn test_feature_read_failure_keeps_session() {
        let mut h = harness();
        make_ready(&mut h, glove_service(), None);

        h.session.handle_event(GattEvent::CharacteristicRead {
            handle: FEATURE_HANDLE,
            status: GattStatus::READ_NOT_PERMITTED,
            value: Vec::new(),
        });
        assert_eq!(h.session.state(), SessionState::Ready);
        assert_eq!(h.session.handedness(), Handedness::Unknown);
        assert_eq!(
            h.events.drain(),
            vec![GloveEvent::Error(GloveError::GattStatus {
                operation: "report read",
                status: GattStatus::READ_NOT_PERMITTED,
            })]
        );
    }

    #[test]
    fn test_short_motion_report_dropped() {
        let mut h = harness();
        make_ready(&mut h, glove_service(), Some(0x01));
        h.session.handle_event(notify(MOTION_HANDLE, vec![0x00, 0x40, 0x00]));
        assert_eq!(h.session.state(), SessionState::Ready);
        assert_eq!(h.session.sensors().packets, 0);
        assert_eq!(h.events.try_recv(), None);
    }

    #[test]
    fn test_tagged_roles_ignore_discovery_order() {
        let service = hid_service(vec![
            report(FEATURE_HANDLE, false, Some([3, REPORT_TYPE_FEATURE])),
            report(COMPASS_HANDLE, true, Some([2, REPORT_TYPE_INPUT])),
            report(RUMBLE_HANDLE, false, Some([4, REPORT_TYPE_OUTPUT])),
            report(MOTION_HANDLE, true, Some([1, REPORT_TYPE_INPUT])),
        ]);
        let mut h = harness();
        make_ready(&mut h, service, Some(0x01));

        h.session
            .handle_event(notify(MOTION_HANDLE, motion_report([0, 16384, 0, 0], [0; 3], &[0; 5])));
        assert_eq!(h.session.quaternion(), Quaternion::new(0.0, 1.0, 0.0, 0.0));
        assert!(matches!(h.events.try_recv(), Some(GloveEvent::Changed(_))));
        assert_eq!(h.session.handedness(), Handedness::Right);

        h.session.set_vibration(1.0).unwrap();
        assert_eq!(
            h.transport.requests().last(),
            Some(&Request::Write(RUMBLE_HANDLE, vec![0xFF, 0xFF]))
        );
    }

    #[test]
    fn test_role_map_positional_without_references() {
        let service = glove_service();
        let reports: Vec<&Characteristic> = service
            .characteristics
            .iter()
            .filter(|c| c.uuid == HID_REPORT)
            .collect();

        let roles = RoleMap::assign(&reports, RoleAssignment::Auto);
        assert_eq!(roles.handle(ReportRole::Motion), Some(MOTION_HANDLE));
        assert_eq!(roles.handle(ReportRole::Compass), Some(COMPASS_HANDLE));
        assert_eq!(roles.handle(ReportRole::Feature), Some(FEATURE_HANDLE));
        assert_eq!(roles.role_of(COMPASS_HANDLE), Some(ReportRole::Compass));

        let tagged = RoleMap::assign(&reports, RoleAssignment::Tagged);
        assert_eq!(tagged.handle(ReportRole::Motion), None);
    }

    #[test]
    fn test_commands() {
        let mut h = harness();
        assert_eq!(
            h.session.set_vibration(0.5),
            Err(GloveError::InvalidState(SessionState::Disconnected))
        );

        make_ready(&mut h, glove_service(), Some(0x00));
        assert_eq!(
            h.session.set_vibration(0.5),
            Err(GloveError::ReportUnavailable(ReportRole::Rumble))
        );

        h.session.calibrate(false, false, true).unwrap();
        assert_eq!(
            h.transport.requests().last(),
            Some(&Request::Write(FEATURE_HANDLE, vec![0x08]))
        );
        h.session.set_handedness(true).unwrap();
        assert_eq!(
            h.transport.requests().last(),
            Some(&Request::Write(FEATURE_HANDLE, vec![0x09]))
        );
        assert_eq!(h.session.handedness(), Handedness::Right);

        h.session.handle_event(notify(FEATURE_HANDLE, vec![0x00]));
        assert_eq!(h.session.handedness(), Handedness::Left);
        assert_eq!(h.session.flags(), Some(GloveFlags::empty()));
    }

    #[test]
    fn test_set_flags_keeps_rest_of_feature_report() {
        let mut h = harness();
        make_ready(&mut h, glove_service(), None);
        h.session.handle_event(read(FEATURE_HANDLE, &[0x00, 0xAA, 0xBB]));

        h.session.set_handedness(true).unwrap();
        assert_eq!(
            h.transport.requests().last(),
            Some(&Request::Write(FEATURE_HANDLE, vec![0x01, 0xAA, 0xBB]))
        );
        assert_eq!(h.session.handedness(), Handedness::Right);
    }

    #[test]
    fn test_close_releases_once() {
        let mut h = harness();
        make_ready(&mut h, glove_service(), Some(0x01));
        h.session.close();
        assert_eq!(h.session.state(), SessionState::Closed);
        assert_eq!(h.fusion_drops.load(Ordering::SeqCst), 1);
        assert_eq!(h.events.drain(), vec![GloveEvent::Closed]);

        h.session
            .handle_event(notify(MOTION_HANDLE, motion_report([16384; 4], [0; 3], &[0; 5])));
        assert_eq!(h.events.try_recv(), None);
        h.session.close();
        assert_eq!(h.session.connect(), Err(GloveError::InvalidState(SessionState::Closed)));

        drop(h.session);
        let closes = h
            .transport
            .requests()
            .iter()
            .filter(|r| **r == Request::Close)
            .count();
        assert_eq!(closes, 1);
        assert_eq!(h.fusion_drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_link_loss() {
        let mut h = harness();
        make_ready(&mut h, glove_service(), Some(0x01));

        h.session.handle_event(GattEvent::ConnectionStateChanged {
            status: GattStatus::SUCCESS,
            state: LinkState::Disconnected,
        });
        assert!(!h.session.is_connected());
        assert_eq!(h.session.state(), SessionState::Ready);

        h.session.handle_event(link_up());
        assert!(h.session.is_connected());
        assert_eq!(h.session.state(), SessionState::Ready);

        h.session.handle_event(GattEvent::ConnectionStateChanged {
            status: GattStatus(0x08),
            state: LinkState::Disconnected,
        });
        assert_eq!(h.session.state(), SessionState::Closed);
        assert_eq!(h.events.drain().last(), Some(&GloveEvent::Closed));
    }

    #[test]
    fn test_link_drop_during_discovery_rediscovers() {
        let mut h = harness();
        h.session.connect().unwrap();
        h.session.handle_event(link_up());
        assert_eq!(h.session.state(), SessionState::Discovering);

        h.session.handle_event(GattEvent::ConnectionStateChanged {
            status: GattStatus::SUCCESS,
            state: LinkState::Disconnected,
        });
        assert_eq!(h.session.state(), SessionState::Discovering);
        h.session.handle_event(link_up());

        let discoveries = h
            .transport
            .requests()
            .iter()
            .filter(|r| **r == Request::DiscoverServices)
            .count();
        assert_eq!(discoveries, 2);

        h.session.handle_event(discovered(glove_service()));
        assert_eq!(h.session.state(), SessionState::Identifying);
    }

    #[test]
    fn test_sensor_state_transitions() {
        let start = SensorState::default();
        let sample = MotionSample {
            quaternion: Quaternion::identity(),
            acceleration: Vector3::new(0.0, 0.0, 1.0),
        };
        let moved = start.apply_motion_sample(sample);
        assert_eq!(start, SensorState::default());
        assert_eq!(moved.quaternion, Quaternion::identity());
        assert_eq!(moved.packets, 1);
        assert!(!moved.fused);

        let mut fusion = RecordingFusion::new(FUSED);
        let fused = moved.apply_compass_sample(Vector3::new(1.0, 0.0, 0.0), &mut fusion);
        assert_eq!(fused.quaternion, Quaternion::from(FUSED));
        assert_eq!(fused.compass, Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(fused.acceleration, moved.acceleration);
        assert!(fused.fused);

        let again = fused.apply_motion_sample(sample);
        assert!(!again.fused);
        assert_eq!(again.packets, 2);
    }
}
